pub mod fetcher;
pub mod http_source;

pub use fetcher::{PageSource, PaginatedFetcher};
pub use http_source::HttpPageSource;
