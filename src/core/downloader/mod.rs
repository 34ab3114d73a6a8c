pub mod client;
pub mod download_task;
pub mod engine;
pub mod progress;

pub use client::{file_sha1, validate_sha1, BytesCallback, FileFetcher};
pub use download_task::{DownloadTask, FileOutcome};
pub use engine::{DownloadEngine, DownloadPlan, PassMessages};
pub use progress::{format_file_size, DownloadCounters, DownloadListener, ProgressSnapshot};
