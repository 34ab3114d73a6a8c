pub mod dispatcher;
pub mod urls;

pub use dispatcher::{run_mirrorable, run_mirrorable_urls, AbsencePolicy, MirrorSource};
pub use urls::{map_mirrorable_urls, mirror_url, MirrorSourceType};
