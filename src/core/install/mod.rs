pub mod json_fetch;
pub mod library_replacement;
pub mod minecraft;
pub mod planner;

pub use json_fetch::{download_and_parse_json, JsonSource};
pub use library_replacement::apply_replacement;
pub use minecraft::{DownloadMode, MinecraftDownloader, DOWNLOADER_TAG};
pub use planner::PlanContext;
