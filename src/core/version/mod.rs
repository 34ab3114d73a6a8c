pub mod manifest;
pub mod version_file;

pub use manifest::{VersionEntry, VersionManifest, VERSION_MANIFEST_URL};
pub use version_file::{
    AssetIndexInfo, DownloadArtifact, GameManifest, LibDownloadArtifact, LibraryDownloads,
    LibraryEntry, LibraryRule, OsRule, RuleAction, VersionDownloads,
};
