use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::core::config::GameDirs;
use crate::core::downloader::client::join_relative;

pub const RESOURCES_URL: &str = "https://resources.download.minecraft.net";

/// Top-level asset index JSON structure.
#[derive(Debug, Deserialize)]
pub struct AssetIndex {
    pub objects: HashMap<String, AssetObject>,
    /// Legacy indexes store assets under their logical names.
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
    /// Pre-1.6 indexes are copied into `resources/`.
    #[serde(default)]
    pub map_to_resources: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}

impl AssetObject {
    /// `<hh>/<hash>`, where `hh` is the first two hash characters.
    pub fn hashed_path(&self) -> String {
        let prefix = self.hash.get(..2).unwrap_or(&self.hash);
        format!("{}/{}", prefix, self.hash)
    }

    pub fn url(&self) -> String {
        format!("{}/{}", RESOURCES_URL, self.hashed_path())
    }
}

impl AssetIndex {
    /// Where the object named `name` belongs on disk, or `None` if the name
    /// or hash would place it outside the game directory.
    pub fn target_path(&self, name: &str, object: &AssetObject, dirs: &GameDirs) -> Option<PathBuf> {
        if self.map_to_resources {
            join_relative(&dirs.resources_dir(), name)
        } else if self.is_virtual {
            join_relative(&dirs.assets_dir(), name)
        } else {
            join_relative(&dirs.assets_dir().join("objects"), &object.hashed_path())
        }
    }
}
