// ─── Engine Configuration ───
// Every tunable of the engine lives here, with named fields and defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::mirror::MirrorSourceType;

const APP_DIR_NAME: &str = "InterfaceOficial";
const APP_USER_AGENT: &str = "InterfaceOficial/0.1.0";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub download: DownloadConfig,
    pub pagination: PaginationConfig,
    pub http: HttpConfig,
    pub mirror: MirrorConfig,
    pub retry: RetryConfig,
    pub dirs: GameDirs,
}

/// Concurrent download engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Permits of the download semaphore. Default 64.
    pub max_download_threads: usize,
    /// Verify existing files by SHA-1 before skipping them. Default true.
    pub verify_integrity: bool,
    /// Period of the aggregate progress poller. Default 100ms.
    pub progress_interval_ms: u64,
    /// HTTP statuses that mean "definitely absent". Default `[404, 410]`.
    pub absent_status_codes: Vec<u16>,
    /// Library coordinates starting with one of these are supplied by the
    /// runtime and never planned. Default `["org.lwjgl"]`.
    pub provided_library_prefixes: Vec<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_download_threads: 64,
            verify_integrity: true,
            progress_interval_ms: 100,
            absent_status_codes: vec![404, 410],
            provided_library_prefixes: vec!["org.lwjgl".to_string()],
        }
    }
}

impl DownloadConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }

    pub fn is_absent_status(&self, status: u16) -> bool {
        self.absent_status_codes.contains(&status)
    }

    pub fn is_provided_library(&self, name: &str) -> bool {
        self.provided_library_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }
}

/// Chunked pagination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Items requested per page. Default 50.
    pub page_size: usize,
    /// Consecutive pages requested per chunk. Default 20.
    pub chunk_size: usize,
    /// Page requests allowed in flight at once. Default 10.
    pub max_concurrent: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            chunk_size: 20,
            max_concurrent: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: APP_USER_AGENT.to_string(),
            connect_timeout_secs: 10,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Whether official hosts or the mirror are tried first.
    pub source: MirrorSourceType,
    /// Stop trying further sources once one reports definite absence.
    pub stop_on_absence: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            source: MirrorSourceType::OfficialFirst,
            stop_on_absence: true,
        }
    }
}

/// Exponential backoff for metadata fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Layout of the game directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameDirs {
    pub root: PathBuf,
}

impl Default for GameDirs {
    fn default() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            root: base.join(APP_DIR_NAME),
        }
    }
}

impl GameDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.root.join("libraries")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }

    pub fn asset_indexes_dir(&self) -> PathBuf {
        self.assets_dir().join("indexes")
    }

    pub fn resources_dir(&self) -> PathBuf {
        self.root.join("resources")
    }

    /// `versions/<name>/<name>.json`
    pub fn version_json_path(&self, name: &str) -> PathBuf {
        self.versions_dir().join(name).join(format!("{}.json", name))
    }

    /// `versions/<name>/<name>.jar`
    pub fn version_jar_path(&self, name: &str) -> PathBuf {
        self.versions_dir().join(name).join(format!("{}.jar", name))
    }
}

impl EngineConfig {
    /// Load the config from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> LauncherResult<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No engine config at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(e) => return Err(LauncherError::io(path, e)),
        };

        let config: EngineConfig = serde_json::from_str(&raw)?;
        if config.download.max_download_threads == 0 {
            warn!("max_download_threads is 0, downloads would never start");
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> LauncherResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| LauncherError::io(path, e))
    }
}
