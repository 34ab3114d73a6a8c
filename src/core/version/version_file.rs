// ─── Game Manifest ───
// A version JSON as far as download planning needs it, plus OS rule
// evaluation for libraries.

use serde::Deserialize;
use tracing::error;

use crate::core::maven::MavenArtifact;

/// A parsed version JSON (`versions/<id>/<id>.json`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameManifest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub inherits_from: Option<String>,
    /// Asset index id, e.g. `"17"`.
    #[serde(default)]
    pub assets: Option<String>,
    #[serde(default)]
    pub asset_index: Option<AssetIndexInfo>,
    #[serde(default)]
    pub downloads: Option<VersionDownloads>,
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionDownloads {
    #[serde(default)]
    pub client: Option<DownloadArtifact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadArtifact {
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: u64,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndexInfo {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub total_size: Option<u64>,
}

impl GameManifest {
    /// Name of the asset index file, without `.json`.
    pub fn asset_index_id(&self) -> Option<&str> {
        self.assets
            .as_deref()
            .or_else(|| self.asset_index.as_ref().map(|i| i.id.as_str()))
    }
}

// ─── Library Entry with Rules ───

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    #[serde(default)]
    pub downloads: Option<LibraryDownloads>,
    #[serde(default)]
    pub rules: Option<Vec<LibraryRule>>,
    #[serde(default)]
    pub natives: Option<serde_json::Value>,
    /// Repository base used by loader JSONs that carry no `downloads`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default)]
    pub artifact: Option<LibDownloadArtifact>,
    #[serde(default)]
    pub classifiers: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LibDownloadArtifact {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub url: Option<String>,
}

// ─── OS Rule Evaluation ───

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryRule {
    pub action: RuleAction,
    #[serde(default)]
    pub os: Option<OsRule>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsRule {
    #[serde(default)]
    pub name: Option<String>,
}

impl LibraryEntry {
    /// Evaluate whether this library should be included for the current OS.
    ///
    /// Rules logic (Mojang):
    /// - If no rules → allowed.
    /// - Process rules top-to-bottom. Start with "disallowed".
    /// - Each rule either sets "allow" or "disallow" if the OS matches (or if no OS is specified).
    /// - Final state determines inclusion.
    pub fn is_allowed_for_current_os(&self) -> bool {
        let rules = match &self.rules {
            Some(r) => r,
            None => return true,
        };

        let current_os = current_os_name();
        let mut allowed = false;

        for rule in rules {
            let os_matches = match &rule.os {
                None => true,
                Some(os) => match &os.name {
                    None => true,
                    Some(name) => name == current_os,
                },
            };

            if os_matches {
                allowed = rule.action == RuleAction::Allow;
            }
        }

        allowed
    }

    /// Native classifier for the current OS, with `${arch}` substituted.
    pub fn native_classifier_for_current_os(&self) -> Option<String> {
        let natives = self.natives.as_ref()?;
        let os = current_os_name();
        natives.as_object()?.get(os)?.as_str().map(|s| {
            let arch = if cfg!(target_pointer_width = "64") {
                "64"
            } else {
                "32"
            };
            s.replace("${arch}", arch)
        })
    }

    /// Path of the main artifact relative to the libraries directory.
    ///
    /// An explicit `downloads.artifact.path` wins; otherwise the path is
    /// derived from the coordinate, using the native classifier when the
    /// library declares one for this OS.
    pub fn artifact_path(&self) -> Option<String> {
        if let Some(path) = self
            .downloads
            .as_ref()
            .and_then(|d| d.artifact.as_ref())
            .and_then(|a| a.path.clone())
        {
            return Some(path);
        }

        let artifact = match MavenArtifact::parse(&self.name) {
            Ok(a) => a,
            Err(e) => {
                error!("Invalid library name format: {}", e);
                return None;
            }
        };
        let artifact = match self.native_classifier_for_current_os() {
            Some(classifier) => artifact.with_classifier(&classifier),
            None => artifact,
        };
        Some(artifact.relative_path())
    }

    /// `(url, path, sha1, size)` of this OS's native classifier download.
    pub fn native_download(&self) -> Option<(String, String, Option<String>, u64)> {
        let classifier = self.native_classifier_for_current_os()?;
        let info = self
            .downloads
            .as_ref()?
            .classifiers
            .as_ref()?
            .get(&classifier)?;
        let url = info.get("url")?.as_str()?.to_string();
        let path = info.get("path")?.as_str()?.to_string();
        let sha1 = info.get("sha1").and_then(|v| v.as_str()).map(str::to_string);
        let size = info.get("size").and_then(|v| v.as_u64()).unwrap_or(0);
        Some((url, path, sha1, size))
    }
}

/// Get the Mojang OS name for the current platform.
pub(crate) fn current_os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library(value: serde_json::Value) -> LibraryEntry {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn no_rules_means_allowed() {
        let lib = library(serde_json::json!({ "name": "test:lib:1.0" }));
        assert!(lib.is_allowed_for_current_os());
    }

    #[test]
    fn allow_only_current_os() {
        let lib = library(serde_json::json!({
            "name": "test:lib:1.0",
            "rules": [{ "action": "allow", "os": { "name": current_os_name() } }]
        }));
        assert!(lib.is_allowed_for_current_os());
    }

    #[test]
    fn disallow_current_os() {
        let lib = library(serde_json::json!({
            "name": "test:lib:1.0",
            "rules": [
                { "action": "allow" },
                { "action": "disallow", "os": { "name": current_os_name() } }
            ]
        }));
        assert!(!lib.is_allowed_for_current_os());
    }

    #[test]
    fn explicit_path_wins_over_the_coordinate() {
        let lib = library(serde_json::json!({
            "name": "com.mojang:brigadier:1.0.18",
            "downloads": { "artifact": {
                "path": "custom/brigadier.jar",
                "sha1": "abc",
                "size": 10,
                "url": "https://libraries.minecraft.net/custom/brigadier.jar"
            }}
        }));
        assert_eq!(lib.artifact_path().unwrap(), "custom/brigadier.jar");

        let bare = library(serde_json::json!({ "name": "com.mojang:brigadier:1.0.18" }));
        assert_eq!(
            bare.artifact_path().unwrap(),
            "com/mojang/brigadier/1.0.18/brigadier-1.0.18.jar"
        );
        assert!(library(serde_json::json!({ "name": "broken" })).artifact_path().is_none());
    }

    #[test]
    fn natives_select_the_current_os_classifier() {
        let lib = library(serde_json::json!({
            "name": "tv.twitch:twitch-platform:5.16",
            "natives": { current_os_name(): "natives-${arch}" },
            "downloads": { "classifiers": {
                "natives-64": { "url": "https://x/n.jar", "path": "n.jar", "sha1": "ff", "size": 3 },
                "natives-32": { "url": "https://x/n32.jar", "path": "n32.jar" }
            }}
        }));
        let expected = if cfg!(target_pointer_width = "64") { "natives-64" } else { "natives-32" };
        assert_eq!(lib.native_classifier_for_current_os().unwrap(), expected);
        assert!(lib
            .artifact_path()
            .unwrap()
            .ends_with(&format!("twitch-platform-5.16-{expected}.jar")));
        assert!(lib.native_download().is_some());
    }

    #[test]
    fn manifest_parses_loader_style_json() {
        let manifest: GameManifest = serde_json::from_value(serde_json::json!({
            "id": "fabric-loader-0.15.0-1.20.4",
            "inheritsFrom": "1.20.4",
            "libraries": [
                { "name": "net.fabricmc:fabric-loader:0.15.0", "url": "https://maven.fabricmc.net/" }
            ]
        }))
        .unwrap();
        assert_eq!(manifest.inherits_from.as_deref(), Some("1.20.4"));
        assert!(manifest.downloads.is_none());
        assert_eq!(manifest.libraries[0].url.as_deref(), Some("https://maven.fabricmc.net/"));
        assert_eq!(manifest.asset_index_id(), None);
    }
}
