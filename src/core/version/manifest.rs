// ─── Version Manifest ───
// Handles fetching and parsing the Mojang version manifest v2.

use serde::Deserialize;
use tracing::info;

use crate::core::downloader::FileFetcher;
use crate::core::error::LauncherResult;
use crate::core::mirror::{map_mirrorable_urls, MirrorSourceType};

pub const VERSION_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

/// Top-level Mojang version manifest.
#[derive(Debug, Deserialize)]
pub struct VersionManifest {
    pub versions: Vec<VersionEntry>,
}

/// A single entry in the manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub version_type: String,
    #[serde(rename = "releaseTime")]
    pub release_time: String,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

impl VersionManifest {
    /// Fetch the version manifest, falling back between Mojang and its mirror.
    pub async fn fetch(fetcher: &FileFetcher, source: MirrorSourceType) -> LauncherResult<Self> {
        Self::fetch_from(fetcher, &map_mirrorable_urls(VERSION_MANIFEST_URL, source)).await
    }

    pub(crate) async fn fetch_from(fetcher: &FileFetcher, urls: &[String]) -> LauncherResult<Self> {
        info!("Fetching Minecraft version manifest...");

        let body = fetcher.fetch_string_from_urls(urls).await?;
        let manifest: VersionManifest = serde_json::from_str(&body)?;

        info!("Loaded {} versions from manifest", manifest.versions.len());
        Ok(manifest)
    }

    /// Find a specific version entry by ID (e.g. "1.20.4").
    pub fn find_version(&self, id: &str) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.id == id)
    }

    /// List all official stable versions (release only).
    pub fn releases(&self) -> Vec<&VersionEntry> {
        self.versions
            .iter()
            .filter(|v| v.version_type == "release")
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{DownloadConfig, MirrorConfig};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn deserialize_manifest_entry() {
        let json = r#"{
            "id": "1.20.4",
            "type": "release",
            "releaseTime": "2023-12-07T08:00:00+00:00",
            "url": "https://example.com/1.20.4.json",
            "sha1": "abc123"
        }"#;
        let entry: VersionEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.id, "1.20.4");
        assert_eq!(entry.version_type, "release");
        assert_eq!(entry.release_time, "2023-12-07T08:00:00+00:00");
    }

    #[tokio::test]
    async fn falls_back_to_the_second_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/official"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mirror"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "versions": [
                    { "id": "24w14a", "type": "snapshot", "releaseTime": "t", "url": "u1" },
                    { "id": "1.20.4", "type": "release", "releaseTime": "t", "url": "u2" }
                ]
            })))
            .mount(&server)
            .await;

        let fetcher = FileFetcher::new(
            reqwest::Client::new(),
            &DownloadConfig::default(),
            &MirrorConfig::default(),
        );
        let urls = vec![
            format!("{}/official", server.uri()),
            format!("{}/mirror", server.uri()),
        ];
        let manifest = VersionManifest::fetch_from(&fetcher, &urls).await.unwrap();

        assert_eq!(manifest.find_version("1.20.4").unwrap().url, "u2");
        assert!(manifest.find_version("1.0").is_none());
        assert_eq!(manifest.releases().len(), 1);
    }
}
