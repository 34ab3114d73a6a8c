use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::{error, warn};

use crate::core::config::RetryConfig;
use crate::core::downloader::{validate_sha1, FileFetcher};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::mirror::{map_mirrorable_urls, MirrorSourceType};
use crate::core::retry::with_retry;

/// Where and how a metadata JSON is fetched.
#[derive(Debug, Clone, Copy)]
pub struct JsonSource<'a> {
    pub url: &'a str,
    pub sha1: Option<&'a str>,
    pub mirror: MirrorSourceType,
}

/// Load `target`, downloading it from `source` when it is missing, stale, or
/// unreadable.
///
/// A cached copy is reused if it parses and, with `verify_integrity`, its
/// SHA-1 matches. A cached copy that fails verification is deleted first.
pub async fn download_and_parse_json<T: DeserializeOwned>(
    fetcher: &FileFetcher,
    target: &Path,
    source: JsonSource<'_>,
    verify_integrity: bool,
    retry: &RetryConfig,
) -> LauncherResult<T> {
    if tokio::fs::try_exists(target).await.unwrap_or(false) {
        let trusted = match source.sha1 {
            Some(sha1) if verify_integrity => validate_sha1(target, sha1).await.unwrap_or(false),
            _ => true,
        };
        if trusted {
            match read_json(target).await {
                Ok(value) => return Ok(value),
                Err(e) => warn!("Failed to parse existing JSON {:?} ({}), re-downloading...", target, e),
            }
        } else if let Err(e) = tokio::fs::remove_file(target).await {
            warn!("Could not delete stale {:?}: {}", target, e);
        }
    }

    let urls = map_mirrorable_urls(source.url, source.mirror);
    let body = with_retry("metadata", retry, || fetcher.fetch_string_from_urls(&urls)).await?;
    if body.trim().is_empty() {
        error!("Downloaded string is empty, aborting.");
        return Err(LauncherError::Precondition(format!(
            "Empty response for {}",
            source.url
        )));
    }

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LauncherError::io(parent, e))?;
    }
    tokio::fs::write(target, &body)
        .await
        .map_err(|e| LauncherError::io(target, e))?;

    serde_json::from_str(&body).map_err(|e| {
        error!("Failed to parse JSON from {}: {}", source.url, e);
        e.into()
    })
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> LauncherResult<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| LauncherError::io(path, e))?;
    Ok(serde_json::from_str(&raw)?)
}
