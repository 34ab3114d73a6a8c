use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the engine.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    /// The remote confirmed the resource does not exist.
    #[error("Resource not found: {url}")]
    NotFound { url: String },

    #[error("Download incomplete for {url}: expected {expected} bytes, received {received}")]
    Incomplete {
        url: String,
        expected: u64,
        received: u64,
    },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    Sha1Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── Maven ───────────────────────────────────────────
    #[error("Invalid Maven coordinate: {0}")]
    InvalidMavenCoordinate(String),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Control flow ────────────────────────────────────
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Precondition violated: {0}")]
    Precondition(String),

    // ── Aggregates ──────────────────────────────────────
    #[error("{} file(s) still failed after retrying", failed.len())]
    DownloadsExhausted { failed: Vec<FailedDownload> },

    #[error(transparent)]
    SourcesExhausted(SourceFailures),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

/// A planned download that was still failing after the retry pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDownload {
    pub target: PathBuf,
    pub urls: Vec<String>,
}

impl FailedDownload {
    /// Candidate URLs joined the way the failure report lists them.
    pub fn joined_urls(&self) -> String {
        self.urls.join(", ")
    }
}

/// Every failure collected while trying a list of equivalent sources.
///
/// `primary` is the last failure seen; `suppressed` holds the earlier ones
/// in the order they happened.
#[derive(Debug)]
pub struct SourceFailures {
    pub primary: Box<LauncherError>,
    pub suppressed: Vec<LauncherError>,
}

impl SourceFailures {
    pub fn total(&self) -> usize {
        self.suppressed.len() + 1
    }

    pub fn iter(&self) -> impl Iterator<Item = &LauncherError> {
        self.suppressed.iter().chain(std::iter::once(self.primary.as_ref()))
    }
}

impl fmt::Display for SourceFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "All sources failed ({} errors): {}",
            self.total(),
            self.primary
        )?;
        for (i, e) in self.suppressed.iter().enumerate() {
            write!(f, "\n  source error #{}: {}", i + 1, e)?;
        }
        Ok(())
    }
}

impl std::error::Error for SourceFailures {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.primary.as_ref())
    }
}

impl LauncherError {
    /// Cancellation or interrupted I/O. These end work quietly and are never
    /// surfaced to the user or retried.
    pub fn is_cancellation(&self) -> bool {
        match self {
            LauncherError::Cancelled => true,
            LauncherError::Io { source, .. } => {
                source.kind() == std::io::ErrorKind::Interrupted
            }
            _ => false,
        }
    }

    /// Definite absence. An aggregate counts only when every source agreed.
    pub fn is_not_found(&self) -> bool {
        match self {
            LauncherError::NotFound { .. } => true,
            LauncherError::SourcesExhausted(failures) => {
                failures.iter().all(LauncherError::is_not_found)
            }
            _ => false,
        }
    }

    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            LauncherError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_body()
                    || e.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            LauncherError::DownloadFailed { status, .. } => (500..600).contains(status),
            LauncherError::Io { .. } => !self.is_cancellation(),
            LauncherError::Incomplete { .. } | LauncherError::Sha1Mismatch { .. } => true,
            LauncherError::SourcesExhausted(failures) => failures.primary.is_retryable(),
            _ => false,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LauncherError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl From<zip::result::ZipError> for LauncherError {
    fn from(e: zip::result::ZipError) -> Self {
        LauncherError::Other(format!("Zip archive error: {e}"))
    }
}

// ── Serialization for UI consumers ──────────────────────
// Task errors cross to the presentation layer as plain strings.
impl serde::Serialize for LauncherError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
