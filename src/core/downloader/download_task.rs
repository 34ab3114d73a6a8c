// ─── Download Task ───
// One planned file: candidate URLs, expected hash, destination.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::core::error::{LauncherError, LauncherResult};

use super::client::{validate_sha1, BytesCallback, FileFetcher};
use super::progress::DownloadListener;

/// Work chained to run after this file is in place.
pub type Continuation = Arc<dyn Fn() -> BoxFuture<'static, LauncherResult<()>> + Send + Sync>;

/// How one pass over a task ended, short of a fatal error.
#[derive(Debug)]
pub enum FileOutcome {
    Done,
    /// Queued for the retry pass.
    Failed(LauncherError),
}

#[derive(Clone)]
pub struct DownloadTask {
    pub urls: Vec<String>,
    pub sha1: Option<String>,
    pub target: PathBuf,
    pub size: u64,
    /// `false` when no authoritative source is known: the file is expected to
    /// already exist, and definite absence is fatal.
    pub downloadable: bool,
    on_downloaded: Option<Continuation>,
}

impl fmt::Debug for DownloadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadTask")
            .field("urls", &self.urls)
            .field("sha1", &self.sha1)
            .field("target", &self.target)
            .field("size", &self.size)
            .field("downloadable", &self.downloadable)
            .field("on_downloaded", &self.on_downloaded.is_some())
            .finish()
    }
}

impl DownloadTask {
    pub fn new(urls: Vec<String>, sha1: Option<String>, target: PathBuf, size: u64) -> Self {
        Self {
            urls,
            sha1: sha1.filter(|s| !s.trim().is_empty()),
            target,
            size,
            downloadable: true,
            on_downloaded: None,
        }
    }

    pub fn downloadable(mut self, downloadable: bool) -> Self {
        self.downloadable = downloadable;
        self
    }

    /// Run `f` each time this file has been downloaded or found valid.
    pub fn set_on_downloaded<F, Fut>(&mut self, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LauncherResult<()>> + Send + 'static,
    {
        self.on_downloaded = Some(Arc::new(move || Box::pin(f())));
    }

    /// Execute one pass.
    ///
    /// `Err` is reserved for cancellation and for definite absence of an
    /// undownloadable file; every other failure comes back as
    /// [`FileOutcome::Failed`].
    pub async fn download(
        &self,
        fetcher: &FileFetcher,
        verify_integrity: bool,
        listener: Arc<dyn DownloadListener>,
        token: &CancellationToken,
    ) -> LauncherResult<FileOutcome> {
        if token.is_cancelled() {
            return Err(LauncherError::Cancelled);
        }

        let fetched = if self.verify_existing(verify_integrity).await {
            let size = tokio::fs::metadata(&self.target)
                .await
                .map(|m| m.len())
                .unwrap_or(0);
            listener.on_bytes(size as i64);
            Ok(())
        } else {
            let sink = listener.clone();
            let on_bytes: BytesCallback = Arc::new(move |delta| sink.on_bytes(delta));
            fetcher
                .download_from_mirror_list(
                    &self.urls,
                    &self.target,
                    self.sha1.as_deref(),
                    on_bytes,
                    token,
                )
                .await
        };

        let result = match fetched {
            Ok(()) => self.complete(listener.as_ref()).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => Ok(FileOutcome::Done),
            Err(e) if e.is_cancellation() => Err(e),
            Err(e) => {
                error!(
                    "Download failed: {:?}\nurls: {}, reason = {}",
                    self.target,
                    self.urls.join("\n"),
                    e
                );
                if !self.downloadable && e.is_not_found() {
                    return Err(e);
                }
                Ok(FileOutcome::Failed(e))
            }
        }
    }

    async fn complete(&self, listener: &dyn DownloadListener) -> LauncherResult<()> {
        listener.on_file_downloaded();
        if let Some(next) = &self.on_downloaded {
            next().await?;
        }
        Ok(())
    }

    /// `true` when the existing file can be kept. A file that fails
    /// verification is deleted.
    pub async fn verify_existing(&self, verify_integrity: bool) -> bool {
        if !tokio::fs::try_exists(&self.target).await.unwrap_or(false) {
            return false;
        }
        if !verify_integrity {
            return true;
        }

        let valid = match &self.sha1 {
            Some(expected) => validate_sha1(&self.target, expected).await.unwrap_or(false),
            // Undownloadable files without a hash, like a loader's patched client.
            None if !self.downloadable => return true,
            None => verify_without_hash(&self.target).await,
        };

        if !valid {
            debug!("Existing file failed verification, deleting: {:?}", self.target);
            let _ = tokio::fs::remove_file(&self.target).await;
        }
        valid
    }
}

/// Archives must open; anything else is accepted.
async fn verify_without_hash(path: &Path) -> bool {
    let is_archive = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("zip") || ext.eq_ignore_ascii_case("jar"))
        .unwrap_or(false);
    if !is_archive {
        return true;
    }

    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || check_zip(&path))
        .await
        .unwrap_or(false)
}

fn check_zip(path: &Path) -> bool {
    let Ok(file) = std::fs::File::open(path) else {
        return false;
    };
    zip::ZipArchive::new(file).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{DownloadConfig, MirrorConfig};
    use crate::core::downloader::client::sha1_hex;
    use crate::core::downloader::progress::DownloadCounters;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> FileFetcher {
        FileFetcher::new(
            reqwest::Client::new(),
            &DownloadConfig::default(),
            &MirrorConfig::default(),
        )
    }

    fn write_zip(path: &Path) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("a.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"a").unwrap();
        zip.finish().unwrap();
    }

    #[tokio::test]
    async fn valid_existing_file_skips_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("client.jar");
        std::fs::write(&target, b"existing").unwrap();

        let counters = Arc::new(DownloadCounters::new());
        let task = DownloadTask::new(
            vec![format!("{}/client.jar", server.uri())],
            Some(sha1_hex(b"existing")),
            target,
            8,
        );
        let outcome = task
            .download(&fetcher(), true, counters.clone(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(outcome, FileOutcome::Done));
        let snap = counters.snapshot();
        assert_eq!(snap.downloaded_size, 8);
        assert_eq!(snap.downloaded_files, 1);
    }

    #[tokio::test]
    async fn mismatching_existing_file_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("lib.jar");
        std::fs::write(&target, b"stale").unwrap();

        let task = DownloadTask::new(vec![], Some(sha1_hex(b"fresh")), target.clone(), 5);
        assert!(!task.verify_existing(true).await);
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn hashless_files_are_checked_by_kind() {
        let dir = tempfile::tempdir().unwrap();

        let good = dir.path().join("good.jar");
        write_zip(&good);
        assert!(DownloadTask::new(vec![], None, good, 0).verify_existing(true).await);

        let broken = dir.path().join("broken.zip");
        std::fs::write(&broken, b"not a zip").unwrap();
        assert!(!DownloadTask::new(vec![], None, broken.clone(), 0).verify_existing(true).await);
        assert!(!broken.exists());

        let plain = dir.path().join("readme.txt");
        std::fs::write(&plain, b"text").unwrap();
        assert!(DownloadTask::new(vec![], None, plain, 0).verify_existing(true).await);

        let patched = dir.path().join("patched.jar");
        std::fs::write(&patched, b"not a zip either").unwrap();
        let undownloadable = DownloadTask::new(vec![], None, patched, 0).downloadable(false);
        assert!(undownloadable.verify_existing(true).await);
    }

    #[tokio::test]
    async fn absence_is_fatal_only_for_undownloadable_files() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let urls = vec![format!("{}/missing.jar", server.uri())];
        let counters = Arc::new(DownloadCounters::new());

        let regular = DownloadTask::new(urls.clone(), None, dir.path().join("a.jar"), 0);
        let outcome = regular
            .download(&fetcher(), true, counters.clone(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, FileOutcome::Failed(_)));

        let required = DownloadTask::new(urls, None, dir.path().join("b.jar"), 0).downloadable(false);
        let err = required
            .download(&fetcher(), true, counters, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn continuation_runs_after_the_file_is_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("done.txt");
        std::fs::write(&target, b"ok").unwrap();

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let mut task = DownloadTask::new(vec![], None, target, 2);
        task.set_on_downloaded(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let counters = Arc::new(DownloadCounters::new());
        task.download(&fetcher(), true, counters, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
