use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::{Client, Response};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::config::{DownloadConfig, MirrorConfig};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::mirror::{run_mirrorable_urls, AbsencePolicy};

/// Receives byte deltas while a file is written. Negative deltas undo the
/// bytes of a failed attempt.
pub type BytesCallback = Arc<dyn Fn(i64) + Send + Sync>;

/// Streaming, SHA-1 validated HTTP fetcher.
#[derive(Clone)]
pub struct FileFetcher {
    client: Client,
    download: DownloadConfig,
    absence_policy: AbsencePolicy,
}

impl FileFetcher {
    pub fn new(client: Client, download: &DownloadConfig, mirror: &MirrorConfig) -> Self {
        Self {
            client,
            download: download.clone(),
            absence_policy: AbsencePolicy::from_config(mirror.stop_on_absence),
        }
    }

    pub fn with_absence_policy(mut self, policy: AbsencePolicy) -> Self {
        self.absence_policy = policy;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    // ── Status classification ───────────────────────────

    fn check_status(&self, url: &str, response: Response) -> LauncherResult<Response> {
        check_status(url, response, &self.download)
    }

    async fn get(&self, url: &str, token: &CancellationToken) -> LauncherResult<Response> {
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(LauncherError::Cancelled),
            res = self.client.get(url).send() => res?,
        };
        self.check_status(url, response)
    }

    // ── Text ────────────────────────────────────────────

    pub async fn fetch_string(&self, url: &str) -> LauncherResult<String> {
        let response = self.client.get(url).send().await?;
        let response = self.check_status(url, response)?;
        Ok(response.text().await?)
    }

    /// First successful body among `urls`, tried in order.
    pub async fn fetch_string_from_urls(&self, urls: &[String]) -> LauncherResult<String> {
        let fetcher = self.clone();
        run_mirrorable_urls(urls, self.absence_policy, move |url| {
            let fetcher = fetcher.clone();
            async move { fetcher.fetch_string(&url).await }
        })
        .await
    }

    // ── Files ───────────────────────────────────────────

    /// Download `dest` from the first of `urls` that yields a valid file.
    ///
    /// Each URL is tried twice when `sha1` is known, once otherwise.
    pub async fn download_from_mirror_list(
        &self,
        urls: &[String],
        dest: &Path,
        sha1: Option<&str>,
        on_bytes: BytesCallback,
        token: &CancellationToken,
    ) -> LauncherResult<()> {
        let fetcher = self.clone();
        let dest = dest.to_path_buf();
        let sha1 = sha1.map(str::to_string);
        let token = token.clone();
        run_mirrorable_urls(urls, self.absence_policy, move |url| {
            let fetcher = fetcher.clone();
            let dest = dest.clone();
            let sha1 = sha1.clone();
            let on_bytes = on_bytes.clone();
            let token = token.clone();
            async move {
                fetcher
                    .download_file(&url, &dest, sha1.as_deref(), &on_bytes, &token)
                    .await
            }
        })
        .await
    }

    /// Download a single URL with up to two attempts.
    ///
    /// A failed attempt deletes the partial file and rolls back the bytes it
    /// reported. Definite absence and cancellation end the attempts early.
    pub async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        sha1: Option<&str>,
        on_bytes: &BytesCallback,
        token: &CancellationToken,
    ) -> LauncherResult<()> {
        let max_attempts = if sha1.is_some() { 2 } else { 1 };
        let mut attempt = 0;

        loop {
            attempt += 1;
            let mut reported: u64 = 0;
            match self.fetch_once(url, dest, sha1, on_bytes, &mut reported, token).await {
                Ok(()) => {
                    debug!("Downloaded: {} -> {:?}", url, dest);
                    return Ok(());
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(dest).await;
                    if reported > 0 {
                        on_bytes(-(reported as i64));
                    }
                    if e.is_cancellation() || e.is_not_found() || attempt >= max_attempts {
                        return Err(e);
                    }
                    debug!("Attempt {} for {} failed: {}", attempt, url, e);
                }
            }
        }
    }

    async fn fetch_once(
        &self,
        url: &str,
        dest: &Path,
        sha1_expected: Option<&str>,
        on_bytes: &BytesCallback,
        reported: &mut u64,
        token: &CancellationToken,
    ) -> LauncherResult<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }

        let response = self.get(url, token).await?;
        let expected_len = response.content_length();
        let mut stream = response.bytes_stream();
        let mut hasher = Sha1::new();
        let mut received: u64 = 0;

        // Handle is dropped at the end of this block, before verification.
        {
            let mut file = tokio::fs::File::create(dest)
                .await
                .map_err(|e| LauncherError::io(dest, e))?;

            loop {
                let chunk = tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(LauncherError::Cancelled),
                    chunk = stream.next() => chunk,
                };
                let Some(chunk) = chunk else {
                    break;
                };
                let chunk = chunk?;

                file.write_all(&chunk)
                    .await
                    .map_err(|e| LauncherError::io(dest, e))?;
                hasher.update(&chunk);

                let len = chunk.len() as u64;
                received += len;
                *reported += len;
                on_bytes(len as i64);
            }

            file.flush().await.map_err(|e| LauncherError::io(dest, e))?;
        }

        if let Some(expected) = expected_len {
            if expected != received {
                return Err(LauncherError::Incomplete {
                    url: url.to_string(),
                    expected,
                    received,
                });
            }
        }

        if let Some(expected) = sha1_expected {
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(LauncherError::Sha1Mismatch {
                    path: dest.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        Ok(())
    }
}

// ── Hash helpers ────────────────────────────────────────

/// Hex SHA-1 of a file, read in chunks.
pub async fn file_sha1(path: &Path) -> LauncherResult<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| LauncherError::io(path, e))?;
    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|e| LauncherError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Pass successful responses through. Statuses listed as definite absence
/// become [`LauncherError::NotFound`], anything else a plain failure.
pub fn check_status(url: &str, response: Response, download: &DownloadConfig) -> LauncherResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if download.is_absent_status(status.as_u16()) {
        return Err(LauncherError::NotFound {
            url: url.to_string(),
        });
    }
    Err(LauncherError::DownloadFailed {
        url: url.to_string(),
        status: status.as_u16(),
    })
}

/// Validate an existing file's SHA-1 (case-insensitive).
pub async fn validate_sha1(path: &Path, expected: &str) -> LauncherResult<bool> {
    Ok(file_sha1(path).await?.eq_ignore_ascii_case(expected))
}

pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// `dest` joined with `relative`, tolerating `/` separators in `relative`.
///
/// Returns `None` when `relative` would leave `dest`: a `..` segment, or a
/// segment carrying its own root or drive prefix.
pub fn join_relative(dest: &Path, relative: &str) -> Option<PathBuf> {
    let mut joined = dest.to_path_buf();
    for part in relative.split('/').filter(|part| !part.is_empty()) {
        for component in Path::new(part).components() {
            match component {
                Component::Normal(name) => joined.push(name),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
    }
    Some(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

    fn fetcher() -> FileFetcher {
        FileFetcher::new(
            Client::new(),
            &DownloadConfig::default(),
            &MirrorConfig::default(),
        )
    }

    fn byte_counter() -> (Arc<AtomicI64>, BytesCallback) {
        let total = Arc::new(AtomicI64::new(0));
        let sink = total.clone();
        (total, Arc::new(move |delta| {
            sink.fetch_add(delta, Ordering::SeqCst);
        }))
    }

    /// Serves corrupt bytes first, then the real body.
    struct CorruptOnce {
        calls: Arc<AtomicUsize>,
        body: Vec<u8>,
    }

    impl Respond for CorruptOnce {
        fn respond(&self, _: &wiremock::Request) -> ResponseTemplate {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(200).set_body_bytes(b"garbage".to_vec())
            } else {
                ResponseTemplate::new(200).set_body_bytes(self.body.clone())
            }
        }
    }

    #[tokio::test]
    async fn downloads_and_verifies_sha1() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lib.jar"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"library".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested/lib.jar");
        let (total, on_bytes) = byte_counter();
        let url = format!("{}/lib.jar", server.uri());

        fetcher()
            .download_file(&url, &dest, Some(&sha1_hex(b"library")), &on_bytes, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"library");
        assert_eq!(total.load(Ordering::SeqCst), 7);
        assert!(validate_sha1(&dest, &sha1_hex(b"library").to_uppercase()).await.unwrap());
    }

    #[tokio::test]
    async fn hash_mismatch_is_retried_once_and_rolls_back_bytes() {
        let server = MockServer::start().await;
        let calls = Arc::new(AtomicUsize::new(0));
        Mock::given(method("GET"))
            .and(path("/a.bin"))
            .respond_with(CorruptOnce {
                calls: calls.clone(),
                body: b"payload".to_vec(),
            })
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.bin");
        let (total, on_bytes) = byte_counter();

        fetcher()
            .download_file(
                &format!("{}/a.bin", server.uri()),
                &dest,
                Some(&sha1_hex(b"payload")),
                &on_bytes,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(total.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn absence_is_not_retried_and_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.jar");
        let (_, on_bytes) = byte_counter();

        let err = fetcher()
            .download_file(
                &format!("{}/missing.jar", server.uri()),
                &dest,
                Some("00"),
                &on_bytes,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn mirror_list_falls_back_to_the_next_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/official/x.txt"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mirror/x.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("x.txt");
        let (total, on_bytes) = byte_counter();
        let urls = vec![
            format!("{}/official/x.txt", server.uri()),
            format!("{}/mirror/x.txt", server.uri()),
        ];

        fetcher()
            .download_from_mirror_list(&urls, &dest, None, on_bytes, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "hello");
        assert_eq!(total.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x"))
            .expect(0)
            .mount(&server)
            .await;

        let token = CancellationToken::new();
        token.cancel();
        let dir = tempfile::tempdir().unwrap();
        let (_, on_bytes) = byte_counter();

        let err = fetcher()
            .download_file(&format!("{}/x", server.uri()), &dir.path().join("x"), None, &on_bytes, &token)
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
    }

    #[tokio::test]
    async fn fetch_string_tries_urls_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let urls = vec![format!("{}/a", server.uri()), format!("{}/b", server.uri())];
        assert_eq!(fetcher().fetch_string_from_urls(&urls).await.unwrap(), "{}");
    }

    #[test]
    fn relative_paths_are_split_on_slashes() {
        let joined = join_relative(Path::new("/root"), "minecraft/sounds/a.ogg").unwrap();
        assert_eq!(joined, Path::new("/root").join("minecraft").join("sounds").join("a.ogg"));

        let leading = join_relative(Path::new("/root"), "/etc/./evil").unwrap();
        assert_eq!(leading, Path::new("/root").join("etc").join("evil"));
    }

    #[test]
    fn relative_paths_cannot_leave_the_base() {
        let base = Path::new("/games/assets");
        assert_eq!(join_relative(base, "../../../etc/evil"), None);
        assert_eq!(join_relative(base, "sounds/../../evil"), None);
        #[cfg(windows)]
        assert_eq!(join_relative(base, "C:\\evil"), None);
    }
}
