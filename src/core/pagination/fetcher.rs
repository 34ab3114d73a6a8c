// ─── Chunked Pagination Fetcher ───
// Fetches a paginated list of unknown length, a window of pages at a time.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::config::PaginationConfig;
use crate::core::error::{LauncherError, LauncherResult};

/// A remote list served page by page.
#[async_trait]
pub trait PageSource: Send + Sync + 'static {
    type Item: Send + 'static;

    /// At most `page_size` items, starting at item offset `index`.
    async fn fetch_page(&self, index: usize, page_size: usize) -> LauncherResult<Vec<Self::Item>>;
}

type PageHandle<T> = JoinHandle<LauncherResult<Vec<T>>>;

/// Page requests of one chunk. Requests still queued when this is dropped
/// are aborted.
struct ChunkRequests<T>(VecDeque<PageHandle<T>>);

impl<T> Drop for ChunkRequests<T> {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaginatedFetcher {
    page_size: usize,
    chunk_size: usize,
    max_concurrent: usize,
}

impl PaginatedFetcher {
    pub fn new(config: &PaginationConfig) -> Self {
        Self {
            page_size: config.page_size.max(1),
            chunk_size: config.chunk_size.max(1),
            max_concurrent: config.max_concurrent.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Fetch every page until one comes back short.
    ///
    /// Requests inside a chunk run concurrently but results are consumed in
    /// page order, so the end is always the first short page. `on_page`
    /// receives `(chunk, page)`, both 1-based, for every non-empty page.
    pub async fn fetch_all<S, F>(
        &self,
        source: Arc<S>,
        on_page: F,
        token: &CancellationToken,
    ) -> LauncherResult<Vec<S::Item>>
    where
        S: PageSource,
        F: Fn(usize, usize) + Send + Sync,
    {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut items = Vec::new();
        let mut chunk = 1;
        let mut start_page = 0;

        loop {
            let mut requests = ChunkRequests(
                (0..self.chunk_size)
                    .map(|offset| self.request_page(&source, &semaphore, start_page + offset, token))
                    .collect(),
            );

            let mut page_index = start_page;
            while let Some(mut handle) = requests.0.pop_front() {
                let joined = tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        handle.abort();
                        return Err(LauncherError::Cancelled);
                    }
                    joined = &mut handle => joined,
                };
                let page = match joined {
                    Ok(page) => page?,
                    Err(e) if e.is_panic() => {
                        return Err(LauncherError::Other(format!("Page request panicked: {}", e)));
                    }
                    Err(_) => return Err(LauncherError::Cancelled),
                };

                let real_size = page.len();
                if real_size > 0 {
                    on_page(chunk, page_index + 1);
                    items.extend(page);
                }
                if real_size < self.page_size {
                    debug!("Reached the last page ({}) in chunk {}", page_index + 1, chunk);
                    return Ok(items);
                }
                page_index += 1;
            }

            start_page += self.chunk_size;
            chunk += 1;
        }
    }

    fn request_page<S: PageSource>(
        &self,
        source: &Arc<S>,
        semaphore: &Arc<Semaphore>,
        page_index: usize,
        token: &CancellationToken,
    ) -> PageHandle<S::Item> {
        let source = source.clone();
        let semaphore = semaphore.clone();
        let token = token.clone();
        let page_size = self.page_size;

        tokio::spawn(async move {
            let _permit = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(LauncherError::Cancelled),
                permit = semaphore.acquire_owned() => permit.map_err(|_| LauncherError::Cancelled)?,
            };
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(LauncherError::Cancelled),
                page = source.fetch_page(page_index * page_size, page_size) => page,
            }
        })
    }
}
