// ─── Concurrent Download Engine ───
// Bounded parallel downloads with verify-before-fetch and one retry pass.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::config::DownloadConfig;
use crate::core::error::{FailedDownload, LauncherError, LauncherResult};
use crate::core::task::Task;

use super::client::FileFetcher;
use super::download_task::{DownloadTask, FileOutcome};
use super::progress::{DownloadCounters, DownloadListener};

/// Everything scheduled for one download operation.
#[derive(Debug, Default)]
pub struct DownloadPlan {
    tasks: Vec<DownloadTask>,
    counters: Arc<DownloadCounters>,
}

impl DownloadPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task and count it towards the totals.
    pub fn schedule(&mut self, task: DownloadTask) {
        self.counters.schedule(task.size);
        self.tasks.push(task);
    }

    pub fn tasks(&self) -> &[DownloadTask] {
        &self.tasks
    }

    /// Planned task whose destination is `target`.
    pub fn find_mut(&mut self, target: &std::path::Path) -> Option<&mut DownloadTask> {
        self.tasks.iter_mut().find(|t| t.target == target)
    }

    pub fn counters(&self) -> &Arc<DownloadCounters> {
        &self.counters
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Message codes published while each pass runs.
#[derive(Debug, Clone, Copy)]
pub struct PassMessages {
    pub download: &'static str,
    pub retry: &'static str,
}

pub struct DownloadEngine {
    fetcher: FileFetcher,
    max_download_threads: usize,
    verify_integrity: bool,
    progress_interval: Duration,
}

impl DownloadEngine {
    pub fn new(fetcher: FileFetcher, config: &DownloadConfig) -> Self {
        Self {
            fetcher,
            max_download_threads: config.max_download_threads,
            verify_integrity: config.verify_integrity,
            progress_interval: config.progress_interval(),
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.max_download_threads = n;
        self
    }

    pub fn fetcher(&self) -> &FileFetcher {
        &self.fetcher
    }

    /// Run every planned task, then retry the failed subset exactly once.
    ///
    /// Files still failing after the retry pass end the operation with
    /// [`LauncherError::DownloadsExhausted`].
    pub async fn run(
        &self,
        plan: &DownloadPlan,
        task: &Arc<Task>,
        messages: PassMessages,
        token: &CancellationToken,
    ) -> LauncherResult<()> {
        if plan.is_empty() {
            return Ok(());
        }

        info!(
            "Starting download: {} files, concurrency={}",
            plan.len(),
            self.max_download_threads
        );
        let failed = self
            .download_all(plan.tasks(), &plan.counters, task, messages.download, token)
            .await?;
        if failed.is_empty() {
            return Ok(());
        }

        warn!("{} file(s) failed, retrying once", failed.len());
        let retry_bytes = failed.iter().map(|t| t.size).sum();
        plan.counters.reset_for_retry(failed.len() as u64, retry_bytes);

        let still_failed = self
            .download_all(&failed, &plan.counters, task, messages.retry, token)
            .await?;
        if still_failed.is_empty() {
            return Ok(());
        }

        error!("{} file(s) still failed after retrying", still_failed.len());
        Err(LauncherError::DownloadsExhausted {
            failed: still_failed
                .into_iter()
                .map(|t| FailedDownload {
                    target: t.target,
                    urls: t.urls,
                })
                .collect(),
        })
    }

    /// One pass. Returns the tasks that failed, in plan order.
    async fn download_all(
        &self,
        tasks: &[DownloadTask],
        counters: &Arc<DownloadCounters>,
        task: &Arc<Task>,
        message: &'static str,
        token: &CancellationToken,
    ) -> LauncherResult<Vec<DownloadTask>> {
        let semaphore = Arc::new(Semaphore::new(self.max_download_threads.max(1)));
        let mut workers = JoinSet::new();

        for (index, download) in tasks.iter().cloned().enumerate() {
            let semaphore = semaphore.clone();
            let fetcher = self.fetcher.clone();
            let listener: Arc<dyn DownloadListener> = counters.clone();
            let token = token.clone();
            let verify = self.verify_integrity;

            workers.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let result = match permit {
                    Some(_permit) => download.download(&fetcher, verify, listener, &token).await,
                    None => Err(LauncherError::Cancelled),
                };
                (index, download, result)
            });
        }

        let poller = tokio::spawn(publish_progress(
            task.clone(),
            counters.clone(),
            message,
            self.progress_interval,
        ));

        let mut failed: Vec<(usize, DownloadTask)> = Vec::new();
        let mut fatal: Option<LauncherError> = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((_, _, Ok(FileOutcome::Done))) => {}
                Ok((index, download, Ok(FileOutcome::Failed(_)))) => failed.push((index, download)),
                Ok((_, _, Err(e))) => {
                    fatal = Some(e);
                    break;
                }
                Err(join_err) if join_err.is_panic() => {
                    fatal = Some(LauncherError::Other(format!(
                        "Download worker panicked: {}",
                        join_err
                    )));
                    break;
                }
                Err(_) => {
                    fatal = Some(LauncherError::Cancelled);
                    break;
                }
            }
        }

        poller.abort();
        if let Some(e) = fatal {
            workers.abort_all();
            return Err(e);
        }

        publish(task, counters, message);
        failed.sort_by_key(|(index, _)| *index);
        Ok(failed.into_iter().map(|(_, download)| download).collect())
    }
}

/// Periodic aggregate progress, until aborted.
async fn publish_progress(
    task: Arc<Task>,
    counters: Arc<DownloadCounters>,
    message: &'static str,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        publish(&task, &counters, message);
    }
}

fn publish(task: &Task, counters: &DownloadCounters, message: &str) {
    let snapshot = counters.snapshot();
    task.update_progress_with_args(snapshot.fraction(), Some(message), snapshot.message_args());
}
