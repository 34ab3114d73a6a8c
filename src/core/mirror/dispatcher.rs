// ─── Mirror Fallback Dispatcher ───
// Tries equivalent sources in order and returns the first success.

use std::future::Future;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult, SourceFailures};

/// What to do once a source reports definite absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsencePolicy {
    /// Other mirrors of the same resource would agree; stop here.
    StopOnAbsence,
    /// Keep going. Used when candidates are not true mirrors of each other.
    TryAll,
}

impl AbsencePolicy {
    pub fn from_config(stop_on_absence: bool) -> Self {
        if stop_on_absence {
            AbsencePolicy::StopOnAbsence
        } else {
            AbsencePolicy::TryAll
        }
    }
}

/// One equivalent source of a logical operation.
pub struct MirrorSource<T> {
    pub name: String,
    /// Waited before this source is tried.
    pub delay: Duration,
    block: Box<dyn FnOnce() -> BoxFuture<'static, LauncherResult<T>> + Send>,
}

impl<T> MirrorSource<T> {
    pub fn new<F, Fut>(name: impl Into<String>, block: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = LauncherResult<T>> + Send + 'static,
    {
        Self {
            name: name.into(),
            delay: Duration::ZERO,
            block: Box::new(move || Box::pin(block())),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Run `sources` in order until one succeeds.
///
/// Cancellation is returned as-is without trying further sources. When every
/// source fails the result is `SourcesExhausted` with the last failure as the
/// primary cause.
pub async fn run_mirrorable<T>(sources: Vec<MirrorSource<T>>, policy: AbsencePolicy) -> LauncherResult<T> {
    if sources.is_empty() {
        return Err(LauncherError::Precondition(
            "mirror dispatcher needs at least one source".into(),
        ));
    }

    let mut failures: Vec<LauncherError> = Vec::new();
    for source in sources {
        if !source.delay.is_zero() {
            tokio::time::sleep(source.delay).await;
        }

        match (source.block)().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_cancellation() => return Err(e),
            Err(e) => {
                debug!("Source {} failed: {}", source.name, e);
                let absent = e.is_not_found();
                failures.push(e);
                if absent && policy == AbsencePolicy::StopOnAbsence {
                    break;
                }
            }
        }
    }

    // At least one source ran and failed to get here.
    let primary = failures.pop().unwrap_or(LauncherError::Cancelled);
    Err(LauncherError::SourcesExhausted(SourceFailures {
        primary: Box::new(primary),
        suppressed: failures,
    }))
}

/// Run `op` once per URL, in order, through [`run_mirrorable`].
pub async fn run_mirrorable_urls<T, F, Fut>(
    urls: &[String],
    policy: AbsencePolicy,
    op: F,
) -> LauncherResult<T>
where
    F: Fn(String) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = LauncherResult<T>> + Send + 'static,
    T: 'static,
{
    let sources = urls
        .iter()
        .map(|url| {
            let op = op.clone();
            let url = url.clone();
            MirrorSource::new(url.clone(), move || op(url))
        })
        .collect();
    run_mirrorable(sources, policy).await
}
