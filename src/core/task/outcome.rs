use std::sync::Arc;

use crate::core::error::{LauncherError, LauncherResult};

pub type ErrorHook = Arc<dyn Fn(&LauncherError) + Send + Sync>;
pub type Hook = Arc<dyn Fn() + Send + Sync>;

/// How a unit of work ended.
#[derive(Debug)]
pub enum TaskOutcome {
    Completed,
    Failed(LauncherError),
    Cancelled,
}

impl TaskOutcome {
    /// Cancellation and interrupted I/O become `Cancelled`, never `Failed`.
    pub fn from_result(result: LauncherResult<()>) -> Self {
        match result {
            Ok(()) => TaskOutcome::Completed,
            Err(e) if e.is_cancellation() => TaskOutcome::Cancelled,
            Err(e) => TaskOutcome::Failed(e),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskOutcome::Cancelled)
    }

    pub fn into_result(self) -> LauncherResult<()> {
        match self {
            TaskOutcome::Completed => Ok(()),
            TaskOutcome::Failed(e) => Err(e),
            TaskOutcome::Cancelled => Err(LauncherError::Cancelled),
        }
    }
}

/// Whether the cancel hook still has to run for a `Cancelled` outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelNotice {
    Invoke,
    AlreadyHandled,
}

/// Per-task hooks.
#[derive(Clone, Default)]
pub struct TaskHooks {
    pub(crate) on_error: Option<ErrorHook>,
    pub(crate) on_finally: Option<Hook>,
    pub(crate) on_cancel: Option<Hook>,
}

impl TaskHooks {
    pub(crate) fn error(&self, e: &LauncherError) {
        if let Some(f) = &self.on_error {
            f(e);
        }
    }

    pub(crate) fn finally(&self) {
        if let Some(f) = &self.on_finally {
            f();
        }
    }

    pub(crate) fn cancel(&self) {
        if let Some(f) = &self.on_cancel {
            f();
        }
    }

    /// Single dispatch point: error or cancel hook first, then `finally`
    /// exactly once.
    pub(crate) fn dispatch(&self, outcome: &TaskOutcome, notice: CancelNotice) {
        match outcome {
            TaskOutcome::Completed => {}
            TaskOutcome::Failed(e) => self.error(e),
            TaskOutcome::Cancelled => {
                if notice == CancelNotice::Invoke {
                    self.cancel();
                }
            }
        }
        self.finally();
    }
}

/// Hooks for a whole flow. `on_complete` only runs when every phase ran to
/// exhaustion.
#[derive(Clone, Default)]
pub struct FlowHooks {
    pub on_complete: Option<Hook>,
    pub on_error: Option<ErrorHook>,
    pub on_cancel: Option<Hook>,
}

impl FlowHooks {
    pub fn on_complete<F: Fn() + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_complete = Some(Arc::new(f));
        self
    }

    pub fn on_error<F: Fn(&LauncherError) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_cancel<F: Fn() + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_cancel = Some(Arc::new(f));
        self
    }

    pub fn dispatch(&self, outcome: &TaskOutcome) {
        let hook = match outcome {
            TaskOutcome::Completed => self.on_complete.as_ref(),
            TaskOutcome::Cancelled => self.on_cancel.as_ref(),
            TaskOutcome::Failed(e) => {
                if let Some(f) = &self.on_error {
                    f(e);
                }
                return;
            }
        };
        if let Some(f) = hook {
            f();
        }
    }
}
