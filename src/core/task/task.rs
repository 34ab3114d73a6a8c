// ─── Task ───
// An identity-bearing, cancellable unit of work with observable progress.

use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::error::{LauncherError, LauncherResult};

use super::outcome::TaskHooks;

/// Execution body of a task. Receives a context bound to the task's own
/// cancellation scope.
pub type TaskBody = Arc<dyn Fn(TaskContext) -> BoxFuture<'static, LauncherResult<()>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Preparing,
    Running,
    Completed,
}

/// Message code plus optional format arguments, resolved by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskMessage {
    pub code: String,
    pub args: Vec<String>,
}

/// Snapshot of everything a consumer can observe about a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStatus {
    pub state: TaskState,
    /// In `[-1.0, 1.0]`; `-1.0` means indeterminate.
    pub progress: f32,
    pub message: Option<TaskMessage>,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self {
            state: TaskState::Preparing,
            progress: -1.0,
            message: None,
        }
    }
}

pub struct Task {
    id: String,
    body: TaskBody,
    hooks: TaskHooks,
    status: watch::Sender<TaskStatus>,
}

impl Task {
    /// Create a task. A random id is generated when `id` is `None`.
    pub fn new<F, Fut>(id: Option<String>, body: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LauncherResult<()>> + Send + 'static,
    {
        let (status, _) = watch::channel(TaskStatus::default());
        Self {
            id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            body: Arc::new(move |ctx| Box::pin(body(ctx))),
            hooks: TaskHooks::default(),
            status,
        }
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&LauncherError) + Send + Sync + 'static,
    {
        self.hooks.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_finally<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hooks.on_finally = Some(Arc::new(f));
        self
    }

    pub fn on_cancel<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hooks.on_cancel = Some(Arc::new(f));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn hooks(&self) -> &TaskHooks {
        &self.hooks
    }

    /// Run the body once inside the given cancellation scope.
    pub(crate) fn run(self: &Arc<Self>, token: CancellationToken) -> BoxFuture<'static, LauncherResult<()>> {
        (self.body)(TaskContext {
            task: Arc::clone(self),
            token,
        })
    }

    // ── Observable state ────────────────────────────────

    pub fn status(&self) -> TaskStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskStatus> {
        self.status.subscribe()
    }

    pub fn state(&self) -> TaskState {
        self.status.borrow().state
    }

    pub fn progress(&self) -> f32 {
        self.status.borrow().progress
    }

    pub fn message(&self) -> Option<TaskMessage> {
        self.status.borrow().message.clone()
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.status.send_modify(|s| s.state = state);
    }

    /// Non-finite values coerce to `0.0`, then clamp into `[-1.0, 1.0]`.
    pub fn update_progress(&self, percentage: f32) {
        let value = normalize_progress(percentage);
        self.status.send_modify(|s| s.progress = value);
    }

    /// Update progress and replace the message, clearing its arguments.
    pub fn update_progress_with_message(&self, percentage: f32, message: Option<&str>) {
        self.update_progress_with_args(percentage, message, Vec::new());
    }

    pub fn update_progress_with_args(&self, percentage: f32, message: Option<&str>, args: Vec<String>) {
        let value = normalize_progress(percentage);
        self.status.send_modify(|s| {
            s.progress = value;
            s.message = message.map(|code| TaskMessage {
                code: code.to_string(),
                args,
            });
        });
    }

    pub fn update_message(&self, message: Option<&str>) {
        self.update_message_with_args(message, Vec::new());
    }

    pub fn update_message_with_args(&self, message: Option<&str>, args: Vec<String>) {
        self.status.send_modify(|s| {
            s.message = message.map(|code| TaskMessage {
                code: code.to_string(),
                args,
            });
        });
    }
}

fn normalize_progress(percentage: f32) -> f32 {
    let finite = if percentage.is_finite() { percentage } else { 0.0 };
    finite.clamp(-1.0, 1.0)
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Task {}

impl Hash for Task {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

/// Handle passed to a task body.
#[derive(Clone)]
pub struct TaskContext {
    task: Arc<Task>,
    token: CancellationToken,
}

impl TaskContext {
    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn check_cancelled(&self) -> LauncherResult<()> {
        if self.token.is_cancelled() {
            Err(LauncherError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Spawn child work inside this task's scope. The child stops with
    /// `Cancelled` as soon as the task's scope is cancelled.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<LauncherResult<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(LauncherError::Cancelled),
                out = fut => Ok(out),
            }
        })
    }
}
