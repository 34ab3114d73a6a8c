// ─── Task System ───
// Registry that runs independent tasks concurrently under one root scope.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::error::LauncherError;

use super::outcome::{CancelNotice, TaskOutcome};
use super::task::{Task, TaskState};

pub type EndedListener = Box<dyn FnOnce() + Send>;

struct Entry {
    /// Distinguishes a resubmitted id from the run it replaced.
    generation: u64,
    task: Arc<Task>,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

struct Inner {
    root: CancellationToken,
    next_generation: AtomicU64,
    entries: Mutex<HashMap<String, Entry>>,
    listeners: Mutex<HashMap<String, EndedListener>>,
    tasks: watch::Sender<Vec<Arc<Task>>>,
}

/// Explicitly constructed registry; clones share the same state.
#[derive(Clone)]
pub struct TaskSystem {
    inner: Arc<Inner>,
}

impl Default for TaskSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSystem {
    pub fn new() -> Self {
        let (tasks, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Inner {
                root: CancellationToken::new(),
                next_generation: AtomicU64::new(0),
                entries: Mutex::new(HashMap::new()),
                listeners: Mutex::new(HashMap::new()),
                tasks,
            }),
        }
    }

    /// Submit and immediately run a task.
    ///
    /// Returns `false` without doing anything if a task with the same id is
    /// already tracked.
    pub fn submit(&self, task: Arc<Task>) -> bool {
        let id = task.id().to_string();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = {
            let mut entries = self.entries();
            if entries.contains_key(&id) {
                debug!("Task {} already submitted, ignoring", id);
                return false;
            }
            let token = self.inner.root.child_token();
            entries.insert(
                id.clone(),
                Entry {
                    generation,
                    task: Arc::clone(&task),
                    token: token.clone(),
                    handle: None,
                },
            );
            token
        };
        self.inner.tasks.send_modify(|list| list.push(Arc::clone(&task)));

        let system = self.clone();
        let handle = tokio::spawn(async move {
            task.set_state(TaskState::Running);
            let run = AssertUnwindSafe(task.run(token.clone())).catch_unwind();
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(LauncherError::Cancelled),
                res = run => res.unwrap_or_else(|_| {
                    Err(LauncherError::Other(format!("Task {} panicked", task.id())))
                }),
            };

            let outcome = TaskOutcome::from_result(result);
            match &outcome {
                TaskOutcome::Completed => task.set_state(TaskState::Completed),
                TaskOutcome::Failed(e) => warn!("Task {} failed: {}", task.id(), e),
                TaskOutcome::Cancelled => debug!("Task {} cancelled", task.id()),
            }
            // The cancel hook belongs to `cancel()`, not to the body.
            task.hooks().dispatch(&outcome, CancelNotice::AlreadyHandled);
            system.on_task_ended(task.id(), generation);
        });

        if let Some(entry) = self.entries().get_mut(&id) {
            entry.handle = Some(handle);
        }
        true
    }

    /// Submit a task and install its ended listener. The listener is
    /// replaced even when the task itself is already running.
    pub fn submit_with_listener<F>(&self, task: Arc<Task>, on_ended: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.put_ended_listener(task.id(), on_ended);
        self.submit(task)
    }

    /// The listener runs once after the task's body and `finally` hook.
    /// Panics raised by the listener are swallowed.
    pub fn put_ended_listener<F>(&self, task_id: &str, on_ended: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.listeners().insert(task_id.to_string(), Box::new(on_ended));
    }

    pub fn remove_ended_listener(&self, task_id: &str) -> bool {
        self.listeners().remove(task_id).is_some()
    }

    /// Cancel a tracked task. The cancel hook and end-of-life cleanup run
    /// right away, even if the body has not yet observed the cancellation.
    pub fn cancel(&self, task_id: &str) -> bool {
        let target = self
            .entries()
            .get(task_id)
            .map(|e| (Arc::clone(&e.task), e.token.clone(), e.generation));
        let Some((task, token, generation)) = target else {
            return false;
        };

        token.cancel();
        self.on_task_cancelled(task, generation);
        true
    }

    pub fn cancel_task(&self, task: &Task) -> bool {
        self.cancel(task.id())
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.entries().contains_key(task_id)
    }

    pub fn running_tasks(&self) -> Vec<Arc<Task>> {
        self.inner.tasks.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Arc<Task>>> {
        self.inner.tasks.subscribe()
    }

    /// Cancel the root scope and forget every task. Meant for application
    /// shutdown: tasks submitted afterwards are cancelled immediately.
    pub fn stop_all(&self) {
        self.inner.root.cancel();
        let drained: Vec<Entry> = self.entries().drain().map(|(_, e)| e).collect();
        for entry in drained {
            if let Some(handle) = entry.handle {
                handle.abort();
            }
        }
        self.listeners().clear();
        self.inner.tasks.send_replace(Vec::new());
        debug!("Task system stopped");
    }

    fn on_task_cancelled(&self, task: Arc<Task>, generation: u64) {
        let hooked = Arc::clone(&task);
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(async move { hooked.hooks().cancel() });
            }
            Err(_) => hooked.hooks().cancel(),
        }
        self.on_task_ended(task.id(), generation);
    }

    /// Cleanup for one submission. A late call from a run that was cancelled
    /// and replaced under the same id leaves the replacement alone.
    fn on_task_ended(&self, task_id: &str, generation: u64) {
        {
            let mut entries = self.entries();
            match entries.get(task_id) {
                Some(entry) if entry.generation == generation => {
                    entries.remove(task_id);
                }
                _ => return,
            }
        }
        self.inner
            .tasks
            .send_modify(|list| list.retain(|t| t.id() != task_id));

        let listener = self.listeners().remove(task_id);
        if let Some(listener) = listener {
            if std::panic::catch_unwind(AssertUnwindSafe(listener)).is_err() {
                warn!("Ended listener for task {} panicked", task_id);
            }
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn listeners(&self) -> MutexGuard<'_, HashMap<String, EndedListener>> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
