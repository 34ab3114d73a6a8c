// ─── Task Flow Executor ───
// Runs phases strictly in order; tasks inside a phase run one at a time,
// each in its own child cancellation scope.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};

use super::outcome::{CancelNotice, FlowHooks, TaskOutcome};
use super::task::{Task, TaskState};

pub type PhaseCallback = Arc<dyn Fn() -> BoxFuture<'static, LauncherResult<()>> + Send + Sync>;

/// A task plus the title shown for it.
#[derive(Debug, Clone)]
pub struct TitledTask {
    pub title: String,
    pub task: Arc<Task>,
}

impl TitledTask {
    pub fn new(title: impl Into<String>, task: Task) -> Self {
        Self {
            title: title.into(),
            task: Arc::new(task),
        }
    }
}

/// One phase of a flow: its tasks and an optional completion callback.
#[derive(Clone, Default)]
pub struct TaskPhase {
    pub tasks: Vec<TitledTask>,
    pub on_complete: Option<PhaseCallback>,
}

impl TaskPhase {
    pub fn new(tasks: Vec<TitledTask>) -> Self {
        Self {
            tasks,
            on_complete: None,
        }
    }

    pub fn on_complete<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LauncherResult<()>> + Send + 'static,
    {
        self.on_complete = Some(Arc::new(move || Box::pin(f())));
        self
    }
}

/// Build a phase by pushing its tasks.
pub fn build_phase(build: impl FnOnce(&mut Vec<TitledTask>)) -> TaskPhase {
    let mut tasks = Vec::new();
    build(&mut tasks);
    TaskPhase::new(tasks)
}

#[derive(Default)]
struct FlowState {
    flow_token: Option<CancellationToken>,
    current_task_token: Option<CancellationToken>,
    job: Option<JoinHandle<()>>,
    phase_index: isize,
}

pub struct TaskFlowExecutor {
    parent: CancellationToken,
    phases: Mutex<Vec<TaskPhase>>,
    tasks: watch::Sender<Vec<TitledTask>>,
    state: Mutex<FlowState>,
}

impl TaskFlowExecutor {
    /// `parent` is the engine-level scope this flow hangs off.
    pub fn new(parent: &CancellationToken) -> Self {
        let (tasks, _) = watch::channel(Vec::new());
        Self {
            parent: parent.clone(),
            phases: Mutex::new(Vec::new()),
            tasks,
            state: Mutex::new(FlowState {
                phase_index: -1,
                ..FlowState::default()
            }),
        }
    }

    pub fn add_phase(&self, phase: TaskPhase) {
        lock(&self.phases).push(phase);
    }

    pub fn add_phases(&self, phases: impl IntoIterator<Item = TaskPhase>) {
        lock(&self.phases).extend(phases);
    }

    /// Tasks of the phase currently executing.
    pub fn subscribe(&self) -> watch::Receiver<Vec<TitledTask>> {
        self.tasks.subscribe()
    }

    pub fn current_tasks(&self) -> Vec<TitledTask> {
        self.tasks.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state)
            .job
            .as_ref()
            .map(|job| !job.is_finished())
            .unwrap_or(false)
    }

    /// Run every phase to exhaustion, stopping at the first failure or
    /// cancellation.
    pub async fn execute_phases(&self) -> TaskOutcome {
        let flow_token = self.begin_flow();
        self.run_flow(&flow_token).await
    }

    /// Spawn the flow, running `on_start` first and dispatching the outcome
    /// to `hooks` at the end.
    ///
    /// The flow's scope exists before `on_start` runs, so `cancel()` also
    /// interrupts the start callback.
    pub fn execute_phases_async<S>(self: &Arc<Self>, on_start: S, hooks: FlowHooks)
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let executor = Arc::clone(self);
        let flow_token = self.begin_flow();
        let job = tokio::spawn(async move {
            let started = tokio::select! {
                biased;
                _ = flow_token.cancelled() => false,
                _ = on_start => true,
            };
            let outcome = if started {
                executor.run_flow(&flow_token).await
            } else {
                debug!("The current task flow has been cancelled before it started");
                TaskOutcome::Cancelled
            };
            hooks.dispatch(&outcome);
        });
        lock(&self.state).job = Some(job);
    }

    /// Cancel the running task's scope, then the flow's scope, then reset
    /// the published state.
    ///
    /// The spawned job is left to unwind so the cancel hooks still run;
    /// `is_running` stays true until it has.
    pub fn cancel(&self) {
        {
            let mut state = lock(&self.state);
            if let Some(token) = state.current_task_token.take() {
                token.cancel();
            }
            if let Some(token) = state.flow_token.take() {
                token.cancel();
            }
            state.phase_index = -1;
        }
        self.tasks.send_replace(Vec::new());
    }

    fn begin_flow(&self) -> CancellationToken {
        let mut state = lock(&self.state);
        let token = self.parent.child_token();
        state.flow_token = Some(token.clone());
        state.phase_index = -1;
        token
    }

    async fn run_flow(&self, flow_token: &CancellationToken) -> TaskOutcome {
        let outcome = TaskOutcome::from_result(self.run_phases(flow_token).await);
        match &outcome {
            TaskOutcome::Completed => debug!("Task flow completed"),
            TaskOutcome::Cancelled => debug!("The current task flow has been cancelled"),
            TaskOutcome::Failed(e) => warn!("An error occurred while executing the task flow: {}", e),
        }
        outcome
    }

    async fn run_phases(&self, flow_token: &CancellationToken) -> LauncherResult<()> {
        loop {
            ensure_active(flow_token)?;
            let Some(phase) = self.next_phase() else {
                break;
            };
            self.tasks.send_replace(phase.tasks.clone());

            for titled in &phase.tasks {
                ensure_active(flow_token)?;
                debug!("Running task flow step: {}", titled.title);
                self.run_task(&titled.task, flow_token).await?;
            }

            if let Some(on_complete) = &phase.on_complete {
                tokio::select! {
                    biased;
                    _ = flow_token.cancelled() => return Err(LauncherError::Cancelled),
                    res = on_complete() => res?,
                }
            }
        }
        Ok(())
    }

    async fn run_task(&self, task: &Arc<Task>, flow_token: &CancellationToken) -> LauncherResult<()> {
        task.set_state(TaskState::Running);

        let task_token = flow_token.child_token();
        lock(&self.state).current_task_token = Some(task_token.clone());

        let run = AssertUnwindSafe(task.run(task_token.clone())).catch_unwind();
        let result = tokio::select! {
            biased;
            _ = task_token.cancelled() => Err(LauncherError::Cancelled),
            res = run => res.unwrap_or_else(|_| {
                Err(LauncherError::Other(format!("Task {} panicked", task.id())))
            }),
        };

        let outcome = TaskOutcome::from_result(result);
        task.hooks().dispatch(&outcome, CancelNotice::Invoke);

        // Discard the private scope so any leftover children stop.
        task_token.cancel();
        lock(&self.state).current_task_token = None;

        if outcome.is_completed() {
            task.set_state(TaskState::Completed);
        }
        outcome.into_result()
    }

    fn next_phase(&self) -> Option<TaskPhase> {
        let index = {
            let mut state = lock(&self.state);
            state.phase_index += 1;
            state.phase_index
        };
        usize::try_from(index)
            .ok()
            .and_then(|i| lock(&self.phases).get(i).cloned())
    }
}

fn ensure_active(token: &CancellationToken) -> LauncherResult<()> {
    if token.is_cancelled() {
        Err(LauncherError::Cancelled)
    } else {
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
