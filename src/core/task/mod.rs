// ─── Task Model ───
//   task.rs    — Task identity, observable status, execution context
//   outcome.rs — Closed outcome type + hook dispatch
//   system.rs  — Concurrent task registry
//   flow.rs    — Sequential phase executor

pub mod flow;
pub mod outcome;
pub mod system;
#[allow(clippy::module_inception)]
pub mod task;

pub use flow::{build_phase, TaskFlowExecutor, TaskPhase, TitledTask};
pub use outcome::{FlowHooks, TaskOutcome};
pub use system::TaskSystem;
pub use task::{Task, TaskContext, TaskMessage, TaskState, TaskStatus};
