//! 核心编排层：错误类型、运行状态、重试句柄、任务编排、优雅关闭

pub mod error;
pub mod orchestrator;
pub mod retry;
pub mod shutdown;
pub mod state;

pub use error::{ConfigError, GuardSkip, NotifyError, Step, StepFailure, WorkerError};
pub use orchestrator::{OrchestratorDeps, TaskOrchestrator, TaskSettings};
pub use retry::RetrySlot;
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use state::{Clock, ManualClock, RunState, SystemClock};
