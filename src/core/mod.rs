//! 核心编排层：执行上下文解析、待执行状态、工作流引擎、事件反应器、进程装配

pub mod builder;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod pending;
pub mod reactor;
pub mod workflow;

pub use builder::{Handoff, HandoffBuilder};
pub use context::{resolve_context, ExecutionContext};
pub use error::OrchestratorError;
pub use orchestrator::{Orchestrator, OrchestratorSettings, DEFAULT_SETTLE_DELAY_MS};
pub use pending::{
    ActiveCompaction, CompactionPhase, PendingCompaction, PendingRelay, PendingState,
    PendingStore,
};
pub use reactor::{run_event_loop, ReactorAction};
pub use workflow::{Mode, WorkflowRequest};
