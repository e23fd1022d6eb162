//! 核心调度层：计划/步骤数据模型、步骤选取、重试与恢复状态机、死锁与终止保证

pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod recovery;

pub use error::AgentError;
pub use orchestrator::{
    AutonomousOrchestrator, RunReport, ERROR_PREVIEW_CHARS, ITERATION_FACTOR,
    REFLECTION_TAIL, RESULT_PREVIEW_CHARS,
};
pub use plan::{ExecutionPlan, Need, NeedRef, StepSnapshot, StepStatus, TaskInfo, TaskStep};
pub use recovery::{
    alternative_role, synthesize_recovery, CIRCUIT_BREAKER_THRESHOLD, RECOVERY_MAX_ATTEMPTS,
};
