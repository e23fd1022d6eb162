//! Worker 错误类型
//!
//! 跨越 dispatch 边界的错误统一为 AgentError；编排器在 dispatch 处全部捕获并降级为「步骤失败」，
//! 调度器内部不存在会中断 run_loop 的致命错误类别。

use thiserror::Error;

/// Worker 执行过程中可能出现的错误（网络、LLM、取消等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Network timeout")]
    NetworkTimeout,

    #[error("LLM error: {0}")]
    LlmError(String),

    /// 外部停止信号（CancellationToken）已触发
    #[error("Cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),
}
