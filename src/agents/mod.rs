//! Worker 抽象层
//!
//! Agent trait 是调度器消费的 Worker 契约：process 接收完整 prompt 与会话上下文，
//! 返回 AgentOutcome（answer / reasoning / success）。重试时 prompt 会携带上次失败警告，
//! 实现须可安全重复调用。注册与角色解析见 registry。

pub mod echo;
pub mod llm_agent;
pub mod registry;

pub use echo::EchoAgent;
pub use llm_agent::{default_system_prompt, LlmAgent};
pub use registry::AgentRegistry;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::AgentError;

/// 一次 process 调用的结果；success 即本次调用的成败标志
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub answer: String,
    /// 推理过程（有思考模式的后端填充，否则为空）
    pub reasoning: String,
    pub success: bool,
}

/// 随 dispatch 传递的会话上下文：运行 id 与外部停止信号。
/// 停止信号由 Worker 自行检查；循环本身只在迭代之间检查。
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub run_id: Uuid,
    pub cancel_token: CancellationToken,
}

impl SessionContext {
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            cancel_token,
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

/// Worker 契约：一个可被调度器派发步骤的执行单元
#[async_trait]
pub trait Agent: Send + Sync {
    /// 逻辑角色名（注册表键，小写）
    fn role(&self) -> &str;

    /// 处理一条指令，阻塞直至完成
    async fn process(
        &self,
        prompt: &str,
        session: &SessionContext,
    ) -> Result<AgentOutcome, AgentError>;
}
