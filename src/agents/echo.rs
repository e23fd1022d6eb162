//! Echo Worker（无需 API Key）
//!
//! 将指令原样回显为成功结果，便于无 Key 场景跑通整条调度链路与测试。

use async_trait::async_trait;

use crate::agents::{Agent, AgentOutcome, SessionContext};
use crate::core::AgentError;

/// 回显上限，避免把整个 prompt 抄进结果
const ECHO_PREVIEW_CHARS: usize = 200;

/// 确定性 Worker：总是成功，回显指令末行
pub struct EchoAgent {
    role: String,
}

impl EchoAgent {
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into() }
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn role(&self) -> &str {
        &self.role
    }

    async fn process(
        &self,
        prompt: &str,
        session: &SessionContext,
    ) -> Result<AgentOutcome, AgentError> {
        if session.cancel_token.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        // prompt 末行即任务描述本体（上下文块在前）
        let task_line = prompt
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("(empty)");
        let preview: String = task_line.chars().take(ECHO_PREVIEW_CHARS).collect();

        Ok(AgentOutcome {
            answer: format!("Echo from {}: {}", self.role, preview),
            reasoning: String::new(),
            success: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_returns_last_line() {
        let agent = EchoAgent::new("casual");
        let session = SessionContext::default();
        let outcome = agent
            .process("Context:\n- step 1: data\n\nYour task:\nsay hello", &session)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.answer, "Echo from casual: say hello");
    }

    #[tokio::test]
    async fn test_echo_respects_cancellation() {
        let agent = EchoAgent::new("casual");
        let session = SessionContext::default();
        session.cancel_token.cancel();
        assert!(matches!(
            agent.process("task", &session).await,
            Err(AgentError::Cancelled)
        ));
    }
}
