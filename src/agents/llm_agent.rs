//! LLM Worker：按角色持有 system prompt 与 LLM 客户端
//!
//! process 将 system prompt 与步骤指令拼为消息序列调用 LlmClient；
//! 模型返回非空内容即视为成功。角色 prompt 优先从 config/prompts/<role>.md 加载，
//! 找不到时退回内置默认。

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{Agent, AgentOutcome, SessionContext};
use crate::core::AgentError;
use crate::llm::{LlmClient, Message};

/// 角色化的 LLM Worker
pub struct LlmAgent {
    role: String,
    system_prompt: String,
    llm: Arc<dyn LlmClient>,
}

impl LlmAgent {
    pub fn new(
        role: impl Into<String>,
        system_prompt: impl Into<String>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            role: role.into(),
            system_prompt: system_prompt.into(),
            llm,
        }
    }
}

#[async_trait]
impl Agent for LlmAgent {
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

        let messages = vec![
            Message::system(self.system_prompt.clone()),
            Message::user(prompt.to_string()),
        ];
        let answer = self
            .llm
            .complete(&messages)
            .await
            .map_err(AgentError::LlmError)?;

        let success = !answer.trim().is_empty();
        Ok(AgentOutcome {
            answer,
            reasoning: String::new(),
            success,
        })
    }
}

/// 加载角色的 system prompt：先找 config/prompts/<role>.md（与二进制同目录或上一级），
/// 找不到时用内置默认
pub fn default_system_prompt(role: &str) -> String {
    let candidates = [
        format!("config/prompts/{}.md", role),
        format!("../config/prompts/{}.md", role),
    ];
    candidates
        .iter()
        .find_map(|p| std::fs::read_to_string(p).ok())
        .unwrap_or_else(|| match role {
            "coder" => "You are a coding specialist. Solve the task by writing \
                        complete, working code. Answer with the code and a short \
                        explanation of what it does."
                .to_string(),
            "file" => "You are a file-system specialist. Solve the task by \
                       describing the exact files to create or change and their \
                       full contents."
                .to_string(),
            "web" => "You are a research specialist. Answer the task from your \
                      knowledge, citing what a web search would confirm."
                .to_string(),
            _ => "You are a helpful assistant. Complete the task directly and \
                  concisely."
                .to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[tokio::test]
    async fn test_llm_agent_success_on_content() {
        let agent = LlmAgent::new("coder", "be brief", Arc::new(MockLlmClient));
        let session = SessionContext::default();
        let outcome = agent.process("write hello world", &session).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.answer.contains("write hello world"));
    }

    #[tokio::test]
    async fn test_llm_agent_cancelled_before_call() {
        let agent = LlmAgent::new("coder", "be brief", Arc::new(MockLlmClient));
        let session = SessionContext::default();
        session.cancel_token.cancel();
        assert!(matches!(
            agent.process("anything", &session).await,
            Err(AgentError::Cancelled)
        ));
    }

    #[test]
    fn test_default_prompt_per_role() {
        assert!(default_system_prompt("coder").contains("coding"));
        assert!(default_system_prompt("unknown_role").contains("helpful assistant"));
    }
}
