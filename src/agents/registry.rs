//! Worker 注册表：角色名 -> Agent 实例
//!
//! 计划合成方给出的角色名可能有噪声（拼写变体、未注册角色），解析采用固定回退顺序
//! 而不是在调用点做零散的字符串匹配：
//! 1. 精确匹配（小写）
//! 2. 默认角色（默认 coder）
//! 3. 前缀匹配（角色名与注册名共享开头字符，至少 3 个）
//! 4. 第一个已注册的 Worker
//!
//! 仅当注册表为空时返回 None；解析失败从不中止步骤。

use std::sync::Arc;

use crate::agents::Agent;

/// 前缀匹配要求的最小公共前缀长度
const PREFIX_MIN_CHARS: usize = 3;

/// 角色名到 Worker 的映射，保持注册顺序以便回退时行为确定
pub struct AgentRegistry {
    agents: Vec<(String, Arc<dyn Agent>)>,
    default_role: String,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: Vec::new(),
            default_role: "coder".to_string(),
        }
    }

    pub fn with_default_role(mut self, role: impl Into<String>) -> Self {
        self.default_role = role.into().to_lowercase();
        self
    }

    /// 注册一个 Worker，键为其 role()（小写）；同名注册覆盖旧实例
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        let name = agent.role().to_lowercase();
        if let Some(slot) = self.agents.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = agent;
        } else {
            self.agents.push((name, agent));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// 已注册的角色名列表（注册顺序）
    pub fn roles(&self) -> Vec<&str> {
        self.agents.iter().map(|(n, _)| n.as_str()).collect()
    }

    fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, a)| a.clone())
    }

    /// 前缀回退：短者是长者的前缀且公共长度 >= PREFIX_MIN_CHARS
    fn prefix_match(&self, role: &str) -> Option<Arc<dyn Agent>> {
        self.agents
            .iter()
            .find(|(n, _)| {
                let shared = n.len().min(role.len());
                shared >= PREFIX_MIN_CHARS && (n.starts_with(role) || role.starts_with(n.as_str()))
            })
            .map(|(_, a)| a.clone())
    }

    /// 按文档化的回退顺序解析角色；仅空注册表返回 None
    pub fn resolve(&self, role: &str) -> Option<Arc<dyn Agent>> {
        let role = role.trim().to_lowercase();
        self.get(&role)
            .or_else(|| self.get(&self.default_role))
            .or_else(|| self.prefix_match(&role))
            .or_else(|| self.agents.first().map(|(_, a)| a.clone()))
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::EchoAgent;

    fn registry_with(roles: &[&str]) -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        for role in roles {
            registry.register(Arc::new(EchoAgent::new(*role)));
        }
        registry
    }

    #[test]
    fn test_resolve_exact() {
        let registry = registry_with(&["coder", "web"]);
        assert_eq!(registry.resolve("web").unwrap().role(), "web");
        // 大小写不敏感
        assert_eq!(registry.resolve("WEB").unwrap().role(), "web");
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        let registry = registry_with(&["web", "coder"]);
        assert_eq!(registry.resolve("juggler").unwrap().role(), "coder");
    }

    #[test]
    fn test_resolve_prefix_when_no_default() {
        // 默认角色 coder 未注册时走前缀匹配
        let registry = registry_with(&["web", "file"]);
        assert_eq!(registry.resolve("web_search").unwrap().role(), "web");
        assert_eq!(registry.resolve("fil").unwrap().role(), "file");
    }

    #[test]
    fn test_resolve_last_resort_first_registered() {
        let registry = registry_with(&["casual"]);
        assert_eq!(registry.resolve("zzz").unwrap().role(), "casual");
    }

    #[test]
    fn test_empty_registry_resolves_none() {
        let registry = AgentRegistry::new();
        assert!(registry.resolve("coder").is_none());
    }

    #[test]
    fn test_register_replaces_same_role() {
        let mut registry = registry_with(&["coder"]);
        registry.register(Arc::new(EchoAgent::new("coder")));
        assert_eq!(registry.roles(), vec!["coder"]);
    }
}
