//! 通知端口：进度/遥测的 fire-and-forget 下沉
//!
//! 调度器在固定的状态机节点（计划创建后、每次 dispatch 前后、运行结束）调用 Notifier；
//! 任何通知失败都在调用点显式吞掉，遥测投递永不中断调度工作。

pub mod broadcast;

pub use broadcast::BroadcastNotifier;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::core::plan::StepSnapshot;

/// 通知失败（会被调度器吞掉，仅日志记录）
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notify channel closed")]
    ChannelClosed,
}

/// 推送给前端/遥测的事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// 运行状态：来源、状态文本、进度 [0,1]、详情
    Status {
        source: String,
        status: String,
        progress: f32,
        details: String,
        timestamp: i64,
    },
    /// 计划快照：每步进度与当前步骤 id
    Plan {
        steps: Vec<StepSnapshot>,
        current_step: u32,
        timestamp: i64,
    },
}

/// 通知端口
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_status(
        &self,
        source: &str,
        status: &str,
        progress: f32,
        details: &str,
    ) -> Result<(), NotifyError>;

    async fn send_plan_update(
        &self,
        steps: Vec<StepSnapshot>,
        current_step: u32,
    ) -> Result<(), NotifyError>;
}

/// 空实现：未接前端时使用
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send_status(
        &self,
        _source: &str,
        _status: &str,
        _progress: f32,
        _details: &str,
    ) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn send_plan_update(
        &self,
        _steps: Vec<StepSnapshot>,
        _current_step: u32,
    ) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_tagged() {
        let event = OrchestratorEvent::Status {
            source: "orchestrator".to_string(),
            status: "running".to_string(),
            progress: 0.5,
            details: "step 1".to_string(),
            timestamp: 0,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains(r#""progress":0.5"#));
    }
}
