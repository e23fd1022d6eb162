//! 广播通知：tokio broadcast 通道
//!
//! 向任意多个订阅者（Web/SSE、TUI、日志采集）推送 OrchestratorEvent；
//! 无订阅者时发送失败，由调度器按 fire-and-forget 约定吞掉。

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::core::plan::StepSnapshot;
use crate::notify::{Notifier, NotifyError, OrchestratorEvent};

/// 基于 broadcast 通道的通知实现
pub struct BroadcastNotifier {
    tx: broadcast::Sender<OrchestratorEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<OrchestratorEvent>) {
        let (tx, rx) = broadcast::channel(capacity);
        (Self { tx }, rx)
    }

    /// 追加订阅者
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.tx.subscribe()
    }

    fn send(&self, event: OrchestratorEvent) -> Result<(), NotifyError> {
        self.tx.send(event).map(|_| ()).map_err(|_| NotifyError::ChannelClosed)
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn send_status(
        &self,
        source: &str,
        status: &str,
        progress: f32,
        details: &str,
    ) -> Result<(), NotifyError> {
        self.send(OrchestratorEvent::Status {
            source: source.to_string(),
            status: status.to_string(),
            progress,
            details: details.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }

    async fn send_plan_update(
        &self,
        steps: Vec<StepSnapshot>,
        current_step: u32,
    ) -> Result<(), NotifyError> {
        self.send(OrchestratorEvent::Plan {
            steps,
            current_step,
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscriber() {
        let (notifier, mut rx) = BroadcastNotifier::new(8);
        notifier
            .send_status("orchestrator", "started", 0.0, "2 steps")
            .await
            .unwrap();
        match rx.recv().await.unwrap() {
            OrchestratorEvent::Status { source, status, .. } => {
                assert_eq!(source, "orchestrator");
                assert_eq!(status, "started");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_without_subscriber_errors() {
        let (notifier, rx) = BroadcastNotifier::new(8);
        drop(rx);
        assert!(notifier
            .send_status("orchestrator", "started", 0.0, "")
            .await
            .is_err());
    }
}
