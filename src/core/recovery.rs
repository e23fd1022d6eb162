//! 失败恢复：备选角色替换与恢复步骤合成
//!
//! 某步骤永久失败且连续失败计数未触发熔断时，合成一个恢复步骤：继承原步骤依赖、
//! 角色按固定替换表换成另一种策略（coder<->file、web->casual）、重试上限降低。

use crate::core::plan::{ExecutionPlan, TaskStep};

/// 恢复步骤的重试上限（低于普通步骤的默认值）
pub const RECOVERY_MAX_ATTEMPTS: u32 = 2;

/// 连续失败熔断阈值：达到后不再合成恢复步骤，防止系统性失败下步骤无限增殖
pub const CIRCUIT_BREAKER_THRESHOLD: u32 = 3;

/// 固定的备选角色替换表；表外角色原样保留
pub fn alternative_role(role: &str) -> &str {
    match role {
        "coder" => "file",
        "file" => "coder",
        "web" => "casual",
        other => other,
    }
}

/// 为永久失败的步骤合成恢复步骤：新 id = 当前步骤数 + 1，依赖照抄，角色替换，上限降为 2
pub fn synthesize_recovery(plan: &ExecutionPlan, failed: &TaskStep) -> TaskStep {
    let mut step = TaskStep::new(
        plan.steps.len() as u32 + 1,
        format!(
            "[RECOVERY] Retry with a different approach: {}",
            failed.description
        ),
        alternative_role(&failed.role),
    );
    step.dependencies = failed.dependencies.clone();
    step.max_attempts = RECOVERY_MAX_ATTEMPTS;
    step
}
