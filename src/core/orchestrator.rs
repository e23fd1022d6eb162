//! 自主执行调度器：主控循环
//!
//! 驱动 ExecutionPlan 到完成：按插入顺序选取可调度步骤、派发给 Worker、根据结果推进状态机、
//! 永久失败时合成恢复步骤、结构性死锁强制排空、全局迭代预算保证终止。
//! 单逻辑线程：每轮恰好处理一个步骤，仅在等待 Worker 的 dispatch 调用时挂起；
//! 计划只由本循环变更，next_eligible 是对快照的纯查询。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agents::{AgentRegistry, SessionContext};
use crate::core::plan::{ExecutionPlan, StepStatus, TaskInfo, TaskStep};
use crate::core::recovery::{synthesize_recovery, CIRCUIT_BREAKER_THRESHOLD};
use crate::memory::{MemorySink, NoopSink};
use crate::notify::{NoopNotifier, Notifier};

/// 依赖结果在 prompt 中的截断长度（公开契约的一部分）
pub const RESULT_PREVIEW_CHARS: usize = 500;
/// 失败详情在重试警告中的截断长度（公开契约的一部分）
pub const ERROR_PREVIEW_CHARS: usize = 300;
/// 全局迭代预算：初始步骤数的倍数；吸收恢复步骤增长的同时保证病态反复失败下也会终止
pub const ITERATION_FACTOR: usize = 4;
/// 总结中展示的反思日志条数
pub const REFLECTION_TAIL: usize = 5;
/// 状态通知中的详情截断长度
const DETAIL_PREVIEW_CHARS: usize = 100;

/// 一次运行的最终报告
#[derive(Debug)]
pub struct RunReport {
    /// 运行结束时的完整计划（含恢复步骤与反思日志）
    pub plan: ExecutionPlan,
    pub completed: usize,
    pub total: usize,
    /// 最后一次成功步骤的输出；无成功为空
    pub final_answer: String,
    /// 渲染后的文本总结
    pub summary: String,
}

/// 自主执行调度器
pub struct AutonomousOrchestrator {
    registry: AgentRegistry,
    notifier: Arc<dyn Notifier>,
    memory: Arc<dyn MemorySink>,
}

impl AutonomousOrchestrator {
    pub fn new(registry: AgentRegistry) -> Self {
        Self {
            registry,
            notifier: Arc::new(NoopNotifier),
            memory: Arc::new(NoopSink),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemorySink>) -> Self {
        self.memory = memory;
        self
    }

    /// 入口：从目标与任务列表构建计划并运行到结束，总是返回报告而非错误
    pub async fn run_loop(
        &self,
        goal: &str,
        tasks: &[(String, TaskInfo)],
        cancel: CancellationToken,
    ) -> RunReport {
        let plan = ExecutionPlan::from_tasks(goal, tasks);
        self.run_plan(plan, cancel).await
    }

    /// 在已构建的计划上运行主循环（测试与高级调用方使用；迭代预算按进入时的步骤数计）
    pub async fn run_plan(&self, mut plan: ExecutionPlan, cancel: CancellationToken) -> RunReport {
        let initial_steps = plan.steps.len();
        let session = SessionContext::new(cancel.clone());
        info!(goal = %plan.goal, steps = initial_steps, run_id = %session.run_id, "plan created");

        self.notify_status("autonomous run started", 0.0, &format!("{} steps", initial_steps))
            .await;
        self.notify_plan(&plan, 0).await;

        let max_iterations = initial_steps * ITERATION_FACTOR;
        let mut iteration = 0usize;
        let mut consecutive_failures = 0u32;
        let mut final_answer = String::new();

        while !plan.is_complete() && iteration < max_iterations {
            if cancel.is_cancelled() {
                plan.reflection_log.push("Run cancelled by caller".to_string());
                break;
            }

            let Some(idx) = plan.next_eligible() else {
                if plan.has_pending() {
                    // 结构性死锁：剩余 pending 步骤的前置永久失败，永远无法变为可调度
                    let forced = plan.fail_pending_as_deadlocked();
                    warn!(?forced, "dependency deadlock, forcing remaining steps to failed");
                    for id in forced {
                        plan.reflection_log
                            .push(format!("Step {} failed: dependency deadlock", id));
                    }
                    continue;
                }
                break;
            };

            iteration += 1;
            let step_id = plan.steps[idx].id;
            let total = plan.steps.len();
            let details = truncate_chars(&plan.steps[idx].description, DETAIL_PREVIEW_CHARS);
            self.notify_status(
                &format!("Step {}/{}", step_id, total),
                step_id as f32 / total as f32,
                &details,
            )
            .await;
            self.notify_plan(&plan, step_id).await;

            let prompt = self.build_prompt(&plan, idx);
            plan.steps[idx].status = StepStatus::Running;
            let (result, success) = self.dispatch(&plan.steps[idx], &prompt, &session).await;
            if success {
                final_answer = result.clone();
            }
            let new_status = self.reflect(&mut plan, idx, result, success, &mut consecutive_failures);

            // 熔断阈值之下才为永久失败合成恢复步骤
            if new_status == StepStatus::Failed && consecutive_failures < CIRCUIT_BREAKER_THRESHOLD {
                let recovery = synthesize_recovery(&plan, &plan.steps[idx]);
                info!(
                    failed_step = step_id,
                    recovery_id = recovery.id,
                    role = %recovery.role,
                    "plan revised with recovery step"
                );
                plan.steps.push(recovery);
            }

            self.notify_plan(&plan, step_id).await;
        }

        let completed = plan.completed_count();
        let total = plan.steps.len();
        let elapsed = plan.elapsed_secs();
        info!(completed, total, "run finished in {:.1}s", elapsed);

        self.notify_status(&format!("Finished: {}/{}", completed, total), 1.0, "")
            .await;

        let summary = render_summary(&plan, &final_answer);
        if let Err(e) = self.memory.store_project(
            &plan.goal,
            "autonomous_run",
            "",
            &format!("{}/{} steps completed in {:.1}s", completed, total, elapsed),
            if completed == total { "completed" } else { "partial" },
        ) {
            warn!("store_project failed: {}", e);
        }

        RunReport {
            completed,
            total,
            final_answer,
            summary,
            plan,
        }
    }

    /// 组装派发 prompt：依赖结果上下文 + 记忆建议块 + 重试警告 + 任务描述
    fn build_prompt(&self, plan: &ExecutionPlan, idx: usize) -> String {
        let step = &plan.steps[idx];
        let mut sections: Vec<String> = Vec::new();

        // 上下文：声明了依赖用依赖结果，否则用所有更早的已完成步骤
        let sources: Vec<&TaskStep> = if step.dependencies.is_empty() {
            plan.steps
                .iter()
                .filter(|s| s.id < step.id && s.status == StepStatus::Completed)
                .collect()
        } else {
            plan.steps
                .iter()
                .filter(|s| step.dependencies.contains(&s.id) && s.status == StepStatus::Completed)
                .collect()
        };
        if !sources.is_empty() {
            let lines: Vec<String> = sources
                .iter()
                .map(|s| {
                    format!(
                        "- Result of step {}: {}",
                        s.id,
                        truncate_chars(&s.result, RESULT_PREVIEW_CHARS)
                    )
                })
                .collect();
            sections.push(format!("Context from previous steps:\n{}", lines.join("\n")));
        }

        // 记忆建议块：检索失败不影响派发
        match self.memory.context_for_prompt(&step.description) {
            Ok(block) if !block.is_empty() => sections.push(block.trim_end().to_string()),
            Ok(_) => {}
            Err(e) => warn!("memory context lookup failed: {}", e),
        }

        // 重试警告：引用上次失败，要求换一条路
        if step.attempts > 0 && !step.error.is_empty() {
            sections.push(format!(
                "WARNING: the previous attempt failed with:\n{}\nDo not repeat the failed approach; try a different one.",
                truncate_chars(&step.error, ERROR_PREVIEW_CHARS)
            ));
        }

        sections.push(format!("Your task:\n{}", step.description));
        sections.join("\n\n")
    }

    /// 派发一个步骤：解析角色并调用 Worker；任何 Worker 错误都转为 (错误文本, false)，
    /// 绝不向主循环传播异常
    async fn dispatch(
        &self,
        step: &TaskStep,
        prompt: &str,
        session: &SessionContext,
    ) -> (String, bool) {
        let Some(agent) = self.registry.resolve(&step.role) else {
            return ("Error: no workers registered".to_string(), false);
        };
        info!(step = step.id, role = %step.role, worker = %agent.role(), "dispatching step");
        match agent.process(prompt, session).await {
            Ok(outcome) => (outcome.answer, outcome.success),
            Err(e) => (format!("Error: {}", e), false),
        }
    }

    /// 解读派发结果并推进状态机：成功 -> completed 且重置连续失败计数并落一条事实；
    /// 失败 -> attempts+1，达到上限永久失败，否则回 pending 等待重试。返回步骤新状态。
    fn reflect(
        &self,
        plan: &mut ExecutionPlan,
        idx: usize,
        result: String,
        success: bool,
        consecutive_failures: &mut u32,
    ) -> StepStatus {
        let step_id = plan.steps[idx].id;
        let new_status;
        let reflection = if success {
            *consecutive_failures = 0;
            let description = plan.steps[idx].description.clone();
            plan.record_success(idx, result.clone());
            new_status = StepStatus::Completed;
            if let Err(e) = self.memory.store_fact(
                "success",
                &format!("{}: {}", description, truncate_chars(&result, RESULT_PREVIEW_CHARS)),
                &format!("step {}", step_id),
            ) {
                warn!("store_fact failed: {}", e);
            }
            format!("Step {} succeeded: {}", step_id, description)
        } else {
            *consecutive_failures += 1;
            new_status = plan.record_failure(idx, result);
            let step = &plan.steps[idx];
            match new_status {
                StepStatus::Failed => format!(
                    "Step {} failed after {} attempts: {}",
                    step_id, step.max_attempts, step.description
                ),
                _ => format!(
                    "Step {} failed (attempt {}/{}), will retry",
                    step_id, step.attempts, step.max_attempts
                ),
            }
        };
        info!("{}", reflection);
        plan.reflection_log.push(reflection);
        new_status
    }

    /// 通知失败是显式 no-op 分支：遥测投递永不中断调度
    async fn notify_status(&self, status: &str, progress: f32, details: &str) {
        if let Err(e) = self
            .notifier
            .send_status("orchestrator", status, progress, details)
            .await
        {
            warn!("notify_status dropped: {}", e);
        }
    }

    async fn notify_plan(&self, plan: &ExecutionPlan, current_step: u32) {
        if let Err(e) = self
            .notifier
            .send_plan_update(plan.snapshots(), current_step)
            .await
        {
            warn!("notify_plan dropped: {}", e);
        }
    }
}

/// 渲染运行总结：进度表、耗时、成功率、最近反思、最终结果
fn render_summary(plan: &ExecutionPlan, final_answer: &str) -> String {
    let completed = plan.completed_count();
    let total = plan.steps.len();
    let mut out = String::new();
    out.push_str(&plan.progress_text());
    out.push_str("\n\n---\n");
    out.push_str(&format!("Elapsed: {:.1}s\n", plan.elapsed_secs()));
    out.push_str(&format!("Success: {}/{} steps\n", completed, total));
    if !plan.reflection_log.is_empty() {
        let tail_start = plan.reflection_log.len().saturating_sub(REFLECTION_TAIL);
        out.push_str("Recent reflections:\n");
        for note in &plan.reflection_log[tail_start..] {
            out.push_str(&format!("- {}\n", note));
        }
    }
    if !final_answer.is_empty() {
        out.push_str(&format!("\n**Final result:**\n{}", final_answer));
    }
    out
}

/// 按字符数截断，超出追加省略号
fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::EchoAgent;
    use crate::memory::InMemorySink;

    fn orchestrator() -> AutonomousOrchestrator {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(EchoAgent::new("coder")));
        AutonomousOrchestrator::new(registry)
    }

    fn two_step_plan() -> ExecutionPlan {
        let mut plan = ExecutionPlan::new("goal");
        let mut first = TaskStep::new(1, "collect data", "web");
        first.status = StepStatus::Completed;
        first.result = "x".repeat(600);
        plan.steps.push(first);
        let mut second = TaskStep::new(2, "write report", "coder");
        second.dependencies = vec![1];
        plan.steps.push(second);
        plan
    }

    #[test]
    fn test_build_prompt_includes_dependency_results_truncated() {
        let orch = orchestrator();
        let plan = two_step_plan();
        let prompt = orch.build_prompt(&plan, 1);
        assert!(prompt.contains("Context from previous steps:"));
        assert!(prompt.contains("Result of step 1:"));
        // 500 字符 + 省略号，不把 600 字符全文抄进去
        assert!(prompt.contains(&format!("{}...", "x".repeat(RESULT_PREVIEW_CHARS))));
        assert!(!prompt.contains(&"x".repeat(501)));
        assert!(prompt.ends_with("Your task:\nwrite report"));
    }

    #[test]
    fn test_build_prompt_falls_back_to_all_prior_completed() {
        let orch = orchestrator();
        let mut plan = two_step_plan();
        plan.steps[1].dependencies.clear();
        let prompt = orch.build_prompt(&plan, 1);
        assert!(prompt.contains("Result of step 1:"));
    }

    #[test]
    fn test_build_prompt_retry_warning() {
        let orch = orchestrator();
        let mut plan = two_step_plan();
        plan.steps[1].attempts = 1;
        plan.steps[1].error = "y".repeat(400);
        let prompt = orch.build_prompt(&plan, 1);
        assert!(prompt.contains("WARNING: the previous attempt failed with:"));
        assert!(prompt.contains(&format!("{}...", "y".repeat(ERROR_PREVIEW_CHARS))));
        assert!(prompt.contains("Do not repeat the failed approach"));
    }

    #[test]
    fn test_build_prompt_memory_block() {
        let sink = Arc::new(InMemorySink::default());
        sink.store_fact("success", "the report template lives in docs/", "step 0")
            .unwrap();
        let orch = orchestrator().with_memory(sink);
        let mut plan = ExecutionPlan::new("goal");
        plan.steps.push(TaskStep::new(1, "update the report template", "coder"));
        let prompt = orch.build_prompt(&plan, 0);
        assert!(prompt.contains("Possibly relevant facts from memory:"));
    }

    #[test]
    fn test_reflect_success_resets_counter_and_stores_fact() {
        let sink = Arc::new(InMemorySink::default());
        let orch = orchestrator().with_memory(sink.clone());
        let mut plan = ExecutionPlan::new("goal");
        plan.steps.push(TaskStep::new(1, "do it", "coder"));
        let mut consecutive = 2;
        let status = orch.reflect(&mut plan, 0, "done".to_string(), true, &mut consecutive);
        assert_eq!(status, StepStatus::Completed);
        assert_eq!(consecutive, 0);
        assert_eq!(plan.reflection_log.len(), 1);
        assert!(plan.reflection_log[0].contains("succeeded"));
        assert!(sink.context_for_prompt("do it").unwrap().contains("do it"));
    }

    #[test]
    fn test_reflect_failure_paths() {
        let orch = orchestrator();
        let mut plan = ExecutionPlan::new("goal");
        let mut step = TaskStep::new(1, "do it", "coder");
        step.max_attempts = 2;
        plan.steps.push(step);
        let mut consecutive = 0;

        let status = orch.reflect(&mut plan, 0, "nope".to_string(), false, &mut consecutive);
        assert_eq!(status, StepStatus::Pending);
        assert_eq!(consecutive, 1);
        assert!(plan.reflection_log[0].contains("will retry"));

        let status = orch.reflect(&mut plan, 0, "nope".to_string(), false, &mut consecutive);
        assert_eq!(status, StepStatus::Failed);
        assert_eq!(consecutive, 2);
        assert!(plan.reflection_log[1].contains("failed after 2 attempts"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
    }
}
