//! 计划与步骤数据模型
//!
//! TaskStep（单个委派工作单元，含依赖与重试上限）与 ExecutionPlan（一个目标下的有序步骤集合）。
//! 步骤只会沿 pending -> running -> {completed | pending | failed} 前进，永不删除；
//! next_eligible 是纯查询（&self），与变更互不并发（单线程纪律）。

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// 普通步骤的默认重试上限
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// 步骤状态机：只向前推进
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// 等待调度（含失败后等待重试）
    Pending,
    /// 正在由 Worker 执行
    Running,
    /// 成功完成
    Completed,
    /// 永久失败（重试耗尽或死锁强制）
    Failed,
}

impl StepStatus {
    /// 进度表中的状态图标
    pub fn icon(&self) -> &'static str {
        match self {
            StepStatus::Pending => "...",
            StepStatus::Running => "[~]",
            StepStatus::Completed => "[OK]",
            StepStatus::Failed => "[X]",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个委派工作单元
///
/// id 在计划内唯一且严格递增（含后续追加的恢复步骤）；dependencies 中的 id
/// 若不匹配任何步骤则视为永远无法满足，而不是被忽略。
#[derive(Debug, Clone)]
pub struct TaskStep {
    pub id: u32,
    pub description: String,
    /// 逻辑 Worker 角色（如 coder / file / web），不保证已注册
    pub role: String,
    pub status: StepStatus,
    /// 最近一次成功输出；成功前为空
    pub result: String,
    /// 最近一次失败详情；失败前为空
    pub error: String,
    /// 已失败的 dispatch 次数（成功不计入）
    pub attempts: u32,
    pub max_attempts: u32,
    pub dependencies: Vec<u32>,
}

impl TaskStep {
    pub fn new(id: u32, description: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            role: role.into(),
            status: StepStatus::Pending,
            result: String::new(),
            error: String::new(),
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            dependencies: Vec::new(),
        }
    }
}

/// 通知与进度渲染用的步骤快照（对应 Notifier 的 plan_update 载荷）
#[derive(Debug, Clone, Serialize)]
pub struct StepSnapshot {
    pub id: u32,
    pub description: String,
    pub role: String,
    pub status: StepStatus,
    pub attempts: u32,
}

/// 计划合成输入中的单条任务描述：task（指令）、agent（角色）、need（依赖）
#[derive(Debug, Clone, Deserialize)]
pub struct TaskInfo {
    /// 指令文本；缺省时退回任务名
    #[serde(default)]
    pub task: Option<String>,
    /// Worker 角色，缺省 coder
    #[serde(default = "default_agent")]
    pub agent: String,
    /// 依赖：缺省 / 单个 id 或任务名 / 列表
    #[serde(default)]
    pub need: Need,
}

fn default_agent() -> String {
    "coder".to_string()
}

/// need 字段的宽松表示：计划合成方可能给出数字、字符串数字、任务名或列表
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(untagged)]
pub enum Need {
    #[default]
    None,
    One(NeedRef),
    Many(Vec<NeedRef>),
}

/// 单条依赖引用：步骤 id 或任务名
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NeedRef {
    Id(u32),
    Name(String),
}

impl NeedRef {
    /// 解析为步骤 id；无法解析的引用映射为 0（不匹配任何步骤，等价于永远未满足）
    fn resolve(&self, name_to_id: &HashMap<&str, u32>) -> u32 {
        match self {
            NeedRef::Id(id) => *id,
            NeedRef::Name(s) => s
                .trim()
                .parse::<u32>()
                .ok()
                .or_else(|| name_to_id.get(s.as_str()).copied())
                .unwrap_or(0),
        }
    }
}

impl Need {
    fn resolve(&self, name_to_id: &HashMap<&str, u32>) -> Vec<u32> {
        match self {
            Need::None => Vec::new(),
            Need::One(r) => vec![r.resolve(name_to_id)],
            Need::Many(refs) => refs.iter().map(|r| r.resolve(name_to_id)).collect(),
        }
    }
}

/// 一个目标下的有序步骤集合，附带反思日志与起始时间
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub goal: String,
    /// 插入顺序即调度扫描顺序；恢复步骤追加在尾部
    pub steps: Vec<TaskStep>,
    /// 每次 dispatch 追加一条人类可读的结果记录
    pub reflection_log: Vec<String>,
    /// 创建时刻，仅用于耗时报告
    pub start_time: Instant,
}

impl ExecutionPlan {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            steps: Vec::new(),
            reflection_log: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// 从计划合成输入构建：按序分配 id（1 起），need 中的任务名解析为对应 id
    pub fn from_tasks(goal: &str, tasks: &[(String, TaskInfo)]) -> Self {
        let name_to_id: HashMap<&str, u32> = tasks
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.as_str(), i as u32 + 1))
            .collect();

        let mut plan = Self::new(goal);
        for (i, (name, info)) in tasks.iter().enumerate() {
            let mut step = TaskStep::new(
                i as u32 + 1,
                info.task.clone().unwrap_or_else(|| name.clone()),
                info.agent.to_lowercase(),
            );
            step.dependencies = info.need.resolve(&name_to_id);
            plan.steps.push(step);
        }
        plan
    }

    /// 指定 id 的步骤是否已完成；id 不存在视为未满足
    fn dependency_met(&self, dep_id: u32) -> bool {
        self.steps
            .iter()
            .any(|s| s.id == dep_id && s.status == StepStatus::Completed)
    }

    /// 按插入顺序返回第一个可调度步骤：pending 且所有依赖均已完成
    pub fn next_eligible(&self) -> Option<usize> {
        self.steps.iter().position(|s| {
            s.status == StepStatus::Pending
                && s.dependencies.iter().all(|d| self.dependency_met(*d))
        })
    }

    pub fn has_pending(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Pending)
    }

    /// 计划完成 iff 每个步骤都处于 completed 或 failed
    pub fn is_complete(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(s.status, StepStatus::Completed | StepStatus::Failed))
    }

    pub fn completed_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }

    /// 记录一次成功的 dispatch 结果
    pub fn record_success(&mut self, idx: usize, result: String) {
        let step = &mut self.steps[idx];
        step.status = StepStatus::Completed;
        step.result = result;
    }

    /// 记录一次失败的 dispatch 结果；达到重试上限则永久失败，否则回到 pending 等待重试。
    /// 返回步骤的新状态。
    pub fn record_failure(&mut self, idx: usize, error: String) -> StepStatus {
        let step = &mut self.steps[idx];
        step.attempts += 1;
        step.error = error;
        step.status = if step.attempts >= step.max_attempts {
            StepStatus::Failed
        } else {
            StepStatus::Pending
        };
        step.status
    }

    /// 死锁处理：将所有仍 pending 的步骤强制置为 failed，返回被强制的 id 列表
    pub fn fail_pending_as_deadlocked(&mut self) -> Vec<u32> {
        let mut forced = Vec::new();
        for step in &mut self.steps {
            if step.status == StepStatus::Pending {
                step.status = StepStatus::Failed;
                step.error =
                    "dependency deadlock: prerequisite steps can never complete".to_string();
                forced.push(step.id);
            }
        }
        forced
    }

    /// 自计划创建以来的耗时（秒）
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// 渲染进度表：每步一行 `<icon> Step <id>: [<ROLE>] <描述> (<status>)`
    pub fn progress_text(&self) -> String {
        let mut lines = vec![format!("**Plan: {}**\n", self.goal)];
        for step in &self.steps {
            lines.push(format!(
                "{} Step {}: [{}] {} ({})",
                step.status.icon(),
                step.id,
                step.role.to_uppercase(),
                step.description,
                step.status
            ));
        }
        lines.join("\n")
    }

    /// 通知载荷用的步骤快照列表
    pub fn snapshots(&self) -> Vec<StepSnapshot> {
        self.steps
            .iter()
            .map(|s| StepSnapshot {
                id: s.id,
                description: s.description.clone(),
                role: s.role.clone(),
                status: s.status,
                attempts: s.attempts,
            })
            .collect()
    }
}
