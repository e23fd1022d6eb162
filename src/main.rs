//! Hive - Rust 自主任务编排器
//!
//! 入口：初始化日志、加载配置、从运行文件读取目标与任务列表，
//! 构建 Worker 注册表并驱动调度器，最后打印运行总结。

use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use hive::agents::{default_system_prompt, AgentRegistry, LlmAgent};
use hive::config::load_config;
use hive::core::{AutonomousOrchestrator, TaskInfo};
use hive::llm::create_llm_from_config;
use hive::memory::{InMemorySink, MemorySink, SqliteSink};
use hive::notify::BroadcastNotifier;

/// 运行文件：目标 + 有序 (任务名, 任务描述) 列表
#[derive(Debug, Deserialize)]
struct RunFile {
    goal: String,
    tasks: Vec<(String, TaskInfo)>,
}

/// 内置的 Worker 角色
const WORKER_ROLES: [&str; 4] = ["coder", "file", "web", "casual"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let path = std::env::args()
        .nth(1)
        .context("usage: hive <run-file.json>")?;
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read run file {}", path))?;
    let run: RunFile = serde_json::from_str(&raw).context("invalid run file")?;

    let cfg = load_config(None).unwrap_or_default();

    // 所有角色共享同一个 LLM 后端，差异在角色 prompt
    let llm = create_llm_from_config(&cfg);
    let mut registry = AgentRegistry::new();
    for role in WORKER_ROLES {
        registry.register(Arc::new(LlmAgent::new(
            role,
            default_system_prompt(role),
            llm.clone(),
        )));
    }

    tracing::info!(workers = ?registry.roles(), "worker registry ready");

    let memory: Arc<dyn MemorySink> = match &cfg.memory.path {
        Some(p) => Arc::new(SqliteSink::open(p).context("failed to open memory db")?),
        None => Arc::new(InMemorySink::default()),
    };

    let (notifier, mut rx) = BroadcastNotifier::new(64);
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            tracing::debug!(?event, "orchestrator event");
        }
    });

    // Ctrl-C -> 外部停止信号；循环在迭代之间检查，Worker 在 process 内自行检查
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    let orchestrator = AutonomousOrchestrator::new(registry)
        .with_notifier(Arc::new(notifier))
        .with_memory(memory);

    let report = orchestrator.run_loop(&run.goal, &run.tasks, cancel).await;
    println!("{}", report.summary);

    Ok(())
}
