//! Hive - Rust 自主任务编排器
//!
//! 模块划分：
//! - **agents**: Worker 契约（Agent trait）、注册表与角色解析、LLM/Echo 实现
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 计划/步骤模型、步骤选取、重试与恢复状态机、主控循环
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: Memory Sink 端口（事实/项目存储，内存与 SQLite 实现）
//! - **notify**: 进度通知端口（fire-and-forget，broadcast 实现）
//! - **observability**: tracing 初始化

pub mod agents;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod notify;
pub mod observability;
