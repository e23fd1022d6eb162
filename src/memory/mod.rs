//! Memory Sink：事实/项目存储端口
//!
//! context_for_prompt 按步骤描述检索建议性上下文（空串表示无）；store_fact 在步骤成功时写入；
//! store_project 每次运行落一条聚合结果。所有调用都是可失败的非事务 I/O，
//! 调度器对 Err 一律吞掉并降级为日志，不重试。

pub mod sqlite;

pub use sqlite::SqliteSink;

use std::collections::HashSet;
use std::sync::RwLock;

use thiserror::Error;

/// 检索返回的最大事实条数
const CONTEXT_TOP_K: usize = 3;

/// 存储层错误
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// 事实/项目存储端口
pub trait MemorySink: Send + Sync {
    /// 按查询返回建议性上下文块；空字符串表示没有相关内容
    fn context_for_prompt(&self, query: &str) -> Result<String, MemoryError>;

    /// 写入一条事实（步骤成功时调用）
    fn store_fact(&self, category: &str, text: &str, source: &str) -> Result<(), MemoryError>;

    /// 写入一条项目记录（每次运行结束调用一次，带聚合结果）
    fn store_project(
        &self,
        name: &str,
        project_type: &str,
        path: &str,
        description: &str,
        status: &str,
    ) -> Result<(), MemoryError>;
}

/// 空实现：未配置存储时使用
#[derive(Debug, Default)]
pub struct NoopSink;

impl MemorySink for NoopSink {
    fn context_for_prompt(&self, _query: &str) -> Result<String, MemoryError> {
        Ok(String::new())
    }

    fn store_fact(&self, _category: &str, _text: &str, _source: &str) -> Result<(), MemoryError> {
        Ok(())
    }

    fn store_project(
        &self,
        _name: &str,
        _project_type: &str,
        _path: &str,
        _description: &str,
        _status: &str,
    ) -> Result<(), MemoryError> {
        Ok(())
    }
}

/// 将文本切分为小写词集合，用于简单相似度（词重叠数）
pub(crate) fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split_whitespace()
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 1)
        .collect()
}

/// 将命中的事实渲染为提示块；无命中返回空串
pub(crate) fn format_context_block(hits: &[(String, String)]) -> String {
    if hits.is_empty() {
        return String::new();
    }
    let mut block = String::from("Possibly relevant facts from memory:\n");
    for (category, text) in hits {
        block.push_str(&format!("- [{}] {}\n", category, text));
    }
    block
}

struct FactEntry {
    category: String,
    text: String,
    tokens: HashSet<String>,
}

/// 内存实现：按关键词重叠检索（无真实向量，适合测试与单进程运行）
pub struct InMemorySink {
    facts: RwLock<Vec<FactEntry>>,
    projects: RwLock<Vec<String>>,
    max_entries: usize,
}

impl InMemorySink {
    pub fn new(max_entries: usize) -> Self {
        Self {
            facts: RwLock::new(Vec::new()),
            projects: RwLock::new(Vec::new()),
            max_entries,
        }
    }

    pub fn project_count(&self) -> usize {
        self.projects.read().unwrap().len()
    }
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl MemorySink for InMemorySink {
    fn context_for_prompt(&self, query: &str) -> Result<String, MemoryError> {
        let query_tokens = tokenize_lower(query);
        if query_tokens.is_empty() {
            return Ok(String::new());
        }
        let facts = self.facts.read().unwrap();
        let mut scored: Vec<(usize, &FactEntry)> = facts
            .iter()
            .map(|f| (query_tokens.intersection(&f.tokens).count(), f))
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        let hits: Vec<(String, String)> = scored
            .into_iter()
            .take(CONTEXT_TOP_K)
            .map(|(_, f)| (f.category.clone(), f.text.clone()))
            .collect();
        Ok(format_context_block(&hits))
    }

    fn store_fact(&self, category: &str, text: &str, _source: &str) -> Result<(), MemoryError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let mut facts = self.facts.write().unwrap();
        facts.push(FactEntry {
            category: category.to_string(),
            text: text.to_string(),
            tokens: tokenize_lower(text),
        });
        let n = facts.len();
        if n > self.max_entries {
            facts.drain(0..n - self.max_entries);
        }
        Ok(())
    }

    fn store_project(
        &self,
        name: &str,
        project_type: &str,
        _path: &str,
        _description: &str,
        status: &str,
    ) -> Result<(), MemoryError> {
        self.projects
            .write()
            .unwrap()
            .push(format!("{} ({}, {})", name, project_type, status));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_retrieval_by_overlap() {
        let sink = InMemorySink::default();
        sink.store_fact("success", "parsed the csv file with serde", "step 1")
            .unwrap();
        sink.store_fact("success", "deployed the web server", "step 2")
            .unwrap();

        let block = sink.context_for_prompt("parse another csv file").unwrap();
        assert!(block.contains("parsed the csv file"));
        assert!(!block.contains("web server"));
    }

    #[test]
    fn test_no_match_returns_empty() {
        let sink = InMemorySink::default();
        sink.store_fact("success", "something unrelated", "step 1")
            .unwrap();
        assert_eq!(sink.context_for_prompt("zzz qqq").unwrap(), "");
    }

    #[test]
    fn test_capacity_eviction() {
        let sink = InMemorySink::new(2);
        for i in 0..5 {
            sink.store_fact("success", &format!("fact number {}", i), "test")
                .unwrap();
        }
        assert_eq!(sink.facts.read().unwrap().len(), 2);
    }

    #[test]
    fn test_store_project_counts() {
        let sink = InMemorySink::default();
        sink.store_project("demo", "autonomous_run", "", "2/2 steps", "completed")
            .unwrap();
        assert_eq!(sink.project_count(), 1);
    }
}
