//! SQLite Memory Sink
//!
//! facts / projects 两张表的跨进程持久化实现；检索复用与内存实现相同的
//! 词重叠打分（先取最近 N 条，再在 Rust 侧打分），不依赖 FTS 扩展。

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};

use crate::memory::{format_context_block, tokenize_lower, MemoryError, MemorySink};

/// 参与打分的最近事实条数上限
const SCAN_RECENT_FACTS: usize = 200;
/// 检索返回的最大事实条数
const CONTEXT_TOP_K: usize = 3;

impl From<rusqlite::Error> for MemoryError {
    fn from(e: rusqlite::Error) -> Self {
        MemoryError::Storage(e.to_string())
    }
}

/// SQLite 实现：单连接 + Mutex（调度器单线程访问，无争用）
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let conn = Connection::open(path)?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// 仅内存库（测试用）
    pub fn open_in_memory() -> Result<Self, MemoryError> {
        let conn = Connection::open_in_memory()?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &Connection) -> Result<(), MemoryError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS facts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category TEXT NOT NULL,
                text TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                project_type TEXT NOT NULL,
                path TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, MemoryError> {
        self.conn
            .lock()
            .map_err(|e| MemoryError::Storage(format!("lock poisoned: {}", e)))
    }
}

impl MemorySink for SqliteSink {
    fn context_for_prompt(&self, query: &str) -> Result<String, MemoryError> {
        let query_tokens = tokenize_lower(query);
        if query_tokens.is_empty() {
            return Ok(String::new());
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT category, text FROM facts ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![SCAN_RECENT_FACTS as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut scored: Vec<(usize, (String, String))> = rows
            .into_iter()
            .map(|(category, text)| {
                let score = query_tokens
                    .intersection(&tokenize_lower(&text))
                    .count();
                (score, (category, text))
            })
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        let hits: Vec<(String, String)> = scored
            .into_iter()
            .take(CONTEXT_TOP_K)
            .map(|(_, hit)| hit)
            .collect();
        Ok(format_context_block(&hits))
    }

    fn store_fact(&self, category: &str, text: &str, source: &str) -> Result<(), MemoryError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO facts (category, text, source, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![category, text, source, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn store_project(
        &self,
        name: &str,
        project_type: &str,
        path: &str,
        description: &str,
        status: &str,
    ) -> Result<(), MemoryError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO projects (name, project_type, path, description, status, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                name,
                project_type,
                path,
                description,
                status,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_fact_roundtrip() {
        let sink = SqliteSink::open_in_memory().unwrap();
        sink.store_fact("success", "generated the report template", "step 2")
            .unwrap();
        let block = sink.context_for_prompt("update the report template").unwrap();
        assert!(block.contains("report template"));
    }

    #[test]
    fn test_sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");
        {
            let sink = SqliteSink::open(&path).unwrap();
            sink.store_fact("success", "installed the toolchain", "step 1")
                .unwrap();
            sink.store_project("demo", "autonomous_run", "", "1/1 steps", "completed")
                .unwrap();
        }
        let sink = SqliteSink::open(&path).unwrap();
        let block = sink.context_for_prompt("toolchain setup").unwrap();
        assert!(block.contains("installed the toolchain"));
    }

    #[test]
    fn test_sqlite_empty_query_empty_block() {
        let sink = SqliteSink::open_in_memory().unwrap();
        assert_eq!(sink.context_for_prompt("").unwrap(), "");
    }
}
