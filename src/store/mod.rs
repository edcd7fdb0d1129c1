//! Version & diff store: one `rusqlite`-backed SQLite database shared by
//! the watcher pipeline, the batch summarizer, and the HTTP/agent layer
//! through a single process-owned connection pool.

pub mod pool;
pub mod queries;
pub mod schema;

use std::path::Path;

use crate::error::ObbyResult;
use crate::tracker::TrackedChange;
use pool::ConnectionPool;

#[derive(Clone)]
pub struct Store {
    pool: ConnectionPool,
}

impl Store {
    pub fn open(db_path: &Path, max_connections: usize) -> ObbyResult<Self> {
        let pool = ConnectionPool::open(db_path, max_connections)?;
        {
            let conn = pool.checkout()?;
            schema::ensure_schema(&conn)?;
        }
        Ok(Store { pool })
    }

    pub fn record_change(&self, change: &TrackedChange) -> ObbyResult<i64> {
        let conn = self.pool.checkout()?;
        queries::insert_tracked_change(&conn, change)
    }

    pub fn record_event(&self, event_type: &str, payload_json: &str) -> ObbyResult<i64> {
        let conn = self.pool.checkout()?;
        queries::insert_event(&conn, event_type, payload_json)
    }

    pub fn changes_since(&self, since_rfc3339: &str, limit: usize) -> ObbyResult<Vec<(i64, String, String, Option<i64>)>> {
        let conn = self.pool.checkout()?;
        queries::changes_since(&conn, since_rfc3339, limit)
    }

    pub fn changes_since_detailed(&self, since_rfc3339: &str, limit: usize) -> ObbyResult<Vec<queries::DiffWindowEntry>> {
        let conn = self.pool.checkout()?;
        queries::changes_since_detailed(&conn, since_rfc3339, limit)
    }

    pub fn config_get(&self, key: &str) -> ObbyResult<Option<String>> {
        let conn = self.pool.checkout()?;
        queries::config_get(&conn, key)
    }

    pub fn config_set(&self, key: &str, value: &str) -> ObbyResult<()> {
        let conn = self.pool.checkout()?;
        queries::config_set(&conn, key, value)
    }

    pub fn insert_semantic_entry(
        &self,
        path: &str,
        summary: &str,
        impact: Option<&str>,
        topics: &[String],
        keywords: &[String],
    ) -> ObbyResult<i64> {
        let conn = self.pool.checkout()?;
        queries::insert_semantic_entry(&conn, path, summary, impact, topics, keywords)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert_semantic_entry_with_markdown(
        &self,
        path: &str,
        summary: &str,
        impact: Option<&str>,
        markdown_file_path: Option<&str>,
        topics: &[String],
        keywords: &[String],
    ) -> ObbyResult<i64> {
        let conn = self.pool.checkout()?;
        queries::insert_semantic_entry_with_markdown(&conn, path, summary, impact, markdown_file_path, topics, keywords)
    }

    pub fn delete_semantic_entry(&self, id: i64) -> ObbyResult<()> {
        let mut conn = self.pool.checkout()?;
        queries::clear_semantic_entry(&mut conn, id)
    }

    pub fn search_semantic(&self, query: &str, limit: usize, type_filter: Option<&str>) -> ObbyResult<Vec<(String, String)>> {
        let conn = self.pool.checkout()?;
        queries::search_semantic(&conn, query, limit, type_filter)
    }

    pub fn comprehensive_time_analysis(&self, start_rfc3339: &str, end_rfc3339: &str) -> ObbyResult<queries::TimeAnalysis> {
        let conn = self.pool.checkout()?;
        queries::comprehensive_time_analysis(&conn, start_rfc3339, end_rfc3339)
    }

    pub fn recent_diffs(&self, limit: usize, offset: usize) -> ObbyResult<Vec<queries::DiffWindowEntry>> {
        let conn = self.pool.checkout()?;
        queries::recent_diffs(&conn, limit, offset)
    }

    pub fn clear_unwatched(&self, is_watched: impl Fn(&str) -> bool) -> ObbyResult<usize> {
        let conn = self.pool.checkout()?;
        queries::clear_unwatched(&conn, is_watched)
    }

    pub fn clear_missing_on_disk(&self, root: &Path) -> ObbyResult<usize> {
        let conn = self.pool.checkout()?;
        queries::clear_missing_on_disk(&conn, root)
    }

    pub fn clear_all(&self) -> ObbyResult<usize> {
        let conn = self.pool.checkout()?;
        queries::clear_all(&conn)
    }

    pub fn ensure_agent_session(&self, session_id: &str, title: Option<&str>) -> ObbyResult<()> {
        let conn = self.pool.checkout()?;
        queries::ensure_agent_session(&conn, session_id, title)
    }

    pub fn append_action_log(&self, session_id: &str, action_type: &str, detail_json: &str) -> ObbyResult<i64> {
        let conn = self.pool.checkout()?;
        queries::append_action_log(&conn, session_id, action_type, detail_json)
    }

    pub fn action_log_for_session(&self, session_id: &str) -> ObbyResult<Vec<(i64, String, String)>> {
        let conn = self.pool.checkout()?;
        queries::action_log_for_session(&conn, session_id)
    }

    pub fn get_layout_config(&self) -> ObbyResult<Option<String>> {
        let conn = self.pool.checkout()?;
        queries::get_layout_config(&conn)
    }

    pub fn set_layout_config(&self, layout_json: &str) -> ObbyResult<()> {
        let conn = self.pool.checkout()?;
        queries::set_layout_config(&conn, layout_json)
    }

    /// Runs an arbitrary read against a checked-out connection. Used by the
    /// insights registry, whose plugins each need a different one-off
    /// aggregate query rather than a dedicated `queries::*` function apiece.
    pub fn with_connection<T>(&self, f: impl FnOnce(&rusqlite::Connection) -> ObbyResult<T>) -> ObbyResult<T> {
        let conn = self.pool.checkout()?;
        f(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{ChangeKind, FileVersion};
    use tempfile::TempDir;

    #[test]
    fn open_creates_schema_and_accepts_writes() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("notes.db"), 2).unwrap();
        let change = TrackedChange {
            kind: ChangeKind::Created,
            version: FileVersion {
                path: "notes/a.md".into(),
                content_hash: "abc".into(),
                content: "hello".into(),
                size: 5,
                deleted: false,
            },
            diff: None,
        };
        store.record_change(&change).unwrap();
        store.config_set("living_note_last_update", "now").unwrap();
        assert_eq!(store.config_get("living_note_last_update").unwrap().as_deref(), Some("now"));
    }
}
