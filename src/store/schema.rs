//! Schema creation, in the indexer's `ensure_schema` idiom: idempotent
//! `CREATE TABLE IF NOT EXISTS` statements plus indexes, run once at
//! startup against a checked-out connection.

use rusqlite::Connection;

use crate::error::ObbyResult;

pub fn ensure_schema(conn: &Connection) -> ObbyResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS file_versions (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            path            TEXT NOT NULL,
            content_hash    TEXT NOT NULL,
            content         TEXT NOT NULL,
            size_bytes      INTEGER NOT NULL,
            deleted         INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_file_versions_path ON file_versions(path, created_at);

        CREATE TABLE IF NOT EXISTS content_diffs (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path        TEXT NOT NULL,
            file_version_id  INTEGER NOT NULL REFERENCES file_versions(id),
            old_version_id   INTEGER REFERENCES file_versions(id),
            change_type      TEXT NOT NULL,
            diff_text        TEXT NOT NULL,
            lines_added      INTEGER NOT NULL,
            lines_removed    INTEGER NOT NULL,
            created_at       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_content_diffs_version ON content_diffs(file_version_id);
        CREATE INDEX IF NOT EXISTS idx_content_diffs_timestamp ON content_diffs(created_at);
        CREATE INDEX IF NOT EXISTS idx_content_diffs_path_timestamp ON content_diffs(file_path, created_at);

        CREATE TABLE IF NOT EXISTS file_state (
            path             TEXT PRIMARY KEY,
            content_hash     TEXT NOT NULL,
            latest_version_id INTEGER NOT NULL REFERENCES file_versions(id),
            updated_at       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS file_changes (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            path             TEXT NOT NULL,
            change_kind      TEXT NOT NULL,
            file_version_id  INTEGER REFERENCES file_versions(id),
            created_at       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_file_changes_created ON file_changes(created_at);
        CREATE INDEX IF NOT EXISTS idx_file_changes_path_timestamp ON file_changes(path, created_at);

        CREATE TABLE IF NOT EXISTS events (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type       TEXT NOT NULL,
            payload_json     TEXT NOT NULL,
            created_at       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_events_created ON events(created_at);

        CREATE TABLE IF NOT EXISTS semantic_entries (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            path                TEXT NOT NULL,
            summary             TEXT NOT NULL,
            impact              TEXT,
            markdown_file_path  TEXT,
            created_at          TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_semantic_entries_timestamp ON semantic_entries(created_at);

        CREATE VIRTUAL TABLE IF NOT EXISTS semantic_search USING fts5(
            path, summary, impact, content='semantic_entries', content_rowid='id'
        );

        CREATE TABLE IF NOT EXISTS semantic_topics (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            semantic_entry_id   INTEGER NOT NULL REFERENCES semantic_entries(id),
            topic               TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS semantic_keywords (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            semantic_entry_id   INTEGER NOT NULL REFERENCES semantic_entries(id),
            keyword             TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            key              TEXT PRIMARY KEY,
            value            TEXT NOT NULL,
            updated_at       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS agent_sessions (
            id               TEXT PRIMARY KEY,
            title            TEXT,
            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS agent_action_log (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id       TEXT NOT NULL REFERENCES agent_sessions(id),
            seq              INTEGER NOT NULL,
            action_type      TEXT NOT NULL,
            detail_json      TEXT NOT NULL,
            created_at       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_agent_action_log_session ON agent_action_log(session_id, seq);

        CREATE TABLE IF NOT EXISTS insights_layout_config (
            id               INTEGER PRIMARY KEY CHECK (id = 1),
            layout_json      TEXT NOT NULL,
            updated_at       TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='file_versions'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn fts_table_exists() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE name='semantic_search'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
