//! CRUD operations, mirroring the indexer's `rusqlite::params!` call style
//! in `execution_log.rs` -- explicit SQL, no query builder.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::ObbyResult;
use crate::tracker::{ChangeKind, TrackedChange};

fn now() -> String {
    Utc::now().to_rfc3339()
}

pub fn insert_tracked_change(conn: &Connection, change: &TrackedChange) -> ObbyResult<i64> {
    let now_str = now();
    let tx = conn.unchecked_transaction()?;

    let old_version_id: Option<i64> = tx
        .query_row(
            "SELECT latest_version_id FROM file_state WHERE path = ?1",
            params![change.version.path],
            |row| row.get(0),
        )
        .optional()?;

    tx.execute(
        "INSERT INTO file_versions (path, content_hash, content, size_bytes, deleted, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            change.version.path,
            change.version.content_hash,
            change.version.content,
            change.version.size as i64,
            change.version.deleted as i64,
            now_str,
        ],
    )?;
    let version_id = tx.last_insert_rowid();

    let change_kind = match change.kind {
        ChangeKind::Created => "created",
        ChangeKind::Modified => "modified",
        ChangeKind::Deleted => "deleted",
    };

    if let Some(diff) = &change.diff {
        tx.execute(
            "INSERT INTO content_diffs (file_path, file_version_id, old_version_id, change_type, diff_text, lines_added, lines_removed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                change.version.path,
                version_id,
                old_version_id,
                change_kind,
                diff.diff_text,
                diff.lines_added as i64,
                diff.lines_removed as i64,
                now_str,
            ],
        )?;
    }

    tx.execute(
        "INSERT INTO file_changes (path, change_kind, file_version_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![change.version.path, change_kind, version_id, now_str],
    )?;

    if change.version.deleted {
        tx.execute("DELETE FROM file_state WHERE path = ?1", params![change.version.path])?;
    } else {
        tx.execute(
            "INSERT INTO file_state (path, content_hash, latest_version_id, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(path) DO UPDATE SET content_hash = excluded.content_hash,
                latest_version_id = excluded.latest_version_id, updated_at = excluded.updated_at",
            params![change.version.path, change.version.content_hash, version_id, now_str],
        )?;
    }

    tx.commit()?;
    Ok(version_id)
}

pub fn insert_event(conn: &Connection, event_type: &str, payload_json: &str) -> ObbyResult<i64> {
    conn.execute(
        "INSERT INTO events (event_type, payload_json, created_at) VALUES (?1, ?2, ?3)",
        params![event_type, payload_json, now()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn changes_since(conn: &Connection, since_rfc3339: &str, limit: usize) -> ObbyResult<Vec<(i64, String, String, Option<i64>)>> {
    let mut stmt = conn.prepare(
        "SELECT id, path, change_kind, file_version_id FROM file_changes
         WHERE created_at > ?1 ORDER BY created_at ASC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![since_rfc3339, limit as i64], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// One row of the batch summarizer's diff window: the change plus whatever
/// diff text was recorded alongside it (none for a pure creation of an
/// empty file, or when the no-op gate suppressed it).
pub struct DiffWindowEntry {
    pub path: String,
    pub change_kind: String,
    pub diff_text: Option<String>,
    pub lines_added: i64,
    pub lines_removed: i64,
    pub created_at: String,
}

pub fn changes_since_detailed(conn: &Connection, since_rfc3339: &str, limit: usize) -> ObbyResult<Vec<DiffWindowEntry>> {
    let mut stmt = conn.prepare(
        "SELECT fc.path, fc.change_kind, cd.diff_text, cd.lines_added, cd.lines_removed, fc.created_at
         FROM file_changes fc
         LEFT JOIN content_diffs cd ON cd.file_version_id = fc.file_version_id
         WHERE fc.created_at > ?1
         ORDER BY fc.created_at ASC
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![since_rfc3339, limit as i64], |row| {
            Ok(DiffWindowEntry {
                path: row.get(0)?,
                change_kind: row.get(1)?,
                diff_text: row.get(2)?,
                lines_added: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                lines_removed: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn config_get(conn: &Connection, key: &str) -> ObbyResult<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM config_kv WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?)
}

pub fn config_set(conn: &Connection, key: &str, value: &str) -> ObbyResult<()> {
    conn.execute(
        "INSERT INTO config_kv (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, now()],
    )?;
    Ok(())
}

pub fn insert_semantic_entry(
    conn: &Connection,
    path: &str,
    summary: &str,
    impact: Option<&str>,
    topics: &[String],
    keywords: &[String],
) -> ObbyResult<i64> {
    insert_semantic_entry_with_markdown(conn, path, summary, impact, None, topics, keywords)
}

/// Same as [`insert_semantic_entry`] but also records the path of the
/// "individual summary" markdown file the living-note writer produced
/// alongside the shared note for this batch.
pub fn insert_semantic_entry_with_markdown(
    conn: &Connection,
    path: &str,
    summary: &str,
    impact: Option<&str>,
    markdown_file_path: Option<&str>,
    topics: &[String],
    keywords: &[String],
) -> ObbyResult<i64> {
    conn.execute(
        "INSERT INTO semantic_entries (path, summary, impact, markdown_file_path, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![path, summary, impact, markdown_file_path, now()],
    )?;
    let id = conn.last_insert_rowid();
    conn.execute(
        "INSERT INTO semantic_search(rowid, path, summary, impact) VALUES (?1, ?2, ?3, ?4)",
        params![id, path, summary, impact],
    )?;

    for topic in topics {
        conn.execute(
            "INSERT INTO semantic_topics (semantic_entry_id, topic) VALUES (?1, ?2)",
            params![id, topic],
        )?;
    }
    for keyword in keywords {
        conn.execute(
            "INSERT INTO semantic_keywords (semantic_entry_id, keyword) VALUES (?1, ?2)",
            params![id, keyword],
        )?;
    }

    Ok(id)
}

/// Deletes a semantic entry and its FTS shadow row in one transaction,
/// keeping the two in sync.
pub fn clear_semantic_entry(conn: &mut Connection, id: i64) -> ObbyResult<()> {
    let tx = conn.transaction()?;
    let row = tx
        .query_row(
            "SELECT path, summary, impact FROM semantic_entries WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;
    if let Some((path, summary, impact)) = row {
        tx.execute(
            "INSERT INTO semantic_search(semantic_search, rowid, path, summary, impact) VALUES ('delete', ?1, ?2, ?3, ?4)",
            params![id, path, summary, impact],
        )?;
        tx.execute("DELETE FROM semantic_topics WHERE semantic_entry_id = ?1", params![id])?;
        tx.execute("DELETE FROM semantic_keywords WHERE semantic_entry_id = ?1", params![id])?;
        tx.execute("DELETE FROM semantic_entries WHERE id = ?1", params![id])?;
    }
    tx.commit()?;
    Ok(())
}

/// Full-text search over semantic entries, ranked by a blend of the FTS5
/// relevance score, an exact topic/keyword match, and a topic/keyword
/// prefix match -- in that order of weight (3/2/1). `type_filter`, when
/// given, restricts results to entries whose `impact` equals it, since
/// `impact` is the closest thing this schema has to an entry "type".
pub fn search_semantic(
    conn: &Connection,
    query: &str,
    limit: usize,
    type_filter: Option<&str>,
) -> ObbyResult<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT se.path, se.summary,
                MAX(-bm25(semantic_search)) * 3.0
                    + MAX(CASE WHEN st.topic = ?1 OR sk.keyword = ?1 THEN 1 ELSE 0 END) * 2.0
                    + MAX(CASE WHEN st.topic LIKE ?1 || '%' OR sk.keyword LIKE ?1 || '%' THEN 1 ELSE 0 END) * 1.0
                    AS score
         FROM semantic_search
         JOIN semantic_entries se ON se.id = semantic_search.rowid
         LEFT JOIN semantic_topics st ON st.semantic_entry_id = se.id
         LEFT JOIN semantic_keywords sk ON sk.semantic_entry_id = se.id
         WHERE semantic_search MATCH ?1 AND (?2 IS NULL OR se.impact = ?2)
         GROUP BY se.id
         ORDER BY score DESC
         LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(params![query, type_filter, limit as i64], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Per-path and aggregate rollup of every tracked change within a time
/// window, for the dashboard's "what happened between X and Y" view.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TimeAnalysisSummary {
    pub total_changes: i64,
    pub files_affected: i64,
    pub lines_added: i64,
    pub lines_removed: i64,
    pub change_types: std::collections::BTreeMap<String, i64>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FileMetric {
    pub path: String,
    pub change_count: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TimeAnalysis {
    pub summary: TimeAnalysisSummary,
    pub diffs: Vec<DiffWindowEntry>,
    pub file_metrics: Vec<FileMetric>,
}

pub fn comprehensive_time_analysis(conn: &Connection, start_rfc3339: &str, end_rfc3339: &str) -> ObbyResult<TimeAnalysis> {
    let mut change_types = std::collections::BTreeMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT change_kind, COUNT(*) FROM file_changes
             WHERE created_at >= ?1 AND created_at <= ?2
             GROUP BY change_kind",
        )?;
        let rows = stmt.query_map(params![start_rfc3339, end_rfc3339], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (kind, count) = row?;
            change_types.insert(kind, count);
        }
    }
    let total_changes: i64 = change_types.values().sum();

    let files_affected: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT path) FROM file_changes WHERE created_at >= ?1 AND created_at <= ?2",
        params![start_rfc3339, end_rfc3339],
        |row| row.get(0),
    )?;

    let (lines_added, lines_removed): (i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(cd.lines_added), 0), COALESCE(SUM(cd.lines_removed), 0)
         FROM content_diffs cd
         WHERE cd.created_at >= ?1 AND cd.created_at <= ?2",
        params![start_rfc3339, end_rfc3339],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let mut stmt = conn.prepare(
        "SELECT fc.path, fc.change_kind, cd.diff_text, cd.lines_added, cd.lines_removed, fc.created_at
         FROM file_changes fc
         LEFT JOIN content_diffs cd ON cd.file_version_id = fc.file_version_id
         WHERE fc.created_at >= ?1 AND fc.created_at <= ?2
         ORDER BY fc.created_at ASC",
    )?;
    let diffs = stmt
        .query_map(params![start_rfc3339, end_rfc3339], |row| {
            Ok(DiffWindowEntry {
                path: row.get(0)?,
                change_kind: row.get(1)?,
                diff_text: row.get(2)?,
                lines_added: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                lines_removed: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT path, COUNT(*) AS change_count FROM file_changes
         WHERE created_at >= ?1 AND created_at <= ?2
         GROUP BY path
         ORDER BY change_count DESC",
    )?;
    let file_metrics = stmt
        .query_map(params![start_rfc3339, end_rfc3339], |row| {
            Ok(FileMetric { path: row.get(0)?, change_count: row.get(1)? })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TimeAnalysis {
        summary: TimeAnalysisSummary { total_changes, files_affected, lines_added, lines_removed, change_types },
        diffs,
        file_metrics,
    })
}

/// The most recent diffs across the whole tree, newest first, for paging
/// through history independent of any particular time window.
pub fn recent_diffs(conn: &Connection, limit: usize, offset: usize) -> ObbyResult<Vec<DiffWindowEntry>> {
    let mut stmt = conn.prepare(
        "SELECT fc.path, fc.change_kind, cd.diff_text, cd.lines_added, cd.lines_removed, fc.created_at
         FROM file_changes fc
         LEFT JOIN content_diffs cd ON cd.file_version_id = fc.file_version_id
         ORDER BY fc.created_at DESC
         LIMIT ?1 OFFSET ?2",
    )?;
    let rows = stmt
        .query_map(params![limit as i64, offset as i64], |row| {
            Ok(DiffWindowEntry {
                path: row.get(0)?,
                change_kind: row.get(1)?,
                diff_text: row.get(2)?,
                lines_added: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                lines_removed: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Every path currently present in `file_state` -- the set of files the
/// tracker still considers live.
pub fn tracked_paths(conn: &Connection) -> ObbyResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT path FROM file_state")?;
    let rows = stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Clears `file_state` for a given set of paths, without touching their
/// historical versions, diffs, or changes. Returns the number of rows
/// removed.
fn clear_paths(conn: &Connection, paths: &[String]) -> ObbyResult<usize> {
    if paths.is_empty() {
        return Ok(0);
    }
    let mut removed = 0;
    for path in paths {
        removed += conn.execute("DELETE FROM file_state WHERE path = ?1", params![path])?;
    }
    Ok(removed)
}

/// Drops tracked state for every path the given predicate says is no
/// longer watched (e.g. it fell outside the current include/exclude
/// patterns).
pub fn clear_unwatched(conn: &Connection, is_watched: impl Fn(&str) -> bool) -> ObbyResult<usize> {
    let all = tracked_paths(conn)?;
    let stale: Vec<String> = all.into_iter().filter(|p| !is_watched(p)).collect();
    clear_paths(conn, &stale)
}

/// Drops tracked state for every path that no longer exists under `root`
/// on disk.
pub fn clear_missing_on_disk(conn: &Connection, root: &std::path::Path) -> ObbyResult<usize> {
    let all = tracked_paths(conn)?;
    let missing: Vec<String> = all.into_iter().filter(|p| !root.join(p).exists()).collect();
    clear_paths(conn, &missing)
}

/// Drops every row of `file_state`, leaving version/diff/change history
/// intact so the next observed change for any path is treated as fresh.
pub fn clear_all(conn: &Connection) -> ObbyResult<usize> {
    Ok(conn.execute("DELETE FROM file_state", [])?)
}

pub fn ensure_agent_session(conn: &Connection, session_id: &str, title: Option<&str>) -> ObbyResult<()> {
    conn.execute(
        "INSERT INTO agent_sessions (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
        params![session_id, title, now()],
    )?;
    Ok(())
}

pub fn append_action_log(conn: &Connection, session_id: &str, action_type: &str, detail_json: &str) -> ObbyResult<i64> {
    let seq: i64 = conn.query_row(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM agent_action_log WHERE session_id = ?1",
        params![session_id],
        |row| row.get(0),
    )?;
    conn.execute(
        "INSERT INTO agent_action_log (session_id, seq, action_type, detail_json, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![session_id, seq, action_type, detail_json, now()],
    )?;
    Ok(seq)
}

pub fn action_log_for_session(conn: &Connection, session_id: &str) -> ObbyResult<Vec<(i64, String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT seq, action_type, detail_json FROM agent_action_log WHERE session_id = ?1 ORDER BY seq ASC",
    )?;
    let rows = stmt
        .query_map(params![session_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_layout_config(conn: &Connection) -> ObbyResult<Option<String>> {
    Ok(conn
        .query_row("SELECT layout_json FROM insights_layout_config WHERE id = 1", [], |row| row.get(0))
        .optional()?)
}

pub fn set_layout_config(conn: &Connection, layout_json: &str) -> ObbyResult<()> {
    conn.execute(
        "INSERT INTO insights_layout_config (id, layout_json, updated_at) VALUES (1, ?1, ?2)
         ON CONFLICT(id) DO UPDATE SET layout_json = excluded.layout_json, updated_at = excluded.updated_at",
        params![layout_json, now()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::ensure_schema;
    use crate::tracker::{ChangeKind, ContentDiff, FileVersion};

    fn memdb() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn insert_tracked_change_updates_file_state() {
        let conn = memdb();
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
        insert_tracked_change(&conn, &change).unwrap();
        let hash: String = conn
            .query_row("SELECT content_hash FROM file_state WHERE path = 'notes/a.md'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(hash, "abc");
    }

    #[test]
    fn deletion_removes_file_state_row() {
        let conn = memdb();
        let create = TrackedChange {
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
        insert_tracked_change(&conn, &create).unwrap();

        let delete = TrackedChange {
            kind: ChangeKind::Deleted,
            version: FileVersion {
                path: "notes/a.md".into(),
                content_hash: String::new(),
                content: String::new(),
                size: 0,
                deleted: true,
            },
            diff: Some(ContentDiff {
                diff_text: "-hello\n".into(),
                lines_added: 0,
                lines_removed: 1,
            }),
        };
        insert_tracked_change(&conn, &delete).unwrap();

        let count: i64 = conn
            .query_row("SELECT count(*) FROM file_state WHERE path = 'notes/a.md'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn semantic_entry_is_searchable_via_fts() {
        let conn = memdb();
        insert_semantic_entry(&conn, "notes/a.md", "refactored the parser", None, &[], &[]).unwrap();
        let results = search_semantic(&conn, "parser", 10, None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "notes/a.md");
    }

    #[test]
    fn clearing_semantic_entry_removes_it_from_fts() {
        let mut conn = memdb();
        let id = insert_semantic_entry(&conn, "notes/a.md", "refactored the parser", None, &[], &[]).unwrap();
        clear_semantic_entry(&mut conn, id).unwrap();
        let results = search_semantic(&conn, "parser", 10, None).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn config_roundtrips() {
        let conn = memdb();
        assert!(config_get(&conn, "missing").unwrap().is_none());
        config_set(&conn, "living_note_last_update", "2026-07-01T00:00:00Z").unwrap();
        assert_eq!(
            config_get(&conn, "living_note_last_update").unwrap().as_deref(),
            Some("2026-07-01T00:00:00Z")
        );
    }

    #[test]
    fn action_log_sequence_increments_per_session() {
        let conn = memdb();
        ensure_agent_session(&conn, "s1", Some("chat")).unwrap();
        let seq1 = append_action_log(&conn, "s1", "tool_call", "{}").unwrap();
        let seq2 = append_action_log(&conn, "s1", "tool_result", "{}").unwrap();
        assert_eq!(seq1, 1);
        assert_eq!(seq2, 2);
        assert_eq!(action_log_for_session(&conn, "s1").unwrap().len(), 2);
    }
}
