//! Default insight implementations, one per id named in
//! `original_source/backend/insights/plugins/`. Each queries the Store
//! directly via [`crate::store::Store::with_connection`] rather than adding
//! a one-off `queries::*` function per plugin.

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::error::ObbyResult;
use crate::store::Store;

use super::{Insight, InsightCategory, InsightData, InsightMetadata};

fn rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub struct FileActivityInsight;

impl Insight for FileActivityInsight {
    fn metadata(&self) -> InsightMetadata {
        InsightMetadata {
            id: "file_activity",
            title: "Total Changes",
            description: "Total file changes and activity in the time period",
            category: InsightCategory::Activity,
        }
    }

    fn calculate(&self, start: DateTime<Utc>, end: DateTime<Utc>, store: &Store) -> Result<InsightData, String> {
        let (since, until) = (rfc3339(start), rfc3339(end));
        let result: ObbyResult<(i64, i64, i64, i64, i64)> = store.with_connection(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM file_changes WHERE created_at BETWEEN ?1 AND ?2",
                params![since, until],
                |row| row.get(0),
            )?;
            let files_modified: i64 = conn.query_row(
                "SELECT COUNT(DISTINCT path) FROM file_changes WHERE created_at BETWEEN ?1 AND ?2",
                params![since, until],
                |row| row.get(0),
            )?;
            let created: i64 = conn.query_row(
                "SELECT COUNT(*) FROM file_changes WHERE change_kind = 'created' AND created_at BETWEEN ?1 AND ?2",
                params![since, until],
                |row| row.get(0),
            )?;
            let deleted: i64 = conn.query_row(
                "SELECT COUNT(*) FROM file_changes WHERE change_kind = 'deleted' AND created_at BETWEEN ?1 AND ?2",
                params![since, until],
                |row| row.get(0),
            )?;
            let modified: i64 = conn.query_row(
                "SELECT COUNT(*) FROM file_changes WHERE change_kind = 'modified' AND created_at BETWEEN ?1 AND ?2",
                params![since, until],
                |row| row.get(0),
            )?;
            Ok((total, files_modified, created, deleted, modified))
        });

        let (total, files_modified, created, deleted, modified) = result.map_err(|e| e.to_string())?;
        Ok(InsightData {
            value: total.to_string(),
            label: Some(if total == 1 { "change".to_string() } else { "changes".to_string() }),
            trend: None,
            details: Some(serde_json::json!({
                "filesModified": files_modified,
                "changeTypes": {"created": created, "modified": modified, "deleted": deleted},
            })),
            status: if total == 0 { "warning".to_string() } else { "success".to_string() },
            message: Some(format!("Tracked {files_modified} files with {total} changes")),
        })
    }
}

pub struct PeakActivityInsight;

impl Insight for PeakActivityInsight {
    fn metadata(&self) -> InsightMetadata {
        InsightMetadata {
            id: "peak_activity",
            title: "Peak Activity Hour",
            description: "The hour of day with the most recorded changes",
            category: InsightCategory::Activity,
        }
    }

    fn calculate(&self, start: DateTime<Utc>, end: DateTime<Utc>, store: &Store) -> Result<InsightData, String> {
        let (since, until) = (rfc3339(start), rfc3339(end));
        let row: ObbyResult<Option<(String, i64)>> = store.with_connection(|conn| {
            Ok(conn
                .query_row(
                    "SELECT strftime('%H', created_at), COUNT(*) FROM file_changes
                     WHERE created_at BETWEEN ?1 AND ?2
                     GROUP BY strftime('%H', created_at)
                     ORDER BY COUNT(*) DESC LIMIT 1",
                    params![since, until],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                )
                .ok())
        });

        match row.map_err(|e| e.to_string())? {
            Some((hour, count)) => Ok(InsightData {
                value: format!("{hour}:00"),
                label: Some("peak hour".to_string()),
                trend: None,
                details: Some(serde_json::json!({ "changeCount": count })),
                status: "success".to_string(),
                message: Some(format!("{count} changes occurred around {hour}:00")),
            }),
            None => Ok(InsightData {
                value: "n/a".to_string(),
                status: "warning".to_string(),
                message: Some("no activity in this period".to_string()),
                ..Default::default()
            }),
        }
    }
}

pub struct TrendingFilesInsight;

impl Insight for TrendingFilesInsight {
    fn metadata(&self) -> InsightMetadata {
        InsightMetadata {
            id: "trending_files",
            title: "Trending Files",
            description: "Files with the most changes in the time period",
            category: InsightCategory::Trends,
        }
    }

    fn calculate(&self, start: DateTime<Utc>, end: DateTime<Utc>, store: &Store) -> Result<InsightData, String> {
        let (since, until) = (rfc3339(start), rfc3339(end));
        let rows: ObbyResult<Vec<(String, i64)>> = store.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT path, COUNT(*) as c FROM file_changes
                 WHERE created_at BETWEEN ?1 AND ?2
                 GROUP BY path ORDER BY c DESC LIMIT 10",
            )?;
            let rows = stmt
                .query_map(params![since, until], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        });

        let rows = rows.map_err(|e| e.to_string())?;
        let top = rows.first().map(|(path, _)| path.clone()).unwrap_or_else(|| "none".to_string());
        Ok(InsightData {
            value: top,
            label: Some("most active file".to_string()),
            trend: None,
            details: Some(serde_json::json!({
                "files": rows.iter().map(|(p, c)| serde_json::json!({"path": p, "changes": c})).collect::<Vec<_>>()
            })),
            status: "success".to_string(),
            message: None,
        })
    }
}

pub struct CodeMetricsInsight;

impl Insight for CodeMetricsInsight {
    fn metadata(&self) -> InsightMetadata {
        InsightMetadata {
            id: "code_metrics",
            title: "Code Metrics",
            description: "Aggregate size of the currently tracked tree",
            category: InsightCategory::Code,
        }
    }

    fn calculate(&self, _start: DateTime<Utc>, _end: DateTime<Utc>, store: &Store) -> Result<InsightData, String> {
        let row: ObbyResult<(i64, i64)> = store.with_connection(|conn| {
            conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(LENGTH(fv.content)), 0)
                 FROM file_state fs JOIN file_versions fv ON fv.id = fs.latest_version_id",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(Into::into)
        });

        let (file_count, total_bytes) = row.map_err(|e| e.to_string())?;
        Ok(InsightData {
            value: file_count.to_string(),
            label: Some("tracked files".to_string()),
            trend: None,
            details: Some(serde_json::json!({ "totalBytes": total_bytes })),
            status: "success".to_string(),
            message: Some(format!("{total_bytes} bytes across {file_count} files")),
        })
    }
}

pub struct StaleTodosInsight;

impl Insight for StaleTodosInsight {
    fn metadata(&self) -> InsightMetadata {
        InsightMetadata {
            id: "stale_todos",
            title: "Stale TODOs",
            description: "TODO markers present in the currently tracked tree",
            category: InsightCategory::Code,
        }
    }

    fn calculate(&self, _start: DateTime<Utc>, _end: DateTime<Utc>, store: &Store) -> Result<InsightData, String> {
        let rows: ObbyResult<Vec<(String, String)>> = store.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT fs.path, fv.content FROM file_state fs
                 JOIN file_versions fv ON fv.id = fs.latest_version_id
                 WHERE fv.content LIKE '%TODO%' LIMIT 200",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        });

        let rows = rows.map_err(|e| e.to_string())?;
        let mut todo_lines = Vec::new();
        for (path, content) in &rows {
            for line in content.lines() {
                if line.contains("TODO") {
                    todo_lines.push(serde_json::json!({ "path": path, "line": line.trim() }));
                }
            }
        }

        Ok(InsightData {
            value: todo_lines.len().to_string(),
            label: Some("open TODOs".to_string()),
            trend: None,
            details: Some(serde_json::json!({ "todos": todo_lines })),
            status: if todo_lines.is_empty() { "success".to_string() } else { "warning".to_string() },
            message: None,
        })
    }
}

pub struct OrphanMentionsInsight;

impl Insight for OrphanMentionsInsight {
    fn metadata(&self) -> InsightMetadata {
        InsightMetadata {
            id: "orphan_mentions",
            title: "Orphan Mentions",
            description: "Semantic topics/keywords that no longer match any tracked file",
            category: InsightCategory::Semantic,
        }
    }

    fn calculate(&self, _start: DateTime<Utc>, _end: DateTime<Utc>, store: &Store) -> Result<InsightData, String> {
        let rows: ObbyResult<Vec<(String, String)>> = store.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT se.path, st.topic FROM semantic_topics st
                 JOIN semantic_entries se ON se.id = st.semantic_entry_id
                 LEFT JOIN file_state fs ON fs.path = se.path
                 WHERE fs.path IS NULL",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        });

        let rows = rows.map_err(|e| e.to_string())?;
        Ok(InsightData {
            value: rows.len().to_string(),
            label: Some("orphaned mentions".to_string()),
            trend: None,
            details: Some(serde_json::json!({
                "mentions": rows.iter().map(|(p, t)| serde_json::json!({"path": p, "topic": t})).collect::<Vec<_>>()
            })),
            status: "success".to_string(),
            message: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("t.db"), 1).unwrap();
        (dir, store)
    }

    #[test]
    fn file_activity_reports_zero_changes_as_a_warning_status() {
        let (_dir, store) = store();
        let now = Utc::now();
        let data = FileActivityInsight.calculate(now - Duration::hours(1), now, &store).unwrap();
        assert_eq!(data.value, "0");
        assert_eq!(data.status, "warning");
    }

    #[test]
    fn stale_todos_finds_a_todo_marker_in_tracked_content() {
        use crate::tracker::{ChangeKind, FileVersion, TrackedChange};
        let (_dir, store) = store();
        store
            .record_change(&TrackedChange {
                kind: ChangeKind::Created,
                version: FileVersion {
                    path: "notes/a.md".into(),
                    content_hash: "abc".into(),
                    content: "line one\n// TODO: revisit this\n".into(),
                    size: 30,
                    deleted: false,
                },
                diff: None,
            })
            .unwrap();

        let now = Utc::now();
        let data = StaleTodosInsight.calculate(now - Duration::hours(1), now, &store).unwrap();
        assert_eq!(data.value, "1");
    }
}
