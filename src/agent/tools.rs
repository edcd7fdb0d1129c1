//! Tool registry contract, grounded in `astrid-tools/src/lib.rs`'s
//! `BuiltinTool`/`ToolRegistry` pattern: a small async-trait per tool plus a
//! name-keyed registry that exports JSON schemas for the chat model.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::store::Store;

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub content: String,
    pub success: bool,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        ToolResult {
            content: content.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        ToolResult {
            content: String::new(),
            success: false,
            error: Some(error),
        }
    }
}

pub struct ToolContext {
    pub root: PathBuf,
    pub store: Store,
}

#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> Value;
    async fn invoke(&self, args: Value, ctx: &ToolContext) -> ToolResult;
}

pub struct ToolRegistry {
    tools: HashMap<&'static str, Box<dyn AgentTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry { tools: HashMap::new() }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(NotesSearchTool));
        registry.register(Box::new(RecentChangesTool));
        registry.register(Box::new(HistoryLookupTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn AgentTool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn AgentTool> {
        self.tools.get(name).map(AsRef::as_ref)
    }

    pub fn definitions(&self) -> Vec<(String, String, Value)> {
        self.tools
            .values()
            .map(|t| (t.name().to_string(), t.description().to_string(), t.input_schema()))
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Greps the watched tree for a query, a thin wrapper over a line scan.
pub struct NotesSearchTool;

#[async_trait]
impl AgentTool for NotesSearchTool {
    fn name(&self) -> &'static str {
        "notes_search"
    }

    fn description(&self) -> &'static str {
        "Search the watched note/code tree for a literal query, returning matching lines with their file path."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer", "default": 20}
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let Some(query) = args.get("query").and_then(Value::as_str) else {
            return ToolResult::failed("missing required argument 'query'");
        };
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(20) as usize;

        match grep_tree(&ctx.root, query, limit) {
            Ok(matches) if matches.is_empty() => ToolResult::ok("no matches"),
            Ok(matches) => ToolResult::ok(matches.join("\n")),
            Err(e) => ToolResult::failed(e.to_string()),
        }
    }
}

fn grep_tree(root: &std::path::Path, query: &str, limit: usize) -> std::io::Result<Vec<String>> {
    let mut matches = Vec::new();
    for entry in walkdir::WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(Result::ok)
    {
        if matches.len() >= limit {
            break;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        for (lineno, line) in content.lines().enumerate() {
            if line.contains(query) {
                matches.push(format!("{}:{}: {}", entry.path().display(), lineno + 1, line.trim()));
                if matches.len() >= limit {
                    break;
                }
            }
        }
    }
    Ok(matches)
}

/// Lists recently recorded file changes.
pub struct RecentChangesTool;

#[async_trait]
impl AgentTool for RecentChangesTool {
    fn name(&self) -> &'static str {
        "recent_changes"
    }

    fn description(&self) -> &'static str {
        "List file changes recorded since a given ISO-8601 timestamp."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "since": {"type": "string"},
                "limit": {"type": "integer", "default": 50}
            },
            "required": ["since"]
        })
    }

    async fn invoke(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let Some(since) = args.get("since").and_then(Value::as_str) else {
            return ToolResult::failed("missing required argument 'since'");
        };
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(50) as usize;

        match ctx.store.changes_since(since, limit) {
            Ok(rows) => {
                let lines: Vec<String> = rows
                    .into_iter()
                    .map(|(_, path, kind, _)| format!("{kind}: {path}"))
                    .collect();
                if lines.is_empty() {
                    ToolResult::ok("no changes in that window")
                } else {
                    ToolResult::ok(lines.join("\n"))
                }
            }
            Err(e) => ToolResult::failed(e.to_string()),
        }
    }
}

/// Looks up the semantic summaries recorded for a file path.
pub struct HistoryLookupTool;

#[async_trait]
impl AgentTool for HistoryLookupTool {
    fn name(&self) -> &'static str {
        "history_lookup"
    }

    fn description(&self) -> &'static str {
        "Search semantic summaries for a keyword or file path fragment."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer", "default": 10}
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let Some(query) = args.get("query").and_then(Value::as_str) else {
            return ToolResult::failed("missing required argument 'query'");
        };
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(10) as usize;

        match ctx.store.search_semantic(query, limit, None) {
            Ok(rows) if rows.is_empty() => ToolResult::ok("no matching entries"),
            Ok(rows) => ToolResult::ok(
                rows.into_iter()
                    .map(|(path, summary)| format!("{path}: {summary}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            Err(e) => ToolResult::failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_with_defaults_exposes_three_tools() {
        let registry = ToolRegistry::with_defaults();
        assert!(registry.get("notes_search").is_some());
        assert!(registry.get("recent_changes").is_some());
        assert!(registry.get("history_lookup").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.definitions().len(), 3);
    }

    #[tokio::test]
    async fn notes_search_rejects_missing_query() {
        let tool = NotesSearchTool;
        let dir = tempfile::TempDir::new().unwrap();
        let ctx = ToolContext {
            root: dir.path().to_path_buf(),
            store: store_for_test(&dir),
        };
        let result = tool.invoke(serde_json::json!({}), &ctx).await;
        assert!(!result.success);
    }

    fn store_for_test(dir: &tempfile::TempDir) -> Store {
        Store::open(&dir.path().join("t.db"), 1).unwrap()
    }
}
