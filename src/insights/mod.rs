//! A uniform `{id, metadata, calculate}` capability with a registry keyed
//! by id, grounded in `original_source/backend/insights/base.py`'s
//! `BaseInsight`/`execute` pattern -- `execute` validates the date range
//! and wraps `calculate` so a misconfigured range or an internal error
//! surfaces as `InsightResult {error: Some(..)}` rather than a panic or
//! propagated `Result::Err`.

pub mod plugins;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightCategory {
    Activity,
    Code,
    Semantic,
    Trends,
}

#[derive(Debug, Clone, Serialize)]
pub struct InsightMetadata {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub category: InsightCategory,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct InsightData {
    pub value: String,
    pub label: Option<String>,
    pub trend: Option<String>,
    pub details: Option<Value>,
    pub status: String,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InsightResult {
    pub metadata: InsightMetadata,
    pub data: Option<InsightData>,
    pub calculated_at: DateTime<Utc>,
    pub error: Option<String>,
}

pub trait Insight: Send + Sync {
    fn metadata(&self) -> InsightMetadata;
    fn calculate(&self, start: DateTime<Utc>, end: DateTime<Utc>, store: &Store) -> Result<InsightData, String>;

    /// Validates the range, runs `calculate`, and converts any error (or an
    /// invalid range) into `InsightResult.error` -- `calculate` itself is
    /// never allowed to propagate a `Result::Err` across the registry
    /// boundary or panic.
    fn execute(&self, start: DateTime<Utc>, end: DateTime<Utc>, store: &Store) -> InsightResult {
        let metadata = self.metadata();
        let now = Utc::now();

        if start > end {
            return InsightResult {
                metadata,
                data: None,
                calculated_at: now,
                error: Some("start_date must be before or equal to end_date".to_string()),
            };
        }
        if end > now {
            return InsightResult {
                metadata,
                data: None,
                calculated_at: now,
                error: Some("end_date cannot be in the future".to_string()),
            };
        }

        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.calculate(start, end, store))) {
            Ok(Ok(data)) => InsightResult {
                metadata,
                data: Some(data),
                calculated_at: now,
                error: None,
            },
            Ok(Err(message)) => InsightResult {
                metadata,
                data: None,
                calculated_at: now,
                error: Some(message),
            },
            Err(_) => InsightResult {
                metadata,
                data: None,
                calculated_at: now,
                error: Some("insight calculation panicked".to_string()),
            },
        }
    }
}

pub struct InsightsRegistry {
    insights: HashMap<&'static str, Box<dyn Insight>>,
}

impl InsightsRegistry {
    pub fn new() -> Self {
        InsightsRegistry { insights: HashMap::new() }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(plugins::FileActivityInsight));
        registry.register(Box::new(plugins::PeakActivityInsight));
        registry.register(Box::new(plugins::TrendingFilesInsight));
        registry.register(Box::new(plugins::CodeMetricsInsight));
        registry.register(Box::new(plugins::StaleTodosInsight));
        registry.register(Box::new(plugins::OrphanMentionsInsight));
        registry
    }

    pub fn register(&mut self, insight: Box<dyn Insight>) {
        self.insights.insert(insight.metadata().id, insight);
    }

    pub fn list_metadata(&self) -> Vec<InsightMetadata> {
        self.insights.values().map(|i| i.metadata()).collect()
    }

    pub fn calculate(&self, id: &str, start: DateTime<Utc>, end: DateTime<Utc>, store: &Store) -> Option<InsightResult> {
        self.insights.get(id).map(|insight| insight.execute(start, end, store))
    }
}

impl Default for InsightsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn calculate_reports_an_error_result_for_a_misconfigured_range_rather_than_panicking() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("t.db"), 1).unwrap();
        let registry = InsightsRegistry::with_defaults();
        let now = Utc::now();
        let result = registry.calculate("file_activity", now, now - Duration::hours(1), &store).unwrap();
        assert!(result.error.is_some());
        assert!(result.data.is_none());
    }

    #[test]
    fn registry_with_defaults_exposes_all_six_insights() {
        let registry = InsightsRegistry::with_defaults();
        assert_eq!(registry.list_metadata().len(), 6);
    }
}
