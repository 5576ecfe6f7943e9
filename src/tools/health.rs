//! Health tracking tools, called by the model via tool use

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ToolDefinition, ToolHandler};
use crate::db::HealthRepo;
use crate::{Error, Result};

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| Error::Tool(format!("invalid arguments: {e}")))
}

/// Recent health data grouped per metric with summary statistics
pub struct GetHealthContext {
    repo: HealthRepo,
}

impl GetHealthContext {
    #[must_use]
    pub const fn new(repo: HealthRepo) -> Self {
        Self { repo }
    }
}

#[derive(Deserialize)]
struct GetHealthContextArgs {
    #[serde(default = "default_week")]
    days: i64,
    metrics: Option<Vec<String>>,
}

const fn default_week() -> i64 {
    7
}

#[async_trait]
impl ToolHandler for GetHealthContext {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_health_context".to_string(),
            description: "Get user's recent health data (sleep, steps, heart rate, mood, weight). \
                          Call this when user asks about their health."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "days": {"type": "integer", "description": "Number of days to look back", "default": 7},
                    "metrics": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Which metrics: sleep_hours, steps, heart_rate, mood, weight, water, exercise_minutes",
                    },
                },
            }),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    async fn call(&self, args: Value) -> Result<Value> {
        let args: GetHealthContextArgs = parse_args(args)?;
        let entries = self
            .repo
            .entries_since(args.days, args.metrics.as_deref(), false)?;

        // Group by metric, newest first within each group
        let mut grouped: BTreeMap<String, Vec<&crate::db::HealthEntry>> = BTreeMap::new();
        for entry in &entries {
            grouped.entry(entry.metric.clone()).or_default().push(entry);
        }

        let mut summary = serde_json::Map::new();
        for (metric, entries) in grouped {
            let values: Vec<f64> = entries.iter().map(|e| e.value).collect();
            let count = values.len();
            let avg = values.iter().sum::<f64>() / count as f64;
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            summary.insert(
                metric,
                json!({
                    "entries": entries.iter().take(10).map(|e| json!({
                        "value": e.value,
                        "notes": e.notes,
                        "date": e.date(),
                    })).collect::<Vec<_>>(),
                    "count": count,
                    "avg": round1(avg),
                    "min": round1(min),
                    "max": round1(max),
                }),
            );
        }

        Ok(json!({"days": args.days, "data": summary}))
    }
}

/// Log one health data point
pub struct LogHealth {
    repo: HealthRepo,
}

impl LogHealth {
    #[must_use]
    pub const fn new(repo: HealthRepo) -> Self {
        Self { repo }
    }
}

#[derive(Deserialize)]
struct LogHealthArgs {
    metric: String,
    value: f64,
    #[serde(default)]
    notes: String,
}

#[async_trait]
impl ToolHandler for LogHealth {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "log_health".to_string(),
            description: "Log a health data point the user reports.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "metric": {
                        "type": "string",
                        "enum": ["sleep_hours", "steps", "heart_rate", "mood", "weight", "water", "exercise_minutes"],
                    },
                    "value": {"type": "number"},
                    "notes": {"type": "string"},
                },
                "required": ["metric", "value"],
            }),
        }
    }

    async fn call(&self, args: Value) -> Result<Value> {
        let args: LogHealthArgs = parse_args(args)?;
        self.repo.log(&args.metric, args.value, &args.notes)?;
        Ok(json!({"status": "logged", "metric": args.metric, "value": args.value}))
    }
}

/// Per-day metric grid for trend and correlation analysis
pub struct AnalyzeHealthPatterns {
    repo: HealthRepo,
}

impl AnalyzeHealthPatterns {
    #[must_use]
    pub const fn new(repo: HealthRepo) -> Self {
        Self { repo }
    }
}

#[derive(Deserialize)]
struct AnalyzePatternsArgs {
    query: String,
    #[serde(default = "default_month")]
    days: i64,
}

const fn default_month() -> i64 {
    30
}

#[async_trait]
impl ToolHandler for AnalyzeHealthPatterns {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "analyze_health_patterns".to_string(),
            description: "Deep analysis of health trends and correlations. Use for complex \
                          questions about health patterns over time."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "What pattern to analyze"},
                    "days": {"type": "integer", "default": 30},
                },
                "required": ["query"],
            }),
        }
    }

    async fn call(&self, args: Value) -> Result<Value> {
        let args: AnalyzePatternsArgs = parse_args(args)?;
        let entries = self.repo.entries_since(args.days, None, true)?;

        // One row per day with that day's metric values, for correlations
        let mut by_date: BTreeMap<String, serde_json::Map<String, Value>> = BTreeMap::new();
        for entry in &entries {
            by_date
                .entry(entry.date().to_string())
                .or_default()
                .insert(entry.metric.clone(), json!(entry.value));
        }

        let daily: Vec<Value> = by_date
            .into_iter()
            .map(|(date, mut metrics)| {
                metrics.insert("date".to_string(), json!(date));
                Value::Object(metrics)
            })
            .collect();

        Ok(json!({
            "query": args.query,
            "days_analyzed": args.days,
            "total_records": entries.len(),
            "daily_data": daily,
        }))
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn repo() -> HealthRepo {
        HealthRepo::new(db::init_memory().unwrap())
    }

    #[tokio::test]
    async fn health_context_summarizes_per_metric() {
        let repo = repo();
        repo.log("sleep_hours", 6.0, "").unwrap();
        repo.log("sleep_hours", 8.0, "").unwrap();
        repo.log("mood", 4.0, "good day").unwrap();

        let result = GetHealthContext::new(repo)
            .call(json!({"days": 7}))
            .await
            .unwrap();

        let sleep = &result["data"]["sleep_hours"];
        assert_eq!(sleep["count"], 2);
        assert_eq!(sleep["avg"], 7.0);
        assert_eq!(sleep["min"], 6.0);
        assert_eq!(sleep["max"], 8.0);
        assert_eq!(result["data"]["mood"]["entries"][0]["notes"], "good day");
    }

    #[tokio::test]
    async fn patterns_grid_groups_by_date() {
        let repo = repo();
        repo.log("sleep_hours", 7.0, "").unwrap();
        repo.log("mood", 3.0, "").unwrap();

        let result = AnalyzeHealthPatterns::new(repo)
            .call(json!({"query": "sleep vs mood"}))
            .await
            .unwrap();

        assert_eq!(result["total_records"], 2);
        let day = &result["daily_data"][0];
        assert_eq!(day["sleep_hours"], 7.0);
        assert_eq!(day["mood"], 3.0);
        assert!(day["date"].is_string());
    }

    #[tokio::test]
    async fn log_health_persists() {
        let repo = repo();
        let result = LogHealth::new(repo.clone())
            .call(json!({"metric": "water", "value": 2.0}))
            .await
            .unwrap();
        assert_eq!(result["status"], "logged");
        assert_eq!(repo.entries_since(1, None, false).unwrap().len(), 1);
    }
}
