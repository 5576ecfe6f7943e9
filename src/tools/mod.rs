//! Tool dispatch boundary
//!
//! A typed registry from tool name to handler. Dispatch never errors:
//! unknown names, schema violations, handler failures, and timeouts all
//! come back as error-shaped JSON that is fed to the model like any other
//! tool result, keeping the generation loop's control flow uniform.

mod health;
mod wealth;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};

use crate::Result;
use crate::db::{ExpenseRepo, HealthRepo};

pub use health::{AnalyzeHealthPatterns, GetHealthContext, LogHealth};
pub use wealth::{CalculateSavingsGoal, GetSpendingSummary, TrackExpense};

/// Tool schema advertised to the model
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A tool handler with a fixed JSON-in/JSON-out signature
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Schema advertised to the model
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool
    ///
    /// # Errors
    ///
    /// Returns error on invalid arguments or storage failure; captured at
    /// the dispatch boundary, never propagated past it.
    async fn call(&self, args: Value) -> Result<Value>;
}

/// Typed name → handler registry
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    timeout: Duration,
}

impl ToolRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            handlers: HashMap::new(),
            timeout,
        }
    }

    /// Registry with the bundled health and expense tools
    #[must_use]
    pub fn with_builtin_tools(
        health: HealthRepo,
        expenses: ExpenseRepo,
        timeout: Duration,
    ) -> Self {
        let mut registry = Self::new(timeout);
        registry.register(Arc::new(GetHealthContext::new(health.clone())));
        registry.register(Arc::new(LogHealth::new(health.clone())));
        registry.register(Arc::new(AnalyzeHealthPatterns::new(health)));
        registry.register(Arc::new(TrackExpense::new(expenses.clone())));
        registry.register(Arc::new(GetSpendingSummary::new(expenses.clone())));
        registry.register(Arc::new(CalculateSavingsGoal::new(expenses)));
        registry
    }

    /// Register a handler under its declared name
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        self.handlers
            .insert(handler.definition().name, handler);
    }

    /// Schemas of all registered tools
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .handlers
            .values()
            .map(|h| h.definition())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Dispatch a tool call; never errors
    ///
    /// Unknown name, missing required arguments, handler errors, and
    /// timeouts all produce an error-shaped JSON object.
    pub async fn dispatch(&self, name: &str, args: &Value) -> Value {
        let Some(handler) = self.handlers.get(name) else {
            tracing::warn!(tool = name, "unknown tool requested");
            return json!({"error": format!("unknown tool: {name}")});
        };

        if let Err(message) = validate_args(&handler.definition().input_schema, args) {
            tracing::warn!(tool = name, %message, "tool arguments rejected");
            return json!({"error": message});
        }

        match tokio::time::timeout(self.timeout, handler.call(args.clone())).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::warn!(tool = name, error = %e, "tool handler failed");
                json!({"error": e.to_string()})
            }
            Err(_) => {
                tracing::warn!(tool = name, timeout_ms = self.timeout.as_millis(), "tool timed out");
                json!({"error": format!("tool {name} timed out")})
            }
        }
    }
}

/// Check the argument object against the tool's declared schema
///
/// Enforces that arguments are an object and every `required` key is present.
fn validate_args(schema: &Value, args: &Value) -> std::result::Result<(), String> {
    let Some(args_obj) = args.as_object() else {
        return Err("arguments must be a JSON object".to_string());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !args_obj.contains_key(key) {
                return Err(format!("missing required argument: {key}"));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn registry() -> ToolRegistry {
        let pool = db::init_memory().unwrap();
        ToolRegistry::with_builtin_tools(
            HealthRepo::new(pool.clone()),
            ExpenseRepo::new(pool),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn unknown_tool_yields_error_json() {
        let result = registry().dispatch("no_such_tool", &json!({})).await;
        assert!(result["error"].as_str().unwrap().contains("unknown tool"));
    }

    #[tokio::test]
    async fn missing_required_argument_yields_error_json() {
        let result = registry()
            .dispatch("log_health", &json!({"metric": "steps"}))
            .await;
        assert!(
            result["error"]
                .as_str()
                .unwrap()
                .contains("missing required argument: value")
        );
    }

    #[tokio::test]
    async fn non_object_arguments_yield_error_json() {
        let result = registry().dispatch("log_health", &json!([1, 2])).await;
        assert!(result["error"].as_str().unwrap().contains("JSON object"));
    }

    #[tokio::test]
    async fn successful_dispatch_returns_handler_result() {
        let result = registry()
            .dispatch("log_health", &json!({"metric": "steps", "value": 8000}))
            .await;
        assert_eq!(result["status"], "logged");
        assert_eq!(result["metric"], "steps");
    }

    #[test]
    fn all_builtin_tools_are_registered() {
        let names: Vec<String> = registry()
            .definitions()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "analyze_health_patterns",
                "calculate_savings_goal",
                "get_health_context",
                "get_spending_summary",
                "log_health",
                "track_expense",
            ]
        );
    }

    #[tokio::test]
    async fn slow_handler_times_out_as_error_json() {
        struct Sleeper;

        #[async_trait]
        impl ToolHandler for Sleeper {
            fn definition(&self) -> ToolDefinition {
                ToolDefinition {
                    name: "sleeper".to_string(),
                    description: "sleeps".to_string(),
                    input_schema: json!({"type": "object"}),
                }
            }

            async fn call(&self, _args: Value) -> crate::Result<Value> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(json!({}))
            }
        }

        let mut registry = ToolRegistry::new(Duration::from_millis(20));
        registry.register(Arc::new(Sleeper));
        let result = registry.dispatch("sleeper", &json!({})).await;
        assert!(result["error"].as_str().unwrap().contains("timed out"));
    }
}
