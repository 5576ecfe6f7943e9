//! Expense and savings tools, called by the model via tool use

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ToolDefinition, ToolHandler};
use crate::db::ExpenseRepo;
use crate::{Error, Result};

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| Error::Tool(format!("invalid arguments: {e}")))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Record an expense and return the week's running total for its category
pub struct TrackExpense {
    repo: ExpenseRepo,
}

impl TrackExpense {
    #[must_use]
    pub const fn new(repo: ExpenseRepo) -> Self {
        Self { repo }
    }
}

#[derive(Deserialize)]
struct TrackExpenseArgs {
    amount: f64,
    category: String,
    #[serde(default)]
    description: String,
}

#[async_trait]
impl ToolHandler for TrackExpense {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "track_expense".to_string(),
            description: "Record an expense the user mentions.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "amount": {"type": "number"},
                    "category": {
                        "type": "string",
                        "enum": ["food", "transport", "housing", "health", "entertainment", "shopping", "utilities", "other"],
                    },
                    "description": {"type": "string"},
                },
                "required": ["amount", "category"],
            }),
        }
    }

    async fn call(&self, args: Value) -> Result<Value> {
        let args: TrackExpenseArgs = parse_args(args)?;
        self.repo
            .track(args.amount, &args.category, &args.description)?;
        let week_total = self.repo.category_total_since(&args.category, 7)?;

        Ok(json!({
            "status": "recorded",
            "amount": args.amount,
            "category": args.category,
            "description": args.description,
            "week_total_in_category": round2(week_total),
        }))
    }
}

/// Spending summary over a time period
pub struct GetSpendingSummary {
    repo: ExpenseRepo,
}

impl GetSpendingSummary {
    #[must_use]
    pub const fn new(repo: ExpenseRepo) -> Self {
        Self { repo }
    }
}

#[derive(Deserialize)]
struct SpendingSummaryArgs {
    #[serde(default = "default_month")]
    days: i64,
    category: Option<String>,
}

const fn default_month() -> i64 {
    30
}

#[async_trait]
impl ToolHandler for GetSpendingSummary {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_spending_summary".to_string(),
            description: "Get spending summary for a time period.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "days": {"type": "integer", "default": 30},
                    "category": {"type": "string", "description": "Optional: filter by category"},
                },
            }),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    async fn call(&self, args: Value) -> Result<Value> {
        let args: SpendingSummaryArgs = parse_args(args)?;
        let entries = self.repo.entries_since(args.days, args.category.as_deref())?;

        let mut by_category: Vec<(String, f64)> = Vec::new();
        for entry in &entries {
            match by_category.iter_mut().find(|(c, _)| *c == entry.category) {
                Some((_, total)) => *total += entry.amount,
                None => by_category.push((entry.category.clone(), entry.amount)),
            }
        }
        by_category.sort_by(|a, b| b.1.total_cmp(&a.1));

        let total: f64 = by_category.iter().map(|(_, v)| v).sum();
        let daily_avg = total / args.days.max(1) as f64;

        Ok(json!({
            "days": args.days,
            "total_spent": round2(total),
            "daily_average": round2(daily_avg),
            "by_category": by_category
                .iter()
                .map(|(c, v)| (c.clone(), json!(round2(*v))))
                .collect::<serde_json::Map<_, _>>(),
            "transaction_count": entries.len(),
            "recent": entries.iter().take(5).map(|e| json!({
                "amount": e.amount,
                "category": e.category,
                "description": e.description,
                "date": e.date(),
            })).collect::<Vec<_>>(),
        }))
    }
}

/// Savings plan against current spending patterns
pub struct CalculateSavingsGoal {
    repo: ExpenseRepo,
}

impl CalculateSavingsGoal {
    #[must_use]
    pub const fn new(repo: ExpenseRepo) -> Self {
        Self { repo }
    }
}

#[derive(Deserialize)]
struct SavingsGoalArgs {
    target_amount: f64,
    target_months: i64,
    monthly_income: Option<f64>,
}

#[async_trait]
impl ToolHandler for CalculateSavingsGoal {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "calculate_savings_goal".to_string(),
            description: "Calculate how to reach a savings target based on current spending patterns."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "target_amount": {"type": "number"},
                    "target_months": {"type": "integer"},
                    "monthly_income": {"type": "number"},
                },
                "required": ["target_amount", "target_months"],
            }),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    async fn call(&self, args: Value) -> Result<Value> {
        let args: SavingsGoalArgs = parse_args(args)?;
        let monthly_spending = self.repo.total_since(30)?;
        let by_category = self.repo.totals_by_category_since(30)?;

        let monthly_needed = args.target_amount / args.target_months.max(1) as f64;

        let mut result = json!({
            "target_amount": args.target_amount,
            "target_months": args.target_months,
            "monthly_savings_needed": round2(monthly_needed),
            "current_monthly_spending": round2(monthly_spending),
            "spending_by_category": by_category
                .iter()
                .map(|(c, v)| (c.clone(), json!(round2(*v))))
                .collect::<serde_json::Map<_, _>>(),
        });

        if let (Some(income), Some(obj)) = (args.monthly_income, result.as_object_mut()) {
            let current_savings = income - monthly_spending;
            obj.insert("monthly_income".to_string(), json!(income));
            obj.insert(
                "current_monthly_savings".to_string(),
                json!(round2(current_savings)),
            );
            obj.insert(
                "gap".to_string(),
                json!(round2(monthly_needed - current_savings)),
            );
            obj.insert("feasible".to_string(), json!(current_savings >= monthly_needed));
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn repo() -> ExpenseRepo {
        ExpenseRepo::new(db::init_memory().unwrap())
    }

    #[tokio::test]
    async fn track_expense_returns_week_total() {
        let repo = repo();
        repo.track(10.0, "food", "").unwrap();

        let result = TrackExpense::new(repo)
            .call(json!({"amount": 5.5, "category": "food", "description": "snack"}))
            .await
            .unwrap();

        assert_eq!(result["status"], "recorded");
        assert_eq!(result["week_total_in_category"], 15.5);
    }

    #[tokio::test]
    async fn spending_summary_aggregates() {
        let repo = repo();
        repo.track(20.0, "food", "groceries").unwrap();
        repo.track(40.0, "transport", "fuel").unwrap();
        repo.track(10.0, "food", "lunch").unwrap();

        let result = GetSpendingSummary::new(repo)
            .call(json!({"days": 30}))
            .await
            .unwrap();

        assert_eq!(result["total_spent"], 70.0);
        assert_eq!(result["transaction_count"], 3);
        assert_eq!(result["by_category"]["food"], 30.0);
        assert_eq!(result["recent"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn savings_goal_with_income_reports_feasibility() {
        let repo = repo();
        repo.track(1000.0, "housing", "rent").unwrap();

        let result = CalculateSavingsGoal::new(repo)
            .call(json!({"target_amount": 1200, "target_months": 6, "monthly_income": 3000}))
            .await
            .unwrap();

        assert_eq!(result["monthly_savings_needed"], 200.0);
        assert_eq!(result["current_monthly_savings"], 2000.0);
        assert_eq!(result["feasible"], true);
    }
}
