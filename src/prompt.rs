//! System prompt assembly
//!
//! Static persona and tool directives plus a dynamic snapshot of recent
//! health data, regenerated per turn so replies stay body-aware.

use crate::db::HealthRepo;

/// Static persona and voice constraints
const PERSONA: &str = "\
You are Aegis, a voice health and wealth assistant worn as a pendant.

## Voice Constraints
- Speak concisely: 1-2 sentences for simple queries, up to 4 for complex analysis
- Respond as if talking to a friend — warm, supportive, actionable
- Never mention you're an AI or reference using tools

## Core Capabilities
- Health tracking: sleep, exercise, mood, weight, heart rate, steps, water intake
- Expense management: track spending, categorize, analyze patterns
- Proactive insights: notice correlations, suggest improvements";

/// Tool use directives
const TOOL_DIRECTIVES: &str = "\
## Tool Use Behavioral Directives
- ALWAYS use tools to look up user data — never guess or make up numbers
- When logging data, confirm what was saved + provide brief context
- For complex correlations (sleep→mood, spending→categories), use multiple tools
- For patterns over time, call get_health_context or get_spending_summary first";

/// Assemble the full system prompt for one turn
#[must_use]
pub fn build_system_prompt(health: &HealthRepo) -> String {
    format!(
        "{PERSONA}\n\n## Current User Context (last 7 days)\n{}\n\n{TOOL_DIRECTIVES}",
        build_health_context(health)
    )
}

/// Concise health snapshot for system prompt injection
///
/// A short per-metric summary of the last 7 days, or a fixed line when no
/// data has been logged yet.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn build_health_context(health: &HealthRepo) -> String {
    let Ok(entries) = health.entries_since(7, None, false) else {
        return "No recent health data available.".to_string();
    };
    if entries.is_empty() {
        return "No recent health data available.".to_string();
    }

    let values_of = |metric: &str| -> Vec<f64> {
        entries
            .iter()
            .filter(|e| e.metric == metric)
            .map(|e| e.value)
            .collect()
    };

    let mut parts = Vec::new();

    let sleep = values_of("sleep_hours");
    if !sleep.is_empty() {
        let avg = sleep.iter().sum::<f64>() / sleep.len() as f64;
        let min = sleep.iter().copied().fold(f64::INFINITY, f64::min);
        let max = sleep.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        parts.push(format!(
            "Sleep: avg {avg:.1}h/night over {} nights (range {min:.1}-{max:.1}h)",
            sleep.len()
        ));
    }

    let exercise = values_of("exercise_minutes");
    if !exercise.is_empty() {
        let total: f64 = exercise.iter().sum();
        parts.push(format!(
            "Exercise: {} min total, {} min/day avg",
            total as i64,
            (total / 7.0) as i64
        ));
    }

    let mood = values_of("mood");
    if !mood.is_empty() {
        let avg = mood.iter().sum::<f64>() / mood.len() as f64;
        parts.push(format!("Mood: avg {avg:.1}/5 over {} check-ins", mood.len()));
    }

    if parts.is_empty() {
        return "Health data logged recently, but no sleep/exercise/mood entries.".to_string();
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn empty_db_yields_fixed_line() {
        let repo = HealthRepo::new(db::init_memory().unwrap());
        assert_eq!(build_health_context(&repo), "No recent health data available.");
    }

    #[test]
    fn snapshot_summarizes_logged_metrics() {
        let repo = HealthRepo::new(db::init_memory().unwrap());
        repo.log("sleep_hours", 6.0, "").unwrap();
        repo.log("sleep_hours", 8.0, "").unwrap();
        repo.log("mood", 4.0, "").unwrap();

        let context = build_health_context(&repo);
        assert!(context.contains("avg 7.0h/night over 2 nights"));
        assert!(context.contains("Mood: avg 4.0/5"));
    }

    #[test]
    fn full_prompt_carries_all_layers() {
        let repo = HealthRepo::new(db::init_memory().unwrap());
        let prompt = build_system_prompt(&repo);
        assert!(prompt.contains("You are Aegis"));
        assert!(prompt.contains("Current User Context"));
        assert!(prompt.contains("Tool Use Behavioral Directives"));
    }
}
