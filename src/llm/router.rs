//! Model tier routing
//!
//! Routes analysis-shaped queries to the deep tier and everything else to
//! the fast tier. Pure and deterministic so it is testable in isolation.

/// Reasoning tier selected per query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// Low latency, short token budget
    Fast,
    /// Higher token budget, extended thinking enabled
    Deep,
}

/// Phrases that route a query to the deep tier
const DEEP_TRIGGERS: &[&str] = &[
    "analyze",
    "pattern",
    "trend",
    "plan",
    "correlat",
    "compare",
    "why am i",
    "why do i",
    "what's causing",
    "relationship between",
    "over time",
    "savings goal",
    "financial plan",
    "budget plan",
];

/// Select the reasoning tier for a query
///
/// Case-insensitive substring match against the trigger list; any hit selects
/// the deep tier.
#[must_use]
pub fn select_tier(text: &str) -> ModelTier {
    let lower = text.to_lowercase();
    for trigger in DEEP_TRIGGERS {
        if lower.contains(trigger) {
            tracing::debug!(trigger, "routing to deep tier");
            return ModelTier::Deep;
        }
    }
    ModelTier::Fast
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_queries_take_the_fast_tier() {
        assert_eq!(select_tier("log eight hours of sleep"), ModelTier::Fast);
        assert_eq!(select_tier("what did I spend on food today?"), ModelTier::Fast);
        assert_eq!(select_tier(""), ModelTier::Fast);
    }

    #[test]
    fn analysis_vocabulary_takes_the_deep_tier() {
        assert_eq!(select_tier("analyze my sleep this month"), ModelTier::Deep);
        assert_eq!(
            select_tier("what's the relationship between sleep and mood?"),
            ModelTier::Deep
        );
        assert_eq!(select_tier("help me make a budget plan"), ModelTier::Deep);
        assert_eq!(select_tier("how is my spending trending?"), ModelTier::Deep);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(select_tier("ANALYZE my spending"), ModelTier::Deep);
        assert_eq!(select_tier("Why Am I tired every morning?"), ModelTier::Deep);
    }

    #[test]
    fn partial_stem_matches() {
        // "correlat" covers correlate/correlation/correlated
        assert_eq!(select_tier("is my mood correlated with sleep"), ModelTier::Deep);
    }

    #[test]
    fn same_input_same_tier() {
        let query = "compare this week to last week";
        assert_eq!(select_tier(query), select_tier(query));
    }
}
