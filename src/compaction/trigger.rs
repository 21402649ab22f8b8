//! Deciding when a context is large enough to compact.

use super::config::ContextLimit;
use crate::analyzer::SizeEstimate;
use serde::Serialize;

/// Outcome of a trigger check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerDecision {
    pub triggered: bool,
    pub estimated_tokens: u64,
    /// Token count at which compaction triggers.
    pub threshold: u64,
    /// Estimate as a percentage of the context budget.
    pub usage_percent: f64,
    pub reason: String,
}

/// Compares a size estimate against the configured limit.
#[derive(Debug, Clone, Copy)]
pub struct TriggerCheck {
    limit: ContextLimit,
    budget_tokens: u64,
}

impl TriggerCheck {
    pub fn new(limit: ContextLimit, budget_tokens: u64) -> Self {
        Self {
            limit,
            budget_tokens,
        }
    }

    pub fn threshold(&self) -> u64 {
        self.limit.effective_limit(self.budget_tokens)
    }

    pub fn evaluate(&self, estimate: &SizeEstimate) -> TriggerDecision {
        let threshold = self.threshold();
        let estimated_tokens = estimate.estimated_tokens;
        let usage_percent = if self.budget_tokens == 0 {
            100.0
        } else {
            estimated_tokens as f64 / self.budget_tokens as f64 * 100.0
        };
        let triggered = estimated_tokens >= threshold;
        let reason = if triggered {
            format!(
                "~{} tokens reached the {} limit ({} tokens)",
                estimated_tokens, self.limit, threshold
            )
        } else {
            format!(
                "~{} tokens is below the {} limit ({} tokens)",
                estimated_tokens, self.limit, threshold
            )
        };
        TriggerDecision {
            triggered,
            estimated_tokens,
            threshold,
            usage_percent,
            reason,
        }
    }

    /// A decision that compacts regardless of size.
    pub fn forced(&self, estimate: &SizeEstimate) -> TriggerDecision {
        let mut decision = self.evaluate(estimate);
        if !decision.triggered {
            decision.triggered = true;
            decision.reason = format!("forced ({})", decision.reason);
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(tokens: u64) -> SizeEstimate {
        SizeEstimate {
            estimated_tokens: tokens,
            confidence_band: (tokens, tokens),
        }
    }

    #[test]
    fn test_percentage_threshold() {
        let check = TriggerCheck::new(ContextLimit::Percentage(80.0), 1000);
        assert_eq!(check.threshold(), 800);

        let below = check.evaluate(&estimate(799));
        assert!(!below.triggered);
        assert!(below.reason.contains("below the 80% limit"));

        let at = check.evaluate(&estimate(800));
        assert!(at.triggered);
        assert!((at.usage_percent - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_absolute_threshold() {
        let check = TriggerCheck::new(ContextLimit::Absolute(500), 200_000);
        assert!(check.evaluate(&estimate(500)).triggered);
        assert!(!check.evaluate(&estimate(499)).triggered);
    }

    #[test]
    fn test_forced() {
        let check = TriggerCheck::new(ContextLimit::default(), 200_000);
        let decision = check.forced(&estimate(10));
        assert!(decision.triggered);
        assert!(decision.reason.starts_with("forced"));
    }

    #[test]
    fn test_zero_budget() {
        let check = TriggerCheck::new(ContextLimit::Percentage(80.0), 0);
        let decision = check.evaluate(&estimate(0));
        assert!(decision.triggered);
        assert_eq!(decision.usage_percent, 100.0);
    }
}
