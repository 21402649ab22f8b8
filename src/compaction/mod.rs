//! Context compaction pipeline.
//!
//! Measures a context, decides whether it has grown past its limit, and if
//! so compresses, validates and persists it.
//!
//! ## Configuration
//!
//! The limit is configured in `tether.toml`:
//!
//! ```toml
//! [defaults]
//! context_budget = 200000
//! context_limit = "80%"  # Percentage of the budget, or absolute tokens
//!
//! [plans.overrides."hotfix-*"]
//! context_limit = "60%"
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use tether::compaction::{CompactionEngine, EngineSettings, RunOptions};
//!
//! let engine = CompactionEngine::new(EngineSettings::default(), repo_root);
//! let outcome = engine.run(&raw, &RunOptions::new("importer"))?;
//! ```

mod config;
mod engine;
mod trigger;

pub use config::{ContextLimit, parse_context_limit};
pub use engine::{CompactionEngine, CompactionOutcome, CompactionReport, RunOptions};
pub use trigger::{TriggerCheck, TriggerDecision};

use crate::evidence::EvidenceSettings;
use crate::strategy::{DEFAULT_MIN_COMPRESS_CHARS, DEFAULT_TARGET_RATIO};
use crate::validator::ValidationSettings;

/// Default context budget in tokens.
pub const DEFAULT_CONTEXT_BUDGET: u64 = 200_000;

/// Resolved settings for one plan.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub context_budget: u64,
    pub context_limit: ContextLimit,
    pub target_ratio: f64,
    pub min_compress_chars: usize,
    pub evidence: EvidenceSettings,
    pub validation: ValidationSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            context_budget: DEFAULT_CONTEXT_BUDGET,
            context_limit: ContextLimit::default(),
            target_ratio: DEFAULT_TARGET_RATIO,
            min_compress_chars: DEFAULT_MIN_COMPRESS_CHARS,
            evidence: EvidenceSettings::default(),
            validation: ValidationSettings::default(),
        }
    }
}

impl EngineSettings {
    pub fn trigger_check(&self) -> TriggerCheck {
        TriggerCheck::new(self.context_limit, self.context_budget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = EngineSettings::default();
        assert_eq!(settings.context_budget, 200_000);
        assert_eq!(settings.trigger_check().threshold(), 160_000);
        assert_eq!(settings.target_ratio, 0.5);
        assert_eq!(settings.evidence.max_commits, 50);
    }
}
