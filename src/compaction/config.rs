//! Context limit parsing.

use anyhow::{Context, Result};

/// The size at which compaction triggers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContextLimit {
    /// Percentage of the context budget (e.g., 80%)
    Percentage(f32),
    /// Absolute token count
    Absolute(u64),
}

impl ContextLimit {
    /// The limit in tokens for a context budget of `budget_tokens`.
    pub fn effective_limit(&self, budget_tokens: u64) -> u64 {
        match self {
            ContextLimit::Percentage(pct) => ((budget_tokens as f64) * (*pct as f64 / 100.0)) as u64,
            ContextLimit::Absolute(tokens) => *tokens,
        }
    }
}

impl Default for ContextLimit {
    fn default() -> Self {
        ContextLimit::Percentage(80.0)
    }
}

impl std::fmt::Display for ContextLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextLimit::Percentage(pct) => write!(f, "{}%", pct),
            ContextLimit::Absolute(tokens) => write!(f, "{}", tokens),
        }
    }
}

impl std::str::FromStr for ContextLimit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_context_limit(s)
    }
}

/// Parse a context limit string.
///
/// Accepts a percentage of the budget (`"80%"`, `"33.5%"`) or an absolute
/// token count (`"150000"`).
pub fn parse_context_limit(s: &str) -> Result<ContextLimit> {
    let s = s.trim();

    if s.is_empty() {
        anyhow::bail!("Context limit cannot be empty");
    }

    if let Some(num_str) = s.strip_suffix('%') {
        let pct: f32 = num_str
            .trim()
            .parse()
            .with_context(|| format!("Invalid percentage in context limit: {}", s))?;

        if !(pct > 0.0 && pct <= 100.0) {
            anyhow::bail!(
                "Context limit percentage must be between 0 and 100, got {}",
                pct
            );
        }

        Ok(ContextLimit::Percentage(pct))
    } else {
        let tokens: u64 = s
            .parse()
            .with_context(|| format!("Invalid absolute context limit: {}", s))?;

        if tokens == 0 {
            anyhow::bail!("Context limit cannot be zero");
        }

        Ok(ContextLimit::Absolute(tokens))
    }
}
