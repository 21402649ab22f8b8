//! Token estimation.
//!
//! Code and tables tokenize more densely than prose, so the estimate adds
//! per-character penalties for them on top of a per-word base rate, plus a
//! fixed overhead for every line of formatting.

use super::segment::{ContentCategory, segment};
use serde::{Deserialize, Serialize};

/// Base tokens per whitespace-delimited word.
pub const TOKENS_PER_WORD: f64 = 1.3;
/// Extra tokens per character inside fenced code.
pub const CODE_DENSITY_PENALTY: f64 = 0.12;
/// Extra tokens per character inside table rows.
pub const TABLE_DENSITY_PENALTY: f64 = 0.08;
/// Formatting overhead per line.
pub const LINE_OVERHEAD: f64 = 0.5;
/// Half-width of the confidence band, as a fraction of the estimate.
pub const CONFIDENCE_MARGIN: f64 = 0.10;

/// Estimated token count with a confidence band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeEstimate {
    pub estimated_tokens: u64,
    /// `(low, high)` bounds of the estimate.
    pub confidence_band: (u64, u64),
}

impl SizeEstimate {
    /// Build an estimate from the raw size measurements.
    pub fn from_counts(words: usize, code_chars: usize, table_chars: usize, lines: usize) -> Self {
        let raw = words as f64 * TOKENS_PER_WORD
            + code_chars as f64 * CODE_DENSITY_PENALTY
            + table_chars as f64 * TABLE_DENSITY_PENALTY
            + lines as f64 * LINE_OVERHEAD;
        let estimated_tokens = raw.ceil() as u64;
        let low = (estimated_tokens as f64 * (1.0 - CONFIDENCE_MARGIN)).floor() as u64;
        let high = (estimated_tokens as f64 * (1.0 + CONFIDENCE_MARGIN)).ceil() as u64;
        Self {
            estimated_tokens,
            confidence_band: (low, high),
        }
    }

    pub fn zero() -> Self {
        Self::from_counts(0, 0, 0, 0)
    }
}

impl std::fmt::Display for SizeEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "~{} tokens ({}-{})",
            self.estimated_tokens, self.confidence_band.0, self.confidence_band.1
        )
    }
}

/// Estimate the token count of arbitrary text.
pub fn estimate_text(text: &str) -> SizeEstimate {
    let mut code_chars = 0;
    let mut table_chars = 0;
    for span in segment(text) {
        match span.category {
            ContentCategory::Code => code_chars += span.text(text).chars().count(),
            ContentCategory::Table => table_chars += span.text(text).chars().count(),
            ContentCategory::Prose | ContentCategory::List => {}
        }
    }
    SizeEstimate::from_counts(
        text.split_whitespace().count(),
        code_chars,
        table_chars,
        text.lines().count(),
    )
}
