//! Compression strategy selection.
//!
//! The selector maps a [`ContentProfile`] onto an ordered list of
//! transforms using a fixed decision table:
//!
//! | Dominant category (≥30% of chars) | Transform                      |
//! |-----------------------------------|--------------------------------|
//! | code                              | code-signature-preservation    |
//! | table                             | table-consolidation            |
//! | prose                             | extractive-summarization       |
//! | list                              | list-deduplication             |
//! | none                              | all, by descending share       |
//!
//! Categories are checked in the order above and the first dominant one
//! wins. Content below the size floor gets a no-op plan.

use crate::analyzer::{AnchorKind, ContentCategory, ContentProfile, MustKeepFragment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Minimum character share for a category to dominate.
pub const DOMINANCE_THRESHOLD: f64 = 0.30;
/// Lowest target ratio a real plan may use.
pub const MIN_TARGET_RATIO: f64 = 0.3;
/// Highest target ratio a real plan may use.
pub const MAX_TARGET_RATIO: f64 = 0.7;
/// Ceiling applied when prose dominates; extractive summaries cut deeper.
pub const PROSE_MAX_TARGET_RATIO: f64 = 0.5;
/// Target ratio of a no-op plan.
pub const NOOP_TARGET_RATIO: f64 = 1.0;
/// Default requested ratio when none (or an invalid one) is given.
pub const DEFAULT_TARGET_RATIO: f64 = 0.5;
/// Content smaller than this many characters is not worth compressing.
pub const DEFAULT_MIN_COMPRESS_CHARS: usize = 800;

/// Identifier of a compression transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformKind {
    CodeSignaturePreservation,
    TableConsolidation,
    ExtractiveSummarization,
    ListDeduplication,
}

impl TransformKind {
    /// The transform responsible for a content category.
    pub fn for_category(category: ContentCategory) -> Self {
        match category {
            ContentCategory::Code => TransformKind::CodeSignaturePreservation,
            ContentCategory::Table => TransformKind::TableConsolidation,
            ContentCategory::Prose => TransformKind::ExtractiveSummarization,
            ContentCategory::List => TransformKind::ListDeduplication,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            TransformKind::CodeSignaturePreservation => "code-signature-preservation",
            TransformKind::TableConsolidation => "table-consolidation",
            TransformKind::ExtractiveSummarization => "extractive-summarization",
            TransformKind::ListDeduplication => "list-deduplication",
        }
    }
}

impl std::fmt::Display for TransformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// An ordered set of transforms plus the fragments they must not touch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionPlan {
    pub selected_transforms: Vec<TransformKind>,
    /// Desired output size as a fraction of input size.
    pub target_ratio: f64,
    /// IDs of protected fragments. Always contains the required anchors.
    pub must_keep: BTreeSet<AnchorKind>,
    /// Texts of the protected fragments.
    pub anchors: Vec<MustKeepFragment>,
    /// Category that drove the decision, if one dominated.
    pub dominant: Option<ContentCategory>,
}

impl CompressionPlan {
    /// A plan that leaves the content untouched.
    pub fn noop(anchors: Vec<MustKeepFragment>) -> Self {
        Self {
            selected_transforms: Vec::new(),
            target_ratio: NOOP_TARGET_RATIO,
            must_keep: must_keep_ids(&anchors),
            anchors,
            dominant: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.selected_transforms.is_empty()
    }

    /// Brief description for logs and CLI output.
    pub fn describe(&self) -> String {
        if self.is_noop() {
            return "no-op (content below compression floor)".to_string();
        }
        let transforms: Vec<&str> = self.selected_transforms.iter().map(|t| t.id()).collect();
        format!(
            "{} at target ratio {:.2}{}",
            transforms.join(" -> "),
            self.target_ratio,
            self.dominant
                .map(|c| format!(" ({} dominant)", c))
                .unwrap_or_default()
        )
    }
}

fn must_keep_ids(anchors: &[MustKeepFragment]) -> BTreeSet<AnchorKind> {
    anchors
        .iter()
        .map(|a| a.kind)
        .chain(AnchorKind::REQUIRED)
        .collect()
}

/// Picks a [`CompressionPlan`] for a content profile.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    min_compress_chars: usize,
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_COMPRESS_CHARS)
    }
}

impl StrategySelector {
    pub fn new(min_compress_chars: usize) -> Self {
        Self { min_compress_chars }
    }

    /// Select transforms for `profile`, aiming for `target_ratio`.
    pub fn select(&self, profile: &ContentProfile, target_ratio: f64) -> CompressionPlan {
        let anchors = profile.anchors.clone();

        if profile.total_chars < self.min_compress_chars
            || profile.compressible_chars() < self.min_compress_chars
        {
            debug!(
                "Content below floor ({} chars, {} compressible < {}): no-op plan",
                profile.total_chars,
                profile.compressible_chars(),
                self.min_compress_chars
            );
            return CompressionPlan::noop(anchors);
        }

        let dominant = ContentCategory::ALL
            .iter()
            .copied()
            .find(|c| profile.share(*c) >= DOMINANCE_THRESHOLD);

        let selected_transforms = match dominant {
            Some(category) => vec![TransformKind::for_category(category)],
            None => {
                let mut present: Vec<ContentCategory> = ContentCategory::ALL
                    .iter()
                    .copied()
                    .filter(|c| profile.chars(*c) > 0)
                    .collect();
                // Stable sort keeps decision-table order for equal shares.
                present.sort_by(|a, b| profile.share(*b).total_cmp(&profile.share(*a)));
                present.into_iter().map(TransformKind::for_category).collect()
            }
        };

        let requested = if target_ratio.is_finite() && target_ratio > 0.0 {
            target_ratio
        } else {
            DEFAULT_TARGET_RATIO
        };
        let mut ratio = requested.clamp(MIN_TARGET_RATIO, MAX_TARGET_RATIO);
        if dominant == Some(ContentCategory::Prose) {
            ratio = ratio.min(PROSE_MAX_TARGET_RATIO);
        }

        let plan = CompressionPlan {
            selected_transforms,
            target_ratio: ratio,
            must_keep: must_keep_ids(&anchors),
            anchors,
            dominant,
        };
        debug!("Selected plan: {}", plan.describe());
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{RawContext, analyze};

    fn profile_of(text: &str) -> ContentProfile {
        analyze(&RawContext::from_fragments([("notes.md", text)])).profile
    }

    fn prose_words(count: usize) -> String {
        let words = ["alpha", "bravo", "delta", "gamma", "omega", "sigma"];
        let mut out = String::new();
        for i in 0..count {
            out.push_str(words[i % words.len()]);
            if i % 12 == 11 {
                out.push_str(". ");
            } else {
                out.push(' ');
            }
        }
        out.trim_end().to_string()
    }

    #[test]
    fn test_prose_scenario_selects_extractive_only() {
        let text = prose_words(200);
        let profile = profile_of(&text);
        assert_eq!(profile.total_words, 200);

        let plan = StrategySelector::default().select(&profile, DEFAULT_TARGET_RATIO);
        assert_eq!(
            plan.selected_transforms,
            vec![TransformKind::ExtractiveSummarization]
        );
        assert!(plan.target_ratio >= 0.3 && plan.target_ratio <= 0.5);
        assert_eq!(plan.dominant, Some(ContentCategory::Prose));
    }

    #[test]
    fn test_prose_ratio_capped_even_when_requesting_more() {
        let profile = profile_of(&prose_words(200));
        let plan = StrategySelector::default().select(&profile, 0.7);
        assert_eq!(plan.target_ratio, PROSE_MAX_TARGET_RATIO);
    }

    #[test]
    fn test_below_floor_is_noop() {
        let profile = profile_of("Short note.\n- one task\n");
        let plan = StrategySelector::default().select(&profile, 0.5);
        assert!(plan.is_noop());
        assert_eq!(plan.target_ratio, NOOP_TARGET_RATIO);
        assert!(plan.must_keep.contains(&AnchorKind::CurrentObjective));
        assert!(plan.must_keep.contains(&AnchorKind::NextActions));
    }

    #[test]
    fn test_code_dominant() {
        let mut text = String::from("Intro.\n```rust\n");
        for i in 0..60 {
            text.push_str(&format!("    let value_{i} = compute_something({i});\n"));
        }
        text.push_str("```\n");
        let plan = StrategySelector::default().select(&profile_of(&text), 0.5);
        assert_eq!(
            plan.selected_transforms,
            vec![TransformKind::CodeSignaturePreservation]
        );
        assert_eq!(plan.dominant, Some(ContentCategory::Code));
    }

    #[test]
    fn test_table_dominant() {
        let mut text = String::from("| task | status |\n|---|---|\n");
        for i in 0..60 {
            text.push_str(&format!("| task number {i} | done |\n"));
        }
        let plan = StrategySelector::default().select(&profile_of(&text), 0.5);
        assert_eq!(
            plan.selected_transforms,
            vec![TransformKind::TableConsolidation]
        );
    }

    #[test]
    fn test_no_dominant_category_applies_all_by_share() {
        let profile = ContentProfile {
            total_chars: 4000,
            total_words: 600,
            total_lines: 100,
            category_counts: ContentCategory::ALL.iter().map(|c| (*c, 25)).collect(),
            category_chars: [
                (ContentCategory::Code, 1100),
                (ContentCategory::Table, 900),
                (ContentCategory::Prose, 1000),
                (ContentCategory::List, 1000),
            ]
            .into_iter()
            .collect(),
            anchors: Vec::new(),
            skipped_fragments: 0,
            warnings: Vec::new(),
        };
        let plan = StrategySelector::default().select(&profile, 0.5);
        assert_eq!(plan.dominant, None);
        assert_eq!(
            plan.selected_transforms,
            vec![
                TransformKind::CodeSignaturePreservation,
                TransformKind::ExtractiveSummarization,
                TransformKind::ListDeduplication,
                TransformKind::TableConsolidation,
            ]
        );
        // Required anchors are protected even when none were located.
        assert_eq!(plan.must_keep.len(), 2);
    }

    #[test]
    fn test_target_ratio_clamped() {
        let mut text = String::from("| a | b |\n|---|---|\n");
        for i in 0..60 {
            text.push_str(&format!("| row {i} | value |\n"));
        }
        let profile = profile_of(&text);
        let selector = StrategySelector::default();
        assert_eq!(selector.select(&profile, 0.05).target_ratio, MIN_TARGET_RATIO);
        assert_eq!(selector.select(&profile, 0.95).target_ratio, MAX_TARGET_RATIO);
        assert_eq!(
            selector.select(&profile, f64::NAN).target_ratio,
            DEFAULT_TARGET_RATIO
        );
    }

    #[test]
    fn test_mostly_protected_content_is_noop() {
        let mut text = String::from("## Objective\n");
        for _ in 0..100 {
            text.push_str("Keep every word of this objective intact. ");
        }
        text.push_str("\n## Next Steps\n- one\n");
        let plan = StrategySelector::default().select(&profile_of(&text), 0.5);
        assert!(plan.is_noop());
    }

    #[test]
    fn test_transform_for_every_category() {
        for category in ContentCategory::ALL {
            let kind = TransformKind::for_category(category);
            assert!(!kind.id().is_empty());
        }
    }
}
