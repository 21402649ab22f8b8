//! Compression transforms, one per content category.
//!
//! Every transform guarantees, for any input and anchor set:
//! 1. each non-empty must-keep fragment appears verbatim in the output
//! 2. the output is no longer than the input (in characters)
//! 3. applying it twice gives the same result as applying it once
//!
//! A transform only rewrites spans of its own category. Protected byte
//! ranges are computed once per call and handed to each span rewrite.
//! Structural errors degrade to a pass-through copy in [`Transform::apply`].

mod code;
mod list;
mod prose;
mod table;

pub use code::CodeSignaturePreservation;
pub use list::ListDeduplication;
pub use prose::ExtractiveSummarization;
pub use table::TableConsolidation;

use crate::analyzer::{ContentCategory, MustKeepFragment, segment};
use crate::errors::TransformError;
use crate::strategy::{CompressionPlan, TransformKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Byte ranges that must not be altered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Protected {
    ranges: Vec<(usize, usize)>,
}

impl Protected {
    /// Locate the first occurrence of each non-empty anchor in `text`.
    pub fn locate(text: &str, anchors: &[MustKeepFragment]) -> Self {
        let mut ranges: Vec<(usize, usize)> = anchors
            .iter()
            .filter(|a| !a.text.is_empty())
            .filter_map(|a| text.find(&a.text).map(|start| (start, start + a.text.len())))
            .collect();
        ranges.sort_unstable();
        Self { ranges }
    }

    pub fn from_ranges(mut ranges: Vec<(usize, usize)>) -> Self {
        ranges.sort_unstable();
        Self { ranges }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[(usize, usize)] {
        &self.ranges
    }

    /// Whether `[start, end)` intersects any protected range.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.ranges.iter().any(|&(s, e)| s < end && start < e)
    }

    /// The protected ranges intersecting `[start, end)`, clipped and shifted
    /// so they are relative to `start`.
    pub fn within(&self, start: usize, end: usize) -> Self {
        let ranges = self
            .ranges
            .iter()
            .filter(|&&(s, e)| s < end && start < e)
            .map(|&(s, e)| (s.max(start) - start, e.min(end) - start))
            .collect();
        Self { ranges }
    }
}

/// A compression transform for one content category.
pub trait Transform {
    fn kind(&self) -> TransformKind;

    fn category(&self) -> ContentCategory;

    /// Rewrite a single span of this transform's category.
    ///
    /// `first_line` is the zero-based line number of the span in the full
    /// text; `protected` holds ranges relative to the span.
    fn compress_span(
        &self,
        span: &str,
        first_line: usize,
        protected: &Protected,
    ) -> Result<String, TransformError>;

    /// Rewrite every span of this category, failing on malformed structure
    /// or a broken guarantee.
    fn try_apply(
        &self,
        text: &str,
        anchors: &[MustKeepFragment],
    ) -> Result<String, TransformError> {
        let protected = Protected::locate(text, anchors);
        let output = rewrite_spans(text, self.category(), |span, first_line, start, end| {
            self.compress_span(span, first_line, &protected.within(start, end))
        })?;

        let input_len = text.chars().count();
        let output_len = output.chars().count();
        if output_len > input_len {
            return Err(TransformError::Expanded {
                input: input_len,
                output: output_len,
            });
        }
        if let Some(lost) = anchors
            .iter()
            .find(|a| text.contains(&a.text) && !output.contains(&a.text))
        {
            return Err(TransformError::AnchorLost {
                anchor: lost.kind.to_string(),
            });
        }
        Ok(output)
    }

    /// Like [`Transform::try_apply`], but any error yields an unchanged copy.
    fn apply(&self, text: &str, anchors: &[MustKeepFragment]) -> String {
        match self.try_apply(text, anchors) {
            Ok(output) => output,
            Err(e) => {
                warn!("{} degraded to pass-through: {}", self.kind(), e);
                text.to_string()
            }
        }
    }
}

/// Rebuild `text`, passing every span of `category` through `rewrite`.
///
/// `rewrite` receives the span text, its first line number and its byte
/// range in `text`. Spans of other categories are copied unchanged.
pub fn rewrite_spans<F>(
    text: &str,
    category: ContentCategory,
    mut rewrite: F,
) -> Result<String, TransformError>
where
    F: FnMut(&str, usize, usize, usize) -> Result<String, TransformError>,
{
    let mut out = String::with_capacity(text.len());
    for span in segment(text) {
        let body = span.text(text);
        if span.category == category {
            out.push_str(&rewrite(body, span.first_line, span.start, span.end)?);
        } else {
            out.push_str(body);
        }
    }
    Ok(out)
}

/// The transform implementing `kind`.
pub fn transform_for(kind: TransformKind) -> Box<dyn Transform> {
    match kind {
        TransformKind::CodeSignaturePreservation => Box::new(CodeSignaturePreservation),
        TransformKind::TableConsolidation => Box::new(TableConsolidation),
        TransformKind::ExtractiveSummarization => Box::new(ExtractiveSummarization),
        TransformKind::ListDeduplication => Box::new(ListDeduplication),
    }
}

/// A transform that failed and was replaced by a pass-through copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedTransform {
    pub kind: TransformKind,
    pub reason: String,
}

/// Outcome of running a [`CompressionPlan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub text: String,
    /// Transforms whose output was kept, in application order.
    pub applied: Vec<TransformKind>,
    pub degraded: Vec<DegradedTransform>,
}

/// Apply the plan's transforms in order until the target ratio is met.
///
/// A no-op plan returns the input unchanged. A failing transform is logged,
/// recorded in [`ExecutionReport::degraded`] and skipped.
pub fn execute(text: &str, plan: &CompressionPlan) -> ExecutionReport {
    let mut report = ExecutionReport {
        text: text.to_string(),
        applied: Vec::new(),
        degraded: Vec::new(),
    };
    if plan.is_noop() {
        return report;
    }

    let input_len = text.chars().count();
    let target_len = (input_len as f64 * plan.target_ratio).floor() as usize;

    for kind in &plan.selected_transforms {
        let current_len = report.text.chars().count();
        if current_len <= target_len {
            debug!(
                "Target reached ({} <= {} chars), skipping remaining transforms",
                current_len, target_len
            );
            break;
        }

        match transform_for(*kind).try_apply(&report.text, &plan.anchors) {
            Ok(output) => {
                debug!(
                    "{}: {} -> {} chars",
                    kind,
                    current_len,
                    output.chars().count()
                );
                report.text = output;
                report.applied.push(*kind);
            }
            Err(e) => {
                warn!("{} degraded to pass-through: {}", kind, e);
                report.degraded.push(DegradedTransform {
                    kind: *kind,
                    reason: e.to_string(),
                });
            }
        }
    }

    report
}
