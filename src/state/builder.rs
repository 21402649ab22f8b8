use super::{CompactedState, CompactionMetadata, PreservedSection, validate_plan_id};
use crate::analyzer::{AnchorKind, ContentProfile, MustKeepFragment, SizeEstimate, estimate_text};
use crate::errors::TetherError;
use crate::strategy::TransformKind;
use crate::transforms::{DegradedTransform, ExecutionReport};
use crate::validator::{ProgressClaim, ValidationVerdict, VerdictStatus};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// Assembles a [`CompactedState`] from the outputs of one compaction run.
#[derive(Debug, Clone)]
pub struct StateBuilder {
    plan_id: String,
    claims: Vec<ProgressClaim>,
    transforms: Vec<TransformKind>,
    degraded: Vec<DegradedTransform>,
    source_digest: String,
    branch: Option<String>,
    noop: bool,
    timestamp: Option<DateTime<Utc>>,
}

impl StateBuilder {
    pub fn new(plan_id: &str) -> Result<Self, TetherError> {
        validate_plan_id(plan_id)?;
        Ok(Self {
            plan_id: plan_id.to_string(),
            claims: Vec::new(),
            transforms: Vec::new(),
            degraded: Vec::new(),
            source_digest: String::new(),
            branch: None,
            noop: false,
            timestamp: None,
        })
    }

    pub fn with_claims(mut self, claims: Vec<ProgressClaim>) -> Self {
        self.claims = claims;
        self
    }

    /// Record what the executor did and whether the plan was a no-op.
    pub fn with_execution(mut self, report: &ExecutionReport, noop: bool) -> Self {
        self.transforms = report.applied.clone();
        self.degraded = report.degraded.clone();
        self.noop = noop;
        self
    }

    pub fn with_source_digest(mut self, digest: impl Into<String>) -> Self {
        self.source_digest = digest.into();
        self
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn build(
        self,
        compressed: &str,
        profile: &ContentProfile,
        estimate: &SizeEstimate,
        verdict: &ValidationVerdict,
    ) -> CompactedState {
        let preserved_sections: Vec<PreservedSection> = profile
            .anchors
            .iter()
            .filter(|a| !a.text.is_empty())
            .map(|a| PreservedSection {
                id: a.kind,
                title: a.kind.title().to_string(),
                text: a.text.clone(),
            })
            .collect();

        let source_tokens = estimate.estimated_tokens;
        let mut archived_summary = strip_anchors(compressed, &profile.anchors);
        let mut compressed_tokens = state_tokens(&preserved_sections, &archived_summary);

        if !self.noop && compressed_tokens >= source_tokens {
            archived_summary = trim_archive(&preserved_sections, &archived_summary, source_tokens);
            compressed_tokens = state_tokens(&preserved_sections, &archived_summary);
        }
        let oversized = if self.noop {
            compressed_tokens > source_tokens
        } else {
            compressed_tokens >= source_tokens
        };
        if oversized {
            warn!(
                "Compacted state is not smaller than its sources ({} >= {} tokens)",
                compressed_tokens, source_tokens
            );
        }

        let compression_ratio = if source_tokens == 0 {
            1.0
        } else {
            compressed_tokens as f64 / source_tokens as f64
        };

        let resumption_instructions = instructions(&self.plan_id, &profile.anchors, verdict);

        debug!(
            "Built compacted state for {}: {} -> {} tokens",
            self.plan_id, source_tokens, compressed_tokens
        );

        CompactedState {
            metadata: CompactionMetadata {
                plan_id: self.plan_id,
                sequence: 0,
                timestamp: self.timestamp.unwrap_or_else(Utc::now),
                source_tokens,
                compressed_tokens,
                compression_ratio,
                validation_verdict: verdict.clone(),
                source_digest: self.source_digest,
                claims: self.claims,
                transforms: self.transforms,
                degraded: self.degraded,
                branch: self.branch,
                noop: self.noop,
                oversized,
            },
            preserved_sections,
            archived_summary,
            resumption_instructions,
        }
    }
}

/// Remove the first occurrence of each anchor and squeeze the blank lines
/// left behind.
fn strip_anchors(text: &str, anchors: &[MustKeepFragment]) -> String {
    let mut out = text.to_string();
    for anchor in anchors.iter().filter(|a| !a.text.is_empty()) {
        if let Some(pos) = out.find(&anchor.text) {
            out.replace_range(pos..pos + anchor.text.len(), "");
        }
    }

    let mut squeezed = String::with_capacity(out.len());
    let mut blank_run = 0;
    for line in out.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        squeezed.push_str(line);
        squeezed.push('\n');
    }
    squeezed.trim().to_string()
}

fn state_tokens(sections: &[PreservedSection], archive: &str) -> u64 {
    let mut body: Vec<&str> = sections.iter().map(|s| s.text.as_str()).collect();
    body.push(archive);
    estimate_text(&body.join("\n\n")).estimated_tokens
}

/// Drop the oldest archive lines, from the front, until the state estimate
/// is below `limit`.
fn trim_archive(sections: &[PreservedSection], archive: &str, limit: u64) -> String {
    let lines: Vec<&str> = archive.lines().collect();
    if lines.is_empty() {
        return String::new();
    }
    let mut dropped = 0;
    loop {
        let step = ((lines.len() - dropped) / 10).max(1);
        dropped = (dropped + step).min(lines.len());
        let candidate = format!(
            "[... {} lines archived in commit history]\n{}",
            dropped,
            lines[dropped..].join("\n").trim_start()
        )
        .trim_end()
        .to_string();
        if dropped == lines.len() || state_tokens(sections, &candidate) < limit {
            return candidate;
        }
    }
}

fn first_content_line(text: &str) -> Option<&str> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
}

fn instructions(
    plan_id: &str,
    anchors: &[MustKeepFragment],
    verdict: &ValidationVerdict,
) -> Vec<String> {
    let mut out = Vec::new();
    let anchor = |kind: AnchorKind| anchors.iter().find(|a| a.kind == kind && !a.text.is_empty());

    if let Some(objective) = anchor(AnchorKind::CurrentObjective)
        && let Some(line) = first_content_line(&objective.text)
    {
        out.push(format!("Continue plan '{}': {}", plan_id, line));
    }

    if let Some(next) = anchor(AnchorKind::NextActions) {
        let items = next.items();
        if items.is_empty() {
            if let Some(line) = first_content_line(&next.text) {
                out.push(format!("Next: {}", line));
            }
        } else {
            out.extend(items.into_iter().map(|item| format!("Next: {}", item)));
        }
    }

    if let Some(blockers) = anchor(AnchorKind::OpenBlockers) {
        out.extend(
            blockers
                .items()
                .into_iter()
                .map(|item| format!("Resolve blocker: {}", item)),
        );
    }

    match verdict.status {
        VerdictStatus::Validated => out.push(format!(
            "Progress claims match git history ({} supporting commits).",
            verdict.supporting_commits.len()
        )),
        VerdictStatus::Pending => {
            let why = verdict
                .notes
                .first()
                .map(String::as_str)
                .unwrap_or("not yet verified");
            out.push(format!(
                "Progress claims are unverified ({}); check `git log` before relying on them.",
                why
            ));
        }
        VerdictStatus::Conflicted => {
            for d in &verdict.discrepancies {
                out.push(format!(
                    "Git history disagrees with '{}': {}. Trust the commits, not the notes.",
                    d.claim, d.reason
                ));
            }
        }
    }

    if out.is_empty() {
        out.push(format!(
            "Review the preserved sections of plan '{}' before continuing.",
            plan_id
        ));
    }
    out
}
