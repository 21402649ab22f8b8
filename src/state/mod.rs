//! The compacted-state artifact: what a later session reloads.
//!
//! Artifacts live at `.tether/plans/{planId}/compaction-{sequence:04}.yaml`
//! and are never rewritten; each compaction adds a new sequence.

mod builder;
mod persist;

pub use builder::StateBuilder;
pub use persist::{PersistReceipt, commit_subject, persist};

use crate::analyzer::{AnchorKind, parse_heading};
use crate::errors::TetherError;
use crate::strategy::TransformKind;
use crate::transforms::DegradedTransform;
use crate::validator::{ProgressClaim, ValidationVerdict};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static PLAN_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap());

static ARTIFACT_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^compaction-(\d{4,})\.yaml$").unwrap());

pub const TETHER_DIR: &str = ".tether";
const PLANS_DIR: &str = "plans";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionMetadata {
    pub plan_id: String,
    /// Assigned on persist; 0 until then.
    pub sequence: u32,
    pub timestamp: DateTime<Utc>,
    pub source_tokens: u64,
    pub compressed_tokens: u64,
    /// `compressed_tokens / source_tokens`: the fraction kept.
    pub compression_ratio: f64,
    pub validation_verdict: ValidationVerdict,
    /// SHA-256 of the narrative sources at compaction time.
    pub source_digest: String,
    /// Claims checked at compaction time, re-checked on resume.
    #[serde(default)]
    pub claims: Vec<ProgressClaim>,
    #[serde(default)]
    pub transforms: Vec<TransformKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<DegradedTransform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// True when the content was below the compression floor.
    #[serde(default)]
    pub noop: bool,
    /// True when the stored state is not smaller than its sources.
    #[serde(default)]
    pub oversized: bool,
}

impl CompactionMetadata {
    /// Whole-percent size reduction, for commit subjects and display.
    pub fn reduction_percent(&self) -> u32 {
        ((1.0 - self.compression_ratio).clamp(0.0, 1.0) * 100.0).round() as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreservedSection {
    pub id: AnchorKind,
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactedState {
    pub metadata: CompactionMetadata,
    pub preserved_sections: Vec<PreservedSection>,
    pub archived_summary: String,
    pub resumption_instructions: Vec<String>,
}

impl CompactedState {
    pub fn to_yaml(&self) -> Result<String, TetherError> {
        serde_yaml::to_string(self).map_err(TetherError::ArtifactSerializeFailed)
    }

    pub fn from_yaml(content: &str, path: &Path) -> Result<Self, TetherError> {
        serde_yaml::from_str(content).map_err(|source| TetherError::ArtifactParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, TetherError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| TetherError::ArtifactReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_yaml(&content, path)
    }

    pub fn section(&self, id: AnchorKind) -> Option<&PreservedSection> {
        self.preserved_sections.iter().find(|s| s.id == id)
    }

    /// Render as a markdown working context for a new session.
    pub fn render_markdown(&self) -> String {
        let meta = &self.metadata;
        let mut out = format!(
            "# Compacted state: {} (compaction {})\n\n",
            meta.plan_id, meta.sequence
        );
        out.push_str(&format!(
            "_Compacted {} from ~{} to ~{} tokens. Verdict: {}._\n\n",
            meta.timestamp.format("%Y-%m-%d %H:%M UTC"),
            meta.source_tokens,
            meta.compressed_tokens,
            meta.validation_verdict.status
        ));

        out.push_str("## Resumption Instructions\n\n");
        for (i, instruction) in self.resumption_instructions.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, instruction));
        }

        for section in &self.preserved_sections {
            out.push('\n');
            let has_heading = section
                .text
                .lines()
                .next()
                .is_some_and(|first| parse_heading(first).is_some());
            if !has_heading {
                out.push_str(&format!("## {}\n\n", section.title));
            }
            out.push_str(&section.text);
            out.push('\n');
        }

        if !self.archived_summary.is_empty() {
            out.push_str("\n## Archived Summary\n\n");
            out.push_str(&self.archived_summary);
            out.push('\n');
        }
        out
    }
}

/// Reject plan ids that could escape the plans directory or break tag names.
pub fn validate_plan_id(plan_id: &str) -> Result<(), TetherError> {
    if PLAN_ID_REGEX.is_match(plan_id) {
        Ok(())
    } else {
        Err(TetherError::InvalidPlanId(plan_id.to_string()))
    }
}

pub fn plan_dir(root: &Path, plan_id: &str) -> PathBuf {
    root.join(TETHER_DIR).join(PLANS_DIR).join(plan_id)
}

pub fn artifact_file_name(sequence: u32) -> String {
    format!("compaction-{:04}.yaml", sequence)
}

pub fn artifact_path(root: &Path, plan_id: &str, sequence: u32) -> PathBuf {
    plan_dir(root, plan_id).join(artifact_file_name(sequence))
}

/// Existing artifacts for a plan, sorted by sequence.
pub fn list_artifacts(root: &Path, plan_id: &str) -> Result<Vec<(u32, PathBuf)>, TetherError> {
    let dir = plan_dir(root, plan_id);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(&dir).map_err(|source| TetherError::ArtifactReadFailed {
        path: dir.clone(),
        source,
    })?;

    let mut artifacts: Vec<(u32, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let caps = ARTIFACT_NAME_REGEX.captures(name.to_str()?)?;
            let sequence = caps[1].parse().ok()?;
            Some((sequence, entry.path()))
        })
        .collect();
    artifacts.sort_by_key(|(sequence, _)| *sequence);
    Ok(artifacts)
}

/// The highest-sequence artifact for a plan, if any.
pub fn latest_artifact(root: &Path, plan_id: &str) -> Result<Option<(u32, PathBuf)>, TetherError> {
    Ok(list_artifacts(root, plan_id)?.pop())
}
