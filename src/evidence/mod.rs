//! Read-only snapshot of the version-control state used as ground truth.

pub(crate) mod git;

pub use git::{GitEvidenceCollector, read_evidence};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Prefix of commits written by the compaction engine itself.
pub const COMPACTION_SUBJECT_PREFIX: &str = "compaction:";
/// Namespace of compaction tags.
pub const COMPACTION_TAG_PREFIX: &str = "compaction/";
const TAG_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// One progress-tagged commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub hash: String,
    pub subject: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl CommitRecord {
    /// Subject and body as one message.
    pub fn message(&self) -> String {
        if self.body.is_empty() {
            self.subject.clone()
        } else {
            format!("{}\n\n{}", self.subject, self.body)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchKind {
    Plan,
    Feature,
    Other,
}

/// How the current branch pairs with its plan or feature counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRelationship {
    pub kind: BranchKind,
    pub counterpart_branch: Option<String>,
}

impl BranchRelationship {
    /// `plan/x` pairs with `feature/x` and vice versa.
    pub fn classify(branch: &str) -> Self {
        if let Some(rest) = branch.strip_prefix("plan/")
            && !rest.is_empty()
        {
            return Self {
                kind: BranchKind::Plan,
                counterpart_branch: Some(format!("feature/{}", rest)),
            };
        }
        if let Some(rest) = branch.strip_prefix("feature/")
            && !rest.is_empty()
        {
            return Self {
                kind: BranchKind::Feature,
                counterpart_branch: Some(format!("plan/{}", rest)),
            };
        }
        Self::other()
    }

    pub fn other() -> Self {
        Self {
            kind: BranchKind::Other,
            counterpart_branch: None,
        }
    }
}

/// A parsed `compaction/{planId}/{sequence}/{timestamp}` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionTag {
    pub name: String,
    pub plan_id: String,
    pub sequence: u32,
    pub timestamp: DateTime<Utc>,
}

impl CompactionTag {
    pub fn format(plan_id: &str, sequence: u32, timestamp: DateTime<Utc>) -> String {
        format!(
            "{}{}/{}/{}",
            COMPACTION_TAG_PREFIX,
            plan_id,
            sequence,
            timestamp.format(TAG_TIMESTAMP_FORMAT)
        )
    }

    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(COMPACTION_TAG_PREFIX)?;
        let mut parts = rest.split('/');
        let (plan_id, sequence, stamp) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || plan_id.is_empty() {
            return None;
        }
        let sequence = sequence.parse().ok()?;
        let timestamp = NaiveDateTime::parse_from_str(stamp, TAG_TIMESTAMP_FORMAT)
            .ok()?
            .and_utc();
        Some(Self {
            name: name.to_string(),
            plan_id: plan_id.to_string(),
            sequence,
            timestamp,
        })
    }
}

/// Limits for the history walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSettings {
    pub max_commits: usize,
    pub lookback_days: u32,
    pub vcs_timeout_secs: u64,
}

impl Default for EvidenceSettings {
    fn default() -> Self {
        Self {
            max_commits: 50,
            lookback_days: 30,
            vcs_timeout_secs: 5,
        }
    }
}

impl EvidenceSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.vcs_timeout_secs)
    }
}

/// Snapshot of the repository as seen by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitEvidence {
    pub current_branch: Option<String>,
    /// Progress-tagged commits, newest first.
    pub recent_commits: Vec<CommitRecord>,
    pub branch_relationship: BranchRelationship,
    /// Compaction tags, sorted by plan then sequence.
    pub tags: Vec<CompactionTag>,
    pub unavailable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unavailable_reason: Option<String>,
}

impl GitEvidence {
    /// Evidence for a repository that could not be read.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            current_branch: None,
            recent_commits: Vec::new(),
            branch_relationship: BranchRelationship::other(),
            tags: Vec::new(),
            unavailable: true,
            unavailable_reason: Some(reason.into()),
        }
    }

    pub fn tags_for_plan<'a>(&'a self, plan_id: &'a str) -> impl Iterator<Item = &'a CompactionTag> {
        self.tags.iter().filter(move |t| t.plan_id == plan_id)
    }

    /// Highest sequence already tagged for `plan_id`, or 0.
    pub fn max_sequence(&self, plan_id: &str) -> u32 {
        self.tags_for_plan(plan_id)
            .map(|t| t.sequence)
            .max()
            .unwrap_or(0)
    }
}
