//! Cross-checking narrative progress claims against git history.
//!
//! Git is authoritative: a claim that no commit supports makes the verdict
//! `conflicted`, and the narrative is never rewritten to match. When the
//! history cannot be read the verdict is `pending`, never `conflicted`.

mod grammar;

pub use grammar::{CommitProgress, ProgressClaim, parse_claims, parse_commit_progress};

use crate::evidence::{CommitRecord, GitEvidence};
use crate::util::short_hash;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Outcome class of a validation, ordered `validated > pending > conflicted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Validated,
    Pending,
    Conflicted,
}

impl VerdictStatus {
    fn rank(&self) -> u8 {
        match self {
            VerdictStatus::Validated => 2,
            VerdictStatus::Pending => 1,
            VerdictStatus::Conflicted => 0,
        }
    }

    pub fn is_no_worse_than(&self, other: VerdictStatus) -> bool {
        self.rank() >= other.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictStatus::Validated => "validated",
            VerdictStatus::Pending => "pending",
            VerdictStatus::Conflicted => "conflicted",
        }
    }
}

impl std::fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A claim that no commit supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub claim: ProgressClaim,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub status: VerdictStatus,
    /// Hashes of commits supporting at least one claim, newest first.
    pub supporting_commits: Vec<String>,
    pub discrepancies: Vec<Discrepancy>,
    pub claims_checked: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl ValidationVerdict {
    pub fn pending(claims_checked: usize, note: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Pending,
            supporting_commits: Vec::new(),
            discrepancies: Vec::new(),
            claims_checked,
            notes: vec![note.into()],
        }
    }
}

/// Tolerances for numeric claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSettings {
    pub task_tolerance: u32,
    pub percent_tolerance: u32,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            task_tolerance: 1,
            percent_tolerance: 5,
        }
    }
}

/// How narrative claims are extracted and matched against commits.
pub trait ClaimMatcher {
    fn extract_claims(&self, narrative: &str) -> Vec<ProgressClaim>;

    fn supports(&self, claim: &ProgressClaim, commit: &CommitRecord) -> bool;

    /// The value `commit` records for the kind of `claim`, if any.
    fn recorded_value(&self, claim: &ProgressClaim, commit: &CommitRecord) -> Option<String>;
}

/// Regex-grammar matcher with numeric tolerances.
#[derive(Debug, Clone, Default)]
pub struct GrammarMatcher {
    settings: ValidationSettings,
}

impl GrammarMatcher {
    pub fn new(settings: ValidationSettings) -> Self {
        Self { settings }
    }
}

impl ClaimMatcher for GrammarMatcher {
    fn extract_claims(&self, narrative: &str) -> Vec<ProgressClaim> {
        parse_claims(narrative)
    }

    fn supports(&self, claim: &ProgressClaim, commit: &CommitRecord) -> bool {
        let progress = parse_commit_progress(&commit.message());
        match claim {
            ProgressClaim::TaskRatio { done, total } => {
                progress.ratio.is_some_and(|(cd, ct)| {
                    ct == *total && cd.abs_diff(*done) <= self.settings.task_tolerance
                })
            }
            ProgressClaim::Percent { value } => progress
                .percentages()
                .iter()
                .any(|p| p.abs_diff(*value) <= self.settings.percent_tolerance),
            ProgressClaim::Milestone { name } => {
                let wanted = name.trim().to_lowercase();
                progress
                    .milestones
                    .iter()
                    .any(|m| m.trim().to_lowercase() == wanted)
                    || commit.subject.to_lowercase().contains(&wanted)
            }
        }
    }

    fn recorded_value(&self, claim: &ProgressClaim, commit: &CommitRecord) -> Option<String> {
        let progress = parse_commit_progress(&commit.message());
        match claim {
            ProgressClaim::TaskRatio { .. } => progress.ratio.map(|(d, t)| format!("{}/{}", d, t)),
            ProgressClaim::Percent { .. } => progress.percentages().first().map(|p| format!("{}%", p)),
            ProgressClaim::Milestone { .. } => progress
                .milestones
                .first()
                .map(|m| format!("milestone '{}'", m)),
        }
    }
}

/// Checks claims against a [`GitEvidence`] snapshot.
pub struct StateValidator<M: ClaimMatcher = GrammarMatcher> {
    matcher: M,
}

impl StateValidator<GrammarMatcher> {
    pub fn new(settings: ValidationSettings) -> Self {
        Self {
            matcher: GrammarMatcher::new(settings),
        }
    }
}

impl Default for StateValidator<GrammarMatcher> {
    fn default() -> Self {
        Self::new(ValidationSettings::default())
    }
}

impl<M: ClaimMatcher> StateValidator<M> {
    pub fn with_matcher(matcher: M) -> Self {
        Self { matcher }
    }

    /// Extract claims from `narrative` and validate them.
    pub fn validate_narrative(
        &self,
        narrative: &str,
        evidence: &GitEvidence,
    ) -> (Vec<ProgressClaim>, ValidationVerdict) {
        let claims = self.matcher.extract_claims(narrative);
        let verdict = self.validate(&claims, evidence);
        (claims, verdict)
    }

    pub fn validate(&self, claims: &[ProgressClaim], evidence: &GitEvidence) -> ValidationVerdict {
        if evidence.unavailable {
            let reason = evidence
                .unavailable_reason
                .as_deref()
                .unwrap_or("unknown reason");
            debug!("Evidence unavailable ({}), verdict pending", reason);
            return ValidationVerdict::pending(
                claims.len(),
                format!("git evidence unavailable: {}", reason),
            );
        }
        if claims.is_empty() {
            return ValidationVerdict::pending(0, "no progress claims to verify");
        }

        let mut supporting_commits: Vec<String> = Vec::new();
        let mut discrepancies = Vec::new();

        for claim in claims {
            let supporters: Vec<&CommitRecord> = evidence
                .recent_commits
                .iter()
                .filter(|c| self.matcher.supports(claim, c))
                .collect();

            if supporters.is_empty() {
                let reason = evidence
                    .recent_commits
                    .iter()
                    .find_map(|c| {
                        self.matcher.recorded_value(claim, c).map(|value| {
                            format!(
                                "most recent commit {} records {}",
                                short_hash(&c.hash),
                                value
                            )
                        })
                    })
                    .unwrap_or_else(|| {
                        format!(
                            "none of {} progress commits records a matching value",
                            evidence.recent_commits.len()
                        )
                    });
                warn!("Unsupported claim '{}': {}", claim, reason);
                discrepancies.push(Discrepancy {
                    claim: claim.clone(),
                    reason,
                });
                continue;
            }

            for commit in supporters {
                if !supporting_commits.contains(&commit.hash) {
                    supporting_commits.push(commit.hash.clone());
                }
            }
        }

        // Keep newest-first order of the evidence walk.
        supporting_commits.sort_by_key(|hash| {
            evidence
                .recent_commits
                .iter()
                .position(|c| &c.hash == hash)
                .unwrap_or(usize::MAX)
        });

        let status = if discrepancies.is_empty() {
            VerdictStatus::Validated
        } else {
            VerdictStatus::Conflicted
        };

        ValidationVerdict {
            status,
            supporting_commits,
            discrepancies,
            claims_checked: claims.len(),
            notes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::BranchRelationship;
    use chrono::{Duration, Utc};

    fn commit(hash: &str, subject: &str, body: &str, age_hours: i64) -> CommitRecord {
        CommitRecord {
            hash: hash.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            timestamp: Utc::now() - Duration::hours(age_hours),
        }
    }

    fn validator() -> StateValidator {
        StateValidator::default()
    }

    fn evidence(commits: Vec<CommitRecord>) -> GitEvidence {
        GitEvidence {
            current_branch: Some("plan/importer".to_string()),
            recent_commits: commits,
            branch_relationship: BranchRelationship::classify("plan/importer"),
            tags: Vec::new(),
            unavailable: false,
            unavailable_reason: None,
        }
    }

    #[test]
    fn test_matching_commit_validates() {
        let ev = evidence(vec![commit(
            "aaaa1111bbbb",
            "feat: importer",
            "Progress: 4/10 tasks complete (40%)",
            1,
        )]);
        let (claims, verdict) =
            validator().validate_narrative("We have 4/10 tasks complete.", &ev);
        assert_eq!(claims.len(), 1);
        assert_eq!(verdict.status, VerdictStatus::Validated);
        assert_eq!(verdict.supporting_commits, vec!["aaaa1111bbbb"]);
        assert!(verdict.discrepancies.is_empty());
    }

    #[test]
    fn test_overclaim_conflicts_with_recorded_value() {
        let ev = evidence(vec![
            commit("newest000000", "feat: step", "Progress: 4/10", 1),
            commit("older0000000", "feat: step", "Progress: 3/10", 5),
        ]);
        let (_, verdict) =
            validator().validate_narrative("Status: 9/10 tasks complete.", &ev);
        assert_eq!(verdict.status, VerdictStatus::Conflicted);
        assert_eq!(verdict.discrepancies.len(), 1);
        let d = &verdict.discrepancies[0];
        assert_eq!(d.claim, ProgressClaim::TaskRatio { done: 9, total: 10 });
        assert!(d.reason.contains("newest00"));
        assert!(d.reason.contains("4/10"));
    }

    #[test]
    fn test_unavailable_evidence_is_pending() {
        let claims = vec![ProgressClaim::TaskRatio { done: 9, total: 10 }];
        let verdict =
            validator().validate(&claims, &GitEvidence::unavailable("not a repo"));
        assert_eq!(verdict.status, VerdictStatus::Pending);
        assert!(verdict.discrepancies.is_empty());
        assert!(verdict.notes[0].contains("not a repo"));
    }

    #[test]
    fn test_no_claims_is_pending() {
        let ev = evidence(vec![commit("c1", "feat", "Progress: 1/2", 1)]);
        let verdict = validator().validate(&[], &ev);
        assert_eq!(verdict.status, VerdictStatus::Pending);
        assert_eq!(verdict.claims_checked, 0);
    }

    #[test]
    fn test_tolerances() {
        let ev = evidence(vec![commit("c1", "feat", "Progress: 5/10 tasks (50%)", 1)]);
        let validator = validator();

        let within = [
            ProgressClaim::TaskRatio { done: 6, total: 10 },
            ProgressClaim::Percent { value: 54 },
        ];
        assert_eq!(validator.validate(&within, &ev).status, VerdictStatus::Validated);

        let outside = [ProgressClaim::TaskRatio { done: 7, total: 10 }];
        assert_eq!(validator.validate(&outside, &ev).status, VerdictStatus::Conflicted);

        let other_total = [ProgressClaim::TaskRatio { done: 5, total: 12 }];
        assert_eq!(
            validator.validate(&other_total, &ev).status,
            VerdictStatus::Conflicted
        );

        let strict = StateValidator::new(ValidationSettings {
            task_tolerance: 0,
            percent_tolerance: 0,
        });
        assert_eq!(strict.validate(&within, &ev).status, VerdictStatus::Conflicted);
    }

    #[test]
    fn test_milestone_matches_field_or_subject() {
        let ev = evidence(vec![
            commit("c1", "feat: finish parser rewrite", "Progress: 3/10", 1),
            commit("c2", "chore", "Milestone: CLI Wired", 2),
        ]);
        let claims = [
            ProgressClaim::Milestone {
                name: "Parser rewrite".to_string(),
            },
            ProgressClaim::Milestone {
                name: "cli wired".to_string(),
            },
        ];
        let verdict = validator().validate(&claims, &ev);
        assert_eq!(verdict.status, VerdictStatus::Validated);
        assert_eq!(verdict.supporting_commits, vec!["c1", "c2"]);
    }

    #[test]
    fn test_one_bad_claim_conflicts_everything() {
        let ev = evidence(vec![commit("c1", "feat", "Progress: 4/10 (40%)", 1)]);
        let claims = [
            ProgressClaim::TaskRatio { done: 4, total: 10 },
            ProgressClaim::Milestone {
                name: "shipped".to_string(),
            },
        ];
        let verdict = validator().validate(&claims, &ev);
        assert_eq!(verdict.status, VerdictStatus::Conflicted);
        assert_eq!(verdict.supporting_commits, vec!["c1"]);
        assert!(verdict.discrepancies[0].reason.contains("none of 1"));
    }

    #[test]
    fn test_verdict_ordering() {
        use VerdictStatus::*;
        assert!(Validated.is_no_worse_than(Pending));
        assert!(Pending.is_no_worse_than(Conflicted));
        assert!(Pending.is_no_worse_than(Pending));
        assert!(!Conflicted.is_no_worse_than(Pending));
        assert!(!Pending.is_no_worse_than(Validated));
    }

    struct AlwaysSupports;

    impl ClaimMatcher for AlwaysSupports {
        fn extract_claims(&self, _narrative: &str) -> Vec<ProgressClaim> {
            vec![ProgressClaim::Percent { value: 99 }]
        }

        fn supports(&self, _claim: &ProgressClaim, _commit: &CommitRecord) -> bool {
            true
        }

        fn recorded_value(&self, _claim: &ProgressClaim, _commit: &CommitRecord) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_custom_matcher() {
        let ev = evidence(vec![commit("c1", "anything", "", 1)]);
        let (claims, verdict) =
            StateValidator::with_matcher(AlwaysSupports).validate_narrative("whatever", &ev);
        assert_eq!(claims, vec![ProgressClaim::Percent { value: 99 }]);
        assert_eq!(verdict.status, VerdictStatus::Validated);
    }
}
