//! Progress claim grammar.
//!
//! Narrative text states progress in three shapes:
//! - `4/10 tasks complete` (also `completed`, `done`, `finished`)
//! - `40% complete`
//! - `Milestone: name` or `Milestone reached: name` on its own line
//!
//! Commits record progress as trailer-style fields:
//! - `Progress: 4/10 tasks complete (40%)`
//! - `Progress: 40%`
//! - `Milestone: name`

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static NARRATIVE_RATIO_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,5})\s*/\s*(\d{1,5})\s+tasks?\s+(?:complete|completed|done|finished)\b")
        .unwrap()
});

static NARRATIVE_PERCENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,3})\s*%\s+(?:complete|completed|done|finished)\b").unwrap()
});

static NARRATIVE_MILESTONE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:[-*+]\s*)?milestone(?:\s+reached)?\s*:\s*(.+?)\s*$").unwrap()
});

static COMMIT_RATIO_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*progress\s*:\s*(\d{1,5})\s*/\s*(\d{1,5})").unwrap());

static COMMIT_PERCENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*progress\s*:.*?\b(\d{1,3})\s*%").unwrap());

static COMMIT_MILESTONE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*milestone\s*:\s*(.+?)\s*$").unwrap());

/// A quantitative statement about progress made in narrative text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ProgressClaim {
    TaskRatio { done: u32, total: u32 },
    Percent { value: u32 },
    Milestone { name: String },
}

impl std::fmt::Display for ProgressClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressClaim::TaskRatio { done, total } => write!(f, "{}/{} tasks complete", done, total),
            ProgressClaim::Percent { value } => write!(f, "{}% complete", value),
            ProgressClaim::Milestone { name } => write!(f, "milestone '{}'", name),
        }
    }
}

/// Progress fields recorded in one commit message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitProgress {
    pub ratio: Option<(u32, u32)>,
    pub percent: Option<u32>,
    pub milestones: Vec<String>,
}

impl CommitProgress {
    pub fn is_empty(&self) -> bool {
        self.ratio.is_none() && self.percent.is_none() && self.milestones.is_empty()
    }

    /// Explicit percentage plus the one implied by a task ratio.
    pub fn percentages(&self) -> Vec<u32> {
        let mut out: Vec<u32> = self.percent.into_iter().collect();
        if let Some((done, total)) = self.ratio
            && total > 0
        {
            let implied = (100.0 * done as f64 / total as f64).round() as u32;
            if !out.contains(&implied) {
                out.push(implied);
            }
        }
        out
    }
}

fn push_unique(claims: &mut Vec<ProgressClaim>, claim: ProgressClaim) {
    if !claims.contains(&claim) {
        claims.push(claim);
    }
}

/// Extract every progress claim from narrative text, deduplicated, in
/// grammar order (task ratios, percentages, milestones).
pub fn parse_claims(text: &str) -> Vec<ProgressClaim> {
    let mut claims = Vec::new();

    for cap in NARRATIVE_RATIO_REGEX.captures_iter(text) {
        let (Ok(done), Ok(total)) = (cap[1].parse::<u32>(), cap[2].parse::<u32>()) else {
            continue;
        };
        if total == 0 || done > total {
            continue;
        }
        push_unique(&mut claims, ProgressClaim::TaskRatio { done, total });
    }

    for cap in NARRATIVE_PERCENT_REGEX.captures_iter(text) {
        if let Ok(value) = cap[1].parse::<u32>()
            && value <= 100
        {
            push_unique(&mut claims, ProgressClaim::Percent { value });
        }
    }

    for cap in NARRATIVE_MILESTONE_REGEX.captures_iter(text) {
        let name = cap[1].trim().to_string();
        if !name.is_empty() {
            push_unique(&mut claims, ProgressClaim::Milestone { name });
        }
    }

    claims
}

/// Extract the progress fields from a full commit message.
pub fn parse_commit_progress(message: &str) -> CommitProgress {
    let ratio = COMMIT_RATIO_REGEX.captures(message).and_then(|cap| {
        let done = cap[1].parse::<u32>().ok()?;
        let total = cap[2].parse::<u32>().ok()?;
        (total > 0).then_some((done, total))
    });
    let percent = COMMIT_PERCENT_REGEX
        .captures(message)
        .and_then(|cap| cap[1].parse::<u32>().ok())
        .filter(|p| *p <= 100);
    let milestones = COMMIT_MILESTONE_REGEX
        .captures_iter(message)
        .map(|cap| cap[1].trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();

    CommitProgress {
        ratio,
        percent,
        milestones,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_narrative_claims() {
        let text = "We are at 4/10 tasks complete, roughly 40% done.\n\
                    Milestone reached: parser rewrite\n\
                    - Milestone: CLI wired\n";
        assert_eq!(
            parse_claims(text),
            vec![
                ProgressClaim::TaskRatio { done: 4, total: 10 },
                ProgressClaim::Percent { value: 40 },
                ProgressClaim::Milestone {
                    name: "parser rewrite".to_string()
                },
                ProgressClaim::Milestone {
                    name: "CLI wired".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_parse_claims_dedups_and_rejects_nonsense() {
        let text = "3/5 tasks done. Still 3/5 tasks done. 7/5 tasks done. 0/0 tasks done. 250% complete.";
        assert_eq!(
            parse_claims(text),
            vec![ProgressClaim::TaskRatio { done: 3, total: 5 }]
        );
    }

    #[test]
    fn test_plain_numbers_are_not_claims() {
        assert!(parse_claims("Fixed 4/10 flaky tests and 40% of warnings.").is_empty());
    }

    #[test]
    fn test_parse_commit_progress_full() {
        let message = "feat: add importer\n\nProgress: 4/10 tasks complete (40%)\nMilestone: importer skeleton\n";
        let progress = parse_commit_progress(message);
        assert_eq!(progress.ratio, Some((4, 10)));
        assert_eq!(progress.percent, Some(40));
        assert_eq!(progress.milestones, vec!["importer skeleton"]);
        assert_eq!(progress.percentages(), vec![40]);
    }

    #[test]
    fn test_ratio_implies_percentage() {
        let progress = parse_commit_progress("Progress: 3/8");
        assert_eq!(progress.ratio, Some((3, 8)));
        assert_eq!(progress.percent, None);
        assert_eq!(progress.percentages(), vec![38]);
    }

    #[test]
    fn test_commit_without_fields() {
        let progress = parse_commit_progress("fix: typo in readme\n\nNo trailers here.");
        assert!(progress.is_empty());
        assert!(progress.percentages().is_empty());
    }

    #[test]
    fn test_claim_display() {
        assert_eq!(
            ProgressClaim::TaskRatio { done: 9, total: 10 }.to_string(),
            "9/10 tasks complete"
        );
        assert_eq!(ProgressClaim::Percent { value: 5 }.to_string(), "5% complete");
    }
}
