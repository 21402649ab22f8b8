use super::{
    BranchRelationship, COMPACTION_SUBJECT_PREFIX, CommitRecord, CompactionTag, EvidenceSettings,
    GitEvidence,
};
use crate::errors::EvidenceError;
use crate::util::{retry_once, run_with_timeout};
use chrono::{DateTime, Duration, Utc};
use git2::{ErrorCode, Repository, Sort};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::sync::mpsc::RecvTimeoutError;
use tracing::{debug, warn};

/// Commits following the progress-tagging convention carry at least one of
/// these trailer lines.
static PROGRESS_TRAILER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*(?:progress|milestone)\s*:").unwrap());

/// Collects [`GitEvidence`] with a per-attempt timeout and one retry.
#[derive(Debug, Clone, Default)]
pub struct GitEvidenceCollector {
    settings: EvidenceSettings,
}

impl GitEvidenceCollector {
    pub fn new(settings: EvidenceSettings) -> Self {
        Self { settings }
    }

    /// Snapshot the repository containing `repo_path`.
    ///
    /// Never fails: a missing repository, a timeout or a repeated git error
    /// yields [`GitEvidence::unavailable`].
    pub fn collect(&self, repo_path: &Path) -> GitEvidence {
        let result = retry_once(
            "git evidence collection",
            || self.collect_once(repo_path),
            EvidenceError::is_transient,
        );
        match result {
            Ok(evidence) => {
                debug!(
                    "Collected {} progress commits and {} compaction tags",
                    evidence.recent_commits.len(),
                    evidence.tags.len()
                );
                evidence
            }
            Err(e) => {
                warn!("Git evidence unavailable: {}", e);
                GitEvidence::unavailable(e.to_string())
            }
        }
    }

    fn collect_once(&self, repo_path: &Path) -> Result<GitEvidence, EvidenceError> {
        let path = repo_path.to_path_buf();
        let settings = self.settings.clone();
        let timeout = self.settings.timeout();
        match run_with_timeout(timeout, move || read_evidence(&path, &settings)) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(EvidenceError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(EvidenceError::WorkerLost),
        }
    }
}

/// Open the repository containing `path` and read its evidence, without
/// timeout or retry.
pub fn read_evidence(
    path: &Path,
    settings: &EvidenceSettings,
) -> Result<GitEvidence, EvidenceError> {
    let repo = open_repository(path)?;
    let current_branch = current_branch(&repo)?;
    let recent_commits = progress_commits(&repo, settings)?;
    let tags = compaction_tags(&repo)?;

    Ok(GitEvidence {
        branch_relationship: current_branch
            .as_deref()
            .map(BranchRelationship::classify)
            .unwrap_or_else(BranchRelationship::other),
        current_branch,
        recent_commits,
        tags,
        unavailable: false,
        unavailable_reason: None,
    })
}

pub(crate) fn open_repository(path: &Path) -> Result<Repository, EvidenceError> {
    let repo = Repository::discover(path)
        .map_err(|_| EvidenceError::NotARepository(PathBuf::from(path)))?;
    if repo.is_bare() {
        return Err(EvidenceError::BareRepository(PathBuf::from(path)));
    }
    Ok(repo)
}

fn current_branch(repo: &Repository) -> Result<Option<String>, EvidenceError> {
    match repo.head() {
        Ok(head) => {
            if repo.head_detached()? {
                Ok(Some("HEAD".to_string()))
            } else {
                Ok(head.shorthand().map(str::to_string))
            }
        }
        Err(e) if e.code() == ErrorCode::UnbornBranch => {
            // No commits yet: HEAD still names the branch it will create.
            let head = repo.find_reference("HEAD")?;
            Ok(head
                .symbolic_target()
                .map(|target| target.strip_prefix("refs/heads/").unwrap_or(target).to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

fn progress_commits(
    repo: &Repository,
    settings: &EvidenceSettings,
) -> Result<Vec<CommitRecord>, EvidenceError> {
    if repo.head().is_err() {
        return Ok(Vec::new());
    }

    let mut walk = repo.revwalk()?;
    walk.push_head()?;
    walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

    let cutoff = Utc::now() - Duration::days(i64::from(settings.lookback_days));
    let mut commits = Vec::new();
    // Rebased commits can carry old timestamps, so one stale commit does not
    // end the walk; a run of `max_commits` stale commits does.
    let mut stale_run = 0;

    for oid in walk {
        if commits.len() >= settings.max_commits {
            break;
        }
        let commit = repo.find_commit(oid?)?;
        let timestamp = DateTime::from_timestamp(commit.time().seconds(), 0).unwrap_or_default();
        if timestamp < cutoff {
            stale_run += 1;
            if stale_run >= settings.max_commits {
                break;
            }
            continue;
        }
        stale_run = 0;

        let subject = commit.summary().unwrap_or("").to_string();
        if subject.starts_with(COMPACTION_SUBJECT_PREFIX) {
            continue;
        }
        let message = commit.message().unwrap_or("");
        if !PROGRESS_TRAILER_REGEX.is_match(message) {
            continue;
        }

        commits.push(CommitRecord {
            hash: commit.id().to_string(),
            subject,
            body: commit.body().unwrap_or("").trim().to_string(),
            timestamp,
        });
    }

    Ok(commits)
}

pub(crate) fn compaction_tags(repo: &Repository) -> Result<Vec<CompactionTag>, EvidenceError> {
    let names = repo.tag_names(Some("compaction/*"))?;
    let mut tags: Vec<CompactionTag> = names
        .iter()
        .flatten()
        .filter_map(CompactionTag::parse)
        .collect();
    tags.sort_by(|a, b| {
        a.plan_id
            .cmp(&b.plan_id)
            .then(a.sequence.cmp(&b.sequence))
    });
    Ok(tags)
}
