use super::{CompactedState, CompactionMetadata, artifact_path, latest_artifact, validate_plan_id};
use crate::errors::{EvidenceError, TetherError};
use crate::evidence::git::{compaction_tags, open_repository};
use crate::evidence::{COMPACTION_SUBJECT_PREFIX, CompactionTag};
use crate::util::retry_once;
use git2::{Repository, Signature};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where a compacted state ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistReceipt {
    pub artifact_path: PathBuf,
    pub sequence: u32,
    /// Commit hash, when the artifact was committed.
    pub commit: Option<String>,
    /// Tag name, when the commit was tagged.
    pub tag: Option<String>,
}

/// `compaction: {plan} phase {N} - {R}% reduction`
pub fn commit_subject(meta: &CompactionMetadata) -> String {
    format!(
        "{} {} phase {} - {}% reduction",
        COMPACTION_SUBJECT_PREFIX,
        meta.plan_id,
        meta.sequence,
        meta.reduction_percent()
    )
}

fn commit_message(meta: &CompactionMetadata) -> String {
    format!(
        "{}\n\nPlan: {}\nSequence: {}\nVerdict: {}\nSource-Tokens: {}\nCompressed-Tokens: {}\n",
        commit_subject(meta),
        meta.plan_id,
        meta.sequence,
        meta.validation_verdict.status,
        meta.source_tokens,
        meta.compressed_tokens
    )
}

/// Write `state` as the next artifact for its plan, then commit and tag it.
///
/// The artifact write is the only step that can fail the call. Commit and
/// tag failures are retried once, logged, and reported as `None` in the
/// receipt. `companions` are committed alongside the artifact.
///
/// Assumes a single writer per plan: two concurrent calls may pick the same
/// sequence.
pub fn persist(
    state: &mut CompactedState,
    root: &Path,
    companions: &[PathBuf],
) -> Result<PersistReceipt, TetherError> {
    let plan_id = state.metadata.plan_id.clone();
    validate_plan_id(&plan_id)?;

    let repo = match open_repository(root) {
        Ok(repo) => Some(repo),
        Err(e) => {
            warn!("Persisting without version control: {}", e);
            None
        }
    };

    let sequence = next_sequence(root, &plan_id, repo.as_ref())?;
    state.metadata.sequence = sequence;

    let path = artifact_path(root, &plan_id, sequence);
    write_artifact(state, &path)?;
    info!("Wrote compacted state to {}", path.display());

    let mut receipt = PersistReceipt {
        artifact_path: path.clone(),
        sequence,
        commit: None,
        tag: None,
    };
    let Some(repo) = repo else {
        return Ok(receipt);
    };

    let mut paths = vec![path];
    paths.extend(companions.iter().cloned());
    let message = commit_message(&state.metadata);
    let committed = retry_once(
        "compaction commit",
        || commit_paths(&repo, &paths, &message),
        EvidenceError::is_transient,
    );
    match committed {
        Ok(oid) => {
            debug!("Committed compaction as {}", oid);
            receipt.commit = Some(oid.to_string());
            let name = CompactionTag::format(&plan_id, sequence, state.metadata.timestamp);
            match retry_once(
                "compaction tag",
                || tag_commit(&repo, oid, &name),
                EvidenceError::is_transient,
            ) {
                Ok(()) => receipt.tag = Some(name),
                Err(e) => warn!("Could not tag compaction commit: {}", e),
            }
        }
        Err(e) => warn!("Could not commit compacted state: {}", e),
    }

    Ok(receipt)
}

/// One past the highest sequence seen in either artifacts or tags.
fn next_sequence(root: &Path, plan_id: &str, repo: Option<&Repository>) -> Result<u32, TetherError> {
    let from_artifacts = latest_artifact(root, plan_id)?.map(|(s, _)| s).unwrap_or(0);
    let from_tags = match repo.map(compaction_tags) {
        Some(Ok(tags)) => tags
            .iter()
            .filter(|t| t.plan_id == plan_id)
            .map(|t| t.sequence)
            .max()
            .unwrap_or(0),
        Some(Err(e)) => {
            warn!("Could not read compaction tags: {}", e);
            0
        }
        None => 0,
    };
    Ok(from_artifacts.max(from_tags) + 1)
}

fn write_artifact(state: &CompactedState, path: &Path) -> Result<(), TetherError> {
    let write_failed = |source: std::io::Error| TetherError::ArtifactWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_failed)?;
    }
    let yaml = state.to_yaml()?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(write_failed)?;
    std::fs::rename(&tmp, path).map_err(write_failed)?;
    Ok(())
}

fn commit_paths(repo: &Repository, paths: &[PathBuf], message: &str) -> Result<git2::Oid, EvidenceError> {
    let workdir = repo
        .workdir()
        .and_then(|w| w.canonicalize().ok())
        .ok_or_else(|| EvidenceError::BareRepository(repo.path().to_path_buf()))?;

    let mut index = repo.index()?;
    for path in paths {
        let relative = path
            .canonicalize()
            .ok()
            .and_then(|p| p.strip_prefix(&workdir).ok().map(Path::to_path_buf));
        match relative {
            Some(relative) => index.add_path(&relative)?,
            None => warn!("Not committing {}: outside the repository", path.display()),
        }
    }
    index.write()?;

    let tree = repo.find_tree(index.write_tree()?)?;
    let sig = repo
        .signature()
        .or_else(|_| Signature::now("tether", "tether@localhost"))?;
    let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    Ok(repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?)
}

fn tag_commit(repo: &Repository, oid: git2::Oid, name: &str) -> Result<(), EvidenceError> {
    let target = repo.find_object(oid, None)?;
    repo.tag_lightweight(name, &target, false)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AnchorKind;
    use crate::state::{PreservedSection, artifact_file_name};
    use crate::validator::{ProgressClaim, ValidationVerdict};
    use chrono::Utc;
    use std::fs;
    use tempfile::tempdir;

    fn state(plan_id: &str) -> CompactedState {
        CompactedState {
            metadata: CompactionMetadata {
                plan_id: plan_id.to_string(),
                sequence: 0,
                timestamp: Utc::now(),
                source_tokens: 1000,
                compressed_tokens: 400,
                compression_ratio: 0.4,
                validation_verdict: ValidationVerdict::pending(1, "no progress commits"),
                source_digest: "ab".to_string(),
                claims: vec![ProgressClaim::Percent { value: 40 }],
                transforms: Vec::new(),
                degraded: Vec::new(),
                branch: None,
                noop: false,
                oversized: false,
            },
            preserved_sections: vec![PreservedSection {
                id: AnchorKind::CurrentObjective,
                title: "Current Objective".to_string(),
                text: "Ship it.".to_string(),
            }],
            archived_summary: "Earlier work.".to_string(),
            resumption_instructions: vec!["Ship it.".to_string()],
        }
    }

    fn setup_repo() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "test").unwrap();
        config.set_str("user.email", "test@test.com").unwrap();
        dir
    }

    #[test]
    fn test_commit_subject_and_message() {
        let mut s = state("importer");
        s.metadata.sequence = 3;
        assert_eq!(
            commit_subject(&s.metadata),
            "compaction: importer phase 3 - 60% reduction"
        );
        let message = commit_message(&s.metadata);
        assert!(message.contains("\n\nPlan: importer\nSequence: 3\nVerdict: pending\n"));
        assert!(!message.to_lowercase().contains("progress:"));
    }

    #[test]
    fn test_persist_commits_and_tags() {
        let dir = setup_repo();
        let notes = dir.path().join("notes.md");
        fs::write(&notes, "# Notes\n").unwrap();

        let mut s = state("importer");
        let receipt = persist(&mut s, dir.path(), &[notes]).unwrap();
        assert_eq!(receipt.sequence, 1);
        assert_eq!(s.metadata.sequence, 1);
        assert!(receipt.artifact_path.ends_with(".tether/plans/importer/compaction-0001.yaml"));

        let loaded = CompactedState::load(&receipt.artifact_path).unwrap();
        assert_eq!(loaded.metadata.sequence, 1);

        let repo = Repository::open(dir.path()).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(receipt.commit.as_deref(), Some(head.id().to_string().as_str()));
        assert!(head.summary().unwrap().starts_with("compaction: importer phase 1"));
        let tree = head.tree().unwrap();
        assert!(tree.get_path(Path::new(".tether/plans/importer/compaction-0001.yaml")).is_ok());
        assert!(tree.get_path(Path::new("notes.md")).is_ok());

        let tag = receipt.tag.unwrap();
        assert!(tag.starts_with("compaction/importer/1/"));
        assert!(repo.find_reference(&format!("refs/tags/{}", tag)).is_ok());
    }

    #[test]
    fn test_tag_failure_keeps_commit() {
        let dir = setup_repo();
        let repo = Repository::open(dir.path()).unwrap();
        let sig = Signature::now("test", "test@test.com").unwrap();
        let tree = repo
            .find_tree(repo.index().unwrap().write_tree().unwrap())
            .unwrap();
        let base = repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[]).unwrap();
        // A ref where the tag's parent directory has to go. Its name is not a
        // full compaction tag, so sequence numbering ignores it.
        repo.reference("refs/tags/compaction/importer/1", base, false, "block tag")
            .unwrap();

        let receipt = persist(&mut state("importer"), dir.path(), &[]).unwrap();
        assert_eq!(receipt.sequence, 1);
        assert!(receipt.artifact_path.exists());
        assert!(receipt.tag.is_none());

        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(receipt.commit.as_deref(), Some(head.id().to_string().as_str()));
        assert!(head.summary().unwrap().starts_with("compaction: importer phase 1"));
    }

    #[test]
    fn test_sequence_increments() {
        let dir = setup_repo();
        let first = persist(&mut state("importer"), dir.path(), &[]).unwrap();
        let second = persist(&mut state("importer"), dir.path(), &[]).unwrap();
        let other = persist(&mut state("billing"), dir.path(), &[]).unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(other.sequence, 1);
        assert!(first.artifact_path.exists());
        assert!(second.artifact_path.exists());
    }

    #[test]
    fn test_sequence_follows_tags_when_artifacts_are_gone() {
        let dir = setup_repo();
        let first = persist(&mut state("importer"), dir.path(), &[]).unwrap();
        fs::remove_file(&first.artifact_path).unwrap();

        let second = persist(&mut state("importer"), dir.path(), &[]).unwrap();
        assert_eq!(second.sequence, 2);
    }

    #[test]
    fn test_existing_artifact_is_never_overwritten() {
        // A second writer's artifact is only seen through the directory
        // listing; sequences are not reserved.
        let dir = tempdir().unwrap();
        let plan = crate::state::plan_dir(dir.path(), "importer");
        fs::create_dir_all(&plan).unwrap();
        fs::write(plan.join(artifact_file_name(5)), "written elsewhere").unwrap();

        let receipt = persist(&mut state("importer"), dir.path(), &[]).unwrap();
        assert_eq!(receipt.sequence, 6);
        assert_eq!(
            fs::read_to_string(plan.join(artifact_file_name(5))).unwrap(),
            "written elsewhere"
        );
    }

    #[test]
    fn test_without_repository_still_writes_artifact() {
        let dir = tempdir().unwrap();
        let receipt = persist(&mut state("importer"), dir.path(), &[]).unwrap();
        assert!(receipt.artifact_path.exists());
        assert!(receipt.commit.is_none());
        assert!(receipt.tag.is_none());
    }

    #[test]
    fn test_invalid_plan_id() {
        let dir = tempdir().unwrap();
        let err = persist(&mut state("../escape"), dir.path(), &[]).unwrap_err();
        assert!(matches!(err, TetherError::InvalidPlanId(_)));
        assert!(!dir.path().join(".tether").exists());
    }
}
