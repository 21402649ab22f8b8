//! Reloading the latest compacted state in a new session.
//!
//! The stored claims are re-checked against the repository as it is now.
//! A worse verdict than the one recorded is flagged, but resumption always
//! goes ahead.

use crate::analyzer::RawContext;
use crate::errors::TetherError;
use crate::evidence::{EvidenceSettings, GitEvidenceCollector};
use crate::state::{CompactedState, latest_artifact, validate_plan_id};
use crate::validator::{StateValidator, ValidationSettings, ValidationVerdict, VerdictStatus};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A reloaded state plus the outcome of re-validating it.
#[derive(Debug, Clone)]
pub struct Resumed {
    pub state: CompactedState,
    /// Verdict against the current history.
    pub verdict: ValidationVerdict,
    /// Status recorded when the state was compacted.
    pub previous: VerdictStatus,
    /// True when `verdict` is worse than `previous`.
    pub downgraded: bool,
    /// Whether the narrative sources differ from the compacted ones;
    /// `None` when no sources were given.
    pub sources_changed: Option<bool>,
    pub artifact_path: PathBuf,
}

impl Resumed {
    /// Markdown working context for a new session.
    pub fn context_text(&self) -> String {
        let mut out = String::new();
        if self.downgraded {
            out.push_str(&format!(
                "> Warning: this state was {} when compacted but is {} against the current git history.\n",
                self.previous, self.verdict.status
            ));
            for d in &self.verdict.discrepancies {
                out.push_str(&format!("> - {}: {}\n", d.claim, d.reason));
            }
            out.push('\n');
        }
        if self.sources_changed == Some(true) {
            out.push_str("> Note: the narrative files changed after this compaction.\n\n");
        }
        out.push_str(&self.state.render_markdown());
        out
    }
}

/// Loads the highest-sequence artifact for a plan and re-validates it.
#[derive(Debug, Clone, Default)]
pub struct ResumptionLoader {
    evidence: EvidenceSettings,
    validation: ValidationSettings,
}

impl ResumptionLoader {
    pub fn new(evidence: EvidenceSettings, validation: ValidationSettings) -> Self {
        Self {
            evidence,
            validation,
        }
    }

    pub fn load(
        &self,
        plan_id: &str,
        root: &Path,
        sources: Option<&RawContext>,
    ) -> Result<Resumed, TetherError> {
        validate_plan_id(plan_id)?;
        let (sequence, artifact_path) =
            latest_artifact(root, plan_id)?.ok_or_else(|| TetherError::NoArtifact {
                plan_id: plan_id.to_string(),
            })?;
        let state = CompactedState::load(&artifact_path)?;
        info!(
            "Resuming plan {} from compaction {} ({})",
            plan_id,
            sequence,
            artifact_path.display()
        );

        let evidence = GitEvidenceCollector::new(self.evidence.clone()).collect(root);
        let verdict =
            StateValidator::new(self.validation).validate(&state.metadata.claims, &evidence);
        let previous = state.metadata.validation_verdict.status;
        let downgraded = !verdict.status.is_no_worse_than(previous);
        if downgraded {
            warn!(
                "Plan {} was {} at compaction but is now {}",
                plan_id, previous, verdict.status
            );
        }

        let sources_changed = sources
            .filter(|raw| !raw.fragments().is_empty())
            .map(|raw| raw.digest() != state.metadata.source_digest);

        Ok(Resumed {
            state,
            verdict,
            previous,
            downgraded,
            sources_changed,
            artifact_path,
        })
    }
}
