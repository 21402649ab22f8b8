//! Drives one compaction run from raw context to persisted artifact.

use super::EngineSettings;
use super::trigger::TriggerDecision;
use crate::analyzer::{Analysis, RawContext, analyze};
use crate::errors::TetherError;
use crate::evidence::{GitEvidence, GitEvidenceCollector};
use crate::state::{CompactedState, PersistReceipt, StateBuilder, persist};
use crate::strategy::{CompressionPlan, StrategySelector};
use crate::transforms::{ExecutionReport, execute};
use crate::validator::StateValidator;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Per-run switches.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub plan_id: String,
    /// Compact even when the trigger threshold is not reached.
    pub force: bool,
    /// Build the state but write nothing.
    pub dry_run: bool,
}

impl RunOptions {
    pub fn new(plan_id: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            force: false,
            dry_run: false,
        }
    }
}

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct CompactionReport {
    pub analysis: Analysis,
    pub decision: TriggerDecision,
    pub plan: CompressionPlan,
    pub execution: ExecutionReport,
    pub evidence: GitEvidence,
    pub state: CompactedState,
    /// `None` for a dry run.
    pub receipt: Option<PersistReceipt>,
}

#[derive(Debug, Clone)]
pub enum CompactionOutcome {
    NotTriggered {
        analysis: Analysis,
        decision: TriggerDecision,
    },
    Compacted(Box<CompactionReport>),
}

/// Runs the compaction pipeline for a repository.
#[derive(Debug, Clone)]
pub struct CompactionEngine {
    settings: EngineSettings,
    root: PathBuf,
}

impl CompactionEngine {
    pub fn new(settings: EngineSettings, root: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            root: root.into(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Analyze `raw` and check it against the trigger threshold.
    pub fn measure(&self, raw: &RawContext) -> (Analysis, TriggerDecision) {
        let analysis = analyze(raw);
        let decision = self.settings.trigger_check().evaluate(&analysis.estimate);
        (analysis, decision)
    }

    /// Run the pipeline. Persisting is the last step and is skipped for a
    /// dry run.
    pub fn run(&self, raw: &RawContext, options: &RunOptions) -> Result<CompactionOutcome, TetherError> {
        let builder = StateBuilder::new(&options.plan_id)?;

        let analysis = analyze(raw);
        let check = self.settings.trigger_check();
        let decision = if options.force {
            check.forced(&analysis.estimate)
        } else {
            check.evaluate(&analysis.estimate)
        };
        if !decision.triggered {
            debug!("Not compacting {}: {}", options.plan_id, decision.reason);
            return Ok(CompactionOutcome::NotTriggered { analysis, decision });
        }
        info!("Compacting {}: {}", options.plan_id, decision.reason);

        let plan = StrategySelector::new(self.settings.min_compress_chars)
            .select(&analysis.profile, self.settings.target_ratio);
        let text = raw.text();
        let execution = execute(&text, &plan);

        let evidence = GitEvidenceCollector::new(self.settings.evidence.clone()).collect(&self.root);
        let (claims, verdict) =
            StateValidator::new(self.settings.validation).validate_narrative(&text, &evidence);
        if !verdict.discrepancies.is_empty() {
            warn!(
                "{} of {} progress claims disagree with git history",
                verdict.discrepancies.len(),
                verdict.claims_checked
            );
        }

        let mut state = builder
            .with_claims(claims)
            .with_execution(&execution, plan.is_noop())
            .with_source_digest(raw.digest())
            .with_branch(evidence.current_branch.clone())
            .with_timestamp(raw.captured_at())
            .build(&execution.text, &analysis.profile, &analysis.estimate, &verdict);

        let receipt = if options.dry_run {
            info!("Dry run: not persisting compacted state");
            None
        } else {
            let companions: Vec<PathBuf> = raw
                .fragments()
                .iter()
                .map(|f| f.path.clone())
                .filter(|p| p.is_file())
                .collect();
            Some(persist(&mut state, &self.root, &companions)?)
        };

        Ok(CompactionOutcome::Compacted(Box::new(CompactionReport {
            analysis,
            decision,
            plan,
            execution,
            evidence,
            state,
            receipt,
        })))
    }
}
