//! Session resumption (`tether resume`).

use anyhow::Result;
use console::style;
use std::path::Path;

use super::{load_config, styled_status};

pub fn cmd_resume(repo: &Path, plan_id: &str, yaml: bool) -> Result<()> {
    use tether::analyzer::RawContext;
    use tether::resume::ResumptionLoader;

    let config = load_config(repo)?;
    let settings = config.plan_settings(plan_id)?;
    let sources = config.source_paths(repo)?;
    let raw = (!sources.is_empty()).then(|| RawContext::from_paths(&sources));

    let resumed = ResumptionLoader::new(settings.evidence, settings.validation).load(
        plan_id,
        repo,
        raw.as_ref(),
    )?;

    if yaml {
        print!("{}", resumed.state.to_yaml()?);
        return Ok(());
    }

    eprintln!(
        "{} {} (compaction {}): {} -> {}",
        style("Resuming").bold(),
        style(plan_id).cyan(),
        resumed.state.metadata.sequence,
        styled_status(resumed.previous),
        styled_status(resumed.verdict.status)
    );
    print!("{}", resumed.context_text());

    Ok(())
}
