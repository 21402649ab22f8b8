//! Context compaction (`tether compact`).

use anyhow::Result;
use console::style;
use std::path::{Path, PathBuf};

use super::{load_config, load_sources, print_verdict};

/// Flags of `tether compact` that override configured settings.
pub struct CompactFlags<'a> {
    pub force: bool,
    pub target_ratio: Option<f64>,
    pub context_limit: Option<&'a str>,
    pub dry_run: bool,
}

pub fn cmd_compact(repo: &Path, plan_id: &str, paths: &[PathBuf], flags: CompactFlags<'_>) -> Result<()> {
    use tether::compaction::{CompactionEngine, CompactionOutcome, RunOptions, parse_context_limit};
    use tether::tether_config::apply_cli_overrides;

    let config = load_config(repo)?;
    let mut settings = config.plan_settings(plan_id)?;
    let context_limit = flags.context_limit.map(parse_context_limit).transpose()?;
    apply_cli_overrides(&mut settings, flags.target_ratio, context_limit);

    let raw = load_sources(repo, &config, paths)?;
    let engine = CompactionEngine::new(settings, repo);
    let options = RunOptions {
        force: flags.force,
        dry_run: flags.dry_run,
        ..RunOptions::new(plan_id)
    };

    println!();
    println!("{} {}", style("Context Compaction -").bold(), style(plan_id).cyan().bold());
    println!();

    let report = match engine.run(&raw, &options)? {
        CompactionOutcome::NotTriggered { analysis, decision } => {
            println!("Estimate: {}", analysis.estimate);
            println!("{} {}", style("Not compacting:").green(), decision.reason);
            println!("Use --force to compact anyway.");
            println!();
            return Ok(());
        }
        CompactionOutcome::Compacted(report) => report,
    };

    let meta = &report.state.metadata;
    println!("Trigger: {}", report.decision.reason);
    println!("Plan: {}", report.plan.describe());
    for degraded in &report.execution.degraded {
        println!(
            "  {} {} skipped: {}",
            style("!").yellow(),
            degraded.kind,
            degraded.reason
        );
    }
    println!(
        "Tokens: ~{} -> ~{} ({}% reduction)",
        meta.source_tokens,
        meta.compressed_tokens,
        meta.reduction_percent()
    );
    if meta.oversized {
        println!(
            "  {} the compacted state is not smaller than its sources",
            style("!").yellow()
        );
    }
    print_verdict(&meta.validation_verdict);
    println!();

    match &report.receipt {
        None => {
            println!("{}", style("Dry run: nothing written.").dim());
            println!();
            print!("{}", report.state.render_markdown());
        }
        Some(receipt) => {
            println!(
                "{} compaction {} written to {}",
                style("✓").green().bold(),
                receipt.sequence,
                receipt.artifact_path.display()
            );
            match &receipt.commit {
                Some(commit) => println!("  commit: {}", tether::util::short_hash(commit)),
                None => println!("  {}", style("not committed (see warnings)").yellow()),
            }
            if let Some(tag) = &receipt.tag {
                println!("  tag: {}", tag);
            }
        }
    }
    println!();

    Ok(())
}
