//! Git evidence view (`tether evidence`).

use anyhow::Result;
use console::style;
use std::path::Path;

use super::load_config;

pub fn cmd_evidence(repo: &Path) -> Result<()> {
    use tether::evidence::GitEvidenceCollector;
    use tether::util::{short_hash, truncate_line};

    let config = load_config(repo)?;
    let settings = config.plan_settings("")?;
    let evidence = GitEvidenceCollector::new(settings.evidence.clone()).collect(repo);

    println!();
    println!("{}", style("Git Evidence").bold());
    println!("============");
    println!();

    if evidence.unavailable {
        println!(
            "{} {}",
            style("Unavailable:").yellow().bold(),
            evidence.unavailable_reason.as_deref().unwrap_or("unknown reason")
        );
        println!();
        return Ok(());
    }

    println!(
        "Branch: {}",
        evidence.current_branch.as_deref().unwrap_or("(none)")
    );
    if let Some(counterpart) = &evidence.branch_relationship.counterpart_branch {
        println!("Counterpart: {}", counterpart);
    }
    println!();

    println!(
        "Progress commits (last {} days, max {}):",
        settings.evidence.lookback_days, settings.evidence.max_commits
    );
    if evidence.recent_commits.is_empty() {
        println!("  {}", style("none").dim());
    }
    for commit in &evidence.recent_commits {
        println!(
            "  {} {} {}",
            style(short_hash(&commit.hash)).cyan(),
            style(commit.timestamp.format("%Y-%m-%d")).dim(),
            truncate_line(&commit.subject, 60)
        );
    }
    println!();

    println!("Compaction tags:");
    if evidence.tags.is_empty() {
        println!("  {}", style("none").dim());
    }
    for tag in &evidence.tags {
        println!("  {}", tag.name);
    }
    println!();

    Ok(())
}
