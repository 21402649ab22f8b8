//! Content profile and trigger check (`tether analyze`).

use anyhow::Result;
use console::style;
use std::path::{Path, PathBuf};

use super::{load_config, load_sources};

pub fn cmd_analyze(repo: &Path, paths: &[PathBuf], plan: Option<&str>, json: bool) -> Result<()> {
    use tether::analyzer::{ContentCategory, analyze};
    use tether::strategy::StrategySelector;
    use tether::util::truncate_line;

    let config = load_config(repo)?;
    let settings = config.plan_settings(plan.unwrap_or_default())?;
    let raw = load_sources(repo, &config, paths)?;
    let analysis = analyze(&raw);
    let profile = &analysis.profile;
    let plan = StrategySelector::new(settings.min_compress_chars)
        .select(profile, settings.target_ratio);
    let decision = settings.trigger_check().evaluate(&analysis.estimate);

    if json {
        let report = serde_json::json!({
            "profile": profile,
            "estimate": analysis.estimate,
            "plan": plan,
            "trigger": decision,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("{}", style("Content Analysis").bold());
    println!("================");
    println!();
    println!("Sources: {} ({} skipped)", raw.fragments().len(), profile.skipped_fragments);
    println!(
        "Size: {} chars, {} words, {} lines",
        profile.total_chars, profile.total_words, profile.total_lines
    );
    println!("Estimate: {}", analysis.estimate);
    println!();

    println!("Categories:");
    for category in ContentCategory::ALL {
        println!(
            "  {:<6} {:>5.1}%  ({} lines)",
            category.to_string(),
            profile.share(category) * 100.0,
            profile.count(category)
        );
    }
    println!();

    println!("Protected fragments:");
    for anchor in &profile.anchors {
        let first = anchor.text.lines().next().unwrap_or("");
        let origin = if anchor.located {
            style("heading").green()
        } else {
            style("fallback").yellow()
        };
        println!(
            "  {:<18} [{}] {}",
            anchor.kind.id(),
            origin,
            truncate_line(first, 60)
        );
    }
    println!();

    println!("Plan: {}", plan.describe());

    let marker = if decision.triggered {
        style("compaction needed").red().bold()
    } else {
        style("within limit").green()
    };
    println!(
        "Trigger: {} - {} ({:.1}% of {} token budget)",
        marker, decision.reason, decision.usage_percent, settings.context_budget
    );
    println!();

    Ok(())
}
