//! Narrative claims versus git history (`tether validate`).

use anyhow::Result;
use console::style;
use std::path::{Path, PathBuf};

use super::{load_config, load_sources, print_verdict};

pub fn cmd_validate(repo: &Path, paths: &[PathBuf]) -> Result<()> {
    use tether::evidence::GitEvidenceCollector;
    use tether::validator::StateValidator;

    let config = load_config(repo)?;
    let settings = config.plan_settings("")?;
    let raw = load_sources(repo, &config, paths)?;

    let evidence = GitEvidenceCollector::new(settings.evidence.clone()).collect(repo);
    let (claims, verdict) =
        StateValidator::new(settings.validation).validate_narrative(&raw.text(), &evidence);

    println!();
    println!("{}", style("Progress Validation").bold());
    println!("===================");
    println!();
    if claims.is_empty() {
        println!("No progress claims found in {} sources.", raw.fragments().len());
    } else {
        println!("Claims:");
        for claim in &claims {
            println!("  - {}", claim);
        }
    }
    println!(
        "Evidence: {} progress commits{}",
        evidence.recent_commits.len(),
        if evidence.unavailable { " (unavailable)" } else { "" }
    );
    println!();
    print_verdict(&verdict);
    println!();

    Ok(())
}
