//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `analyze`  | `Analyze`        |
//! | `compact`  | `Compact`        |
//! | `validate` | `Validate`       |
//! | `evidence` | `Evidence`       |
//! | `resume`   | `Resume`         |
//! | `config`   | `Config`         |

pub mod analyze;
pub mod compact;
pub mod config;
pub mod evidence;
pub mod resume;
pub mod validate;

pub use analyze::cmd_analyze;
pub use compact::{CompactFlags, cmd_compact};
pub use config::cmd_config;
pub use evidence::cmd_evidence;
pub use resume::cmd_resume;
pub use validate::cmd_validate;

use anyhow::{Context, Result};
use console::style;
use std::path::{Path, PathBuf};
use tether::analyzer::RawContext;
use tether::tether_config::{TetherToml, get_tether_dir};
use tether::validator::{ValidationVerdict, VerdictStatus};

/// Load `tether.toml` for a repository, or the defaults.
fn load_config(repo: &Path) -> Result<TetherToml> {
    TetherToml::load_or_default(&get_tether_dir(repo))
}

/// Read the narrative context from explicit paths, or from the configured
/// source globs when none are given.
fn load_sources(repo: &Path, config: &TetherToml, paths: &[PathBuf]) -> Result<RawContext> {
    let paths = if paths.is_empty() {
        let found = config
            .source_paths(repo)
            .context("Failed to expand [sources] include")?;
        if found.is_empty() {
            anyhow::bail!(
                "No narrative sources found. Pass paths explicitly or set [sources] include in {}",
                get_tether_dir(repo).join("tether.toml").display()
            );
        }
        found
    } else {
        paths.to_vec()
    };

    let raw = RawContext::from_paths(&paths);
    for skipped in raw.skipped() {
        eprintln!(
            "{} skipped {}: {}",
            style("!").yellow(),
            skipped.path.display(),
            skipped.reason
        );
    }
    Ok(raw)
}

fn styled_status(status: VerdictStatus) -> String {
    match status {
        VerdictStatus::Validated => style(status).green().bold().to_string(),
        VerdictStatus::Pending => style(status).yellow().bold().to_string(),
        VerdictStatus::Conflicted => style(status).red().bold().to_string(),
    }
}

fn print_verdict(verdict: &ValidationVerdict) {
    println!(
        "Verdict: {} ({} claims checked)",
        styled_status(verdict.status),
        verdict.claims_checked
    );
    for hash in &verdict.supporting_commits {
        println!(
            "  {} supported by {}",
            style("✓").green(),
            tether::util::short_hash(hash)
        );
    }
    for d in &verdict.discrepancies {
        println!("  {} {}: {}", style("✗").red(), d.claim, d.reason);
    }
    for note in &verdict.notes {
        println!("  {} {}", style("-").dim(), style(note).dim());
    }
}
