use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "tether")]
#[command(version, about = "Compact session notes and verify them against git history")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Repository root (defaults to the current directory)
    #[arg(long, global = true)]
    pub repo: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the content profile, size estimate and trigger decision
    Analyze {
        /// Narrative files or directories (defaults to [sources] include)
        paths: Vec<PathBuf>,
        /// Plan whose overrides apply
        #[arg(long)]
        plan: Option<String>,
        /// Print the analysis as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compact the narrative context for a plan
    Compact {
        /// Plan identifier
        #[arg(short, long)]
        plan: String,
        /// Narrative files or directories (defaults to [sources] include)
        paths: Vec<PathBuf>,
        /// Compact even when below the context limit
        #[arg(long)]
        force: bool,
        /// Target output size as a fraction of the input (0.3-0.7)
        #[arg(long)]
        target_ratio: Option<f64>,
        /// Context limit (e.g., "80%" or "150000" tokens). Overrides tether.toml.
        #[arg(long)]
        context_limit: Option<String>,
        /// Build the compacted state without writing or committing it
        #[arg(long)]
        dry_run: bool,
    },
    /// Check narrative progress claims against git history
    Validate {
        /// Narrative files or directories (defaults to [sources] include)
        paths: Vec<PathBuf>,
    },
    /// Show the git evidence used for validation
    Evidence,
    /// Reload the latest compacted state for a plan and re-validate it
    Resume {
        /// Plan identifier
        #[arg(short, long)]
        plan: String,
        /// Print the artifact as YAML instead of markdown
        #[arg(long)]
        yaml: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default tether.toml file
    Init,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tether={}", default_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let repo = match cli.repo.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Analyze { paths, plan, json } => {
            cmd::cmd_analyze(&repo, paths, plan.as_deref(), *json)?
        }
        Commands::Compact {
            plan,
            paths,
            force,
            target_ratio,
            context_limit,
            dry_run,
        } => cmd::cmd_compact(
            &repo,
            plan,
            paths,
            cmd::CompactFlags {
                force: *force,
                target_ratio: *target_ratio,
                context_limit: context_limit.as_deref(),
                dry_run: *dry_run,
            },
        )?,
        Commands::Validate { paths } => cmd::cmd_validate(&repo, paths)?,
        Commands::Evidence => cmd::cmd_evidence(&repo)?,
        Commands::Resume { plan, yaml } => cmd::cmd_resume(&repo, plan, *yaml)?,
        Commands::Config { command } => cmd::cmd_config(&repo, command.clone())?,
    }

    Ok(())
}
