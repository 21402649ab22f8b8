//! Configuration view and validation commands (`tether config`).

use anyhow::Result;
use console::style;

use super::super::ConfigCommands;

pub fn cmd_config(repo: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use tether::tether_config::{CONFIG_FILE, ENV_CONTEXT_BUDGET, ENV_CONTEXT_LIMIT, TetherToml, get_tether_dir};

    let tether_dir = get_tether_dir(repo);
    let config_path = tether_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("{}", style("Tether Configuration").bold());
            println!("====================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                TetherToml::load(&config_path)?
            } else {
                println!("No tether.toml found at {}", config_path.display());
                println!("Using default configuration.");
                TetherToml::default()
            };
            println!();

            println!("[defaults]");
            println!("  context_budget = {}", toml.defaults.context_budget);
            println!("  context_limit = \"{}\"", toml.defaults.context_limit);
            println!("  target_ratio = {}", toml.defaults.target_ratio);
            println!("  min_compress_chars = {}", toml.defaults.min_compress_chars);
            println!();

            println!("[sources]");
            println!("  include = {:?}", toml.sources.include);
            println!();

            println!("[evidence]");
            println!("  max_commits = {}", toml.evidence.max_commits);
            println!("  lookback_days = {}", toml.evidence.lookback_days);
            println!("  vcs_timeout_secs = {}", toml.evidence.vcs_timeout_secs);
            println!();

            println!("[validation]");
            println!("  task_tolerance = {}", toml.validation.task_tolerance);
            println!("  percent_tolerance = {}", toml.validation.percent_tolerance);
            println!();

            if !toml.plans.overrides.is_empty() {
                println!("[plans.overrides]");
                for (pattern, override_cfg) in &toml.plans.overrides {
                    println!("  \"{}\":", pattern);
                    if let Some(ratio) = override_cfg.target_ratio {
                        println!("    target_ratio = {}", ratio);
                    }
                    if let Some(limit) = &override_cfg.context_limit {
                        println!("    context_limit = \"{}\"", limit);
                    }
                    if let Some(budget) = override_cfg.context_budget {
                        println!("    context_budget = {}", budget);
                    }
                }
                println!();
            }

            println!("Effective values (with env overrides):");
            match toml.plan_settings("") {
                Ok(settings) => {
                    println!("  context_budget = {}", settings.context_budget);
                    println!("  context_limit = \"{}\"", settings.context_limit);
                    println!(
                        "  trigger threshold = {} tokens",
                        settings.trigger_check().threshold()
                    );
                }
                Err(e) => println!("  {} {:#}", style("invalid:").red(), e),
            }
            for var in [ENV_CONTEXT_BUDGET, ENV_CONTEXT_LIMIT] {
                if let Ok(value) = std::env::var(var) {
                    println!("  {} {}={}", style("env").dim(), var, value);
                }
            }
            println!();

            if !config_path.exists() {
                println!("Run 'tether config init' to create a tether.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No tether.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = TetherToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("{}", style("Configuration is valid.").green());
            } else {
                println!("{}", style("Configuration warnings:").yellow());
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("tether.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !tether_dir.exists() {
                std::fs::create_dir_all(&tether_dir)?;
            }

            let toml = TetherToml::default();
            toml.save(&config_path)?;

            println!("Created tether.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [defaults] context_budget, context_limit, target_ratio");
            println!("  - [sources] include globs for narrative files");
            println!("  - [plans.overrides.\"pattern-*\"] for plan-specific settings");
            println!();
        }
    }

    Ok(())
}
