//! Configuration loaded from `.tether/tether.toml`.
//!
//! Settings are layered: file, then environment, then CLI flags. Plans
//! matching a glob pattern under `[plans.overrides]` get their own
//! target ratio and context limit.
//!
//! # Configuration File Format
//!
//! ```toml
//! [defaults]
//! context_budget = 200000
//! context_limit = "80%"
//! target_ratio = 0.5
//! min_compress_chars = 800
//!
//! [sources]
//! include = [".tether/session/*.md", "docs/plans/*.md"]
//!
//! [evidence]
//! max_commits = 50
//! lookback_days = 30
//! vcs_timeout_secs = 5
//!
//! [validation]
//! task_tolerance = 1
//! percent_tolerance = 5
//!
//! [plans.overrides."hotfix-*"]
//! target_ratio = 0.4
//! context_limit = "60%"
//! ```

use crate::compaction::{ContextLimit, DEFAULT_CONTEXT_BUDGET, EngineSettings, parse_context_limit};
use crate::evidence::EvidenceSettings;
use crate::state::TETHER_DIR;
use crate::strategy::{DEFAULT_MIN_COMPRESS_CHARS, DEFAULT_TARGET_RATIO, MAX_TARGET_RATIO, MIN_TARGET_RATIO};
use crate::validator::ValidationSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CONFIG_FILE: &str = "tether.toml";
pub const ENV_CONTEXT_BUDGET: &str = "TETHER_CONTEXT_BUDGET";
pub const ENV_CONTEXT_LIMIT: &str = "TETHER_CONTEXT_LIMIT";

/// Default settings for all plans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Context budget in tokens
    #[serde(default = "default_context_budget")]
    pub context_budget: u64,
    /// Context limit as percentage of the budget (e.g., "80%") or absolute tokens
    #[serde(default = "default_context_limit")]
    pub context_limit: String,
    #[serde(default = "default_target_ratio")]
    pub target_ratio: f64,
    /// Below this many characters the content is left as is
    #[serde(default = "default_min_compress_chars")]
    pub min_compress_chars: usize,
}

fn default_context_budget() -> u64 {
    DEFAULT_CONTEXT_BUDGET
}

fn default_context_limit() -> String {
    "80%".to_string()
}

fn default_target_ratio() -> f64 {
    DEFAULT_TARGET_RATIO
}

fn default_min_compress_chars() -> usize {
    DEFAULT_MIN_COMPRESS_CHARS
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            context_budget: default_context_budget(),
            context_limit: default_context_limit(),
            target_ratio: default_target_ratio(),
            min_compress_chars: default_min_compress_chars(),
        }
    }
}

/// Where narrative files come from when no paths are given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Glob patterns, relative to the repository root
    #[serde(default = "default_include")]
    pub include: Vec<String>,
}

fn default_include() -> Vec<String> {
    vec![".tether/session/*.md".to_string()]
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            include: default_include(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceConfig {
    #[serde(default = "default_max_commits")]
    pub max_commits: usize,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    #[serde(default = "default_vcs_timeout_secs")]
    pub vcs_timeout_secs: u64,
}

fn default_max_commits() -> usize {
    EvidenceSettings::default().max_commits
}

fn default_lookback_days() -> u32 {
    EvidenceSettings::default().lookback_days
}

fn default_vcs_timeout_secs() -> u64 {
    EvidenceSettings::default().vcs_timeout_secs
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            max_commits: default_max_commits(),
            lookback_days: default_lookback_days(),
            vcs_timeout_secs: default_vcs_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Allowed difference in completed tasks
    #[serde(default = "default_task_tolerance")]
    pub task_tolerance: u32,
    /// Allowed difference in percentage points
    #[serde(default = "default_percent_tolerance")]
    pub percent_tolerance: u32,
}

fn default_task_tolerance() -> u32 {
    ValidationSettings::default().task_tolerance
}

fn default_percent_tolerance() -> u32 {
    ValidationSettings::default().percent_tolerance
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            task_tolerance: default_task_tolerance(),
            percent_tolerance: default_percent_tolerance(),
        }
    }
}

/// Plan-specific override settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanOverride {
    #[serde(default)]
    pub target_ratio: Option<f64>,
    #[serde(default)]
    pub context_limit: Option<String>,
    #[serde(default)]
    pub context_budget: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlansConfig {
    /// Pattern-based overrides (e.g., "hotfix-*" -> PlanOverride)
    #[serde(default)]
    pub overrides: BTreeMap<String, PlanOverride>,
}

/// The complete tether.toml configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TetherToml {
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub evidence: EvidenceConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub plans: PlansConfig,
}

impl TetherToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse tether.toml")
    }

    /// Load `tether.toml` from `tether_dir`, or the defaults if it doesn't exist.
    pub fn load_or_default(tether_dir: &Path) -> Result<Self> {
        let config_path = tether_dir.join(CONFIG_FILE);
        if config_path.exists() {
            debug!("Loading config from {}", config_path.display());
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize tether.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Effective settings for a plan: defaults, then matching overrides in
    /// pattern order, then environment variables.
    pub fn plan_settings(&self, plan_id: &str) -> Result<EngineSettings> {
        let mut context_budget = self.defaults.context_budget;
        let mut context_limit = self.defaults.context_limit.clone();
        let mut target_ratio = self.defaults.target_ratio;

        for (pattern, override_cfg) in &self.plans.overrides {
            if pattern_matches(pattern, plan_id) {
                if let Some(ratio) = override_cfg.target_ratio {
                    target_ratio = ratio;
                }
                if let Some(ref limit) = override_cfg.context_limit {
                    context_limit = limit.clone();
                }
                if let Some(budget) = override_cfg.context_budget {
                    context_budget = budget;
                }
            }
        }

        if let Ok(value) = std::env::var(ENV_CONTEXT_BUDGET) {
            context_budget = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", ENV_CONTEXT_BUDGET, value))?;
        }
        if let Ok(value) = std::env::var(ENV_CONTEXT_LIMIT) {
            context_limit = value;
        }

        Ok(EngineSettings {
            context_budget,
            context_limit: parse_context_limit(&context_limit)?,
            target_ratio,
            min_compress_chars: self.defaults.min_compress_chars,
            evidence: EvidenceSettings {
                max_commits: self.evidence.max_commits,
                lookback_days: self.evidence.lookback_days,
                vcs_timeout_secs: self.evidence.vcs_timeout_secs,
            },
            validation: ValidationSettings {
                task_tolerance: self.validation.task_tolerance,
                percent_tolerance: self.validation.percent_tolerance,
            },
        })
    }

    /// Expand `[sources] include` against `root`, sorted and deduplicated.
    pub fn source_paths(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for pattern in &self.sources.include {
            let full = root.join(pattern);
            let full = full.to_string_lossy();
            let entries = glob::glob(&full)
                .with_context(|| format!("Invalid source pattern '{}'", pattern))?;
            for entry in entries {
                match entry {
                    Ok(path) => paths.push(path),
                    Err(e) => warn!("Skipping unreadable source match: {}", e),
                }
            }
        }
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if parse_context_limit(&self.defaults.context_limit).is_err() {
            warnings.push(format!(
                "Invalid context_limit '{}': should be percentage (e.g., '80%') or number",
                self.defaults.context_limit
            ));
        }
        if let Some(warning) = ratio_warning(self.defaults.target_ratio, "defaults") {
            warnings.push(warning);
        }
        if self.defaults.context_budget == 0 {
            warnings.push("context_budget is 0: every context will trigger compaction".to_string());
        }
        if self.evidence.vcs_timeout_secs == 0 {
            warnings.push("vcs_timeout_secs is 0: git evidence will always time out".to_string());
        }
        for pattern in &self.sources.include {
            if glob::Pattern::new(pattern).is_err() {
                warnings.push(format!("Invalid source pattern '{}'", pattern));
            }
        }

        for (pattern, override_cfg) in &self.plans.overrides {
            if glob::Pattern::new(pattern).is_err() {
                warnings.push(format!("Invalid override pattern '{}'", pattern));
            }
            if let Some(ref limit) = override_cfg.context_limit
                && parse_context_limit(limit).is_err()
            {
                warnings.push(format!(
                    "Invalid context_limit '{}' in override for pattern '{}'",
                    limit, pattern
                ));
            }
            if let Some(ratio) = override_cfg.target_ratio
                && let Some(warning) = ratio_warning(ratio, pattern)
            {
                warnings.push(warning);
            }
        }

        warnings
    }
}

fn ratio_warning(ratio: f64, scope: &str) -> Option<String> {
    if (MIN_TARGET_RATIO..=MAX_TARGET_RATIO).contains(&ratio) {
        None
    } else {
        Some(format!(
            "target_ratio {} in '{}' is outside {}-{} and will be clamped",
            ratio, scope, MIN_TARGET_RATIO, MAX_TARGET_RATIO
        ))
    }
}

/// Case-insensitive glob match of a plan id against an override pattern.
pub fn pattern_matches(pattern: &str, plan_id: &str) -> bool {
    glob::Pattern::new(&pattern.to_lowercase())
        .map(|p| p.matches(&plan_id.to_lowercase()))
        .unwrap_or(false)
}

/// Get the `.tether` directory of a repository root.
pub fn get_tether_dir(root: &Path) -> PathBuf {
    root.join(TETHER_DIR)
}

/// Apply CLI overrides on top of resolved settings.
pub fn apply_cli_overrides(
    settings: &mut EngineSettings,
    target_ratio: Option<f64>,
    context_limit: Option<ContextLimit>,
) {
    if let Some(ratio) = target_ratio {
        settings.target_ratio = ratio;
    }
    if let Some(limit) = context_limit {
        settings.context_limit = limit;
    }
}
