//! Application configuration: TOML file loading, CLI overrides, and defaults.
//!
//! Resolution order (first found wins, values merge/override):
//! 1. CLI flags (`--config`, `--log-level`, `--max-depth`, etc.)
//! 2. `$DOTBROWSE_CONFIG` environment variable (path to config file)
//! 3. Project-local `.dotbrowse.toml` in the current working directory
//! 4. Global `~/.config/dotbrowse/config.toml`
//! 5. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::fs::walker::{WalkOptions, DEFAULT_SKIP_DIRS, DEFAULT_WORKERS};
use crate::search::orchestrator::SearchOptions;

// ── Section configs ──────────────────────────────────────────────────────────

/// General application settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory relative paths are shown against (defaults to `$HOME`).
    pub base_dir: Option<String>,
}

/// Deep search settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SearchConfig {
    /// Levels below the search root; 0 means unlimited.
    pub max_depth: Option<usize>,
    pub max_results: Option<usize>,
    pub timeout_ms: Option<u64>,
    /// Quiet period after the last keystroke before a walk starts.
    pub debounce_ms: Option<u64>,
    pub workers: Option<usize>,
    /// Directory names never descended into. Replaces the built-in list.
    pub skip_dirs: Option<Vec<String>>,
}

/// Tree panel settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TreeConfig {
    /// Use nerd font icons (false = ASCII fallback).
    pub use_icons: Option<bool>,
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter directive, e.g. "warn" or "dotbrowse=debug".
    pub level: Option<String>,
}

// ── Top-level config ─────────────────────────────────────────────────────────

/// Top-level application configuration.
///
/// All fields are optional so that partial configs from different sources
/// can be merged together (CLI overrides file, file overrides defaults).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub search: SearchConfig,
    pub tree: TreeConfig,
    pub log: LogConfig,
}

// ── Default constants ────────────────────────────────────────────────────────

pub const DEFAULT_MAX_DEPTH: usize = 8;
pub const DEFAULT_MAX_RESULTS: usize = 2000;
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;
pub const DEFAULT_LOG_LEVEL: &str = "warn";

// ── Config file locator ──────────────────────────────────────────────────────

/// Return the list of candidate config file paths in priority order.
///
/// Does NOT include the CLI `--config` path; `load` handles that separately.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. $DOTBROWSE_CONFIG environment variable
    if let Ok(env_path) = std::env::var("DOTBROWSE_CONFIG") {
        paths.push(PathBuf::from(env_path));
    }

    // 2. Project-local `.dotbrowse.toml` in CWD
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".dotbrowse.toml"));
    }

    // 3. Global `~/.config/dotbrowse/config.toml`
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("dotbrowse").join("config.toml"));
    }

    paths
}

/// Try to read and parse a TOML config file. Returns `None` if the file
/// doesn't exist or can't be parsed (with a warning printed to stderr).
///
/// Runs before logging is set up, so warnings go straight to stderr.
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return None,
    };
    match toml::from_str::<AppConfig>(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            eprintln!(
                "Warning: failed to parse config file {}: {}",
                path.display(),
                e
            );
            None
        }
    }
}

// ── Merge logic ──────────────────────────────────────────────────────────────

impl AppConfig {
    /// Merge `other` on top of `self`: `other`'s `Some` values win.
    pub fn merge(self, other: &AppConfig) -> AppConfig {
        AppConfig {
            general: GeneralConfig {
                base_dir: other.general.base_dir.clone().or(self.general.base_dir),
            },
            search: SearchConfig {
                max_depth: other.search.max_depth.or(self.search.max_depth),
                max_results: other.search.max_results.or(self.search.max_results),
                timeout_ms: other.search.timeout_ms.or(self.search.timeout_ms),
                debounce_ms: other.search.debounce_ms.or(self.search.debounce_ms),
                workers: other.search.workers.or(self.search.workers),
                skip_dirs: other
                    .search
                    .skip_dirs
                    .clone()
                    .or(self.search.skip_dirs),
            },
            tree: TreeConfig {
                use_icons: other.tree.use_icons.or(self.tree.use_icons),
            },
            log: LogConfig {
                level: other.log.level.clone().or(self.log.level),
            },
        }
    }

    /// Load the final merged configuration.
    ///
    /// `cli_config_path` is an explicit config file path from `--config`.
    /// `cli_overrides` are partial overrides derived from CLI flags.
    pub fn load(cli_config_path: Option<&Path>, cli_overrides: Option<&AppConfig>) -> AppConfig {
        let mut config = AppConfig::default();

        // Walk in reverse so that highest-priority (env var) overwrites lower.
        for path in candidate_paths().iter().rev() {
            if let Some(file_cfg) = load_file(path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(cli_path) = cli_config_path {
            if let Some(file_cfg) = load_file(cli_path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(overrides) = cli_overrides {
            config = config.merge(overrides);
        }

        config
    }

    // ── Convenience getters with built-in defaults ──────────────────────────

    /// Base directory, falling back to the home directory.
    pub fn base_dir(&self) -> Option<PathBuf> {
        match self.general.base_dir.as_deref() {
            Some(dir) => Some(expand_home(dir)),
            None => dirs::home_dir(),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.search.max_depth.unwrap_or(DEFAULT_MAX_DEPTH)
    }

    pub fn max_results(&self) -> usize {
        self.search.max_results.unwrap_or(DEFAULT_MAX_RESULTS)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.search.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS))
    }

    pub fn workers(&self) -> usize {
        self.search.workers.unwrap_or(DEFAULT_WORKERS)
    }

    pub fn skip_dirs(&self) -> Vec<String> {
        match &self.search.skip_dirs {
            Some(dirs) => dirs.clone(),
            None => DEFAULT_SKIP_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Whether to use nerd font icons.
    pub fn use_icons(&self) -> bool {
        self.tree.use_icons.unwrap_or(false)
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Walker and orchestrator settings. Rejects a zero-sized worker pool.
    pub fn search_options(&self) -> Result<SearchOptions> {
        let workers = self.workers();
        if workers == 0 {
            return Err(AppError::Config(
                "search.workers must be at least 1".to_string(),
            ));
        }
        Ok(SearchOptions {
            walk: WalkOptions {
                max_depth: self.max_depth(),
                max_results: self.max_results(),
                workers,
                skip_dirs: self.skip_dirs().into_iter().collect(),
            },
            timeout: self.search_timeout(),
            debounce: self.debounce(),
        })
    }
}

fn expand_home(dir: &str) -> PathBuf {
    match (dir.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ if dir == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from(dir)),
        _ => PathBuf::from(dir),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
