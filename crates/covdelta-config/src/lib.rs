//! Configuration parsing and management for covdelta.
//!
//! This crate provides:
//! - Configuration types (`Config`, `FailOn`, section tables)
//! - TOML parsing and validation
//! - Discovery of `covdelta.toml` in parent directories
//! - Precedence handling (CLI > config file > defaults)
//! - Include/exclude path filtering

use std::path::{Path, PathBuf};

use covdelta_types::UnitKind;
use serde::Deserialize;
use thiserror::Error;

/// File name searched for by [`discover_config`].
pub const CONFIG_FILE_NAME: &str = "covdelta.toml";

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value.
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Determines when a comparison fails the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailOn {
    /// Fail when any compared file lost coverage.
    #[default]
    Regression,
    /// Never fail (always pass unless there's a runtime error).
    Never,
}

/// Path filtering configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathConfig {
    /// Glob patterns for files/directories to exclude.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Glob patterns for files/directories to include (allowlist).
    /// If empty, all files are included.
    #[serde(default)]
    pub include: Vec<String>,
}

/// Path normalization configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NormalizeConfig {
    /// Prefixes to strip from coverage and changed paths.
    #[serde(default)]
    pub path_strip: Vec<String>,
}

/// Changed-path classification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangesConfig {
    /// Source file extensions, without the leading dot.
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
    /// Test file markers (`test` for `name.test.js`).
    #[serde(default)]
    pub test_markers: Option<Vec<String>>,
}

/// Full configuration for covdelta.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Coverage unit the per-file metric is computed from.
    #[serde(default)]
    pub unit: Option<UnitKind>,

    /// Determines when the comparison should fail.
    #[serde(default)]
    pub fail_on: Option<FailOn>,

    /// Restrict the comparison to changed files when a change list is given.
    #[serde(default)]
    pub changes_only: Option<bool>,

    #[serde(default)]
    pub paths: PathConfig,

    #[serde(default)]
    pub normalize: NormalizeConfig,

    #[serde(default)]
    pub changes: ChangesConfig,
}

// ============================================================================
// Effective Configuration
// ============================================================================

/// Effective configuration with all values resolved.
///
/// This represents the final configuration after applying:
/// 1. Defaults
/// 2. Config file values
/// 3. CLI overrides
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub unit: UnitKind,
    pub fail_on: FailOn,
    pub changes_only: bool,
    pub exclude_patterns: Vec<String>,
    pub include_patterns: Vec<String>,
    pub path_strip: Vec<String>,
    /// `None` keeps the changed-path adapter's defaults.
    pub extensions: Option<Vec<String>>,
    pub test_markers: Option<Vec<String>>,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            unit: UnitKind::Functions,
            fail_on: FailOn::Regression,
            changes_only: true,
            exclude_patterns: vec![],
            include_patterns: vec![],
            path_strip: vec![],
            extensions: None,
            test_markers: None,
        }
    }
}

// ============================================================================
// Configuration Loading
// ============================================================================

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    for pattern in config.paths.include.iter().chain(&config.paths.exclude) {
        if let Err(err) = glob::Pattern::new(pattern) {
            return Err(ConfigError::InvalidValue(format!(
                "invalid glob pattern '{}': {}",
                pattern, err
            )));
        }
    }

    if let Some(extensions) = &config.changes.extensions {
        if extensions.is_empty() {
            return Err(ConfigError::InvalidValue(
                "changes.extensions must not be empty".to_string(),
            ));
        }
        if let Some(bad) = extensions.iter().find(|e| e.is_empty() || e.starts_with('.')) {
            return Err(ConfigError::InvalidValue(format!(
                "changes.extensions entries are written without a dot, got '{}'",
                bad
            )));
        }
    }

    if let Some(markers) = &config.changes.test_markers
        && let Some(bad) = markers.iter().find(|m| m.is_empty() || m.contains('.'))
    {
        return Err(ConfigError::InvalidValue(format!(
            "changes.test_markers entries must be non-empty and dot-free, got '{}'",
            bad
        )));
    }

    Ok(())
}

/// Try to find and load configuration from the current directory upward.
pub fn discover_config() -> Result<Option<(PathBuf, Config)>, ConfigError> {
    let current = std::env::current_dir()?;
    discover_config_from(&current)
}

/// Search `start` and its parents for `covdelta.toml`.
///
/// A file that exists but fails to load is an error, not a miss.
pub fn discover_config_from(start: &Path) -> Result<Option<(PathBuf, Config)>, ConfigError> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.is_file() {
            let config = load_config(&config_path)?;
            return Ok(Some((config_path, config)));
        }

        if !current.pop() {
            break;
        }
    }

    Ok(None)
}

// ============================================================================
// Precedence Resolution
// ============================================================================

/// CLI override options.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub unit: Option<UnitKind>,
    pub fail_on: Option<FailOn>,
    pub changes_only: Option<bool>,
    pub path_strip: Option<Vec<String>>,
}

/// Resolve effective configuration from the config file and CLI overrides.
///
/// Precedence: CLI > config file > defaults
pub fn resolve_config(config: Option<&Config>, cli: &CliOverrides) -> EffectiveConfig {
    let mut effective = EffectiveConfig::default();

    if let Some(config) = config {
        if let Some(unit) = config.unit {
            effective.unit = unit;
        }
        if let Some(fail_on) = config.fail_on {
            effective.fail_on = fail_on;
        }
        if let Some(changes_only) = config.changes_only {
            effective.changes_only = changes_only;
        }
        effective.exclude_patterns = config.paths.exclude.clone();
        effective.include_patterns = config.paths.include.clone();
        effective.path_strip = config.normalize.path_strip.clone();
        effective.extensions = config.changes.extensions.clone();
        effective.test_markers = config.changes.test_markers.clone();
    }

    if let Some(unit) = cli.unit {
        effective.unit = unit;
    }
    if let Some(fail_on) = cli.fail_on {
        effective.fail_on = fail_on;
    }
    if let Some(changes_only) = cli.changes_only {
        effective.changes_only = changes_only;
    }
    if let Some(path_strip) = &cli.path_strip {
        effective.path_strip = path_strip.clone();
    }

    effective
}

// ============================================================================
// Path Filtering
// ============================================================================

/// Check if a path matches any of the given glob patterns.
pub fn matches_any_pattern(path: &str, patterns: &[String]) -> bool {
    for pattern in patterns {
        if let Ok(glob_pattern) = glob::Pattern::new(pattern)
            && glob_pattern.matches(path)
        {
            return true;
        }
    }
    false
}

/// Filter a path based on include/exclude patterns.
///
/// Returns `true` if the path should be compared.
pub fn should_include_path(
    path: &str,
    include_patterns: &[String],
    exclude_patterns: &[String],
) -> bool {
    if matches_any_pattern(path, exclude_patterns) {
        return false;
    }

    if !include_patterns.is_empty() && !matches_any_pattern(path, include_patterns) {
        return false;
    }

    true
}

// ============================================================================
// Tests
// ============================================================================
