//! Application orchestration for covdelta.
//!
//! This crate provides the high-level `compare` function that turns two
//! already-produced test results documents into a report:
//!
//! 1. Locate the current coverage map (or skip with a reason)
//! 2. Extract the current snapshot, restricted to changed files
//! 3. Extract the base snapshot with the same normalization and filters
//! 4. Reconcile the two and derive the verdict
//! 5. Build the report, its annotations and the exit code
//!
//! The [`pipeline`] module drives the same comparison through the
//! test-runner and version-control ports.
//!
//! # Example
//!
//! ```rust,ignore
//! use covdelta_adapters_results::load_results_file;
//! use covdelta_app::{CompareRequest, compare};
//!
//! let request = CompareRequest {
//!     current: load_results_file("jest.results.json".as_ref()),
//!     base: Some(load_results_file("jest.results.prev.json".as_ref())),
//!     current_branch: "feature".to_string(),
//!     base_branch: Some("main".to_string()),
//!     ..Default::default()
//! };
//!
//! let result = compare(request)?;
//! println!("Exit code: {}", result.exit_code);
//! ```

pub mod pipeline;

use covdelta_adapters_changes::{ChangeOptions, ChangeSet};
use covdelta_adapters_coverage::{ExtractError, ExtractOptions, extract_with_filter};
use covdelta_adapters_results::TestResults;
use covdelta_config::{EffectiveConfig, should_include_path};
pub use covdelta_config::FailOn;
use covdelta_domain::reconcile;
use covdelta_ports::{Clock, SystemClock};
use covdelta_render::{DEFAULT_MAX_ANNOTATIONS, render_annotations, render_summary};
use covdelta_types::{
    CheckStatus, CoverageSnapshot, REASON_IMPROVED, REASON_MISSING_BASE, REASON_MISSING_COVERAGE,
    REASON_MISSING_REPORT, REASON_NEW_FILES, REASON_NO_ENTRIES, REASON_REGRESSED,
    REASON_UNCHANGED, Report, ReportData, Run, SCHEMA_ID, SnapshotRole, Tool, UnitKind, Verdict,
};
use thiserror::Error;

pub use pipeline::{CheckState, CiOutcome, CiRequest, run_ci_check};

// ============================================================================
// Request and Result Types
// ============================================================================

/// Request for a coverage comparison.
#[derive(Debug, Clone)]
pub struct CompareRequest {
    /// Results document of the current branch run.
    pub current: TestResults,
    /// Results document of the base branch run, if one was produced.
    pub base: Option<TestResults>,
    /// Parsed changed-path list, if one was supplied.
    pub changes: Option<ChangeSet>,
    pub current_branch: String,
    pub base_branch: Option<String>,
    /// Working directory of the current run. Always stripped from its paths.
    pub cwd: String,
    /// Working directory of the base run, when it ran in another checkout.
    /// Defaults to `cwd`.
    pub base_cwd: Option<String>,
    /// Unit the per-file metric is computed from.
    pub unit: UnitKind,
    pub fail_on: FailOn,
    /// Restrict the comparison to `changes` when it is present.
    pub changes_only: bool,
    /// Glob patterns to include (allowlist).
    pub include_patterns: Vec<String>,
    /// Glob patterns to exclude.
    pub exclude_patterns: Vec<String>,
    /// Additional prefixes to strip from reported paths.
    pub path_strip: Vec<String>,
    /// Maximum number of annotation commands to render.
    pub max_annotations: usize,
}

impl Default for CompareRequest {
    fn default() -> Self {
        Self {
            current: TestResults::Empty,
            base: None,
            changes: None,
            current_branch: String::new(),
            base_branch: None,
            cwd: String::new(),
            base_cwd: None,
            unit: UnitKind::Functions,
            fail_on: FailOn::Regression,
            changes_only: true,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            path_strip: Vec::new(),
            max_annotations: DEFAULT_MAX_ANNOTATIONS,
        }
    }
}

impl CompareRequest {
    /// Apply resolved configuration values.
    pub fn with_config(mut self, config: &EffectiveConfig) -> Self {
        self.unit = config.unit;
        self.fail_on = config.fail_on;
        self.changes_only = config.changes_only;
        self.include_patterns = config.include_patterns.clone();
        self.exclude_patterns = config.exclude_patterns.clone();
        self.path_strip = config.path_strip.clone();
        self
    }

    /// Prefixes stripped from current paths: the working directory, then the
    /// configured ones.
    pub fn strip_prefixes(&self) -> Vec<String> {
        strip_list(&self.cwd, &self.path_strip)
    }

    /// Prefixes stripped from base paths: the base working directory, then
    /// the configured ones.
    pub fn base_strip_prefixes(&self) -> Vec<String> {
        strip_list(self.base_cwd.as_deref().unwrap_or(&self.cwd), &self.path_strip)
    }
}

fn strip_list(root: &str, path_strip: &[String]) -> Vec<String> {
    let mut prefixes = Vec::with_capacity(path_strip.len() + 1);
    if !root.is_empty() {
        prefixes.push(root.to_string());
    }
    prefixes.extend(path_strip.iter().cloned());
    prefixes
}

/// Result of a coverage comparison.
#[derive(Debug, Clone)]
pub struct CompareResult {
    pub report: Report,
    /// GitHub annotations rendering of the report.
    pub annotations: String,
    /// One-line summary of the report.
    pub summary: String,
    /// Exit code for the CLI.
    /// - 0: improved, unchanged, skipped, or regressed with `fail_on = never`
    /// - 2: regressed
    /// - 1: tool/runtime error (not returned here, only via AppError)
    pub exit_code: i32,
}

/// Options for parsing changed paths under the given configuration.
pub fn change_options(config: &EffectiveConfig, cwd: &str) -> ChangeOptions {
    let mut options = ChangeOptions::default();
    if let Some(extensions) = &config.extensions {
        options.extensions = extensions.clone();
    }
    if let Some(markers) = &config.test_markers {
        options.test_markers = markers.clone();
    }
    options.strip_prefixes = strip_list(cwd, &config.path_strip);
    options
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur during a comparison or a pipeline run.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid or incomplete configuration, detected before any work.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Coverage data could not be used.
    #[error("Failed to read coverage: {0}")]
    Coverage(String),

    /// The version-control collaborator failed.
    #[error("Version control error: {0}")]
    Vcs(String),
}

impl From<ExtractError> for AppError {
    fn from(e: ExtractError) -> Self {
        AppError::Coverage(e.to_string())
    }
}

// ============================================================================
// Main Compare Function
// ============================================================================

/// Compare the current results against the base results.
///
/// # Errors
///
/// Returns `AppError` only for unusable coverage data. Absent inputs are
/// not errors: they produce a `skipped` report naming the reason.
pub fn compare(request: CompareRequest) -> Result<CompareResult, AppError> {
    compare_with_clock(request, &SystemClock)
}

/// Compare with a custom clock.
///
/// This allows for deterministic testing with fixed timestamps.
pub fn compare_with_clock<C: Clock>(
    request: CompareRequest,
    clock: &C,
) -> Result<CompareResult, AppError> {
    let started_at = clock.now();

    let mut data = ReportData {
        unit: request.unit,
        current_branch: request.current_branch.clone(),
        base_branch: request.base_branch.clone(),
        modified_test_files: request
            .changes
            .as_ref()
            .map(|c| c.test_files.iter().cloned().collect())
            .unwrap_or_default(),
        ..Default::default()
    };

    let Some(document) = request.current.document() else {
        log::warn!("current results are empty; nothing to compare");
        return Ok(finish(
            &request,
            data,
            CheckStatus::Skipped,
            vec![REASON_MISSING_REPORT],
            started_at,
            clock,
        ));
    };

    data.tests = Some(document.summary());
    data.failed_assertions = document.failed_assertions(&request.cwd);
    data.failure_output = document.failure_output();

    let Some(current_map) = document.coverage_map.as_ref() else {
        log::warn!("current results carry no coverage map");
        return Ok(finish(
            &request,
            data,
            CheckStatus::Skipped,
            vec![REASON_MISSING_COVERAGE],
            started_at,
            clock,
        ));
    };

    let allow_list = match (&request.changes, request.changes_only) {
        (Some(changes), true) => Some(changes.source_files.clone()),
        _ => None,
    };
    let filter =
        |path: &str| should_include_path(path, &request.include_patterns, &request.exclude_patterns);

    let current_options = ExtractOptions {
        branch: request.current_branch.clone(),
        role: Some(SnapshotRole::Current),
        unit: request.unit,
        strip_prefixes: request.strip_prefixes(),
        allow_list: allow_list.clone(),
    };
    let current = match extract_with_filter(current_map, &current_options, filter) {
        Ok(snapshot) => snapshot,
        Err(ExtractError::NoEntries) => {
            log::info!("no current coverage entries left after filtering");
            return Ok(finish(
                &request,
                data,
                CheckStatus::Skipped,
                vec![REASON_NO_ENTRIES],
                started_at,
                clock,
            ));
        }
        Err(e) => return Err(e.into()),
    };
    data.current_files = current.len() as u32;

    let Some(base_map) = request.base.as_ref().and_then(TestResults::coverage_map) else {
        log::warn!("base results are missing or carry no coverage map");
        return Ok(finish(
            &request,
            data,
            CheckStatus::Skipped,
            vec![REASON_MISSING_BASE],
            started_at,
            clock,
        ));
    };

    let base_branch = request
        .base_branch
        .clone()
        .unwrap_or_else(|| "base".to_string());
    let base_options = ExtractOptions {
        branch: base_branch.clone(),
        role: Some(SnapshotRole::Base),
        unit: request.unit,
        strip_prefixes: request.base_strip_prefixes(),
        allow_list,
    };
    let base = match extract_with_filter(base_map, &base_options, filter) {
        Ok(snapshot) => snapshot,
        Err(ExtractError::NoEntries) => {
            log::info!("base has no matching entries; every current file is new");
            CoverageSnapshot::empty(base_branch, SnapshotRole::Base, request.unit)
        }
        Err(e) => return Err(e.into()),
    };
    data.base_files = Some(base.len() as u32);

    let result = reconcile(&base, &current);
    log::info!(
        "reconciled {} files: verdict {:?}",
        result.pairs.len(),
        result.verdict
    );

    let mut reasons = vec![match result.verdict {
        Verdict::Regressed => REASON_REGRESSED,
        Verdict::Improved => REASON_IMPROVED,
        Verdict::Unchanged => REASON_UNCHANGED,
    }];

    data.new_paths = result.new_paths().into_iter().map(String::from).collect();
    if !data.new_paths.is_empty() {
        reasons.push(REASON_NEW_FILES);
    }
    data.regressed_paths = result.regressed_paths;
    data.improved_paths = result.improved_paths;
    data.pairs = result.pairs;

    Ok(finish(
        &request,
        data,
        CheckStatus::from(result.verdict),
        reasons,
        started_at,
        clock,
    ))
}

// ============================================================================
// Report Builder
// ============================================================================

fn finish<C: Clock>(
    request: &CompareRequest,
    data: ReportData,
    status: CheckStatus,
    reasons: Vec<&str>,
    started_at: chrono::DateTime<chrono::Utc>,
    clock: &C,
) -> CompareResult {
    let ended_at = clock.now();
    let duration_ms = (ended_at - started_at).num_milliseconds().max(0) as u64;

    let report = Report {
        schema: SCHEMA_ID.to_string(),
        tool: Tool::default(),
        run: Run {
            started_at: started_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            ended_at: Some(ended_at.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            duration_ms: Some(duration_ms),
        },
        status,
        reasons: reasons.into_iter().map(String::from).collect(),
        data,
    };

    let annotations = render_annotations(&report, request.max_annotations);
    let summary = render_summary(&report);

    let exit_code = match (status, request.fail_on) {
        (CheckStatus::Regressed, FailOn::Regression) => 2,
        _ => 0,
    };

    CompareResult {
        report,
        annotations,
        summary,
        exit_code,
    }
}

// ============================================================================
// Tests
// ============================================================================
