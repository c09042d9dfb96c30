//! Core types and DTOs for covdelta.
//!
//! This crate defines the data transfer objects shared by every layer:
//! per-file coverage entries, snapshots, reconciliation results, the JSON
//! report schema, and the registry of report codes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Schema and Reason Tokens
// ============================================================================

/// Schema identifier for the covdelta report format.
pub const SCHEMA_ID: &str = "covdelta.report.v1";

/// Reason: at least one file lost coverage.
pub const REASON_REGRESSED: &str = "coverage_regressed";

/// Reason: at least one file gained coverage and none lost any.
pub const REASON_IMPROVED: &str = "coverage_improved";

/// Reason: no comparable file changed its metric.
pub const REASON_UNCHANGED: &str = "coverage_unchanged";

/// Reason: some current files have no counterpart in the base snapshot.
pub const REASON_NEW_FILES: &str = "new_files";

/// Reason: the current results document was missing or unparseable.
pub const REASON_MISSING_REPORT: &str = "missing_report";

/// Reason: the results document had no coverage section.
pub const REASON_MISSING_COVERAGE: &str = "missing_coverage";

/// Reason: the coverage section was empty after filtering.
pub const REASON_NO_ENTRIES: &str = "no_entries";

/// Reason: no base results were available, nothing to compare against.
pub const REASON_MISSING_BASE: &str = "missing_base";

// ============================================================================
// Reason Registry
// ============================================================================

/// Metadata for a report reason.
#[derive(Debug, Clone, Copy)]
pub struct CodeInfo {
    pub code: &'static str,
    pub name: &'static str,
    pub short_description: &'static str,
    pub full_description: &'static str,
    pub remediation: &'static str,
}

/// Registry of every reason a report can carry.
pub const CODE_REGISTRY: &[CodeInfo] = &[
    CodeInfo {
        code: REASON_REGRESSED,
        name: "CoverageRegressed",
        short_description: "Coverage decreased",
        full_description: "A file present in both the base and current snapshots has a lower coverage metric on the current branch.",
        remediation: "Add tests for the listed files, or check coverage locally against the base branch before pushing.",
    },
    CodeInfo {
        code: REASON_IMPROVED,
        name: "CoverageImproved",
        short_description: "Coverage increased",
        full_description: "At least one compared file gained coverage and no compared file lost any.",
        remediation: "Nothing to do.",
    },
    CodeInfo {
        code: REASON_UNCHANGED,
        name: "CoverageUnchanged",
        short_description: "Coverage unchanged",
        full_description: "Every file present on both branches kept exactly the same coverage metric.",
        remediation: "Nothing to do.",
    },
    CodeInfo {
        code: REASON_NEW_FILES,
        name: "NewFiles",
        short_description: "Files without a base",
        full_description: "Some current files have no entry in the base snapshot. They are listed but do not affect the verdict.",
        remediation: "Nothing to do. Make sure new files have tests of their own.",
    },
    CodeInfo {
        code: REASON_MISSING_REPORT,
        name: "MissingReport",
        short_description: "Missing results document",
        full_description: "The current test results file was absent or could not be parsed as JSON.",
        remediation: "Make sure the test runner writes its JSON results to the path given to covdelta.",
    },
    CodeInfo {
        code: REASON_MISSING_COVERAGE,
        name: "MissingCoverage",
        short_description: "Results without coverage",
        full_description: "The current test results document does not contain a coverage map.",
        remediation: "Run the test command with coverage enabled (for Jest: --json --coverage --outputFile=<file>).",
    },
    CodeInfo {
        code: REASON_NO_ENTRIES,
        name: "NoEntries",
        short_description: "No coverage entries",
        full_description: "The coverage section exists but no file remained after allow-list and path filtering.",
        remediation: "Nothing to compare. Check include/exclude patterns if changed files were expected to be covered.",
    },
    CodeInfo {
        code: REASON_MISSING_BASE,
        name: "MissingBase",
        short_description: "No base results",
        full_description: "No base results document was given, or it was unreadable or had no coverage map.",
        remediation: "Pass --base with the results of a test run on the base branch, with coverage enabled.",
    },
];

/// Lookup reason metadata by the token a report carries.
pub fn explain(code: &str) -> Option<&'static CodeInfo> {
    CODE_REGISTRY.iter().find(|info| info.code == code)
}

// ============================================================================
// Enums
// ============================================================================

/// The kind of executable unit a coverage metric is computed from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Statements,
    Branches,
    /// Function coverage, the single-number signal used by default.
    #[default]
    Functions,
    Lines,
}

impl UnitKind {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Statements => "statements",
            UnitKind::Branches => "branches",
            UnitKind::Functions => "functions",
            UnitKind::Lines => "lines",
        }
    }
}

/// Which side of the comparison a snapshot stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotRole {
    Current,
    Base,
}

/// Overall outcome of a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Improved,
    Regressed,
    Unchanged,
}

/// Classification of a single aligned pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairStatus {
    Improved,
    Regressed,
    Unchanged,
    /// No base entry exists; reported but never classified.
    New,
}

/// Terminal status recorded in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Improved,
    Regressed,
    Unchanged,
    /// Nothing was reconciled (missing report, no coverage, no entries).
    Skipped,
}

impl From<Verdict> for CheckStatus {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Improved => CheckStatus::Improved,
            Verdict::Regressed => CheckStatus::Regressed,
            Verdict::Unchanged => CheckStatus::Unchanged,
        }
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// One file's coverage snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageEntry {
    /// Canonical file identifier, identical across the two compared runs.
    pub path: String,
    /// Percentage in `[0, 100]`, as computed (never pre-rounded).
    pub metric: f64,
    /// Ascending line numbers that were not exercised.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uncovered_lines: Vec<u32>,
}

impl CoverageEntry {
    pub fn new(path: impl Into<String>, metric: f64) -> Self {
        Self {
            path: path.into(),
            metric,
            uncovered_lines: Vec::new(),
        }
    }

    pub fn with_uncovered_lines(mut self, lines: Vec<u32>) -> Self {
        self.uncovered_lines = lines;
        self
    }
}

/// Canonical per-file coverage data for one test run.
///
/// Paths are unique. When the input repeats a path, the last entry wins but
/// keeps the position of the first occurrence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageSnapshot {
    branch: String,
    role: SnapshotRole,
    unit: UnitKind,
    entries: Vec<CoverageEntry>,
}

impl CoverageSnapshot {
    /// Build a snapshot, collapsing repeated paths.
    pub fn new(
        branch: impl Into<String>,
        role: SnapshotRole,
        unit: UnitKind,
        entries: impl IntoIterator<Item = CoverageEntry>,
    ) -> Self {
        let mut unique: Vec<CoverageEntry> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for entry in entries {
            match positions.get(&entry.path) {
                Some(&idx) => unique[idx] = entry,
                None => {
                    positions.insert(entry.path.clone(), unique.len());
                    unique.push(entry);
                }
            }
        }
        Self {
            branch: branch.into(),
            role,
            unit,
            entries: unique,
        }
    }

    /// An empty snapshot, used when a side has no entries at all.
    pub fn empty(branch: impl Into<String>, role: SnapshotRole, unit: UnitKind) -> Self {
        Self::new(branch, role, unit, Vec::new())
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn role(&self) -> SnapshotRole {
        self.role
    }

    pub fn unit(&self) -> UnitKind {
        self.unit
    }

    pub fn entries(&self) -> &[CoverageEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find an entry by canonical path.
    pub fn get(&self, path: &str) -> Option<&CoverageEntry> {
        self.entries.iter().find(|entry| entry.path == path)
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

/// One aligned path of a reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoveragePair {
    pub path: String,
    /// Base metric, `None` when the file is new on the current branch.
    pub prev_metric: Option<f64>,
    pub new_metric: f64,
    pub status: PairStatus,
}

impl CoveragePair {
    /// Signed change from base to current, `None` for new files.
    pub fn delta(&self) -> Option<f64> {
        self.prev_metric.map(|prev| self.new_metric - prev)
    }
}

/// Output of comparing a base snapshot to a current snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    /// One pair per current path, in current snapshot order.
    pub pairs: Vec<CoveragePair>,
    pub verdict: Verdict,
    pub regressed_paths: Vec<String>,
    pub improved_paths: Vec<String>,
}

impl ReconciliationResult {
    /// Paths that exist only on the current side.
    pub fn new_paths(&self) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|pair| pair.status == PairStatus::New)
            .map(|pair| pair.path.as_str())
            .collect()
    }
}

// ============================================================================
// Test Results DTOs
// ============================================================================

/// Aggregate counts from a test results document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSummary {
    pub success: bool,
    pub total_tests: u32,
    pub passed_tests: u32,
    pub failed_tests: u32,
    pub total_suites: u32,
    pub passed_suites: u32,
    pub failed_suites: u32,
}

/// A failed assertion, located in a test file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAssertion {
    /// Test file path relative to the working directory.
    pub path: String,
    /// 1-indexed line, 0 when the runner reported no location.
    pub line: u32,
    /// Ancestor titles and the assertion title joined with ` > `.
    pub title: String,
    /// Failure messages with terminal escapes removed.
    pub message: String,
}

// ============================================================================
// Report
// ============================================================================

/// Information about the tool that generated the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub version: String,
}

impl Default for Tool {
    fn default() -> Self {
        Self {
            name: "covdelta".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Information about the run timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// ISO 8601 timestamp when the run started.
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl Default for Run {
    fn default() -> Self {
        Self {
            started_at: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            ended_at: None,
            duration_ms: None,
        }
    }
}

/// Aggregated comparison data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportData {
    /// Unit kind the metrics were computed from.
    pub unit: UnitKind,
    pub current_branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,
    /// Number of files in the current snapshot.
    pub current_files: u32,
    /// Number of files in the base snapshot, absent when nothing was compared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_files: Option<u32>,
    #[serde(default)]
    pub pairs: Vec<CoveragePair>,
    #[serde(default)]
    pub regressed_paths: Vec<String>,
    #[serde(default)]
    pub improved_paths: Vec<String>,
    #[serde(default)]
    pub new_paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests: Option<TestSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_assertions: Vec<FailedAssertion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modified_test_files: Vec<String>,
    /// Suite-level failure messages of the current run, ANSI escapes removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_output: Option<String>,
}

/// The full comparison report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub schema: String,
    pub tool: Tool,
    pub run: Run,
    pub status: CheckStatus,
    pub reasons: Vec<String>,
    pub data: ReportData,
}

impl Default for Report {
    fn default() -> Self {
        Self {
            schema: SCHEMA_ID.to_string(),
            tool: Tool::default(),
            run: Run::default(),
            status: CheckStatus::Skipped,
            reasons: Vec::new(),
            data: ReportData::default(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
