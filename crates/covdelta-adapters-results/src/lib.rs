//! Test results document adapter for covdelta.
//!
//! The test runner writes a JSON results document (Jest `--json` layout). A
//! missing or unreadable document is not fatal: it loads as
//! [`TestResults::Empty`] and the caller decides what to skip.

use std::path::Path;

use covdelta_adapters_coverage::CoverageMapData;
use covdelta_types::{FailedAssertion, TestSummary};
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// Document Model
// ============================================================================

/// Top-level results document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsDocument {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub num_total_tests: u32,
    #[serde(default)]
    pub num_passed_tests: u32,
    #[serde(default)]
    pub num_failed_tests: u32,
    #[serde(default)]
    pub num_total_test_suites: u32,
    #[serde(default)]
    pub num_passed_test_suites: u32,
    #[serde(default)]
    pub num_failed_test_suites: u32,
    #[serde(default)]
    pub test_results: Vec<TestFileResult>,
    /// Present only when the runner collected coverage.
    #[serde(default)]
    pub coverage_map: Option<CoverageMapData>,
}

/// Results for one test file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestFileResult {
    /// Absolute path of the test file.
    pub name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub assertion_results: Vec<AssertionResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResult {
    pub status: String,
    pub title: String,
    #[serde(default)]
    pub ancestor_titles: Vec<String>,
    #[serde(default)]
    pub failure_messages: Vec<String>,
    #[serde(default)]
    pub location: Option<AssertionLocation>,
}

impl AssertionResult {
    pub fn is_failed(&self) -> bool {
        self.status == "failed"
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct AssertionLocation {
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub column: Option<u32>,
}

// ============================================================================
// Loading
// ============================================================================

/// Errors while reading a results document.
#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("Failed to read results file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid results document: {0}")]
    InvalidFormat(String),
}

/// A loaded results document, or the sentinel for "nothing usable".
#[derive(Debug, Clone, PartialEq)]
pub enum TestResults {
    Empty,
    Loaded(Box<ResultsDocument>),
}

/// Decode a results document from JSON text.
pub fn parse_results(text: &str) -> Result<ResultsDocument, ResultsError> {
    serde_json::from_str(text).map_err(|e| ResultsError::InvalidFormat(e.to_string()))
}

/// Read and decode a results document.
pub fn read_results_file(path: &Path) -> Result<ResultsDocument, ResultsError> {
    let text = std::fs::read_to_string(path).map_err(|source| ResultsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_results(&text)
}

/// Load a results document, mapping any failure to [`TestResults::Empty`].
pub fn load_results_file(path: &Path) -> TestResults {
    match read_results_file(path) {
        Ok(document) => TestResults::Loaded(Box::new(document)),
        Err(err) => {
            log::warn!("{err}; treating results as empty");
            TestResults::Empty
        }
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl TestResults {
    pub fn is_empty(&self) -> bool {
        matches!(self, TestResults::Empty)
    }

    pub fn document(&self) -> Option<&ResultsDocument> {
        match self {
            TestResults::Empty => None,
            TestResults::Loaded(document) => Some(&**document),
        }
    }

    pub fn coverage_map(&self) -> Option<&CoverageMapData> {
        self.document().and_then(|d| d.coverage_map.as_ref())
    }
}

impl ResultsDocument {
    pub fn summary(&self) -> TestSummary {
        TestSummary {
            success: self.success,
            total_tests: self.num_total_tests,
            passed_tests: self.num_passed_tests,
            failed_tests: self.num_failed_tests,
            total_suites: self.num_total_test_suites,
            passed_suites: self.num_passed_test_suites,
            failed_suites: self.num_failed_test_suites,
        }
    }

    /// Failed assertions located relative to `cwd`.
    ///
    /// A successful run yields none, whatever its assertions say.
    pub fn failed_assertions(&self, cwd: &str) -> Vec<FailedAssertion> {
        if self.success {
            return Vec::new();
        }

        let cwd = cwd.replace('\\', "/");
        let cwd = cwd.trim_end_matches('/');

        self.test_results
            .iter()
            .flat_map(|result| {
                let path = relative_to(&result.name, cwd);
                result
                    .assertion_results
                    .iter()
                    .filter(|a| a.is_failed())
                    .map(move |assertion| FailedAssertion {
                        path: path.clone(),
                        line: assertion.location.and_then(|l| l.line).unwrap_or(0),
                        title: assertion
                            .ancestor_titles
                            .iter()
                            .chain(std::iter::once(&assertion.title))
                            .map(String::as_str)
                            .collect::<Vec<_>>()
                            .join(" > "),
                        message: strip_ansi(&assertion.failure_messages.join("\n\n")),
                    })
            })
            .collect()
    }

    /// Suite-level failure output with terminal escapes removed, one block
    /// per file that reported a message.
    pub fn failure_output(&self) -> Option<String> {
        if self.success {
            return None;
        }
        let blocks: Vec<String> = self
            .test_results
            .iter()
            .map(|r| strip_ansi(&r.message))
            .filter(|m| !m.trim().is_empty())
            .collect();
        if blocks.is_empty() {
            None
        } else {
            Some(blocks.join("\n"))
        }
    }
}

fn relative_to(path: &str, cwd: &str) -> String {
    let path = path.replace('\\', "/");
    if cwd.is_empty() {
        return path;
    }
    if let Some(rest) = path.strip_prefix(cwd)
        && rest.starts_with('/')
    {
        return rest.trim_start_matches('/').to_string();
    }
    path
}

fn strip_ansi(text: &str) -> String {
    String::from_utf8_lossy(&strip_ansi_escapes::strip(text.as_bytes())).into_owned()
}

// ============================================================================
// Tests
// ============================================================================
