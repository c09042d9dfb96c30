//! Istanbul coverage map adapter for covdelta.
//!
//! This crate models the coverage map emitted by Istanbul-based runners
//! (Jest's `coverageMap`), normalizes file paths into canonical keys, and
//! extracts a [`CoverageSnapshot`] with one metric per file.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;

use covdelta_types::{CoverageEntry, CoverageSnapshot, SnapshotRole, UnitKind};
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// Types
// ============================================================================

/// A coverage map keyed by the path the runner reported, in document order.
pub type CoverageMapData = IndexMap<String, RawFileCoverage>;

/// A file entry as found in a coverage map.
///
/// Serialized `FileCoverage` objects are sometimes wrapped in a `data` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawFileCoverage {
    Wrapped { data: FileCoverageData },
    Plain(FileCoverageData),
}

impl RawFileCoverage {
    pub fn data(&self) -> &FileCoverageData {
        match self {
            RawFileCoverage::Wrapped { data } => data,
            RawFileCoverage::Plain(data) => data,
        }
    }
}

/// Per-file hit counters.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCoverageData {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub statement_map: BTreeMap<String, SourceRange>,
    /// Statement hit counts, keyed like `statement_map`.
    #[serde(default)]
    pub s: BTreeMap<String, u64>,
    /// Function hit counts.
    #[serde(default)]
    pub f: BTreeMap<String, u64>,
    /// Branch hit counts, one per branch arm.
    #[serde(default)]
    pub b: BTreeMap<String, Vec<u64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SourceRange {
    pub start: SourcePosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SourcePosition {
    pub line: u32,
}

/// Covered and total counts for one unit kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitTotals {
    pub covered: u64,
    pub total: u64,
}

impl UnitTotals {
    /// Percentage covered. A file with nothing to cover counts as 100%.
    pub fn pct(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.covered as f64 * 100.0) / self.total as f64
    }
}

impl FileCoverageData {
    /// Line hit map: each statement contributes to the line it starts on,
    /// a line keeps the highest count of its statements.
    pub fn line_hits(&self) -> BTreeMap<u32, u64> {
        let mut lines: BTreeMap<u32, u64> = BTreeMap::new();
        for (id, hits) in &self.s {
            let Some(range) = self.statement_map.get(id) else {
                continue;
            };
            let entry = lines.entry(range.start.line).or_insert(*hits);
            if *hits > *entry {
                *entry = *hits;
            }
        }
        lines
    }

    /// Ascending lines with zero hits.
    pub fn uncovered_lines(&self) -> Vec<u32> {
        self.line_hits()
            .into_iter()
            .filter(|(_, hits)| *hits == 0)
            .map(|(line, _)| line)
            .collect()
    }

    pub fn totals(&self, unit: UnitKind) -> UnitTotals {
        match unit {
            UnitKind::Statements => count_hits(self.s.values().copied()),
            UnitKind::Functions => count_hits(self.f.values().copied()),
            UnitKind::Branches => count_hits(self.b.values().flatten().copied()),
            UnitKind::Lines => count_hits(self.line_hits().into_values()),
        }
    }
}

fn count_hits(hits: impl Iterator<Item = u64>) -> UnitTotals {
    hits.fold(UnitTotals::default(), |mut acc, hits| {
        acc.total += 1;
        if hits > 0 {
            acc.covered += 1;
        }
        acc
    })
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur while reading or extracting coverage.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    /// The coverage map could not be decoded.
    #[error("Invalid coverage map: {0}")]
    InvalidFormat(String),

    /// The coverage section had no entries left after filtering.
    #[error("No entries found in coverage data")]
    NoEntries,
}

/// Decode a coverage map from JSON text.
pub fn parse_coverage_map(text: &str) -> Result<CoverageMapData, ExtractError> {
    serde_json::from_str(text).map_err(|e| ExtractError::InvalidFormat(e.to_string()))
}

// ============================================================================
// Path Normalization
// ============================================================================

/// Normalize a file path to a canonical key.
///
/// # Examples
///
/// ```
/// use covdelta_adapters_coverage::normalize_path;
///
/// assert_eq!(normalize_path("src/foo.js"), "src/foo.js");
/// assert_eq!(normalize_path("./src//foo.js"), "src/foo.js");
/// assert_eq!(normalize_path("src\\foo.js"), "src/foo.js");
/// assert_eq!(normalize_path("/home/runner/work/repo/src/foo.js"), "/home/runner/work/repo/src/foo.js");
/// ```
pub fn normalize_path(path: &str) -> String {
    normalize_path_with_strip(path, &[])
}

/// Normalize a file path with optional prefix stripping.
///
/// - Converts backslashes to forward slashes
/// - Strips the first configured prefix that matches on a segment boundary
/// - Drops `.` and empty segments and resolves `..`
///
/// Nothing else is removed: an absolute path that no prefix matched stays
/// absolute and whole. Each snapshot strips its own checkout root, so the
/// same file from two checkouts ends up with the same repo-relative key.
pub fn normalize_path_with_strip(path: &str, strip_prefixes: &[String]) -> String {
    let mut normalized = path.replace('\\', "/");

    for prefix in strip_prefixes {
        let prefix_norm = prefix.trim().replace('\\', "/");
        let prefix_norm = prefix_norm.trim_end_matches('/');
        if prefix_norm.is_empty() {
            continue;
        }
        if let Some(rest) = normalized.strip_prefix(prefix_norm)
            && rest.starts_with('/')
        {
            normalized = rest.trim_start_matches('/').to_string();
            break;
        }
    }

    let (root, body) = split_root(&normalized);

    let mut segments: Vec<&str> = Vec::new();
    for segment in body.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(last) if *last != ".." => {
                    segments.pop();
                }
                _ if root.is_some() => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    match root {
        None => segments.join("/"),
        Some(root) => format!("{}{}", root, segments.join("/")),
    }
}

/// Split an absolute root (`/` or `C:/`) from the rest of the path.
fn split_root(path: &str) -> (Option<String>, &str) {
    if let Some(rest) = path.strip_prefix('/') {
        return (Some("/".to_string()), rest);
    }
    let bytes = path.as_bytes();
    if bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/'
    {
        return (Some(path[..3].to_string()), &path[3..]);
    }
    (None, path)
}

// ============================================================================
// Extraction
// ============================================================================

/// Options for turning a coverage map into a snapshot.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Branch label recorded on the snapshot.
    pub branch: String,
    pub role: Option<SnapshotRole>,
    pub unit: UnitKind,
    /// Prefixes to strip from reported paths (typically the working directory).
    pub strip_prefixes: Vec<String>,
    /// Restrict extraction to these paths. `None` keeps every file.
    pub allow_list: Option<BTreeSet<String>>,
}

impl ExtractOptions {
    pub fn new(branch: impl Into<String>, role: SnapshotRole, unit: UnitKind) -> Self {
        Self {
            branch: branch.into(),
            role: Some(role),
            unit,
            ..Default::default()
        }
    }
}

/// Extract a snapshot from a coverage map.
///
/// # Examples
///
/// ```
/// use covdelta_adapters_coverage::{ExtractOptions, extract, parse_coverage_map};
/// use covdelta_types::{SnapshotRole, UnitKind};
///
/// let map = parse_coverage_map(r#"{
///   "/work/repo/src/a.js": { "f": { "0": 1, "1": 0 } }
/// }"#).unwrap();
///
/// let mut options = ExtractOptions::new("feature", SnapshotRole::Current, UnitKind::Functions);
/// options.strip_prefixes = vec!["/work/repo".to_string()];
/// let snapshot = extract(&map, &options).unwrap();
/// assert_eq!(snapshot.entries()[0].path, "src/a.js");
/// assert_eq!(snapshot.entries()[0].metric, 50.0);
/// ```
pub fn extract(
    map: &CoverageMapData,
    options: &ExtractOptions,
) -> Result<CoverageSnapshot, ExtractError> {
    extract_with_filter(map, options, |_| true)
}

/// Extract a snapshot, keeping only normalized paths accepted by `filter`.
///
/// Returns [`ExtractError::NoEntries`] when nothing survives the allow-list
/// and the filter.
pub fn extract_with_filter<F>(
    map: &CoverageMapData,
    options: &ExtractOptions,
    filter: F,
) -> Result<CoverageSnapshot, ExtractError>
where
    F: Fn(&str) -> bool,
{
    let allow_list: Option<BTreeSet<String>> = options.allow_list.as_ref().map(|paths| {
        paths
            .iter()
            .map(|p| normalize_path_with_strip(p, &options.strip_prefixes))
            .collect()
    });

    let mut entries = Vec::new();
    for (raw_path, file) in map {
        let path = normalize_path_with_strip(raw_path, &options.strip_prefixes);

        if let Some(allowed) = &allow_list
            && !allowed.contains(&path)
        {
            log::debug!("skipping {raw_path}: not in allow-list");
            continue;
        }
        if !filter(&path) {
            log::debug!("skipping {raw_path}: excluded by path filter");
            continue;
        }

        let data = file.data();
        let totals = data.totals(options.unit);
        log::debug!(
            "extracted {path}: {}/{} {} covered",
            totals.covered,
            totals.total,
            options.unit.as_str()
        );
        entries.push(CoverageEntry::new(path, totals.pct()).with_uncovered_lines(data.uncovered_lines()));
    }

    if entries.is_empty() {
        return Err(ExtractError::NoEntries);
    }

    Ok(CoverageSnapshot::new(
        options.branch.clone(),
        options.role.unwrap_or(SnapshotRole::Current),
        options.unit,
        entries,
    ))
}

// ============================================================================
// Tests
// ============================================================================
