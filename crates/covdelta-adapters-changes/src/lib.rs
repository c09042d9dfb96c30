//! Changed-path list adapter for covdelta.
//!
//! Turns the name-only diff output of a version-control collaborator (one
//! path per line) into the allow-list of source files to compare and the
//! list of modified test files.

use std::collections::BTreeSet;

use covdelta_adapters_coverage::normalize_path_with_strip;

/// Source extensions kept when no configuration says otherwise.
pub const DEFAULT_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs"];

/// Stem suffixes marking a test file (`name.test.js`, `name.spec.ts`).
pub const DEFAULT_TEST_MARKERS: &[&str] = &["test", "spec"];

/// Snapshot artifacts are never source files.
const SNAPSHOT_EXTENSION: &str = "snap";

/// Options for [`parse_changed_paths`].
#[derive(Debug, Clone)]
pub struct ChangeOptions {
    /// File extensions (without the dot) treated as source.
    pub extensions: Vec<String>,
    /// Markers (without the dot) identifying test files.
    pub test_markers: Vec<String>,
    /// Prefixes stripped during normalization.
    pub strip_prefixes: Vec<String>,
}

impl Default for ChangeOptions {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            test_markers: DEFAULT_TEST_MARKERS.iter().map(|s| s.to_string()).collect(),
            strip_prefixes: Vec::new(),
        }
    }
}

/// Normalized, deduplicated view of a changed-path list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Source files to compare, including the subjects of changed tests.
    pub source_files: BTreeSet<String>,
    /// Test files that were modified.
    pub test_files: BTreeSet<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.source_files.is_empty() && self.test_files.is_empty()
    }
}

/// Parse a changed-path list.
///
/// # Examples
///
/// ```
/// use covdelta_adapters_changes::{ChangeOptions, parse_changed_paths};
///
/// let changes = parse_changed_paths(
///     "src/math.js\nsrc/util/strings.test.js\nsrc/__snapshots__/a.test.js.snap\nREADME.md\n",
///     &ChangeOptions::default(),
/// );
///
/// assert!(changes.source_files.contains("src/math.js"));
/// assert!(changes.source_files.contains("src/util/strings.js"));
/// assert!(changes.test_files.contains("src/util/strings.test.js"));
/// assert_eq!(changes.source_files.len(), 2);
/// ```
pub fn parse_changed_paths(text: &str, options: &ChangeOptions) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let path = normalize_path_with_strip(line, &options.strip_prefixes);
        let (dir, file_name) = match path.rfind('/') {
            Some(idx) => (&path[..=idx], &path[idx + 1..]),
            None => ("", path.as_str()),
        };

        let Some((stem, extension)) = file_name.rsplit_once('.') else {
            log::debug!("ignoring changed path without extension: {line}");
            continue;
        };
        if stem.is_empty() || extension == SNAPSHOT_EXTENSION {
            continue;
        }
        if !options.extensions.iter().any(|e| e == extension) {
            log::debug!("ignoring changed path with extension {extension}: {line}");
            continue;
        }

        match test_subject(stem, &options.test_markers) {
            Some(subject) => {
                changes
                    .source_files
                    .insert(format!("{dir}{subject}.{extension}"));
                changes.test_files.insert(path.clone());
            }
            None => {
                changes.source_files.insert(path.clone());
            }
        }
    }

    changes
}

/// The subject stem of a test file stem (`math.test` -> `math`).
fn test_subject<'a>(stem: &'a str, markers: &[String]) -> Option<&'a str> {
    markers.iter().find_map(|marker| {
        stem.strip_suffix(marker.as_str())
            .and_then(|rest| rest.strip_suffix('.'))
            .filter(|subject| !subject.is_empty())
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ChangeSet {
        parse_changed_paths(text, &ChangeOptions::default())
    }

    #[test]
    fn test_empty_input() {
        assert!(parse("").is_empty());
        assert!(parse("\n\n   \n").is_empty());
    }

    #[test]
    fn test_source_files_are_kept() {
        let changes = parse("src/a.js\nsrc/b.ts\nlib/c.mjs\n");
        let sources: Vec<&str> = changes.source_files.iter().map(String::as_str).collect();
        assert_eq!(sources, vec!["lib/c.mjs", "src/a.js", "src/b.ts"]);
        assert!(changes.test_files.is_empty());
    }

    #[test]
    fn test_other_extensions_are_ignored() {
        let changes = parse("README.md\npackage.json\nMakefile\n.eslintrc\n");
        assert!(changes.is_empty());
    }

    #[test]
    fn test_snapshots_are_skipped() {
        let changes = parse("src/__snapshots__/a.test.js.snap\n");
        assert!(changes.is_empty());
    }

    #[test]
    fn test_test_file_adds_subject() {
        let changes = parse("src/math.test.js\nsrc/util/fmt.spec.ts\n");
        assert!(changes.source_files.contains("src/math.js"));
        assert!(changes.source_files.contains("src/util/fmt.ts"));
        assert!(changes.test_files.contains("src/math.test.js"));
        assert!(changes.test_files.contains("src/util/fmt.spec.ts"));
    }

    #[test]
    fn test_duplicates_collapse() {
        let changes = parse("src/a.js\n./src/a.js\nsrc/a.test.js\n");
        assert_eq!(changes.source_files.len(), 1);
        assert_eq!(changes.test_files.len(), 1);
    }

    #[test]
    fn test_marker_alone_is_not_a_test() {
        let changes = parse("src/test.js\nsrc/.test.js\n");
        assert!(changes.source_files.contains("src/test.js"));
        assert!(changes.test_files.is_empty());
    }

    #[test]
    fn test_windows_line_endings_and_separators() {
        let changes = parse("src\\a.js\r\nsrc\\b.test.js\r\n");
        assert!(changes.source_files.contains("src/a.js"));
        assert!(changes.source_files.contains("src/b.js"));
    }

    #[test]
    fn test_custom_options() {
        let options = ChangeOptions {
            extensions: vec!["vue".to_string()],
            test_markers: vec!["unit".to_string()],
            strip_prefixes: vec!["/work/repo".to_string()],
        };
        let changes = parse_changed_paths(
            "/work/repo/components/App.vue\n/work/repo/components/App.unit.vue\nsrc/a.js\n",
            &options,
        );
        let sources: Vec<&str> = changes.source_files.iter().map(String::as_str).collect();
        assert_eq!(sources, vec!["components/App.vue"]);
        assert!(changes.test_files.contains("components/App.unit.vue"));
    }
}
