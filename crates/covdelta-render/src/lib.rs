//! Rendering utilities for covdelta reports.
//!
//! This crate converts a `Report` into:
//! - GitHub workflow annotation commands
//! - A one-line plain text summary
//!
//! # Example
//!
//! ```rust
//! use covdelta_render::{render_annotations, render_summary};
//! use covdelta_types::Report;
//!
//! let report = Report::default();
//! let annotations = render_annotations(&report, 25);
//! let summary = render_summary(&report);
//! assert!(annotations.is_empty());
//! assert!(summary.starts_with("covdelta: skipped"));
//! ```

use covdelta_types::{CheckStatus, Report};

/// Default maximum number of GitHub annotations to emit.
pub const DEFAULT_MAX_ANNOTATIONS: usize = 25;

fn status_label(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Improved => "improved",
        CheckStatus::Regressed => "regressed",
        CheckStatus::Unchanged => "unchanged",
        CheckStatus::Skipped => "skipped",
    }
}

/// Renders a one-line summary of the report.
///
/// ```text
/// covdelta: regressed (functions, feature vs main): 1 regressed, 2 improved, 1 new, 4 compared
/// ```
pub fn render_summary(report: &Report) -> String {
    let data = &report.data;
    let mut output = format!("covdelta: {}", status_label(report.status));

    if report.status == CheckStatus::Skipped {
        if !report.reasons.is_empty() {
            output.push_str(&format!(" ({})", report.reasons.join(", ")));
        }
        return output;
    }

    output.push_str(&format!(" ({}", data.unit.as_str()));
    if let Some(base) = &data.base_branch {
        output.push_str(&format!(", {} vs {}", data.current_branch, base));
    }
    output.push_str(&format!(
        "): {} regressed, {} improved, {} new, {} compared",
        data.regressed_paths.len(),
        data.improved_paths.len(),
        data.new_paths.len(),
        data.pairs.len()
    ));

    output
}

/// Renders the report as GitHub workflow annotation commands.
///
/// Regressed files come first, then failed assertions, then improved files.
/// At most `max_annotations` commands are emitted.
///
/// # Example Output
///
/// ```text
/// ::error file=src/math.js,title=Coverage regressed::functions coverage dropped from 80.00% to 60.00% (-20.00)
/// ::error file=src/math.test.js,line=12,title=math > adds::Expected 3%0A%0AReceived 4
/// ::notice file=src/util.js,title=Coverage improved::functions coverage rose from 50.00% to 75.00% (+25.00)
/// ```
pub fn render_annotations(report: &Report, max_annotations: usize) -> String {
    let data = &report.data;
    let unit = data.unit.as_str();
    let mut commands = Vec::new();

    for pair in data.pairs.iter().filter(|p| data.regressed_paths.contains(&p.path)) {
        if let (Some(prev), Some(delta)) = (pair.prev_metric, pair.delta()) {
            commands.push(command(
                "error",
                &pair.path,
                None,
                "Coverage regressed",
                &format!(
                    "{} coverage dropped from {:.2}% to {:.2}% ({:+.2})",
                    unit, prev, pair.new_metric, delta
                ),
            ));
        }
    }

    for assertion in &data.failed_assertions {
        let line = (assertion.line > 0).then_some(assertion.line);
        commands.push(command(
            "error",
            &assertion.path,
            line,
            &assertion.title,
            &assertion.message,
        ));
    }

    for pair in data.pairs.iter().filter(|p| data.improved_paths.contains(&p.path)) {
        if let (Some(prev), Some(delta)) = (pair.prev_metric, pair.delta()) {
            commands.push(command(
                "notice",
                &pair.path,
                None,
                "Coverage improved",
                &format!(
                    "{} coverage rose from {:.2}% to {:.2}% ({:+.2})",
                    unit, prev, pair.new_metric, delta
                ),
            ));
        }
    }

    let mut output = String::new();
    for line in commands.into_iter().take(max_annotations) {
        output.push_str(&line);
        output.push('\n');
    }
    output
}

fn command(level: &str, file: &str, line: Option<u32>, title: &str, message: &str) -> String {
    let mut params = vec![format!("file={}", escape_property(file))];
    if let Some(line) = line {
        params.push(format!("line={}", line));
    }
    if !title.is_empty() {
        params.push(format!("title={}", escape_property(title)));
    }
    format!("::{} {}::{}", level, params.join(","), escape_data(message))
}

/// Escape a workflow command message.
fn escape_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Escape a workflow command property value.
fn escape_property(value: &str) -> String {
    escape_data(value).replace(':', "%3A").replace(',', "%2C")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use covdelta_types::{CoveragePair, FailedAssertion, PairStatus, ReportData, UnitKind};

    fn pair(path: &str, prev: Option<f64>, new: f64, status: PairStatus) -> CoveragePair {
        CoveragePair {
            path: path.to_string(),
            prev_metric: prev,
            new_metric: new,
            status,
        }
    }

    fn make_report(status: CheckStatus, pairs: Vec<CoveragePair>) -> Report {
        let regressed_paths = pairs
            .iter()
            .filter(|p| p.status == PairStatus::Regressed)
            .map(|p| p.path.clone())
            .collect();
        let improved_paths = pairs
            .iter()
            .filter(|p| p.status == PairStatus::Improved)
            .map(|p| p.path.clone())
            .collect();
        let new_paths = pairs
            .iter()
            .filter(|p| p.status == PairStatus::New)
            .map(|p| p.path.clone())
            .collect();
        Report {
            status,
            data: ReportData {
                unit: UnitKind::Functions,
                current_branch: "feature".to_string(),
                base_branch: Some("main".to_string()),
                current_files: pairs.len() as u32,
                base_files: Some(pairs.len() as u32),
                pairs,
                regressed_paths,
                improved_paths,
                new_paths,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_annotations_regressed_file() {
        let report = make_report(
            CheckStatus::Regressed,
            vec![pair("src/a.js", Some(80.0), 60.0, PairStatus::Regressed)],
        );
        let annotations = render_annotations(&report, 25);
        assert_eq!(
            annotations,
            "::error file=src/a.js,title=Coverage regressed::functions coverage dropped from 80.00% to 60.00% (-20.00)\n"
        );
    }

    #[test]
    fn test_annotations_order_and_levels() {
        let mut report = make_report(
            CheckStatus::Regressed,
            vec![
                pair("src/up.js", Some(50.0), 75.0, PairStatus::Improved),
                pair("src/down.js", Some(90.0), 70.0, PairStatus::Regressed),
                pair("src/new.js", None, 10.0, PairStatus::New),
            ],
        );
        report.data.failed_assertions.push(FailedAssertion {
            path: "src/down.test.js".to_string(),
            line: 7,
            title: "down > works".to_string(),
            message: "expected true".to_string(),
        });

        let annotations = render_annotations(&report, 25);
        let lines: Vec<_> = annotations.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("::error file=src/down.js,"));
        assert_eq!(
            lines[1],
            "::error file=src/down.test.js,line=7,title=down > works::expected true"
        );
        assert!(lines[2].starts_with("::notice file=src/up.js,"));
    }

    #[test]
    fn test_annotations_truncation() {
        let pairs = (0..40)
            .map(|i| pair(&format!("src/f{i}.js"), Some(50.0), 40.0, PairStatus::Regressed))
            .collect();
        let report = make_report(CheckStatus::Regressed, pairs);
        assert_eq!(render_annotations(&report, 25).lines().count(), 25);
    }

    #[test]
    fn test_annotations_empty_when_unchanged() {
        let report = make_report(
            CheckStatus::Unchanged,
            vec![pair("src/a.js", Some(50.0), 50.0, PairStatus::Unchanged)],
        );
        assert!(render_annotations(&report, 25).is_empty());
    }

    #[test]
    fn test_annotations_escape_multiline_messages() {
        let mut report = make_report(CheckStatus::Unchanged, vec![]);
        report.data.failed_assertions.push(FailedAssertion {
            path: "a.test.js".to_string(),
            line: 0,
            title: "suite: a, b".to_string(),
            message: "Expected 100%\n\nReceived 0%".to_string(),
        });

        let annotations = render_annotations(&report, 25);
        assert_eq!(
            annotations,
            "::error file=a.test.js,title=suite%3A a%2C b::Expected 100%25%0A%0AReceived 0%25\n"
        );
    }

    #[test]
    fn test_summary_compared() {
        let report = make_report(
            CheckStatus::Regressed,
            vec![
                pair("src/a.js", Some(80.0), 60.0, PairStatus::Regressed),
                pair("src/b.js", Some(10.0), 20.0, PairStatus::Improved),
                pair("src/c.js", None, 20.0, PairStatus::New),
            ],
        );
        assert_eq!(
            render_summary(&report),
            "covdelta: regressed (functions, feature vs main): 1 regressed, 1 improved, 1 new, 3 compared"
        );
    }

    #[test]
    fn test_summary_skipped_with_reason() {
        let mut report = Report::default();
        report.reasons.push("missing_report".to_string());
        assert_eq!(render_summary(&report), "covdelta: skipped (missing_report)");
    }
}
