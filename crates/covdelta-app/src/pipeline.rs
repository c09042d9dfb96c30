//! The CI check pipeline.
//!
//! One pass per invocation, strictly sequential:
//!
//! ```text
//! Pending -> RunningTests -> Reconciling -> Regressed | Improved | Unchanged
//!                        \-> Skipped
//! ```
//!
//! The current branch is tested first, then the base ref is checked out and
//! tested. The base run is skipped when the current run cannot produce a
//! comparison anyway.

use std::path::PathBuf;

use covdelta_adapters_changes::{ChangeSet, parse_changed_paths};
use covdelta_adapters_results::{TestResults, load_results_file};
use covdelta_config::EffectiveConfig;
use covdelta_ports::{Clock, TestRunner, VersionControl};
use covdelta_types::CheckStatus;

use crate::{AppError, CompareRequest, CompareResult, change_options, compare_with_clock};

/// State of a CI check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Pending,
    RunningTests,
    Reconciling,
    Regressed,
    Improved,
    Unchanged,
    /// Nothing to reconcile; the caller posts nothing.
    Skipped,
}

impl CheckState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CheckState::Regressed | CheckState::Improved | CheckState::Unchanged | CheckState::Skipped
        )
    }
}

impl From<CheckStatus> for CheckState {
    fn from(status: CheckStatus) -> Self {
        match status {
            CheckStatus::Regressed => CheckState::Regressed,
            CheckStatus::Improved => CheckState::Improved,
            CheckStatus::Unchanged => CheckState::Unchanged,
            CheckStatus::Skipped => CheckState::Skipped,
        }
    }
}

/// Request for a full pipeline run.
#[derive(Debug, Clone)]
pub struct CiRequest {
    /// Base ref to compare against. Required.
    pub base_ref: Option<String>,
    /// Ref of the current branch.
    pub head_ref: String,
    /// Where the runner writes the current results document.
    pub results_path: PathBuf,
    /// Where the runner writes the base results document.
    pub base_results_path: PathBuf,
    /// Working directory of the runs.
    pub cwd: String,
    pub config: EffectiveConfig,
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone)]
pub struct CiOutcome {
    /// Every state entered, in order. The last one is terminal.
    pub transitions: Vec<CheckState>,
    pub result: CompareResult,
}

impl CiOutcome {
    pub fn state(&self) -> CheckState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(CheckState::Pending)
    }
}

/// Run the CI check through the given ports.
///
/// # Errors
///
/// - `AppError::Config` when no base ref is given, before any test runs
/// - `AppError::Vcs` when the base ref cannot be checked out
///
/// Runner failures and unreadable results documents are logged and end in
/// a `Skipped` outcome instead.
pub fn run_ci_check<R, V, C>(
    request: CiRequest,
    runner: &R,
    vcs: &V,
    clock: &C,
) -> Result<CiOutcome, AppError>
where
    R: TestRunner,
    V: VersionControl,
    C: Clock,
{
    let mut transitions = vec![CheckState::Pending];

    let base_ref = match request.base_ref.as_deref().map(str::trim) {
        Some(base_ref) if !base_ref.is_empty() => base_ref.to_string(),
        _ => {
            return Err(AppError::Config(
                "a base ref is required to compare coverage".to_string(),
            ));
        }
    };

    let changes = match vcs.changed_paths(&base_ref, &request.head_ref) {
        Ok(text) => Some(parse_changed_paths(
            &text,
            &change_options(&request.config, &request.cwd),
        )),
        Err(err) => {
            log::warn!("could not list changed paths: {err}; comparing all files");
            None
        }
    };

    enter(&mut transitions, CheckState::RunningTests);
    if let Err(err) = runner.run(&request.results_path) {
        log::warn!("current test run failed: {err}");
    }
    let current = load_results_file(&request.results_path);

    let base = if can_compare(&current, changes.as_ref(), request.config.changes_only) {
        vcs.checkout(&base_ref).map_err(AppError::Vcs)?;
        log::info!("checked out {base_ref}; running base tests");
        if let Err(err) = runner.run(&request.base_results_path) {
            log::warn!("base test run failed: {err}");
        }
        Some(load_results_file(&request.base_results_path))
    } else {
        log::info!("current run has nothing to compare; skipping base run");
        None
    };

    enter(&mut transitions, CheckState::Reconciling);
    let compare_request = CompareRequest {
        current,
        base,
        changes,
        current_branch: request.head_ref.clone(),
        base_branch: Some(base_ref),
        cwd: request.cwd.clone(),
        ..Default::default()
    }
    .with_config(&request.config);

    let result = compare_with_clock(compare_request, clock)?;
    enter(&mut transitions, CheckState::from(result.report.status));

    Ok(CiOutcome {
        transitions,
        result,
    })
}

fn enter(transitions: &mut Vec<CheckState>, state: CheckState) {
    if state.is_terminal() {
        log::info!("check finished: {:?}", state);
    } else {
        log::info!("check state: {:?}", state);
    }
    transitions.push(state);
}

/// Whether the current run can lead to a comparison at all.
fn can_compare(current: &TestResults, changes: Option<&ChangeSet>, changes_only: bool) -> bool {
    if current.coverage_map().is_none() {
        return false;
    }
    match changes {
        Some(changes) if changes_only => !changes.source_files.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::rc::Rc;

    use super::*;
    use crate::test_support::{FixedClock, results_json};
    use covdelta_types::{REASON_MISSING_REPORT, REASON_NO_ENTRIES};

    type Events = Rc<RefCell<Vec<String>>>;

    /// Writes queued documents to the requested path; `None` fails the run.
    struct FakeRunner {
        outputs: RefCell<VecDeque<Option<String>>>,
        events: Events,
    }

    impl TestRunner for FakeRunner {
        fn run(&self, output_path: &Path) -> Result<(), String> {
            let name = output_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.events.borrow_mut().push(format!("run {name}"));
            match self.outputs.borrow_mut().pop_front().flatten() {
                Some(text) => std::fs::write(output_path, text).map_err(|e| e.to_string()),
                None => Err("runner exited with status 1".to_string()),
            }
        }
    }

    struct FakeVcs {
        changed: Result<String, String>,
        checkout_fails: bool,
        events: Events,
    }

    impl VersionControl for FakeVcs {
        fn changed_paths(&self, base: &str, head: &str) -> Result<String, String> {
            self.events
                .borrow_mut()
                .push(format!("diff {base}...{head}"));
            self.changed.clone()
        }

        fn checkout(&self, reference: &str) -> Result<(), String> {
            self.events.borrow_mut().push(format!("checkout {reference}"));
            if self.checkout_fails {
                Err(format!("pathspec '{reference}' did not match"))
            } else {
                Ok(())
            }
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        request: CiRequest,
        runner: FakeRunner,
        vcs: FakeVcs,
        events: Events,
    }

    fn harness(outputs: Vec<Option<String>>, changed: Result<&str, &str>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let events: Events = Rc::new(RefCell::new(Vec::new()));
        let request = CiRequest {
            base_ref: Some("main".to_string()),
            head_ref: "feature".to_string(),
            results_path: dir.path().join("jest.results.json"),
            base_results_path: dir.path().join("jest.results.prev.json"),
            cwd: String::new(),
            config: EffectiveConfig::default(),
        };
        Harness {
            request,
            runner: FakeRunner {
                outputs: RefCell::new(outputs.into()),
                events: Rc::clone(&events),
            },
            vcs: FakeVcs {
                changed: changed.map(String::from).map_err(String::from),
                checkout_fails: false,
                events: Rc::clone(&events),
            },
            events,
            _dir: dir,
        }
    }

    fn run(h: &Harness) -> Result<CiOutcome, AppError> {
        run_ci_check(
            h.request.clone(),
            &h.runner,
            &h.vcs,
            &FixedClock::new("2026-02-02T00:00:00Z"),
        )
    }

    #[test]
    fn test_regression_walks_every_state() {
        let h = harness(
            vec![
                Some(results_json(true, &[("src/a.js", 1, 2)])),
                Some(results_json(true, &[("src/a.js", 2, 2)])),
            ],
            Ok("src/a.js\n"),
        );
        let outcome = run(&h).unwrap();

        assert_eq!(
            outcome.transitions,
            vec![
                CheckState::Pending,
                CheckState::RunningTests,
                CheckState::Reconciling,
                CheckState::Regressed,
            ]
        );
        assert!(outcome.state().is_terminal());
        assert_eq!(outcome.result.exit_code, 2);
        assert_eq!(
            *h.events.borrow(),
            vec![
                "diff main...feature",
                "run jest.results.json",
                "checkout main",
                "run jest.results.prev.json",
            ]
        );
    }

    #[test]
    fn test_missing_base_ref_fails_before_running_tests() {
        let mut h = harness(vec![], Ok(""));
        h.request.base_ref = None;
        assert!(matches!(run(&h), Err(AppError::Config(_))));

        h.request.base_ref = Some("  ".to_string());
        assert!(matches!(run(&h), Err(AppError::Config(_))));
        assert!(h.events.borrow().is_empty());
    }

    #[test]
    fn test_runner_failure_is_skipped() {
        let h = harness(vec![None], Ok("src/a.js\n"));
        let outcome = run(&h).unwrap();

        assert_eq!(outcome.state(), CheckState::Skipped);
        assert_eq!(outcome.result.report.reasons, vec![REASON_MISSING_REPORT]);
        assert_eq!(outcome.result.exit_code, 0);
        assert!(!h.events.borrow().iter().any(|e| e.starts_with("checkout")));
    }

    #[test]
    fn test_no_changed_sources_skips_base_run() {
        let h = harness(
            vec![Some(results_json(true, &[("src/a.js", 1, 2)]))],
            Ok("README.md\n"),
        );
        let outcome = run(&h).unwrap();

        assert_eq!(outcome.state(), CheckState::Skipped);
        assert_eq!(outcome.result.report.reasons, vec![REASON_NO_ENTRIES]);
        assert_eq!(h.events.borrow().len(), 2);
    }

    #[test]
    fn test_diff_failure_compares_all_files() {
        let h = harness(
            vec![
                Some(results_json(true, &[("src/a.js", 2, 2), ("src/b.js", 1, 2)])),
                Some(results_json(true, &[("src/a.js", 1, 2), ("src/b.js", 1, 2)])),
            ],
            Err("fatal: bad revision"),
        );
        let outcome = run(&h).unwrap();

        assert_eq!(outcome.state(), CheckState::Improved);
        assert_eq!(outcome.result.report.data.pairs.len(), 2);
    }

    #[test]
    fn test_checkout_failure_is_an_error() {
        let mut h = harness(
            vec![Some(results_json(true, &[("src/a.js", 1, 2)]))],
            Ok("src/a.js\n"),
        );
        h.vcs.checkout_fails = true;
        assert!(matches!(run(&h), Err(AppError::Vcs(_))));
    }

    #[test]
    fn test_base_run_failure_is_skipped_missing_base() {
        let h = harness(
            vec![Some(results_json(true, &[("src/a.js", 1, 2)])), None],
            Ok("src/a.js\n"),
        );
        let outcome = run(&h).unwrap();
        assert_eq!(outcome.state(), CheckState::Skipped);
        assert_eq!(
            outcome.result.report.reasons,
            vec![covdelta_types::REASON_MISSING_BASE]
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(!CheckState::Pending.is_terminal());
        assert!(!CheckState::RunningTests.is_terminal());
        assert!(!CheckState::Reconciling.is_terminal());
        assert!(CheckState::Unchanged.is_terminal());
        assert!(CheckState::Skipped.is_terminal());
    }
}
