//! Pure domain logic for covdelta.
//!
//! This crate aligns two coverage snapshots by file identity and classifies
//! the result. It has no side effects: everything it learns is returned in a
//! [`ReconciliationResult`], so repeated calls never share state.

use std::collections::HashMap;

use covdelta_types::{
    CoveragePair, CoverageSnapshot, PairStatus, ReconciliationResult, Verdict,
};

// ============================================================================
// Reconciliation
// ============================================================================

/// Compare `current` against `base`.
///
/// 1. Builds a `path -> metric` lookup from the base snapshot
/// 2. Emits one pair per current entry, in current order
/// 3. Classifies comparable pairs by exact comparison of the metrics
/// 4. Derives the verdict: regression first, then improvement
///
/// A current path with no base entry is a new file. It is reported with
/// `prev_metric: None` and never contributes to the verdict.
///
/// # Examples
///
/// ```
/// use covdelta_domain::reconcile;
/// use covdelta_types::{CoverageEntry, CoverageSnapshot, SnapshotRole, UnitKind, Verdict};
///
/// let base = CoverageSnapshot::new(
///     "main",
///     SnapshotRole::Base,
///     UnitKind::Functions,
///     vec![CoverageEntry::new("a.js", 80.0)],
/// );
/// let current = CoverageSnapshot::new(
///     "feature",
///     SnapshotRole::Current,
///     UnitKind::Functions,
///     vec![CoverageEntry::new("a.js", 60.0)],
/// );
///
/// let result = reconcile(&base, &current);
/// assert_eq!(result.verdict, Verdict::Regressed);
/// assert_eq!(result.regressed_paths, vec!["a.js".to_string()]);
/// ```
pub fn reconcile(base: &CoverageSnapshot, current: &CoverageSnapshot) -> ReconciliationResult {
    let lookup: HashMap<&str, f64> = base
        .entries()
        .iter()
        .map(|entry| (entry.path.as_str(), entry.metric))
        .collect();

    let mut pairs = Vec::with_capacity(current.len());
    let mut regressed_paths = Vec::new();
    let mut improved_paths = Vec::new();

    for entry in current.entries() {
        let prev_metric = lookup.get(entry.path.as_str()).copied();
        let status = classify(prev_metric, entry.metric);

        log::debug!(
            "reconcile {}: prev={:?} new={} -> {:?}",
            entry.path,
            prev_metric,
            entry.metric,
            status
        );

        match status {
            PairStatus::Regressed => regressed_paths.push(entry.path.clone()),
            PairStatus::Improved => improved_paths.push(entry.path.clone()),
            PairStatus::Unchanged | PairStatus::New => {}
        }

        pairs.push(CoveragePair {
            path: entry.path.clone(),
            prev_metric,
            new_metric: entry.metric,
            status,
        });
    }

    let verdict = determine_verdict(&regressed_paths, &improved_paths);

    ReconciliationResult {
        pairs,
        verdict,
        regressed_paths,
        improved_paths,
    }
}

/// Classify one pair. Comparison is exact; callers wanting a tolerance
/// apply it to the metrics before reconciling.
pub fn classify(prev_metric: Option<f64>, new_metric: f64) -> PairStatus {
    match prev_metric {
        None => PairStatus::New,
        Some(prev) if new_metric < prev => PairStatus::Regressed,
        Some(prev) if new_metric > prev => PairStatus::Improved,
        Some(_) => PairStatus::Unchanged,
    }
}

/// Regression wins over any number of improvements.
fn determine_verdict(regressed: &[String], improved: &[String]) -> Verdict {
    if !regressed.is_empty() {
        Verdict::Regressed
    } else if !improved.is_empty() {
        Verdict::Improved
    } else {
        Verdict::Unchanged
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use covdelta_types::{CoverageEntry, SnapshotRole, UnitKind};

    fn snapshot(role: SnapshotRole, entries: &[(&str, f64)]) -> CoverageSnapshot {
        let branch = match role {
            SnapshotRole::Base => "main",
            SnapshotRole::Current => "feature",
        };
        CoverageSnapshot::new(
            branch,
            role,
            UnitKind::Functions,
            entries
                .iter()
                .map(|(path, metric)| CoverageEntry::new(*path, *metric)),
        )
    }

    fn base(entries: &[(&str, f64)]) -> CoverageSnapshot {
        snapshot(SnapshotRole::Base, entries)
    }

    fn current(entries: &[(&str, f64)]) -> CoverageSnapshot {
        snapshot(SnapshotRole::Current, entries)
    }

    #[test]
    fn test_single_file_regression() {
        let result = reconcile(&base(&[("a.js", 80.0)]), &current(&[("a.js", 60.0)]));

        assert_eq!(result.verdict, Verdict::Regressed);
        assert_eq!(result.regressed_paths, vec!["a.js"]);
        assert!(result.improved_paths.is_empty());
        assert_eq!(result.pairs[0].prev_metric, Some(80.0));
        assert_eq!(result.pairs[0].new_metric, 60.0);
    }

    #[test]
    fn test_new_file_is_reported_but_not_classified() {
        let result = reconcile(
            &base(&[("a.js", 80.0)]),
            &current(&[("a.js", 80.0), ("b.js", 50.0)]),
        );

        assert_eq!(result.verdict, Verdict::Unchanged);
        assert_eq!(result.pairs.len(), 2);
        assert_eq!(result.pairs[1].path, "b.js");
        assert_eq!(result.pairs[1].prev_metric, None);
        assert_eq!(result.pairs[1].status, PairStatus::New);
        assert!(result.regressed_paths.is_empty());
        assert!(result.improved_paths.is_empty());
        assert_eq!(result.new_paths(), vec!["b.js"]);
    }

    #[test]
    fn test_regression_takes_priority_over_improvement() {
        let result = reconcile(
            &base(&[("a.js", 80.0), ("b.js", 90.0)]),
            &current(&[("a.js", 85.0), ("b.js", 70.0)]),
        );

        assert_eq!(result.verdict, Verdict::Regressed);
        assert_eq!(result.regressed_paths, vec!["b.js"]);
        assert_eq!(result.improved_paths, vec!["a.js"]);
    }

    #[test]
    fn test_improvement_only() {
        let result = reconcile(&base(&[("a.js", 50.0)]), &current(&[("a.js", 75.0)]));
        assert_eq!(result.verdict, Verdict::Improved);
        assert_eq!(result.improved_paths, vec!["a.js"]);
        assert_eq!(result.pairs[0].delta(), Some(25.0));
    }

    #[test]
    fn test_sub_percent_delta_is_detected() {
        let result = reconcile(
            &base(&[("a.js", 33.34)]),
            &current(&[("a.js", 33.33)]),
        );
        assert_eq!(result.verdict, Verdict::Regressed);
    }

    #[test]
    fn test_removed_base_file_is_ignored() {
        let result = reconcile(
            &base(&[("a.js", 80.0), ("gone.js", 10.0)]),
            &current(&[("a.js", 80.0)]),
        );
        assert_eq!(result.verdict, Verdict::Unchanged);
        assert_eq!(result.pairs.len(), 1);
    }

    #[test]
    fn test_empty_base_makes_every_file_new() {
        let result = reconcile(&base(&[]), &current(&[("a.js", 10.0), ("b.js", 0.0)]));
        assert_eq!(result.verdict, Verdict::Unchanged);
        assert!(result.pairs.iter().all(|p| p.status == PairStatus::New));
    }

    #[test]
    fn test_empty_current_is_unchanged() {
        let result = reconcile(&base(&[("a.js", 80.0)]), &current(&[]));
        assert_eq!(result.verdict, Verdict::Unchanged);
        assert!(result.pairs.is_empty());
    }

    #[test]
    fn test_pairs_follow_current_order() {
        let result = reconcile(
            &base(&[("a.js", 1.0), ("b.js", 2.0), ("c.js", 3.0)]),
            &current(&[("c.js", 3.0), ("a.js", 1.0), ("b.js", 2.0)]),
        );
        let order: Vec<&str> = result.pairs.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(order, vec!["c.js", "a.js", "b.js"]);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(None, 0.0), PairStatus::New);
        assert_eq!(classify(Some(50.0), 49.9), PairStatus::Regressed);
        assert_eq!(classify(Some(50.0), 50.1), PairStatus::Improved);
        assert_eq!(classify(Some(50.0), 50.0), PairStatus::Unchanged);
    }

    #[test]
    fn test_repeated_calls_do_not_accumulate() {
        let b = base(&[("a.js", 80.0)]);
        let c = current(&[("a.js", 60.0)]);
        let first = reconcile(&b, &c);
        let second = reconcile(&b, &c);
        assert_eq!(first, second);
        assert_eq!(second.regressed_paths.len(), 1);
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use covdelta_types::{CoverageEntry, SnapshotRole, UnitKind};
    use proptest::prelude::*;

    fn entries_strategy() -> impl Strategy<Value = Vec<(String, f64)>> {
        prop::collection::vec(("[a-z]{1,8}\\.js", 0.0f64..=100.0), 1..20)
    }

    fn build(role: SnapshotRole, entries: &[(String, f64)]) -> CoverageSnapshot {
        CoverageSnapshot::new(
            "branch",
            role,
            UnitKind::Functions,
            entries
                .iter()
                .map(|(path, metric)| CoverageEntry::new(path.clone(), *metric)),
        )
    }

    proptest! {
        #[test]
        fn reconciling_a_snapshot_with_itself_is_unchanged(entries in entries_strategy()) {
            let base = build(SnapshotRole::Base, &entries);
            let current = build(SnapshotRole::Current, &entries);
            let result = reconcile(&base, &current);
            prop_assert_eq!(result.verdict, Verdict::Unchanged);
            prop_assert!(result.regressed_paths.is_empty());
            prop_assert!(result.improved_paths.is_empty());
        }

        #[test]
        fn new_paths_never_change_the_verdict(
            base_entries in entries_strategy(),
            current_entries in entries_strategy(),
            extra in prop::collection::vec(("new_[a-z]{1,8}\\.ts", 0.0f64..=100.0), 0..10),
        ) {
            let base = build(SnapshotRole::Base, &base_entries);
            let current = build(SnapshotRole::Current, &current_entries);
            let without = reconcile(&base, &current);

            let mut extended = current_entries.clone();
            extended.extend(extra);
            let with = reconcile(&base, &build(SnapshotRole::Current, &extended));

            prop_assert_eq!(without.verdict, with.verdict);
            prop_assert_eq!(without.regressed_paths, with.regressed_paths);
            prop_assert_eq!(without.improved_paths, with.improved_paths);
        }

        #[test]
        fn any_regression_means_regressed(
            base_entries in entries_strategy(),
            current_entries in entries_strategy(),
        ) {
            let base = build(SnapshotRole::Base, &base_entries);
            let current = build(SnapshotRole::Current, &current_entries);
            let result = reconcile(&base, &current);
            if !result.regressed_paths.is_empty() {
                prop_assert_eq!(result.verdict, Verdict::Regressed);
            } else if !result.improved_paths.is_empty() {
                prop_assert_eq!(result.verdict, Verdict::Improved);
            } else {
                prop_assert_eq!(result.verdict, Verdict::Unchanged);
            }
        }

        #[test]
        fn one_pair_per_current_entry(
            base_entries in entries_strategy(),
            current_entries in entries_strategy(),
        ) {
            let base = build(SnapshotRole::Base, &base_entries);
            let current = build(SnapshotRole::Current, &current_entries);
            let result = reconcile(&base, &current);
            prop_assert_eq!(result.pairs.len(), current.len());
            for (pair, entry) in result.pairs.iter().zip(current.entries()) {
                prop_assert_eq!(&pair.path, &entry.path);
                prop_assert_eq!(pair.prev_metric.is_none(), base.get(&entry.path).is_none());
            }
        }
    }
}
