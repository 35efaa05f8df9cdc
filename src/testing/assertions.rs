//! Assertion functions for reconciliation outcomes.

use crate::runner::RunOutcome;
use crate::task_id::TaskId;
use std::collections::HashSet;

/// Assert that a run lost nothing.
///
/// # Panics
///
/// Panics with the shortfall report if any unit is missing.
pub fn assert_complete<O>(outcome: &RunOutcome<O>) {
    if let Some(shortfall) = &outcome.shortfall {
        panic!("expected a complete run, got a shortfall:\n  {shortfall}");
    }
}

/// Assert that `dataset` is reported incomplete with exactly `missing` lost
/// units.
///
/// # Panics
///
/// Panics if the run was complete, the dataset is not in the shortfall, or
/// the number of missing units differs.
pub fn assert_shortfall_for<O>(outcome: &RunOutcome<O>, dataset: &str, missing: usize) {
    let Some(shortfall) = &outcome.shortfall else {
        panic!("expected a shortfall for {dataset:?}, but the run was complete");
    };
    let Some(entry) = shortfall.datasets.iter().find(|d| d.dataset == dataset) else {
        panic!("dataset {dataset:?} not in shortfall:\n  {shortfall}");
    };
    assert_eq!(
        entry.missing.len(),
        missing,
        "Missing unit count mismatch for {dataset:?}:\n  Expected: {missing}\n  Actual: {:?}",
        entry.missing
    );
}

/// Assert that readers arrived grouped as `expected` dataset names, one name
/// per reader, in order.
///
/// # Panics
///
/// Panics if the sequences differ.
///
/// # Example
///
/// ```
/// use ironloop::testing::assert_dataset_sequence;
///
/// let readers = vec![("a".to_string(), 1), ("a".to_string(), 2), ("b".to_string(), 3)];
/// assert_dataset_sequence(&readers, &["a", "a", "b"]);
/// ```
pub fn assert_dataset_sequence<R>(readers: &[(String, R)], expected: &[&str]) {
    let actual: Vec<&str> = readers.iter().map(|(d, _)| d.as_str()).collect();
    assert_eq!(
        actual, expected,
        "Dataset sequence mismatch:\n  Expected: {expected:?}\n  Actual: {actual:?}"
    );
}

/// Assert that no tag occurs twice.
///
/// # Panics
///
/// Panics naming the first duplicate.
pub fn assert_distinct_ids(ids: &[TaskId]) {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        assert!(seen.insert(*id), "Duplicate tag {id} in {ids:?}");
    }
}
