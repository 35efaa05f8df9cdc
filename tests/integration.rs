// tests/integration.rs

use anyhow::Result;
use ironloop::testing::{CountingReader, RecordingMonitor, Tally, assert_complete, assert_dataset_sequence};
use ironloop::*;
use std::collections::BTreeMap;

fn datasets() -> Vec<RangeDataset> {
    vec![
        RangeDataset::new("empty", 7..7),
        RangeDataset::new("tiny", 0..3),
        RangeDataset::new("odd", 13..1_013).with_batch_size(17),
        RangeDataset::new("big", 0..250_000),
    ]
}

fn expected() -> BTreeMap<String, Tally> {
    let mut out = BTreeMap::new();
    for (name, range) in [("tiny", 0..3u64), ("odd", 13..1_013), ("big", 0..250_000)] {
        let items = range.end - range.start;
        out.insert(
            name.to_string(),
            Tally {
                items,
                sum: range.sum(),
                units: 0,
            },
        );
    }
    out
}

fn without_units(mut merged: BTreeMap<String, Tally>) -> BTreeMap<String, Tally> {
    for tally in merged.values_mut() {
        tally.units = 0;
    }
    merged
}

fn everything_through(config: &ParallelConfig) -> Result<BTreeMap<String, Tally>> {
    #[cfg(feature = "dropbox")]
    let parallel = build_parallel::<dataset::RangeSource, CountingReader>(config)?;
    #[cfg(not(feature = "dropbox"))]
    let parallel = build_local::<dataset::RangeSource, CountingReader>(config)?;

    let recorder = RecordingMonitor::new();
    let mut runner = parallel
        .into_runner(CountingReader::default(), MergingCollector::new())
        .with_monitor(Box::new(recorder.clone()));

    runner.begin()?;
    let mut submitted = 0;
    for dataset in datasets() {
        submitted += runner.run(&dataset)?;
    }
    let outcome = runner.end()?;

    assert_complete(&outcome);
    let log = recorder.log();
    assert_eq!(log.last_calls, 1);
    assert_eq!(log.final_report.map(|r| r.completed), Some(submitted));
    assert_eq!(
        outcome.output.values().map(|t| t.units).sum::<u64>(),
        submitted as u64
    );
    Ok(without_units(outcome.output))
}

#[test]
fn every_backend_agrees() -> Result<()> {
    let tmp = ironloop::testing::scratch_dir()?;
    let mut modes = vec![ParallelMode::Sequential, ParallelMode::Pool];
    if cfg!(feature = "dropbox") {
        modes.push(ParallelMode::Threads);
    }

    for mode in modes {
        let mut config = ParallelConfig {
            mode,
            processes: 3,
            poll_interval_ms: 5,
            working_dir: tmp.path().to_path_buf(),
            ..ParallelConfig::default()
        };
        config.split.max_units = Some(6);
        config.split.max_items_per_unit = Some(20_000);

        assert_eq!(everything_through(&config)?, expected(), "mode {mode}");
    }
    Ok(())
}

#[test]
fn readers_return_grouped_by_submission() -> Result<()> {
    let mut runner = TaskRunner::new(
        CountingReader::default(),
        DatasetCollector::<CountingReader>::new(),
        PoolChannel::new(4)?,
    )
    .with_split_policy(SplitPolicy::default().with_max_items_per_unit(100));

    runner.begin()?;
    runner.run(&RangeDataset::new("first", 0..250))?;
    runner.run(&RangeDataset::new("second", 0..100))?;
    runner.run(&RangeDataset::new("first", 1_000..1_050))?;
    let reconciliation = runner.reconcile()?;

    assert!(reconciliation.is_complete());
    assert_dataset_sequence(&reconciliation.readers, &["first", "first", "first", "second", "first"]);
    let sums: Vec<u64> = reconciliation.readers.iter().map(|(_, r)| r.tally().sum).collect();
    let expected: Vec<u64> = vec![
        (0..100).sum(),
        (100..200).sum(),
        (200..250).sum(),
        (0..100).sum(),
        (1_000..1_050).sum(),
    ];
    assert_eq!(sums, expected);
    Ok(())
}
