use anyhow::{Result, bail};
use ironloop::channel::ExecutionChannel;
use ironloop::collector::{DatasetCollector, MergingCollector};
use ironloop::dataset::{RangeDataset, RangeSource, SplitPolicy};
use ironloop::error::DispatchError;
use ironloop::reader::Reader;
use ironloop::runner::TaskRunner;
use ironloop::sequential::SequentialChannel;
use ironloop::task_id::TaskId;
use ironloop::testing::{
    CountingReader, Delivery, RecordingMonitor, ScriptedChannel, Tally, assert_complete, assert_dataset_sequence,
    assert_distinct_ids, assert_shortfall_for,
};
use ironloop::unit::{ResultEnvelope, WorkUnit};

fn tens() -> SplitPolicy {
    SplitPolicy::default().with_max_items_per_unit(10)
}

fn forged(raw: u64) -> Result<TaskId> {
    Ok(serde_json::from_str(&raw.to_string())?)
}

fn dispatch_error(err: &anyhow::Error) -> &DispatchError {
    err.downcast_ref::<DispatchError>()
        .unwrap_or_else(|| panic!("expected a DispatchError, got: {err:#}"))
}

#[test]
fn out_of_order_results_reach_collector_in_submission_order() -> Result<()> {
    let channel = ScriptedChannel::new(Delivery::Permuted(vec![1, 0, 2]));
    let mut runner = TaskRunner::new(CountingReader::default(), DatasetCollector::new(), channel)
        .with_split_policy(tens());

    runner.begin()?;
    assert_eq!(runner.run(&RangeDataset::new("A", 0..30))?, 3);
    let outcome = runner.end()?;

    assert_complete(&outcome);
    assert_eq!(outcome.output.len(), 1);
    let (name, readers) = &outcome.output[0];
    assert_eq!(name, "A");
    let sums: Vec<u64> = readers.iter().map(|r| r.tally().sum).collect();
    assert_eq!(sums, vec![45, 145, 245]);
    Ok(())
}

#[test]
fn reversed_delivery_merges_like_in_order() -> Result<()> {
    let mut merged = Vec::new();
    for delivery in [Delivery::InOrder, Delivery::Reversed] {
        let mut runner = TaskRunner::new(
            CountingReader::default(),
            MergingCollector::new(),
            ScriptedChannel::new(delivery),
        )
        .with_split_policy(tens());
        runner.begin()?;
        runner.run(&RangeDataset::new("A", 0..55))?;
        runner.run(&RangeDataset::new("B", 100..120))?;
        merged.push(runner.end()?.output);
    }
    assert_eq!(merged[0], merged[1]);
    assert_eq!(
        merged[0]["A"],
        Tally {
            items: 55,
            sum: (0..55).sum(),
            units: 6
        }
    );
    Ok(())
}

#[test]
fn lost_unit_skips_only_its_dataset() -> Result<()> {
    // Positions 0-1 belong to A, 2-3 to B.
    let channel = ScriptedChannel::new(Delivery::InOrder).dropping([3]);
    let mut runner = TaskRunner::new(CountingReader::default(), MergingCollector::new(), channel)
        .with_split_policy(tens());

    runner.begin()?;
    runner.run(&RangeDataset::new("A", 0..20))?;
    runner.run(&RangeDataset::new("B", 0..20))?;
    let outcome = runner.end()?;

    assert!(!outcome.is_complete());
    assert_shortfall_for(&outcome, "B", 1);
    let shortfall = outcome.shortfall.as_ref().expect("shortfall");
    assert_eq!((shortfall.sent, shortfall.returned), (4, 3));
    assert!(!shortfall.affects("A"));
    assert!(
        shortfall
            .to_string()
            .starts_with("the same number of readers were not returned")
    );

    assert_eq!(outcome.output.len(), 1);
    assert_eq!(outcome.output["A"].items, 20);
    assert!(!outcome.output.contains_key("B"));
    Ok(())
}

#[test]
fn every_result_lost_still_terminates() -> Result<()> {
    let channel = ScriptedChannel::new(Delivery::InOrder).dropping([0, 1, 2]);
    let mut runner = TaskRunner::new(CountingReader::default(), MergingCollector::new(), channel)
        .with_split_policy(tens());

    runner.begin()?;
    runner.run(&RangeDataset::new("A", 0..30))?;
    let outcome = runner.end()?;

    assert_shortfall_for(&outcome, "A", 3);
    assert!(outcome.output.is_empty());
    Ok(())
}

#[test]
fn tags_are_distinct_across_datasets() -> Result<()> {
    let mut runner = TaskRunner::new(
        CountingReader::default(),
        DatasetCollector::<CountingReader>::new(),
        ScriptedChannel::new(Delivery::InOrder),
    )
    .with_split_policy(tens());

    runner.begin()?;
    let mut total = 0;
    for (i, name) in ["x", "y", "z"].iter().enumerate() {
        total += runner.run(&RangeDataset::new(*name, 0..(10 * (i as u64 + 2))))?;
    }
    assert_eq!(total, 2 + 3 + 4);

    let associations = runner.session().expect("session").associations().to_vec();
    let ids: Vec<TaskId> = associations.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids.len(), total);
    assert_distinct_ids(&ids);
    assert_eq!(runner.channel().submitted(), associations.as_slice());

    let reconciliation = runner.reconcile()?;
    assert!(reconciliation.is_complete());
    assert_dataset_sequence(
        &reconciliation.readers,
        &["x", "x", "y", "y", "y", "z", "z", "z", "z"],
    );
    Ok(())
}

#[test]
fn unknown_tag_is_a_protocol_mismatch() -> Result<()> {
    let bogus = forged(9_999)?;
    let mut channel = ScriptedChannel::new(Delivery::InOrder);
    channel.inject(ResultEnvelope {
        id: bogus,
        results: Tally::default(),
    });
    let mut runner = TaskRunner::new(CountingReader::default(), MergingCollector::new(), channel);

    runner.begin()?;
    runner.run(&RangeDataset::new("A", 0..5))?;
    let err = runner.end().expect_err("forged tag must be rejected");
    assert!(matches!(dispatch_error(&err), DispatchError::ProtocolMismatch { id } if *id == bogus));
    assert!(runner.session().is_none());
    Ok(())
}

#[test]
fn second_result_for_a_tag_is_a_protocol_mismatch() -> Result<()> {
    let first = forged(0)?;
    let mut channel = ScriptedChannel::new(Delivery::InOrder);
    channel.inject(ResultEnvelope {
        id: first,
        results: Tally::default(),
    });
    let mut runner = TaskRunner::new(CountingReader::default(), MergingCollector::new(), channel)
        .with_split_policy(tens());

    runner.begin()?;
    runner.run(&RangeDataset::new("A", 0..20))?;
    let err = runner.end().expect_err("duplicate tag must be rejected");
    assert!(matches!(dispatch_error(&err), DispatchError::ProtocolMismatch { id } if *id == first));
    Ok(())
}

#[test]
fn session_lifecycle_is_enforced() -> Result<()> {
    let mut runner = TaskRunner::new(
        CountingReader::default(),
        MergingCollector::new(),
        SequentialChannel::new(),
    );

    let err = runner.run(&RangeDataset::new("A", 0..5)).expect_err("run before begin");
    assert!(matches!(dispatch_error(&err), DispatchError::SessionNotStarted));
    let err = runner.end().expect_err("end before begin");
    assert!(matches!(dispatch_error(&err), DispatchError::SessionNotStarted));

    runner.begin()?;
    let err = runner.begin().expect_err("nested begin");
    assert!(matches!(dispatch_error(&err), DispatchError::SessionActive));

    runner.run(&RangeDataset::new("A", 0..5))?;
    runner.end()?;
    let err = runner.end().expect_err("end twice");
    assert!(matches!(dispatch_error(&err), DispatchError::SessionNotStarted));
    Ok(())
}

#[test]
fn sessions_start_from_a_clean_slate() -> Result<()> {
    let mut runner = TaskRunner::new(
        CountingReader::default(),
        MergingCollector::new(),
        SequentialChannel::new(),
    )
    .with_split_policy(tens());

    runner.begin()?;
    runner.run(&RangeDataset::new("first", 0..30))?;
    let first = runner.end()?;

    runner.begin()?;
    runner.run(&RangeDataset::new("second", 0..10))?;
    let ids: Vec<TaskId> = runner
        .session()
        .expect("session")
        .associations()
        .iter()
        .map(|(id, _)| *id)
        .collect();
    let second = runner.end()?;

    assert_eq!(ids, vec![forged(0)?]);
    assert_eq!(first.output.keys().collect::<Vec<_>>(), vec!["first"]);
    assert_eq!(second.output.keys().collect::<Vec<_>>(), vec!["second"]);
    Ok(())
}

#[test]
fn template_reader_is_never_mutated() -> Result<()> {
    let mut runner = TaskRunner::new(
        CountingReader::default(),
        DatasetCollector::new(),
        SequentialChannel::new(),
    )
    .with_split_policy(tens());

    runner.begin()?;
    runner.run(&RangeDataset::new("A", 0..50))?;
    let outcome = runner.end()?;

    assert_eq!(*runner.reader(), CountingReader::default());
    assert!(runner.reader().results().is_none());
    // Each clone only saw its own slice.
    assert!(outcome.output[0].1.iter().all(|r| r.tally().items == 10));
    Ok(())
}

#[test]
fn monitor_last_runs_exactly_once() -> Result<()> {
    let recorder = RecordingMonitor::new();
    let mut runner = TaskRunner::new(
        CountingReader::default(),
        MergingCollector::new(),
        ScriptedChannel::new(Delivery::Reversed),
    )
    .with_split_policy(tens())
    .with_monitor(Box::new(recorder.clone()));

    runner.begin()?;
    runner.run(&RangeDataset::new("A", 0..40))?;
    runner.end()?;

    let log = recorder.log();
    assert_eq!(log.last_calls, 1);
    assert!(log.monitor_calls >= 4);
    assert_eq!(log.reports[0].completed, 0);
    let last = log.final_report.expect("final report");
    assert_eq!((last.total, last.completed), (4, 4));
    Ok(())
}

#[test]
fn monitor_last_runs_once_on_shortfall() -> Result<()> {
    let recorder = RecordingMonitor::new();
    let mut runner = TaskRunner::new(
        CountingReader::default(),
        MergingCollector::new(),
        ScriptedChannel::new(Delivery::InOrder).dropping([0]),
    )
    .with_split_policy(tens())
    .with_monitor(Box::new(recorder.clone()));

    runner.begin()?;
    runner.run(&RangeDataset::new("A", 0..20))?;
    runner.end()?;

    let log = recorder.log();
    assert_eq!(log.last_calls, 1);
    let last = log.final_report.expect("final report");
    assert_eq!((last.total, last.completed), (2, 1));
    Ok(())
}

#[test]
fn empty_dataset_submits_nothing() -> Result<()> {
    let recorder = RecordingMonitor::new();
    let mut runner = TaskRunner::new(
        CountingReader::default(),
        MergingCollector::new(),
        SequentialChannel::new(),
    )
    .with_monitor(Box::new(recorder.clone()));

    runner.begin()?;
    assert_eq!(runner.run(&RangeDataset::new("empty", 0..0))?, 0);
    let outcome = runner.end()?;

    assert_complete(&outcome);
    assert!(outcome.output.is_empty());
    assert_eq!(recorder.log().monitor_calls, 0);
    assert_eq!(recorder.log().last_calls, 1);
    Ok(())
}

/// Runs units in place but refuses every put after the first `accept`.
struct FullAfter {
    accept: usize,
    inner: SequentialChannel<Tally>,
}

impl ExecutionChannel<RangeSource, CountingReader> for FullAfter {
    fn put(&mut self, unit: WorkUnit<RangeSource, CountingReader>) -> Result<()> {
        if self.accept == 0 {
            bail!("queue full");
        }
        self.accept -= 1;
        ExecutionChannel::<RangeSource, CountingReader>::put(&mut self.inner, unit)
    }

    fn poll(&mut self) -> Result<Option<ResultEnvelope<Tally>>> {
        ExecutionChannel::<RangeSource, CountingReader>::poll(&mut self.inner)
    }

    fn is_exhausted(&self) -> bool {
        ExecutionChannel::<RangeSource, CountingReader>::is_exhausted(&self.inner)
    }
}

#[test]
fn partly_submitted_dataset_is_a_shortfall() -> Result<()> {
    let channel = FullAfter {
        accept: 1,
        inner: SequentialChannel::new(),
    };
    let mut runner = TaskRunner::new(CountingReader::default(), MergingCollector::new(), channel)
        .with_split_policy(tens());

    runner.begin()?;
    let err = runner
        .run(&RangeDataset::new("A", 0..30))
        .expect_err("second put is refused");
    assert!(format!("{err:#}").contains("queue full"));
    let outcome = runner.end()?;

    assert_shortfall_for(&outcome, "A", 2);
    assert!(!outcome.output.contains_key("A"));
    let shortfall = outcome.shortfall.expect("shortfall");
    assert_eq!((shortfall.sent, shortfall.returned), (3, 1));
    assert!(shortfall.to_string().contains("3 sent, 1 returned; skipping incomplete datasets"));
    Ok(())
}
