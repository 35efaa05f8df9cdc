use anyhow::Result;
use ironloop::channel::ExecutionChannel;
use ironloop::collector::MergingCollector;
use ironloop::dataset::{RangeDataset, RangeSource, SplitPolicy, VecDataset};
use ironloop::pool::PoolChannel;
use ironloop::runner::TaskRunner;
use ironloop::sequential::SequentialChannel;
use ironloop::testing::{CountingReader, Tally, assert_complete, assert_shortfall_for};
use std::collections::BTreeMap;
use std::time::Duration;

fn run_all<Ch>(channel: Ch) -> Result<BTreeMap<String, Tally>>
where
    Ch: ExecutionChannel<RangeSource, CountingReader>,
{
    let mut runner = TaskRunner::new(CountingReader::default(), MergingCollector::new(), channel)
        .with_split_policy(SplitPolicy::default().with_max_items_per_unit(1_000));
    runner.begin()?;
    runner.run(&RangeDataset::new("small", 0..10))?;
    runner.run(&RangeDataset::new("medium", 500..12_345))?;
    runner.run(&RangeDataset::new("large", 0..100_000).with_batch_size(333))?;
    let outcome = runner.end()?;
    assert_complete(&outcome);
    Ok(outcome.output)
}

#[test]
fn sequential_and_pool_merge_identically() -> Result<()> {
    let sequential = run_all(SequentialChannel::new())?;
    let pool = run_all(PoolChannel::new(4)?)?;
    let single = run_all(PoolChannel::new(1)?)?;

    assert_eq!(sequential, pool);
    assert_eq!(sequential, single);
    assert_eq!(sequential["large"].items, 100_000);
    assert_eq!(sequential["large"].units, 100);
    assert_eq!(sequential["medium"].sum, (500..12_345u64).sum::<u64>());
    Ok(())
}

#[test]
fn pool_rejects_zero_workers() {
    assert!(PoolChannel::<Tally>::new(0).is_err());
}

#[test]
fn panicking_unit_becomes_a_shortfall() -> Result<()> {
    let channel = PoolChannel::new(2)?.with_poll_interval(Duration::from_millis(5));
    let mut runner = TaskRunner::new(CountingReader::panicking_on(15), MergingCollector::new(), channel)
        .with_split_policy(SplitPolicy::default().with_max_items_per_unit(10));

    runner.begin()?;
    runner.run(&RangeDataset::new("ok", 100..130))?;
    runner.run(&RangeDataset::new("bad", 0..30))?;
    let outcome = runner.end()?;

    assert_shortfall_for(&outcome, "bad", 1);
    assert_eq!(outcome.output["ok"].items, 30);
    assert!(!outcome.output.contains_key("bad"));
    assert_eq!(runner.channel().lost(), 1);
    assert_eq!(runner.channel().in_flight(), 0);
    Ok(())
}

#[test]
fn panicking_unit_on_sequential_becomes_a_shortfall() -> Result<()> {
    let mut runner = TaskRunner::new(
        CountingReader::panicking_on(15),
        MergingCollector::new(),
        SequentialChannel::new(),
    )
    .with_split_policy(SplitPolicy::default().with_max_items_per_unit(10));

    runner.begin()?;
    assert_eq!(runner.run(&RangeDataset::new("bad", 0..30))?, 3);
    runner.run(&RangeDataset::new("ok", 100..130))?;
    let outcome = runner.end()?;

    assert_shortfall_for(&outcome, "bad", 1);
    assert_eq!(outcome.output["ok"].items, 30);
    assert!(!outcome.output.contains_key("bad"));
    assert_eq!(runner.channel().lost(), 1);
    Ok(())
}

#[test]
fn pool_channel_reports_every_unit() -> Result<()> {
    let mut runner = TaskRunner::new(
        CountingReader::default(),
        MergingCollector::new(),
        PoolChannel::new(3)?,
    )
    .with_split_policy(SplitPolicy::default().with_max_units(16).with_max_items_per_unit(1));

    runner.begin()?;
    let units = runner.run(&VecDataset::new("v", (1..=64u64).collect()))?;
    let outcome = runner.end()?;

    assert_eq!(units, 16);
    assert_complete(&outcome);
    assert_eq!(outcome.output["v"].sum, (1..=64u64).sum::<u64>());
    assert_eq!(outcome.output["v"].units, 16);
    Ok(())
}

#[test]
fn sequential_failure_is_counted_as_lost() -> Result<()> {
    use anyhow::bail;
    use ironloop::dataset::{BatchSource, Dataset};

    #[derive(Clone)]
    struct Broken;

    impl BatchSource for Broken {
        type Item = u64;

        fn next_batch(&mut self) -> Result<Option<Vec<u64>>> {
            bail!("disk on fire")
        }
    }

    struct BrokenDataset;

    impl Dataset for BrokenDataset {
        type Source = Broken;

        fn name(&self) -> &str {
            "broken"
        }

        fn split(&self, _policy: &SplitPolicy) -> Result<Vec<Broken>> {
            Ok(vec![Broken, Broken])
        }
    }

    let mut runner = TaskRunner::new(
        CountingReader::default(),
        MergingCollector::new(),
        SequentialChannel::new(),
    );
    runner.begin()?;
    assert_eq!(runner.run(&BrokenDataset)?, 2);
    let outcome = runner.end()?;

    assert_shortfall_for(&outcome, "broken", 2);
    assert_eq!(runner.channel().lost(), 2);
    Ok(())
}
