use anyhow::Result;
use ironloop::dataset::{BatchSource, Dataset, RangeDataset, SplitPolicy, VecDataset, split_ranges};
use ironloop::units::UnitBuilder;

fn drain<S: BatchSource>(mut source: S) -> Result<Vec<S::Item>> {
    let mut out = Vec::new();
    while let Some(batch) = source.next_batch()? {
        out.extend(batch);
    }
    Ok(out)
}

#[test]
fn split_ranges_cover_every_index_once() {
    let policies = [
        SplitPolicy::default(),
        SplitPolicy::default().with_max_items_per_unit(1),
        SplitPolicy::default().with_max_items_per_unit(7),
        SplitPolicy::default().with_max_units(3),
        SplitPolicy::default().with_max_units(3).with_max_items_per_unit(2),
        SplitPolicy::default().with_max_units(100).with_max_items_per_unit(100),
    ];
    for total in [1usize, 2, 10, 99, 1000] {
        for policy in &policies {
            let ranges = split_ranges(total, policy);
            let mut next = 0;
            for r in &ranges {
                assert_eq!(r.start, next, "gap or overlap for total={total} {policy:?}");
                assert!(r.end > r.start, "empty range for total={total} {policy:?}");
                next = r.end;
            }
            assert_eq!(next, total, "not exhaustive for total={total} {policy:?}");
            if let Some(cap) = policy.max_units {
                assert!(ranges.len() <= cap, "cap exceeded for total={total} {policy:?}");
            }
            if let (Some(size), None) = (policy.max_items_per_unit, policy.max_units) {
                assert!(ranges.iter().all(|r| r.len() <= size));
            }
        }
    }
}

#[test]
fn default_policy_makes_one_unit() {
    assert_eq!(split_ranges(42, &SplitPolicy::default()), vec![0..42]);
}

#[test]
fn empty_dataset_makes_no_units() -> Result<()> {
    assert!(split_ranges(0, &SplitPolicy::default().with_max_units(4)).is_empty());
    let sources = RangeDataset::new("empty", 5..5).split(&SplitPolicy::default())?;
    assert!(sources.is_empty());
    Ok(())
}

#[test]
fn max_units_wins_over_item_size() {
    let policy = SplitPolicy::default().with_max_units(2).with_max_items_per_unit(3);
    assert_eq!(split_ranges(10, &policy), vec![0..5, 5..10]);
}

#[test]
fn range_sources_yield_their_slice_in_batches() -> Result<()> {
    let dataset = RangeDataset::new("r", 100..125).with_batch_size(4);
    let policy = SplitPolicy::default().with_max_items_per_unit(10);
    let sources = dataset.split(&policy)?;
    assert_eq!(sources.len(), 3);

    let mut all = Vec::new();
    for source in sources {
        all.extend(drain(source)?);
    }
    assert_eq!(all, (100..125).collect::<Vec<u64>>());
    Ok(())
}

#[test]
fn vec_sources_preserve_items() -> Result<()> {
    let words: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|s| (*s).to_string()).collect();
    let dataset = VecDataset::new("words", words.clone()).with_batch_size(2);
    assert_eq!(dataset.len(), 5);
    assert!(!dataset.is_empty());

    let sources = UnitBuilder::new(SplitPolicy::default().with_max_items_per_unit(3)).build(&dataset)?;
    assert_eq!(sources.len(), 2);
    let mut all = Vec::new();
    for source in sources {
        all.extend(drain(source)?);
    }
    assert_eq!(all, words);
    Ok(())
}
