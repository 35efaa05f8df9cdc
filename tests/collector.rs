use anyhow::Result;
use ironloop::collector::{Collector, DatasetCollector, MergeResults, MergingCollector};
use ironloop::reader::Reader;
use ironloop::testing::{CountingReader, Tally};
use std::collections::{BTreeMap, HashMap};

fn finished(items: &[u64]) -> CountingReader {
    let mut reader = CountingReader::default();
    for item in items {
        reader.read(item);
    }
    reader.end();
    reader
}

#[test]
fn dataset_collector_groups_in_first_seen_order() -> Result<()> {
    let mut collector = DatasetCollector::new();
    collector.add_reader("b", finished(&[1]));
    collector.add_reader("a", finished(&[2]));
    collector.add_reader("b", finished(&[3]));

    let groups = collector.collect()?;
    let names: Vec<&str> = groups.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["b", "a"]);
    let sums: Vec<u64> = groups[0].1.iter().map(|r| r.tally().sum).collect();
    assert_eq!(sums, [1, 3]);

    assert!(collector.collect()?.is_empty());
    Ok(())
}

#[test]
fn merging_collector_folds_per_dataset() -> Result<()> {
    let mut collector = MergingCollector::new();
    collector.add_reader("a", finished(&[1, 2]));
    collector.add_reader("a", finished(&[3]));
    collector.add_reader("b", finished(&[10]));
    // A reader that never ran contributes nothing.
    collector.add_reader("c", CountingReader::default());

    let merged: BTreeMap<String, Tally> = <MergingCollector<Tally> as Collector<CountingReader>>::collect(&mut collector)?;
    assert_eq!(merged.len(), 2);
    assert_eq!((merged["a"].items, merged["a"].sum), (3, 6));
    assert_eq!(merged["b"].sum, 10);
    assert!(!merged.contains_key("c"));
    Ok(())
}

#[test]
fn merge_results_for_std_types() {
    let mut n = 2u64;
    n.merge(3);
    assert_eq!(n, 5);

    let mut v = vec![1, 2];
    v.merge(vec![3]);
    assert_eq!(v, [1, 2, 3]);

    let mut bins: BTreeMap<&str, u64> = BTreeMap::from([("x", 1), ("y", 2)]);
    bins.merge(BTreeMap::from([("y", 5), ("z", 7)]));
    assert_eq!(bins, BTreeMap::from([("x", 1), ("y", 7), ("z", 7)]));

    let mut counts: HashMap<u8, f64> = HashMap::from([(1, 0.5)]);
    counts.merge(HashMap::from([(1, 0.25), (2, 1.0)]));
    assert_eq!(counts[&1], 0.75);
    assert_eq!(counts[&2], 1.0);
}
