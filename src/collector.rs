//! Collectors: where reconciled readers end up.
//!
//! The runner calls [`Collector::add_reader`] once per reconciled reader of a
//! fully reconciled dataset, in submission order, then
//! [`Collector::collect`] once. Datasets with missing units never reach the
//! collector.
//!
//! Two collectors ship with the crate:
//!
//! - [`DatasetCollector`] hands the readers back grouped by dataset
//! - [`MergingCollector`] folds each dataset's results into one value with
//!   [`MergeResults`]

use crate::reader::Reader;
use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use tracing::warn;

/// Receives reconciled readers and produces the final artifact.
pub trait Collector<R> {
    type Output;

    fn add_reader(&mut self, dataset: &str, reader: R);

    /// Produce the merged artifact.
    ///
    /// Meant to be called once per session; collectors may drain their state.
    ///
    /// # Errors
    ///
    /// Returns an error if the merge strategy fails.
    fn collect(&mut self) -> Result<Self::Output>;
}

/// Groups readers by dataset, datasets in first-seen order.
#[derive(Debug)]
pub struct DatasetCollector<R> {
    groups: Vec<(String, Vec<R>)>,
}

impl<R> Default for DatasetCollector<R> {
    fn default() -> Self {
        Self { groups: Vec::new() }
    }
}

impl<R> DatasetCollector<R> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R> Collector<R> for DatasetCollector<R> {
    type Output = Vec<(String, Vec<R>)>;

    fn add_reader(&mut self, dataset: &str, reader: R) {
        match self.groups.iter_mut().find(|(name, _)| name == dataset) {
            Some((_, readers)) => readers.push(reader),
            None => self.groups.push((dataset.to_string(), vec![reader])),
        }
    }

    fn collect(&mut self) -> Result<Self::Output> {
        Ok(std::mem::take(&mut self.groups))
    }
}

/// Results that can absorb the results of a sibling unit.
pub trait MergeResults {
    fn merge(&mut self, other: Self);
}

macro_rules! impl_merge_add {
    ($($t:ty),* $(,)?) => {
        $(
            impl MergeResults for $t {
                fn merge(&mut self, other: Self) {
                    *self += other;
                }
            }
        )*
    };
}

impl_merge_add!(u32, u64, usize, i32, i64, f32, f64);

impl<T> MergeResults for Vec<T> {
    fn merge(&mut self, other: Self) {
        self.extend(other);
    }
}

impl<K: Ord, V: MergeResults> MergeResults for BTreeMap<K, V> {
    fn merge(&mut self, other: Self) {
        for (k, v) in other {
            match self.get_mut(&k) {
                Some(existing) => existing.merge(v),
                None => {
                    self.insert(k, v);
                }
            }
        }
    }
}

impl<K: Eq + Hash, V: MergeResults> MergeResults for HashMap<K, V> {
    fn merge(&mut self, other: Self) {
        for (k, v) in other {
            match self.get_mut(&k) {
                Some(existing) => existing.merge(v),
                None => {
                    self.insert(k, v);
                }
            }
        }
    }
}

/// Folds every dataset's reader results into a single value per dataset.
///
/// `collect` drains the collector: a second call returns an empty map.
#[derive(Debug)]
pub struct MergingCollector<T> {
    merged: BTreeMap<String, T>,
}

impl<T> Default for MergingCollector<T> {
    fn default() -> Self {
        Self {
            merged: BTreeMap::new(),
        }
    }
}

impl<T> MergingCollector<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R> Collector<R> for MergingCollector<R::Results>
where
    R: Reader,
    R::Results: MergeResults + Clone,
{
    type Output = BTreeMap<String, R::Results>;

    fn add_reader(&mut self, dataset: &str, reader: R) {
        let Some(results) = reader.results().cloned() else {
            warn!(dataset, "reader returned without results; skipping");
            return;
        };
        match self.merged.get_mut(dataset) {
            Some(existing) => existing.merge(results),
            None => {
                self.merged.insert(dataset.to_string(), results);
            }
        }
    }

    fn collect(&mut self) -> Result<Self::Output> {
        Ok(std::mem::take(&mut self.merged))
    }
}
