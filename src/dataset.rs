//! Dataset plug-in contract, split policy and two built-in datasets.
//!
//! A [`Dataset`] knows its name and how to cut itself into independent
//! [`BatchSource`]s. Each source lazily enumerates one slice of the dataset.
//! Slices must be disjoint and, taken together, cover every item exactly
//! once. How fine to cut is decided by a [`SplitPolicy`] supplied from the
//! run configuration, not by the dataset.
//!
//! [`split_ranges`] implements the policy over an index space and is what
//! the built-in [`VecDataset`] and [`RangeDataset`] use. Custom datasets
//! backed by files or databases can reuse it over their own row counts.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;

/// A "next batch" producer for one slice of a dataset.
///
/// Returning `Ok(None)` ends the slice. An empty batch is allowed and simply
/// skipped by the executing unit.
pub trait BatchSource: Send + 'static {
    type Item;

    /// Produce the next batch of items, or `None` when the slice is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying data cannot be read. The unit is
    /// then dropped by the backend and reported as missing.
    fn next_batch(&mut self) -> Result<Option<Vec<Self::Item>>>;
}

/// A named dataset that can be split into independent slices.
pub trait Dataset {
    type Source: BatchSource;

    /// Stable name, used to route returned readers to the right collector bucket.
    fn name(&self) -> &str;

    /// Cut the dataset into slices according to `policy`.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset cannot be inspected (e.g. an unreadable index).
    fn split(&self, policy: &SplitPolicy) -> Result<Vec<Self::Source>>;
}

/// How many units a dataset may be cut into, and how large each may be.
///
/// `None` means unbounded. The default (both `None`) yields one unit per
/// non-empty dataset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitPolicy {
    pub max_units: Option<usize>,
    pub max_items_per_unit: Option<usize>,
}

impl SplitPolicy {
    #[must_use]
    pub const fn with_max_units(mut self, n: usize) -> Self {
        self.max_units = Some(n);
        self
    }

    #[must_use]
    pub const fn with_max_items_per_unit(mut self, n: usize) -> Self {
        self.max_items_per_unit = Some(n);
        self
    }
}

/// Cut `0..total` into contiguous, non-empty, disjoint ranges covering every index.
///
/// The unit size starts at `max_items_per_unit` (or `total`); if that would
/// produce more than `max_units` ranges the size grows so the cap holds.
/// No index is ever dropped.
///
/// ```
/// use ironloop::dataset::{split_ranges, SplitPolicy};
///
/// let policy = SplitPolicy::default().with_max_items_per_unit(4);
/// assert_eq!(split_ranges(10, &policy), vec![0..4, 4..8, 8..10]);
///
/// let capped = policy.with_max_units(2);
/// assert_eq!(split_ranges(10, &capped), vec![0..5, 5..10]);
/// ```
#[must_use]
pub fn split_ranges(total: usize, policy: &SplitPolicy) -> Vec<Range<usize>> {
    if total == 0 {
        return Vec::new();
    }
    let mut size = policy.max_items_per_unit.unwrap_or(total).max(1);
    if let Some(cap) = policy.max_units {
        let cap = cap.max(1);
        if total.div_ceil(size) > cap {
            size = total.div_ceil(cap);
        }
    }
    (0..total)
        .step_by(size)
        .map(|start| start..(start + size).min(total))
        .collect()
}

const DEFAULT_BATCH_SIZE: usize = 1024;

// ---------------------------------------------------------------------------
// In-memory dataset
// ---------------------------------------------------------------------------

/// Dataset over an in-memory vector.
///
/// Splitting copies each slice into its own [`VecSource`], so a unit never
/// borrows from the dataset and can be shipped to another thread or process.
#[derive(Clone, Debug)]
pub struct VecDataset<T> {
    name: String,
    items: Arc<Vec<T>>,
    batch_size: usize,
}

impl<T> VecDataset<T> {
    pub fn new(name: impl Into<String>, items: Vec<T>) -> Self {
        Self {
            name: name.into(),
            items: Arc::new(items),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Number of items handed to the reader per `next_batch` call.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Clone + Send + 'static> Dataset for VecDataset<T> {
    type Source = VecSource<T>;

    fn name(&self) -> &str {
        &self.name
    }

    fn split(&self, policy: &SplitPolicy) -> Result<Vec<VecSource<T>>> {
        Ok(split_ranges(self.items.len(), policy)
            .into_iter()
            .map(|r| VecSource {
                items: self.items[r].to_vec(),
                batch_size: self.batch_size,
                pos: 0,
            })
            .collect())
    }
}

/// One slice of a [`VecDataset`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VecSource<T> {
    items: Vec<T>,
    batch_size: usize,
    pos: usize,
}

impl<T: Clone + Send + 'static> BatchSource for VecSource<T> {
    type Item = T;

    fn next_batch(&mut self) -> Result<Option<Vec<T>>> {
        if self.pos >= self.items.len() {
            return Ok(None);
        }
        let end = (self.pos + self.batch_size).min(self.items.len());
        let batch = self.items[self.pos..end].to_vec();
        self.pos = end;
        Ok(Some(batch))
    }
}

// ---------------------------------------------------------------------------
// Integer range dataset
// ---------------------------------------------------------------------------

/// Dataset over the integers `start..end`, enumerated lazily.
#[derive(Clone, Debug)]
pub struct RangeDataset {
    name: String,
    range: Range<u64>,
    batch_size: usize,
}

impl RangeDataset {
    pub fn new(name: impl Into<String>, range: Range<u64>) -> Self {
        Self {
            name: name.into(),
            range,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

impl Dataset for RangeDataset {
    type Source = RangeSource;

    fn name(&self) -> &str {
        &self.name
    }

    fn split(&self, policy: &SplitPolicy) -> Result<Vec<RangeSource>> {
        let total = usize::try_from(self.range.end.saturating_sub(self.range.start))?;
        Ok(split_ranges(total, policy)
            .into_iter()
            .map(|r| RangeSource {
                next: self.range.start + r.start as u64,
                end: self.range.start + r.end as u64,
                batch_size: self.batch_size,
            })
            .collect())
    }
}

/// One slice of a [`RangeDataset`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RangeSource {
    next: u64,
    end: u64,
    batch_size: usize,
}

impl BatchSource for RangeSource {
    type Item = u64;

    fn next_batch(&mut self) -> Result<Option<Vec<u64>>> {
        if self.next >= self.end {
            return Ok(None);
        }
        let stop = self.end.min(self.next + self.batch_size as u64);
        let batch = (self.next..stop).collect();
        self.next = stop;
        Ok(Some(batch))
    }
}
