//! Readers for exercising runners and backends.

use crate::collector::MergeResults;
use crate::reader::Reader;
use crate::unit::UnitContext;
use serde::{Deserialize, Serialize};

/// What a [`CountingReader`] accumulates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    /// Items read.
    pub items: u64,
    /// Sum of the items read.
    pub sum: u64,
    /// Units that contributed to this tally.
    pub units: u64,
}

impl MergeResults for Tally {
    fn merge(&mut self, other: Self) {
        self.items += other.items;
        self.sum += other.sum;
        self.units += other.units;
    }
}

/// Counts and sums `u64` items.
///
/// Results are a [`Tally`]. A reader built with
/// [`panicking_on`](Self::panicking_on) panics when it reads that item,
/// which is how tests simulate a unit that dies mid-run.
///
/// # Example
///
/// ```
/// use ironloop::reader::Reader;
/// use ironloop::testing::CountingReader;
///
/// let mut reader = CountingReader::default();
/// reader.read(&3);
/// reader.read(&4);
/// let tally = reader.end();
/// assert_eq!((tally.items, tally.sum), (2, 7));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountingReader {
    running: Tally,
    results: Option<Tally>,
    panic_on: Option<u64>,
}

impl CountingReader {
    #[must_use]
    pub fn panicking_on(item: u64) -> Self {
        Self {
            panic_on: Some(item),
            ..Self::default()
        }
    }

    /// Installed or produced results, or an empty tally.
    #[must_use]
    pub fn tally(&self) -> Tally {
        self.results.unwrap_or_default()
    }
}

impl Reader for CountingReader {
    type Item = u64;
    type Results = Tally;

    fn begin(&mut self, _ctx: &UnitContext) {
        self.running = Tally {
            units: 1,
            ..Tally::default()
        };
    }

    fn read(&mut self, item: &u64) {
        if self.panic_on == Some(*item) {
            panic!("CountingReader told to fail on item {item}");
        }
        self.running.items += 1;
        self.running.sum += *item;
    }

    fn end(&mut self) -> Tally {
        self.results = Some(self.running);
        self.running
    }

    fn set_results(&mut self, results: Tally) {
        self.results = Some(results);
    }

    fn results(&self) -> Option<&Tally> {
        self.results.as_ref()
    }
}
