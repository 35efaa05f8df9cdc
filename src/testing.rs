//! Testing utilities for readers, backends and runners.
//!
//! - **Readers**: [`CountingReader`] tallies `u64` items and can be told to
//!   panic on a given item to simulate a crashing unit
//! - **Channels**: [`ScriptedChannel`] delivers results in a chosen order,
//!   drops some, or injects forged envelopes
//! - **Monitors**: [`RecordingMonitor`] remembers every call it receives
//! - **Assertions**: helpers that check reconciliation outcomes
//! - **Scratch space**: [`scratch_dir`] for dropbox working areas
//!
//! # Quick Start
//!
//! ```
//! use ironloop::*;
//! use ironloop::testing::*;
//! # fn main() -> anyhow::Result<()> {
//!
//! let channel = ScriptedChannel::new(Delivery::Reversed);
//! let mut runner = TaskRunner::new(CountingReader::default(), DatasetCollector::new(), channel)
//!     .with_split_policy(SplitPolicy::default().with_max_items_per_unit(10));
//!
//! runner.begin()?;
//! runner.run(&RangeDataset::new("a", 0..30))?;
//! let outcome = runner.end()?;
//!
//! assert_complete(&outcome);
//! let sums: Vec<u64> = outcome.output[0].1.iter().map(|r| r.tally().sum).collect();
//! assert_eq!(sums, vec![45, 145, 245]);
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod channels;
pub mod monitors;
pub mod readers;

#[cfg(feature = "dropbox")]
pub mod dispatchers;

// Re-export commonly used items
pub use assertions::*;
pub use channels::*;
pub use monitors::*;
pub use readers::*;

#[cfg(feature = "dropbox")]
pub use dispatchers::*;

use anyhow::{Context, Result};
use tempfile::TempDir;

/// A temporary directory removed when dropped, for working areas in tests.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn scratch_dir() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix("ironloop-")
        .tempdir()
        .context("failed to create scratch directory")
}
