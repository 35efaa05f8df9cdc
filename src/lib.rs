//! # Ironloop
//!
//! A **task dispatch and collection engine** for Rust. Ironloop splits named
//! datasets into independent work units, runs a private clone of your reader
//! over each unit on a pluggable backend, pairs every result with its
//! submission by identity, and merges the reconciled readers into one
//! artifact.
//!
//! ## Key Features
//!
//! - **Reader plug-ins** - any `Clone` type implementing [`Reader`]
//! - **Configurable splitting** - cap units per dataset or items per unit with [`SplitPolicy`]
//! - **Pluggable backends** - in-process, thread pool, or task packages on disk
//! - **Identity-based reconciliation** - completion order never matters
//! - **Partial results** - lost units are reported, complete datasets still merge
//! - **Resumable remote sessions** - a working area can be reopened by another process
//!
//! ## Quick Start
//!
//! ```
//! use ironloop::*;
//! use ironloop::testing::CountingReader;
//! # fn main() -> anyhow::Result<()> {
//!
//! let mut runner = TaskRunner::new(
//!     CountingReader::default(),
//!     MergingCollector::new(),
//!     PoolChannel::new(4)?,
//! )
//! .with_split_policy(SplitPolicy::default().with_max_items_per_unit(5_000));
//!
//! runner.begin()?;
//! runner.run(&RangeDataset::new("small", 0..1_000))?;
//! runner.run(&RangeDataset::new("large", 0..100_000))?;
//! let outcome = runner.end()?;
//!
//! assert!(outcome.is_complete());
//! assert_eq!(outcome.output["large"].items, 100_000);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Datasets and units
//!
//! A [`Dataset`] has a name and can be cut into [`BatchSource`]s according to
//! a [`SplitPolicy`]. Each source plus one reader clone becomes a
//! [`WorkUnit`] tagged with a session-unique [`TaskId`].
//!
//! ### Channels
//!
//! An [`ExecutionChannel`] accepts units and hands back [`ResultEnvelope`]s:
//!
//! - [`SequentialChannel`] - runs each unit inside `put`
//! - [`PoolChannel`] - fixed pool of worker threads
//! - [`DropboxChannel`](dropbox::DropboxChannel) - task packages in a working
//!   area, run by subprocesses or local threads (feature: `dropbox`)
//!
//! ### Runner
//!
//! [`TaskRunner`] owns the session: `begin`, any number of `run`s, then
//! `end`. The [`ProgressMonitor`] is refreshed while results are awaited and
//! the [`Collector`] receives reconciled readers in submission order.
//!
//! ### Configuration
//!
//! [`ParallelConfig`] (JSON or code) selects the backend; [`build_local`] and
//! `build_parallel` turn it into a channel, a monitor and a split policy.
//!
//! ## Feature Flags
//!
//! - `dropbox` (default) - store-and-forward backend with `postcard` packages
//!   and SHA-256 checksums
//!
//! ## Logging
//!
//! Everything is logged through `tracing`. Install any subscriber to see it;
//! unit-level events are at `debug`, session summaries at `info`, lost units
//! and shortfalls at `warn`.
//!
//! ## Module Overview
//!
//! - [`reader`] / [`dataset`] - plug-in contracts
//! - [`units`] / [`unit`] - splitting and the unit of work
//! - [`channel`], [`sequential`], [`pool`], `dropbox` - backends
//! - [`runner`] / [`session`] - submission and reconciliation
//! - [`progress`] / [`collector`] - observation and merging
//! - [`config`] / [`build`] - configuration
//! - [`testing`] - helpers for testing readers and backends

pub mod build;
pub mod channel;
pub mod collector;
pub mod config;
pub mod dataset;
pub mod error;
pub mod pool;
pub mod progress;
pub mod reader;
pub mod runner;
pub mod sequential;
pub mod session;
pub mod task_id;
pub mod testing;
pub mod unit;
pub mod units;

#[cfg(feature = "dropbox")]
pub mod dropbox;

// General re-exports
pub use build::{BoxedChannel, Parallel, build_local};
pub use channel::{ExecutionChannel, RecoveredUnit};
pub use collector::{Collector, DatasetCollector, MergeResults, MergingCollector};
pub use config::{ParallelConfig, ParallelMode, WorkerCommand};
pub use dataset::{BatchSource, Dataset, RangeDataset, SplitPolicy, VecDataset, split_ranges};
pub use error::DispatchError;
pub use pool::PoolChannel;
pub use progress::{NullProgressMonitor, ProgressBar, ProgressMonitor, ProgressPrint, ProgressReport};
pub use reader::Reader;
pub use runner::{RunOutcome, TaskRunner};
pub use sequential::SequentialChannel;
pub use session::{DatasetShortfall, Reconciliation, Shortfall};
pub use task_id::TaskId;
pub use unit::{ResultEnvelope, UnitContext, WorkUnit};
pub use units::UnitBuilder;

// Gated re-exports
#[cfg(feature = "dropbox")]
pub use build::build_parallel;
