//! Turn a [`ParallelConfig`] into a ready-to-use channel and monitor.
//!
//! ```
//! use ironloop::build::build_local;
//! use ironloop::collector::MergingCollector;
//! use ironloop::config::{ParallelConfig, ParallelMode};
//! use ironloop::dataset::{RangeDataset, RangeSource};
//! use ironloop::testing::CountingReader;
//! # fn main() -> anyhow::Result<()> {
//!
//! let config = ParallelConfig {
//!     mode: ParallelMode::Pool,
//!     processes: 2,
//!     ..ParallelConfig::default()
//! };
//! let parallel = build_local::<RangeSource, CountingReader>(&config)?;
//! let mut runner = parallel.into_runner(CountingReader::default(), MergingCollector::new());
//!
//! runner.begin()?;
//! runner.run(&RangeDataset::new("numbers", 0..10))?;
//! assert_eq!(runner.end()?.output["numbers"].items, 10);
//! # Ok(())
//! # }
//! ```

use crate::channel::ExecutionChannel;
use crate::config::{ParallelConfig, ParallelMode};
use crate::dataset::{BatchSource, SplitPolicy};
use crate::error::DispatchError;
use crate::pool::PoolChannel;
use crate::progress::{ProgressMonitor, default_monitor};
use crate::reader::Reader;
use crate::runner::TaskRunner;
use crate::sequential::SequentialChannel;
use anyhow::Result;
use tracing::info;

#[cfg(feature = "dropbox")]
use crate::dropbox::{DropboxChannel, SubprocessDispatcher, ThreadDispatcher, execute_package};
#[cfg(feature = "dropbox")]
use serde::{Serialize, de::DeserializeOwned};

/// Type-erased channel produced by the builders.
pub type BoxedChannel<S, R> = Box<dyn ExecutionChannel<S, R>>;

/// A configured backend: channel, progress monitor and split policy.
pub struct Parallel<S, R: Reader> {
    pub mode: ParallelMode,
    pub channel: BoxedChannel<S, R>,
    pub monitor: Box<dyn ProgressMonitor>,
    pub split: SplitPolicy,
}

impl<S, R> Parallel<S, R>
where
    S: BatchSource,
    R: Reader<Item = S::Item>,
{
    /// Wire everything into a [`TaskRunner`].
    pub fn into_runner<C>(self, reader: R, collector: C) -> TaskRunner<S, R, C, BoxedChannel<S, R>> {
        TaskRunner::new(reader, collector, self.channel)
            .with_split_policy(self.split)
            .with_monitor(self.monitor)
    }
}

/// Build an in-process backend (`sequential` or `pool`).
///
/// `pool` with `processes == 0` runs sequentially.
///
/// # Errors
///
/// Returns [`DispatchError::InvalidConfig`] if the configuration is invalid
/// or names a dropbox mode, or an error if the pool cannot start.
pub fn build_local<S, R>(config: &ParallelConfig) -> Result<Parallel<S, R>>
where
    S: BatchSource,
    R: Reader<Item = S::Item>,
{
    config.validate()?;
    let (mode, channel): (ParallelMode, BoxedChannel<S, R>) = match config.mode {
        ParallelMode::Sequential => (
            ParallelMode::Sequential,
            Box::new(SequentialChannel::<R::Results>::new()),
        ),
        ParallelMode::Pool if config.processes == 0 => (
            ParallelMode::Sequential,
            Box::new(SequentialChannel::<R::Results>::new()),
        ),
        ParallelMode::Pool => (
            ParallelMode::Pool,
            Box::new(PoolChannel::<R::Results>::new(config.processes)?.with_poll_interval(config.poll_interval())),
        ),
        mode @ (ParallelMode::Subprocess | ParallelMode::Threads) => {
            return Err(DispatchError::InvalidConfig(format!(
                "mode {mode:?} ships units through the dropbox; use build_parallel"
            ))
            .into());
        }
    };
    info!(mode = mode.name(), processes = config.processes, "backend ready");
    Ok(Parallel {
        mode,
        channel,
        monitor: default_monitor(config.quiet),
        split: config.split,
    })
}

/// Build any backend, including the dropbox ones.
///
/// The `threads` mode runs packages through [`execute_package`] for `S` and
/// `R` on a local pool. The `subprocess` mode runs `config.worker` once per
/// package; that program must call `execute_package` with the same types.
///
/// # Errors
///
/// Returns [`DispatchError::InvalidConfig`] if the configuration is invalid,
/// or an error if the backend cannot start.
#[cfg(feature = "dropbox")]
pub fn build_parallel<S, R>(config: &ParallelConfig) -> Result<Parallel<S, R>>
where
    S: BatchSource + Serialize + DeserializeOwned,
    R: Reader<Item = S::Item> + Serialize + DeserializeOwned,
    R::Results: Serialize + DeserializeOwned,
{
    config.validate()?;
    let channel: BoxedChannel<S, R> = match config.mode {
        ParallelMode::Sequential | ParallelMode::Pool => return build_local(config),
        ParallelMode::Subprocess => {
            let worker = config
                .worker
                .clone()
                .ok_or_else(|| DispatchError::InvalidConfig("mode \"subprocess\" needs a worker command".into()))?;
            let mut dispatcher = SubprocessDispatcher::new(worker);
            if let Some(n) = config.max_running {
                dispatcher = dispatcher.with_max_running(n);
            }
            Box::new(
                DropboxChannel::<R::Results, _>::new(config.working_dir.clone(), dispatcher)
                    .with_poll_interval(config.poll_interval()),
            )
        }
        ParallelMode::Threads => {
            let dispatcher = ThreadDispatcher::new(config.processes, |package| {
                execute_package::<S, R>(package).map(|_| ())
            })?;
            Box::new(
                DropboxChannel::<R::Results, _>::new(config.working_dir.clone(), dispatcher)
                    .with_poll_interval(config.poll_interval()),
            )
        }
    };
    info!(
        mode = config.mode.name(),
        working_dir = %config.working_dir.display(),
        "backend ready"
    );
    Ok(Parallel {
        mode: config.mode,
        channel,
        monitor: default_monitor(config.quiet),
        split: config.split,
    })
}
