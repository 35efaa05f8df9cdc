//! Store-and-forward backend: units travel as packages through a directory.
//!
//! `put` writes the unit as a package into a [`WorkingArea`] and asks a
//! [`Dispatcher`] to run it. Workers (subprocesses via
//! [`SubprocessDispatcher`], local threads via [`ThreadDispatcher`], or any
//! other implementation that can reach the directory) call
//! [`execute_package`] and leave a result file next to the package. `poll`
//! picks up result files of jobs the dispatcher reports as finished.
//!
//! A job that finishes without a readable result file is logged and
//! dropped; the runner reports it as part of the shortfall. The working area
//! is left on disk after the session so failed packages and worker logs can
//! be inspected.
//!
//! Because everything a session needs is on disk, a session can be resumed
//! by another process: [`DropboxChannel::reopen`] plus
//! [`TaskRunner::resume`](crate::runner::TaskRunner::resume).
//!
//! # Example
//!
//! ```no_run
//! use ironloop::collector::MergingCollector;
//! use ironloop::dataset::{RangeDataset, RangeSource};
//! use ironloop::dropbox::{execute_package, DropboxChannel, ThreadDispatcher};
//! use ironloop::runner::TaskRunner;
//! use ironloop::testing::CountingReader;
//! # fn main() -> anyhow::Result<()> {
//!
//! let dispatcher = ThreadDispatcher::new(4, |p| {
//!     execute_package::<RangeSource, CountingReader>(p).map(|_| ())
//! })?;
//! let channel = DropboxChannel::new("./_ironloop_temp", dispatcher);
//! let mut runner = TaskRunner::new(CountingReader::default(), MergingCollector::new(), channel);
//!
//! runner.begin()?;
//! runner.run(&RangeDataset::new("numbers", 0..1000))?;
//! let outcome = runner.end()?;
//! # Ok(())
//! # }
//! ```

pub mod area;
pub mod dispatcher;
pub mod package;
pub mod worker;

pub use area::{Manifest, ManifestEntry, WorkingArea};
pub use dispatcher::{Dispatcher, JobId, JobStatus, SubprocessDispatcher, ThreadDispatcher};
pub use worker::execute_package;

use crate::channel::{ExecutionChannel, RecoveredUnit};
use crate::dataset::BatchSource;
use crate::pool::DEFAULT_POLL_INTERVAL;
use crate::reader::Reader;
use crate::unit::{ResultEnvelope, WorkUnit};
use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Execution channel backed by a working area and a dispatcher.
pub struct DropboxChannel<T, D> {
    topdir: PathBuf,
    area: Option<WorkingArea>,
    reopened: bool,
    dispatcher: D,
    manifest: Manifest,
    jobs: HashMap<JobId, usize>,
    ready: VecDeque<ResultEnvelope<T>>,
    lost: usize,
    poll_interval: Duration,
}

impl<T, D: Dispatcher> DropboxChannel<T, D> {
    /// A channel that creates a fresh working area under `topdir` on every `begin`.
    pub fn new(topdir: impl Into<PathBuf>, dispatcher: D) -> Self {
        Self {
            topdir: topdir.into(),
            area: None,
            reopened: false,
            dispatcher,
            manifest: Manifest::default(),
            jobs: HashMap::new(),
            ready: VecDeque::new(),
            lost: 0,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// A channel attached to the existing working area at `path`, for
    /// resuming its session.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is not a working area.
    pub fn reopen(path: &Path, dispatcher: D) -> Result<Self> {
        let area = WorkingArea::open(path)?;
        let manifest = area.read_manifest()?;
        let topdir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut channel = Self::new(topdir, dispatcher);
        channel.area = Some(area);
        channel.reopened = true;
        channel.manifest = manifest;
        Ok(channel)
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The working area in use, once `begin` or `reopen` has set one up.
    #[must_use]
    pub const fn area(&self) -> Option<&WorkingArea> {
        self.area.as_ref()
    }

    #[must_use]
    pub const fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Jobs that finished without a usable result.
    #[must_use]
    pub const fn lost(&self) -> usize {
        self.lost
    }

    fn require_area(&self) -> Result<&WorkingArea> {
        self.area.as_ref().ok_or_else(no_area)
    }

    fn dispatch(&mut self, index: usize) -> Result<()> {
        let area = self.area.as_ref().ok_or_else(no_area)?;
        let job = self
            .dispatcher
            .run(area, index)
            .with_context(|| format!("failed to dispatch package {index}"))?;
        self.jobs.insert(job, index);
        Ok(())
    }
}

impl<T, D> DropboxChannel<T, D>
where
    T: DeserializeOwned,
    D: Dispatcher,
{
    fn collect_finished(&mut self) -> Result<()> {
        let finished = self.dispatcher.poll()?;
        let area = self.require_area()?.clone();
        for (job, status) in finished {
            let Some(index) = self.jobs.remove(&job) else {
                warn!(job = job.0, "dispatcher reported a job this channel did not submit");
                continue;
            };
            match (area.collect_result::<ResultEnvelope<T>>(index), status) {
                (Ok(Some(envelope)), _) => self.ready.push_back(envelope),
                (Ok(None), JobStatus::Succeeded) => {
                    self.lost += 1;
                    warn!(package = index, "job finished but left no result");
                }
                (Ok(None), JobStatus::Failed(reason)) => {
                    self.lost += 1;
                    warn!(package = index, %reason, log = %area.log_paths(index).1.display(), "job failed");
                }
                (Err(e), _) => {
                    self.lost += 1;
                    warn!(package = index, error = %format!("{e:#}"), "unreadable result");
                }
            }
        }
        Ok(())
    }
}

impl<S, R, D> ExecutionChannel<S, R> for DropboxChannel<R::Results, D>
where
    S: BatchSource + Serialize + DeserializeOwned,
    R: Reader<Item = S::Item> + Serialize + DeserializeOwned,
    R::Results: DeserializeOwned,
    D: Dispatcher,
{
    fn begin(&mut self) -> Result<()> {
        // A reopened area is kept for the session being resumed.
        if std::mem::take(&mut self.reopened) {
            return Ok(());
        }
        let area = WorkingArea::create(&self.topdir)?;
        info!(area = %area.path().display(), "working area created");
        self.area = Some(area);
        self.manifest = Manifest::default();
        self.jobs.clear();
        self.ready.clear();
        self.lost = 0;
        Ok(())
    }

    fn put(&mut self, unit: WorkUnit<S, R>) -> Result<()> {
        let area = self.area.as_ref().ok_or_else(no_area)?;
        let index = self.manifest.entries.len();
        area.put_package(index, &unit)?;
        let entry = ManifestEntry {
            index,
            id: unit.id,
            dataset: unit.dataset.clone(),
        };
        area.append_manifest(&entry)?;
        self.manifest.entries.push(entry);
        self.dispatch(index)?;
        debug!(task = %unit.id, package = index, "package dispatched");
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<ResultEnvelope<R::Results>>> {
        if self.ready.is_empty() && !self.jobs.is_empty() {
            self.collect_finished()?;
            if self.ready.is_empty() && !self.jobs.is_empty() {
                thread::sleep(self.poll_interval);
            }
        }
        Ok(self.ready.pop_front())
    }

    fn is_exhausted(&self) -> bool {
        self.ready.is_empty() && self.jobs.is_empty()
    }

    fn end(&mut self) -> Result<()> {
        self.dispatcher.terminate()?;
        self.jobs.clear();
        if let Some(area) = &self.area {
            debug!(area = %area.path().display(), lost = self.lost, "dropbox session finished");
        }
        Ok(())
    }

    fn recover(&mut self) -> Result<Vec<RecoveredUnit<R>>> {
        let area = self.require_area()?.clone();
        let mut recovered = Vec::with_capacity(self.manifest.entries.len());
        let mut to_dispatch = Vec::new();

        for entry in &self.manifest.entries {
            let unit: WorkUnit<S, R> = area
                .load_package(entry.index)
                .with_context(|| format!("recovering package {}", entry.index))?;
            match area.collect_result::<ResultEnvelope<R::Results>>(entry.index) {
                Ok(Some(envelope)) => self.ready.push_back(envelope),
                Ok(None) => to_dispatch.push(entry.index),
                Err(e) => {
                    warn!(package = entry.index, error = %format!("{e:#}"), "discarding unreadable result; rerunning");
                    to_dispatch.push(entry.index);
                }
            }
            recovered.push(RecoveredUnit {
                id: entry.id,
                dataset: entry.dataset.clone(),
                index: unit.index,
                reader: unit.reader,
            });
        }

        let rerun = to_dispatch.len();
        for index in to_dispatch {
            self.dispatch(index)?;
        }
        info!(
            units = recovered.len(),
            finished = recovered.len() - rerun,
            rerun,
            "working area recovered"
        );
        Ok(recovered)
    }
}

fn no_area() -> anyhow::Error {
    anyhow!("dropbox channel has no working area; call begin() first")
}
