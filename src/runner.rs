//! The task runner: datasets in, merged artifact out.
//!
//! ```text
//! begin()      new session, channel.begin()
//! run(&ds)     split → clone reader → tag → put      (repeat per dataset)
//! end()        poll until every tag is reconciled or the channel is
//!              exhausted → monitor.last() → collector
//! ```
//!
//! Results are paired with submissions purely by [`TaskId`], so the order in
//! which a backend finishes units never matters. Readers reach the collector
//! in submission order.
//!
//! If a backend loses units, `end()` does not fail. It returns a
//! [`RunOutcome`] whose [`shortfall`](RunOutcome::shortfall) names the
//! incomplete datasets; those datasets are left out of the collector, the
//! others are merged as usual. A result whose tag matches nothing pending is a
//! protocol violation and *is* an error.
//!
//! # Example
//!
//! ```
//! use ironloop::collector::MergingCollector;
//! use ironloop::dataset::{RangeDataset, SplitPolicy};
//! use ironloop::runner::TaskRunner;
//! use ironloop::sequential::SequentialChannel;
//! use ironloop::testing::CountingReader;
//! # fn main() -> anyhow::Result<()> {
//!
//! let mut runner = TaskRunner::new(
//!     CountingReader::default(),
//!     MergingCollector::new(),
//!     SequentialChannel::new(),
//! )
//! .with_split_policy(SplitPolicy::default().with_max_items_per_unit(10));
//!
//! runner.begin()?;
//! runner.run(&RangeDataset::new("numbers", 0..100))?;
//! let outcome = runner.end()?;
//!
//! assert!(outcome.is_complete());
//! assert_eq!(outcome.output["numbers"].items, 100);
//! # Ok(())
//! # }
//! ```

use crate::channel::ExecutionChannel;
use crate::collector::Collector;
use crate::dataset::{BatchSource, Dataset, SplitPolicy};
use crate::error::DispatchError;
use crate::progress::{NullProgressMonitor, ProgressMonitor};
use crate::reader::Reader;
use crate::session::{Reconciliation, Session, Shortfall};
use crate::task_id::TaskId;
use crate::unit::WorkUnit;
use crate::units::UnitBuilder;
use anyhow::Result;
use std::marker::PhantomData;
use tracing::{debug, error, info, warn};

/// What `end()` hands back.
#[derive(Debug)]
pub struct RunOutcome<O> {
    /// The collector's artifact, built from fully reconciled datasets only.
    pub output: O,
    /// Set when some units never came back.
    pub shortfall: Option<Shortfall>,
}

impl<O> RunOutcome<O> {
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.shortfall.is_none()
    }
}

/// Drives datasets through a channel and reconciles what comes back.
///
/// `S` is the batch source type shared by every dataset this runner handles.
pub struct TaskRunner<S, R: Reader, C, Ch> {
    reader: R,
    collector: C,
    channel: Ch,
    builder: UnitBuilder,
    monitor: Box<dyn ProgressMonitor>,
    session: Option<Session<R>>,
    _source: PhantomData<fn() -> S>,
}

impl<S, R, C, Ch> TaskRunner<S, R, C, Ch>
where
    S: BatchSource,
    R: Reader<Item = S::Item>,
    Ch: ExecutionChannel<S, R>,
{
    pub fn new(reader: R, collector: C, channel: Ch) -> Self {
        Self {
            reader,
            collector,
            channel,
            builder: UnitBuilder::default(),
            monitor: Box::new(NullProgressMonitor),
            session: None,
            _source: PhantomData,
        }
    }

    #[must_use]
    pub fn with_split_policy(mut self, policy: SplitPolicy) -> Self {
        self.builder = UnitBuilder::new(policy);
        self
    }

    #[must_use]
    pub fn with_monitor(mut self, monitor: Box<dyn ProgressMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// The template reader. Units only ever receive clones of it.
    #[must_use]
    pub const fn reader(&self) -> &R {
        &self.reader
    }

    #[must_use]
    pub const fn channel(&self) -> &Ch {
        &self.channel
    }

    pub const fn channel_mut(&mut self) -> &mut Ch {
        &mut self.channel
    }

    #[must_use]
    pub const fn collector(&self) -> &C {
        &self.collector
    }

    /// The session in progress, if any.
    #[must_use]
    pub const fn session(&self) -> Option<&Session<R>> {
        self.session.as_ref()
    }

    /// Start a session with empty per-session state.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SessionActive`] if a session is already
    /// running, or the channel's error if it cannot start.
    pub fn begin(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Err(DispatchError::SessionActive.into());
        }
        self.channel.begin()?;
        self.session = Some(Session::new());
        debug!("session started");
        Ok(())
    }

    /// Split `dataset` and submit one unit per slice. Returns the unit count.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SessionNotStarted`] outside a session, a
    /// split error, or the channel's error if a unit cannot be enqueued.
    /// Units enqueued before the failure stay submitted, but the dataset is
    /// reported as a shortfall when the session ends.
    pub fn run<D>(&mut self, dataset: &D) -> Result<usize>
    where
        D: Dataset<Source = S>,
    {
        let session = self
            .session
            .as_mut()
            .ok_or(DispatchError::SessionNotStarted)?;
        let sources = self.builder.build(dataset)?;
        let name = dataset.name();
        let count = sources.len();

        for (index, source) in sources.into_iter().enumerate() {
            let id = session.register(name, self.reader.clone());
            let unit = WorkUnit {
                id,
                dataset: name.to_string(),
                index,
                source,
                reader: self.reader.clone(),
            };
            if let Err(e) = self.channel.put(unit) {
                session.abandon(id);
                for _ in index + 1..count {
                    session.skip(name);
                }
                warn!(dataset = name, submitted = index, planned = count, "dataset only partly submitted");
                return Err(e.context(format!("submitting unit {index} of dataset {name:?}")));
            }
        }

        debug!(dataset = name, units = count, "dataset submitted");
        Ok(count)
    }

    /// Re-enter a session whose units were submitted by an earlier process.
    ///
    /// Only meaningful for channels that persist their work (the dropbox
    /// backend); for others nothing is recovered. Returns the number of
    /// units recovered. Follow with [`end`](Self::end).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SessionActive`] if a session is running, or
    /// the channel's error if its persisted state cannot be read.
    pub fn resume(&mut self) -> Result<usize> {
        if self.session.is_some() {
            return Err(DispatchError::SessionActive.into());
        }
        self.channel.begin()?;
        let mut session = Session::new();
        let recovered = self.channel.recover()?;
        let count = recovered.len();
        for unit in recovered {
            session.restore(unit.id, &unit.dataset, unit.reader)?;
        }
        self.session = Some(session);
        info!(units = count, "session resumed");
        Ok(count)
    }

    /// Wait for every submitted unit, then return the reconciled readers in
    /// submission order without involving the collector.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SessionNotStarted`] outside a session,
    /// [`DispatchError::ProtocolMismatch`] if a result matches no pending
    /// submission, or a channel failure. The session is discarded either way.
    pub fn reconcile(&mut self) -> Result<Reconciliation<R>> {
        let mut session = self
            .session
            .take()
            .ok_or(DispatchError::SessionNotStarted)?;

        if let Err(e) = self.drain(&mut session) {
            error!(error = %format!("{e:#}"), "session aborted");
            if let Err(end_err) = self.channel.end() {
                warn!(error = %format!("{end_err:#}"), "channel did not shut down cleanly");
            }
            return Err(e);
        }

        self.monitor.last(&session.progress());
        self.channel.end()?;

        let reconciliation = session.finish();
        match &reconciliation.shortfall {
            Some(shortfall) => warn!("{shortfall}"),
            None => info!(units = reconciliation.readers.len(), "all units reconciled"),
        }
        Ok(reconciliation)
    }

    /// Wait for every submitted unit and hand the result to the collector.
    ///
    /// Datasets missing any unit are skipped and reported in the outcome's
    /// shortfall; the collector still runs over the complete ones.
    ///
    /// # Errors
    ///
    /// Everything [`reconcile`](Self::reconcile) returns, plus the
    /// collector's error.
    pub fn end(&mut self) -> Result<RunOutcome<C::Output>>
    where
        C: Collector<R>,
    {
        let Reconciliation { readers, shortfall } = self.reconcile()?;
        for (dataset, reader) in readers {
            if shortfall.as_ref().is_some_and(|s| s.affects(&dataset)) {
                continue;
            }
            self.collector.add_reader(&dataset, reader);
        }
        let output = self.collector.collect()?;
        Ok(RunOutcome { output, shortfall })
    }

    fn drain(&mut self, session: &mut Session<R>) -> Result<()> {
        while session.outstanding() >= 1 {
            self.monitor.monitor(&session.progress());
            match self.channel.poll()? {
                Some(envelope) => {
                    let id: TaskId = envelope.id;
                    session.reconcile(envelope)?;
                    debug!(task = %id, outstanding = session.outstanding(), "result reconciled");
                }
                None if self.channel.is_exhausted() => {
                    debug!(outstanding = session.outstanding(), "channel exhausted");
                    break;
                }
                None => {}
            }
        }
        Ok(())
    }
}
