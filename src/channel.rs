//! The execution channel contract shared by every dispatch backend.
//!
//! A channel accepts [`WorkUnit`]s with [`put`](ExecutionChannel::put) and
//! hands back [`ResultEnvelope`]s from [`poll`](ExecutionChannel::poll).
//! Where the unit actually runs is the backend's business:
//!
//! - [`SequentialChannel`](crate::sequential::SequentialChannel) runs it inside `put`
//! - [`PoolChannel`](crate::pool::PoolChannel) runs it on a fixed thread pool
//! - `DropboxChannel` (feature `dropbox`) writes it to disk and lets a
//!   dispatcher run it in another thread, process or host
//!
//! Results may come back in any order. Pairing them with their submissions is
//! done by the [`TaskRunner`](crate::runner::TaskRunner) through the
//! envelope's [`TaskId`].

use crate::reader::Reader;
use crate::task_id::TaskId;
use crate::unit::{ResultEnvelope, WorkUnit};
use anyhow::Result;

/// A submitted unit rebuilt from a backend's persistent state.
///
/// `reader` is the clone as it was at submission time, before it ran.
#[derive(Debug)]
pub struct RecoveredUnit<R> {
    pub id: TaskId,
    pub dataset: String,
    pub index: usize,
    pub reader: R,
}

/// Queue-pair abstraction over where work units run.
pub trait ExecutionChannel<S, R: Reader> {
    /// Prepare the backend for a session (start workers, open a working area).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be brought up.
    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    /// Hand a unit to the backend. Never waits for the unit to run.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit could not be enqueued at all.
    fn put(&mut self, unit: WorkUnit<S, R>) -> Result<()>;

    /// Take one finished result, if any is ready.
    ///
    /// May wait up to the backend's poll interval, never longer.
    ///
    /// # Errors
    ///
    /// Returns an error only when the backend itself is broken; a failed unit
    /// is logged and dropped instead.
    fn poll(&mut self) -> Result<Option<ResultEnvelope<R::Results>>>;

    /// `true` once nothing is queued for [`poll`](Self::poll) and no unit is
    /// still running. Units that failed count as finished.
    fn is_exhausted(&self) -> bool;

    /// Tear down whatever [`begin`](Self::begin) set up.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to shut down cleanly.
    fn end(&mut self) -> Result<()> {
        Ok(())
    }

    /// Rebuild the units a previous process submitted, for backends whose
    /// work outlives the submitting process. Others have nothing to recover.
    ///
    /// # Errors
    ///
    /// Returns an error if persisted state exists but cannot be read.
    fn recover(&mut self) -> Result<Vec<RecoveredUnit<R>>> {
        Ok(Vec::new())
    }
}

impl<S, R, C> ExecutionChannel<S, R> for Box<C>
where
    R: Reader,
    C: ExecutionChannel<S, R> + ?Sized,
{
    fn begin(&mut self) -> Result<()> {
        (**self).begin()
    }

    fn put(&mut self, unit: WorkUnit<S, R>) -> Result<()> {
        (**self).put(unit)
    }

    fn poll(&mut self) -> Result<Option<ResultEnvelope<R::Results>>> {
        (**self).poll()
    }

    fn is_exhausted(&self) -> bool {
        (**self).is_exhausted()
    }

    fn end(&mut self) -> Result<()> {
        (**self).end()
    }

    fn recover(&mut self) -> Result<Vec<RecoveredUnit<R>>> {
        (**self).recover()
    }
}
