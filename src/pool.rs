//! Worker-pool backend.
//!
//! A fixed-size [`rayon::ThreadPool`] pulls units from its shared queue; each
//! worker sends its outcome back over a `crossbeam_channel`. `put` only
//! enqueues. Completion order is whatever the workers make of it.
//!
//! A unit that errors or panics is reported as lost: the channel logs it,
//! stops counting it as in flight, and the runner sees a shortfall.

use crate::channel::ExecutionChannel;
use crate::dataset::BatchSource;
use crate::reader::Reader;
use crate::task_id::TaskId;
use crate::unit::{ResultEnvelope, WorkUnit};
use anyhow::{Context, Result, bail};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;
use tracing::{debug, warn};

/// Default wait inside [`PoolChannel::poll`] before returning empty-handed.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

enum Outcome<T> {
    Done(ResultEnvelope<T>),
    Lost { id: TaskId, reason: String },
}

/// Runs units on a fixed pool of worker threads.
pub struct PoolChannel<T> {
    pool: rayon::ThreadPool,
    workers: usize,
    tx: Sender<Outcome<T>>,
    rx: Receiver<Outcome<T>>,
    in_flight: usize,
    lost: usize,
    poll_interval: Duration,
}

impl<T: Send + 'static> PoolChannel<T> {
    /// Create a pool with `workers` threads.
    ///
    /// # Errors
    ///
    /// Returns an error if `workers` is zero (use the sequential backend) or
    /// if the threads cannot be spawned.
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            bail!("cannot create a worker pool with 0 workers; use the sequential backend instead");
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("ironloop-worker-{i}"))
            .build()
            .context("failed to start worker pool")?;
        let (tx, rx) = unbounded();
        Ok(Self {
            pool,
            workers,
            tx,
            rx,
            in_flight: 0,
            lost: 0,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Units submitted whose outcome has not been received yet.
    #[must_use]
    pub const fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Units that failed and produced no envelope.
    #[must_use]
    pub const fn lost(&self) -> usize {
        self.lost
    }
}

impl<S, R> ExecutionChannel<S, R> for PoolChannel<R::Results>
where
    S: BatchSource,
    R: Reader<Item = S::Item>,
{
    fn put(&mut self, unit: WorkUnit<S, R>) -> Result<()> {
        let tx = self.tx.clone();
        self.in_flight += 1;
        self.pool.spawn(move || {
            let id = unit.id;
            let outcome = match catch_unwind(AssertUnwindSafe(|| unit.execute())) {
                Ok(Ok(envelope)) => Outcome::Done(envelope),
                Ok(Err(e)) => Outcome::Lost {
                    id,
                    reason: format!("{e:#}"),
                },
                Err(payload) => Outcome::Lost {
                    id,
                    reason: format!("worker panicked: {}", panic_message(payload.as_ref())),
                },
            };
            // The receiving side only goes away when the channel is dropped.
            let _ = tx.send(outcome);
        });
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<ResultEnvelope<R::Results>>> {
        if self.in_flight == 0 {
            return Ok(None);
        }
        match self.rx.recv_timeout(self.poll_interval) {
            Ok(Outcome::Done(envelope)) => {
                self.in_flight -= 1;
                Ok(Some(envelope))
            }
            Ok(Outcome::Lost { id, reason }) => {
                self.in_flight -= 1;
                self.lost += 1;
                warn!(task = %id, %reason, "unit failed; no result will be returned");
                Ok(None)
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                bail!("worker pool result queue disconnected with {} units in flight", self.in_flight)
            }
        }
    }

    fn is_exhausted(&self) -> bool {
        self.in_flight == 0
    }

    fn end(&mut self) -> Result<()> {
        debug!(workers = self.workers, lost = self.lost, "worker pool session finished");
        Ok(())
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
