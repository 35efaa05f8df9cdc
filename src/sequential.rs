//! In-process backend: every unit runs synchronously inside `put`.
//!
//! No threads, no serialization. Useful for debugging readers and for
//! configurations with zero workers.
//!
//! A unit that errors or panics is logged and counted as lost, exactly as
//! the pool backend does.

use crate::channel::ExecutionChannel;
use crate::dataset::BatchSource;
use crate::pool::panic_message;
use crate::reader::Reader;
use crate::unit::{ResultEnvelope, WorkUnit};
use anyhow::Result;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::warn;

/// Runs each unit on the caller's thread and queues its envelope.
#[derive(Debug)]
pub struct SequentialChannel<T> {
    results: VecDeque<ResultEnvelope<T>>,
    lost: usize,
}

impl<T> Default for SequentialChannel<T> {
    fn default() -> Self {
        Self {
            results: VecDeque::new(),
            lost: 0,
        }
    }
}

impl<T> SequentialChannel<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Units whose execution failed and produced no envelope.
    #[must_use]
    pub const fn lost(&self) -> usize {
        self.lost
    }
}

impl<S, R> ExecutionChannel<S, R> for SequentialChannel<R::Results>
where
    S: BatchSource,
    R: Reader<Item = S::Item>,
{
    fn begin(&mut self) -> Result<()> {
        self.results.clear();
        self.lost = 0;
        Ok(())
    }

    fn put(&mut self, unit: WorkUnit<S, R>) -> Result<()> {
        let id = unit.id;
        match catch_unwind(AssertUnwindSafe(|| unit.execute())) {
            Ok(Ok(envelope)) => self.results.push_back(envelope),
            Ok(Err(e)) => {
                self.lost += 1;
                warn!(task = %id, error = %format!("{e:#}"), "unit failed; no result will be returned");
            }
            Err(payload) => {
                self.lost += 1;
                warn!(task = %id, panic = %panic_message(payload.as_ref()), "unit panicked; no result will be returned");
            }
        }
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<ResultEnvelope<R::Results>>> {
        Ok(self.results.pop_front())
    }

    fn is_exhausted(&self) -> bool {
        self.results.is_empty()
    }
}
