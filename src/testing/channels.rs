//! A channel whose delivery order is decided by the test.

use crate::channel::ExecutionChannel;
use crate::dataset::BatchSource;
use crate::reader::Reader;
use crate::task_id::TaskId;
use crate::unit::{ResultEnvelope, WorkUnit};
use anyhow::Result;
use std::collections::{BTreeSet, VecDeque};

/// Order in which a [`ScriptedChannel`] hands back results, by submission
/// position (0 = first unit put).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    InOrder,
    Reversed,
    /// Listed positions first, in the listed order; unlisted ones follow in
    /// submission order.
    Permuted(Vec<usize>),
}

/// Runs every unit inside `put` like the sequential backend, but withholds
/// the results until the first `poll` and then releases them in a scripted
/// order.
///
/// Positions passed to [`dropping`](Self::dropping) are never delivered,
/// which looks to the runner like lost units. [`inject`](Self::inject)
/// queues an envelope that was never submitted, ahead of everything else.
#[derive(Debug)]
pub struct ScriptedChannel<T> {
    delivery: Delivery,
    dropped: BTreeSet<usize>,
    submitted: Vec<(TaskId, String)>,
    executed: Vec<Option<ResultEnvelope<T>>>,
    injected: Vec<ResultEnvelope<T>>,
    queue: Option<VecDeque<ResultEnvelope<T>>>,
}

impl<T> ScriptedChannel<T> {
    #[must_use]
    pub fn new(delivery: Delivery) -> Self {
        Self {
            delivery,
            dropped: BTreeSet::new(),
            submitted: Vec::new(),
            executed: Vec::new(),
            injected: Vec::new(),
            queue: None,
        }
    }

    #[must_use]
    pub fn dropping(mut self, positions: impl IntoIterator<Item = usize>) -> Self {
        self.dropped.extend(positions);
        self
    }

    /// Queue a forged envelope to be delivered before any real result.
    pub fn inject(&mut self, envelope: ResultEnvelope<T>) {
        self.injected.push(envelope);
    }

    /// `(tag, dataset)` of every unit put, in submission order.
    #[must_use]
    pub fn submitted(&self) -> &[(TaskId, String)] {
        &self.submitted
    }

    fn release(&mut self) -> VecDeque<ResultEnvelope<T>> {
        let total = self.executed.len();
        let mut order: Vec<usize> = match &self.delivery {
            Delivery::InOrder => (0..total).collect(),
            Delivery::Reversed => (0..total).rev().collect(),
            Delivery::Permuted(listed) => listed.iter().copied().filter(|&p| p < total).collect(),
        };
        for p in 0..total {
            if !order.contains(&p) {
                order.push(p);
            }
        }

        let mut queue: VecDeque<_> = self.injected.drain(..).collect();
        for p in order {
            if self.dropped.contains(&p) {
                continue;
            }
            if let Some(envelope) = self.executed[p].take() {
                queue.push_back(envelope);
            }
        }
        queue
    }
}

impl<S, R> ExecutionChannel<S, R> for ScriptedChannel<R::Results>
where
    S: BatchSource,
    R: Reader<Item = S::Item>,
{
    fn begin(&mut self) -> Result<()> {
        self.submitted.clear();
        self.executed.clear();
        self.queue = None;
        Ok(())
    }

    fn put(&mut self, unit: WorkUnit<S, R>) -> Result<()> {
        self.submitted.push((unit.id, unit.dataset.clone()));
        self.executed.push(unit.execute().ok());
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<ResultEnvelope<R::Results>>> {
        if self.queue.is_none() {
            self.queue = Some(self.release());
        }
        Ok(self.queue.as_mut().and_then(VecDeque::pop_front))
    }

    fn is_exhausted(&self) -> bool {
        self.queue.as_ref().map_or_else(
            || self.executed.iter().all(Option::is_none) && self.injected.is_empty(),
            VecDeque::is_empty,
        )
    }
}
