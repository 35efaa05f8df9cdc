//! Work units and the envelopes they produce.
//!
//! A [`WorkUnit`] pairs one [`BatchSource`] with one reader clone. It is
//! moved into the execution channel on submission; nothing on the submitting
//! side keeps a handle to it. Executing it drives the reader lifecycle over
//! every batch and yields a [`ResultEnvelope`] tagged with the unit's
//! [`TaskId`].

use crate::dataset::BatchSource;
use crate::reader::Reader;
use crate::task_id::TaskId;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What a reader learns about the unit it is running in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitContext {
    pub id: TaskId,
    pub dataset: String,
    /// Position of this unit among the slices of its dataset.
    pub index: usize,
}

/// One independently executable slice of a dataset with its own reader.
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkUnit<S, R> {
    pub id: TaskId,
    pub dataset: String,
    pub index: usize,
    pub source: S,
    pub reader: R,
}

/// Value put on the result queue once a unit has run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope<T> {
    pub id: TaskId,
    pub results: T,
}

impl<S, R> WorkUnit<S, R> {
    #[must_use]
    pub fn context(&self) -> UnitContext {
        UnitContext {
            id: self.id,
            dataset: self.dataset.clone(),
            index: self.index,
        }
    }
}

impl<S, R> WorkUnit<S, R>
where
    S: BatchSource,
    R: Reader<Item = S::Item>,
{
    /// Run the reader over every batch of the source.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails to produce a batch.
    pub fn execute(self) -> Result<ResultEnvelope<R::Results>> {
        let ctx = self.context();
        let Self {
            id,
            mut source,
            mut reader,
            ..
        } = self;

        reader.begin(&ctx);
        let mut items = 0usize;
        while let Some(batch) = source
            .next_batch()
            .with_context(|| format!("reading {id} of dataset {:?}", ctx.dataset))?
        {
            for item in &batch {
                reader.read(item);
            }
            items += batch.len();
        }
        let results = reader.end();

        debug!(task = %id, dataset = %ctx.dataset, unit = ctx.index, items, "unit finished");
        Ok(ResultEnvelope { id, results })
    }
}
