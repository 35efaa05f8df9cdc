//! Per-session bookkeeping for the task runner.
//!
//! A [`Session`] exists from `TaskRunner::begin` to `TaskRunner::end`. It owns
//!
//! - the pending set: tag → reader clone recorded at submission,
//! - the association list: `(tag, dataset)` in submission order,
//! - the outstanding counter and the next tag to hand out.
//!
//! Nothing here is global; a new session starts from a clean slate.

use crate::error::DispatchError;
use crate::progress::ProgressReport;
use crate::reader::Reader;
use crate::task_id::TaskId;
use crate::unit::ResultEnvelope;
use anyhow::Result;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug)]
pub struct Session<R> {
    next_id: u64,
    pending: HashMap<TaskId, R>,
    reconciled: HashMap<TaskId, R>,
    associations: Vec<(TaskId, String)>,
    outstanding: usize,
}

impl<R> Default for Session<R> {
    fn default() -> Self {
        Self {
            next_id: 0,
            pending: HashMap::new(),
            reconciled: HashMap::new(),
            associations: Vec::new(),
            outstanding: 0,
        }
    }
}

impl<R: Reader> Session<R> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submission and hand out its tag.
    pub fn register(&mut self, dataset: &str, reader: R) -> TaskId {
        let id = TaskId::new(self.next_id);
        self.next_id += 1;
        self.insert(id, dataset, reader);
        id
    }

    /// Record a submission made under a known tag (used when resuming).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ProtocolMismatch`] if the tag is already known.
    pub fn restore(&mut self, id: TaskId, dataset: &str, reader: R) -> Result<()> {
        if self.pending.contains_key(&id) || self.reconciled.contains_key(&id) {
            return Err(DispatchError::ProtocolMismatch { id }.into());
        }
        self.next_id = self.next_id.max(id.raw() + 1);
        self.insert(id, dataset, reader);
        Ok(())
    }

    fn insert(&mut self, id: TaskId, dataset: &str, reader: R) {
        self.pending.insert(id, reader);
        self.associations.push((id, dataset.to_string()));
        self.outstanding += 1;
    }

    /// Mark a registered unit as never having reached the channel.
    ///
    /// It stays in the association list, so its dataset is reported as a
    /// shortfall instead of being merged from the slices that did run.
    pub fn abandon(&mut self, id: TaskId) {
        if self.pending.remove(&id).is_some() {
            self.outstanding -= 1;
        }
    }

    /// Record a planned slice of `dataset` that was never submitted.
    pub fn skip(&mut self, dataset: &str) -> TaskId {
        let id = TaskId::new(self.next_id);
        self.next_id += 1;
        self.associations.push((id, dataset.to_string()));
        id
    }

    /// Pair an envelope with its pending submission and install its results.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ProtocolMismatch`] when the tag is unknown or
    /// was already reconciled.
    pub fn reconcile(&mut self, envelope: ResultEnvelope<R::Results>) -> Result<()> {
        let ResultEnvelope { id, results } = envelope;
        let mut reader = self
            .pending
            .remove(&id)
            .ok_or(DispatchError::ProtocolMismatch { id })?;
        reader.set_results(results);
        self.reconciled.insert(id, reader);
        self.outstanding -= 1;
        Ok(())
    }

    #[must_use]
    pub const fn outstanding(&self) -> usize {
        self.outstanding
    }

    #[must_use]
    pub fn submitted(&self) -> usize {
        self.associations.len()
    }

    #[must_use]
    pub fn associations(&self) -> &[(TaskId, String)] {
        &self.associations
    }

    #[must_use]
    pub fn progress(&self) -> ProgressReport {
        ProgressReport {
            total: self.associations.len(),
            completed: self.reconciled.len(),
        }
    }

    /// Close the session: reconciled readers in submission order, plus a
    /// per-dataset shortfall if anything is still missing.
    #[must_use]
    pub fn finish(mut self) -> Reconciliation<R> {
        let sent = self.associations.len();
        let mut readers = Vec::with_capacity(self.reconciled.len());
        let mut per_dataset: Vec<DatasetShortfall> = Vec::new();

        for (id, dataset) in self.associations {
            let slot = match per_dataset.iter().position(|d| d.dataset == dataset) {
                Some(i) => i,
                None => {
                    per_dataset.push(DatasetShortfall::new(&dataset));
                    per_dataset.len() - 1
                }
            };
            let entry = &mut per_dataset[slot];
            entry.sent += 1;
            if let Some(reader) = self.reconciled.remove(&id) {
                entry.returned += 1;
                readers.push((dataset, reader));
            } else {
                entry.missing.push(id);
            }
        }

        let returned = readers.len();
        let shortfall = (returned != sent).then(|| {
            per_dataset.retain(|d| !d.missing.is_empty());
            Shortfall {
                sent,
                returned,
                datasets: per_dataset,
            }
        });
        Reconciliation { readers, shortfall }
    }
}

/// Outcome of closing a session.
#[derive(Debug)]
pub struct Reconciliation<R> {
    /// `(dataset, reader)` for every reconciled unit, in submission order.
    pub readers: Vec<(String, R)>,
    pub shortfall: Option<Shortfall>,
}

impl<R> Reconciliation<R> {
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.shortfall.is_none()
    }
}

/// Fewer results came back than units were submitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shortfall {
    pub sent: usize,
    pub returned: usize,
    /// Only the datasets with missing units.
    pub datasets: Vec<DatasetShortfall>,
}

impl Shortfall {
    /// Whether `dataset` is missing at least one unit.
    #[must_use]
    pub fn affects(&self, dataset: &str) -> bool {
        self.datasets.iter().any(|d| d.dataset == dataset)
    }
}

impl fmt::Display for Shortfall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the same number of readers were not returned: {} sent, {} returned; skipping incomplete datasets",
            self.sent, self.returned
        )?;
        for (i, d) in self.datasets.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{:?} ({}/{})", d.dataset, d.returned, d.sent)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetShortfall {
    pub dataset: String,
    pub sent: usize,
    pub returned: usize,
    pub missing: Vec<TaskId>,
}

impl DatasetShortfall {
    fn new(dataset: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            sent: 0,
            returned: 0,
            missing: Vec::new(),
        }
    }
}
