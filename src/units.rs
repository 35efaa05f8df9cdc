//! Unit-of-work builder: turns a dataset into its list of slices.

use crate::dataset::{Dataset, SplitPolicy};
use anyhow::{Context, Result};
use tracing::debug;

/// Applies a [`SplitPolicy`] to datasets.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnitBuilder {
    policy: SplitPolicy,
}

impl UnitBuilder {
    #[must_use]
    pub const fn new(policy: SplitPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &SplitPolicy {
        &self.policy
    }

    /// Split `dataset` into independently executable sources, in slice order.
    ///
    /// # Errors
    ///
    /// Propagates the dataset's split failure with the dataset name attached.
    pub fn build<D: Dataset>(&self, dataset: &D) -> Result<Vec<D::Source>> {
        let sources = dataset
            .split(&self.policy)
            .with_context(|| format!("splitting dataset {:?}", dataset.name()))?;
        debug!(dataset = dataset.name(), units = sources.len(), "dataset split");
        Ok(sources)
    }
}
