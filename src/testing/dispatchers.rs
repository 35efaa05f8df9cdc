//! Dispatchers for testing the dropbox backend.

use crate::dropbox::{Dispatcher, JobId, JobStatus, WorkingArea};
use anyhow::Result;
use std::path::PathBuf;

/// Accepts every job and never runs any of them.
///
/// Submitting through it leaves a working area with packages and no results,
/// which is what a crashed submitter leaves behind.
#[derive(Debug, Default)]
pub struct HoldingDispatcher {
    held: Vec<PathBuf>,
}

impl HoldingDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Package paths received so far.
    #[must_use]
    pub fn held(&self) -> &[PathBuf] {
        &self.held
    }
}

impl Dispatcher for HoldingDispatcher {
    fn run(&mut self, area: &WorkingArea, index: usize) -> Result<JobId> {
        self.held.push(area.package_path(index));
        Ok(JobId(self.held.len() as u64 - 1))
    }

    fn poll(&mut self) -> Result<Vec<(JobId, JobStatus)>> {
        Ok(Vec::new())
    }

    fn running(&self) -> usize {
        self.held.len()
    }

    fn terminate(&mut self) -> Result<()> {
        self.held.clear();
        Ok(())
    }
}
