//! A progress monitor that records instead of displaying.

use crate::progress::{ProgressMonitor, ProgressReport};
use std::sync::{Arc, Mutex, PoisonError};

/// Everything a [`RecordingMonitor`] has been told.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MonitorLog {
    pub monitor_calls: usize,
    pub last_calls: usize,
    pub reports: Vec<ProgressReport>,
    pub final_report: Option<ProgressReport>,
}

/// Records calls into a shared log. Clones share the log, so a test can box
/// one clone into the runner and inspect another.
///
/// ```
/// use ironloop::progress::{ProgressMonitor, ProgressReport};
/// use ironloop::testing::RecordingMonitor;
///
/// let recorder = RecordingMonitor::new();
/// let mut boxed: Box<dyn ProgressMonitor> = Box::new(recorder.clone());
/// boxed.last(&ProgressReport { total: 2, completed: 2 });
/// assert_eq!(recorder.log().last_calls, 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RecordingMonitor {
    log: Arc<Mutex<MonitorLog>>,
}

impl RecordingMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the log so far.
    #[must_use]
    pub fn log(&self) -> MonitorLog {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl ProgressMonitor for RecordingMonitor {
    fn monitor(&mut self, report: &ProgressReport) {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.monitor_calls += 1;
        log.reports.push(*report);
    }

    fn last(&mut self, report: &ProgressReport) {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.last_calls += 1;
        log.final_report = Some(*report);
    }
}
