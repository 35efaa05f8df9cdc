//! Progress monitors polled by the task runner while units are outstanding.
//!
//! A monitor is a passive observer. The runner calls
//! [`monitor`](ProgressMonitor::monitor) on every iteration of its polling
//! loop and [`last`](ProgressMonitor::last) exactly once when the loop is
//! over. Both calls must be cheap: at most a terminal or log write.
//!
//! Which monitor to use is usually decided by [`default_monitor`]: nothing
//! when quiet, a redrawn bar when stderr is a terminal, periodic log lines
//! otherwise.

use std::io::{IsTerminal, Write};
use std::time::{Duration, Instant};
use tracing::info;

/// Snapshot of a session's progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressReport {
    /// Units submitted in this session.
    pub total: usize,
    /// Units whose result has been reconciled.
    pub completed: usize,
}

impl ProgressReport {
    #[must_use]
    pub const fn outstanding(&self) -> usize {
        self.total.saturating_sub(self.completed)
    }
}

/// Observer of a session's progress.
pub trait ProgressMonitor: Send {
    /// Refresh the display. Called on every poll iteration.
    fn monitor(&mut self, report: &ProgressReport);

    /// Finalize the display. Called once per session.
    fn last(&mut self, report: &ProgressReport);
}

/// Monitor that shows nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProgressMonitor;

impl ProgressMonitor for NullProgressMonitor {
    fn monitor(&mut self, _report: &ProgressReport) {}

    fn last(&mut self, _report: &ProgressReport) {}
}

/// Logs a progress line through `tracing` at most once per interval.
#[derive(Debug)]
pub struct ProgressPrint {
    interval: Duration,
    last_print: Option<Instant>,
    last_completed: Option<usize>,
}

impl Default for ProgressPrint {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl ProgressPrint {
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_print: None,
            last_completed: None,
        }
    }
}

impl ProgressMonitor for ProgressPrint {
    fn monitor(&mut self, report: &ProgressReport) {
        if self.last_completed == Some(report.completed) {
            return;
        }
        let due = self
            .last_print
            .is_none_or(|at| at.elapsed() >= self.interval);
        if !due {
            return;
        }
        info!(
            completed = report.completed,
            total = report.total,
            outstanding = report.outstanding(),
            "units finished"
        );
        self.last_print = Some(Instant::now());
        self.last_completed = Some(report.completed);
    }

    fn last(&mut self, report: &ProgressReport) {
        info!(
            completed = report.completed,
            total = report.total,
            "all units accounted for"
        );
    }
}

/// Single-line bar redrawn in place on stderr.
#[derive(Debug)]
pub struct ProgressBar {
    width: usize,
    drawn: Option<ProgressReport>,
}

impl Default for ProgressBar {
    fn default() -> Self {
        Self::new(40)
    }
}

impl ProgressBar {
    #[must_use]
    pub const fn new(width: usize) -> Self {
        Self { width, drawn: None }
    }

    /// Render the bar for `report` without the leading carriage return.
    #[must_use]
    pub fn render(&self, report: &ProgressReport) -> String {
        let filled = if report.total == 0 {
            self.width
        } else {
            self.width * report.completed.min(report.total) / report.total
        };
        format!(
            "[{}{}] {}/{}",
            "#".repeat(filled),
            " ".repeat(self.width - filled),
            report.completed,
            report.total
        )
    }

    fn draw(&mut self, report: &ProgressReport) {
        let line = self.render(report);
        let mut err = std::io::stderr().lock();
        // Write errors are ignored.
        write!(err, "\r{line}").ok();
        err.flush().ok();
        self.drawn = Some(*report);
    }
}

impl ProgressMonitor for ProgressBar {
    fn monitor(&mut self, report: &ProgressReport) {
        if self.drawn.as_ref() != Some(report) {
            self.draw(report);
        }
    }

    fn last(&mut self, report: &ProgressReport) {
        self.draw(report);
        writeln!(std::io::stderr()).ok();
    }
}

/// Pick a monitor the way interactive and batch runs usually want it.
#[must_use]
pub fn default_monitor(quiet: bool) -> Box<dyn ProgressMonitor> {
    if quiet {
        Box::new(NullProgressMonitor)
    } else if std::io::stderr().is_terminal() {
        Box::new(ProgressBar::default())
    } else {
        Box::new(ProgressPrint::default())
    }
}
