//! Dispatchers: what actually runs a package sitting in a working area.
//!
//! A [`Dispatcher`] is told "run package `index` of this area" and later asked
//! which of its jobs have finished. It knows nothing about readers or
//! results; the channel reads the result files itself.

use super::area::WorkingArea;
use crate::config::WorkerCommand;
use crate::pool::panic_message;
use anyhow::{Context, Result, bail};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use tracing::{debug, warn};

/// Handle for one dispatched package.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

/// How a job ended, as far as the dispatcher can tell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Succeeded,
    Failed(String),
}

pub trait Dispatcher: Send {
    /// Start (or queue) the package for unit `index` of `area`.
    ///
    /// # Errors
    ///
    /// Returns an error if the job cannot even be queued.
    fn run(&mut self, area: &WorkingArea, index: usize) -> Result<JobId>;

    /// Jobs that finished since the last call.
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatcher cannot query its jobs.
    fn poll(&mut self) -> Result<Vec<(JobId, JobStatus)>>;

    /// Jobs queued or running and not yet reported by [`poll`](Self::poll).
    fn running(&self) -> usize;

    /// Stop everything still queued or running.
    ///
    /// # Errors
    ///
    /// Returns an error if running jobs cannot be stopped.
    fn terminate(&mut self) -> Result<()>;
}

impl<D: Dispatcher + ?Sized> Dispatcher for Box<D> {
    fn run(&mut self, area: &WorkingArea, index: usize) -> Result<JobId> {
        (**self).run(area, index)
    }

    fn poll(&mut self) -> Result<Vec<(JobId, JobStatus)>> {
        (**self).poll()
    }

    fn running(&self) -> usize {
        (**self).running()
    }

    fn terminate(&mut self) -> Result<()> {
        (**self).terminate()
    }
}

// ---------------------------------------------------------------------------
// Subprocess dispatcher
// ---------------------------------------------------------------------------

struct QueuedJob {
    id: JobId,
    package: PathBuf,
    stdout: PathBuf,
    stderr: PathBuf,
}

/// Runs `<program> <args..> <package>` per package, optionally capped.
pub struct SubprocessDispatcher {
    command: WorkerCommand,
    max_running: Option<usize>,
    next_id: u64,
    queued: VecDeque<QueuedJob>,
    children: HashMap<JobId, Child>,
    failed_to_start: Vec<(JobId, JobStatus)>,
}

impl SubprocessDispatcher {
    #[must_use]
    pub fn new(command: WorkerCommand) -> Self {
        Self {
            command,
            max_running: None,
            next_id: 0,
            queued: VecDeque::new(),
            children: HashMap::new(),
            failed_to_start: Vec::new(),
        }
    }

    /// Run at most `n` subprocesses at a time; the rest wait in a queue.
    #[must_use]
    pub fn with_max_running(mut self, n: usize) -> Self {
        self.max_running = Some(n.max(1));
        self
    }

    fn start_queued(&mut self) {
        while self.max_running.is_none_or(|cap| self.children.len() < cap) {
            let Some(job) = self.queued.pop_front() else {
                break;
            };
            match self.spawn(&job) {
                Ok(child) => {
                    debug!(job = job.id.0, pid = child.id(), package = %job.package.display(), "worker started");
                    self.children.insert(job.id, child);
                }
                Err(e) => {
                    warn!(job = job.id.0, error = %format!("{e:#}"), "failed to start worker");
                    self.failed_to_start
                        .push((job.id, JobStatus::Failed(format!("{e:#}"))));
                }
            }
        }
    }

    fn spawn(&self, job: &QueuedJob) -> Result<Child> {
        let stdout = File::create(&job.stdout)
            .with_context(|| format!("failed to create {}", job.stdout.display()))?;
        let stderr = File::create(&job.stderr)
            .with_context(|| format!("failed to create {}", job.stderr.display()))?;
        Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(&job.package)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.command.program.display()))
    }
}

impl Dispatcher for SubprocessDispatcher {
    fn run(&mut self, area: &WorkingArea, index: usize) -> Result<JobId> {
        let id = JobId(self.next_id);
        self.next_id += 1;
        let (stdout, stderr) = area.log_paths(index);
        self.queued.push_back(QueuedJob {
            id,
            package: area.package_path(index),
            stdout,
            stderr,
        });
        self.start_queued();
        Ok(id)
    }

    fn poll(&mut self) -> Result<Vec<(JobId, JobStatus)>> {
        let mut finished = std::mem::take(&mut self.failed_to_start);
        let mut done = Vec::new();
        for (id, child) in &mut self.children {
            if let Some(status) = child.try_wait().context("failed to query worker process")? {
                let outcome = if status.success() {
                    JobStatus::Succeeded
                } else {
                    JobStatus::Failed(format!("worker exited with {status}"))
                };
                done.push((*id, outcome));
            }
        }
        for (id, _) in &done {
            self.children.remove(id);
        }
        finished.extend(done);
        self.start_queued();
        Ok(finished)
    }

    fn running(&self) -> usize {
        self.children.len() + self.queued.len() + self.failed_to_start.len()
    }

    fn terminate(&mut self) -> Result<()> {
        self.queued.clear();
        for (id, mut child) in self.children.drain() {
            if let Err(e) = child.kill() {
                warn!(job = id.0, error = %e, "failed to kill worker");
            }
            child.wait().ok();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Thread dispatcher
// ---------------------------------------------------------------------------

type PackageHandler = Arc<dyn Fn(&Path) -> Result<()> + Send + Sync>;

/// Runs packages on a local thread pool through a handler function.
///
/// Packages still go through the disk, so this exercises exactly the path a
/// remote worker takes, minus the process boundary.
pub struct ThreadDispatcher {
    pool: rayon::ThreadPool,
    handler: PackageHandler,
    next_id: u64,
    running: usize,
    tx: Sender<(JobId, JobStatus)>,
    rx: Receiver<(JobId, JobStatus)>,
}

impl ThreadDispatcher {
    /// # Errors
    ///
    /// Returns an error if `threads` is zero or the pool cannot start.
    pub fn new<F>(threads: usize, handler: F) -> Result<Self>
    where
        F: Fn(&Path) -> Result<()> + Send + Sync + 'static,
    {
        if threads == 0 {
            bail!("cannot create a thread dispatcher with 0 threads");
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("ironloop-dropbox-{i}"))
            .build()
            .context("failed to start dispatcher threads")?;
        let (tx, rx) = unbounded();
        Ok(Self {
            pool,
            handler: Arc::new(handler),
            next_id: 0,
            running: 0,
            tx,
            rx,
        })
    }
}

impl Dispatcher for ThreadDispatcher {
    fn run(&mut self, area: &WorkingArea, index: usize) -> Result<JobId> {
        let id = JobId(self.next_id);
        self.next_id += 1;
        self.running += 1;

        let package = area.package_path(index);
        let handler = Arc::clone(&self.handler);
        let tx = self.tx.clone();
        self.pool.spawn(move || {
            let status = match catch_unwind(AssertUnwindSafe(|| handler(&package))) {
                Ok(Ok(())) => JobStatus::Succeeded,
                Ok(Err(e)) => JobStatus::Failed(format!("{e:#}")),
                Err(payload) => JobStatus::Failed(format!("worker panicked: {}", panic_message(payload.as_ref()))),
            };
            let _ = tx.send((id, status));
        });
        Ok(id)
    }

    fn poll(&mut self) -> Result<Vec<(JobId, JobStatus)>> {
        let finished: Vec<_> = self.rx.try_iter().collect();
        self.running -= finished.len();
        Ok(finished)
    }

    fn running(&self) -> usize {
        self.running
    }

    fn terminate(&mut self) -> Result<()> {
        // Threads cannot be interrupted; their results are simply never read.
        Ok(())
    }
}
