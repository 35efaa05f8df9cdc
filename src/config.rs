//! Run configuration: which backend, how many workers, how to split.
//!
//! [`ParallelConfig`] can be built in code (it implements `Default`) or read
//! from JSON:
//!
//! ```
//! use ironloop::config::{ParallelConfig, ParallelMode};
//!
//! let config = ParallelConfig::from_json_str(r#"{
//!     "mode": "pool",
//!     "processes": 8,
//!     "split": { "max_items_per_unit": 50000 }
//! }"#).unwrap();
//!
//! assert_eq!(config.mode, ParallelMode::Pool);
//! assert_eq!(config.split.max_items_per_unit, Some(50000));
//! assert!(config.quiet);
//! ```

use crate::dataset::SplitPolicy;
use crate::error::DispatchError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Where work units run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParallelMode {
    /// On the caller's thread, inside `put`.
    Sequential,
    /// On a fixed pool of threads in this process.
    #[default]
    Pool,
    /// As task packages on disk, each run by a worker subprocess.
    Subprocess,
    /// As task packages on disk, run by local threads.
    Threads,
}

impl ParallelMode {
    pub const ALL: [Self; 4] = [Self::Sequential, Self::Pool, Self::Subprocess, Self::Threads];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Pool => "pool",
            Self::Subprocess => "subprocess",
            Self::Threads => "threads",
        }
    }

    /// Whether this mode goes through the on-disk dropbox.
    #[must_use]
    pub const fn uses_dropbox(self) -> bool {
        matches!(self, Self::Subprocess | Self::Threads)
    }

    /// Parse `name`, falling back to the default mode with a warning.
    #[must_use]
    pub fn from_name_or_default(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            let fallback = Self::default();
            warn!(requested = name, fallback = fallback.name(), "unknown parallel mode; using default");
            fallback
        })
    }
}

impl fmt::Display for ParallelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParallelMode {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| DispatchError::InvalidConfig(format!("unknown parallel mode {s:?}")))
    }
}

/// Command line used by the subprocess dispatcher. The package path is
/// appended as the last argument.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Everything needed to build a channel and monitor for a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    pub mode: ParallelMode,
    /// Worker threads for `pool` and `threads`; `0` with `pool` means sequential.
    pub processes: usize,
    /// Suppress progress output.
    pub quiet: bool,
    /// Longest a single poll of the channel may wait.
    pub poll_interval_ms: u64,
    pub split: SplitPolicy,
    /// Parent directory for dropbox working areas.
    pub working_dir: PathBuf,
    /// Required for `subprocess`.
    pub worker: Option<WorkerCommand>,
    /// Cap on concurrently running subprocesses; `None` runs all at once.
    pub max_running: Option<usize>,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            mode: ParallelMode::default(),
            processes: num_cpus::get(),
            quiet: true,
            poll_interval_ms: 20,
            split: SplitPolicy::default(),
            working_dir: PathBuf::from("./_ironloop_temp"),
            worker: None,
            max_running: None,
        }
    }
}

impl ParallelConfig {
    /// Parse and validate a JSON configuration. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or fails [`validate`](Self::validate).
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("failed to parse parallel config")?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its contents are invalid.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("in config {}", path.display()))
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| -> Result<()> {
            Err(DispatchError::InvalidConfig(msg.to_string()).into())
        };
        if self.poll_interval_ms == 0 {
            return invalid("poll_interval_ms must be > 0");
        }
        if self.split.max_units == Some(0) {
            return invalid("split.max_units must be > 0");
        }
        if self.split.max_items_per_unit == Some(0) {
            return invalid("split.max_items_per_unit must be > 0");
        }
        if self.mode == ParallelMode::Threads && self.processes == 0 {
            return invalid("mode \"threads\" needs processes > 0");
        }
        if self.mode == ParallelMode::Subprocess && self.worker.is_none() {
            return invalid("mode \"subprocess\" needs a worker command");
        }
        if self.max_running == Some(0) {
            return invalid("max_running must be > 0");
        }
        Ok(())
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
