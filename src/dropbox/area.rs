//! The working area: a directory shared by the submitting process and its
//! workers.
//!
//! ```text
//! <topdir>/tpd_<millis>_<pid>_<seq>/
//!     manifest.jsonl          one (index, tag, dataset) line per package
//!     task_00000.pkg          one package per unit
//!     results/task_00000.res  written by the worker
//!     logs/task_00000.out     subprocess stdout
//!     logs/task_00000.err     subprocess stderr
//! ```
//!
//! The manifest is append-only: submitting a package adds one line.
//!
//! Workers only ever get the package path. The result path is derived from
//! it, so a worker needs no other configuration.

use super::package;
use crate::task_id::TaskId;
use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

const MANIFEST: &str = "manifest.jsonl";
const RESULTS_DIR: &str = "results";
const LOGS_DIR: &str = "logs";
const PACKAGE_EXT: &str = "pkg";
const RESULT_EXT: &str = "res";

static NEXT_AREA: AtomicUsize = AtomicUsize::new(0);

/// One submitted package as recorded in the manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub index: usize,
    pub id: TaskId,
    pub dataset: String,
}

/// Everything submitted into a working area, in submission order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

#[derive(Clone, Debug)]
pub struct WorkingArea {
    path: PathBuf,
}

impl WorkingArea {
    /// Create a fresh working area under `topdir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn create(topdir: &Path) -> Result<Self> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let seq = NEXT_AREA.fetch_add(1, Ordering::Relaxed);
        let path = topdir.join(format!("tpd_{millis}_{}_{seq}", std::process::id()));
        create_dir_all(path.join(RESULTS_DIR))
            .and_then(|()| create_dir_all(path.join(LOGS_DIR)))
            .with_context(|| format!("failed to create working area {}", path.display()))?;
        let manifest = path.join(MANIFEST);
        File::create(&manifest).with_context(|| format!("failed to create {}", manifest.display()))?;
        Ok(Self { path })
    }

    /// Open an existing working area.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` holds no manifest.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.join(MANIFEST).is_file() {
            bail!("{} is not a working area (no {MANIFEST})", path.display());
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn package_path(&self, index: usize) -> PathBuf {
        self.path.join(file_stem(index)).with_extension(PACKAGE_EXT)
    }

    #[must_use]
    pub fn result_path(&self, index: usize) -> PathBuf {
        self.path
            .join(RESULTS_DIR)
            .join(file_stem(index))
            .with_extension(RESULT_EXT)
    }

    /// `(stdout, stderr)` log paths for a package's subprocess.
    #[must_use]
    pub fn log_paths(&self, index: usize) -> (PathBuf, PathBuf) {
        let base = self.path.join(LOGS_DIR).join(file_stem(index));
        (base.with_extension("out"), base.with_extension("err"))
    }

    /// Result path belonging to a package path, as computed on the worker side.
    ///
    /// # Errors
    ///
    /// Returns an error if `package` has no parent directory or file name.
    pub fn result_path_for_package(package: &Path) -> Result<PathBuf> {
        let (Some(dir), Some(stem)) = (package.parent(), package.file_stem()) else {
            bail!("{} is not a package path", package.display());
        };
        Ok(dir.join(RESULTS_DIR).join(stem).with_extension(RESULT_EXT))
    }

    /// Write the package for unit `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the package cannot be encoded or written.
    pub fn put_package<T: Serialize>(&self, index: usize, unit: &T) -> Result<PathBuf> {
        let path = self.package_path(index);
        package::write_file(&path, unit)?;
        Ok(path)
    }

    /// Decode the package for unit `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the package is missing or corrupt.
    pub fn load_package<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        package::read_file(&self.package_path(index))
    }

    /// Decode the result for unit `index`, if the worker has written one.
    ///
    /// # Errors
    ///
    /// Returns an error if a result file exists but cannot be decoded.
    pub fn collect_result<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>> {
        let path = self.result_path(index);
        if !path.is_file() {
            return Ok(None);
        }
        package::read_file(&path).map(Some)
    }

    /// Read every entry recorded so far.
    ///
    /// A final line cut short by an interrupted append is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is missing or a complete line is
    /// malformed.
    pub fn read_manifest(&self) -> Result<Manifest> {
        let path = self.path.join(MANIFEST);
        let text = fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let mut entries = Vec::new();
        let mut lines = text.split_inclusive('\n').enumerate().peekable();
        while let Some((n, line)) = lines.next() {
            if line.trim().is_empty() {
                continue;
            }
            let torn = lines.peek().is_none() && !line.ends_with('\n');
            match serde_json::from_str::<ManifestEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(_) if torn => {
                    warn!(manifest = %path.display(), "ignoring incomplete last line");
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("malformed line {} of {}", n + 1, path.display()));
                }
            }
        }
        Ok(Manifest { entries })
    }

    /// Record one submitted package.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be appended to.
    pub fn append_manifest(&self, entry: &ManifestEntry) -> Result<()> {
        let path = self.path.join(MANIFEST);
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        OpenOptions::new()
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .with_context(|| format!("failed to append to {}", path.display()))
    }
}

fn file_stem(index: usize) -> String {
    format!("task_{index:05}")
}
