//! Worker side of the dropbox: run one package, write its result.
//!
//! Because readers and sources are ordinary Rust types, the worker has to be
//! a binary that knows them. The usual setup is for the submitting binary to
//! double as its own worker, forwarding a subcommand to [`execute_package`]:
//!
//! ```no_run
//! use ironloop::dataset::RangeSource;
//! use ironloop::dropbox::execute_package;
//! use ironloop::testing::CountingReader;
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let package = std::env::args().nth(2).expect("package path");
//! execute_package::<RangeSource, CountingReader>(Path::new(&package))?;
//! # Ok(())
//! # }
//! ```

use super::area::WorkingArea;
use super::package;
use crate::dataset::BatchSource;
use crate::reader::Reader;
use crate::unit::WorkUnit;
use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Decode the package at `path`, run its unit, write the result file.
/// Returns the result file's path.
///
/// # Errors
///
/// Returns an error if the package is unreadable, the unit fails, or the
/// result cannot be written. No result file is left behind in that case.
pub fn execute_package<S, R>(path: &Path) -> Result<PathBuf>
where
    S: BatchSource + DeserializeOwned,
    R: Reader<Item = S::Item> + DeserializeOwned,
    R::Results: Serialize,
{
    let unit: WorkUnit<S, R> = package::read_file(path)?;
    let result_path = WorkingArea::result_path_for_package(path)?;
    let envelope = unit.execute()?;
    package::write_file(&result_path, &envelope)?;
    debug!(task = %envelope.id, result = %result_path.display(), "package executed");
    Ok(result_path)
}
