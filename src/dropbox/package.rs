//! On-disk encoding of task packages and result files.
//!
//! Both are a `postcard`-encoded [`PackageFile`]: a format version, the
//! SHA-256 of the payload, and the payload itself (the `postcard` encoding of
//! a [`WorkUnit`](crate::unit::WorkUnit) or a
//! [`ResultEnvelope`](crate::unit::ResultEnvelope)). Reading verifies the
//! checksum before decoding the payload.
//!
//! Files are written to a temporary sibling and renamed into place, so a
//! reader polling for a result never sees a half-written file.

use crate::error::DispatchError;
use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs::{File, rename};
use std::io::{Read, Write};
use std::path::Path;

/// Bumped whenever the payload layout changes incompatibly.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct PackageFile {
    format: u32,
    checksum: String,
    payload: Vec<u8>,
}

/// Compute the hex SHA-256 of `data`.
#[must_use]
pub fn compute_checksum(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().fold(String::with_capacity(64), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Encode `value` into package bytes.
///
/// # Errors
///
/// Returns an error if `value` cannot be serialized.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let payload = postcard::to_allocvec(value).map_err(|e| anyhow!("failed to serialize package: {e}"))?;
    let file = PackageFile {
        format: FORMAT_VERSION,
        checksum: compute_checksum(&payload),
        payload,
    };
    postcard::to_allocvec(&file).map_err(|e| anyhow!("failed to serialize package: {e}"))
}

/// Decode package bytes read from `path`.
///
/// # Errors
///
/// Returns [`DispatchError::CorruptPackage`] if the envelope cannot be
/// decoded, has an unknown format version, fails its checksum, or holds a
/// payload of the wrong type.
pub fn decode<T: DeserializeOwned>(bytes: &[u8], path: &Path) -> Result<T> {
    let corrupt = |reason: String| DispatchError::CorruptPackage {
        path: path.to_path_buf(),
        reason,
    };
    let file: PackageFile = postcard::from_bytes(bytes).map_err(|e| corrupt(format!("unreadable envelope: {e}")))?;
    if file.format != FORMAT_VERSION {
        return Err(corrupt(format!(
            "format version {} (expected {FORMAT_VERSION})",
            file.format
        ))
        .into());
    }
    if compute_checksum(&file.payload) != file.checksum {
        return Err(corrupt("checksum mismatch".to_string()).into());
    }
    Ok(postcard::from_bytes(&file.payload).map_err(|e| corrupt(format!("unreadable payload: {e}")))?)
}

/// Encode `value` and write it to `path` atomically.
///
/// # Errors
///
/// Returns an error if encoding fails or the file cannot be written.
pub fn write_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = encode(value)?;
    let tmp = path.with_extension("part");
    let mut file = File::create(&tmp).with_context(|| format!("failed to create {}", tmp.display()))?;
    file.write_all(&bytes)
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    file.sync_all()
        .with_context(|| format!("failed to sync {}", tmp.display()))?;
    rename(&tmp, path).with_context(|| format!("failed to move package into {}", path.display()))?;
    Ok(())
}

/// Read and decode the package at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or fails [`decode`].
pub fn read_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let mut bytes = Vec::new();
    File::open(path)
        .and_then(|mut f| f.read_to_end(&mut bytes))
        .with_context(|| format!("failed to read {}", path.display()))?;
    decode(&bytes, path)
}
