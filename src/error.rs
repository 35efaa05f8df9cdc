//! Typed failures raised by the dispatch core.
//!
//! Public APIs return [`anyhow::Result`]. Conditions a caller may want to
//! branch on are raised as a [`DispatchError`] and can be recovered with
//! `err.downcast_ref::<DispatchError>()`.
//!
//! A reconciliation shortfall is deliberately *not* an error; it is reported
//! through [`RunOutcome`](crate::runner::RunOutcome).

use crate::task_id::TaskId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// A result came back whose tag matches no pending submission. Covers
    /// both unknown tags and a second result for an already reconciled tag.
    #[error("protocol mismatch: result for {id} matches no pending submission")]
    ProtocolMismatch { id: TaskId },

    #[error("no session in progress; call begin() first")]
    SessionNotStarted,

    #[error("a session is already in progress; call end() before begin()")]
    SessionActive,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("corrupt task package {}: {reason}", path.display())]
    CorruptPackage { path: PathBuf, reason: String },
}
