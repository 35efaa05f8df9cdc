//! Identity tag attached to every submitted work unit.
//!
//! Each [`WorkUnit`](crate::unit::WorkUnit) put on a channel gets a sequential
//! `TaskId` from the runner's session. The tag travels with the unit through
//! every backend (including the on-disk packages of the dropbox backend) and
//! comes back on the matching [`ResultEnvelope`](crate::unit::ResultEnvelope).
//!
//! Tags are only used to pair a result with its submission. They say nothing
//! about ordering or completion.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique numeric identifier for a submitted work unit.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct TaskId(u64);

impl TaskId {
    /// Create a new `TaskId` (used internally by the session).
    pub(crate) const fn new(v: u64) -> Self {
        Self(v)
    }

    /// Return the underlying numeric value.
    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}
