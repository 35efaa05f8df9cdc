//! The reader plug-in contract.
//!
//! A [`Reader`] is the user's stateful processing object. The runner never
//! hands the user's reader to a backend: every work unit gets its own clone,
//! made with [`Clone::clone`] before submission. `Clone` is therefore part of
//! the contract and must be *deep*: a clone may not share mutable state with
//! the original or with sibling clones. Readers holding `Rc`/`Arc` handles to
//! interior-mutable state break this and will see cross-unit interference on
//! the sequential backend and data races on the others.
//!
//! Lifecycle inside a backend:
//!
//! 1. [`begin`](Reader::begin) once, with the unit's [`UnitContext`]
//! 2. [`read`](Reader::read) for every item the unit's source yields
//! 3. [`end`](Reader::end) once, returning the accumulated results
//!
//! Back on the submitting side the results are written into the clone that
//! was recorded at submission with [`set_results`](Reader::set_results).
//!
//! # Example
//!
//! ```
//! use ironloop::reader::Reader;
//! use ironloop::unit::UnitContext;
//!
//! #[derive(Clone, Default)]
//! struct SumReader {
//!     sum: u64,
//! }
//!
//! impl Reader for SumReader {
//!     type Item = u64;
//!     type Results = u64;
//!
//!     fn read(&mut self, item: &u64) {
//!         self.sum += *item;
//!     }
//!
//!     fn end(&mut self) -> u64 {
//!         self.sum
//!     }
//!
//!     fn set_results(&mut self, results: u64) {
//!         self.sum = results;
//!     }
//!
//!     fn results(&self) -> Option<&u64> {
//!         Some(&self.sum)
//!     }
//! }
//! ```

use crate::unit::UnitContext;

/// Stateful per-item processor, cloned once per work unit.
pub trait Reader: Clone + Send + 'static {
    /// Item type consumed by [`read`](Reader::read).
    type Item;
    /// What a finished unit sends back to the submitting side.
    type Results: Send + 'static;

    /// Called once before the first item of a unit.
    fn begin(&mut self, ctx: &UnitContext) {
        let _ = ctx;
    }

    /// Process one item.
    fn read(&mut self, item: &Self::Item);

    /// Called once after the last item; returns the unit's results.
    fn end(&mut self) -> Self::Results;

    /// Install results produced by a (possibly remote) copy of this reader.
    fn set_results(&mut self, results: Self::Results);

    /// Results held by this reader, if any have been produced or installed.
    fn results(&self) -> Option<&Self::Results>;
}
