//! The per-cycle tick outcome every pipeline stage, cache, and table
//! upkeep routine in this crate reports (spec §4.1).
//!
//! A stage that touches staged storage (see [`crate::storage`]) is
//! responsible for its own commit/rollback discipline: call a storage's
//! `commit` when about to return [`CycleResult::Success`], or leave it
//! untouched (for the caller to `rollback`) when returning
//! [`CycleResult::Failed`] — a stage must never leave a storage with a
//! dangling pending write across cycle boundaries.

/// Outcome of running one stage's worth of work for a cycle (spec §4.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleResult {
    /// Real work occurred; staged writes should be committed.
    Success,
    /// The stage had nothing to do this cycle (not sensitized to any
    /// work); this is not an error and does not count toward deadlock
    /// detection.
    Delayed,
    /// A resource the stage needed (an arbitrated port, a full buffer,
    /// an empty register it wanted to read) was unavailable. The stage
    /// must be retried next cycle with no commits applied.
    Failed,
}
