//! Cross-cutting primitives the real cycle driver ([`crate::sim::Place`])
//! builds on: the per-stage tick outcome ([`process::CycleResult`]) and
//! the storage-identity/trace bookkeeping ([`trace`]) components use to
//! report what they touched in a cycle.

pub mod process;
pub mod trace;
