//! Error taxonomy for the simulator.
//!
//! This module defines the kinds of failure the simulator can surface, per
//! spec §7. Two are distinguished at the type level:
//!
//! 1. **Retryable** (`FAILED`): represented by [`crate::kernel::process::CycleResult`],
//!    not by this module — a stage returning `Failed` is routine and is
//!    retried next cycle, so it never becomes a `SimError`.
//! 2. **Fatal**: represented by [`SimError`] here. Escalates by unwinding
//!    through the cycle driver and terminates the run with a structured
//!    diagnostic.

use thiserror::Error;

use crate::common::ids::{Lfid, Pid, Tid};

/// Top-level fatal error, returned by [`crate::sim::simulator::Simulator::run`]
/// and by component constructors that reject invalid configuration.
#[derive(Debug, Error)]
pub enum SimError {
    /// A configuration or runtime request violated a documented
    /// precondition (spec §7 `InvalidArgument`).
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] InvalidArgument),

    /// A program attempted an access the MMU does not permit (spec §7
    /// `Security`).
    #[error("security violation: {0}")]
    Security(String),

    /// The decoder could not classify an instruction's bits (spec §7
    /// `IllegalInstruction`).
    #[error("illegal instruction {opcode:#x} at pc {pc:#x} on core {pid:?}")]
    IllegalInstruction {
        /// Program counter of the faulting instruction.
        pc: u64,
        /// Raw encoding that could not be decoded.
        opcode: u32,
        /// Core the fault occurred on.
        pid: Pid,
    },

    /// The program requested normal termination or an abort via the action
    /// MMIO device (spec §7 `ProgramTermination`).
    #[error("program terminated with exit code {0}")]
    ProgramTermination(i32),

    /// A full master cycle passed with every runnable process returning
    /// `FAILED` (spec §7 `Deadlock`, spec §8 property 6/E6).
    #[error("deadlock detected at cycle {cycle}: stuck processes {stuck:?}")]
    Deadlock {
        /// Master cycle at which the deadlock was detected.
        cycle: u64,
        /// Names of the processes that returned `FAILED` this cycle.
        stuck: Vec<String>,
    },

    /// Any other internal invariant violation (spec §7
    /// `SimulationException`).
    #[error("simulation invariant violated in {component}: {detail}")]
    SimulationException {
        /// Dotted component path (e.g. `"core0.pipeline.writeback"`).
        component: String,
        /// Human-readable description of the violated invariant.
        detail: String,
    },
}

/// A documented precondition that a configuration value or runtime request
/// violated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidArgument {
    /// A configuration option was not recognized (spec §6.4).
    #[error("unrecognized configuration option {0:?}")]
    UnknownOption(String),

    /// A value that must be a power of two was not (spec §6.4, e.g.
    /// `CacheLineSize`, `{Dc,Ic}CacheAssoc/Sets`).
    #[error("{field} must be a power of two, got {value}")]
    NotPowerOfTwo {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: u64,
    },

    /// A memory access was not aligned to the size it requested.
    #[error("unaligned access: address {address:#x} is not aligned to {size} bytes")]
    UnalignedAccess {
        /// The misaligned address.
        address: u64,
        /// The required alignment, in bytes.
        size: usize,
    },

    /// A read or write spanned a cache-line boundary (spec §8 property 11).
    #[error("access at {address:#x} of size {size} spans a cache-line boundary")]
    SpansCacheLine {
        /// The starting address of the access.
        address: u64,
        /// The size of the access, in bytes.
        size: usize,
    },

    /// A register index fell outside the addressable range for its bank.
    #[error("register index {index} out of range (file size {size})")]
    RegisterOutOfRange {
        /// The requested index.
        index: u32,
        /// The size of the register file it was requested from.
        size: u32,
    },

    /// A thread or family identifier referred to a slot that does not exist
    /// in the relevant table.
    #[error("{kind} id {id} out of range (table size {size})")]
    IdOutOfRange {
        /// `"thread"` or `"family"`.
        kind: &'static str,
        /// The requested id.
        id: u32,
        /// The size of the table it was requested from.
        size: u32,
    },
}

/// Context attached to an error once it is known which family or thread was
/// involved; used by the allocator to enrich lower-level errors without
/// every call site having to thread ids through manually.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorContext {
    /// Core the error occurred on, if known.
    pub pid: Option<Pid>,
    /// Family the error occurred on, if known.
    pub lfid: Option<Lfid>,
    /// Thread the error occurred on, if known.
    pub tid: Option<Tid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_converts_into_sim_error() {
        let err: SimError = InvalidArgument::NotPowerOfTwo {
            field: "CacheLineSize",
            value: 7,
        }
        .into();
        assert!(matches!(err, SimError::InvalidArgument(_)));
        assert!(err.to_string().contains("CacheLineSize"));
    }

    #[test]
    fn deadlock_display_names_stuck_processes() {
        let err = SimError::Deadlock {
            cycle: 42,
            stuck: vec!["fetch@core0".into(), "dcache.outgoing".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("42"));
    }
}
