//! DRISC microarchitectural simulator library.
//!
//! This crate implements a cycle-accurate simulator for a many-core,
//! data-driven RISC core (DRISC) chip, with the following:
//! 1. **Core:** a six-stage pipeline (Fetch, Decode, Read, Execute, Memory,
//!    Writeback) over a thread/family execution model, register files with
//!    the synchronizing register window, and set-associative caches.
//! 2. **Network:** the ring interconnect carrying the create token and
//!    delegation/allocation messages between cores in a place.
//! 3. **External collaborators:** a fixed-latency FPU and main memory the
//!    core calls out to rather than models internally.
//! 4. **ISA:** a `Decoder` seam plus one concrete demonstration instruction
//!    set.
//! 5. **Simulation:** `Simulator` (owns a place of cores), the ELF loader,
//!    and configuration.

/// Error taxonomy and identifier newtypes shared across the crate.
pub mod common;
/// Simulator configuration (key/value options, defaults, validation).
pub mod config;
/// One DRISC core: allocator, register files, caches, network, MMIO, pipeline.
pub mod core;
/// External collaborators the core calls out to: the FPU and main memory.
pub mod external;
/// Instruction set (the `Decoder` seam and the demonstration ISA).
pub mod isa;
/// The discrete-event kernel: clocks, arbitrated ports, processes, trace validation.
pub mod kernel;
/// Memory-mapped I/O surface: action device, debug channel, APRs, perfcounters.
pub mod mmio;
/// Simulation: a place of cores, the ELF loader, and the top-level `Simulator`.
pub mod sim;
/// Arbitrated, trace-validated storage primitives (registers, buffers, queues).
pub mod storage;

/// Root configuration type; use `Config::default()` or [`config::Config::from_options`].
pub use crate::config::Config;
/// One DRISC core.
pub use crate::core::Drisc;
/// A ring of cores sharing one main memory.
pub use crate::sim::Place;
/// Top-level cycle driver; owns a place and runs it to completion.
pub use crate::sim::Simulator;
