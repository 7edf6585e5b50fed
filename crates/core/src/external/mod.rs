//! External collaborators the core calls out to (spec §6): the FPU and
//! main memory. Both are deliberately minimal concrete stand-ins — real
//! micro-op latencies, coherence, and DMA protocols are out of scope
//! (spec §1 Non-goals) — just enough to drive the end-to-end scenarios in
//! spec §8 to completion.

pub mod fpu;
pub mod memory;

pub use fpu::Fpu;
pub use memory::MainMemory;
