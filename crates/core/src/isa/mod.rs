//! The instruction-set seam Decode sits behind (spec §4.4.2: "ISA tables
//! are external collaborators"), plus one concrete, clearly-demonstration
//! instruction set used to drive the end-to-end scenarios.

pub mod decoder;
pub mod demo;

pub use decoder::{Decoder, DecodedInstruction, FpuOp, InstructionControl, Opcode};
pub use demo::DemoIsa;
