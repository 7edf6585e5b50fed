//! Per-stage input/output latches (spec §4.4: "each stage has an input
//! latch and an output latch; the next stage reads the previous cycle's
//! output").

use crate::common::ids::{RegAddr, Tid};
use crate::isa::decoder::{DecodedInstruction, InstructionControl};

/// What Fetch handed to Decode: the raw word at `pc` for `tid`.
#[derive(Debug, Clone)]
pub struct FetchOutput {
    pub tid: Tid,
    pub pc: u64,
    pub word: Vec<u8>,
}

/// What Decode handed to Read.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOutput {
    pub tid: Tid,
    pub pc: u64,
    pub decoded: DecodedInstruction,
}

/// One source operand's value as Read resolved it (spec §4.4.3:
/// "non-full handling ... forwards X in EMPTY/WAITING form").
#[derive(Debug, Clone, Copy)]
pub enum OperandValue {
    Ready(u64),
    NotReady,
}

impl OperandValue {
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// What Read handed to Execute.
#[derive(Debug, Clone, Copy)]
pub struct ReadOutput {
    pub tid: Tid,
    pub pc: u64,
    pub decoded: DecodedInstruction,
    pub src1: OperandValue,
    pub src2: OperandValue,
}

/// The effect Execute computed, to be carried out by Memory/Writeback.
#[derive(Debug, Clone, Copy)]
pub enum ExecuteEffect {
    /// A plain ALU result ready to write back.
    AluResult(u64),
    /// A load: Memory must issue the D-cache request.
    Load { address: u64, size: u8, sign_extend: bool },
    /// A store: Memory must issue the write.
    Store { address: u64, size: u8, value: u64 },
    /// An FPU op was enqueued; the destination is PENDING until the FPU
    /// resolves it asynchronously (spec §4.4.4).
    FpuPending,
    /// A family-control op was dispatched to the allocator/network this
    /// cycle; nothing more for Memory/Writeback to do.
    Dispatched,
    /// No destination register (e.g. a taken branch, `Nop`, `Exit`).
    NoWriteback,
}

/// What Execute handed to Memory.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteOutput {
    pub tid: Tid,
    pub pc: u64,
    pub rd: RegAddr,
    pub effect: ExecuteEffect,
    pub control: InstructionControl,
}

/// What Memory handed to Writeback: either a value ready to commit or a
/// load parked as PENDING in the register file already.
#[derive(Debug, Clone, Copy)]
pub struct MemoryOutput {
    pub tid: Tid,
    pub rd: RegAddr,
    pub value: Option<u64>,
    pub control: InstructionControl,
}

/// The four pipeline latches, each holding at most one in-flight
/// instruction's output from the previous cycle.
#[derive(Debug, Clone, Default)]
pub struct Latches {
    pub fetch: Option<FetchOutput>,
    pub decode: Option<DecodeOutput>,
    pub read: Option<ReadOutput>,
    pub execute: Option<ExecuteOutput>,
    pub memory: Option<MemoryOutput>,
}
