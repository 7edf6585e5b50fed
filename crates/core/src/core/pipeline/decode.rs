//! Decode (spec §4.4.2): pure translation of an instruction word into
//! opcode, operand addresses, immediate, and control bits. ISA tables are
//! an external collaborator (the [`crate::isa::Decoder`] trait); illegal
//! encodings are fatal.

use tracing::trace;

use crate::common::error::SimError;
use crate::common::ids::Pid;
use crate::core::allocator::Allocator;
use crate::isa::Decoder;
use crate::kernel::process::CycleResult;

use super::latches::{DecodeOutput, Latches};

#[derive(Debug, Default)]
pub struct Decode;

impl Decode {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Consumes the Fetch latch, if any, decodes it, and translates its
    /// operand addresses from the thread's logical register window into
    /// the physical addresses the rest of the pipeline reads and writes
    /// (spec §4.4.2/§4.5 `GetRegisterType`) — every later stage (the
    /// bypass ladder, the register file itself) only ever sees physical
    /// addresses.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::IllegalInstruction`] if the decoder rejects the
    /// word — spec §4.4.2's fatal "illegal instruction" condition, with
    /// the faulting PC pinned.
    pub fn tick(
        &mut self,
        decoder: &dyn Decoder,
        pid: Pid,
        allocator: &Allocator,
        latches: &mut Latches,
    ) -> Result<CycleResult, SimError> {
        let Some(fetched) = latches.fetch.take() else {
            return Ok(CycleResult::Delayed);
        };
        let Some(mut decoded) = decoder.decode(&fetched.word) else {
            let mut opcode_bytes = [0u8; 4];
            let n = fetched.word.len().min(4);
            opcode_bytes[..n].copy_from_slice(&fetched.word[..n]);
            return Err(SimError::IllegalInstruction {
                pc: fetched.pc,
                opcode: u32::from_le_bytes(opcode_bytes),
                pid,
            });
        };
        let lfid = allocator.threads().get(fetched.tid).family;
        decoded.rd = allocator.translate_register(lfid, fetched.tid, decoded.rd);
        decoded.rs1 = allocator.translate_register(lfid, fetched.tid, decoded.rs1);
        decoded.rs2 = allocator.translate_register(lfid, fetched.tid, decoded.rs2);
        trace!(tid = ?fetched.tid, pc = fetched.pc, opcode = ?decoded.opcode, "decode");
        latches.decode = Some(DecodeOutput { tid: fetched.tid, pc: fetched.pc, decoded });
        Ok(CycleResult::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ids::{RegType, Tid};
    use crate::core::allocator::RegisterShape;
    use crate::core::family::ContextType;
    use crate::core::rau::RAUnit;
    use crate::isa::decoder::{InstructionControl, Opcode};
    use crate::isa::demo::DemoInstruction;
    use crate::isa::DemoIsa;
    use crate::kernel::trace::StorageRegistry;

    /// An allocator with one active thread (tid 0, family 0) whose
    /// identity window maps every logical index straight onto the same
    /// physical index, so tests can keep using bare register indices.
    fn allocator_with_boot_thread() -> Allocator {
        let mut registry = StorageRegistry::new();
        let shape = RegisterShape { globals: 8, shareds: 4, locals: 8 };
        let mut allocator = Allocator::new(
            Pid::from(0_usize),
            4,
            8,
            1,
            RAUnit::new(128, 4, 1),
            RAUnit::new(128, 4, 1),
            shape,
            shape,
            &mut registry,
        );
        let lfid = allocator.allocate_family(ContextType::Normal).unwrap();
        assert!(allocator.allocate_boot_registers(lfid));
        let tid = allocator.allocate_thread(lfid).unwrap();
        assert!(allocator.activate_thread(tid));
        allocator
    }

    #[test]
    fn illegal_word_is_fatal() {
        let allocator = allocator_with_boot_thread();
        let mut latches = Latches::default();
        latches.fetch = Some(super::super::latches::FetchOutput {
            tid: Tid::from(0_usize),
            pc: 0x100,
            word: vec![0xEE; 16],
        });
        let mut decode = Decode::new();
        let err = decode.tick(&DemoIsa, Pid::from(0_usize), &allocator, &mut latches).unwrap_err();
        assert!(matches!(err, SimError::IllegalInstruction { pc: 0x100, .. }));
    }

    #[test]
    fn legal_word_populates_decode_latch() {
        let allocator = allocator_with_boot_thread();
        let instr = DemoInstruction {
            opcode: Opcode::Add,
            rd: crate::common::ids::RegAddr { rtype: RegType::Integer, index: 2 },
            rs1: crate::common::ids::RegAddr { rtype: RegType::Integer, index: 0 },
            rs2: crate::common::ids::RegAddr { rtype: RegType::Integer, index: 1 },
            imm: 0,
            control: InstructionControl::default(),
        };
        let mut latches = Latches::default();
        latches.fetch = Some(super::super::latches::FetchOutput {
            tid: Tid::from(0_usize),
            pc: 0,
            word: instr.encode().to_vec(),
        });
        let mut decode = Decode::new();
        let result = decode.tick(&DemoIsa, Pid::from(0_usize), &allocator, &mut latches).unwrap();
        assert_eq!(result, CycleResult::Success);
        let out = latches.decode.unwrap();
        // The boot family's identity window has base 0, so a logical
        // global index translates to the same physical index.
        assert_eq!(out.decoded.rd, crate::common::ids::RegAddr { rtype: RegType::Integer, index: 2 });
    }
}
