//! Read (spec §4.4.3): resolves up to two source operands through the
//! bypass ladder (execute-out, memory-out, writeback-out, register-file)
//! before falling through to the register file itself.

use tracing::trace;

use crate::common::ids::RegAddr;
use crate::core::regfile::{RegCell, RegisterFile};
use crate::kernel::process::CycleResult;

use super::latches::{ExecuteEffect, Latches, OperandValue, ReadOutput};

#[derive(Debug, Default)]
pub struct Read;

impl Read {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Resolves `addr` through the bypass ladder, falling through to the
    /// register file read port if no in-flight latch supplies it.
    fn resolve(addr: RegAddr, latches: &Latches, regfile: &RegisterFile) -> OperandValue {
        if !addr.is_valid() {
            return OperandValue::Ready(0);
        }
        if let Some(exec) = &latches.execute {
            if exec.rd == addr {
                if let ExecuteEffect::AluResult(v) = exec.effect {
                    return OperandValue::Ready(v);
                }
            }
        }
        if let Some(mem) = &latches.memory {
            if mem.rd == addr {
                if let Some(v) = mem.value {
                    return OperandValue::Ready(v);
                }
                return OperandValue::NotReady;
            }
        }
        match regfile.read(addr) {
            Ok(RegCell::Full(v)) => OperandValue::Ready(*v),
            Ok(_) | Err(_) => OperandValue::NotReady,
        }
    }

    /// Consumes the Decode latch and resolves both source operands.
    pub fn tick(
        &mut self,
        int_regfile: &RegisterFile,
        flt_regfile: &RegisterFile,
        latches: &mut Latches,
    ) -> CycleResult {
        let Some(decoded) = latches.decode.take() else {
            return CycleResult::Delayed;
        };
        let pick = |addr: RegAddr| -> &RegisterFile {
            match addr.rtype {
                crate::common::ids::RegType::Integer => int_regfile,
                crate::common::ids::RegType::Float => flt_regfile,
            }
        };
        let src1 = Self::resolve(decoded.decoded.rs1, latches, pick(decoded.decoded.rs1));
        let src2 = Self::resolve(decoded.decoded.rs2, latches, pick(decoded.decoded.rs2));
        trace!(tid = ?decoded.tid, pc = decoded.pc, "read");
        latches.read = Some(ReadOutput {
            tid: decoded.tid,
            pc: decoded.pc,
            decoded: decoded.decoded,
            src1,
            src2,
        });
        CycleResult::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ids::{RegType, Tid};
    use crate::isa::decoder::{DecodedInstruction, InstructionControl, Opcode};
    use crate::kernel::trace::StorageRegistry;

    fn addr(index: u32) -> RegAddr {
        RegAddr { rtype: RegType::Integer, index }
    }

    #[test]
    fn reads_fall_through_to_register_file_when_not_full() {
        let mut registry = StorageRegistry::new();
        let int_regfile = RegisterFile::new(RegType::Integer, 8, &mut registry);
        let flt_regfile = RegisterFile::new(RegType::Float, 8, &mut registry);
        let mut latches = Latches::default();
        latches.decode = Some(super::super::latches::DecodeOutput {
            tid: Tid::from(0_usize),
            pc: 0,
            decoded: DecodedInstruction {
                opcode: Opcode::Add,
                rd: addr(2),
                rs1: addr(0),
                rs2: addr(1),
                imm: 0,
                control: InstructionControl::default(),
            },
        });
        let mut read = Read::new();
        let result = read.tick(&int_regfile, &flt_regfile, &mut latches);
        assert_eq!(result, CycleResult::Success);
        let out = latches.read.unwrap();
        assert!(!out.src1.is_ready());
    }

    #[test]
    fn execute_out_bypass_supplies_a_value() {
        let mut registry = StorageRegistry::new();
        let int_regfile = RegisterFile::new(RegType::Integer, 8, &mut registry);
        let flt_regfile = RegisterFile::new(RegType::Float, 8, &mut registry);
        let mut latches = Latches::default();
        latches.execute = Some(super::super::latches::ExecuteOutput {
            tid: Tid::from(0_usize),
            pc: 0,
            rd: addr(0),
            effect: ExecuteEffect::AluResult(99),
            control: InstructionControl::default(),
        });
        latches.decode = Some(super::super::latches::DecodeOutput {
            tid: Tid::from(1_usize),
            pc: 4,
            decoded: DecodedInstruction {
                opcode: Opcode::Add,
                rd: addr(2),
                rs1: addr(0),
                rs2: RegAddr::INVALID,
                imm: 0,
                control: InstructionControl::default(),
            },
        });
        let mut read = Read::new();
        read.tick(&int_regfile, &flt_regfile, &mut latches);
        let out = latches.read.unwrap();
        assert!(matches!(out.src1, OperandValue::Ready(99)));
    }
}
