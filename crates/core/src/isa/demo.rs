//! `DemoIsa`: a minimal, clearly-demonstration instruction set with just
//! enough opcodes to drive integer arithmetic, loads/stores, branches,
//! and the family-control operations (spec §4.5) through the pipeline.
//! Not a port of any real architecture.
//!
//! Encoding: fixed 16-byte words, little-endian fields:
//!
//! ```text
//! byte 0:     opcode
//! byte 1:     control (bit0 = wantSwitch, bit1 = killAfter)
//! bytes 2-3:  rd  (register type in bit 15, index in bits 0-14)
//! bytes 4-5:  rs1 (same encoding)
//! bytes 6-7:  rs2 (same encoding)
//! bytes 8-15: imm (i64, little-endian)
//! ```

use crate::common::ids::{RegAddr, RegIndex, RegType, INVALID_REG_INDEX};

use super::decoder::{
    DecodedInstruction, Decoder, FamilyControlOp, FpuOp, InstructionControl, Opcode,
};

pub const INSTRUCTION_SIZE: usize = 16;

mod raw_opcode {
    pub const NOP: u8 = 0x00;
    pub const ADD_IMM: u8 = 0x01;
    pub const ADD: u8 = 0x02;
    pub const SUB: u8 = 0x03;
    pub const MUL: u8 = 0x04;
    pub const LOAD_W: u8 = 0x10;
    pub const LOAD_B_S: u8 = 0x11;
    pub const STORE_W: u8 = 0x18;
    pub const BEQZ: u8 = 0x20;
    pub const JUMP: u8 = 0x21;
    pub const FADD: u8 = 0x28;
    pub const FSUB: u8 = 0x29;
    pub const ALLOCATE: u8 = 0x30;
    pub const CREATE: u8 = 0x31;
    pub const GROUP_CREATE: u8 = 0x32;
    pub const SET_PROPERTY: u8 = 0x33;
    pub const SYNC: u8 = 0x34;
    pub const DETACH: u8 = 0x35;
    pub const BREAK: u8 = 0x36;
    pub const EXIT: u8 = 0x3f;
}

fn decode_reg_addr(bytes: [u8; 2]) -> RegAddr {
    let raw = u16::from_le_bytes(bytes);
    let index = (raw & 0x7fff) as RegIndex;
    if index == 0x7fff {
        return RegAddr::INVALID;
    }
    let rtype = if raw & 0x8000 != 0 { RegType::Float } else { RegType::Integer };
    RegAddr { rtype, index }
}

fn encode_reg_addr(addr: RegAddr) -> [u8; 2] {
    if !addr.is_valid() || addr.index == INVALID_REG_INDEX {
        return 0x7fffu16.to_le_bytes();
    }
    let mut raw = addr.index as u16;
    if matches!(addr.rtype, RegType::Float) {
        raw |= 0x8000;
    }
    raw.to_le_bytes()
}

/// A single [`DemoIsa`] instruction, as constructed by tests and the demo
/// loader before being encoded to bytes.
#[derive(Debug, Clone, Copy)]
pub struct DemoInstruction {
    pub opcode: Opcode,
    pub rd: RegAddr,
    pub rs1: RegAddr,
    pub rs2: RegAddr,
    pub imm: i64,
    pub control: InstructionControl,
}

impl DemoInstruction {
    #[must_use]
    pub fn encode(self) -> [u8; INSTRUCTION_SIZE] {
        let mut word = [0u8; INSTRUCTION_SIZE];
        let (raw, extra) = encode_opcode(self.opcode);
        word[0] = raw;
        word[1] = u8::from(self.control.want_switch) | (u8::from(self.control.kill_after) << 1);
        word[2..4].copy_from_slice(&encode_reg_addr(self.rd));
        word[4..6].copy_from_slice(&encode_reg_addr(self.rs1));
        word[6..8].copy_from_slice(&encode_reg_addr(self.rs2));
        let imm = extra.unwrap_or(self.imm);
        word[8..16].copy_from_slice(&imm.to_le_bytes());
        word
    }
}

fn encode_opcode(opcode: Opcode) -> (u8, Option<i64>) {
    use raw_opcode::*;
    match opcode {
        Opcode::Nop => (NOP, None),
        Opcode::AddImm => (ADD_IMM, None),
        Opcode::Add => (ADD, None),
        Opcode::Sub => (SUB, None),
        Opcode::Mul => (MUL, None),
        Opcode::Load { size: 4, sign_extend: false } => (LOAD_W, None),
        Opcode::Load { size, sign_extend: true } => (LOAD_B_S, Some(i64::from(size))),
        Opcode::Load { .. } => (LOAD_W, None),
        Opcode::Store { .. } => (STORE_W, None),
        Opcode::BranchEqZero => (BEQZ, None),
        Opcode::Jump => (JUMP, None),
        Opcode::Fpu(FpuOp::Add) => (FADD, None),
        Opcode::Fpu(FpuOp::Sub) => (FSUB, None),
        Opcode::Fpu(_) => (FADD, None),
        Opcode::FamilyControl(FamilyControlOp::Allocate) => (ALLOCATE, None),
        Opcode::FamilyControl(FamilyControlOp::Create { is_group: false }) => (CREATE, None),
        Opcode::FamilyControl(FamilyControlOp::Create { is_group: true }) => (GROUP_CREATE, None),
        Opcode::FamilyControl(FamilyControlOp::SetProperty) => (SET_PROPERTY, None),
        Opcode::FamilyControl(FamilyControlOp::Sync) => (SYNC, None),
        Opcode::FamilyControl(FamilyControlOp::Detach) => (DETACH, None),
        Opcode::FamilyControl(FamilyControlOp::Break) => (BREAK, None),
        Opcode::Exit => (EXIT, None),
    }
}

/// The demonstration ISA's decoder (spec §4.4.2's `Decoder` seam).
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoIsa;

impl Decoder for DemoIsa {
    fn instruction_size(&self) -> usize {
        INSTRUCTION_SIZE
    }

    fn decode(&self, word: &[u8]) -> Option<DecodedInstruction> {
        if word.len() < INSTRUCTION_SIZE {
            return None;
        }
        let raw = word[0];
        let control = InstructionControl {
            want_switch: word[1] & 0x1 != 0,
            kill_after: word[1] & 0x2 != 0,
        };
        let rd = decode_reg_addr([word[2], word[3]]);
        let rs1 = decode_reg_addr([word[4], word[5]]);
        let rs2 = decode_reg_addr([word[6], word[7]]);
        let imm = i64::from_le_bytes(word[8..16].try_into().expect("exactly 8 bytes"));

        let opcode = match raw {
            raw_opcode::NOP => Opcode::Nop,
            raw_opcode::ADD_IMM => Opcode::AddImm,
            raw_opcode::ADD => Opcode::Add,
            raw_opcode::SUB => Opcode::Sub,
            raw_opcode::MUL => Opcode::Mul,
            raw_opcode::LOAD_W => Opcode::Load { size: 4, sign_extend: false },
            raw_opcode::LOAD_B_S => Opcode::Load {
                size: u8::try_from(imm).ok()?,
                sign_extend: true,
            },
            raw_opcode::STORE_W => Opcode::Store { size: 4 },
            raw_opcode::BEQZ => Opcode::BranchEqZero,
            raw_opcode::JUMP => Opcode::Jump,
            raw_opcode::FADD => Opcode::Fpu(FpuOp::Add),
            raw_opcode::FSUB => Opcode::Fpu(FpuOp::Sub),
            raw_opcode::ALLOCATE => Opcode::FamilyControl(FamilyControlOp::Allocate),
            raw_opcode::CREATE => Opcode::FamilyControl(FamilyControlOp::Create { is_group: false }),
            raw_opcode::GROUP_CREATE => Opcode::FamilyControl(FamilyControlOp::Create { is_group: true }),
            raw_opcode::SET_PROPERTY => Opcode::FamilyControl(FamilyControlOp::SetProperty),
            raw_opcode::SYNC => Opcode::FamilyControl(FamilyControlOp::Sync),
            raw_opcode::DETACH => Opcode::FamilyControl(FamilyControlOp::Detach),
            raw_opcode::BREAK => Opcode::FamilyControl(FamilyControlOp::Break),
            raw_opcode::EXIT => Opcode::Exit,
            _ => return None,
        };

        Some(DecodedInstruction { opcode, rd, rs1, rs2, imm, control })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_imm_round_trips_through_encode_decode() {
        let instr = DemoInstruction {
            opcode: Opcode::AddImm,
            rd: RegAddr { rtype: RegType::Integer, index: 4 },
            rs1: RegAddr { rtype: RegType::Integer, index: 1 },
            rs2: RegAddr::INVALID,
            imm: -7,
            control: InstructionControl::default(),
        };
        let word = instr.encode();
        let decoded = DemoIsa.decode(&word).unwrap();
        assert!(matches!(decoded.opcode, Opcode::AddImm));
        assert_eq!(decoded.rd.index, 4);
        assert_eq!(decoded.imm, -7);
        assert!(!decoded.rs2.is_valid());
    }

    #[test]
    fn unknown_opcode_byte_is_illegal() {
        let mut word = [0u8; INSTRUCTION_SIZE];
        word[0] = 0xEE;
        assert!(DemoIsa.decode(&word).is_none());
    }

    #[test]
    fn short_word_is_illegal() {
        assert!(DemoIsa.decode(&[0u8; 4]).is_none());
    }

    #[test]
    fn control_bits_round_trip() {
        let instr = DemoInstruction {
            opcode: Opcode::Nop,
            rd: RegAddr::INVALID,
            rs1: RegAddr::INVALID,
            rs2: RegAddr::INVALID,
            imm: 0,
            control: InstructionControl { want_switch: true, kill_after: true },
        };
        let decoded = DemoIsa.decode(&instr.encode()).unwrap();
        assert!(decoded.control.want_switch);
        assert!(decoded.control.kill_after);
    }
}
