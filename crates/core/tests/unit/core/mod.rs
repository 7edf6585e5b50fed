//! A core's family/thread lifecycle driven end to end through the
//! pipeline's `FamilyControl` dispatch (`Allocate` then `Create`), rather
//! than by calling the allocator directly — catching anything the
//! Execute-stage wiring itself might get wrong that a bare allocator
//! unit test never would.

use drisc_core::common::ids::{Lfid, RegAddr, RegType};
use drisc_core::config::Config;
use drisc_core::core::regfile::RegCell;
use drisc_core::isa::decoder::{FamilyControlOp, InstructionControl, Opcode};
use drisc_core::isa::demo::{DemoInstruction, DemoIsa};
use drisc_core::sim::Simulator;

fn reg(index: u32) -> RegAddr {
    RegAddr { rtype: RegType::Integer, index }
}

fn instr(opcode: Opcode, rd: RegAddr, rs1: RegAddr, rs2: RegAddr, imm: i64) -> DemoInstruction {
    DemoInstruction { opcode, rd, rs1, rs2, imm, control: InstructionControl::default() }
}

/// `r1 <- 4; r2 <- Allocate(r1); r3 <- 0x100; Create(r2, r3); exit r2`.
fn allocate_then_create_program(thread_count: i64, child_pc: i64) -> Vec<u8> {
    let words = [
        instr(Opcode::AddImm, reg(1), RegAddr::INVALID, RegAddr::INVALID, thread_count),
        instr(Opcode::FamilyControl(FamilyControlOp::Allocate), reg(2), reg(1), RegAddr::INVALID, 0),
        instr(Opcode::AddImm, reg(3), RegAddr::INVALID, RegAddr::INVALID, child_pc),
        instr(Opcode::FamilyControl(FamilyControlOp::Create { is_group: false }), RegAddr::INVALID, reg(2), reg(3), 0),
        instr(Opcode::Exit, RegAddr::INVALID, reg(2), RegAddr::INVALID, 0),
    ];
    words.iter().flat_map(|w| w.encode()).collect()
}

#[test]
fn create_allocates_and_activates_exactly_phys_block_size_threads() {
    let config = Config::default();
    let mut sim = Simulator::new(1, &config, || Box::new(DemoIsa::default()), 1 << 16, 2);
    sim.load_image(0, &allocate_then_create_program(4, 0x100));
    sim.boot(0, 0, false, &[]);
    let report = sim.run(10_000).expect("run completes without a fatal error");

    assert!(report.exit_code.is_some(), "the parent thread's Exit should have terminated the run");
    let core = &sim.place().cores[0];
    let RegCell::Full(lfid_value) = core.int_regfile.read(reg(2)).unwrap() else {
        panic!("r2 should hold Allocate's returned family id");
    };
    let lfid = Lfid::from(*lfid_value as usize);

    // The 4 child threads were pushed ready but the parent's Exit fired
    // before Fetch ever switched to any of them.
    assert_eq!(core.allocator.threads().ready_len(), 4);
    assert_eq!(core.allocator.families().get(lfid).phys_block_size, 4);
}
