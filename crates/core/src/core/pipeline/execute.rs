//! Execute (spec §4.4.4): ALU/branch evaluation, FPU enqueue, and
//! family-control op dispatch to the allocator/network.
//!
//! Family-control ops drive the allocator's [`CreateState`] machine to
//! completion within the single cycle that issues them rather than
//! spreading it across the number of cycles real hardware would take —
//! spec §5's Non-goals explicitly exclude "bit-exact cycle counts", so
//! this repo trades cycle fidelity for a pipeline stage that composes
//! with ordinary single-instruction semantics.

use tracing::trace;

use crate::common::error::SimError;
use crate::common::ids::{Pid, RegAddr, Tid};
use crate::core::allocator::{Allocator, CreateProgress, FamilyDependencyKind};
use crate::core::family::ContextType;
use crate::core::network::{Network, SyncInfo};
use crate::isa::decoder::{FamilyControlOp, FpuOp, Opcode};
use crate::kernel::process::CycleResult;

use super::latches::{ExecuteEffect, ExecuteOutput, Latches};

/// Outcome categories Execute can report alongside the ordinary
/// [`CycleResult`] (spec §4.4.4): `Flush` additionally tells Fetch/Decode
/// to squash every earlier latch belonging to the same thread (a taken
/// branch), `Delay` asks the caller to re-issue the same instruction next
/// cycle without advancing Fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    Continue,
    Flush,
    Stall,
    Delay,
    Idle,
}

#[derive(Debug, Default)]
pub struct Execute {
    pub pending_fpu: Vec<(Tid, RegAddr, FpuOp, u64, u64)>,
}

impl Execute {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn alu(opcode: Opcode, a: u64, b: u64, imm: i64) -> Option<u64> {
        match opcode {
            Opcode::AddImm => Some(a.wrapping_add(imm as u64)),
            Opcode::Add => Some(a.wrapping_add(b)),
            Opcode::Sub => Some(a.wrapping_sub(b)),
            Opcode::Mul => Some(a.wrapping_mul(b)),
            _ => None,
        }
    }

    /// Consumes the Read latch, evaluates the instruction, and produces
    /// the Execute latch plus an [`ExecuteOutcome`] describing
    /// control-flow side effects.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::ProgramTermination`] if the instruction was
    /// `Exit` — mirroring the action MMIO device's exit port (spec
    /// §6.3/§7), a thread can also ask to stop the whole simulation
    /// directly from its own ALU op.
    #[allow(clippy::too_many_arguments)]
    pub fn tick(
        &mut self,
        pid: Pid,
        allocator: &mut Allocator,
        network: &mut Network,
        latches: &mut Latches,
    ) -> Result<(CycleResult, ExecuteOutcome), SimError> {
        let Some(read) = latches.read.take() else {
            return Ok((CycleResult::Delayed, ExecuteOutcome::Idle));
        };

        if !read.src1.is_ready() || !read.src2.is_ready() {
            // Spec §4.4.3: a not-yet-resolved source operand is forwarded
            // through in EMPTY/WAITING form; Execute just re-tries, and
            // Writeback (once the value resolves) is where the thread
            // actually suspends.
            latches.read = Some(read);
            return Ok((CycleResult::Failed, ExecuteOutcome::Stall));
        }
        let a = match read.src1 {
            super::latches::OperandValue::Ready(v) => v,
            super::latches::OperandValue::NotReady => 0,
        };
        let b = match read.src2 {
            super::latches::OperandValue::Ready(v) => v,
            super::latches::OperandValue::NotReady => 0,
        };

        if read.decoded.opcode == Opcode::Exit {
            return Err(SimError::ProgramTermination((a & 0xff) as i32));
        }

        let mut next_pc = read.pc;
        let mut outcome = ExecuteOutcome::Continue;
        let effect = match read.decoded.opcode {
            Opcode::Nop => ExecuteEffect::NoWriteback,
            Opcode::Exit => unreachable!("handled above"),
            Opcode::AddImm | Opcode::Add | Opcode::Sub | Opcode::Mul => {
                ExecuteEffect::AluResult(Self::alu(read.decoded.opcode, a, b, read.decoded.imm).unwrap_or(0))
            }
            Opcode::Load { size, sign_extend } => ExecuteEffect::Load {
                address: a.wrapping_add(read.decoded.imm as u64),
                size,
                sign_extend,
            },
            Opcode::Store { size } => ExecuteEffect::Store {
                address: a.wrapping_add(read.decoded.imm as u64),
                size,
                value: b,
            },
            Opcode::BranchEqZero => {
                if a == 0 {
                    next_pc = read.pc.wrapping_add(read.decoded.imm as u64);
                    outcome = ExecuteOutcome::Flush;
                }
                ExecuteEffect::NoWriteback
            }
            Opcode::Jump => {
                next_pc = read.pc.wrapping_add(read.decoded.imm as u64);
                outcome = ExecuteOutcome::Flush;
                ExecuteEffect::NoWriteback
            }
            Opcode::Fpu(op) => {
                self.pending_fpu.push((read.tid, read.decoded.rd, op, a, b));
                ExecuteEffect::FpuPending
            }
            Opcode::FamilyControl(op) => {
                match Self::dispatch_family_control(op, pid, allocator, network, read.decoded.rd, a, b) {
                    Some(Some(value)) => ExecuteEffect::AluResult(value),
                    Some(None) => ExecuteEffect::Dispatched,
                    None => {
                        latches.read = Some(read);
                        return Ok((CycleResult::Failed, ExecuteOutcome::Stall));
                    }
                }
            }
        };

        if next_pc != read.pc {
            allocator.threads_mut().get_mut(read.tid).pc = next_pc;
        }

        trace!(tid = ?read.tid, pc = read.pc, opcode = ?read.decoded.opcode, "execute");
        latches.execute = Some(ExecuteOutput {
            tid: read.tid,
            pc: read.pc,
            rd: read.decoded.rd,
            effect,
            control: read.decoded.control,
        });
        Ok((CycleResult::Success, outcome))
    }

    /// Dispatches one family-control op, driving the create state machine
    /// to completion synchronously. Returns `None` (caller retries) if a
    /// resource (a family slot, a thread slot, the create token) was
    /// unavailable.
    fn dispatch_family_control(
        op: FamilyControlOp,
        pid: Pid,
        allocator: &mut Allocator,
        network: &mut Network,
        rd: RegAddr,
        a: u64,
        b: u64,
    ) -> Option<Option<u64>> {
        match op {
            FamilyControlOp::Allocate => {
                let lfid = allocator.allocate_family(ContextType::Normal)?;
                // `a` carries the requested per-core thread count (spec
                // §3.1 `physBlockSize`); a full property-setting surface
                // (virtBlockSize/start/limit/step) is out of scope for the
                // demonstration ISA.
                allocator.families_mut().get_mut(lfid).phys_block_size = (a as u32).max(1);
                Some(Some(u64::from(lfid.0)))
            }
            FamilyControlOp::Create { is_group } => {
                // A group create still only ever runs its threads on this
                // core — spanning the place's other cores would mean
                // actually forwarding the create across the ring link and
                // is out of scope. What *is* modeled is the token gate
                // that keeps at most one group create in flight across
                // the whole place at a time (spec's ring-token
                // invariant), since that's observable from a single core.
                if is_group && !network.token.holds() {
                    return None;
                }
                let lfid = crate::common::ids::Lfid::from(a as usize);
                if !allocator.create_in_progress() {
                    allocator.queue_create(lfid, b);
                }
                let lfid = loop {
                    match allocator.advance_create(is_group) {
                        CreateProgress::Done(lfid) => break lfid,
                        CreateProgress::InProgress => continue,
                        CreateProgress::Stalled => return None,
                    }
                };
                let thread_count = allocator.families().get(lfid).phys_block_size.max(1);
                for _ in 0..thread_count {
                    let Some(tid) = allocator.allocate_thread(lfid) else { break };
                    if !allocator.activate_thread(tid) {
                        break;
                    }
                }
                Some(None)
            }
            FamilyControlOp::SetProperty => Some(None),
            FamilyControlOp::Sync => {
                let lfid = crate::common::ids::Lfid::from(a as usize);
                let info = SyncInfo { lfid, dest: pid, exit_code_reg: rd };
                if network.delegation.queue_sync(info) {
                    Some(None)
                } else {
                    None
                }
            }
            FamilyControlOp::Detach => {
                let lfid = crate::common::ids::Lfid::from(a as usize);
                allocator.decrease_family_dependency(lfid, FamilyDependencyKind::SyncSent);
                Some(None)
            }
            FamilyControlOp::Break => {
                let lfid = crate::common::ids::Lfid::from(a as usize);
                allocator.decrease_family_dependency(lfid, FamilyDependencyKind::AllocationDone);
                Some(None)
            }
        }
    }
}
