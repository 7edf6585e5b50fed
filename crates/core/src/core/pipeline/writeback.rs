//! Writeback (spec §4.4.6): commits the Memory latch's result into the
//! register file, waking any thread parked `WAITING` on the destination,
//! and retires the instruction's thread-control side effects
//! (`wantSwitch`/`killAfter`).

use tracing::trace;

use crate::common::ids::Tid;
use crate::core::allocator::{Allocator, ThreadDependencyKind};
use crate::core::regfile::{RegisterFile, WriteOrigin};
use crate::kernel::process::CycleResult;

use super::latches::Latches;

#[derive(Debug, Default)]
pub struct Writeback;

impl Writeback {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Consumes the Memory latch. Returns `false` (caller must treat this
    /// as [`CycleResult::Failed`]) if committing the value would require
    /// waking a thread the ready queue has no room for this cycle — the
    /// whole writeback is retried next cycle rather than partially
    /// applied (spec §4.3's wakeup protocol).
    pub fn tick(
        &mut self,
        int_regfile: &mut RegisterFile,
        flt_regfile: &mut RegisterFile,
        allocator: &mut Allocator,
        latches: &mut Latches,
    ) -> CycleResult {
        let Some(mem) = latches.memory.take() else {
            return CycleResult::Delayed;
        };

        if let Some(value) = mem.value {
            if mem.rd.is_valid() {
                let regfile = match mem.rd.rtype {
                    crate::common::ids::RegType::Integer => &mut *int_regfile,
                    crate::common::ids::RegType::Float => &mut *flt_regfile,
                };
                let woken = match regfile.write(mem.rd, value, WriteOrigin::Pipeline) {
                    Ok(woken) => woken,
                    Err(_) => {
                        latches.memory = Some(mem);
                        return CycleResult::Failed;
                    }
                };
                if let Some(head) = woken {
                    if !Self::wake(allocator, head) {
                        regfile.rollback();
                        latches.memory = Some(mem);
                        return CycleResult::Failed;
                    }
                }
                regfile.commit();
            }
        }

        if mem.control.kill_after {
            allocator.decrease_thread_dependency(mem.tid, ThreadDependencyKind::Killed);
            allocator.run_cleanup();
        }

        trace!(tid = ?mem.tid, "writeback");
        CycleResult::Success
    }

    /// Walks the wait-queue chain starting at `head`, pushing every
    /// waiter onto the ready queue in list order. Returns `false` if the
    /// ready queue can't fit the whole chain this cycle.
    fn wake(allocator: &mut Allocator, head: Tid) -> bool {
        allocator.threads_mut().push_ready_chain(head)
    }
}
