//! Fetch (spec §4.4.1): pops the ready-thread queue on a switch, computes
//! the PC, requests an I-cache line, and decides whether to switch next
//! cycle.

use tracing::trace;

use crate::common::ids::Tid;
use crate::core::allocator::Allocator;
use crate::core::cache::icache::ICache;
use crate::kernel::process::CycleResult;

use super::latches::{FetchOutput, Latches};

/// Fetch's own state: which thread currently owns the pipeline, and
/// whether a switch to the next ready thread is due.
#[derive(Debug, Default)]
pub struct Fetch {
    current: Option<Tid>,
    switch_pending: bool,
}

impl Fetch {
    #[must_use]
    pub fn new() -> Self {
        Self { current: None, switch_pending: true }
    }

    /// Runs one Fetch cycle: if a switch is due, pop the next ready
    /// thread; compute its PC; request the I-cache line containing it;
    /// extract the raw instruction word once the line is resident.
    pub fn tick(
        &mut self,
        allocator: &mut Allocator,
        icache: &mut ICache,
        instruction_size: usize,
        line_size: usize,
        control_word_size: usize,
        cycle: u64,
        latches: &mut Latches,
    ) -> CycleResult {
        if self.switch_pending || self.current.is_none() {
            let Some(tid) = allocator.threads_mut().pop_ready() else {
                return CycleResult::Delayed;
            };
            self.current = Some(tid);
            self.switch_pending = false;
        }
        let tid = self.current.expect("current thread set above");
        let thread = allocator.threads().get(tid);
        let mut pc = thread.pc;

        // Non-legacy threads skip the per-control-block control word when
        // landing exactly on a block boundary (spec §4.4.1).
        if !thread.legacy && control_word_size > 0 && pc % (line_size as u64) == 0 {
            pc += control_word_size as u64;
        }

        let line_address = pc - (pc % line_size as u64);
        let Some(cid) = icache.fetch(line_address, cycle) else {
            return CycleResult::Failed;
        };
        let line = icache.line(cid);
        if line.state != crate::core::cache::LineState::Full {
            return CycleResult::Failed;
        }
        let offset = (pc - line_address) as usize;
        if offset + instruction_size > line.data.len() {
            // Crossing the end of the I-cache line forces a switch next
            // cycle (spec §4.4.1).
            self.switch_pending = true;
            return CycleResult::Failed;
        }
        let word = line.data[offset..offset + instruction_size].to_vec();

        allocator.threads_mut().get_mut(tid).pc = pc + instruction_size as u64;
        latches.fetch = Some(FetchOutput { tid, pc, word });
        trace!(tid = ?tid, pc, "fetch");
        CycleResult::Success
    }

    /// Called by Decode with the control bits it extracted, to decide
    /// whether Fetch switches threads next cycle (spec §4.4.1:
    /// "killAfter ⇒ must switch; ... wantSwitch and more than one ready
    /// thread ⇒ switch").
    pub fn note_control(&mut self, want_switch: bool, kill_after: bool, more_than_one_ready: bool) {
        if kill_after || (want_switch && more_than_one_ready) {
            self.switch_pending = true;
        }
    }

    pub fn flush_current(&mut self) {
        self.switch_pending = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ids::Pid;
    use crate::core::allocator::{Allocator, RegisterShape};
    use crate::core::cache::{CacheGeometry, ICache};
    use crate::core::rau::RAUnit;
    use crate::kernel::trace::StorageRegistry;

    #[test]
    fn fetch_delays_when_no_thread_is_ready() {
        let mut registry = StorageRegistry::new();
        let shape = RegisterShape { globals: 8, shareds: 4, locals: 8 };
        let mut allocator = Allocator::new(
            Pid::from(0_usize),
            4,
            8,
            1,
            RAUnit::new(64, 4, 1),
            RAUnit::new(64, 4, 1),
            shape,
            shape,
            &mut registry,
        );
        let geometry = CacheGeometry { line_size: 64, associativity: 2, sets: 4 };
        let mut icache = ICache::new(geometry, 2, &mut registry);
        let mut fetch = Fetch::new();
        let mut latches = Latches::default();
        let result = fetch.tick(&mut allocator, &mut icache, 16, 64, 0, 0, &mut latches);
        assert_eq!(result, CycleResult::Delayed);
    }
}
