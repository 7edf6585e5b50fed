//! A place: a ring of [`Drisc`] cores sharing one [`MainMemory`] (spec
//! §3.1/§4.7). Drives every core's pipeline one cycle, then advances the
//! ring (link messages, the create token) and resolves any delegation
//! syncs queued this cycle.

use crate::common::error::SimError;
use crate::common::ids::{Pid, RegIndex};
use crate::config::Config;
use crate::core::network::ring::forward_link;
use crate::core::regfile::WriteOrigin;
use crate::core::Drisc;
use crate::external::MainMemory;
use crate::isa::Decoder;
use crate::kernel::trace::StorageRegistry;

/// Per-core MMIO base addresses are spaced this far apart so no two
/// cores' sub-device ranges overlap.
const MMIO_STRIDE: u64 = 0x1_0000;

pub struct Place {
    pub cores: Vec<Drisc>,
    pub memory: MainMemory,
    line_size: usize,
    /// Consecutive master cycles in which the place was not idle but no
    /// core retired anything, the coarser per-place granularity this repo
    /// schedules at (see [`Drisc`]'s module docs).
    stalled_cycles: u64,
}

/// Cycles of no progress across an entire place before [`Place::tick`]
/// gives up and reports [`SimError::Deadlock`]. Generous relative to the
/// FPU's fixed latency and memory's fixed latency so a core legitimately
/// waiting on either never trips it.
const DEADLOCK_THRESHOLD: u64 = 4096;

impl Place {
    /// Builds a place of `num_cores` cores wired into a ring, each
    /// running its own [`Decoder`] instance built by `make_decoder`.
    #[must_use]
    pub fn new(
        num_cores: usize,
        config: &Config,
        make_decoder: impl Fn() -> Box<dyn Decoder>,
        memory_size: usize,
        memory_latency: u64,
    ) -> Self {
        assert!(num_cores > 0, "a place needs at least one core");
        let mut registry = StorageRegistry::new();
        let cores = (0..num_cores)
            .map(|i| {
                let pid = Pid::from(i);
                let next = Pid::from((i + 1) % num_cores);
                let holds_token_initially = i == 0;
                Drisc::new(
                    pid,
                    next,
                    holds_token_initially,
                    config,
                    make_decoder(),
                    i as u64 * MMIO_STRIDE,
                    &mut registry,
                )
            })
            .collect();
        Self {
            cores,
            memory: MainMemory::new(memory_size, memory_latency),
            line_size: config.cache_line_size as usize,
            stalled_cycles: 0,
        }
    }

    /// `Boot(runAddress, legacy)` (spec §6.4) on core 0.
    ///
    /// # Panics
    ///
    /// Panics if `core_index` is out of range.
    pub fn boot(&mut self, core_index: usize, run_address: u64, legacy: bool, init_regs: &[(RegIndex, u64)]) {
        self.cores[core_index].boot(run_address, legacy, init_regs);
    }

    /// Loads a program image into the shared memory before boot.
    pub fn load_image(&mut self, base: u64, bytes: &[u8]) {
        self.memory.load_image(base, bytes);
    }

    /// Total addressable size of the shared memory, in bytes.
    #[must_use]
    pub fn memory_size(&self) -> usize {
        self.memory.len()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.cores.iter().all(Drisc::is_idle)
    }

    /// Runs one cycle across every core, then advances the ring.
    ///
    /// # Errors
    ///
    /// Returns `Ok(Some(code))` if any core terminated the program (spec
    /// §6.4/§7's `ProgramTermination`), propagates any other fatal
    /// [`SimError`], including [`SimError::Deadlock`] once
    /// [`DEADLOCK_THRESHOLD`] consecutive cycles retire nothing while the
    /// place has outstanding work (spec §7 `Deadlock`, spec §8 E6).
    pub fn tick(&mut self, cycle: u64) -> Result<Option<i32>, SimError> {
        let mut progress = false;
        for core in &mut self.cores {
            core.mmio.perfcounters.master_cycle = cycle;
            match core.tick(cycle) {
                Ok(retired) => progress |= retired,
                Err(SimError::ProgramTermination(code)) => return Ok(Some(code)),
                Err(other) => return Err(other),
            }
            self.memory.service_dcache(&mut core.dcache, self.line_size, cycle);
            self.memory.service_icache(&mut core.icache, self.line_size, cycle);
            core.commit();
        }

        self.advance_ring();
        self.resolve_syncs();

        if self.is_idle() {
            self.stalled_cycles = 0;
        } else if progress {
            self.stalled_cycles = 0;
        } else {
            self.stalled_cycles += 1;
            if self.stalled_cycles >= DEADLOCK_THRESHOLD {
                let stuck = self.cores.iter().map(|c| format!("core{}", c.pid.index())).collect();
                return Err(SimError::Deadlock { cycle, stuck });
            }
        }

        Ok(None)
    }

    /// Moves each core's link message and the create token one hop
    /// forward (spec §4.7), and the `allocResponse` channel one hop
    /// backward.
    fn advance_ring(&mut self) {
        let n = self.cores.len();
        for i in 0..n {
            let next = (i + 1) % n;
            if i == next {
                break;
            }
            let (a, b) = two_mut(&mut self.cores, i, next);
            let _ = forward_link(&mut a.network.ring.link_out, &mut b.network.ring.link_in);
            let _ = forward_link(&mut b.network.ring.alloc_response_out, &mut a.network.ring.alloc_response_in);

            if let Some(dest) = a.network.token.advance() {
                let _ = dest;
                b.network.token.receive();
            }
        }
        for core in &mut self.cores {
            core.network.commit();
        }
    }

    /// Resolves queued delegation syncs (spec §4.7/§3.1's sync
    /// descriptor) once the originating family has fully freed: writes a
    /// placeholder completion value into the waiter's exit-code register
    /// and wakes it. A full accounting of the family's actual exit code
    /// is out of scope for this core's single-place, single-binary
    /// scenarios (see DESIGN.md).
    fn resolve_syncs(&mut self) {
        for i in 0..self.cores.len() {
            let Some(info) = self.cores[i].network.delegation.syncs.front().copied() else {
                continue;
            };
            // Once the family's slot has actually been freed (pushed back
            // to the free list, which resets it to EMPTY), the sync can
            // be resolved; until then it stays queued.
            if self.cores[i].allocator.families().get(info.lfid).state != crate::core::family::FamilyState::Empty {
                continue;
            }
            self.cores[i].network.delegation.syncs.pop();
            self.cores[i].network.delegation.syncs.commit();
            let dest = &mut self.cores[info.dest.index()];
            let _ = dest.int_regfile.write(info.exit_code_reg, 0, WriteOrigin::Pipeline);
            dest.int_regfile.commit();
        }
    }
}

fn two_mut<T>(slice: &mut [T], i: usize, j: usize) -> (&mut T, &mut T) {
    assert_ne!(i, j, "two_mut requires distinct indices");
    if i < j {
        let (left, right) = slice.split_at_mut(j);
        (&mut left[i], &mut right[0])
    } else {
        let (left, right) = slice.split_at_mut(i);
        (&mut right[0], &mut left[j])
    }
}
