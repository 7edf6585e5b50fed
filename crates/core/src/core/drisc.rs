//! One DRISC core: the allocator, register files, caches, network
//! interface, MMIO surface, and pipeline, wired together (spec §3.1/§9).

use crate::common::error::SimError;
use crate::common::ids::{Pid, RegAddr, RegIndex, RegType};
use crate::config::Config;
use crate::core::allocator::{Allocator, RegisterShape};
use crate::core::cache::dcache::DCache;
use crate::core::cache::icache::ICache;
use crate::core::cache::CacheGeometry;
use crate::core::family::ContextType;
use crate::core::network::Network;
use crate::core::pipeline::{Pipeline, PipelineGeometry};
use crate::core::rau::RAUnit;
use crate::core::regfile::{RegisterFile, WriteOrigin};
use crate::external::Fpu;
use crate::isa::Decoder;
use crate::kernel::trace::StorageRegistry;
use crate::mmio::MmioBus;

/// One core in a place's ring (spec §3.1). A place drives each core's
/// pipeline and table upkeep once per master cycle (spec §4.1's coarser
/// per-core scheduling granularity).
pub struct Drisc {
    pub pid: Pid,
    pub allocator: Allocator,
    pub int_regfile: RegisterFile,
    pub flt_regfile: RegisterFile,
    pub dcache: DCache,
    pub icache: ICache,
    pub network: Network,
    pub mmio: MmioBus,
    pub pipeline: Pipeline,
    pub fpu: Fpu,
}

impl Drisc {
    #[must_use]
    pub fn new(
        pid: Pid,
        next: Pid,
        holds_token_initially: bool,
        config: &Config,
        decoder: Box<dyn Decoder>,
        mmio_base: u64,
        registry: &mut StorageRegistry,
    ) -> Self {
        let int_rau = RAUnit::new(config.registers.num_int_registers, config.registers.int_block_size, 0);
        let flt_rau = RAUnit::new(config.registers.num_flt_registers, config.registers.flt_block_size, 0);
        let reg_shape = RegisterShape {
            globals: config.registers.globals_per_thread,
            shareds: config.registers.shareds_per_thread,
            locals: config.registers.locals_per_thread,
        };
        let allocator = Allocator::new(
            pid,
            config.allocator.num_families,
            config.allocator.num_threads,
            config.allocator.exclusive_family_slots,
            int_rau,
            flt_rau,
            reg_shape,
            reg_shape,
            registry,
        );
        let int_regfile = RegisterFile::new(RegType::Integer, config.registers.num_int_registers as usize, registry);
        let flt_regfile = RegisterFile::new(RegType::Float, config.registers.num_flt_registers as usize, registry);

        let dcache_geometry =
            CacheGeometry { line_size: config.cache_line_size, associativity: config.dcache.associativity, sets: config.dcache.sets };
        let icache_geometry =
            CacheGeometry { line_size: config.cache_line_size, associativity: config.icache.associativity, sets: config.icache.sets };
        let dcache = DCache::new(dcache_geometry, config.network.outgoing_buffer_size as usize, registry);
        let icache = ICache::new(icache_geometry, config.network.read_responses_buffer_size as usize, registry);

        let network = Network::new(pid, next, holds_token_initially, config.network.outgoing_buffer_size as usize, registry);
        let mmio = MmioBus::new(mmio_base, config.num_ancillary_registers);

        let geometry = PipelineGeometry {
            instruction_size: decoder.instruction_size(),
            icache_line_size: config.cache_line_size as usize,
            control_word_size: config.control_block_size as usize,
        };
        let pipeline = Pipeline::new(decoder, geometry);
        let fpu = Fpu::new(Self::FPU_LATENCY, config.network.outgoing_buffer_size as usize);

        Self { pid, allocator, int_regfile, flt_regfile, dcache, icache, network, mmio, pipeline, fpu }
    }

    /// Fixed FPU latency (spec §6.1's micro-op latencies are out of
    /// scope; this is just enough for results to arrive asynchronously).
    const FPU_LATENCY: u64 = 4;

    /// `Boot(runAddress, legacy)` (spec §6.4): allocates an initial family
    /// of one thread at `run_address` on this core and applies `InitRegs`.
    ///
    /// The boot family gets a flat identity register window (every
    /// logical index addresses its own physical cell 1:1) rather than the
    /// configured shareds/locals shape real creates use — boot has
    /// exactly one thread and no successor to share or depend on.
    ///
    /// # Panics
    ///
    /// Panics if the family or thread tables have no free slots, or the
    /// register file has no room for the identity window, none of which
    /// can happen on a freshly constructed core.
    pub fn boot(&mut self, run_address: u64, legacy: bool, init_regs: &[(RegIndex, u64)]) {
        let lfid = self.allocator.allocate_family(ContextType::Normal).expect("fresh family table has room");
        self.allocator.families_mut().get_mut(lfid).phys_block_size = 1;
        assert!(
            self.allocator.allocate_boot_registers(lfid),
            "fresh RAU has room for the boot family's identity window"
        );
        let tid = self.allocator.allocate_thread(lfid).expect("fresh thread table has room");
        {
            let thread = self.allocator.threads_mut().get_mut(tid);
            thread.pc = run_address;
            thread.legacy = legacy;
        }
        assert!(self.allocator.activate_thread(tid), "empty ready queue accepts the boot thread");

        for &(index, value) in init_regs {
            let logical = RegAddr { rtype: RegType::Integer, index };
            let physical = self.allocator.translate_register(lfid, tid, logical);
            let _ = self.int_regfile.write(physical, value, WriteOrigin::Pipeline);
            self.int_regfile.commit();
        }
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.allocator.threads().ready_is_empty() && self.allocator.families().is_empty()
    }

    /// Runs one pipeline cycle for this core, plus the FPU's asynchronous
    /// `QueueOperation`/callback round trip (spec §6.1), which bypasses
    /// Writeback entirely. Returns whether anything actually retired this
    /// cycle, the progress signal a place's deadlock check watches for.
    ///
    /// # Errors
    ///
    /// Propagates any fatal [`SimError`] the pipeline raises.
    pub fn tick(&mut self, cycle: u64) -> Result<bool, SimError> {
        let mut progress = self.pipeline.tick(
            self.pid,
            &mut self.allocator,
            &mut self.network,
            &mut self.int_regfile,
            &mut self.flt_regfile,
            &mut self.dcache,
            &mut self.icache,
            &mut self.mmio,
            cycle,
        )?;
        if progress {
            self.mmio.perfcounters.instructions_retired += 1;
        }

        for (tid, dest, op, a, b) in self.pipeline.execute.pending_fpu.drain(..).collect::<Vec<_>>() {
            // A rejected queue_operation drops the result on the floor; a
            // full-featured ISA would stall Execute instead (spec §6.1's
            // `bool` return), but the demonstration ISA has no FPU
            // backpressure opcode to retry through.
            let _ = self.fpu.queue_operation(tid, dest, op, a, b, cycle);
        }
        for (_tid, dest, value) in self.fpu.drain_completed(cycle) {
            if let Ok(Some(head)) = self.flt_regfile.write(dest, value, WriteOrigin::Pipeline) {
                // A full ready queue here would normally force a retry
                // (spec §4.3), but the FPU callback has nowhere to stall
                // to; dropping the wakeup is a known simplification.
                let _ = self.allocator.threads_mut().push_ready_chain(head);
            }
            self.flt_regfile.commit();
            progress = true;
        }

        for (_tid, rd, value) in crate::core::pipeline::memory::drain_completed_loads(&mut self.dcache) {
            let regfile = match rd.rtype {
                RegType::Integer => &mut self.int_regfile,
                RegType::Float => &mut self.flt_regfile,
            };
            if let Ok(Some(head)) = regfile.write(rd, value, WriteOrigin::DirectCacheAccess) {
                let _ = self.allocator.threads_mut().push_ready_chain(head);
            }
            regfile.commit();
            self.mmio.perfcounters.completed_loads += 1;
            progress = true;
        }

        Ok(progress)
    }

    pub fn commit(&mut self) {
        self.int_regfile.commit();
        self.flt_regfile.commit();
        self.dcache.commit();
        self.icache.commit();
        self.network.commit();
    }

    pub fn rollback(&mut self) {
        self.int_regfile.rollback();
        self.flt_regfile.rollback();
        self.dcache.rollback();
        self.icache.rollback();
        self.network.rollback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::demo::DemoIsa;

    fn core() -> Drisc {
        let mut registry = StorageRegistry::new();
        let config = Config::default();
        Drisc::new(Pid::from(0_usize), Pid::from(0_usize), true, &config, Box::new(DemoIsa::default()), 0xFFFF_0000, &mut registry)
    }

    #[test]
    fn fresh_core_is_idle() {
        assert!(core().is_idle());
    }

    #[test]
    fn booting_activates_exactly_one_thread() {
        let mut drisc = core();
        drisc.boot(0x1000, false, &[(0, 7)]);
        assert!(!drisc.is_idle());
        assert_eq!(
            drisc.int_regfile.read(RegAddr { rtype: RegType::Integer, index: 0 }).unwrap(),
            &crate::core::regfile::RegCell::Full(7)
        );
    }

    #[test]
    fn ticking_with_no_backing_memory_just_stalls_on_the_icache_miss() {
        // With no external memory wired up yet, fetch can never complete its
        // line fill; ticking must stay well-behaved (no fatal error) rather
        // than panicking or terminating early.
        let mut drisc = core();
        drisc.boot(0, false, &[]);
        for cycle in 0..64 {
            drisc.tick(cycle).expect("no fatal error with an unresolved icache miss");
            drisc.commit();
        }
    }
}
