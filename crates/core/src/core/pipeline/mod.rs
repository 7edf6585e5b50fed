//! The six-stage pipeline (spec §4.4): Fetch, Decode, Read, Execute,
//! Memory, Writeback, composed as ordinary struct fields with direct
//! method calls, ticked once per core per master cycle by [`crate::sim::Place`]
//! — the coarser per-core scheduling granularity this repo runs at (spec
//! §4.1).
//!
//! Stages tick in reverse pipeline order (Writeback first, Fetch last)
//! so each one consumes the latch the *previous* cycle produced before
//! that slot is overwritten this cycle.

pub mod decode;
pub mod execute;
pub mod fetch;
pub mod latches;
pub mod memory;
pub mod read;
pub mod writeback;

use crate::common::error::SimError;
use crate::common::ids::{Pid, RegType};
use crate::core::allocator::Allocator;
use crate::core::cache::dcache::DCache;
use crate::core::cache::icache::ICache;
use crate::core::network::Network;
use crate::core::regfile::RegisterFile;
use crate::isa::Decoder;
use crate::kernel::process::CycleResult;
use crate::mmio::MmioBus;

pub use decode::Decode;
pub use execute::{Execute, ExecuteOutcome};
pub use fetch::Fetch;
pub use latches::Latches;
pub use memory::Memory;
pub use read::Read;
pub use writeback::Writeback;

/// Geometry the pipeline needs but doesn't own: instruction size, I-cache
/// line size, and the control-word size Fetch must skip at block
/// boundaries (spec §4.4.1).
#[derive(Debug, Clone, Copy)]
pub struct PipelineGeometry {
    pub instruction_size: usize,
    pub icache_line_size: usize,
    pub control_word_size: usize,
}

pub struct Pipeline {
    pub fetch: Fetch,
    pub decode: Decode,
    pub read: Read,
    pub execute: Execute,
    pub memory: Memory,
    pub writeback: Writeback,
    pub latches: Latches,
    decoder: Box<dyn Decoder>,
    geometry: PipelineGeometry,
}

impl Pipeline {
    #[must_use]
    pub fn new(decoder: Box<dyn Decoder>, geometry: PipelineGeometry) -> Self {
        Self {
            fetch: Fetch::new(),
            decode: Decode::new(),
            read: Read::new(),
            execute: Execute::new(),
            memory: Memory::new(),
            writeback: Writeback::new(),
            latches: Latches::default(),
            decoder,
            geometry,
        }
    }

    /// Runs one cycle of every stage, back to front. Returns whether
    /// Writeback retired an instruction this cycle, the progress signal
    /// a place uses for its deadlock check (spec §7 `Deadlock`).
    ///
    /// # Errors
    ///
    /// Propagates [`SimError::IllegalInstruction`] from Decode and
    /// [`SimError::ProgramTermination`] from Execute (the `Exit`
    /// instruction) or Memory (a write to the action device's exit/abort
    /// port).
    #[allow(clippy::too_many_arguments)]
    pub fn tick(
        &mut self,
        pid: Pid,
        allocator: &mut Allocator,
        network: &mut Network,
        int_regfile: &mut RegisterFile,
        flt_regfile: &mut RegisterFile,
        dcache: &mut DCache,
        icache: &mut ICache,
        mmio: &mut MmioBus,
        cycle: u64,
    ) -> Result<bool, SimError> {
        let retired = self.writeback.tick(int_regfile, flt_regfile, allocator, &mut self.latches) == CycleResult::Success;

        let memory_regfile = match self.latches.execute.as_ref().map(|e| e.rd.rtype) {
            Some(RegType::Float) => &mut *flt_regfile,
            _ => &mut *int_regfile,
        };
        let _: CycleResult = self.memory.tick(dcache, memory_regfile, allocator, mmio, cycle, &mut self.latches)?;

        let (_, outcome) = self.execute.tick(pid, allocator, network, &mut self.latches)?;
        if outcome == ExecuteOutcome::Flush {
            self.fetch.flush_current();
            self.latches.fetch = None;
            self.latches.decode = None;
            self.latches.read = None;
        }

        let _: CycleResult = self.read.tick(int_regfile, flt_regfile, &mut self.latches);

        self.decode.tick(self.decoder.as_ref(), pid, allocator, &mut self.latches)?;
        // Fetch's switch decision depends on the control bits Decode just
        // extracted (spec §4.4.1), so it must run after Decode but before
        // Fetch consumes it next.
        if let Some(decoded) = &self.latches.decode {
            let more_than_one_ready = allocator.threads().ready_len() > 1;
            self.fetch.note_control(
                decoded.decoded.control.want_switch,
                decoded.decoded.control.kill_after,
                more_than_one_ready,
            );
        }

        let _: CycleResult = self.fetch.tick(
            allocator,
            icache,
            self.geometry.instruction_size,
            self.geometry.icache_line_size,
            self.geometry.control_word_size,
            cycle,
            &mut self.latches,
        );

        Ok(retired)
    }
}
