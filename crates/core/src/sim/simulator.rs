//! The top-level cycle driver: owns a [`Place`] and runs it to
//! completion or a cycle budget, the same loop-and-propagate idiom
//! [`Place::tick`] uses internally, one level up at the place's coarser
//! per-core granularity (spec §4.1, §7).

use crate::common::error::SimError;
use crate::common::ids::RegIndex;
use crate::config::Config;
use crate::isa::Decoder;
use crate::mmio::PerfCounters;

use super::place::Place;

/// Summary statistics returned once a run stops, whether by exhausting
/// its cycle budget, the place going idle, or the program calling
/// `ProgramTermination` (spec §7).
#[derive(Debug, Clone)]
pub struct SimulatorReport {
    /// The master cycle the run stopped at.
    pub cycles_run: u64,
    /// `Some(code)` if the program terminated explicitly; `None` if the
    /// place went idle or the cycle budget ran out first.
    pub exit_code: Option<i32>,
    /// One snapshot per core, in core order.
    pub perfcounters: Vec<PerfCounters>,
}

/// Owns one [`Place`] and drives it to completion.
pub struct Simulator {
    place: Place,
}

impl Simulator {
    #[must_use]
    pub fn new(
        num_cores: usize,
        config: &Config,
        make_decoder: impl Fn() -> Box<dyn Decoder>,
        memory_size: usize,
        memory_latency: u64,
    ) -> Self {
        Self { place: Place::new(num_cores, config, make_decoder, memory_size, memory_latency) }
    }

    #[must_use]
    pub fn place(&self) -> &Place {
        &self.place
    }

    pub fn place_mut(&mut self) -> &mut Place {
        &mut self.place
    }

    /// Loads a program image into the place's shared memory before boot
    /// (spec §6.4's `LoadImage`).
    pub fn load_image(&mut self, base: u64, bytes: &[u8]) {
        self.place.load_image(base, bytes);
    }

    /// `Boot(runAddress, legacy)` (spec §6.4) on the named core.
    ///
    /// # Panics
    ///
    /// Panics if `core_index` is out of range.
    pub fn boot(&mut self, core_index: usize, run_address: u64, legacy: bool, init_regs: &[(RegIndex, u64)]) {
        self.place.boot(core_index, run_address, legacy, init_regs);
    }

    /// Runs [`Place::tick`] repeatedly until either `max_cycles` have run,
    /// the place goes idle, or a tick reports [`SimError::ProgramTermination`],
    /// propagating any other error (in particular [`SimError::Deadlock`])
    /// immediately.
    ///
    /// # Errors
    ///
    /// Propagates any fatal [`SimError`] a core or the place itself
    /// raises, including an unresolved deadlock.
    pub fn run(&mut self, max_cycles: u64) -> Result<SimulatorReport, SimError> {
        let mut exit_code = None;
        let mut cycles_run = 0;
        for cycle in 0..max_cycles {
            cycles_run = cycle;
            match self.place.tick(cycle) {
                Ok(Some(code)) => {
                    exit_code = Some(code);
                    break;
                }
                Ok(None) => {}
                Err(err) => return Err(err),
            }
            if self.place.is_idle() {
                break;
            }
        }
        let perfcounters = self.place.cores.iter().map(|c| c.mmio.perfcounters).collect();
        Ok(SimulatorReport { cycles_run, exit_code, perfcounters })
    }
}
