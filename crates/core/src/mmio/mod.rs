//! The MMIO surface (spec §6.3): each sub-device owns a fixed-size
//! address range, an access mode, and is addressed as `(offset, size,
//! fid, tid)`.

pub mod action;
pub mod apr;
pub mod debug;
pub mod perfcounters;

pub use action::ActionDevice;
pub use apr::AprFile;
pub use debug::DebugChannel;
pub use perfcounters::PerfCounters;

use crate::common::ids::Tid;
use crate::common::error::SimError;

/// Which sub-device an address range belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmioRegion {
    Action,
    DebugOut,
    Perfcounters,
    Apr,
}

/// One sub-device's placement on the bus (spec §6.3: "declares its size
/// in bytes ... and a base address derived from configuration").
#[derive(Debug, Clone, Copy)]
struct Range {
    region: MmioRegion,
    base: u64,
    size: u64,
}

impl Range {
    const fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.base + self.size
    }

    const fn offset(&self, address: u64) -> u64 {
        address - self.base
    }
}

/// The fixed set of sub-devices in this repo's MMIO surface. Async-I/O
/// and PNC ranges (spec §6.3) are out of scope — nothing in the
/// end-to-end scenarios touches them.
pub struct MmioBus {
    ranges: Vec<Range>,
    pub action: ActionDevice,
    pub debug_out: DebugChannel,
    pub perfcounters: PerfCounters,
    pub apr: AprFile,
}

impl MmioBus {
    #[must_use]
    pub fn new(base: u64, num_ancillary_registers: u32) -> Self {
        let action_base = base;
        let debug_base = action_base + ActionDevice::SIZE;
        let perf_base = debug_base + DebugChannel::SIZE;
        let apr_base = perf_base + PerfCounters::SIZE;
        let apr_size = u64::from(num_ancillary_registers) * 8;
        Self {
            ranges: vec![
                Range { region: MmioRegion::Action, base: action_base, size: ActionDevice::SIZE },
                Range { region: MmioRegion::DebugOut, base: debug_base, size: DebugChannel::SIZE },
                Range { region: MmioRegion::Perfcounters, base: perf_base, size: PerfCounters::SIZE },
                Range { region: MmioRegion::Apr, base: apr_base, size: apr_size },
            ],
            action: ActionDevice::default(),
            debug_out: DebugChannel::default(),
            perfcounters: PerfCounters::default(),
            apr: AprFile::new(num_ancillary_registers as usize),
        }
    }

    #[must_use]
    pub fn region_for(&self, address: u64) -> Option<MmioRegion> {
        self.ranges.iter().find(|r| r.contains(address)).map(|r| r.region)
    }

    fn range(&self, region: MmioRegion) -> &Range {
        self.ranges.iter().find(|r| r.region == region).expect("region always registered")
    }

    /// Reads `size` bytes from `region` at `address`. Returns `None`
    /// (caller retries) only for devices that can be momentarily
    /// unavailable; the stand-ins here always accept.
    #[must_use]
    pub fn read(&mut self, region: MmioRegion, address: u64, size: u8, tid: Tid) -> Option<u64> {
        let offset = self.range(region).offset(address);
        match region {
            MmioRegion::Action => self.action.read(offset, size),
            MmioRegion::DebugOut => None,
            MmioRegion::Perfcounters => self.perfcounters.read(offset, size),
            MmioRegion::Apr => self.apr.read(offset, size, tid),
        }
    }

    /// Writes `value` to `region` at `address`. Returns `true` if
    /// accepted; `false` means the caller must retry.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::ProgramTermination`] if this write was to the
    /// action device's exit/abort port (spec §6.3/§7).
    pub fn write(
        &mut self,
        region: MmioRegion,
        address: u64,
        size: u8,
        value: u64,
        tid: Tid,
    ) -> Result<bool, SimError> {
        let offset = self.range(region).offset(address);
        match region {
            MmioRegion::Action => self.action.write(offset, size, value),
            MmioRegion::DebugOut => {
                self.debug_out.write(value);
                Ok(true)
            }
            MmioRegion::Perfcounters => Ok(true),
            MmioRegion::Apr => {
                self.apr.write(offset, size, value, tid);
                Ok(true)
            }
        }
    }
}
