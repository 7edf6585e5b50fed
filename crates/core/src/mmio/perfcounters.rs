//! Performance counters (spec §6.3): a read-only register file exposing
//! cumulative simulation statistics, indexed by register-width slot.
//!
//! A subset of the counters: place/grid-wide statistics (executed FLOPs
//! across a place, allocate-exclusive queue depth, wall-clock sampling)
//! depend on multi-core wiring this repo's single-`Drisc` scope doesn't
//! carry, so only the per-core counters survive.

#[derive(Debug, Default, Clone, Copy)]
pub struct PerfCounters {
    pub master_cycle: u64,
    pub instructions_retired: u64,
    pub dcache_hits: u64,
    pub dcache_misses: u64,
    pub completed_loads: u64,
    pub completed_stores: u64,
}

impl PerfCounters {
    pub const SIZE: u64 = 6 * 8;

    #[must_use]
    pub fn read(&self, offset: u64, _size: u8) -> Option<u64> {
        match offset / 8 {
            0 => Some(self.master_cycle),
            1 => Some(self.instructions_retired),
            2 => Some(self.dcache_hits),
            3 => Some(self.dcache_misses),
            4 => Some(self.completed_loads),
            5 => Some(self.completed_stores),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_the_expected_slot() {
        let counters = PerfCounters { instructions_retired: 42, ..PerfCounters::default() };
        assert_eq!(counters.read(8, 8), Some(42));
    }

    #[test]
    fn out_of_range_slot_is_none() {
        let counters = PerfCounters::default();
        assert_eq!(counters.read(6 * 8, 8), None);
    }
}
