//! Memory (spec §4.4.5): issues loads to the D-cache with the
//! destination parked PENDING, issues stores pass-through, and diverts
//! MMIO addresses.

use tracing::trace;

use crate::common::error::SimError;
use crate::core::allocator::{Allocator, ThreadDependencyKind};
use crate::core::cache::dcache::{DCache, WaitingRegister};
use crate::core::regfile::{MemRequest, RegisterFile};
use crate::kernel::process::CycleResult;
use crate::mmio::MmioBus;

use super::latches::{ExecuteEffect, Latches, MemoryOutput};

#[derive(Debug, Default)]
pub struct Memory;

impl Memory {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Consumes the Execute latch and, for loads/stores, issues them to
    /// the D-cache or MMIO bus.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::ProgramTermination`] if a store hit the
    /// action device's exit/abort port (spec §6.3/§7).
    pub fn tick(
        &mut self,
        dcache: &mut DCache,
        regfile: &mut RegisterFile,
        allocator: &mut Allocator,
        mmio: &mut MmioBus,
        cycle: u64,
        latches: &mut Latches,
    ) -> Result<CycleResult, SimError> {
        let Some(exec) = latches.execute.take() else {
            return Ok(CycleResult::Delayed);
        };
        let value = match exec.effect {
            ExecuteEffect::AluResult(v) => Some(v),
            ExecuteEffect::NoWriteback | ExecuteEffect::Dispatched | ExecuteEffect::FpuPending => None,
            ExecuteEffect::Load { address, size, sign_extend } => {
                if let Some(region) = mmio.region_for(address) {
                    let Some(v) = mmio.read(region, address, size, exec.tid) else {
                        latches.execute = Some(exec);
                        return Ok(CycleResult::Failed);
                    };
                    Some(v)
                } else {
                    let line_size = dcache_line_size(dcache);
                    let line_address = address - (address % line_size);
                    let offset = (address - line_address) as u32;
                    let Some(cid) = dcache.read_miss(line_address, cycle) else {
                        latches.execute = Some(exec);
                        return Ok(CycleResult::Failed);
                    };
                    if dcache.line(cid).state == crate::core::cache::LineState::Full {
                        mmio.perfcounters.dcache_hits += 1;
                        let data = &dcache.line(cid).data;
                        Some(read_bytes(data, offset as usize, size, sign_extend))
                    } else {
                        if regfile
                            .park(exec.rd, Some(MemRequest { offset, size, sign_extend, next: None }), None)
                            .is_err()
                        {
                            latches.execute = Some(exec);
                            return Ok(CycleResult::Failed);
                        }
                        mmio.perfcounters.dcache_misses += 1;
                        dcache.wait_for_line(
                            cid,
                            WaitingRegister { tid: exec.tid, rd: exec.rd, offset_in_line: offset, size, sign_extend },
                        );
                        None
                    }
                }
            }
            ExecuteEffect::Store { address, size, value } => {
                if let Some(region) = mmio.region_for(address) {
                    if !mmio.write(region, address, size, value, exec.tid)? {
                        latches.execute = Some(exec);
                        return Ok(CycleResult::Failed);
                    }
                } else {
                    let line_size = dcache_line_size(dcache);
                    let line_address = address - (address % line_size);
                    let offset = (address - line_address) as u32;
                    if !dcache.write(line_address, offset, size, value, exec.tid) {
                        latches.execute = Some(exec);
                        return Ok(CycleResult::Failed);
                    }
                    // No latency is modeled for the store path (the D-cache
                    // applies it pass-through), so the write completes in
                    // the same cycle it's issued.
                    allocator.threads_mut().get_mut(exec.tid).dependencies.num_pending_writes += 1;
                    allocator.decrease_thread_dependency(exec.tid, ThreadDependencyKind::WriteCompleted);
                    mmio.perfcounters.completed_stores += 1;
                }
                None
            }
        };

        trace!(tid = ?exec.tid, "memory");
        latches.memory = Some(MemoryOutput { tid: exec.tid, rd: exec.rd, value, control: exec.control });
        Ok(CycleResult::Success)
    }
}

fn dcache_line_size(dcache: &DCache) -> u64 {
    u64::from(dcache.geometry().line_size)
}

fn read_bytes(data: &[u8], offset: usize, size: u8, sign_extend: bool) -> u64 {
    let mut bytes = [0u8; 8];
    bytes[..size as usize].copy_from_slice(&data[offset..offset + size as usize]);
    let raw = u64::from_le_bytes(bytes);
    if sign_extend && size < 8 {
        let shift = 64 - u32::from(size) * 8;
        ((raw << shift) as i64 >> shift) as u64
    } else {
        raw
    }
}

/// A load's outcome once its D-cache line resolves — consumed once per
/// cycle, oldest waiter first (spec §4.6: "drain the waiting-register
/// list one register per cycle").
pub fn drain_completed_load(
    dcache: &mut DCache,
    cid: crate::common::ids::Cid,
) -> Option<(crate::common::ids::Tid, crate::common::ids::RegAddr, u64)> {
    let mut waiters = dcache.take_waiters(cid);
    if waiters.is_empty() {
        return None;
    }
    let w = waiters.remove(0);
    let data = dcache.line(cid).data.clone();
    let value = read_bytes(&data, w.offset_in_line as usize, w.size, w.sign_extend);
    for rest in waiters {
        dcache.wait_for_line(cid, rest);
    }
    Some((w.tid, w.rd, value))
}

/// Drains one waiter from every line that's FULL with a non-empty wait
/// list, the per-cycle sweep a place runs after servicing the D-cache
/// (spec §4.6).
pub fn drain_completed_loads(
    dcache: &mut DCache,
) -> Vec<(crate::common::ids::Tid, crate::common::ids::RegAddr, u64)> {
    let ids: Vec<_> = dcache.ids_with_pending_waiters().collect();
    ids.into_iter().filter_map(|cid| drain_completed_load(dcache, cid)).collect()
}
