//! D-cache: write-through, read-allocate, set-associative (spec §3.4,
//! §4.6).

use crate::common::ids::{Cid, Mcid, RegAddr, Tid};
use crate::core::cache::{cid_of, CacheGeometry, LineState};
use crate::kernel::trace::{StorageId, StorageRegistry, Trace};
use crate::storage::{Buffer, Structure};

/// A pending register waiting on a line's load completion, queued in
/// issue order so registers can be drained "one register per cycle,
/// sign-extending as the descriptor requests" (spec §4.6).
#[derive(Debug, Clone, Copy)]
pub struct WaitingRegister {
    pub tid: Tid,
    pub rd: RegAddr,
    pub offset_in_line: u32,
    pub size: u8,
    pub sign_extend: bool,
}

/// One cache line.
#[derive(Debug, Clone)]
pub struct DLine {
    pub tag: Option<u64>,
    pub data: Vec<u8>,
    pub valid: Vec<bool>,
    pub last_access: u64,
    pub state: LineState,
    pub processing: bool,
    pub waiting: Vec<WaitingRegister>,
}

impl DLine {
    fn new(line_size: usize) -> Self {
        Self {
            tag: None,
            data: vec![0; line_size],
            valid: vec![false; line_size],
            last_access: 0,
            state: LineState::Empty,
            processing: false,
            waiting: Vec::new(),
        }
    }

    /// Invalid lines evict first, then LRU among FULL lines with no
    /// pending work; PENDING (LOADING) lines never evict (spec §4.6).
    const fn evictable(&self) -> bool {
        matches!(self.state, LineState::Invalid | LineState::Full) && !self.processing
    }
}

/// An outstanding read request queued to the external memory interface.
#[derive(Debug, Clone, Copy)]
pub struct OutgoingRead {
    pub cid: Cid,
    pub line_address: u64,
}

/// An outstanding write, queued so a subsequent read-miss completion can
/// merge pending writes to the same line before marking it FULL (spec
/// §4.6: "merge with any pending writes to the same address present in
/// the outgoing buffer").
#[derive(Debug, Clone, Copy)]
pub struct OutgoingWrite {
    pub line_address: u64,
    pub offset: u32,
    pub size: u8,
    pub data: u64,
    pub writer: Tid,
}

pub struct DCache {
    geometry: CacheGeometry,
    lines: Vec<DLine>,
    outgoing_reads: Buffer<OutgoingRead>,
    outgoing_writes: Buffer<OutgoingWrite>,
    mcid: Option<Mcid>,
    registry_id: StorageId,
}

impl DCache {
    #[must_use]
    pub fn new(geometry: CacheGeometry, buffer_capacity: usize, registry: &mut StorageRegistry) -> Self {
        let line_count = geometry.lines() as usize;
        Self {
            geometry,
            lines: (0..line_count)
                .map(|_| DLine::new(geometry.line_size as usize))
                .collect(),
            outgoing_reads: Buffer::new(registry.register("dcache.outgoing.reads"), buffer_capacity),
            outgoing_writes: Buffer::new(registry.register("dcache.outgoing.writes"), buffer_capacity),
            mcid: None,
            registry_id: registry.register("dcache.lines"),
        }
    }

    #[must_use]
    pub fn trace(&self) -> Trace {
        Trace::from_ids([self.registry_id, self.outgoing_reads.id(), self.outgoing_writes.id()])
    }

    #[must_use]
    pub const fn geometry(&self) -> CacheGeometry {
        self.geometry
    }

    pub fn bind_memory_client(&mut self, mcid: Mcid) {
        self.mcid = Some(mcid);
    }

    #[must_use]
    pub const fn memory_client(&self) -> Option<Mcid> {
        self.mcid
    }

    /// Pops the oldest queued read, for an external memory model to
    /// service (spec §6.2: `memory.Read(mcid, line_address)`).
    pub fn pop_outgoing_read(&mut self) -> Option<OutgoingRead> {
        let read = self.outgoing_reads.front().copied();
        if read.is_some() {
            self.outgoing_reads.pop();
            self.outgoing_reads.commit();
        }
        read
    }

    /// Pops the oldest queued write, for an external memory model to
    /// service.
    pub fn pop_outgoing_write(&mut self) -> Option<OutgoingWrite> {
        let write = self.outgoing_writes.front().copied();
        if write.is_some() {
            self.outgoing_writes.pop();
            self.outgoing_writes.commit();
        }
        write
    }

    fn find_line(&self, line_address: u64) -> Option<usize> {
        let set = self.geometry.set_index(line_address);
        (0..self.geometry.associativity as usize)
            .map(|way| (set, way))
            .find(|&(set, way)| {
                let cid = cid_of(&self.geometry, set, way);
                self.lines[cid.0 as usize].tag == Some(line_address)
            })
            .map(|(set, way)| cid_of(&self.geometry, set, way).0 as usize)
    }

    fn pick_victim(&self, line_address: u64) -> Option<usize> {
        let set = self.geometry.set_index(line_address);
        (0..self.geometry.associativity as usize)
            .map(|way| cid_of(&self.geometry, set, way).0 as usize)
            .filter(|&idx| self.lines[idx].evictable())
            .min_by_key(|&idx| {
                let invalid_first = u8::from(self.lines[idx].state != LineState::Invalid);
                (invalid_first, self.lines[idx].last_access)
            })
    }

    /// Issues a read for `line_address`. Returns the line's id once a
    /// line has been allocated and the read queued, or `None` if the set
    /// is full of non-evictable (LOADING) lines — the caller must return
    /// [`crate::kernel::process::CycleResult::Failed`] in that case.
    pub fn read_miss(&mut self, line_address: u64, cycle: u64) -> Option<Cid> {
        if let Some(idx) = self.find_line(line_address) {
            return Some(Cid(idx as u32));
        }
        if self.outgoing_reads.is_full() {
            return None;
        }
        let idx = self.pick_victim(line_address)?;
        let line = &mut self.lines[idx];
        line.tag = Some(line_address);
        line.valid.fill(false);
        line.state = LineState::Loading;
        line.last_access = cycle;
        line.waiting.clear();
        self.outgoing_reads.push(OutgoingRead {
            cid: Cid(idx as u32),
            line_address,
        });
        self.outgoing_reads.commit();
        Some(Cid(idx as u32))
    }

    /// Queues a register to be woken once `cid` completes loading.
    pub fn wait_for_line(&mut self, cid: Cid, waiter: WaitingRegister) {
        self.lines[cid.index()].waiting.push(waiter);
    }

    /// Lines that are FULL and still have a register parked on them —
    /// the set a place's drain sweep visits each cycle (spec §4.6: "drain
    /// the waiting-register list one register per cycle").
    pub fn ids_with_pending_waiters(&self) -> impl Iterator<Item = Cid> + '_ {
        self.lines.iter().enumerate().filter_map(|(idx, line)| {
            (line.state == LineState::Full && !line.waiting.is_empty()).then(|| Cid(idx as u32))
        })
    }

    /// `OnMemoryReadCompleted(addr, data)` (spec §6.2): merges the
    /// fetched bytes, applies any pending writes to the same line still
    /// queued in the outgoing-write buffer, and transitions the line to
    /// FULL (unless it was invalidated while loading, in which case it
    /// moves to EMPTY and the response is discarded, per §3.4).
    pub fn complete_read(&mut self, line_address: u64, data: &[u8]) {
        let Some(idx) = self.find_line(line_address) else {
            return;
        };
        let line = &mut self.lines[idx];
        match line.state {
            LineState::Invalid => {
                line.state = LineState::Empty;
                line.tag = None;
                line.waiting.clear();
                return;
            }
            LineState::Loading => {}
            _ => return,
        }
        line.data.copy_from_slice(data);
        line.valid.fill(true);
        line.state = LineState::Full;

        let pending_writes: Vec<OutgoingWrite> = self
            .outgoing_writes
            .iter()
            .filter(|w| w.line_address == line_address)
            .copied()
            .collect();
        for write in pending_writes {
            let line = &mut self.lines[idx];
            let off = write.offset as usize;
            let bytes = write.data.to_le_bytes();
            line.data[off..off + write.size as usize].copy_from_slice(&bytes[..write.size as usize]);
        }
    }

    /// Write-through: queues the write to memory; if the line is present
    /// and FULL, also updates in place; if LOADING, the caller must stall
    /// (signalled by returning `false`).
    #[must_use]
    pub fn write(&mut self, line_address: u64, offset: u32, size: u8, data: u64, writer: Tid) -> bool {
        if let Some(idx) = self.find_line(line_address) {
            if self.lines[idx].state == LineState::Loading {
                return false;
            }
            if self.lines[idx].state == LineState::Full {
                let line = &mut self.lines[idx];
                let off = offset as usize;
                let bytes = data.to_le_bytes();
                line.data[off..off + size as usize].copy_from_slice(&bytes[..size as usize]);
                for b in &mut line.valid[off..off + size as usize] {
                    *b = true;
                }
            }
        }
        if self.outgoing_writes.is_full() {
            return false;
        }
        self.outgoing_writes.push(OutgoingWrite {
            line_address,
            offset,
            size,
            data,
            writer,
        });
        self.outgoing_writes.commit();
        true
    }

    /// Snoop: merges `data` into the line at the given byte mask,
    /// upgrading valid bits but never changing state (spec §3.4/§4.6).
    pub fn snoop(&mut self, line_address: u64, data: &[u8], mask: &[bool]) {
        let Some(idx) = self.find_line(line_address) else {
            return;
        };
        let line = &mut self.lines[idx];
        for (i, &present) in mask.iter().enumerate() {
            if present {
                line.data[i] = data[i];
                line.valid[i] = true;
            }
        }
    }

    /// Invalidate: FULL -> EMPTY; LOADING -> INVALID so the eventual
    /// response can still be drained and discarded (spec §3.4).
    pub fn invalidate(&mut self, line_address: u64) {
        let Some(idx) = self.find_line(line_address) else {
            return;
        };
        let line = &mut self.lines[idx];
        line.state = match line.state {
            LineState::Full => {
                line.tag = None;
                LineState::Empty
            }
            LineState::Loading => LineState::Invalid,
            other => other,
        };
    }

    #[must_use]
    pub fn line(&self, cid: Cid) -> &DLine {
        &self.lines[cid.index()]
    }

    pub fn take_waiters(&mut self, cid: Cid) -> Vec<WaitingRegister> {
        std::mem::take(&mut self.lines[cid.index()].waiting)
    }

    pub fn commit(&mut self) {
        self.outgoing_reads.commit();
        self.outgoing_writes.commit();
    }

    pub fn rollback(&mut self) {
        self.outgoing_reads.rollback();
        self.outgoing_writes.rollback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> DCache {
        let mut registry = StorageRegistry::new();
        let geometry = CacheGeometry {
            line_size: 16,
            associativity: 2,
            sets: 4,
        };
        DCache::new(geometry, 4, &mut registry)
    }

    #[test]
    fn read_miss_allocates_a_loading_line() {
        let mut c = cache();
        let cid = c.read_miss(0x1000, 0).unwrap();
        assert_eq!(c.line(cid).state, LineState::Loading);
    }

    #[test]
    fn complete_read_transitions_to_full_and_merges_writes() {
        let mut c = cache();
        let writer = Tid::from(1_usize);
        let cid = c.read_miss(0x2000, 0).unwrap();
        assert!(c.write(0x2000, 4, 4, 0xAABB_CCDD, writer));
        let data = vec![0u8; 16];
        c.complete_read(0x2000, &data);
        assert_eq!(c.line(cid).state, LineState::Full);
        assert_eq!(&c.line(cid).data[4..8], &0xAABB_CCDDu32.to_le_bytes());
    }

    #[test]
    fn invalidate_loading_line_moves_to_invalid_not_empty() {
        let mut c = cache();
        c.read_miss(0x3000, 0).unwrap();
        c.invalidate(0x3000);
        let idx = c.find_line(0x3000).unwrap();
        assert_eq!(c.lines[idx].state, LineState::Invalid);
    }

    #[test]
    fn write_to_loading_line_reports_stall() {
        let mut c = cache();
        c.read_miss(0x4000, 0).unwrap();
        assert!(!c.write(0x4000, 0, 4, 1, Tid::from(0_usize)));
    }
}
