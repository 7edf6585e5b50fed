//! A fixed-latency main memory (spec §6.2), the minimum concrete
//! stand-in needed to drive the D-cache and I-cache's outgoing buffers to
//! completion. Real coherence/DMA protocols are out of scope (spec §1
//! Non-goals); this model answers every read after `latency` cycles and
//! applies writes immediately (write-through, no latency modeled for the
//! store path since nothing in spec §8's scenarios observes it).

use std::collections::VecDeque;

use crate::core::cache::dcache::DCache;
use crate::core::cache::icache::ICache;

struct PendingLine {
    ready_at: u64,
    line_address: u64,
}

/// A flat byte array backing both caches, addressed by line.
pub struct MainMemory {
    data: Vec<u8>,
    latency: u64,
    pending_dcache_reads: VecDeque<PendingLine>,
    pending_icache_fetches: VecDeque<PendingLine>,
}

impl MainMemory {
    #[must_use]
    pub fn new(size: usize, latency: u64) -> Self {
        Self { data: vec![0; size], latency, pending_dcache_reads: VecDeque::new(), pending_icache_fetches: VecDeque::new() }
    }

    /// Copies `bytes` into the backing store starting at `base`, used by
    /// the ELF loader to place a program image before boot.
    ///
    /// # Panics
    ///
    /// Panics if `base + bytes.len()` exceeds the configured memory size.
    pub fn load_image(&mut self, base: u64, bytes: &[u8]) {
        let start = base as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Total addressable size of the backing store, in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn line_bytes(&self, line_address: u64, line_size: usize) -> &[u8] {
        let start = line_address as usize;
        &self.data[start..start + line_size]
    }

    /// Drains `dcache`'s outgoing queues, queues reads for later delivery,
    /// and applies writes immediately. Delivers any reads whose latency
    /// has elapsed as of `cycle`.
    pub fn service_dcache(&mut self, dcache: &mut DCache, line_size: usize, cycle: u64) {
        while let Some(read) = dcache.pop_outgoing_read() {
            self.pending_dcache_reads.push_back(PendingLine { ready_at: cycle + self.latency, line_address: read.line_address });
        }
        while let Some(write) = dcache.pop_outgoing_write() {
            let start = write.line_address as usize + write.offset as usize;
            let bytes = write.data.to_le_bytes();
            self.data[start..start + write.size as usize].copy_from_slice(&bytes[..write.size as usize]);
        }
        while let Some(front) = self.pending_dcache_reads.front() {
            if front.ready_at > cycle {
                break;
            }
            let pending = self.pending_dcache_reads.pop_front().unwrap();
            let data = self.line_bytes(pending.line_address, line_size).to_vec();
            dcache.complete_read(pending.line_address, &data);
        }
    }

    /// Drains `icache`'s outgoing queue the same way.
    pub fn service_icache(&mut self, icache: &mut ICache, line_size: usize, cycle: u64) {
        while let Some(fetch) = icache.pop_outgoing() {
            self.pending_icache_fetches.push_back(PendingLine { ready_at: cycle + self.latency, line_address: fetch.line_address });
        }
        while let Some(front) = self.pending_icache_fetches.front() {
            if front.ready_at > cycle {
                break;
            }
            let pending = self.pending_icache_fetches.pop_front().unwrap();
            let data = self.line_bytes(pending.line_address, line_size).to_vec();
            icache.complete_fetch(pending.line_address, &data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::CacheGeometry;
    use crate::kernel::trace::StorageRegistry;

    fn geometry() -> CacheGeometry {
        CacheGeometry { line_size: 16, associativity: 1, sets: 4 }
    }

    #[test]
    fn icache_fetch_completes_after_latency() {
        let mut registry = StorageRegistry::new();
        let mut icache = ICache::new(geometry(), 2, &mut registry);
        let mut mem = MainMemory::new(4096, 2);
        mem.load_image(0x100, &[0xAB; 16]);

        icache.fetch(0x100, 0);
        mem.service_icache(&mut icache, 16, 0);
        mem.service_icache(&mut icache, 16, 1);
        assert_eq!(icache.line(icache.fetch(0x100, 1).unwrap()).state, crate::core::cache::LineState::Loading);
        mem.service_icache(&mut icache, 16, 2);
        assert_eq!(icache.line(icache.fetch(0x100, 2).unwrap()).state, crate::core::cache::LineState::Full);
    }

    #[test]
    fn dcache_write_then_read_sees_the_write() {
        let mut registry = StorageRegistry::new();
        let mut dcache = DCache::new(geometry(), 2, &mut registry);
        let mut mem = MainMemory::new(4096, 1);

        assert!(dcache.write(0x200, 0, 4, 0xDEAD_BEEF, crate::common::ids::Tid::from(0_usize)));
        mem.service_dcache(&mut dcache, 16, 0);

        dcache.read_miss(0x200, 0);
        mem.service_dcache(&mut dcache, 16, 0);
        mem.service_dcache(&mut dcache, 16, 1);
        assert_eq!(dcache.line(dcache.read_miss(0x200, 1).unwrap()).state, crate::core::cache::LineState::Full);
    }
}
