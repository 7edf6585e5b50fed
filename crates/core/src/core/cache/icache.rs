//! I-cache: set-associative, read-only, same line state machine as the
//! D-cache minus write-through and snoop (spec §4.6: "Both are
//! set-associative, LRU within a set").

use crate::common::ids::{Cid, Tid};
use crate::core::cache::{cid_of, CacheGeometry, LineState};
use crate::kernel::trace::{StorageId, StorageRegistry, Trace};
use crate::storage::Buffer;

#[derive(Debug, Clone)]
pub struct ILine {
    pub tag: Option<u64>,
    pub data: Vec<u8>,
    pub last_access: u64,
    pub state: LineState,
    pub waiting: Vec<Tid>,
}

impl ILine {
    fn new(line_size: usize) -> Self {
        Self {
            tag: None,
            data: vec![0; line_size],
            last_access: 0,
            state: LineState::Empty,
            waiting: Vec::new(),
        }
    }

    const fn evictable(&self) -> bool {
        matches!(self.state, LineState::Invalid | LineState::Full)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OutgoingFetch {
    pub cid: Cid,
    pub line_address: u64,
}

pub struct ICache {
    geometry: CacheGeometry,
    lines: Vec<ILine>,
    outgoing: Buffer<OutgoingFetch>,
    registry_id: StorageId,
}

impl ICache {
    #[must_use]
    pub fn new(geometry: CacheGeometry, buffer_capacity: usize, registry: &mut StorageRegistry) -> Self {
        let line_count = geometry.lines() as usize;
        Self {
            geometry,
            lines: (0..line_count)
                .map(|_| ILine::new(geometry.line_size as usize))
                .collect(),
            outgoing: Buffer::new(registry.register("icache.outgoing"), buffer_capacity),
            registry_id: registry.register("icache.lines"),
        }
    }

    #[must_use]
    pub fn trace(&self) -> Trace {
        Trace::from_ids([self.registry_id, self.outgoing.id()])
    }

    fn find_line(&self, line_address: u64) -> Option<usize> {
        let set = self.geometry.set_index(line_address);
        (0..self.geometry.associativity as usize)
            .map(|way| cid_of(&self.geometry, set, way).0 as usize)
            .find(|&idx| self.lines[idx].tag == Some(line_address))
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

    /// Fetches the line containing `line_address`, returning its [`Cid`]
    /// if already resident or once newly queued for load.
    pub fn fetch(&mut self, line_address: u64, cycle: u64) -> Option<Cid> {
        if let Some(idx) = self.find_line(line_address) {
            return Some(Cid(idx as u32));
        }
        if self.outgoing.is_full() {
            return None;
        }
        let idx = self.pick_victim(line_address)?;
        let line = &mut self.lines[idx];
        line.tag = Some(line_address);
        line.state = LineState::Loading;
        line.last_access = cycle;
        line.waiting.clear();
        self.outgoing.push(OutgoingFetch {
            cid: Cid(idx as u32),
            line_address,
        });
        self.outgoing.commit();
        Some(Cid(idx as u32))
    }

    /// Pops the oldest queued fetch, for an external memory model to
    /// service (spec §6.2).
    pub fn pop_outgoing(&mut self) -> Option<OutgoingFetch> {
        let fetch = self.outgoing.front().copied();
        if fetch.is_some() {
            self.outgoing.pop();
            self.outgoing.commit();
        }
        fetch
    }

    pub fn complete_fetch(&mut self, line_address: u64, data: &[u8]) {
        let Some(idx) = self.find_line(line_address) else {
            return;
        };
        let line = &mut self.lines[idx];
        match line.state {
            LineState::Invalid => {
                line.state = LineState::Empty;
                line.tag = None;
            }
            LineState::Loading => {
                line.data.copy_from_slice(data);
                line.state = LineState::Full;
            }
            _ => {}
        }
    }

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
    pub fn line(&self, cid: Cid) -> &ILine {
        &self.lines[cid.index()]
    }

    pub fn commit(&mut self) {
        self.outgoing.commit();
    }

    pub fn rollback(&mut self) {
        self.outgoing.rollback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_then_complete_makes_line_full() {
        let mut registry = StorageRegistry::new();
        let geometry = CacheGeometry {
            line_size: 16,
            associativity: 1,
            sets: 2,
        };
        let mut c = ICache::new(geometry, 2, &mut registry);
        let cid = c.fetch(0x1000, 0).unwrap();
        assert_eq!(c.line(cid).state, LineState::Loading);
        c.complete_fetch(0x1000, &[0xAA; 16]);
        assert_eq!(c.line(cid).state, LineState::Full);
    }
}
