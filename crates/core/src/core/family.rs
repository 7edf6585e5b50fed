//! Family table (spec §3.1, §4.5).
//!
//! A Family is a loop-like group of threads. Slots are held in a
//! fixed-size table; free slots are tracked per context class (normal,
//! reserved, exclusive) via three [`LinkedList`] free lists so the RAU's
//! reserved-block guarantee (spec §4.8) has a matching reserved-slot
//! guarantee at the family-table level.

use crate::common::ids::{Cid, Lfid, Pid, RegIndex};
use crate::kernel::trace::{StorageId, StorageRegistry, Trace};
use crate::storage::LinkedList;

/// Context pool a family or thread allocation draws from (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextType {
    Normal,
    Reserved,
    Exclusive,
}

/// A family's lifecycle state (spec §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyState {
    Empty,
    Allocated,
    CreateQueued,
    Creating,
    Idle,
    Active,
    Killed,
}

/// Per-register-type bookkeeping for a family (spec §3.1: "RegInfo
/// {count{globals, shareds, locals}, base, size, last_shareds}").
///
/// `globals`/`shareds`/`locals` are all *per-thread* counts: globals are
/// one family-wide copy (physical address `base + index`), while shareds
/// and locals are carved out fresh per thread from this same register
/// type's RAU (spec §3.2's per-thread window). `thread_count` records how
/// many per-thread windows have actually been carved so far, so the
/// allocator doesn't need to re-derive it from the thread table.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegInfo {
    pub globals: u32,
    pub shareds: u32,
    pub locals: u32,
    pub base: RegIndex,
    pub size: u32,
    pub last_shareds: RegIndex,
    pub thread_count: u32,
}

/// Family dependency counters (spec §3.1). A family is only freed once
/// every counter has reached its terminal value — see
/// [`FamilyDependencies::can_free`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FamilyDependencies {
    pub allocation_done: bool,
    pub prev_synchronized: bool,
    pub detached: bool,
    pub sync_sent: bool,
    pub num_threads_allocated: u32,
    pub num_pending_reads: u32,
}

impl FamilyDependencies {
    /// `!detached && syncSent && allocationDone && numThreadsAllocated==0
    /// && numPendingReads==0` (spec §3.1 invariant).
    #[must_use]
    pub const fn can_free(&self) -> bool {
        !self.detached
            && self.sync_sent
            && self.allocation_done
            && self.num_threads_allocated == 0
            && self.num_pending_reads == 0
    }
}

/// Where a family's completion is reported (spec §3.1: "sync descriptor
/// {pid, exit-code register index, done-flag}").
#[derive(Debug, Clone, Copy)]
pub struct SyncDescriptor {
    pub pid: Pid,
    pub exit_code_reg: RegIndex,
    pub done: bool,
}

/// A family slot.
#[derive(Debug, Clone)]
pub struct Family {
    pub state: FamilyState,
    pub pc: u64,
    pub start: i64,
    pub limit: Option<i64>,
    pub step: i64,
    pub virt_block_size: u32,
    pub phys_block_size: u32,
    pub place_size: u32,
    pub num_cores: u32,
    pub integer: RegInfo,
    pub float: RegInfo,
    pub dependencies: FamilyDependencies,
    /// Matching family slot on the next core of the ring, for group
    /// families spanning more than one core.
    pub next_on_ring: Option<Lfid>,
    /// Random bits used as a capability check on remote accesses.
    pub capability: u64,
    pub sync: Option<SyncDescriptor>,
    pub context_type: ContextType,
    /// Current I-cache line this family's program is fetching from,
    /// tracked here because a freshly-created family shares one line
    /// across all its initial threads.
    pub cid: Option<Cid>,
}

impl Family {
    fn new_empty() -> Self {
        Self {
            state: FamilyState::Empty,
            pc: 0,
            start: 0,
            limit: None,
            step: 1,
            virt_block_size: 0,
            phys_block_size: 0,
            place_size: 1,
            num_cores: 0,
            integer: RegInfo::default(),
            float: RegInfo::default(),
            dependencies: FamilyDependencies::default(),
            next_on_ring: None,
            capability: 0,
            sync: None,
            context_type: ContextType::Normal,
            cid: None,
        }
    }

    /// `numThreadsAllocated ≤ physBlockSize` (spec §3.1 invariant).
    #[must_use]
    pub const fn within_block_size(&self) -> bool {
        self.dependencies.num_threads_allocated <= self.phys_block_size
    }
}

impl Default for Family {
    fn default() -> Self {
        Self::new_empty()
    }
}

/// Fixed-size table of families plus per-context free lists.
pub struct FamilyTable {
    slots: Vec<Family>,
    free_normal: LinkedList,
    free_reserved: LinkedList,
    free_exclusive: LinkedList,
}

impl FamilyTable {
    /// Creates a table of `size` empty slots, with the last
    /// `exclusive_slots` reserved exclusively and the rest split between
    /// `reserved_slots` reserved and the remainder normal.
    #[must_use]
    pub fn new(
        size: usize,
        reserved_slots: usize,
        exclusive_slots: usize,
        registry: &mut StorageRegistry,
    ) -> Self {
        assert!(
            reserved_slots + exclusive_slots <= size,
            "reserved + exclusive slots exceed family table size"
        );
        let mut free_normal = LinkedList::new(registry.register("family.free.normal"), size);
        let mut free_reserved = LinkedList::new(registry.register("family.free.reserved"), size);
        let mut free_exclusive = LinkedList::new(registry.register("family.free.exclusive"), size);

        let normal_count = size - reserved_slots - exclusive_slots;
        for i in 0..normal_count {
            free_normal.push_back(i as u32);
            free_normal.commit();
        }
        for i in normal_count..normal_count + reserved_slots {
            free_reserved.push_back(i as u32);
            free_reserved.commit();
        }
        for i in normal_count + reserved_slots..size {
            free_exclusive.push_back(i as u32);
            free_exclusive.commit();
        }

        Self {
            slots: vec![Family::default(); size],
            free_normal,
            free_reserved,
            free_exclusive,
        }
    }

    #[must_use]
    pub fn trace(&self) -> Trace {
        Trace::from_ids([self.free_normal.id(), self.free_reserved.id(), self.free_exclusive.id()])
    }

    #[must_use]
    pub fn storage_ids(&self) -> [StorageId; 3] {
        [self.free_normal.id(), self.free_reserved.id(), self.free_exclusive.id()]
    }

    #[must_use]
    pub fn get(&self, lfid: Lfid) -> &Family {
        &self.slots[lfid.index()]
    }

    pub fn get_mut(&mut self, lfid: Lfid) -> &mut Family {
        &mut self.slots[lfid.index()]
    }

    fn free_list_for(&mut self, context: ContextType) -> &mut LinkedList {
        match context {
            ContextType::Normal => &mut self.free_normal,
            ContextType::Reserved => &mut self.free_reserved,
            ContextType::Exclusive => &mut self.free_exclusive,
        }
    }

    /// Pops a free slot from `context`'s free list, or falls back to the
    /// normal pool if `context` is non-normal and its own pool is empty
    /// (spec §4.8's "one extra block from the matching reserved pool").
    ///
    /// Returns `None` (caller should return
    /// [`crate::kernel::process::CycleResult::Failed`]) if no slot is
    /// available anywhere.
    pub fn pop_free(&mut self, context: ContextType) -> Option<Lfid> {
        let primary = self.free_list_for(context);
        if !primary.is_empty() {
            let idx = primary.front().unwrap();
            primary.pop_front();
            primary.commit();
            return Some(Lfid::from(idx as usize));
        }
        if matches!(context, ContextType::Normal) {
            return None;
        }
        if !self.free_normal.is_empty() {
            let idx = self.free_normal.front().unwrap();
            self.free_normal.pop_front();
            self.free_normal.commit();
            return Some(Lfid::from(idx as usize));
        }
        None
    }

    /// Returns a slot to the free list matching `context` — "on free, if
    /// the family held a reserved context it is returned to that
    /// context's pool first" (spec §4.8).
    pub fn push_free(&mut self, lfid: Lfid, context: ContextType) {
        self.slots[lfid.index()] = Family::default();
        let list = self.free_list_for(context);
        list.push_back(lfid.index() as u32);
        list.commit();
    }

    /// `true` once every slot has been returned to one of the free lists
    /// (the family-table half of the original's `IsIdle`).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.free_normal.iter().count() + self.free_reserved.iter().count() + self.free_exclusive.iter().count()
            == self.slots.len()
    }
}
