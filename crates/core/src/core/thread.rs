//! Thread table (spec §3.2, §4.5).
//!
//! A Thread is a single control flow belonging to exactly one family.
//! Like [`crate::core::family::FamilyTable`], free slots are segregated
//! by context class, and the table's per-slot `next` link doubles as the
//! backing storage for the allocator's ready queue and every register
//! cell's wait queue (spec §4.5: "nextInBlock").

use crate::common::ids::{Cid, Lfid, RegIndex, Tid};
use crate::core::family::ContextType;
use crate::kernel::trace::{StorageId, StorageRegistry, Trace};
use crate::storage::LinkedList;

/// A thread's lifecycle state (spec §3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Empty,
    Waiting,
    Ready,
    Active,
    Running,
    Suspended,
    Unused,
    Killed,
}

/// Per-thread dependency counters (spec §3.2).
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadDependencies {
    pub killed: bool,
    pub prev_cleaned_up: bool,
    pub num_pending_writes: u32,
}

impl ThreadDependencies {
    /// `numPendingWrites == 0` is required before cleanup (spec §3.2).
    #[must_use]
    pub const fn cleanup_ready(&self) -> bool {
        self.num_pending_writes == 0
    }
}

/// Per-register-type base indices for a thread's local/dependent/shared
/// window (spec §3.2: "per-type RegInfo {locals, dependents, shareds
/// base indices}").
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRegWindow {
    pub locals_base: RegIndex,
    pub dependents_base: RegIndex,
    pub shareds_base: RegIndex,
}

/// A thread slot.
#[derive(Debug, Clone)]
pub struct Thread {
    pub state: ThreadState,
    pub pc: u64,
    pub family: Lfid,
    pub integer: ThreadRegWindow,
    pub float: ThreadRegWindow,
    pub dependencies: ThreadDependencies,
    /// Current I-cache line this thread is fetching from; `None` exactly
    /// while the thread is EMPTY/UNUSED (spec §3.2 invariant).
    pub cid: Option<Cid>,
    /// `true` when this thread should switch to the next ready thread
    /// after its current instruction (fetch's `wantSwitch`/`killAfter`
    /// decision, spec §4.4.1).
    pub legacy: bool,
    /// Next thread in whatever intrusive list this slot is currently
    /// threaded onto — a register cell's wait chain beyond its `head`,
    /// in this architecture's case (spec §4.3/§4.5: "nextInBlock").
    pub next: Option<Tid>,
}

impl Thread {
    fn new_empty() -> Self {
        Self {
            state: ThreadState::Empty,
            pc: 0,
            family: Lfid::INVALID,
            integer: ThreadRegWindow::default(),
            float: ThreadRegWindow::default(),
            dependencies: ThreadDependencies::default(),
            cid: None,
            legacy: false,
            next: None,
        }
    }

    /// "a thread holds an I-cache line (`cid != INVALID`) exactly while
    /// it is not in state EMPTY/UNUSED" (spec §3.2 invariant).
    #[must_use]
    pub fn cid_invariant_holds(&self) -> bool {
        let should_have_cid = !matches!(self.state, ThreadState::Empty | ThreadState::Unused);
        self.cid.is_some() == should_have_cid
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new_empty()
    }
}

/// Fixed-size table of threads, the ready queue, and per-context free
/// lists, all threaded through the same per-slot `next` links convention
/// as the family table.
pub struct ThreadTable {
    slots: Vec<Thread>,
    free_normal: LinkedList,
    free_reserved: LinkedList,
    free_exclusive: LinkedList,
    ready: LinkedList,
}

impl ThreadTable {
    #[must_use]
    pub fn new(
        size: usize,
        reserved_slots: usize,
        exclusive_slots: usize,
        registry: &mut StorageRegistry,
    ) -> Self {
        assert!(
            reserved_slots + exclusive_slots <= size,
            "reserved + exclusive slots exceed thread table size"
        );
        let mut free_normal = LinkedList::new(registry.register("thread.free.normal"), size);
        let mut free_reserved = LinkedList::new(registry.register("thread.free.reserved"), size);
        let mut free_exclusive = LinkedList::new(registry.register("thread.free.exclusive"), size);
        let ready = LinkedList::new(registry.register("thread.ready"), size);

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
            slots: vec![Thread::default(); size],
            free_normal,
            free_reserved,
            free_exclusive,
            ready,
        }
    }

    #[must_use]
    pub fn trace(&self) -> Trace {
        Trace::from_ids(self.storage_ids())
    }

    #[must_use]
    pub fn storage_ids(&self) -> [StorageId; 4] {
        [
            self.free_normal.id(),
            self.free_reserved.id(),
            self.free_exclusive.id(),
            self.ready.id(),
        ]
    }

    #[must_use]
    pub fn get(&self, tid: crate::common::ids::Tid) -> &Thread {
        &self.slots[tid.index()]
    }

    pub fn get_mut(&mut self, tid: crate::common::ids::Tid) -> &mut Thread {
        &mut self.slots[tid.index()]
    }

    fn free_list_for(&mut self, context: ContextType) -> &mut LinkedList {
        match context {
            ContextType::Normal => &mut self.free_normal,
            ContextType::Reserved => &mut self.free_reserved,
            ContextType::Exclusive => &mut self.free_exclusive,
        }
    }

    /// Pulls a slot from the empty list (spec §3.2: "pulled from empty
    /// list by `PopEmpty(context)`"), falling back to the normal pool for
    /// non-normal contexts the same way [`crate::core::family::FamilyTable::pop_free`] does.
    pub fn pop_empty(&mut self, context: ContextType) -> Option<crate::common::ids::Tid> {
        let primary = self.free_list_for(context);
        if !primary.is_empty() {
            let idx = primary.front().unwrap();
            primary.pop_front();
            primary.commit();
            return Some(crate::common::ids::Tid::from(idx as usize));
        }
        if matches!(context, ContextType::Normal) {
            return None;
        }
        if !self.free_normal.is_empty() {
            let idx = self.free_normal.front().unwrap();
            self.free_normal.pop_front();
            self.free_normal.commit();
            return Some(crate::common::ids::Tid::from(idx as usize));
        }
        None
    }

    /// Pushes a cleaned-up thread back onto its context's empty list.
    pub fn push_empty(&mut self, tid: crate::common::ids::Tid, context: ContextType) {
        self.slots[tid.index()] = Thread::default();
        let list = self.free_list_for(context);
        list.push_back(tid.index() as u32);
        list.commit();
    }

    /// Appends `tid` to the ready queue. Returns `false` (caller must
    /// treat this as [`crate::kernel::process::CycleResult::Failed`]) if
    /// the ready queue has no room — the table is sized to the thread
    /// count so this only happens transiently within a cycle's
    /// arbitration, never structurally.
    #[must_use]
    pub fn push_ready(&mut self, tid: crate::common::ids::Tid) -> bool {
        if self.ready.iter().count() >= self.slots.len() {
            return false;
        }
        self.ready.push_back(tid.index() as u32);
        self.ready.commit();
        true
    }

    /// Pops the next ready thread, if any.
    pub fn pop_ready(&mut self) -> Option<crate::common::ids::Tid> {
        if self.ready.is_empty() {
            return None;
        }
        let idx = self.ready.front().unwrap();
        self.ready.pop_front();
        self.ready.commit();
        Some(crate::common::ids::Tid::from(idx as usize))
    }

    #[must_use]
    pub fn ready_is_empty(&self) -> bool {
        self.ready.is_empty()
    }

    /// Number of threads currently queued ready, used by Fetch's switch
    /// decision ("`wantSwitch` and more than one ready thread", spec
    /// §4.4.1).
    #[must_use]
    pub fn ready_len(&self) -> usize {
        self.ready.iter().count()
    }

    /// Threads a new waiter onto the tail of the wait chain rooted at
    /// `head`, for a register cell that was already `WAITING` (spec
    /// §4.3: the cell only remembers `head`, the rest lives here).
    pub fn append_to_wait_chain(&mut self, head: Tid, tid: Tid) {
        let mut cur = head;
        while let Some(next) = self.slots[cur.index()].next {
            cur = next;
        }
        self.slots[cur.index()].next = Some(tid);
    }

    /// Appends every thread in the chain rooted at `head` onto the ready
    /// queue, in list order, atomically: if the queue can't fit the
    /// whole chain this cycle none of it is pushed (spec §4.3's wakeup
    /// protocol — no partial drain).
    #[must_use]
    pub fn push_ready_chain(&mut self, head: Tid) -> bool {
        let mut chain = Vec::new();
        let mut cur = Some(head);
        while let Some(tid) = cur {
            cur = self.slots[tid.index()].next;
            chain.push(tid);
        }
        if self.ready.iter().count() + chain.len() > self.slots.len() {
            return false;
        }
        for tid in chain {
            self.slots[tid.index()].next = None;
            self.ready.push_back(tid.index() as u32);
        }
        self.ready.commit();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_empty_then_push_ready_then_pop_ready_round_trips() {
        let mut registry = StorageRegistry::new();
        let mut table = ThreadTable::new(4, 0, 0, &mut registry);
        let tid = table.pop_empty(ContextType::Normal).unwrap();
        assert!(table.push_ready(tid));
        assert_eq!(table.pop_ready(), Some(tid));
        assert!(table.ready_is_empty());
    }

    #[test]
    fn cid_invariant_flags_empty_threads_without_a_line() {
        let t = Thread::default();
        assert!(t.cid_invariant_holds());
    }

    #[test]
    fn push_ready_chain_wakes_every_waiter_in_list_order() {
        let mut registry = StorageRegistry::new();
        let mut table = ThreadTable::new(8, 0, 0, &mut registry);
        let a = table.pop_empty(ContextType::Normal).unwrap();
        let b = table.pop_empty(ContextType::Normal).unwrap();
        let c = table.pop_empty(ContextType::Normal).unwrap();
        table.append_to_wait_chain(a, b);
        table.append_to_wait_chain(a, c);

        assert!(table.push_ready_chain(a));
        assert_eq!(table.pop_ready(), Some(a));
        assert_eq!(table.pop_ready(), Some(b));
        assert_eq!(table.pop_ready(), Some(c));
        assert!(table.ready_is_empty());
    }

    #[test]
    fn push_ready_chain_is_all_or_nothing_when_the_queue_is_too_small() {
        let mut registry = StorageRegistry::new();
        let mut table = ThreadTable::new(1, 0, 0, &mut registry);
        let a = table.pop_empty(ContextType::Normal).unwrap();
        assert!(table.push_ready(a));
        // The ready queue already holds every slot the table has; waking
        // the (single-element) chain again must fail outright rather than
        // double-queue it.
        assert!(!table.push_ready_chain(a));
        assert_eq!(table.pop_ready(), Some(a));
        assert!(table.ready_is_empty());
    }

    #[test]
    fn cleanup_requires_zero_pending_writes() {
        let mut deps = ThreadDependencies {
            num_pending_writes: 1,
            ..Default::default()
        };
        assert!(!deps.cleanup_ready());
        deps.num_pending_writes = 0;
        assert!(deps.cleanup_ready());
    }
}
