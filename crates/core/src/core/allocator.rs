//! The Allocator (spec §4.5): owns the family and thread tables and the
//! queues that feed the pipeline, and drives the create state machine.

use tracing::debug;

use crate::common::ids::{Lfid, Pid, RegAddr, RegClass, RegIndex, RegType, Tid, INVALID_REG_INDEX};
use crate::core::family::{ContextType, FamilyState, FamilyTable, RegInfo};
use crate::core::rau::RAUnit;
use crate::core::thread::{ThreadRegWindow, ThreadState, ThreadTable};
use crate::kernel::trace::StorageRegistry;

/// The create state machine (spec §4.5): `INITIAL -> LOADING_LINE ->
/// LINE_LOADED -> ALLOCATING_REGISTERS -> (if group) BROADCASTING_CREATE
/// -> ACTIVATING_FAMILY -> NOTIFY`. Only one create is in flight per core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateState {
    Initial,
    LoadingLine,
    LineLoaded,
    AllocatingRegisters,
    BroadcastingCreate,
    ActivatingFamily,
    Notify,
}

/// Result of advancing the create state machine by one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateProgress {
    /// A resource the current state needs (a register block, most often)
    /// is unavailable; state did not advance, caller should retry.
    Stalled,
    /// State advanced; the create is not finished yet.
    InProgress,
    /// The create reached `NOTIFY` and the family is now `ACTIVE`.
    Done(Lfid),
}

/// Which family dependency counter an event decrements (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyDependencyKind {
    AllocationDone,
    PrevSynchronized,
    SyncSent,
    ThreadCompleted,
    ReadCompleted,
}

/// Which thread dependency counter an event decrements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadDependencyKind {
    Killed,
    PrevCleanedUp,
    WriteCompleted,
}

/// The per-thread window shape a register type is carved into (spec
/// §3.1/§3.2): `globals` is allocated once per family, `shareds`/`locals`
/// once per thread.
#[derive(Debug, Clone, Copy)]
pub struct RegisterShape {
    pub globals: u32,
    pub shareds: u32,
    pub locals: u32,
}

/// How many logical registers a freshly booted core's identity window
/// covers — enough for any program that addresses registers flat,
/// without a family's shareds/locals/dependents classes getting in the
/// way (boot always runs with exactly one thread).
pub const BOOT_IDENTITY_REGISTERS: u32 = 64;

fn align_up(n: u32, block_size: u32) -> u32 {
    if n == 0 {
        0
    } else {
        n.div_ceil(block_size) * block_size
    }
}

/// Owns the family table, thread table, and the two RAUnits (one per
/// register type), and orchestrates allocation, create, and cleanup.
pub struct Allocator {
    pid: Pid,
    families: FamilyTable,
    threads: ThreadTable,
    int_rau: RAUnit,
    flt_rau: RAUnit,
    int_reg_shape: RegisterShape,
    flt_reg_shape: RegisterShape,
    /// State of the single in-flight create on this core, if any.
    create_state: Option<(Lfid, CreateState)>,
    cleanup_queue: Vec<Tid>,
}

impl Allocator {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pid: Pid,
        num_families: u32,
        num_threads: u32,
        exclusive_family_slots: u32,
        int_rau: RAUnit,
        flt_rau: RAUnit,
        int_reg_shape: RegisterShape,
        flt_reg_shape: RegisterShape,
        registry: &mut StorageRegistry,
    ) -> Self {
        let reserved_family_slots = 1;
        let families = FamilyTable::new(
            num_families as usize,
            reserved_family_slots,
            exclusive_family_slots as usize,
            registry,
        );
        let threads = ThreadTable::new(num_threads as usize, 1, 0, registry);
        Self {
            pid,
            families,
            threads,
            int_rau,
            flt_rau,
            int_reg_shape,
            flt_reg_shape,
            create_state: None,
            cleanup_queue: Vec::new(),
        }
    }

    #[must_use]
    pub const fn pid(&self) -> Pid {
        self.pid
    }

    #[must_use]
    pub fn families(&self) -> &FamilyTable {
        &self.families
    }

    pub fn families_mut(&mut self) -> &mut FamilyTable {
        &mut self.families
    }

    #[must_use]
    pub fn threads(&self) -> &ThreadTable {
        &self.threads
    }

    pub fn threads_mut(&mut self) -> &mut ThreadTable {
        &mut self.threads
    }

    fn shape_for(&self, rtype: RegType) -> RegisterShape {
        match rtype {
            RegType::Integer => self.int_reg_shape,
            RegType::Float => self.flt_reg_shape,
        }
    }

    fn rau_for(&self, rtype: RegType) -> &RAUnit {
        match rtype {
            RegType::Integer => &self.int_rau,
            RegType::Float => &self.flt_rau,
        }
    }

    fn rau_for_mut(&mut self, rtype: RegType) -> &mut RAUnit {
        match rtype {
            RegType::Integer => &mut self.int_rau,
            RegType::Float => &mut self.flt_rau,
        }
    }

    fn reg_info(&self, lfid: Lfid, rtype: RegType) -> &RegInfo {
        match rtype {
            RegType::Integer => &self.families.get(lfid).integer,
            RegType::Float => &self.families.get(lfid).float,
        }
    }

    fn reg_info_mut(&mut self, lfid: Lfid, rtype: RegType) -> &mut RegInfo {
        match rtype {
            RegType::Integer => &mut self.families.get_mut(lfid).integer,
            RegType::Float => &mut self.families.get_mut(lfid).float,
        }
    }

    /// `AllocateFamily(parent, reg, context)` (spec §4.5): reserves a
    /// family slot. Returns `None` if no slot is free for `context`.
    pub fn allocate_family(&mut self, context: ContextType) -> Option<Lfid> {
        let lfid = self.families.pop_free(context)?;
        let family = self.families.get_mut(lfid);
        family.state = FamilyState::Allocated;
        family.context_type = context;
        debug!(pid = ?self.pid, lfid = ?lfid, "family allocated");
        Some(lfid)
    }

    /// Gives a freshly allocated family its family-wide, single-thread
    /// identity register window directly (no per-thread shareds/locals),
    /// bypassing the configured [`RegisterShape`] used by ordinary
    /// creates. Used only by a core's boot sequence.
    pub fn allocate_boot_registers(&mut self, lfid: Lfid) -> bool {
        let shape = RegisterShape { globals: BOOT_IDENTITY_REGISTERS, shareds: 0, locals: 0 };
        self.allocate_family_registers_with_shape(lfid, RegType::Integer, shape)
            && self.allocate_family_registers_with_shape(lfid, RegType::Float, shape)
    }

    /// Allocates `lfid`'s family-wide globals window for both register
    /// types from the configured [`RegisterShape`]. Idempotent: a type
    /// whose window is already allocated is left untouched, so a stalled
    /// retry only completes whichever type is still missing.
    fn allocate_family_registers(&mut self, lfid: Lfid) -> bool {
        let int_shape = self.int_reg_shape;
        let flt_shape = self.flt_reg_shape;
        self.allocate_family_registers_with_shape(lfid, RegType::Integer, int_shape)
            && self.allocate_family_registers_with_shape(lfid, RegType::Float, flt_shape)
    }

    fn allocate_family_registers_with_shape(&mut self, lfid: Lfid, rtype: RegType, shape: RegisterShape) -> bool {
        if self.reg_info(lfid, rtype).size > 0 || shape.globals == 0 {
            return true;
        }
        let context = self.families.get(lfid).context_type;
        let block_size = self.rau_for(rtype).block_size();
        let size = align_up(shape.globals, block_size);
        let Some(base) = self.rau_for_mut(rtype).alloc(size, context) else {
            return false;
        };
        let info = self.reg_info_mut(lfid, rtype);
        info.globals = shape.globals;
        info.shareds = shape.shareds;
        info.locals = shape.locals;
        info.base = base;
        info.size = size;
        info.last_shareds = INVALID_REG_INDEX;
        info.thread_count = 0;
        true
    }

    fn free_family_registers(&mut self, lfid: Lfid) {
        for rtype in RegType::ALL {
            let info = *self.reg_info(lfid, rtype);
            if info.size > 0 {
                let _ = self.rau_for_mut(rtype).free(info.base, info.size);
            }
        }
    }

    /// `QueueCreate(fid, pc, parent, exitCodeReg)`: moves a family from
    /// ALLOCATED to CREATE_QUEUED and starts its create state machine.
    ///
    /// # Panics
    ///
    /// Panics if another create is already in flight on this core — the
    /// spec requires exactly one in-flight create per core; callers must
    /// check [`Self::create_in_progress`] first.
    pub fn queue_create(&mut self, lfid: Lfid, pc: u64) {
        assert!(self.create_state.is_none(), "a create is already in flight");
        let family = self.families.get_mut(lfid);
        family.pc = pc;
        family.state = FamilyState::CreateQueued;
        self.create_state = Some((lfid, CreateState::Initial));
    }

    #[must_use]
    pub fn create_in_progress(&self) -> bool {
        self.create_state.is_some()
    }

    /// Advances the create state machine by one step, per the sequence
    /// named in spec §4.5.
    pub fn advance_create(&mut self, is_group: bool) -> CreateProgress {
        let Some((lfid, state)) = self.create_state else {
            return CreateProgress::Stalled;
        };
        let next = match state {
            CreateState::Initial => CreateState::LoadingLine,
            CreateState::LoadingLine => CreateState::LineLoaded,
            CreateState::LineLoaded => CreateState::AllocatingRegisters,
            CreateState::AllocatingRegisters => {
                if !self.allocate_family_registers(lfid) {
                    return CreateProgress::Stalled;
                }
                if is_group {
                    CreateState::BroadcastingCreate
                } else {
                    CreateState::ActivatingFamily
                }
            }
            CreateState::BroadcastingCreate => CreateState::ActivatingFamily,
            CreateState::ActivatingFamily => CreateState::Notify,
            CreateState::Notify => {
                self.families.get_mut(lfid).state = FamilyState::Active;
                self.create_state = None;
                return CreateProgress::Done(lfid);
            }
        };
        self.create_state = Some((lfid, next));
        CreateProgress::InProgress
    }

    /// `AllocateThread(fid, tid)` (spec §4.5): pulls a thread slot for
    /// `lfid` and carves its per-thread shareds/locals register window
    /// out of the same RAU the family's globals came from. The new
    /// thread's DEPENDENT class aliases the previous thread's SHARED
    /// class (spec §3.2's successor chain); the family's first thread
    /// aliases its own shareds, so reading a just-written shared register
    /// resolves without a cross-thread wait.
    pub fn allocate_thread(&mut self, lfid: Lfid) -> Option<Tid> {
        let context = self.families.get(lfid).context_type;
        let tid = self.threads.pop_empty(context)?;

        let Some(int_window) = self.carve_thread_window(lfid, RegType::Integer) else {
            self.threads.push_empty(tid, context);
            return None;
        };
        let Some(flt_window) = self.carve_thread_window(lfid, RegType::Float) else {
            self.free_thread_window(RegType::Integer, int_window);
            self.threads.push_empty(tid, context);
            return None;
        };

        let pc = self.families.get(lfid).pc;
        let thread = self.threads.get_mut(tid);
        thread.family = lfid;
        thread.pc = pc;
        thread.state = ThreadState::Waiting;
        thread.integer = int_window;
        thread.float = flt_window;

        self.remember_last_shareds(lfid, RegType::Integer, int_window.shareds_base);
        self.remember_last_shareds(lfid, RegType::Float, flt_window.shareds_base);
        self.families.get_mut(lfid).dependencies.num_threads_allocated += 1;
        Some(tid)
    }

    fn carve_thread_window(&mut self, lfid: Lfid, rtype: RegType) -> Option<ThreadRegWindow> {
        let shape = self.shape_for(rtype);
        let block_size = self.rau_for(rtype).block_size();
        let size = align_up(shape.shareds + shape.locals, block_size);
        let last_shareds = self.reg_info(lfid, rtype).last_shareds;
        if size == 0 {
            let dependents_base = if last_shareds == INVALID_REG_INDEX { 0 } else { last_shareds };
            return Some(ThreadRegWindow { shareds_base: 0, locals_base: 0, dependents_base });
        }
        let context = self.families.get(lfid).context_type;
        let shareds_base = self.rau_for_mut(rtype).alloc(size, context)?;
        let locals_base = shareds_base + shape.shareds;
        let dependents_base = if last_shareds == INVALID_REG_INDEX { shareds_base } else { last_shareds };
        Some(ThreadRegWindow { shareds_base, locals_base, dependents_base })
    }

    fn free_thread_window(&mut self, rtype: RegType, window: ThreadRegWindow) {
        let shape = self.shape_for(rtype);
        let block_size = self.rau_for(rtype).block_size();
        let size = align_up(shape.shareds + shape.locals, block_size);
        if size > 0 {
            let _ = self.rau_for_mut(rtype).free(window.shareds_base, size);
        }
    }

    fn remember_last_shareds(&mut self, lfid: Lfid, rtype: RegType, shareds_base: RegIndex) {
        let shape = self.shape_for(rtype);
        if shape.shareds + shape.locals == 0 {
            return;
        }
        let info = self.reg_info_mut(lfid, rtype);
        info.last_shareds = shareds_base;
        info.thread_count += 1;
    }

    /// `ActivateThread(tid)`: moves a waiting thread to ready, pushing it
    /// onto the ready queue.
    #[must_use]
    pub fn activate_thread(&mut self, tid: Tid) -> bool {
        let thread = self.threads.get_mut(tid);
        if thread.state != ThreadState::Waiting {
            return true;
        }
        if !self.threads.push_ready(tid) {
            return false;
        }
        self.threads.get_mut(tid).state = ThreadState::Ready;
        true
    }

    /// `DecreaseFamilyDependency(fid, kind)`.
    pub fn decrease_family_dependency(&mut self, lfid: Lfid, kind: FamilyDependencyKind) {
        let deps = &mut self.families.get_mut(lfid).dependencies;
        match kind {
            FamilyDependencyKind::AllocationDone => deps.allocation_done = true,
            FamilyDependencyKind::PrevSynchronized => deps.prev_synchronized = true,
            FamilyDependencyKind::SyncSent => deps.sync_sent = true,
            FamilyDependencyKind::ThreadCompleted => {
                deps.num_threads_allocated = deps.num_threads_allocated.saturating_sub(1);
            }
            FamilyDependencyKind::ReadCompleted => {
                deps.num_pending_reads = deps.num_pending_reads.saturating_sub(1);
            }
        }
        if self.families.get(lfid).dependencies.can_free() {
            self.free_family_registers(lfid);
            let context = self.families.get(lfid).context_type;
            self.families.push_free(lfid, context);
            debug!(pid = ?self.pid, lfid = ?lfid, "family freed");
        }
    }

    /// `DecreaseThreadDependency(fid, tid, kind)`.
    pub fn decrease_thread_dependency(&mut self, tid: Tid, kind: ThreadDependencyKind) {
        let deps = &mut self.threads.get_mut(tid).dependencies;
        match kind {
            ThreadDependencyKind::Killed => deps.killed = true,
            ThreadDependencyKind::PrevCleanedUp => deps.prev_cleaned_up = true,
            ThreadDependencyKind::WriteCompleted => {
                deps.num_pending_writes = deps.num_pending_writes.saturating_sub(1);
            }
        }
        if self.threads.get(tid).dependencies.cleanup_ready() && self.threads.get(tid).dependencies.killed {
            self.cleanup_queue.push(tid);
        }
    }

    /// Drains threads ready for cleanup, freeing each one's per-thread
    /// register window and returning the slot to the empty list of its
    /// family's context type.
    pub fn run_cleanup(&mut self) {
        let pending: Vec<Tid> = self.cleanup_queue.drain(..).collect();
        for tid in pending {
            let lfid = self.threads.get(tid).family;
            let context = self.families.get(lfid).context_type;
            let int_window = self.threads.get(tid).integer;
            let flt_window = self.threads.get(tid).float;
            self.free_thread_window(RegType::Integer, int_window);
            self.free_thread_window(RegType::Float, flt_window);
            self.threads.get_mut(tid).state = ThreadState::Killed;
            self.threads.push_empty(tid, context);
            self.decrease_family_dependency(lfid, FamilyDependencyKind::ThreadCompleted);
        }
    }

    /// `GetRegisterType(fid, addr) -> (class, addr)` (spec §4.5):
    /// classifies a *logical* register address relative to `lfid`'s
    /// window and translates it to the physical address backing it.
    /// Always succeeds: an address past the family's allocated classes
    /// reads as [`RegClass::Raz`] and translates to [`RegAddr::INVALID`]
    /// rather than erroring, since Read/Writeback already treat an
    /// invalid address as read-zero/write-discard.
    #[must_use]
    pub fn classify_register(&self, lfid: Lfid, tid: Tid, addr: RegAddr) -> (RegClass, RegAddr) {
        if !addr.is_valid() {
            return (RegClass::Raz, RegAddr::INVALID);
        }
        let info = self.reg_info(lfid, addr.rtype);
        let window = match addr.rtype {
            RegType::Integer => self.threads.get(tid).integer,
            RegType::Float => self.threads.get(tid).float,
        };
        let mut idx = addr.index;
        if idx < info.globals {
            return (RegClass::Global, RegAddr { rtype: addr.rtype, index: info.base + idx });
        }
        idx -= info.globals;
        if idx < info.shareds {
            return (RegClass::Shared, RegAddr { rtype: addr.rtype, index: window.shareds_base + idx });
        }
        idx -= info.shareds;
        if idx < info.shareds {
            return (RegClass::Dependent, RegAddr { rtype: addr.rtype, index: window.dependents_base + idx });
        }
        idx -= info.shareds;
        if idx < info.locals {
            return (RegClass::Local, RegAddr { rtype: addr.rtype, index: window.locals_base + idx });
        }
        (RegClass::Raz, RegAddr::INVALID)
    }

    /// Shorthand for [`Self::classify_register`] when only the physical
    /// address is needed.
    #[must_use]
    pub fn translate_register(&self, lfid: Lfid, tid: Tid, addr: RegAddr) -> RegAddr {
        self.classify_register(lfid, tid, addr).1
    }

    #[must_use]
    pub fn int_rau(&self) -> &RAUnit {
        &self.int_rau
    }
    pub fn int_rau_mut(&mut self) -> &mut RAUnit {
        &mut self.int_rau
    }
    #[must_use]
    pub fn flt_rau(&self) -> &RAUnit {
        &self.flt_rau
    }
    pub fn flt_rau_mut(&mut self) -> &mut RAUnit {
        &mut self.flt_rau
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> RegisterShape {
        RegisterShape { globals: 8, shareds: 4, locals: 8 }
    }

    fn allocator() -> Allocator {
        let mut registry = StorageRegistry::new();
        Allocator::new(
            Pid::from(0_usize),
            4,
            8,
            1,
            RAUnit::new(128, 4, 1),
            RAUnit::new(128, 4, 1),
            shape(),
            shape(),
            &mut registry,
        )
    }

    fn addr(index: u32) -> RegAddr {
        RegAddr { rtype: RegType::Integer, index }
    }

    /// Allocates a family and drives its create state machine to
    /// completion, so its family-wide globals window actually exists
    /// before a test carves per-thread windows out of it.
    fn create_family(a: &mut Allocator) -> Lfid {
        let lfid = a.allocate_family(ContextType::Normal).unwrap();
        a.queue_create(lfid, 0x1000);
        loop {
            match a.advance_create(false) {
                CreateProgress::Done(lfid) => return lfid,
                CreateProgress::InProgress => continue,
                CreateProgress::Stalled => panic!("fresh RAU has room for a test family's registers"),
            }
        }
    }

    #[test]
    fn allocate_then_create_then_activate() {
        let mut a = allocator();
        let lfid = a.allocate_family(ContextType::Normal).unwrap();
        a.queue_create(lfid, 0x1000);
        assert_eq!(a.advance_create(false), CreateProgress::InProgress); // LoadingLine
        assert_eq!(a.advance_create(false), CreateProgress::InProgress); // LineLoaded
        assert_eq!(a.advance_create(false), CreateProgress::InProgress); // AllocatingRegisters
        assert_eq!(a.advance_create(false), CreateProgress::InProgress); // ActivatingFamily
        let done = a.advance_create(false);
        assert_eq!(done, CreateProgress::Done(lfid));
        assert!(!a.create_in_progress());
        assert!(a.families().get(lfid).integer.size > 0);
    }

    #[test]
    fn family_frees_once_every_dependency_clears() {
        let mut a = allocator();
        let lfid = a.allocate_family(ContextType::Normal).unwrap();
        a.decrease_family_dependency(lfid, FamilyDependencyKind::AllocationDone);
        assert_eq!(a.families().get(lfid).state, FamilyState::Allocated);
        // allocation_done + sync_sent + zero counters is every terminal
        // condition can_free() needs; the slot returns to the free list.
        a.decrease_family_dependency(lfid, FamilyDependencyKind::SyncSent);
        assert_eq!(a.families().get(lfid).state, FamilyState::Empty);
        assert!(a.allocate_family(ContextType::Normal).is_some());
    }

    #[test]
    fn cleanup_queue_returns_thread_to_empty_list() {
        let mut a = allocator();
        let lfid = a.allocate_family(ContextType::Normal).unwrap();
        let tid = a.allocate_thread(lfid).unwrap();
        a.decrease_thread_dependency(tid, ThreadDependencyKind::PrevCleanedUp);
        a.decrease_thread_dependency(tid, ThreadDependencyKind::Killed);
        a.run_cleanup();
        assert_eq!(a.threads().get(tid).state, ThreadState::Killed);
    }

    #[test]
    fn sibling_threads_get_disjoint_local_register_windows() {
        let mut a = allocator();
        let lfid = create_family(&mut a);
        let t1 = a.allocate_thread(lfid).unwrap();
        let t2 = a.allocate_thread(lfid).unwrap();
        let (_, p1) = a.classify_register(lfid, t1, addr(shape().globals + 2 * shape().shareds));
        let (_, p2) = a.classify_register(lfid, t2, addr(shape().globals + 2 * shape().shareds));
        assert!(p1.is_valid() && p2.is_valid());
        assert_ne!(p1.index, p2.index);
    }

    #[test]
    fn second_thread_dependent_class_aliases_first_threads_shared_class() {
        let mut a = allocator();
        let lfid = create_family(&mut a);
        let t1 = a.allocate_thread(lfid).unwrap();
        let t2 = a.allocate_thread(lfid).unwrap();
        let shared_logical = addr(shape().globals);
        let dependent_logical = addr(shape().globals + shape().shareds);
        let (_, t1_shared_phys) = a.classify_register(lfid, t1, shared_logical);
        let (_, t2_dependent_phys) = a.classify_register(lfid, t2, dependent_logical);
        assert_eq!(t1_shared_phys, t2_dependent_phys);
    }

    #[test]
    fn first_thread_dependent_class_aliases_its_own_shared_class() {
        let mut a = allocator();
        let lfid = create_family(&mut a);
        let t1 = a.allocate_thread(lfid).unwrap();
        let shared_logical = addr(shape().globals);
        let dependent_logical = addr(shape().globals + shape().shareds);
        let (_, shared_phys) = a.classify_register(lfid, t1, shared_logical);
        let (_, dependent_phys) = a.classify_register(lfid, t1, dependent_logical);
        assert_eq!(shared_phys, dependent_phys);
    }

    #[test]
    fn out_of_window_register_classifies_as_raz() {
        let mut a = allocator();
        let lfid = create_family(&mut a);
        let t1 = a.allocate_thread(lfid).unwrap();
        let far = addr(shape().globals + 2 * shape().shareds + shape().locals + 100);
        let (class, phys) = a.classify_register(lfid, t1, far);
        assert_eq!(class, RegClass::Raz);
        assert!(!phys.is_valid());
    }

    #[test]
    fn global_register_resolves_to_the_same_physical_cell_for_every_thread() {
        let mut a = allocator();
        let lfid = create_family(&mut a);
        let t1 = a.allocate_thread(lfid).unwrap();
        let t2 = a.allocate_thread(lfid).unwrap();
        let global = addr(0);
        let (c1, p1) = a.classify_register(lfid, t1, global);
        let (c2, p2) = a.classify_register(lfid, t2, global);
        assert_eq!(c1, RegClass::Global);
        assert_eq!(c2, RegClass::Global);
        assert_eq!(p1, p2);
    }
}
