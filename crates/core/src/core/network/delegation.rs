//! Point-to-point delegation: `delegateIn`/`delegateOut` plus the
//! `syncs` buffer that breaks the ring-link/delegation dependency cycle
//! (spec §4.7).

use crate::kernel::trace::{StorageId, StorageRegistry, Trace};
use crate::storage::{Buffer, Register};

use super::messages::{RemoteMessage, SyncInfo};

pub struct Delegation {
    pub delegate_out: Register<RemoteMessage>,
    pub delegate_in: Register<RemoteMessage>,
    pub syncs: Buffer<SyncInfo>,
}

impl Delegation {
    #[must_use]
    pub fn new(syncs_capacity: usize, registry: &mut StorageRegistry) -> Self {
        Self {
            delegate_out: Register::new(registry.register("delegation.out")),
            delegate_in: Register::new(registry.register("delegation.in")),
            syncs: Buffer::new(registry.register("delegation.syncs"), syncs_capacity),
        }
    }

    #[must_use]
    pub fn storage_ids(&self) -> [StorageId; 3] {
        [self.delegate_out.id(), self.delegate_in.id(), self.syncs.id()]
    }

    #[must_use]
    pub fn trace(&self) -> Trace {
        Trace::from_ids(self.storage_ids())
    }

    /// Queues a sync to egress on delegation next cycle it can; returns
    /// `false` if the queue is full (caller should return
    /// [`crate::kernel::process::CycleResult::Failed`]).
    #[must_use]
    pub fn queue_sync(&mut self, info: SyncInfo) -> bool {
        if self.syncs.is_full() {
            return false;
        }
        self.syncs.push(info);
        true
    }

    pub fn commit(&mut self) {
        self.delegate_out.commit();
        self.delegate_in.commit();
        self.syncs.commit();
    }

    pub fn rollback(&mut self) {
        self.delegate_out.rollback();
        self.delegate_in.rollback();
        self.syncs.rollback();
    }
}
