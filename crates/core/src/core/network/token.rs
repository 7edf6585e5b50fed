//! The create token: a single-token ring protocol serializing
//! group-creates across a place (spec §4.7: "a group create requires
//! holding the create token; the token rotates only among cores that
//! want it").

use crate::common::ids::Pid;
use crate::kernel::trace::{StorageId, StorageRegistry, Trace};
use crate::storage::Flag;

/// One core's view of the token: whether it currently holds it, and
/// whether it's requested it (wants to initiate a group create).
pub struct CreateToken {
    held: Flag,
    wanted: Flag,
    next: Pid,
}

impl CreateToken {
    #[must_use]
    pub fn new(holds_initially: bool, next: Pid, registry: &mut StorageRegistry) -> Self {
        let held = Flag::new(registry.register("token.held"));
        let wanted = Flag::new(registry.register("token.wanted"));
        let mut token = Self { held, wanted, next };
        if holds_initially {
            token.held.set(true);
            token.held.commit();
        }
        token
    }

    #[must_use]
    pub fn storage_ids(&self) -> [StorageId; 2] {
        [self.held.id(), self.wanted.id()]
    }

    #[must_use]
    pub fn trace(&self) -> Trace {
        Trace::from_ids(self.storage_ids())
    }

    #[must_use]
    pub fn holds(&self) -> bool {
        self.held.get()
    }

    /// Registers this core as wanting to initiate a group create; it will
    /// keep the token (rather than forwarding it) the next time it
    /// arrives.
    pub fn request(&mut self) {
        self.wanted.set(true);
    }

    /// Having initiated its create, releases the want so the token moves
    /// on next cycle.
    pub fn release_want(&mut self) {
        self.wanted.set(false);
    }

    /// Drives one cycle of the rotation: if held and not wanted, forwards
    /// to `next`; returns the core to forward the token to, or `None` if
    /// it stays here this cycle.
    #[must_use]
    pub fn advance(&mut self) -> Option<Pid> {
        if !self.held.get() {
            return None;
        }
        if self.wanted.get() {
            return None;
        }
        self.held.set(false);
        Some(self.next)
    }

    /// Accepts the token arriving from the previous core on the ring.
    pub fn receive(&mut self) {
        self.held.set(true);
    }

    pub fn commit(&mut self) {
        self.held.commit();
        self.wanted.commit();
    }

    pub fn rollback(&mut self) {
        self.held.rollback();
        self.wanted.rollback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_stays_put_while_wanted() {
        let mut registry = StorageRegistry::new();
        let mut token = CreateToken::new(true, Pid::from(1_usize), &mut registry);
        token.request();
        token.commit();
        assert!(token.advance().is_none());
        assert!(token.holds());
    }

    #[test]
    fn token_forwards_once_released() {
        let mut registry = StorageRegistry::new();
        let mut token = CreateToken::new(true, Pid::from(1_usize), &mut registry);
        let dest = token.advance();
        token.commit();
        assert_eq!(dest, Some(Pid::from(1_usize)));
        assert!(!token.holds());
    }

    #[test]
    fn non_holder_never_advances() {
        let mut registry = StorageRegistry::new();
        let mut token = CreateToken::new(false, Pid::from(1_usize), &mut registry);
        assert!(token.advance().is_none());
    }
}
