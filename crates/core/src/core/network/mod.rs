//! The inter-core network: ring link, point-to-point delegation, and the
//! create token (spec §4.7).
//!
//! A place of cores is wired as a single ring for both `link` traffic
//! (family broadcast, the backwards `allocResponse` channel, and the
//! create token) and as a point-to-point mesh for `delegation` traffic
//! (raw and whole-family register forwarding, and sync notifications).

pub mod delegation;
pub mod messages;
pub mod ring;
pub mod token;

pub use delegation::Delegation;
pub use messages::{AllocResponse, LinkMessage, MessageKind, RemoteKind, RemoteMessage, SyncInfo};
pub use ring::{forward_link, RingLink};
pub use token::CreateToken;

use crate::common::ids::Pid;
use crate::kernel::trace::StorageRegistry;

/// One core's full network interface: its ring ports, its delegation
/// ports, and its share of the create token.
pub struct Network {
    pub pid: Pid,
    pub ring: RingLink,
    pub delegation: Delegation,
    pub token: CreateToken,
}

impl Network {
    #[must_use]
    pub fn new(
        pid: Pid,
        next: Pid,
        holds_token_initially: bool,
        syncs_capacity: usize,
        registry: &mut StorageRegistry,
    ) -> Self {
        Self {
            pid,
            ring: RingLink::new(registry),
            delegation: Delegation::new(syncs_capacity, registry),
            token: CreateToken::new(holds_token_initially, next, registry),
        }
    }

    pub fn commit(&mut self) {
        self.ring.commit();
        self.delegation.commit();
        self.token.commit();
    }

    pub fn rollback(&mut self) {
        self.ring.rollback();
        self.delegation.rollback();
        self.token.rollback();
    }
}
