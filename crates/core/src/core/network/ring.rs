//! The ring link: `link.in`/`link.out` register pairs plus the backwards
//! `allocResponse` channel (spec §4.7).

use crate::kernel::trace::{StorageId, StorageRegistry, Trace};
use crate::storage::Register;

use super::messages::{AllocResponse, LinkMessage};

/// One core's forward (`link.out` to the next core) and backward
/// (`allocResponse.out` to the previous core) ring ports.
pub struct RingLink {
    pub link_out: Register<LinkMessage>,
    pub link_in: Register<LinkMessage>,
    pub alloc_response_out: Register<AllocResponse>,
    pub alloc_response_in: Register<AllocResponse>,
}

impl RingLink {
    #[must_use]
    pub fn new(registry: &mut StorageRegistry) -> Self {
        Self {
            link_out: Register::new(registry.register("ring.link.out")),
            link_in: Register::new(registry.register("ring.link.in")),
            alloc_response_out: Register::new(registry.register("ring.allocresponse.out")),
            alloc_response_in: Register::new(registry.register("ring.allocresponse.in")),
        }
    }

    #[must_use]
    pub fn storage_ids(&self) -> [StorageId; 4] {
        [
            self.link_out.id(),
            self.link_in.id(),
            self.alloc_response_out.id(),
            self.alloc_response_in.id(),
        ]
    }

    #[must_use]
    pub fn trace(&self) -> Trace {
        Trace::from_ids(self.storage_ids())
    }

    pub fn commit(&mut self) {
        self.link_out.commit();
        self.link_in.commit();
        self.alloc_response_out.commit();
        self.alloc_response_in.commit();
    }

    pub fn rollback(&mut self) {
        self.link_out.rollback();
        self.link_in.rollback();
        self.alloc_response_out.rollback();
        self.alloc_response_in.rollback();
    }
}

/// Moves the head of `from`'s output into `to`'s input, the per-cycle
/// action that advances a message one hop around the ring. Returns
/// `false` (caller should return
/// [`crate::kernel::process::CycleResult::Failed`]) if `to`'s input slot
/// is still occupied.
pub fn forward_link(from: &mut Register<LinkMessage>, to: &mut Register<LinkMessage>) -> bool {
    if to.is_full() {
        return false;
    }
    let Some(&msg) = from.read() else {
        return false;
    };
    to.write(msg);
    from.clear();
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ids::Lfid;
    use crate::core::network::messages::MessageKind;

    #[test]
    fn forward_moves_message_and_clears_source() {
        let mut registry = StorageRegistry::new();
        let mut a = Register::new(registry.register("a"));
        let mut b = Register::new(registry.register("b"));
        a.write(LinkMessage {
            kind: MessageKind::Create,
            lfid: Lfid::from(1_usize),
            pc: 0,
            payload: 0,
        });
        a.commit();
        assert!(forward_link(&mut a, &mut b));
        a.commit();
        b.commit();
        assert!(a.is_empty());
        assert!(b.is_full());
    }
}
