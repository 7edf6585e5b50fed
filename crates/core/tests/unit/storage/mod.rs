//! The staged-write/commit/rollback contract (spec §4.2/§9) exercised
//! across the storage primitives together, the way a real process
//! composes them rather than one at a time.

use drisc_core::kernel::trace::StorageRegistry;
use drisc_core::storage::{Buffer, LinkedList, Register};

#[test]
fn a_failed_cycle_leaves_every_primitive_as_if_nothing_happened() {
    let mut registry = StorageRegistry::new();
    let mut reg: Register<u64> = Register::new(registry.register("reg"));
    let mut buf: Buffer<u64> = Buffer::new(registry.register("buf"), 4);
    let mut list = LinkedList::new(registry.register("list"), 8);

    reg.write(1);
    buf.push(2);
    list.push_back(3);

    // Simulate the process deciding this cycle actually failed: roll
    // every staged write back instead of committing.
    reg.rollback();
    buf.rollback();
    list.rollback();

    assert_eq!(reg.read(), None);
    assert!(buf.is_empty());
    assert_eq!(list.iter().count(), 0);
}

#[test]
fn a_successful_cycle_makes_every_staged_write_visible_after_commit() {
    let mut registry = StorageRegistry::new();
    let mut reg: Register<u64> = Register::new(registry.register("reg"));
    let mut buf: Buffer<u64> = Buffer::new(registry.register("buf"), 4);
    let mut list = LinkedList::new(registry.register("list"), 8);

    reg.write(42);
    buf.push(7);
    list.push_back(0);

    reg.commit();
    buf.commit();
    list.commit();

    assert_eq!(reg.read(), Some(&42));
    assert_eq!(buf.front(), Some(&7));
    assert_eq!(list.iter().collect::<Vec<_>>(), vec![0]);
}

#[test]
#[should_panic(expected = "push to a full buffer")]
fn pushing_a_full_buffer_panics_instead_of_silently_dropping() {
    let mut registry = StorageRegistry::new();
    let mut buf: Buffer<u64> = Buffer::new(registry.register("buf"), 1);
    buf.push(1);
    buf.commit();
    assert!(buf.is_full());
    buf.push(2);
}
