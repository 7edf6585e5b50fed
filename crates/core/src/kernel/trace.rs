//! Storage identity: every register, flag, buffer, linked list, and
//! structure in this crate is assigned a [`StorageId`] by a
//! [`StorageRegistry`] at construction, so components can name the
//! storage they're built on in diagnostics rather than printing bare
//! integers. [`Trace`] is the set-of-ids type a component's own
//! `trace()`/`storage_ids()` accessor builds from those (spec §4.1
//! "storage traces").

use std::collections::BTreeSet;
use std::fmt;

/// Identity of one storage instance (a register, flag, buffer, linked
/// list, or structure), assigned once at construction by a
/// [`StorageRegistry`].
///
/// Kept small and `Copy` so traces can be cheap `BTreeSet`s built fresh
/// every cycle.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageId(u32);

impl fmt::Debug for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Assigns [`StorageId`]s and remembers a human-readable name for each, so
/// a trace violation or deadlock diagnostic can name the storages
/// involved instead of printing bare integers.
#[derive(Debug, Default)]
pub struct StorageRegistry {
    names: Vec<String>,
}

impl StorageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new storage under `name`, returning its fresh id.
    pub fn register(&mut self, name: impl Into<String>) -> StorageId {
        let id = StorageId(self.names.len() as u32);
        self.names.push(name.into());
        id
    }

    /// The human-readable name a storage was registered under.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this registry.
    #[must_use]
    pub fn name(&self, id: StorageId) -> &str {
        &self.names[id.0 as usize]
    }
}

/// A declared or observed set of storages a process may (or did) touch in
/// one cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Trace(BTreeSet<StorageId>);

impl Trace {
    /// The empty trace (a process that touches nothing this cycle).
    #[must_use]
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    /// Builds a trace from a list of storage ids.
    #[must_use]
    pub fn from_ids(ids: impl IntoIterator<Item = StorageId>) -> Self {
        Self(ids.into_iter().collect())
    }

    /// Records that `id` was touched.
    pub fn insert(&mut self, id: StorageId) {
        let _ = self.0.insert(id);
    }

    /// Returns `true` if every id in `self` also appears in `declared` —
    /// i.e. `self` is a valid observed trace given that process's
    /// declaration.
    #[must_use]
    pub fn is_subset_of(&self, declared: &Self) -> bool {
        self.0.is_subset(&declared.0)
    }

    /// Ids present in `self` but not in `declared`: the evidence for a
    /// trace violation.
    #[must_use]
    pub fn difference<'a>(&'a self, declared: &'a Self) -> impl Iterator<Item = StorageId> + 'a {
        self.0.difference(&declared.0).copied()
    }

    /// Whether any storage was touched at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_check_catches_violation() {
        let mut reg = StorageRegistry::new();
        let a = reg.register("a");
        let b = reg.register("b");
        let declared = Trace::from_ids([a]);
        let mut observed = Trace::empty();
        observed.insert(a);
        assert!(observed.is_subset_of(&declared));
        observed.insert(b);
        assert!(!observed.is_subset_of(&declared));
        assert_eq!(observed.difference(&declared).collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn names_round_trip_through_registry() {
        let mut reg = StorageRegistry::new();
        let id = reg.register("dcache.outgoing");
        assert_eq!(reg.name(id), "dcache.outgoing");
    }
}
