//! Small integer identifiers used throughout the simulator.
//!
//! Every identifier is a thin newtype over `u32` with a reserved "invalid"
//! sentinel, matching the original's convention of using out-of-range
//! indices rather than `Option<T>` so that tables can be indexed directly
//! without an extra branch on the hot path.

use std::fmt;

macro_rules! index_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub u32);

        impl $name {
            /// The reserved sentinel denoting "no such entry".
            pub const INVALID: Self = Self(u32::MAX);

            /// Returns `true` if this identifier is the reserved sentinel.
            #[must_use]
            pub const fn is_valid(self) -> bool {
                self.0 != u32::MAX
            }

            /// Returns the identifier as a plain `usize` table index.
            ///
            /// # Panics
            ///
            /// Panics if called on [`Self::INVALID`]; callers must check
            /// [`Self::is_valid`] first, matching the invariant that an
            /// invalid id is never used to index a table.
            #[must_use]
            pub fn index(self) -> usize {
                assert!(self.is_valid(), "indexed with an invalid {}", stringify!($name));
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}({})", stringify!($name), self.0)
                } else {
                    write!(f, "{}(INVALID)", stringify!($name))
                }
            }
        }

        impl From<usize> for $name {
            fn from(v: usize) -> Self {
                Self(v as u32)
            }
        }
    };
}

index_type!(
    /// Physical core identifier — position of a DRISC core in the place's ring.
    Pid
);
index_type!(
    /// Local family identifier — a family table slot local to one core.
    Lfid
);
index_type!(
    /// Thread identifier — a thread table slot local to one core.
    Tid
);
index_type!(
    /// Cache-line identifier — an I-cache line slot local to one core.
    Cid
);
index_type!(
    /// Memory-client identifier, handed out by [`crate::external::memory::MemoryBus::register_client`].
    Mcid
);

/// The register file class a physical register address decodes to.
///
/// See spec §3.1/§4.5 `GetRegisterType`: a physical register is always one
/// of these four classes, or read-as-zero if it falls outside a family's
/// allocated window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegClass {
    /// Read-only for every thread in the family.
    Global,
    /// Written by one thread, read by every later thread (successor chain).
    Shared,
    /// Read by a thread, written by its predecessor in the family.
    Dependent,
    /// Private to a single thread.
    Local,
    /// Falls outside the family's allocated window: reads as zero, writes
    /// are discarded.
    Raz,
}

/// The four register banks the simulator tracks counts for (spec §3.1
/// `RegInfo`). Integer and floating-point register types each have their
/// own bank of counts, so this is parameterized separately from [`RegClass`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegType {
    /// Integer register file.
    Integer,
    /// Floating-point register file.
    Float,
}

impl RegType {
    /// Both register types, in table order.
    pub const ALL: [Self; 2] = [Self::Integer, Self::Float];
}

/// A physical register index within one register type's file.
pub type RegIndex = u32;

/// The reserved index meaning "no register" (e.g. an unused destination).
pub const INVALID_REG_INDEX: RegIndex = u32::MAX;

/// A fully-qualified register address: which bank, and which index in it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegAddr {
    /// Which register bank (integer or float).
    pub rtype: RegType,
    /// Index into that bank.
    pub index: RegIndex,
}

impl RegAddr {
    /// The reserved value meaning "no register operand".
    pub const INVALID: Self = Self {
        rtype: RegType::Integer,
        index: INVALID_REG_INDEX,
    };

    /// Returns `true` unless this is [`Self::INVALID`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.index != INVALID_REG_INDEX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_sentinel_is_not_valid() {
        assert!(!Tid::INVALID.is_valid());
        assert!(Tid(0).is_valid());
    }

    #[test]
    #[should_panic(expected = "indexed with an invalid")]
    fn indexing_invalid_panics() {
        let _ = Lfid::INVALID.index();
    }

    #[test]
    fn reg_addr_invalid_round_trips() {
        assert!(!RegAddr::INVALID.is_valid());
        let r = RegAddr {
            rtype: RegType::Integer,
            index: 3,
        };
        assert!(r.is_valid());
    }
}
