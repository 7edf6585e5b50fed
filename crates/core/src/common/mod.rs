//! Common types shared across the kernel, storage primitives, and the
//! DRISC core: small integer identifiers (spec §3) and the error taxonomy
//! (spec §7).

/// Error taxonomy: [`error::SimError`] and its constituent kinds.
pub mod error;
/// Identifier newtypes: `Pid`, `Lfid`, `Tid`, `Cid`, `Mcid`, `RegAddr`.
pub mod ids;

pub use error::{InvalidArgument, SimError};
pub use ids::{Cid, Lfid, Mcid, Pid, RegAddr, RegClass, RegIndex, RegType, Tid};
