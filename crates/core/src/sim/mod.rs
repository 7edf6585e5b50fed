//! Composes cores into a place, loads program images, and drives the
//! whole thing to completion (spec §6.4/§7).

pub mod loader;
pub mod place;
pub mod simulator;

pub use loader::{load_elf, LoaderError};
pub use place::Place;
pub use simulator::{Simulator, SimulatorReport};
