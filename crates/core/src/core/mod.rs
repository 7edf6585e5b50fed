//! A single DRISC core: allocator, register files, caches, network link,
//! MMIO surface, and pipeline (spec §3/§4).

pub mod allocator;
pub mod cache;
pub mod drisc;
pub mod family;
pub mod network;
pub mod pipeline;
pub mod rau;
pub mod regfile;
pub mod thread;

pub use drisc::Drisc;
