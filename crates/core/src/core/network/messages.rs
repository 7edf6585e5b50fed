//! Wire formats carried on the ring and delegation networks (spec §3.5).

use crate::common::ids::{Lfid, Pid, RegAddr};

/// Tags shared by [`LinkMessage`] and [`RemoteMessage`] (spec §3.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Allocate,
    Ballocate,
    SetProperty,
    Create,
    Done,
    Sync,
    Detach,
    Break,
    Global,
}

/// A message travelling on the ring link between adjacent cores.
#[derive(Debug, Clone, Copy)]
pub struct LinkMessage {
    pub kind: MessageKind,
    pub lfid: Lfid,
    pub pc: u64,
    pub payload: u64,
}

/// A point-to-point delegation message, carrying the two kinds the ring
/// link doesn't: raw register forwarding and whole-family register
/// forwarding (spec §3.5).
#[derive(Debug, Clone, Copy)]
pub struct RemoteMessage {
    pub kind: RemoteKind,
    pub lfid: Lfid,
    pub source: Pid,
    pub dest: Pid,
    pub payload: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKind {
    Link(MessageKind),
    RawRegister { addr: RegAddr },
    FamRegister { addr: RegAddr },
}

/// Travels backwards around the ring with the outcome of a create (spec
/// §3.5).
#[derive(Debug, Clone, Copy)]
pub struct AllocResponse {
    pub completion_pid: Pid,
    pub completion_reg: RegAddr,
    pub prev_fid: Lfid,
    pub next_fid: Lfid,
    pub num_cores: u32,
    pub exact: bool,
}

/// A pending sync notification queued to egress via delegation, breaking
/// the circular dependency between the ring-link and delegation networks
/// (spec §4.7/§3.5).
#[derive(Debug, Clone, Copy)]
pub struct SyncInfo {
    pub lfid: Lfid,
    pub dest: Pid,
    pub exit_code_reg: RegAddr,
}
