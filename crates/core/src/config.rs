//! Simulator configuration.
//!
//! Spec §6.4: "Configuration is a key/value set; the spec treats it as an
//! opaque read-only map with [a list of] recognized options... unrecognized
//! options are rejected at startup." [`Config`] is the structured form
//! used internally; [`Config::from_options`] is the key/value entry point
//! a boot loader or CLI actually calls, and is where unknown keys turn
//! into [`InvalidArgument::UnknownOption`].

use std::collections::HashMap;

use serde::Deserialize;

use crate::common::error::InvalidArgument;
use crate::common::ids::RegIndex;

/// Baseline values used when an option is not present in the incoming
/// key/value map.
mod defaults {
    pub const CACHE_LINE_SIZE: u32 = 64;
    pub const DCACHE_ASSOC: u32 = 4;
    pub const DCACHE_SETS: u32 = 64;
    pub const ICACHE_ASSOC: u32 = 4;
    pub const ICACHE_SETS: u32 = 64;
    pub const NUM_INT_REGISTERS: u32 = 1024;
    pub const NUM_FLT_REGISTERS: u32 = 1024;
    pub const INT_REGISTERS_BLOCK_SIZE: u32 = 4;
    pub const FLT_REGISTERS_BLOCK_SIZE: u32 = 4;
    pub const CONTROL_BLOCK_SIZE: u32 = 64;
    pub const NUM_FAMILIES: u32 = 32;
    pub const NUM_THREADS: u32 = 256;
    pub const NUM_ANCILLARY_REGISTERS: u32 = 16;
    pub const OUTGOING_BUFFER_SIZE: u32 = 4;
    pub const READ_RESPONSES_BUFFER_SIZE: u32 = 4;
    pub const EXCLUSIVE_FAMILY_SLOTS: u32 = 1;
    pub const GLOBALS_PER_THREAD: u32 = 8;
    pub const SHAREDS_PER_THREAD: u32 = 4;
    pub const LOCALS_PER_THREAD: u32 = 8;
}

/// Cache geometry shared by the I-cache and D-cache sections of
/// [`Config`].
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "defaults_assoc")]
    pub associativity: u32,
    #[serde(default = "defaults_sets")]
    pub sets: u32,
}

fn defaults_assoc() -> u32 {
    defaults::DCACHE_ASSOC
}
fn defaults_sets() -> u32 {
    defaults::DCACHE_SETS
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            associativity: defaults::DCACHE_ASSOC,
            sets: defaults::DCACHE_SETS,
        }
    }
}

/// Register file sizing, RAU block granularity (spec §4.4/§4.6), and the
/// per-thread window shape every family is carved up into (spec
/// §3.1/§3.2's `RegInfo{globals, shareds, locals}`).
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterFileConfig {
    #[serde(default = "default_num_int")]
    pub num_int_registers: u32,
    #[serde(default = "default_num_flt")]
    pub num_flt_registers: u32,
    #[serde(default = "default_int_block")]
    pub int_block_size: u32,
    #[serde(default = "default_flt_block")]
    pub flt_block_size: u32,
    /// Globals are family-wide: one copy shared by every thread.
    #[serde(default = "default_globals_per_thread")]
    pub globals_per_thread: u32,
    /// Shareds and locals are per-thread: each thread gets its own copy,
    /// carved from the same window block (spec §3.1: "RegInfo{base,
    /// size}", §3.2: "per-type RegInfo{locals, dependents, shareds base
    /// indices}").
    #[serde(default = "default_shareds_per_thread")]
    pub shareds_per_thread: u32,
    #[serde(default = "default_locals_per_thread")]
    pub locals_per_thread: u32,
}

fn default_num_int() -> u32 {
    defaults::NUM_INT_REGISTERS
}
fn default_num_flt() -> u32 {
    defaults::NUM_FLT_REGISTERS
}
fn default_int_block() -> u32 {
    defaults::INT_REGISTERS_BLOCK_SIZE
}
fn default_flt_block() -> u32 {
    defaults::FLT_REGISTERS_BLOCK_SIZE
}
fn default_globals_per_thread() -> u32 {
    defaults::GLOBALS_PER_THREAD
}
fn default_shareds_per_thread() -> u32 {
    defaults::SHAREDS_PER_THREAD
}
fn default_locals_per_thread() -> u32 {
    defaults::LOCALS_PER_THREAD
}

impl Default for RegisterFileConfig {
    fn default() -> Self {
        Self {
            num_int_registers: defaults::NUM_INT_REGISTERS,
            num_flt_registers: defaults::NUM_FLT_REGISTERS,
            int_block_size: defaults::INT_REGISTERS_BLOCK_SIZE,
            flt_block_size: defaults::FLT_REGISTERS_BLOCK_SIZE,
            globals_per_thread: defaults::GLOBALS_PER_THREAD,
            shareds_per_thread: defaults::SHAREDS_PER_THREAD,
            locals_per_thread: defaults::LOCALS_PER_THREAD,
        }
    }
}

/// Family/thread table sizing and the family-table free-list split
/// (normal / reserved / exclusive) decided for the open question on
/// `m_exclusive` family slots.
#[derive(Debug, Clone, Deserialize)]
pub struct AllocatorConfig {
    #[serde(default = "default_num_families")]
    pub num_families: u32,
    #[serde(default = "default_num_threads")]
    pub num_threads: u32,
    /// Number of family-table slots reserved for exclusive creates (spec
    /// §9 Design Notes / Open Question: `m_exclusive` becomes a sized
    /// sub-list of the family free list instead of a single boolean).
    #[serde(default = "default_exclusive_slots")]
    pub exclusive_family_slots: u32,
}

fn default_num_families() -> u32 {
    defaults::NUM_FAMILIES
}
fn default_num_threads() -> u32 {
    defaults::NUM_THREADS
}
fn default_exclusive_slots() -> u32 {
    defaults::EXCLUSIVE_FAMILY_SLOTS
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            num_families: defaults::NUM_FAMILIES,
            num_threads: defaults::NUM_THREADS,
            exclusive_family_slots: defaults::EXCLUSIVE_FAMILY_SLOTS,
        }
    }
}

/// Network buffer capacities (spec §4.7/§6.4: "OutgoingBufferSize,
/// ReadResponsesBufferSize, ...").
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_outgoing")]
    pub outgoing_buffer_size: u32,
    #[serde(default = "default_read_responses")]
    pub read_responses_buffer_size: u32,
}

fn default_outgoing() -> u32 {
    defaults::OUTGOING_BUFFER_SIZE
}
fn default_read_responses() -> u32 {
    defaults::READ_RESPONSES_BUFFER_SIZE
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            outgoing_buffer_size: defaults::OUTGOING_BUFFER_SIZE,
            read_responses_buffer_size: defaults::READ_RESPONSES_BUFFER_SIZE,
        }
    }
}

/// A single `InitRegs` entry: `R<idx>=<value>` (spec §6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitReg {
    pub index: RegIndex,
    pub value: u64,
}

/// Root simulator configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default = "default_cache_line")]
    pub cache_line_size: u32,
    #[serde(default)]
    pub dcache: CacheConfig,
    #[serde(default)]
    pub icache: CacheConfig,
    #[serde(default)]
    pub registers: RegisterFileConfig,
    #[serde(default = "default_control_block")]
    pub control_block_size: u32,
    #[serde(default)]
    pub allocator: AllocatorConfig,
    #[serde(default = "default_num_aprs")]
    pub num_ancillary_registers: u32,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub init_regs: Vec<InitReg>,
}

fn default_cache_line() -> u32 {
    defaults::CACHE_LINE_SIZE
}
fn default_control_block() -> u32 {
    defaults::CONTROL_BLOCK_SIZE
}
fn default_num_aprs() -> u32 {
    defaults::NUM_ANCILLARY_REGISTERS
}

impl Config {
    /// Builds a [`Config`] from a flat key/value option map, the form the
    /// spec itself describes (§6.4). Keys are matched case-sensitively
    /// against the recognized option table; anything else is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgument::UnknownOption`] for any key not in the
    /// recognized table, or [`InvalidArgument::NotPowerOfTwo`] for a
    /// geometry field that must be a power of two.
    pub fn from_options(options: &HashMap<String, String>) -> Result<Self, InvalidArgument> {
        let mut config = Self::default();
        for (key, value) in options {
            match key.as_str() {
                "CacheLineSize" => config.cache_line_size = parse_u32(key, value)?,
                "DcCacheAssoc" => config.dcache.associativity = parse_u32(key, value)?,
                "DcCacheSets" => config.dcache.sets = parse_u32(key, value)?,
                "IcCacheAssoc" => config.icache.associativity = parse_u32(key, value)?,
                "IcCacheSets" => config.icache.sets = parse_u32(key, value)?,
                "NumIntRegisters" => config.registers.num_int_registers = parse_u32(key, value)?,
                "NumFltRegisters" => config.registers.num_flt_registers = parse_u32(key, value)?,
                "IntRegistersBlockSize" => config.registers.int_block_size = parse_u32(key, value)?,
                "FltRegistersBlockSize" => config.registers.flt_block_size = parse_u32(key, value)?,
                "GlobalsPerThread" => config.registers.globals_per_thread = parse_u32(key, value)?,
                "SharedsPerThread" => config.registers.shareds_per_thread = parse_u32(key, value)?,
                "LocalsPerThread" => config.registers.locals_per_thread = parse_u32(key, value)?,
                "ControlBlockSize" => config.control_block_size = parse_u32(key, value)?,
                "NumFamilies" => config.allocator.num_families = parse_u32(key, value)?,
                "NumThreads" => config.allocator.num_threads = parse_u32(key, value)?,
                "ExclusiveFamilySlots" => {
                    config.allocator.exclusive_family_slots = parse_u32(key, value)?;
                }
                "NumAncillaryRegisters" => config.num_ancillary_registers = parse_u32(key, value)?,
                "OutgoingBufferSize" => config.network.outgoing_buffer_size = parse_u32(key, value)?,
                "ReadResponsesBufferSize" => {
                    config.network.read_responses_buffer_size = parse_u32(key, value)?;
                }
                "InitRegs" => config.init_regs = parse_init_regs(value)?,
                other => return Err(InvalidArgument::UnknownOption(other.to_string())),
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks the documented power-of-two / nonzero preconditions that
    /// apply regardless of how the config was built (§6.4's "power of
    /// two, ≥ 8" for cache line size; cache geometry likewise).
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgument::NotPowerOfTwo`] on the first offending
    /// field.
    pub fn validate(&self) -> Result<(), InvalidArgument> {
        check_pow2("CacheLineSize", u64::from(self.cache_line_size))?;
        if self.cache_line_size < 8 {
            return Err(InvalidArgument::NotPowerOfTwo {
                field: "CacheLineSize",
                value: u64::from(self.cache_line_size),
            });
        }
        check_pow2("DcCacheAssoc", u64::from(self.dcache.associativity))?;
        check_pow2("DcCacheSets", u64::from(self.dcache.sets))?;
        check_pow2("IcCacheAssoc", u64::from(self.icache.associativity))?;
        check_pow2("IcCacheSets", u64::from(self.icache.sets))?;
        Ok(())
    }
}

fn check_pow2(field: &'static str, value: u64) -> Result<(), InvalidArgument> {
    if value == 0 || value & (value - 1) != 0 {
        return Err(InvalidArgument::NotPowerOfTwo { field, value });
    }
    Ok(())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, InvalidArgument> {
    value
        .parse()
        .map_err(|_| InvalidArgument::UnknownOption(format!("{key}={value}")))
}

/// Parses an `InitRegs` value: a `;`-separated list of `R<idx>=<value>`
/// entries.
fn parse_init_regs(value: &str) -> Result<Vec<InitReg>, InvalidArgument> {
    value
        .split(';')
        .filter(|entry| !entry.trim().is_empty())
        .map(parse_one_init_reg)
        .collect()
}

fn parse_one_init_reg(entry: &str) -> Result<InitReg, InvalidArgument> {
    let entry = entry.trim();
    let bad = || InvalidArgument::UnknownOption(format!("InitRegs entry {entry:?}"));
    let rest = entry.strip_prefix('R').ok_or_else(bad)?;
    let (idx_str, value_str) = rest.split_once('=').ok_or_else(bad)?;
    let index: RegIndex = idx_str.parse().map_err(|_| bad())?;
    let value: u64 = if let Some(hex) = value_str.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).map_err(|_| bad())?
    } else {
        value_str.parse().map_err(|_| bad())?
    };
    Ok(InitReg { index, value })
}
