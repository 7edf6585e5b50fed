//! Register Allocation Unit: a coarse block allocator over one register
//! file (spec §4.8).
//!
//! Blocks are fixed-size (`block_size` registers) and allocated
//! first-fit; a separate reserved pool guarantees RESERVED/EXCLUSIVE
//! callers always have at least one block even when NORMAL callers have
//! exhausted the rest, mirroring [`crate::core::family::FamilyTable`]'s
//! own per-context free lists.

use crate::common::error::InvalidArgument;
use crate::common::ids::RegIndex;
use crate::core::family::ContextType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    base: RegIndex,
    free: bool,
}

/// A coarse block allocator over a single register file.
pub struct RAUnit {
    block_size: u32,
    blocks: Vec<Block>,
    /// Index of the lowest block reserved for non-NORMAL contexts; blocks
    /// at or above this index are never handed to a NORMAL request.
    reserved_from: usize,
}

impl RAUnit {
    /// Creates an allocator over `total_registers` registers split into
    /// `block_size`-register blocks, with the top `reserved_blocks`
    /// blocks held back for RESERVED/EXCLUSIVE requests.
    ///
    /// # Panics
    ///
    /// Panics if `total_registers` is not a multiple of `block_size`, or
    /// if there are fewer blocks than `reserved_blocks`.
    #[must_use]
    pub fn new(total_registers: u32, block_size: u32, reserved_blocks: usize) -> Self {
        assert!(block_size > 0, "RAU block size must be nonzero");
        assert_eq!(
            total_registers % block_size,
            0,
            "register file size must be a multiple of the RAU block size"
        );
        let num_blocks = (total_registers / block_size) as usize;
        assert!(
            reserved_blocks <= num_blocks,
            "reserved blocks exceed total blocks"
        );
        let blocks = (0..num_blocks)
            .map(|i| Block {
                base: i as u32 * block_size,
                free: true,
            })
            .collect();
        Self {
            block_size,
            blocks,
            reserved_from: num_blocks - reserved_blocks,
        }
    }

    #[must_use]
    pub const fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Total registers this allocator owns, across every context.
    #[must_use]
    pub fn total_registers(&self) -> u32 {
        self.blocks.len() as u32 * self.block_size
    }

    /// Allocates `count` contiguous blocks (`count * block_size`
    /// registers) for `context`, first-fit over the eligible portion of
    /// the block list. Returns `None` on exhaustion — not a
    /// configuration error, so callers should treat it as
    /// [`crate::kernel::process::CycleResult::Failed`] rather than an
    /// [`InvalidArgument`].
    #[must_use]
    pub fn alloc(&mut self, size: u32, context: ContextType) -> Option<RegIndex> {
        assert_eq!(size % self.block_size, 0, "alloc size must be block-aligned");
        let blocks_needed = (size / self.block_size).max(1) as usize;
        let range: Box<dyn Iterator<Item = usize>> = match context {
            ContextType::Normal => Box::new(0..self.reserved_from),
            ContextType::Reserved | ContextType::Exclusive => Box::new(0..self.blocks.len()),
        };
        let candidates: Vec<usize> = range.collect();
        for window_start in 0..candidates.len() {
            if window_start + blocks_needed > candidates.len() {
                break;
            }
            let window = &candidates[window_start..window_start + blocks_needed];
            if window.iter().all(|&i| self.blocks[i].free) {
                let base = self.blocks[window[0]].base;
                for &i in window {
                    self.blocks[i].free = false;
                }
                return Some(base);
            }
        }
        None
    }

    /// Frees `count` blocks starting at register `base`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgument::RegisterOutOfRange`] if `base` does not
    /// align to a block boundary this allocator owns.
    pub fn free(&mut self, base: RegIndex, size: u32) -> Result<(), InvalidArgument> {
        assert_eq!(size % self.block_size, 0, "free size must be block-aligned");
        let blocks_to_free = (size / self.block_size).max(1);
        let first = self
            .blocks
            .iter()
            .position(|b| b.base == base)
            .ok_or(InvalidArgument::RegisterOutOfRange {
                index: base,
                size: self.blocks.len() as u32 * self.block_size,
            })?;
        for i in first..first + blocks_to_free as usize {
            self.blocks[i].free = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_context_cannot_touch_reserved_blocks() {
        let mut rau = RAUnit::new(16, 4, 1);
        // 4 blocks total, 1 reserved -> 3 usable by NORMAL.
        assert!(rau.alloc(4, ContextType::Normal).is_some());
        assert!(rau.alloc(4, ContextType::Normal).is_some());
        assert!(rau.alloc(4, ContextType::Normal).is_some());
        assert!(rau.alloc(4, ContextType::Normal).is_none());
        assert!(rau.alloc(4, ContextType::Reserved).is_some());
    }

    #[test]
    fn free_then_realloc_returns_same_base() {
        let mut rau = RAUnit::new(8, 4, 0);
        let base = rau.alloc(4, ContextType::Normal).unwrap();
        rau.free(base, 4).unwrap();
        let base2 = rau.alloc(4, ContextType::Normal).unwrap();
        assert_eq!(base, base2);
    }

    #[test]
    fn multi_block_alloc_is_contiguous() {
        let mut rau = RAUnit::new(16, 4, 0);
        let base = rau.alloc(8, ContextType::Normal).unwrap();
        assert_eq!(base, 0);
        // the next single-block alloc must skip both consumed blocks.
        let next = rau.alloc(4, ContextType::Normal).unwrap();
        assert_eq!(next, 8);
    }
}
