//! Ordered collection of same-strategy blocks with a recency cache.

use crate::block::{BlockOps, dealloc_page};
use crate::error::AllocError;
use std::collections::BTreeMap;
use std::ptr::NonNull;

/// Owns every block of one strategy for one allocator.
///
/// Blocks are kept in a [`BTreeMap`] keyed by base address rather than the
/// sorted-vector-plus-binary-search the original design used: range queries
/// over the map give the same "largest block base at or below this address"
/// lookup in `O(log n)`, and — unlike indices into a vector, or raw pointers
/// at vector elements — map keys are never invalidated by an unrelated
/// insert or remove.
pub struct BlockSet<B: BlockOps> {
  block_size: usize,
  alignment: usize,
  object_size: usize,
  blocks: BTreeMap<usize, B>,
  /// Base address of the block that most recently served a successful
  /// allocate or release, consulted before falling back to a full scan.
  recent: Option<usize>,
}

// SAFETY: a `BlockSet` exclusively owns every block's backing allocation
// (obtained from the global allocator, not thread-local storage); moving
// that ownership to another thread is sound. Concurrent access from
// multiple threads still requires external synchronization, which is what
// `crate::thread_safe::ThreadSafe` provides.
unsafe impl<B: BlockOps> Send for BlockSet<B> {}

impl<B: BlockOps> BlockSet<B> {
  pub fn new(block_size: usize, alignment: usize, object_size: usize) -> Self {
    BlockSet { block_size, alignment, object_size, blocks: BTreeMap::new(), recent: None }
  }

  pub fn block_count(&self) -> usize {
    self.blocks.len()
  }

  fn owning_key(&self, addr: *const u8) -> Option<usize> {
    let addr = addr as usize;
    self.blocks.range(..=addr).next_back().and_then(|(&key, block)| {
      if block.has_address(addr as *const u8, self.block_size) { Some(key) } else { None }
    })
  }

  fn insert_new_block(&mut self) -> Result<usize, AllocError> {
    let block = B::new(self.block_size, self.alignment, self.object_size)?;
    let key = block.base().as_ptr() as usize;
    self.blocks.insert(key, block);
    Ok(key)
  }

  /// Allocates `size` bytes, trying (in order) the block owning `hint`, the
  /// recency cache, a scan of every block, and finally a freshly grown block.
  pub fn allocate(
    &mut self,
    size: usize,
    hint: Option<NonNull<u8>>,
  ) -> Result<NonNull<u8>, AllocError> {
    let block_size = self.block_size;
    let alignment = self.alignment;

    if let Some(hint) = hint {
      if let Some(key) = self.owning_key(hint.as_ptr()) {
        if let Some(p) = self.blocks.get_mut(&key).unwrap().allocate(size, block_size, alignment) {
          self.recent = Some(key);
          return Ok(p);
        }
      }
    }

    if let Some(key) = self.recent {
      if let Some(block) = self.blocks.get_mut(&key) {
        if let Some(p) = block.allocate(size, block_size, alignment) {
          self.recent = Some(key);
          return Ok(p);
        }
      }
    }

    for (&key, block) in self.blocks.iter_mut() {
      if let Some(p) = block.allocate(size, block_size, alignment) {
        self.recent = Some(key);
        return Ok(p);
      }
    }

    let key = self.insert_new_block()?;
    let p = self
      .blocks
      .get_mut(&key)
      .unwrap()
      .allocate(size, block_size, alignment)
      .ok_or(AllocError::OutOfMemory)?;
    self.recent = Some(key);
    Ok(p)
  }

  /// Releases `chunk`, returning `Ok(false)` if no block in this set owns
  /// it (never an error — the caller may own it via a different set).
  pub fn release(&mut self, chunk: NonNull<u8>, size: usize) -> Result<bool, AllocError> {
    let block_size = self.block_size;
    let alignment = self.alignment;

    let key = match self.recent.filter(|k| {
      self.blocks.get(k).is_some_and(|b| b.has_address(chunk.as_ptr(), block_size))
    }) {
      Some(k) => k,
      None => match self.owning_key(chunk.as_ptr()) {
        Some(k) => k,
        None => return Ok(false),
      },
    };

    let block = self.blocks.get_mut(&key).unwrap();
    let released = block.release(chunk, size, block_size, alignment)?;
    if !released {
      return Ok(false);
    }
    self.recent = Some(key);

    if self.blocks.get(&key).unwrap().is_empty(alignment) {
      self.remove_block(key);
    }
    Ok(true)
  }

  /// Resizes `chunk` in place (stack strategy only; other strategies reject
  /// this through [`BlockOps::resize`]'s default implementation).
  pub fn resize(
    &mut self,
    chunk: NonNull<u8>,
    old_size: usize,
    new_size: usize,
  ) -> Result<bool, AllocError> {
    let block_size = self.block_size;
    let alignment = self.alignment;
    let key = self.owning_key(chunk.as_ptr()).ok_or_else(|| {
      AllocError::invalid("resize target is not owned by this allocator")
    })?;
    let block = self.blocks.get_mut(&key).unwrap();
    block.resize(chunk, old_size, new_size, block_size, alignment)
  }

  pub fn has_address(&self, chunk: *const u8) -> bool {
    self.owning_key(chunk).is_some()
  }

  pub fn is_corrupt(&self) -> bool {
    self.blocks.values().any(|b| b.is_corrupt(self.block_size, self.alignment, self.object_size))
  }

  /// Removes every empty block, returning whether any were removed.
  pub fn trim_empty_blocks(&mut self) -> bool {
    let alignment = self.alignment;
    let empty: Vec<usize> =
      self.blocks.iter().filter(|(_, b)| b.is_empty(alignment)).map(|(&k, _)| k).collect();
    let trimmed = !empty.is_empty();
    for key in empty {
      self.remove_block(key);
    }
    trimmed
  }

  fn remove_block(&mut self, key: usize) {
    if let Some(block) = self.blocks.remove(&key) {
      // SAFETY: `block` was allocated by this set with these exact
      // parameters and is removed from `blocks` before this call, so it
      // cannot be reached again.
      unsafe { dealloc_page(block.base(), self.block_size, self.alignment) };
    }
    if self.recent == Some(key) {
      self.recent = None;
    }
  }

  /// Fraction of blocks beyond the minimum that would hold every live byte
  /// if packed as tightly as possible: `block_count - ceil(total_live_bytes
  /// / block_size)`, divided by `block_count`. `0.0` when the set is empty
  /// or perfectly packed.
  pub fn fragmentation_percent(&self) -> f32 {
    let block_count = self.blocks.len();
    if block_count == 0 {
      return 0.0;
    }
    let live_bytes: usize = self.blocks.values().map(|b| b.live_bytes(self.object_size)).sum();
    let minimal_blocks = live_bytes.div_ceil(self.block_size);
    let excess = block_count.saturating_sub(minimal_blocks);
    excess as f32 / block_count as f32
  }
}

impl<B: BlockOps> Drop for BlockSet<B> {
  fn drop(&mut self) {
    for (_, block) in self.blocks.iter() {
      // SAFETY: every block in `blocks` was allocated by this set with
      // `block_size`/`alignment` and is dropped exactly once here.
      unsafe { dealloc_page(block.base(), self.block_size, self.alignment) };
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::PoolBlock;

  #[test]
  fn grows_a_second_block_once_the_first_is_full() {
    let mut set: BlockSet<PoolBlock> = BlockSet::new(2048, 8, 16);
    let capacity = 2048 / 16;
    for _ in 0..capacity {
      set.allocate(16, None).unwrap();
    }
    assert_eq!(set.block_count(), 1);
    set.allocate(16, None).unwrap();
    assert_eq!(set.block_count(), 2);
  }

  #[test]
  fn release_then_trim_removes_empty_blocks() {
    let mut set: BlockSet<PoolBlock> = BlockSet::new(2048, 8, 16);
    let mut chunks = Vec::new();
    for _ in 0..(2048 / 16) {
      chunks.push(set.allocate(16, None).unwrap());
    }
    for c in chunks {
      set.release(c, 16).unwrap();
    }
    assert!(!set.is_corrupt());
    assert_eq!(set.block_count(), 0);
  }

  #[test]
  fn two_half_full_blocks_report_half_fragmentation() {
    let mut set: BlockSet<PoolBlock> = BlockSet::new(2048, 8, 16);
    let capacity = 2048 / 16;
    let mut chunks = Vec::new();
    for _ in 0..(capacity + capacity / 2) {
      chunks.push(set.allocate(16, None).unwrap());
    }
    assert_eq!(set.block_count(), 2);
    // Release half of the first block's chunks so both blocks end up half
    // full instead of one full and one half full.
    for c in chunks.drain(0..capacity / 2) {
      set.release(c, 16).unwrap();
    }
    assert_eq!(set.block_count(), 2);
    assert_eq!(set.fragmentation_percent(), 0.5);
  }

  #[test]
  fn recency_cache_speeds_up_repeated_allocation_in_same_block() {
    let mut set: BlockSet<PoolBlock> = BlockSet::new(2048, 8, 16);
    let a = set.allocate(16, None).unwrap();
    let b = set.allocate(16, None).unwrap();
    assert!(set.has_address(a.as_ptr()));
    assert!(set.has_address(b.as_ptr()));
  }
}
