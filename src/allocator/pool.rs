use super::{
  AllocatorOps, ManagerHook, conservative_max_objects, cross_allocator_trim, validate_alignment,
  validate_block_size, validate_call_alignment,
};
use crate::align::round_up;
use crate::block::PoolBlock;
use crate::block_set::BlockSet;
use crate::error::AllocError;
use crate::manager::{AllocatorId, Manager};
use std::cell::RefCell;
use std::ptr::NonNull;
use std::sync::Weak;
use tracing::{error, trace, warn};

/// Fixed-size-slot allocator. `allocate` serves any request that fits in a
/// slot once aligned (`round_up(size, alignment) <= object_size`); `release`
/// requires the exact slot size, since a mismatched release would otherwise
/// corrupt the free list.
pub struct PoolAllocator {
  blocks: RefCell<BlockSet<PoolBlock>>,
  object_size: usize,
  alignment: usize,
  manager_hook: ManagerHook,
}

impl PoolAllocator {
  pub fn new(
    initial_blocks: u32,
    block_size: usize,
    object_size: usize,
    alignment: usize,
  ) -> Result<Self, AllocError> {
    validate_alignment(alignment)?;
    validate_block_size(block_size, alignment)?;
    if initial_blocks == 0 {
      return Err(AllocError::invalid("initial_blocks must be at least 1"));
    }
    if object_size == 0 || object_size > block_size {
      return Err(AllocError::invalid("object_size must be nonzero and no larger than block_size"));
    }
    let object_size = round_up(object_size, alignment.max(std::mem::size_of::<usize>()));

    Ok(PoolAllocator {
      blocks: RefCell::new(BlockSet::new(block_size, alignment, object_size)),
      object_size,
      alignment,
      manager_hook: RefCell::new(None),
    })
  }

  /// `allocate` only needs the request to fit in a slot once aligned,
  /// mirroring the original only rejecting a request once
  /// `objectSize_ < alignedSize`.
  fn check_allocate_size(&self, size: usize) -> Result<(), AllocError> {
    if round_up(size, self.alignment.max(1)) > self.object_size {
      return Err(AllocError::invalid(format!(
        "this pool serves objects up to size {} once aligned, got {size}",
        self.object_size
      )));
    }
    Ok(())
  }

  fn check_release_size(&self, size: usize) -> Result<(), AllocError> {
    if size != self.object_size {
      return Err(AllocError::invalid(format!(
        "this pool only serves objects of size {}, got {size}",
        self.object_size
      )));
    }
    Ok(())
  }
}

impl AllocatorOps for PoolAllocator {
  fn allocate(
    &self,
    size: usize,
    alignment: Option<usize>,
    hint: Option<NonNull<u8>>,
  ) -> Result<NonNull<u8>, AllocError> {
    self.check_allocate_size(size)?;
    validate_call_alignment(alignment, self.alignment)?;
    trace!(strategy = "pool", size, "allocate");

    let mut blocks = self.blocks.borrow_mut();
    if let Ok(p) = blocks.allocate(self.object_size, hint) {
      return Ok(p);
    }
    warn!(strategy = "pool", "exhausted, trimming before growing");
    blocks.trim_empty_blocks();
    if let Ok(p) = blocks.allocate(self.object_size, hint) {
      return Ok(p);
    }

    if cross_allocator_trim(&self.manager_hook) {
      if let Ok(p) = blocks.allocate(self.object_size, hint) {
        return Ok(p);
      }
    }
    error!(strategy = "pool", "out of memory");
    Err(AllocError::OutOfMemory)
  }

  fn release(&self, chunk: NonNull<u8>, size: usize) -> Result<bool, AllocError> {
    self.check_release_size(size)?;
    self.blocks.borrow_mut().release(chunk, self.object_size)
  }

  fn has_address(&self, chunk: *const u8) -> bool {
    self.blocks.borrow().has_address(chunk)
  }

  fn trim_empty_blocks(&self) -> bool {
    self.blocks.borrow_mut().trim_empty_blocks()
  }

  fn is_corrupt(&self) -> bool {
    self.blocks.borrow().is_corrupt()
  }

  fn fragmentation_percent(&self) -> f32 {
    self.blocks.borrow().fragmentation_percent()
  }

  fn max_addressable_objects(&self, object_size: usize) -> u64 {
    conservative_max_objects(object_size.max(self.object_size))
  }

  fn strategy_name(&self) -> &'static str {
    "pool"
  }

  fn bind_manager(&self, manager: Weak<Manager>, id: AllocatorId) {
    *self.manager_hook.borrow_mut() = Some((manager, id));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn allocates_128_then_grows_a_second_block_on_the_129th() {
    let pool = PoolAllocator::new(1, 2048, 16, 8).unwrap();
    let mut seen = std::collections::HashSet::new();
    for _ in 0..128 {
      let p = pool.allocate(16, None, None).unwrap();
      assert_eq!(p.as_ptr() as usize % 8, 0);
      assert!(seen.insert(p.as_ptr() as usize));
    }
    assert_eq!(pool.fragmentation_percent(), 0.0);
    pool.allocate(16, None, None).unwrap();
  }

  #[test]
  fn allocate_accepts_a_request_smaller_than_the_slot() {
    let pool = PoolAllocator::new(1, 2048, 16, 8).unwrap();
    let p = pool.allocate(10, None, None).unwrap();
    assert!(pool.release(p, 16).unwrap());
  }

  #[test]
  fn allocate_rejects_a_request_larger_than_the_slot() {
    let pool = PoolAllocator::new(1, 2048, 16, 8).unwrap();
    assert!(pool.allocate(17, None, None).is_err());
  }

  #[test]
  fn release_with_wrong_size_is_invalid_argument() {
    let pool = PoolAllocator::new(1, 2048, 16, 8).unwrap();
    let p = pool.allocate(16, None, None).unwrap();
    assert!(pool.release(p, 32).is_err());
    assert!(pool.release(p, 16).unwrap());
  }

  #[test]
  fn draining_a_pool_allows_trim_to_reclaim_it() {
    let pool = PoolAllocator::new(1, 2048, 16, 8).unwrap();
    let mut chunks = Vec::new();
    for _ in 0..(2048 / 16) {
      chunks.push(pool.allocate(16, None, None).unwrap());
    }
    for c in chunks {
      pool.release(c, 16).unwrap();
    }
    assert!(!pool.is_corrupt());
  }
}
