use super::{
  AllocatorOps, ManagerHook, conservative_max_objects, cross_allocator_trim, validate_alignment,
  validate_block_size, validate_call_alignment,
};
use crate::block::LinearBlock;
use crate::block_set::BlockSet;
use crate::error::AllocError;
use crate::manager::{AllocatorId, Manager};
use std::cell::RefCell;
use std::ptr::NonNull;
use std::sync::Weak;
use tracing::{error, trace, warn};

/// Bump-pointer allocator: fast, never fragments within a block, never
/// releases an individual chunk. Useful for arena-style workloads where
/// everything is freed together by trimming once the whole arena is unused.
///
/// Holds its block set behind a `RefCell` so `AllocatorOps`'s `&self`
/// methods can mutate it; this makes `LinearAllocator` `Send` but not
/// `Sync` — wrap it in [`crate::thread_safe::ThreadSafe`] for concurrent use.
pub struct LinearAllocator {
  blocks: RefCell<BlockSet<LinearBlock>>,
  alignment: usize,
  manager_hook: ManagerHook,
}

impl LinearAllocator {
  pub fn new(initial_blocks: u32, block_size: usize, alignment: usize) -> Result<Self, AllocError> {
    validate_alignment(alignment)?;
    validate_block_size(block_size, alignment)?;
    if initial_blocks == 0 {
      return Err(AllocError::invalid("initial_blocks must be at least 1"));
    }

    // Blocks are carved lazily on first real allocation; `initial_blocks`
    // is validated here (matching the other strategies' constructors) but
    // otherwise only informs callers' capacity planning.
    let blocks = RefCell::new(BlockSet::new(block_size, alignment, 0));
    Ok(LinearAllocator { blocks, alignment, manager_hook: RefCell::new(None) })
  }
}

impl AllocatorOps for LinearAllocator {
  fn allocate(
    &self,
    size: usize,
    alignment: Option<usize>,
    hint: Option<NonNull<u8>>,
  ) -> Result<NonNull<u8>, AllocError> {
    validate_call_alignment(alignment, self.alignment)?;
    trace!(strategy = "linear", size, "allocate");

    let mut blocks = self.blocks.borrow_mut();
    if let Ok(p) = blocks.allocate(size, hint) {
      return Ok(p);
    }

    warn!(strategy = "linear", "block exhausted, trimming before growing");
    blocks.trim_empty_blocks();
    if let Ok(p) = blocks.allocate(size, hint) {
      return Ok(p);
    }

    if cross_allocator_trim(&self.manager_hook) {
      if let Ok(p) = blocks.allocate(size, hint) {
        return Ok(p);
      }
    }
    error!(strategy = "linear", "out of memory");
    Err(AllocError::OutOfMemory)
  }

  fn release(&self, _chunk: NonNull<u8>, _size: usize) -> Result<bool, AllocError> {
    Ok(false)
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
    conservative_max_objects(object_size.max(1))
  }

  fn strategy_name(&self) -> &'static str {
    "linear"
  }

  fn bind_manager(&self, manager: Weak<Manager>, id: AllocatorId) {
    *self.manager_hook.borrow_mut() = Some((manager, id));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn allocates_and_never_releases_individually() {
    let alloc = LinearAllocator::new(1, 4096, 8).unwrap();
    let p = alloc.allocate(64, None, None).unwrap();
    assert!(alloc.has_address(p.as_ptr()));
    assert_eq!(alloc.release(p, 64).unwrap(), false);
    assert!(alloc.has_address(p.as_ptr()));
  }

  #[test]
  fn rejects_bad_alignment() {
    assert!(LinearAllocator::new(1, 4096, 3).is_err());
    assert!(LinearAllocator::new(1, 4096, 64).is_err());
  }

  #[test]
  fn rejects_block_size_not_multiple_of_alignment() {
    assert!(LinearAllocator::new(1, 100, 8).is_err());
  }

  #[test]
  fn trim_after_exhaustion_is_a_no_op_when_nothing_was_released() {
    let arena = LinearAllocator::new(1, 256, 8).unwrap();
    let sizes = [37, 61, 19, 80, 45, 12, 99, 53];
    let mut allocated = 0;
    for &size in sizes.iter().cycle() {
      match arena.allocate(size, None, None) {
        Ok(_) => allocated += 1,
        Err(_) => break,
      }
      assert!(allocated < 1000, "arena never exhausted");
    }
    // Nothing was ever released, so the one block in use isn't empty: a
    // bump allocator can't trim its way out of real exhaustion.
    assert!(!arena.trim_empty_blocks());
    assert!(arena.allocate(8, None, None).is_err());
  }
}
