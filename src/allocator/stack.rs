use super::{
  AllocatorOps, ManagerHook, conservative_max_objects, cross_allocator_trim, validate_alignment,
  validate_block_size, validate_call_alignment,
};
use crate::block::StackBlock;
use crate::block_set::BlockSet;
use crate::error::AllocError;
use crate::manager::{AllocatorId, Manager};
use std::cell::RefCell;
use std::ptr::NonNull;
use std::sync::Weak;
use tracing::{error, trace, warn};

/// LIFO allocator: chunks must be released (or resized) in the reverse
/// order they were allocated, in exchange for which the top chunk can be
/// grown or shrunk in place.
pub struct StackAllocator {
  blocks: RefCell<BlockSet<StackBlock>>,
  alignment: usize,
  manager_hook: ManagerHook,
}

impl StackAllocator {
  pub fn new(initial_blocks: u32, block_size: usize, alignment: usize) -> Result<Self, AllocError> {
    validate_alignment(alignment)?;
    validate_block_size(block_size, alignment)?;
    if initial_blocks == 0 {
      return Err(AllocError::invalid("initial_blocks must be at least 1"));
    }
    Ok(StackAllocator {
      blocks: RefCell::new(BlockSet::new(block_size, alignment, 0)),
      alignment,
      manager_hook: RefCell::new(None),
    })
  }
}

impl AllocatorOps for StackAllocator {
  fn allocate(
    &self,
    size: usize,
    alignment: Option<usize>,
    hint: Option<NonNull<u8>>,
  ) -> Result<NonNull<u8>, AllocError> {
    validate_call_alignment(alignment, self.alignment)?;
    trace!(strategy = "stack", size, "allocate");

    let mut blocks = self.blocks.borrow_mut();
    if let Ok(p) = blocks.allocate(size, hint) {
      return Ok(p);
    }
    warn!(strategy = "stack", "exhausted, trimming before growing");
    blocks.trim_empty_blocks();
    if let Ok(p) = blocks.allocate(size, hint) {
      return Ok(p);
    }

    if cross_allocator_trim(&self.manager_hook) {
      if let Ok(p) = blocks.allocate(size, hint) {
        return Ok(p);
      }
    }
    error!(strategy = "stack", "out of memory");
    Err(AllocError::OutOfMemory)
  }

  fn release(&self, chunk: NonNull<u8>, size: usize) -> Result<bool, AllocError> {
    self.blocks.borrow_mut().release(chunk, size)
  }

  fn resize(&self, chunk: NonNull<u8>, old_size: usize, new_size: usize) -> Result<bool, AllocError> {
    self.blocks.borrow_mut().resize(chunk, old_size, new_size)
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
    "stack"
  }

  fn bind_manager(&self, manager: Weak<Manager>, id: AllocatorId) {
    *self.manager_hook.borrow_mut() = Some((manager, id));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lifo_allocate_resize_release() {
    let stack = StackAllocator::new(1, 2048, 8).unwrap();
    let a = stack.allocate(100, None, None).unwrap();
    let b = stack.allocate(200, None, None).unwrap();
    assert!(stack.resize(b, 200, 300).unwrap());
    assert!(stack.resize(b, 300, 150).unwrap());
    assert!(stack.release(b, 150).unwrap());
    assert!(stack.release(a, 100).unwrap());
    assert!(!stack.is_corrupt());
  }

  #[test]
  fn releasing_out_of_order_is_invalid_argument() {
    let stack = StackAllocator::new(1, 2048, 8).unwrap();
    let a = stack.allocate(100, None, None).unwrap();
    let _b = stack.allocate(200, None, None).unwrap();
    assert!(stack.release(a, 100).is_err());
  }
}
