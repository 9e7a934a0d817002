use super::{
  AllocatorOps, ManagerHook, conservative_max_objects, cross_allocator_trim, validate_alignment,
  validate_call_alignment,
};
use crate::align::round_up;
use crate::block::TinyBlock;
use crate::block_set::BlockSet;
use crate::error::AllocError;
use crate::manager::{AllocatorId, Manager};
use std::cell::RefCell;
use std::ptr::NonNull;
use std::sync::Weak;
use tracing::{error, trace, warn};

/// Pool allocator specialized so every block holds at most 255 objects,
/// letting the free list use a single byte per slot instead of a pointer.
pub struct TinyAllocator {
  blocks: RefCell<BlockSet<TinyBlock>>,
  object_size: usize,
  alignment: usize,
  manager_hook: ManagerHook,
}

impl TinyAllocator {
  /// `block_size` must equal `object_size * 255` once `object_size` is
  /// aligned — that is the only block size that fills every one of the 255
  /// slots a tiny block's single-byte free-list index can address, so any
  /// other value is rejected rather than silently overridden.
  pub fn new(
    initial_blocks: u32,
    block_size: usize,
    object_size: usize,
    alignment: usize,
  ) -> Result<Self, AllocError> {
    validate_alignment(alignment)?;
    if initial_blocks == 0 {
      return Err(AllocError::invalid("initial_blocks must be at least 1"));
    }
    if object_size == 0 {
      return Err(AllocError::invalid("object_size must be nonzero"));
    }
    let object_size = round_up(object_size, alignment.max(1));
    if block_size != object_size * 255 {
      return Err(AllocError::invalid(format!(
        "tiny allocator block_size must be object_size * 255 ({}), got {block_size}",
        object_size * 255
      )));
    }

    Ok(TinyAllocator {
      blocks: RefCell::new(BlockSet::new(block_size, alignment, object_size)),
      object_size,
      alignment,
      manager_hook: RefCell::new(None),
    })
  }

  /// `allocate` only needs the request to fit in a slot once aligned,
  /// mirroring the pool strategy's `check_allocate_size`.
  fn check_allocate_size(&self, size: usize) -> Result<(), AllocError> {
    if round_up(size, self.alignment.max(1)) > self.object_size {
      return Err(AllocError::invalid(format!(
        "this tiny allocator serves objects up to size {} once aligned, got {size}",
        self.object_size
      )));
    }
    Ok(())
  }

  fn check_release_size(&self, size: usize) -> Result<(), AllocError> {
    if size != self.object_size {
      return Err(AllocError::invalid(format!(
        "this tiny allocator only serves objects of size {}, got {size}",
        self.object_size
      )));
    }
    Ok(())
  }
}

impl AllocatorOps for TinyAllocator {
  fn allocate(
    &self,
    size: usize,
    alignment: Option<usize>,
    hint: Option<NonNull<u8>>,
  ) -> Result<NonNull<u8>, AllocError> {
    self.check_allocate_size(size)?;
    validate_call_alignment(alignment, self.alignment)?;
    trace!(strategy = "tiny", size, "allocate");

    let mut blocks = self.blocks.borrow_mut();
    if let Ok(p) = blocks.allocate(self.object_size, hint) {
      return Ok(p);
    }
    warn!(strategy = "tiny", "exhausted, trimming before growing");
    blocks.trim_empty_blocks();
    if let Ok(p) = blocks.allocate(self.object_size, hint) {
      return Ok(p);
    }

    if cross_allocator_trim(&self.manager_hook) {
      if let Ok(p) = blocks.allocate(self.object_size, hint) {
        return Ok(p);
      }
    }
    error!(strategy = "tiny", "out of memory");
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
    conservative_max_objects(object_size.max(self.object_size)).min(255 * 1_000_000)
  }

  fn strategy_name(&self) -> &'static str {
    "tiny"
  }

  fn bind_manager(&self, manager: Weak<Manager>, id: AllocatorId) {
    *self.manager_hook.borrow_mut() = Some((manager, id));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fills_one_block_of_255_then_grows() {
    let tiny = TinyAllocator::new(1, 16 * 255, 16, 8).unwrap();
    let mut seen = std::collections::HashSet::new();
    for _ in 0..255 {
      let p = tiny.allocate(16, None, None).unwrap();
      assert!(seen.insert(p.as_ptr() as usize));
    }
    tiny.allocate(16, None, None).unwrap();
  }

  #[test]
  fn drain_across_several_blocks_trims_clean() {
    let tiny = TinyAllocator::new(1, 16 * 255, 16, 8).unwrap();
    let mut chunks = Vec::new();
    for _ in 0..(255 * 4) {
      chunks.push(tiny.allocate(16, None, None).unwrap());
    }
    for c in chunks {
      tiny.release(c, 16).unwrap();
    }
    assert!(tiny.trim_empty_blocks());
    assert!(!tiny.is_corrupt());
  }

  #[test]
  fn allocate_accepts_a_request_smaller_than_the_slot() {
    let tiny = TinyAllocator::new(1, 16 * 255, 16, 8).unwrap();
    let p = tiny.allocate(10, None, None).unwrap();
    assert!(tiny.release(p, 16).unwrap());
  }

  #[test]
  fn mismatched_block_size_is_rejected() {
    assert!(TinyAllocator::new(1, 4096, 16, 8).is_err());
  }
}
