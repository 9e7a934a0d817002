//! Public allocator types built on top of [`crate::block_set::BlockSet`].

mod linear;
mod pool;
mod stack;
mod tiny;

pub use linear::LinearAllocator;
pub use pool::PoolAllocator;
pub use stack::StackAllocator;
pub use tiny::TinyAllocator;

use crate::align::MAX_ALIGNMENT;
use crate::error::AllocError;
use crate::manager::{AllocatorId, Manager};
use std::ptr::NonNull;
use std::sync::Weak;

/// Which allocation strategy a [`crate::manager::Manager`] should construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorKind {
  Linear,
  Stack,
  Pool,
  Tiny,
}

/// Construction parameters for [`crate::manager::Manager::create_allocator`].
#[derive(Debug, Clone)]
pub struct AllocatorParameters {
  pub kind: AllocatorKind,
  pub initial_blocks: u32,
  pub block_size: usize,
  /// Ignored for `Linear`/`Stack`; required for `Pool`/`Tiny`.
  pub object_size: usize,
  pub alignment: usize,
}

/// Operations common to every allocator strategy, object-safe so the
/// manager's registry can hold a `Box<dyn AllocatorOps>`.
///
/// Every method takes `&self`: bare allocators hold their block set behind
/// a `RefCell` (runtime-checked, single-thread interior mutability — `Send`
/// but not `Sync`), and [`crate::thread_safe::ThreadSafe`] holds one behind
/// a `Mutex` (`Send + Sync`). This is what lets `ThreadSafe<A>` serialize
/// concurrent callers without every caller also needing a lock around the
/// `Box<dyn AllocatorOps>` handle itself.
pub trait AllocatorOps: Send {
  fn allocate(
    &self,
    size: usize,
    alignment: Option<usize>,
    hint: Option<NonNull<u8>>,
  ) -> Result<NonNull<u8>, AllocError>;

  fn release(&self, chunk: NonNull<u8>, size: usize) -> Result<bool, AllocError>;

  fn resize(
    &self,
    chunk: NonNull<u8>,
    old_size: usize,
    new_size: usize,
  ) -> Result<bool, AllocError> {
    let _ = (chunk, old_size, new_size);
    Err(AllocError::invalid("resize is not supported by this allocator strategy"))
  }

  fn has_address(&self, chunk: *const u8) -> bool;

  fn trim_empty_blocks(&self) -> bool;

  fn is_corrupt(&self) -> bool;

  fn fragmentation_percent(&self) -> f32;

  fn max_addressable_objects(&self, object_size: usize) -> u64;

  fn strategy_name(&self) -> &'static str;

  /// Hands this allocator a back-reference to the manager that created it
  /// and the id it was registered under, so `allocate` can fall through to
  /// a cross-allocator trim before giving up with `OutOfMemory`. Allocators
  /// created directly (not through a [`Manager`]) never receive this call
  /// and simply skip that step.
  fn bind_manager(&self, _manager: Weak<Manager>, _id: AllocatorId) {}
}

pub(crate) fn validate_alignment(alignment: usize) -> Result<(), AllocError> {
  if alignment == 0 || alignment > MAX_ALIGNMENT || !alignment.is_power_of_two() {
    return Err(AllocError::invalid(format!(
      "alignment {alignment} must be a power of two no greater than {MAX_ALIGNMENT}"
    )));
  }
  Ok(())
}

pub(crate) fn validate_block_size(block_size: usize, alignment: usize) -> Result<(), AllocError> {
  if block_size == 0 {
    return Err(AllocError::invalid("block_size must be greater than zero"));
  }
  if alignment > 1 && block_size % alignment != 0 {
    return Err(AllocError::invalid(format!(
      "block_size {block_size} is not a multiple of alignment {alignment}"
    )));
  }
  Ok(())
}

pub(crate) fn validate_call_alignment(
  requested: Option<usize>,
  constructed: usize,
) -> Result<(), AllocError> {
  match requested {
    Some(a) if a > constructed => Err(AllocError::invalid(format!(
      "requested alignment {a} exceeds this allocator's alignment {constructed}"
    ))),
    _ => Ok(()),
  }
}

/// Shared storage for the optional manager back-reference every concrete
/// allocator keeps: `None` until [`AllocatorOps::bind_manager`] is called by
/// a [`Manager`], at which point `allocate`'s last-resort step can ask that
/// same manager to trim every other allocator before giving up.
pub(crate) type ManagerHook = std::cell::RefCell<Option<(Weak<Manager>, AllocatorId)>>;

/// Asks the bound manager (if any) to trim every allocator except the one
/// identified by this hook. Returns `false` with no effect if this
/// allocator was never registered with a manager, if that manager has since
/// been dropped, or if the trim found nothing to reclaim.
pub(crate) fn cross_allocator_trim(hook: &ManagerHook) -> bool {
  let Some((weak, id)) = hook.borrow().clone() else {
    return false;
  };
  match weak.upgrade() {
    Some(manager) => manager.trim_empty_blocks(Some(id)),
    None => false,
  }
}

/// Conservative estimate of how many `object_size` objects could ever be
/// addressed, derived from a fixed notion of available address space rather
/// than querying the OS (no portable "free memory" syscall is used here, in
/// keeping with the rest of this crate's direct-`std::alloc` approach).
pub(crate) fn conservative_max_objects(object_size: usize) -> u64 {
  if object_size == 0 {
    return 0;
  }
  (isize::MAX as u64) / object_size as u64
}
