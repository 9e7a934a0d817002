//! A single generic decorator that serializes any allocator behind a mutex,
//! replacing four hand-written thread-safe subclasses.

use crate::allocator::AllocatorOps;
use crate::error::AllocError;
use crate::manager::{AllocatorId, Manager};
use std::ptr::NonNull;
use std::sync::{Mutex, Weak};

/// Wraps any [`AllocatorOps`] implementation so it can be shared across
/// threads. Every call acquires the inner mutex for its full duration —
/// there is no finer-grained locking, matching the rest of this crate's
/// policy of treating a single allocator's blocks as one resource.
pub struct ThreadSafe<A: AllocatorOps> {
  inner: Mutex<A>,
}

impl<A: AllocatorOps> ThreadSafe<A> {
  pub fn new(allocator: A) -> Self {
    ThreadSafe { inner: Mutex::new(allocator) }
  }
}

impl<A: AllocatorOps> AllocatorOps for ThreadSafe<A> {
  fn allocate(
    &self,
    size: usize,
    alignment: Option<usize>,
    hint: Option<NonNull<u8>>,
  ) -> Result<NonNull<u8>, AllocError> {
    let guard = self.inner.lock().map_err(|_| AllocError::logic("allocator mutex was poisoned"))?;
    guard.allocate(size, alignment, hint)
  }

  fn release(&self, chunk: NonNull<u8>, size: usize) -> Result<bool, AllocError> {
    let guard = self.inner.lock().map_err(|_| AllocError::logic("allocator mutex was poisoned"))?;
    guard.release(chunk, size)
  }

  fn resize(&self, chunk: NonNull<u8>, old_size: usize, new_size: usize) -> Result<bool, AllocError> {
    let guard = self.inner.lock().map_err(|_| AllocError::logic("allocator mutex was poisoned"))?;
    guard.resize(chunk, old_size, new_size)
  }

  fn has_address(&self, chunk: *const u8) -> bool {
    self.inner.lock().map(|g| g.has_address(chunk)).unwrap_or(false)
  }

  fn trim_empty_blocks(&self) -> bool {
    self.inner.lock().map(|g| g.trim_empty_blocks()).unwrap_or(false)
  }

  fn is_corrupt(&self) -> bool {
    self.inner.lock().map(|g| g.is_corrupt()).unwrap_or(true)
  }

  fn fragmentation_percent(&self) -> f32 {
    self.inner.lock().map(|g| g.fragmentation_percent()).unwrap_or(0.0)
  }

  fn max_addressable_objects(&self, object_size: usize) -> u64 {
    self.inner.lock().map(|g| g.max_addressable_objects(object_size)).unwrap_or(0)
  }

  fn strategy_name(&self) -> &'static str {
    // Fixed at construction and never mutated under the lock, so a
    // best-effort read that doesn't block a concurrent caller is fine here.
    match self.inner.try_lock() {
      Ok(g) => g.strategy_name(),
      Err(_) => "locked",
    }
  }

  fn bind_manager(&self, manager: Weak<Manager>, id: AllocatorId) {
    if let Ok(g) = self.inner.lock() {
      g.bind_manager(manager, id);
    }
  }
}
