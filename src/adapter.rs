//! Adapts any [`AllocatorOps`] implementation to the generic-container
//! allocator shape (`allocate`/`deallocate`/`grow`/`shrink`), independent of
//! nightly-only `std::alloc::Allocator` so the crate stays on stable.

use crate::allocator::AllocatorOps;
use std::alloc::Layout;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::Arc;

/// Routes a generic container's memory requests through a shared
/// [`AllocatorOps`] implementation, with a phantom element type for
/// call-site ergonomics (`Adapter::<Node, _>::allocate(&self, 1)`-style
/// usage is left to callers; the adapter itself deals in raw layouts).
pub struct Adapter<T, A: AllocatorOps> {
  inner: Arc<A>,
  _marker: PhantomData<fn() -> T>,
}

impl<T, A: AllocatorOps> Adapter<T, A> {
  pub fn new(allocator: Arc<A>) -> Self {
    Adapter { inner: allocator, _marker: PhantomData }
  }

  /// Produces an adapter for a different element type sharing the same
  /// underlying allocator.
  pub fn rebind<U>(&self) -> Adapter<U, A> {
    Adapter { inner: Arc::clone(&self.inner), _marker: PhantomData }
  }

  pub fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
    self.inner.allocate(layout.size(), Some(layout.align()), None).ok()
  }

  /// # Safety
  /// `ptr` must have been returned by `allocate` on an adapter sharing this
  /// allocator, with the same `layout`, and not already deallocated.
  pub unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
    let _ = self.inner.release(ptr, layout.size());
  }

  /// # Safety
  /// `ptr` must currently be a live allocation of `old_layout` from this
  /// adapter's allocator.
  pub unsafe fn grow(
    &self,
    ptr: NonNull<u8>,
    old_layout: Layout,
    new_layout: Layout,
  ) -> Option<NonNull<u8>> {
    debug_assert!(new_layout.size() >= old_layout.size());
    if self.inner.resize(ptr, old_layout.size(), new_layout.size()).unwrap_or(false) {
      return Some(ptr);
    }
    let new_ptr = self.allocate(new_layout)?;
    unsafe {
      std::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), old_layout.size());
      self.deallocate(ptr, old_layout);
    }
    Some(new_ptr)
  }

  /// Upper bound on how many `T`-sized objects this adapter could ever
  /// hand out, used the way container types size their capacity checks.
  pub fn max_size(&self) -> u64 {
    self.inner.max_addressable_objects(std::mem::size_of::<T>().max(1))
  }
}

impl<T, A: AllocatorOps> Clone for Adapter<T, A> {
  fn clone(&self) -> Self {
    Adapter { inner: Arc::clone(&self.inner), _marker: PhantomData }
  }
}

impl<T, A: AllocatorOps> PartialEq for Adapter<T, A> {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }
}

impl<T, A: AllocatorOps> Eq for Adapter<T, A> {}

impl<T, A: AllocatorOps> std::fmt::Debug for Adapter<T, A> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Adapter").field("strategy", &self.inner.strategy_name()).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::allocator::PoolAllocator;

  #[test]
  fn clones_share_the_same_underlying_allocator() {
    let pool = Arc::new(PoolAllocator::new(1, 2048, 16, 8).unwrap());
    let a: Adapter<u128, PoolAllocator> = Adapter::new(Arc::clone(&pool));
    let b = a.clone();
    assert_eq!(a, b);

    let other_pool = Arc::new(PoolAllocator::new(1, 2048, 16, 8).unwrap());
    let c: Adapter<u128, PoolAllocator> = Adapter::new(other_pool);
    assert_ne!(a, c);
  }

  #[test]
  fn rebind_targets_a_different_element_type_same_allocator() {
    let pool = Arc::new(PoolAllocator::new(1, 2048, 16, 8).unwrap());
    let a: Adapter<u8, PoolAllocator> = Adapter::new(pool);
    let rebound: Adapter<u64, PoolAllocator> = a.rebind();
    assert!(Arc::ptr_eq(&a.inner, &rebound.inner));
  }

  #[test]
  fn allocate_and_deallocate_round_trip() {
    let pool = Arc::new(PoolAllocator::new(1, 2048, 16, 8).unwrap());
    let a: Adapter<[u8; 16], PoolAllocator> = Adapter::new(pool);
    let layout = Layout::from_size_align(16, 8).unwrap();
    let p = a.allocate(layout).unwrap();
    unsafe { a.deallocate(p, layout) };
  }
}
