//! Process-wide (or explicit) allocator registry and cross-allocator
//! reclamation protocol.

use crate::allocator::{
  AllocatorKind, AllocatorOps, AllocatorParameters, LinearAllocator, PoolAllocator, StackAllocator,
  TinyAllocator,
};
use crate::error::AllocError;
use crate::thread_safe::ThreadSafe;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, warn};

/// Stable handle to an allocator registered with a [`Manager`]; opaque to
/// callers, used only to hand back to `destroy_allocator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocatorId(u64);

type Fallback = dyn Fn() -> bool + Send + Sync;

struct Registry {
  allocators: HashMap<AllocatorId, Arc<dyn AllocatorOps>>,
}

/// Explicit context object replacing the original's process-wide static
/// singleton: construct one directly for an isolated allocator universe, or
/// reach the lazily-created default through [`create_manager`]/[`manager`].
pub struct Manager {
  multithreaded: bool,
  registry: Mutex<Registry>,
  next_id: AtomicU64,
  /// Re-entrancy guard for `trim_empty_blocks`: since all registry
  /// mutation is already serialized by `registry`'s mutex, a single flag
  /// scoped to this manager is equivalent to the original's thread-local
  /// and needs no second storage mechanism.
  trimming: AtomicBool,
  fallback: Mutex<Option<Box<Fallback>>>,
}

impl Manager {
  pub fn new(multithreaded: bool) -> Self {
    Manager {
      multithreaded,
      registry: Mutex::new(Registry { allocators: HashMap::new() }),
      next_id: AtomicU64::new(1),
      trimming: AtomicBool::new(false),
      fallback: Mutex::new(None),
    }
  }

  /// Installs a callback invoked as the last resort during
  /// `trim_empty_blocks` when no allocator freed anything. Replaces any
  /// previously installed callback and returns it.
  pub fn install_fallback(
    &self,
    callback: impl Fn() -> bool + Send + Sync + 'static,
  ) -> Option<Box<Fallback>> {
    self.fallback.lock().unwrap().replace(Box::new(callback))
  }

  pub fn restore_fallback(&self) -> Option<Box<Fallback>> {
    self.fallback.lock().unwrap().take()
  }

  /// Takes `self` behind an `Arc` so the new allocator can be handed a
  /// `Weak<Manager>` back-reference: the third step of the allocation retry
  /// chain (self-trim, then *this* manager's cross-allocator trim) needs an
  /// allocator to be able to call back into the manager that created it.
  pub fn create_allocator(
    self: &Arc<Self>,
    params: AllocatorParameters,
  ) -> Result<AllocatorId, AllocError> {
    let allocator: Box<dyn AllocatorOps> = match params.kind {
      AllocatorKind::Linear => {
        let a = LinearAllocator::new(params.initial_blocks, params.block_size, params.alignment)?;
        if self.multithreaded { Box::new(ThreadSafe::new(a)) } else { Box::new(a) }
      }
      AllocatorKind::Stack => {
        let a = StackAllocator::new(params.initial_blocks, params.block_size, params.alignment)?;
        if self.multithreaded { Box::new(ThreadSafe::new(a)) } else { Box::new(a) }
      }
      AllocatorKind::Pool => {
        let a = PoolAllocator::new(
          params.initial_blocks,
          params.block_size,
          params.object_size,
          params.alignment,
        )?;
        if self.multithreaded { Box::new(ThreadSafe::new(a)) } else { Box::new(a) }
      }
      AllocatorKind::Tiny => {
        let a = TinyAllocator::new(
          params.initial_blocks,
          params.block_size,
          params.object_size,
          params.alignment,
        )?;
        if self.multithreaded { Box::new(ThreadSafe::new(a)) } else { Box::new(a) }
      }
    };

    let id = AllocatorId(self.next_id.fetch_add(1, Ordering::Relaxed));
    allocator.bind_manager(Arc::downgrade(self), id);
    let allocator: Arc<dyn AllocatorOps> = Arc::from(allocator);
    self.registry.lock().unwrap().allocators.insert(id, allocator);
    debug!(allocator_id = id.0, "allocator registered");
    Ok(id)
  }

  /// Removes `id` from the registry. `release_memory` is accepted for
  /// interface parity with the original API; every allocator's `Drop`
  /// already releases its blocks unconditionally, so there is no separate
  /// "leak it" mode to opt out of here.
  pub fn destroy_allocator(&self, id: AllocatorId, release_memory: bool) -> bool {
    let _ = release_memory;
    let removed = self.registry.lock().unwrap().allocators.remove(&id).is_some();
    if removed {
      debug!(allocator_id = id.0, "allocator destroyed");
    }
    removed
  }

  /// Looks up `id`, then calls `f` with the registry lock already released:
  /// `f` commonly calls `allocate`, whose out-of-memory path reaches back
  /// into this manager to trim every other allocator, which itself needs
  /// this same lock — holding it across `f` would deadlock on that
  /// re-entrant call.
  pub fn with_allocator<R>(&self, id: AllocatorId, f: impl FnOnce(&dyn AllocatorOps) -> R) -> Option<R> {
    let allocator = self.registry.lock().unwrap().allocators.get(&id).cloned()?;
    Some(f(allocator.as_ref()))
  }

  /// Trims every registered allocator except `excluding`, then — only if
  /// nothing was freed — invokes the installed fallback.
  ///
  /// Refuses to run (returns `false`) if already in progress on this
  /// manager: an allocator's own trim can legitimately call back into this
  /// routine through the fallback, and without this guard that would
  /// recurse without bound.
  pub fn trim_empty_blocks(&self, excluding: Option<AllocatorId>) -> bool {
    if self.trimming.swap(true, Ordering::AcqRel) {
      warn!("trim_empty_blocks re-entered on the same manager; refusing to recurse");
      return false;
    }
    let result = self.trim_empty_blocks_inner(excluding);
    self.trimming.store(false, Ordering::Release);
    result
  }

  fn trim_empty_blocks_inner(&self, excluding: Option<AllocatorId>) -> bool {
    let mut trimmed_any = false;
    {
      let registry = self.registry.lock().unwrap();
      for (&id, allocator) in registry.allocators.iter() {
        if Some(id) == excluding {
          continue;
        }
        if allocator.trim_empty_blocks() {
          trimmed_any = true;
        }
      }
    }

    if trimmed_any {
      return true;
    }

    let fallback = self.fallback.lock().unwrap().take();
    let Some(fallback) = fallback else {
      return false;
    };
    // A panicking fallback is treated the same as one that declined to
    // free anything, mirroring the original swallowing an exception
    // thrown out of the previous new_handler.
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| fallback())).unwrap_or(false);
    *self.fallback.lock().unwrap() = Some(fallback);
    outcome
  }

  pub fn max_supported_alignment(&self) -> usize {
    crate::align::MAX_ALIGNMENT
  }
}

static DEFAULT_MANAGER: OnceLock<Mutex<Option<Arc<Manager>>>> = OnceLock::new();

fn default_slot() -> &'static Mutex<Option<Arc<Manager>>> {
  DEFAULT_MANAGER.get_or_init(|| Mutex::new(None))
}

/// Creates (or replaces) the process-wide default manager. Idempotent in
/// the sense that calling it again simply installs a fresh manager; callers
/// that want an isolated manager should construct `Manager::new` directly
/// instead of going through this free-function API.
pub fn create_manager(multithreaded: bool) -> bool {
  let mut slot = default_slot().lock().unwrap();
  *slot = Some(Arc::new(Manager::new(multithreaded)));
  true
}

/// Tears down the process-wide default manager.
pub fn destroy_manager(_release_all: bool) -> bool {
  let mut slot = default_slot().lock().unwrap();
  slot.take().is_some()
}

/// Returns the process-wide default manager, if one has been created.
pub fn manager() -> Result<Arc<Manager>, AllocError> {
  default_slot()
    .lock()
    .unwrap()
    .clone()
    .ok_or_else(|| AllocError::logic("no manager has been created; call create_manager first"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::allocator::AllocatorKind;

  fn pool_params() -> AllocatorParameters {
    AllocatorParameters {
      kind: AllocatorKind::Pool,
      initial_blocks: 1,
      block_size: 2048,
      object_size: 16,
      alignment: 8,
    }
  }

  #[test]
  fn create_and_destroy_roundtrip() {
    let manager = Arc::new(Manager::new(false));
    let id = manager.create_allocator(pool_params()).unwrap();
    assert!(manager.destroy_allocator(id, true));
    assert!(!manager.destroy_allocator(id, true));
  }

  #[test]
  fn cross_allocator_trim_reaches_every_other_allocator() {
    let manager = Arc::new(Manager::new(false));
    let victim = manager.create_allocator(pool_params()).unwrap();
    let bystander = manager.create_allocator(pool_params()).unwrap();

    let chunk = manager.with_allocator(bystander, |a| a.allocate(16, None, None).unwrap()).unwrap();
    manager.with_allocator(bystander, |a| a.release(chunk, 16).unwrap());

    assert!(manager.trim_empty_blocks(Some(victim)));
  }

  #[test]
  fn reentrant_trim_on_same_manager_is_refused() {
    let manager = Manager::new(false);
    manager.trimming.store(true, Ordering::SeqCst);
    assert!(!manager.trim_empty_blocks(None));
  }

  #[test]
  fn fallback_runs_only_when_nothing_was_trimmed() {
    let manager = Manager::new(false);
    let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let called2 = called.clone();
    manager.install_fallback(move || {
      called2.store(true, Ordering::SeqCst);
      true
    });
    assert!(manager.trim_empty_blocks(None));
    assert!(called.load(Ordering::SeqCst));
  }

  #[test]
  fn allocator_reaches_back_into_its_manager_on_real_oom() {
    // A block size this large can never be satisfied by the OS allocator,
    // so the very first allocation forces this allocator all the way
    // through its self-trim (finds nothing, it has no blocks yet) and into
    // the manager-level cross-allocator trim — which we observe indirectly
    // through the fallback, since no other allocator has anything to give
    // back either.
    let manager = Arc::new(Manager::new(false));
    let reached_fallback = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let reached_fallback2 = reached_fallback.clone();
    manager.install_fallback(move || {
      reached_fallback2.store(true, Ordering::SeqCst);
      false
    });

    let doomed = manager
      .create_allocator(AllocatorParameters {
        kind: AllocatorKind::Linear,
        initial_blocks: 1,
        block_size: (usize::MAX / 2) & !7,
        object_size: 0,
        alignment: 8,
      })
      .unwrap();

    let result = manager.with_allocator(doomed, |a| a.allocate(16, None, None)).unwrap();
    assert!(matches!(result, Err(AllocError::OutOfMemory)));
    assert!(reached_fallback.load(Ordering::SeqCst));
  }

  #[test]
  fn default_manager_lifecycle() {
    assert!(manager().is_err());
    create_manager(false);
    assert!(manager().is_ok());
    destroy_manager(true);
    assert!(manager().is_err());
  }
}
