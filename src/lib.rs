//! # fixalloc — fixed-policy memory allocators
//!
//! A small family of allocators for workloads where a general-purpose
//! allocator pays for flexibility you don't need: objects that share a
//! lifetime, objects released in a specific order, or many same-size
//! objects.
//!
//! ```text
//!   Strategy       Release order        Overhead per chunk
//!   ─────────────────────────────────────────────────────
//!   Linear         never (bulk only)    0 bytes
//!   Stack          LIFO only            one chunk header
//!   Pool           any order            0 bytes (in-place free list)
//!   Tiny           any order            0 bytes (byte-indexed free list)
//! ```
//!
//! ## Crate structure
//!
//! ```text
//!   fixalloc
//!   ├── align        - alignment arithmetic shared by every block
//!   ├── error        - AllocError taxonomy
//!   ├── block        - per-strategy block implementations (BlockOps)
//!   ├── block_set    - ordered collection of one strategy's blocks
//!   ├── allocator    - public allocator types (AllocatorOps)
//!   ├── thread_safe  - generic mutex-backed decorator
//!   ├── manager      - allocator registry and OOM-reclamation protocol
//!   └── adapter      - generic-container allocator adapter
//! ```
//!
//! ## Quick start
//!
//! ```rust
//! use fixalloc::PoolAllocator;
//! use fixalloc::AllocatorOps;
//!
//! let pool = PoolAllocator::new(1, 4096, 16, 8).unwrap();
//! let chunk = pool.allocate(16, None, None).unwrap();
//! unsafe { (chunk.as_ptr() as *mut u64).write(42) };
//! pool.release(chunk, 16).unwrap();
//! ```
//!
//! ## Thread safety
//!
//! Every bare allocator here is `Send` but not `Sync` — hand it to one
//! thread at a time, or wrap it in [`ThreadSafe`] for unrestricted
//! concurrent use behind a single mutex.
//!
//! ## Safety
//!
//! This crate manages raw memory directly; `allocate`/`release`/`resize`
//! trust the caller to pass back the same size (and, for the stack
//! strategy, the same order) used at allocation. Violating that contract
//! returns `AllocError::InvalidArgument` where it can be detected, or is
//! undefined behavior where it can't (e.g. releasing a pointer that was
//! never allocated by this allocator).

pub mod adapter;
pub mod align;
pub mod allocator;
mod block;
mod block_set;
pub mod error;
pub mod manager;
pub mod thread_safe;

pub use adapter::Adapter;
pub use allocator::{AllocatorKind, AllocatorOps, AllocatorParameters, LinearAllocator, PoolAllocator, StackAllocator, TinyAllocator};
pub use error::AllocError;
pub use manager::{AllocatorId, Manager, create_manager, destroy_manager, manager};
pub use thread_safe::ThreadSafe;
