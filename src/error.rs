//! Error taxonomy shared by every allocator in this crate.

use std::fmt;

/// Everything that can go wrong when talking to an allocator.
///
/// `Corrupt` is deliberately absent here: structural corruption is reported
/// as a `bool` from `is_corrupt`, never raised, since the caller (not the
/// allocator) is in the best position to decide whether to abort, log, or
/// keep going.
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
  /// A construction parameter or a call's arguments violate a documented
  /// precondition: bad alignment, a release whose size doesn't match what
  /// was allocated, a stack release/resize out of LIFO order, and so on.
  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  /// Every reclamation step (self-trim, cross-allocator trim, fallback
  /// handler) ran and none of them freed enough space.
  #[error("allocator exhausted")]
  OutOfMemory,

  /// The API was used in a way that violates the crate's own invariants
  /// rather than the caller's arguments: no manager exists yet, an
  /// allocator handle outlived its manager, a mutex was poisoned.
  #[error("logic error: {0}")]
  LogicError(String),
}

impl AllocError {
  pub(crate) fn invalid(msg: impl fmt::Display) -> Self {
    AllocError::InvalidArgument(msg.to_string())
  }

  pub(crate) fn logic(msg: impl fmt::Display) -> Self {
    AllocError::LogicError(msg.to_string())
  }
}
