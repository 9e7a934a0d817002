//! Alignment arithmetic used throughout the block and allocator layers.

/// Rounds `value` up to the nearest machine-word boundary.
///
/// # Examples
///
/// ```rust
/// use std::mem;
/// use fixalloc::align;
///
/// match mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + ::std::mem::size_of::<usize>() - 1) & !(::std::mem::size_of::<usize>() - 1)
  };
}

/// Rounds `value` up to the nearest multiple of `alignment`.
///
/// `alignment` must be a power of two; this is a caller invariant checked at
/// allocator construction time (see `allocator::validate_alignment`), not
/// re-checked here on every call.
#[inline]
pub fn round_up(value: usize, alignment: usize) -> usize {
  debug_assert!(alignment.is_power_of_two());
  (value + alignment - 1) & !(alignment - 1)
}

/// Largest alignment any allocator in this crate will honor.
pub const MAX_ALIGNMENT: usize = 32;

#[cfg(test)]
mod tests {
  use super::round_up;
  use std::mem;

  #[test]
  fn test_align() {
    let ptr_size = mem::size_of::<usize>();

    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (ptr_size * i + 1)..=(ptr_size * (i + 1));

      let expected_alignment = ptr_size * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
      }
    }
  }

  #[test]
  fn round_up_matches_macro_for_word_alignment() {
    let ptr_size = mem::size_of::<usize>();
    for size in 1..200usize {
      assert_eq!(round_up(size, ptr_size), align!(size));
    }
  }

  #[test]
  fn round_up_handles_arbitrary_power_of_two() {
    assert_eq!(round_up(0, 8), 0);
    assert_eq!(round_up(1, 8), 8);
    assert_eq!(round_up(8, 8), 8);
    assert_eq!(round_up(9, 8), 16);
    assert_eq!(round_up(17, 32), 32);
  }
}
