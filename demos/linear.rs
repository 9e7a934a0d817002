use fixalloc::{AllocatorOps, LinearAllocator};

fn main() {
  // One 4 KiB arena, 8-byte aligned.
  let arena = LinearAllocator::new(1, 4096, 8).unwrap();

  // --------------------------------------------------------------------
  // 1) Bump-allocate a few differently sized chunks.
  // --------------------------------------------------------------------
  let a = arena.allocate(32, None, None).unwrap();
  let b = arena.allocate(100, None, None).unwrap();
  let c = arena.allocate(8, None, None).unwrap();
  println!("[1] a={:?} b={:?} c={:?}", a.as_ptr(), b.as_ptr(), c.as_ptr());
  assert!(a.as_ptr() < b.as_ptr());
  assert!(b.as_ptr() < c.as_ptr());

  // --------------------------------------------------------------------
  // 2) Linear allocators don't release individual chunks.
  // --------------------------------------------------------------------
  let released = arena.release(a, 32).unwrap();
  println!("[2] release() on a linear allocator returns: {released}");
  assert!(arena.has_address(a.as_ptr()));

  // --------------------------------------------------------------------
  // 3) Fill the arena, then trim once nothing is live (the whole block
  //    becomes reclaimable only once every chunk in it is unused).
  // --------------------------------------------------------------------
  let mut n = 0;
  while arena.allocate(256, None, None).is_ok() {
    n += 1;
  }
  println!("[3] filled the remaining arena with {n} more 256-byte chunks before exhaustion");
}
