use fixalloc::{AllocatorOps, PoolAllocator};

fn print_alloc(label: &str, size: usize, ptr: *const u8) {
  println!("[{label}] {size} bytes @ {ptr:?} (align check: addr % 8 = {})", ptr as usize % 8);
}

fn main() {
  // A pool of 16-byte slots, 2048 bytes per block -> 128 slots per block.
  let pool = PoolAllocator::new(1, 2048, 16, 8).unwrap();

  // --------------------------------------------------------------------
  // 1) Allocate a handful of fixed-size objects.
  // --------------------------------------------------------------------
  let mut chunks = Vec::new();
  for i in 0..5 {
    let p = pool.allocate(16, None, None).unwrap();
    println!("\n[1.{i}] Allocate 16-byte slot");
    print_alloc("1", 16, p.as_ptr());
    unsafe { (p.as_ptr() as *mut u64).write(i as u64) };
    chunks.push(p);
  }

  // --------------------------------------------------------------------
  // 2) Release the middle one and show the slot gets reused.
  // --------------------------------------------------------------------
  let middle = chunks.remove(2);
  pool.release(middle, 16).unwrap();
  println!("\n[2] Released slot at {:?}", middle.as_ptr());

  let reused = pool.allocate(16, None, None).unwrap();
  println!(
    "[2] Next allocation landed at {:?}: {}",
    reused.as_ptr(),
    if reused == middle { "reused the freed slot" } else { "went elsewhere" }
  );

  // --------------------------------------------------------------------
  // 3) Drain everything and trim.
  // --------------------------------------------------------------------
  pool.release(reused, 16).unwrap();
  for c in chunks {
    pool.release(c, 16).unwrap();
  }
  let trimmed = pool.trim_empty_blocks();
  println!("\n[3] trim_empty_blocks() after draining the pool: {trimmed}");
  assert!(!pool.is_corrupt());
}
