use fixalloc::{AllocatorOps, TinyAllocator};

fn main() {
  // 16-byte objects, 8-byte aligned -> 255 slots per block (4080 bytes).
  let tiny = TinyAllocator::new(1, 16 * 255, 16, 8).unwrap();

  // --------------------------------------------------------------------
  // 1) Fill exactly one block.
  // --------------------------------------------------------------------
  let mut chunks = Vec::new();
  for _ in 0..255 {
    chunks.push(tiny.allocate(16, None, None).unwrap());
  }
  println!("[1] filled one 255-slot block; fragmentation = {}", tiny.fragmentation_percent());

  // --------------------------------------------------------------------
  // 2) One more allocation forces a second block into existence.
  // --------------------------------------------------------------------
  let overflow = tiny.allocate(16, None, None).unwrap();
  println!("[2] 256th allocation landed at {:?} in a freshly grown block", overflow.as_ptr());
  tiny.release(overflow, 16).unwrap();

  // --------------------------------------------------------------------
  // 3) Drain the first block and confirm the free-list stays sound.
  // --------------------------------------------------------------------
  for c in chunks {
    tiny.release(c, 16).unwrap();
  }
  assert!(!tiny.is_corrupt());
  println!("[3] drained the block; trim_empty_blocks() = {}", tiny.trim_empty_blocks());
}
