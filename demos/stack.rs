use fixalloc::{AllocatorOps, StackAllocator};

fn main() {
  let stack = StackAllocator::new(1, 2048, 8).unwrap();

  // --------------------------------------------------------------------
  // 1) Push two chunks, LIFO style.
  // --------------------------------------------------------------------
  let a = stack.allocate(100, None, None).unwrap();
  let b = stack.allocate(200, None, None).unwrap();
  println!("[1] a={:?} (100 bytes), b={:?} (200 bytes, on top)", a.as_ptr(), b.as_ptr());

  // --------------------------------------------------------------------
  // 2) Only the top chunk may be resized or released.
  // --------------------------------------------------------------------
  match stack.release(a, 100) {
    Err(e) => println!("[2] releasing 'a' while 'b' is on top correctly failed: {e}"),
    Ok(_) => panic!("releasing a non-top chunk should have been rejected"),
  }

  assert!(stack.resize(b, 200, 300).unwrap());
  println!("[2] grew 'b' in place from 200 to 300 bytes");
  assert!(stack.resize(b, 300, 150).unwrap());
  println!("[2] shrank 'b' back down to 150 bytes");

  // --------------------------------------------------------------------
  // 3) Pop in the correct order.
  // --------------------------------------------------------------------
  stack.release(b, 150).unwrap();
  stack.release(a, 100).unwrap();
  println!("[3] released both chunks in LIFO order; is_corrupt() = {}", stack.is_corrupt());
}
