use core::mem::size_of;

use arena::EternalArena;

/// Leaks a word-aligned buffer and returns its bounds. Stands in for the
/// link-time reserved region a kernel would hand to the arena.
pub fn leaked_region(size: usize) -> (usize, usize) {
    let words = size.div_ceil(size_of::<u64>());
    let storage: &'static mut [u64] = vec![0u64; words].leak();
    let start = storage.as_ptr() as usize;
    (start, start + words * size_of::<u64>())
}

/// An independent arena instance over a leaked region, for tests that do
/// not want to share the global one.
pub fn leaked_arena(size: usize) -> EternalArena {
    let (start, end) = leaked_region(size);
    unsafe { EternalArena::new(start, end) }
}
