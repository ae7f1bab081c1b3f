use core::mem::{align_of, size_of};
use core::ptr::NonNull;
use core::slice;

/// Bump allocator over a fixed region. The cursor only ever moves forward;
/// there is no free operation, so everything carved out of it lives for the
/// rest of execution.
///
/// Not reentrant and not internally synchronized. During early boot a single
/// core owns it; anything later has to wrap it in a lock, which is what the
/// crate-level global does.
pub struct EternalArena {
    start: usize,
    cursor: usize,
    end: usize,
}

impl EternalArena {
    /// # Safety
    ///
    /// `start..end` must be a readable and writable memory region that
    /// nothing else touches for the rest of execution, and `start` must be
    /// non-null.
    pub const unsafe fn new(start: usize, end: usize) -> Self {
        assert!(start != 0 && start <= end);

        Self {
            start,
            cursor: start,
            end,
        }
    }

    /// Carves `size` bytes at natural word alignment out of the remaining
    /// region. The returned memory is *not* zeroed.
    ///
    /// Panics when the request does not fit; a failed boot-time allocation
    /// is fatal, not retryable.
    pub fn allocate(&mut self, size: usize) -> NonNull<u8> {
        self.allocate_aligned(size, align_of::<usize>())
    }

    /// Like [`Self::allocate`], but rounds the cursor up to `alignment`
    /// first. `alignment` must be a power of two.
    pub fn allocate_aligned(&mut self, size: usize, alignment: usize) -> NonNull<u8> {
        debug_assert!(alignment.is_power_of_two());

        let base = (self.cursor + alignment - 1) & !(alignment - 1);
        match base.checked_add(size) {
            Some(new_cursor) if new_cursor <= self.end => {
                self.cursor = new_cursor;
                // base is within start..end, which excludes null
                unsafe { NonNull::new_unchecked(base as *mut u8) }
            }
            _ => panic!(
                "eternal arena exhausted: {} bytes requested, {} remaining",
                size,
                self.remaining()
            ),
        }
    }

    /// Typed allocation with every element written to `fill`, for callers
    /// that need defined contents (the arena itself never clears memory).
    pub fn allocate_slice<T: Copy>(&mut self, len: usize, fill: T) -> &'static mut [T] {
        let bytes = len
            .checked_mul(size_of::<T>())
            .unwrap_or_else(|| panic!("eternal arena allocation overflows"));

        let ptr = self.allocate_aligned(bytes, align_of::<T>()).cast::<T>();
        unsafe {
            for i in 0..len {
                ptr.as_ptr().add(i).write(fill);
            }
            slice::from_raw_parts_mut(ptr.as_ptr(), len)
        }
    }

    pub fn used(&self) -> usize {
        self.cursor - self.start
    }

    pub fn remaining(&self) -> usize {
        self.end - self.cursor
    }
}
