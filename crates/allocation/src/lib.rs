//! Physical frame allocation for the rest of the kernel's life: one bitmap
//! bit per frame, storage carved out of the eternal arena once the device
//! tree has told us how much RAM exists.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(any(test, feature = "std"))]
extern crate std;

mod frame;

pub use frame::{FrameAllocator, FrameError};

use address::PhysicalAddress;
use hermit_sync::SpinMutex;
use log::debug;

static FRAME_ALLOCATOR: SpinMutex<Option<FrameAllocator>> = SpinMutex::new(None);

/// Builds the global frame allocator over `memory_size` bytes of RAM
/// starting at `base`, taking bitmap storage from the global arena.
pub fn init(base: PhysicalAddress, memory_size: usize) {
    debug!(
        "initializing frame allocator at {:#018x}, {} bytes of ram",
        base.as_usize(),
        memory_size
    );

    let allocator = arena::with(|arena| FrameAllocator::new(base, memory_size, arena));
    *FRAME_ALLOCATOR.lock() = Some(allocator);
}

/// Lowest free frame, or `None` when physical memory is exhausted (or the
/// allocator has not been initialized). Exhaustion is the caller's problem,
/// never a panic.
pub fn alloc_page() -> Option<PhysicalAddress> {
    FRAME_ALLOCATOR.lock().as_mut().and_then(FrameAllocator::alloc_page)
}

pub fn free_page(address: PhysicalAddress) -> Result<(), FrameError> {
    match FRAME_ALLOCATOR.lock().as_mut() {
        Some(allocator) => allocator.free_page(address),
        None => Err(FrameError::Uninitialized),
    }
}

/// Permanently reserves the frames covering `base..base + length`, e.g. the
/// kernel image or firmware-claimed ranges.
pub fn mark_region_unusable(base: PhysicalAddress, length: usize) {
    if let Some(allocator) = FRAME_ALLOCATOR.lock().as_mut() {
        allocator.mark_region_unusable(base, length);
    }
}

/// Returns `(free, total)` frame counts; `(0, 0)` before initialization.
pub fn statistics() -> (usize, usize) {
    match FRAME_ALLOCATOR.lock().as_ref() {
        Some(allocator) => (allocator.free_frames(), allocator.frame_count()),
        None => (0, 0),
    }
}
