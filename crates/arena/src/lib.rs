//! The eternal arena: bump allocation over the link-time reserved region
//! that backs every early kernel structure. Nothing handed out here is ever
//! freed, and running out is fatal.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(any(test, feature = "std"))]
extern crate std;

mod eternal;

pub use eternal::EternalArena;

use core::ptr::NonNull;

use hermit_sync::SpinMutex;
use log::debug;

static ETERNAL_ARENA: SpinMutex<Option<EternalArena>> = SpinMutex::new(None);

/// Hands the reserved eternal region to the global arena. The kernel calls
/// this exactly once, with bounds taken from its linker script.
///
/// # Safety
///
/// `start..end` must be a readable and writable memory region that nothing
/// else touches for the rest of execution.
pub unsafe fn init(start: usize, end: usize) {
    debug!("eternal arena covers {:#018x}..{:#018x}", start, end);

    let arena = unsafe { EternalArena::new(start, end) };
    *ETERNAL_ARENA.lock() = Some(arena);
}

/// Runs `f` against the global arena. Panics if the arena has not been
/// initialized: there is no way to satisfy a boot-time allocation without
/// the reserved region.
pub fn with<R>(f: impl FnOnce(&mut EternalArena) -> R) -> R {
    match ETERNAL_ARENA.lock().as_mut() {
        Some(arena) => f(arena),
        None => panic!("eternal arena used before initialization"),
    }
}

pub fn allocate(size: usize) -> NonNull<u8> {
    with(|arena| arena.allocate(size))
}

/// `alignment` must be a power of two.
pub fn allocate_aligned(size: usize, alignment: usize) -> NonNull<u8> {
    with(|arena| arena.allocate_aligned(size, alignment))
}
