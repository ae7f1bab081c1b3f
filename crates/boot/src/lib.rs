//! Boot-time wiring of the memory subsystem: eternal arena first, then the
//! device tree to learn how much RAM exists, then the frame allocator over
//! that RAM with the kernel image carved out. Single core, no interrupts,
//! nothing here runs twice.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(any(test, feature = "std"))]
extern crate std;

use address::PhysicalAddress;
use constants::PAGE_SIZE;
use fdt::FdtError;
use log::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// The platform-supplied blob did not parse.
    DeviceTree(FdtError),
    /// The tree parsed but reported no installed RAM; there is nothing to
    /// hand to the frame allocator.
    MemorySizeUnknown,
}

/// Everything the architecture boot stub knows that the memory subsystem
/// needs: the link-time reserved arena region, the blob pointer the
/// firmware left in a register, and where the kernel image sits in RAM.
#[derive(Clone, Copy)]
pub struct BootMemoryConfig {
    pub arena_start: usize,
    pub arena_end: usize,
    pub device_tree: *const u8,
    pub ram_base: PhysicalAddress,
    pub kernel_image_base: PhysicalAddress,
    pub kernel_image_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootMemoryReport {
    pub memory_size: usize,
    pub total_frames: usize,
    pub free_frames: usize,
}

/// Brings the whole boot memory subsystem online. Called exactly once,
/// before the scheduler and before any other core runs.
///
/// # Safety
///
/// The arena region and the device-tree pointer must satisfy the contracts
/// of [`arena::init`] and [`fdt::init`] respectively, and nothing may be
/// using the global allocators concurrently.
pub unsafe fn init_memory(config: &BootMemoryConfig) -> Result<BootMemoryReport, BootError> {
    unsafe { arena::init(config.arena_start, config.arena_end) };
    unsafe { fdt::init(config.device_tree) }.map_err(BootError::DeviceTree)?;

    let memory_size = fdt::memory_size();
    if memory_size == 0 {
        return Err(BootError::MemorySizeUnknown);
    }

    allocation::init(config.ram_base, memory_size);

    // The kernel image must never be handed out; reserve whole frames.
    let image_length = config.kernel_image_size.next_multiple_of(PAGE_SIZE);
    allocation::mark_region_unusable(config.kernel_image_base, image_length);

    let (free_frames, total_frames) = allocation::statistics();
    info!(
        "boot memory online: {} bytes of ram, {}/{} frames free",
        memory_size, free_frames, total_frames
    );

    Ok(BootMemoryReport {
        memory_size,
        total_frames,
        free_frames,
    })
}
