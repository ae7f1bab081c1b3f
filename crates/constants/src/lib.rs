#![no_std]

pub const PAGE_SIZE: usize = 4096;
pub const PAGE_SIZE_BITS: usize = 0xc;

/// Base of physical RAM on the qemu-virt machine. The device tree names its
/// memory node after this address.
pub const RAM_BASE: usize = 0x8000_0000;
