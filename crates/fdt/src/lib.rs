//! Flattened Device Tree parser for early boot.
//!
//! The blob handed over by the platform firmware is parsed once, into node
//! and property tables that live in the eternal arena; names and values stay
//! borrowed from the blob and are never copied. After that the tree is a
//! read-only query target, most notably for the amount of installed RAM.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(any(test, feature = "std"))]
extern crate std;

mod header;
mod tokens;
mod tree;

pub use header::FdtHeader;
pub use tree::{DeviceTree, FdtNode, FdtProperty, NodeId, PropId};

use hermit_sync::SpinMutex;
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdtError {
    /// The magic field does not match [`FdtHeader::MAGIC`].
    BadMagic(u32),
    /// A read ran past the end of the blob or of one of its blocks.
    Truncated,
    /// The struct block contains a token this parser does not know.
    /// Scanning stops hard rather than guessing at the encoding.
    UnrecognizedToken(u32),
    /// A node or property name is not NUL-terminated UTF-8.
    MalformedName,
    /// The BEGIN/END tokens do not describe a single rooted tree.
    UnbalancedTree,
}

static DEVICE_TREE: SpinMutex<Option<DeviceTree>> = SpinMutex::new(None);

/// Parses the platform-supplied blob into the global device tree, taking
/// node and property storage from the global arena. Fails without touching
/// any global state if the blob does not validate.
///
/// # Safety
///
/// `blob` must point to a complete FDT image: readable for the header, then
/// for the total size the header declares, and mapped for the rest of
/// execution.
pub unsafe fn init(blob: *const u8) -> Result<(), FdtError> {
    let header_bytes = unsafe { core::slice::from_raw_parts(blob, FdtHeader::SIZE) };
    let header = FdtHeader::read(header_bytes)?;

    let blob = unsafe { core::slice::from_raw_parts(blob, header.totalsize as usize) };
    let tree = arena::with(|arena| DeviceTree::parse(blob, arena))?;
    debug!("device tree parsed: {} bytes", blob.len());

    *DEVICE_TREE.lock() = Some(tree);
    Ok(())
}

/// Installed RAM in bytes as reported by the global device tree, or 0 when
/// no tree has been parsed or it has no usable memory node.
pub fn memory_size() -> usize {
    DEVICE_TREE.lock().as_ref().map_or(0, DeviceTree::memory_size)
}
