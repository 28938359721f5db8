//! Failure surfaces of the buffer engine.
//!
//! Construction failures ([`AllocError`]) always leave nothing acquired; the
//! per-operation errors ([`SeekError`], [`MmapError`], [`CopyFault`]) are
//! reported to the caller and never tear the buffer down.

use crate::platform::MapSliceError;

pub use crate::platform::CopyFault;

/// Buffer construction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    /// The requested size is zero or not page-aligned.
    #[error("invalid buffer size {size:#x}: must be a positive page multiple")]
    InvalidArgument { size: u64 },
    /// Bookkeeping allocation failed.
    #[error("out of memory for buffer bookkeeping")]
    OutOfMemory,
    /// The platform could not deliver even a single page.
    #[error("device memory exhausted with {remaining:#x} bytes still missing")]
    Exhausted { remaining: u64 },
}

/// Seek validation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SeekError {
    /// The seek mode is not supported by the device.
    #[error("unsupported seek mode")]
    Unsupported,
    /// The resulting position would fall outside `0..=total_size`.
    #[error("seek target {target} outside buffer of {size:#x} bytes")]
    OutOfRange { target: i128, size: u64 },
}

/// Mapping the buffer into a virtual-memory area failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MmapError {
    /// The mapping offset is not page-aligned.
    #[error("mapping offset {offset:#x} is not page-aligned")]
    Misaligned { offset: u64 },
    /// The requested range does not fit inside the buffer.
    #[error("mapped range {offset:#x}+{len:#x} exceeds buffer of {size:#x} bytes")]
    OutOfRange { offset: u64, len: u64, size: u64 },
    /// A page-table mapping call failed; already-mapped slices are the
    /// host's to unwind.
    #[error(transparent)]
    Platform(#[from] MapSliceError),
}
