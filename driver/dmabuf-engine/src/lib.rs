//! # Segmented DMA Buffer Engine
//!
//! Exposes a large block of device-visible memory as one linearly
//! addressable resource, even though the platform can only hand it out in
//! bounded, possibly non-contiguous physical segments.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               DmaBuffer (public façade)             │
//! │    • alloc / drop (free)                            │
//! │    • seek / read / write / mmap                     │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │               Offset Translator                     │
//! │    • logical range → per-segment slices             │
//! │    • insertion order, lazy, restartable             │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │            Segment Allocator                        │
//! │    • preferred size with geometric decay            │
//! │    • one-page floor, capped at bytes missing        │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │        Platform seams (host-provided)               │
//! │    • CoherentAllocator: raw device memory           │
//! │    • VmMapper: page-table mapping of an area        │
//! │    • TransferSink/Source: cross-privilege copies    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core behavior
//!
//! - [`DmaBuffer::alloc`] appends segments until the requested size is met
//!   exactly, decaying the per-segment request geometrically under
//!   allocation pressure; any failure releases everything acquired so far.
//! - [`DmaBuffer::read`]/[`DmaBuffer::write`] copy through the translator
//!   slice by slice with partial-transfer semantics on faults.
//! - [`DmaBuffer::mmap`] tiles a page-aligned sub-range across the same
//!   slices, one mapping call per slice, non-cacheable and locked.
//! - [`DmaBuffer::contiguous_runs`] merges address-adjacent segments for
//!   diagnostics; it never influences logical offsets.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dmabuf_engine::DmaBuffer;
//!
//! let buffer = DmaBuffer::alloc(platform_allocator, 10 * dmabuf_engine::PAGE_SIZE)?;
//! let mut ping = *b"ping";
//! buffer.write(0, 4, &mut ping[..])?;
//! let mut out = [0u8; 4];
//! buffer.read(0, 4, &mut out[..])?;
//! ```
//!
//! There is no internal locking and no blocking: every operation completes
//! or fails synchronously on the calling thread. Serializing competing
//! operations on one open handle is the host's job.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod buffer;
mod error;
mod locate;
mod ops;
mod platform;
mod segment;

pub use buffer::{DmaBuffer, DmaRun};
pub use error::{AllocError, CopyFault, MmapError, SeekError};
pub use ops::Whence;
pub use platform::{
    CoherentAllocError, CoherentAllocator, DmaAllocation, MapSliceError, MappingFlags,
    TransferSink, TransferSource, VmMapper,
};
pub use segment::PREFERRED_SEGMENT_SIZE;

pub use dmabuf_addresses::{DeviceAddress, PAGE_SHIFT, PAGE_SIZE};
