//! Trait seams towards the host platform.
//!
//! The engine itself never talks to hardware or to a kernel: it acquires
//! device-coherent memory through [`CoherentAllocator`], installs page-table
//! mappings through [`VmMapper`], and moves bytes across the privilege
//! boundary through [`TransferSink`]/[`TransferSource`]. A host environment
//! implements these three seams; everything else in the crate is portable.

use core::fmt;
use core::ptr::NonNull;

use dmabuf_addresses::DeviceAddress;

/// One platform allocation of device-coherent memory.
///
/// The same tuple that is handed out by [`CoherentAllocator::alloc_coherent`]
/// must be returned, exactly once, to [`CoherentAllocator::free_coherent`].
#[derive(Debug)]
pub struct DmaAllocation {
    /// Size in bytes. A positive multiple of the page size.
    pub size: u64,
    /// CPU-side pointer to the start of the allocation.
    pub cpu: NonNull<u8>,
    /// The address a bus-mastering device uses to reach the same bytes.
    pub device_address: DeviceAddress,
}

/// Failure of a single coherent allocation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("coherent allocation of {size:#x} bytes failed")]
pub struct CoherentAllocError {
    /// The size that was requested.
    pub size: u64,
}

/// Source of device-coherent memory. Page-size granular.
///
/// The platform may hand out **fewer** bytes than requested when it cannot
/// find a contiguous run of the requested length, but never zero and never
/// more than asked for.
///
/// # Safety
///
/// Implementors guarantee that, for every successful allocation:
/// - `cpu` is valid for reads and writes of `size` bytes, exclusively owned
///   by the caller, until the allocation is passed back to `free_coherent`;
/// - `size` is a positive page multiple no larger than the request;
/// - the memory at `device_address` is coherent with CPU accesses through
///   `cpu` (no caching surprises for a device reading it).
pub unsafe trait CoherentAllocator {
    /// Acquire up to `size` bytes of device-coherent memory.
    ///
    /// # Errors
    /// [`CoherentAllocError`] when the platform cannot satisfy the request
    /// at all; partial grants are returned as success.
    fn alloc_coherent(&self, size: u64) -> Result<DmaAllocation, CoherentAllocError>;

    /// Release an allocation previously returned by [`Self::alloc_coherent`].
    fn free_coherent(&self, allocation: DmaAllocation);
}

// SAFETY: delegation preserves the implementor's guarantees.
unsafe impl<A: CoherentAllocator + ?Sized> CoherentAllocator for &A {
    fn alloc_coherent(&self, size: u64) -> Result<DmaAllocation, CoherentAllocError> {
        (**self).alloc_coherent(size)
    }

    fn free_coherent(&self, allocation: DmaAllocation) {
        (**self).free_coherent(allocation);
    }
}

bitflags::bitflags! {
    /// Properties the host must apply to a virtual-memory area that maps
    /// device-coherent memory.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MappingFlags: u32 {
        /// Pages are locked against swap-out.
        const LOCKED = 1 << 0;
        /// The area maps device memory, not anonymous RAM.
        const IO = 1 << 1;
        /// The area must never grow.
        const DONT_EXPAND = 1 << 2;
        /// Accesses bypass the CPU cache (device-coherent).
        const NON_CACHED = 1 << 3;
    }
}

/// Failure of a single page-table mapping call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("page-table mapping failed: {0}")]
pub struct MapSliceError(pub &'static str);

/// A virtual-memory area being populated by `mmap`.
///
/// The engine tiles the requested range with one [`map_slice`] call per
/// buffer slice; offsets are relative to the start of the area. Unwinding
/// slices that were already mapped when a later one fails is the host's
/// responsibility.
///
/// [`map_slice`]: VmMapper::map_slice
pub trait VmMapper {
    /// Apply area-wide protection flags. Called once, before any slice.
    fn protect(&mut self, flags: MappingFlags);

    /// Map `len` bytes of the area, starting `mapping_offset` bytes into it,
    /// onto the device-visible memory at `device_address`.
    ///
    /// # Errors
    /// [`MapSliceError`] when the mapping cannot be installed.
    fn map_slice(
        &mut self,
        mapping_offset: u64,
        device_address: DeviceAddress,
        len: u64,
    ) -> Result<(), MapSliceError>;
}

/// A cross-privilege copy failed before any byte of the chunk was moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cross-privilege copy faulted")]
pub struct CopyFault;

/// Destination for bytes leaving the buffer (the consumer side of `read`).
///
/// `at` is the running offset into the destination, i.e. the number of bytes
/// already transferred by the current call.
pub trait TransferSink {
    /// Deliver `chunk` at destination offset `at`.
    ///
    /// # Errors
    /// [`CopyFault`] when the destination cannot take the chunk; no byte of
    /// the chunk may have been delivered in that case.
    fn write_chunk(&mut self, at: usize, chunk: &[u8]) -> Result<(), CopyFault>;
}

/// Source of bytes entering the buffer (the producer side of `write`).
pub trait TransferSource {
    /// Fill `out` from source offset `at`.
    ///
    /// # Errors
    /// [`CopyFault`] when the source cannot produce the chunk.
    fn read_chunk(&mut self, at: usize, out: &mut [u8]) -> Result<(), CopyFault>;
}

// In-privilege byte slices never fault; a short destination reads as one.
impl TransferSink for [u8] {
    fn write_chunk(&mut self, at: usize, chunk: &[u8]) -> Result<(), CopyFault> {
        let end = at.checked_add(chunk.len()).ok_or(CopyFault)?;
        let dst = self.get_mut(at..end).ok_or(CopyFault)?;
        dst.copy_from_slice(chunk);
        Ok(())
    }
}

impl TransferSource for [u8] {
    fn read_chunk(&mut self, at: usize, out: &mut [u8]) -> Result<(), CopyFault> {
        let end = at.checked_add(out.len()).ok_or(CopyFault)?;
        let src = self.get(at..end).ok_or(CopyFault)?;
        out.copy_from_slice(src);
        Ok(())
    }
}

impl fmt::Display for MappingFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        bitflags::parser::to_writer(self, f)
    }
}
