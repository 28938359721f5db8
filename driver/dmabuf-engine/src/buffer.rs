//! The segmented DMA buffer: construction, teardown, and run reporting.

use alloc::vec::Vec;

use dmabuf_addresses::{DeviceAddress, is_page_aligned};
use log::{debug, error, info};

use crate::error::AllocError;
use crate::platform::CoherentAllocator;
use crate::segment::{PREFERRED_SEGMENT_SIZE, Segment, acquire};

/// A maximal run of segments whose device addresses are arithmetically
/// contiguous. Reporting/diagnostic output only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaRun {
    pub device_address: DeviceAddress,
    pub size: u64,
}

/// A block of device-visible memory exposed as one linearly addressable
/// resource, backed by possibly many non-contiguous segments.
///
/// The segment list is fixed after construction and kept in **insertion
/// order**; logical byte offsets are resolved against that order, so they
/// are stable and deterministic for the lifetime of the buffer regardless of
/// where the platform placed each segment. Address-ordered views exist only
/// inside [`DmaBuffer::contiguous_runs`].
///
/// Dropping the buffer releases every segment back to the allocator. A
/// partially constructed buffer (failed `alloc`) releases exactly the
/// segments it had acquired.
///
/// # Concurrency
///
/// The engine performs no locking of its own. `read`, `write` and `mmap`
/// take `&self` and may be invoked from several open handles; concurrent
/// writers may interleave at slice granularity. That weak consistency is the
/// documented contract, with serialization left to the host environment.
pub struct DmaBuffer<A: CoherentAllocator> {
    allocator: A,
    total_size: u64,
    segments: Vec<Segment>,
}

impl<A: CoherentAllocator> DmaBuffer<A> {
    /// Build a buffer of exactly `size` bytes.
    ///
    /// Segments are appended until the target is met; each request is capped
    /// at the bytes still missing, so on success `total_size() == size`.
    ///
    /// # Errors
    /// - [`AllocError::InvalidArgument`] if `size` is zero or not
    ///   page-aligned; nothing is acquired.
    /// - [`AllocError::OutOfMemory`] if list bookkeeping fails.
    /// - [`AllocError::Exhausted`] if the platform refuses even a single
    ///   page. Everything acquired so far is released before returning.
    pub fn alloc(allocator: A, size: u64) -> Result<Self, AllocError> {
        info!("size = {size:#x}");

        if size == 0 || !is_page_aligned(size) {
            error!("invalid size {size:#x}");
            return Err(AllocError::InvalidArgument { size });
        }

        // From here on `buffer` owns every acquired segment; any early
        // return drops it and releases them.
        let mut buffer = Self {
            allocator,
            total_size: 0,
            segments: Vec::new(),
        };

        let mut hint = PREFERRED_SEGMENT_SIZE;
        while buffer.total_size < size {
            if buffer.segments.try_reserve(1).is_err() {
                error!("segment bookkeeping: out of memory");
                return Err(AllocError::OutOfMemory);
            }
            let segment = acquire(&buffer.allocator, size - buffer.total_size, &mut hint)?;
            buffer.total_size += segment.size();
            buffer.segments.push(segment);
        }

        buffer.report();
        Ok(buffer)
    }

    /// Total buffer size in bytes; the sum of all segment sizes.
    #[inline]
    #[must_use]
    pub const fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Number of backing segments.
    #[inline]
    #[must_use]
    pub const fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub(crate) fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Merge segments whose device addresses form unbroken runs.
    ///
    /// Works on a stable address-sorted view of the list; the list itself is
    /// not reordered. The result describes how few contiguous ranges a
    /// device would need to cover the whole buffer.
    #[must_use]
    pub fn contiguous_runs(&self) -> Vec<DmaRun> {
        let mut order: Vec<usize> = (0..self.segments.len()).collect();
        order.sort_by_key(|&i| self.segments[i].device_address());

        let mut runs: Vec<DmaRun> = Vec::new();
        for &i in &order {
            let segment = &self.segments[i];
            match runs.last_mut() {
                Some(run)
                    if run.device_address.checked_add(run.size)
                        == Some(segment.device_address()) =>
                {
                    run.size += segment.size();
                }
                _ => runs.push(DmaRun {
                    device_address: segment.device_address(),
                    size: segment.size(),
                }),
            }
        }
        runs
    }

    fn report(&self) {
        for run in self.contiguous_runs() {
            info!(
                "device_address = {}, size = {:#x}",
                run.device_address, run.size
            );
        }
    }
}

impl<A: CoherentAllocator> Drop for DmaBuffer<A> {
    fn drop(&mut self) {
        info!("size = {:#x}", self.total_size);
        for segment in self.segments.drain(..) {
            debug!(
                "free_coherent(device_address = {}, size = {:#x})",
                segment.device_address(),
                segment.size()
            );
            self.allocator.free_coherent(segment.into_allocation());
        }
    }
}
