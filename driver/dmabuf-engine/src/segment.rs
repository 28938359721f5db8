//! One hardware-visible memory segment and the decaying acquisition loop.

use core::ptr::NonNull;

use dmabuf_addresses::{DeviceAddress, PAGE_SIZE, align_down, is_page_aligned};
use log::{debug, error};

use crate::error::AllocError;
use crate::platform::{CoherentAllocator, DmaAllocation};

/// Segment size the allocator asks for first (1024 pages).
pub const PREFERRED_SEGMENT_SIZE: u64 = PAGE_SIZE << 10;

/// One contiguous chunk of device-coherent memory, owned by exactly one
/// buffer. Created by [`acquire`], destroyed by handing it back to the
/// allocator via [`Segment::into_allocation`].
pub(crate) struct Segment {
    size: u64,
    cpu: NonNull<u8>,
    device_address: DeviceAddress,
}

impl Segment {
    #[inline]
    pub(crate) const fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub(crate) const fn device_address(&self) -> DeviceAddress {
        self.device_address
    }

    /// Give the backing memory back for release.
    pub(crate) fn into_allocation(self) -> DmaAllocation {
        DmaAllocation {
            size: self.size,
            cpu: self.cpu,
            device_address: self.device_address,
        }
    }

    /// Borrow `len` bytes starting `offset` bytes into the segment.
    ///
    /// # Safety
    /// `offset + len <= size`, and no `&mut` view of the same range may be
    /// live. The memory itself is valid per the [`CoherentAllocator`]
    /// contract for as long as the segment exists.
    #[allow(clippy::cast_possible_truncation)] // segment sizes fit host usize
    pub(crate) unsafe fn bytes(&self, offset: u64, len: u64) -> &[u8] {
        debug_assert!(offset + len <= self.size);
        unsafe { core::slice::from_raw_parts(self.cpu.as_ptr().add(offset as usize), len as usize) }
    }

    /// Mutably borrow `len` bytes starting `offset` bytes into the segment.
    ///
    /// # Safety
    /// `offset + len <= size`, and no other view of the same range may be
    /// live for the duration of the borrow.
    #[allow(clippy::mut_from_ref, clippy::cast_possible_truncation)]
    pub(crate) unsafe fn bytes_mut(&self, offset: u64, len: u64) -> &mut [u8] {
        debug_assert!(offset + len <= self.size);
        unsafe {
            core::slice::from_raw_parts_mut(self.cpu.as_ptr().add(offset as usize), len as usize)
        }
    }

    #[cfg(test)]
    pub(crate) const fn for_test(size: u64, device_address: DeviceAddress) -> Self {
        Self {
            size,
            cpu: NonNull::dangling(),
            device_address,
        }
    }
}

/// Acquire one segment covering at most `remaining` bytes.
///
/// `hint` is the decayed request size carried across one buffer
/// construction: it starts at [`PREFERRED_SEGMENT_SIZE`] and is halved (page
/// aligned) each time the platform refuses, down to a floor of one page.
/// Once the platform has refused a size there is no point asking for it
/// again for the same buffer, so the decay persists via `hint`.
pub(crate) fn acquire<A: CoherentAllocator>(
    allocator: &A,
    remaining: u64,
    hint: &mut u64,
) -> Result<Segment, AllocError> {
    debug_assert!(remaining > 0 && is_page_aligned(remaining));

    let mut request = (*hint).min(remaining);
    loop {
        debug!("alloc_coherent(size = {request:#x})");
        match allocator.alloc_coherent(request) {
            Ok(allocation) => {
                debug_assert!(
                    allocation.size > 0
                        && allocation.size <= request
                        && is_page_aligned(allocation.size),
                    "platform violated the coherent-allocation contract"
                );
                *hint = request;
                return Ok(Segment {
                    size: allocation.size,
                    cpu: allocation.cpu,
                    device_address: allocation.device_address,
                });
            }
            Err(err) => {
                if request > PAGE_SIZE {
                    request = align_down(request / 2).max(PAGE_SIZE);
                    continue;
                }
                error!("alloc_coherent(size = {request:#x}): {err}");
                return Err(AllocError::Exhausted { remaining });
            }
        }
    }
}
