//! Offset-addressed operations: `seek`, `read`, `write`, `mmap`.
//!
//! Each operation resolves its byte range through the offset translator and
//! acts on one per-segment slice at a time, so callers never see segment
//! boundaries. All of them execute synchronously on the calling thread and
//! report per-operation failures without touching the buffer's lifetime.

use dmabuf_addresses::is_page_aligned;
use log::{debug, error, info};

use crate::buffer::DmaBuffer;
use crate::error::{CopyFault, MmapError, SeekError};
use crate::locate::locate;
use crate::platform::{CoherentAllocator, MappingFlags, TransferSink, TransferSource, VmMapper};

/// Base for a seek, mirroring the classic whence argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Absolute position from the start of the buffer.
    Set,
    /// Position relative to the end of the buffer.
    End,
    /// Position relative to the current one. Not supported by this device.
    Current,
}

impl<A: CoherentAllocator> DmaBuffer<A> {
    /// Validate a seek and return the resulting position.
    ///
    /// The position must land in `0..=total_size`; seeking exactly to the
    /// end is allowed. A pure range check, the buffer is not consulted
    /// beyond its size.
    ///
    /// # Errors
    /// [`SeekError::Unsupported`] for [`Whence::Current`],
    /// [`SeekError::OutOfRange`] when the target falls outside the buffer.
    pub fn seek(&self, whence: Whence, offset: i64) -> Result<u64, SeekError> {
        let size = self.total_size();
        let target: i128 = match whence {
            Whence::Set => i128::from(offset),
            Whence::End => i128::from(size) + i128::from(offset),
            Whence::Current => return Err(SeekError::Unsupported),
        };

        if target < 0 || target > i128::from(size) {
            error!("seek(offset = {offset:#x}, whence = {whence:?}) out of range");
            return Err(SeekError::OutOfRange { target, size });
        }
        // In 0..=size here, so the narrowing cannot truncate.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let position = target as u64;
        Ok(position)
    }

    /// Copy up to `len` bytes starting at `offset` out of the buffer.
    ///
    /// Returns the number of bytes transferred, which is clamped by the end
    /// of the buffer (zero when `offset` is at or past it). A chunk that
    /// faults aborts the remaining transfer: the bytes moved so far are
    /// still reported as success, and only a fault before the first byte is
    /// an error.
    ///
    /// # Errors
    /// [`CopyFault`] if the very first chunk faults.
    pub fn read<S>(&self, offset: u64, len: u64, sink: &mut S) -> Result<usize, CopyFault>
    where
        S: TransferSink + ?Sized,
    {
        let mut transferred = 0usize;
        for slice in locate(self.segments(), offset, len) {
            debug!("copy_out(size = {:#x})", slice.len);
            // SAFETY: the translator guarantees the range lies inside the
            // segment, whose memory is valid per the allocator contract; no
            // mutable view is created while this shared one is live.
            let chunk = unsafe { slice.segment.bytes(slice.offset, slice.len) };
            if sink.write_chunk(transferred, chunk).is_err() {
                error!("copy_out(size = {:#x}) faulted", slice.len);
                if transferred == 0 {
                    return Err(CopyFault);
                }
                break;
            }
            transferred += chunk.len();
        }
        Ok(transferred)
    }

    /// Copy up to `len` bytes from `source` into the buffer at `offset`.
    ///
    /// Same clamping, partial-transfer, and fault semantics as
    /// [`DmaBuffer::read`].
    ///
    /// # Errors
    /// [`CopyFault`] if the very first chunk faults.
    pub fn write<S>(&self, offset: u64, len: u64, source: &mut S) -> Result<usize, CopyFault>
    where
        S: TransferSource + ?Sized,
    {
        let mut transferred = 0usize;
        for slice in locate(self.segments(), offset, len) {
            debug!("copy_in(size = {:#x})", slice.len);
            // SAFETY: range is inside the segment per the translator; the
            // mutable view is the only live view of these bytes within this
            // call. Cross-handle interleaving is the documented weak
            // consistency of the buffer.
            let chunk = unsafe { slice.segment.bytes_mut(slice.offset, slice.len) };
            if source.read_chunk(transferred, chunk).is_err() {
                error!("copy_in(size = {:#x}) faulted", slice.len);
                if transferred == 0 {
                    return Err(CopyFault);
                }
                break;
            }
            transferred += chunk.len();
        }
        Ok(transferred)
    }

    /// Tile the sub-range `[page_offset, page_offset + len)` of the buffer
    /// into a virtual-memory area.
    ///
    /// The area is marked locked, IO, non-expanding, and non-cacheable, then
    /// populated with one mapping call per translated slice at the slice's
    /// device address. The first failing slice fails the whole call;
    /// unmapping the slices already installed is the host's responsibility.
    ///
    /// # Errors
    /// [`MmapError::Misaligned`] if `page_offset` is not page-aligned,
    /// [`MmapError::OutOfRange`] if the range does not fit the buffer,
    /// [`MmapError::Platform`] for a failed mapping call.
    pub fn mmap<M>(&self, mapper: &mut M, page_offset: u64, len: u64) -> Result<(), MmapError>
    where
        M: VmMapper + ?Sized,
    {
        let size = self.total_size();
        info!("page_offset = {page_offset:#x}, len = {len:#x}");

        if !is_page_aligned(page_offset) {
            return Err(MmapError::Misaligned {
                offset: page_offset,
            });
        }
        let in_range = page_offset
            .checked_add(len)
            .is_some_and(|end| end <= size);
        if !in_range {
            error!("mmap range {page_offset:#x}+{len:#x} exceeds {size:#x}");
            return Err(MmapError::OutOfRange {
                offset: page_offset,
                len,
                size,
            });
        }

        let flags = MappingFlags::LOCKED
            | MappingFlags::IO
            | MappingFlags::DONT_EXPAND
            | MappingFlags::NON_CACHED;
        debug!("protect(flags = {flags})");
        mapper.protect(flags);

        let mut mapping_offset = 0;
        for slice in locate(self.segments(), page_offset, len) {
            let device_address = slice.segment.device_address() + slice.offset;
            debug!(
                "map_slice(device_address = {device_address}, size = {:#x})",
                slice.len
            );
            if let Err(err) = mapper.map_slice(mapping_offset, device_address, slice.len) {
                error!(
                    "map_slice(device_address = {device_address}, size = {:#x}): {err}",
                    slice.len
                );
                return Err(err.into());
            }
            mapping_offset += slice.len;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{CoherentAllocError, DmaAllocation};
    use core::cell::RefCell;
    use core::ptr::NonNull;
    use dmabuf_addresses::{DeviceAddress, PAGE_SIZE};

    /// Backs allocations with real heap memory so read/write can copy.
    struct HeapDma {
        max_contiguous: u64,
        live: RefCell<Vec<(u64, usize)>>,
    }

    impl HeapDma {
        fn new(max_contiguous: u64) -> Self {
            Self {
                max_contiguous,
                live: RefCell::new(Vec::new()),
            }
        }
    }

    unsafe impl CoherentAllocator for HeapDma {
        fn alloc_coherent(&self, size: u64) -> Result<DmaAllocation, CoherentAllocError> {
            let granted = size.min(self.max_contiguous) as usize;
            let block: Box<[u8]> = vec![0u8; granted].into_boxed_slice();
            let ptr = Box::into_raw(block).cast::<u8>();
            let device_address = DeviceAddress::new(ptr as u64);
            self.live.borrow_mut().push((ptr as u64, granted));
            Ok(DmaAllocation {
                size: granted as u64,
                cpu: NonNull::new(ptr).ok_or(CoherentAllocError { size })?,
                device_address,
            })
        }

        fn free_coherent(&self, allocation: DmaAllocation) {
            let ptr = allocation.cpu.as_ptr();
            self.live
                .borrow_mut()
                .retain(|&(addr, _)| addr != ptr as u64);
            // SAFETY: pointer and length are exactly what alloc_coherent
            // leaked above.
            drop(unsafe {
                Box::from_raw(core::ptr::slice_from_raw_parts_mut(
                    ptr,
                    allocation.size as usize,
                ))
            });
        }
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    #[test]
    fn roundtrip_within_one_segment() {
        let dma = HeapDma::new(4 * PAGE_SIZE);
        let buffer = DmaBuffer::alloc(&dma, 4 * PAGE_SIZE).unwrap();

        let mut data = pattern(64, 7);
        assert_eq!(buffer.write(128, 64, &mut data[..]).unwrap(), 64);

        let mut out = vec![0u8; 64];
        assert_eq!(buffer.read(128, 64, &mut out[..]).unwrap(), 64);
        assert_eq!(out, data);
    }

    #[test]
    fn roundtrip_across_segment_boundaries() {
        let dma = HeapDma::new(PAGE_SIZE);
        let buffer = DmaBuffer::alloc(&dma, 4 * PAGE_SIZE).unwrap();
        assert_eq!(buffer.segment_count(), 4);

        // Spans three boundaries.
        let len = (2 * PAGE_SIZE + 512) as usize;
        let offset = PAGE_SIZE - 256;
        let mut data = pattern(len, 3);
        assert_eq!(buffer.write(offset, len as u64, &mut data[..]).unwrap(), len);

        let mut out = vec![0u8; len];
        assert_eq!(buffer.read(offset, len as u64, &mut out[..]).unwrap(), len);
        assert_eq!(out, data);
    }

    #[test]
    fn read_clamps_at_end_of_buffer() {
        let dma = HeapDma::new(PAGE_SIZE);
        let buffer = DmaBuffer::alloc(&dma, 2 * PAGE_SIZE).unwrap();

        let mut out = vec![0u8; 4096];
        let n = buffer
            .read(2 * PAGE_SIZE - 100, 4096, &mut out[..])
            .unwrap();
        assert_eq!(n, 100);

        assert_eq!(buffer.read(2 * PAGE_SIZE, 4096, &mut out[..]).unwrap(), 0);
    }

    #[test]
    fn seek_bounds() {
        let dma = HeapDma::new(PAGE_SIZE);
        let buffer = DmaBuffer::alloc(&dma, 2 * PAGE_SIZE).unwrap();
        let size = buffer.total_size();

        assert_eq!(buffer.seek(Whence::Set, 0).unwrap(), 0);
        assert_eq!(buffer.seek(Whence::Set, size as i64).unwrap(), size);
        assert_eq!(buffer.seek(Whence::End, 0).unwrap(), size);
        assert_eq!(buffer.seek(Whence::End, -(size as i64)).unwrap(), 0);

        assert!(matches!(
            buffer.seek(Whence::Set, size as i64 + 1),
            Err(SeekError::OutOfRange { .. })
        ));
        assert!(matches!(
            buffer.seek(Whence::End, -(size as i64) - 1),
            Err(SeekError::OutOfRange { .. })
        ));
        assert!(matches!(
            buffer.seek(Whence::Set, -1),
            Err(SeekError::OutOfRange { .. })
        ));
        assert_eq!(buffer.seek(Whence::Current, 0), Err(SeekError::Unsupported));
    }

    /// Sink that faults from the `fail_from`-th chunk onwards.
    struct FaultingSink {
        received: Vec<u8>,
        chunks: usize,
        fail_from: usize,
    }

    impl TransferSink for FaultingSink {
        fn write_chunk(&mut self, _at: usize, chunk: &[u8]) -> Result<(), CopyFault> {
            if self.chunks >= self.fail_from {
                return Err(CopyFault);
            }
            self.chunks += 1;
            self.received.extend_from_slice(chunk);
            Ok(())
        }
    }

    #[test]
    fn fault_after_prefix_reports_prefix_length() {
        let dma = HeapDma::new(PAGE_SIZE);
        let buffer = DmaBuffer::alloc(&dma, 3 * PAGE_SIZE).unwrap();

        let mut sink = FaultingSink {
            received: Vec::new(),
            chunks: 0,
            fail_from: 2,
        };
        let n = buffer.read(0, 3 * PAGE_SIZE, &mut sink).unwrap();
        assert_eq!(n, 2 * PAGE_SIZE as usize);
        assert_eq!(sink.received.len(), n);
    }

    #[test]
    fn immediate_fault_is_an_error() {
        let dma = HeapDma::new(PAGE_SIZE);
        let buffer = DmaBuffer::alloc(&dma, PAGE_SIZE).unwrap();

        let mut sink = FaultingSink {
            received: Vec::new(),
            chunks: 0,
            fail_from: 0,
        };
        assert_eq!(buffer.read(0, PAGE_SIZE, &mut sink), Err(CopyFault));
    }

    /// Records protection flags and mapped slices.
    #[derive(Default)]
    struct RecordingVma {
        flags: MappingFlags,
        slices: Vec<(u64, DeviceAddress, u64)>,
        fail_at: Option<usize>,
    }

    impl VmMapper for RecordingVma {
        fn protect(&mut self, flags: MappingFlags) {
            self.flags = flags;
        }

        fn map_slice(
            &mut self,
            mapping_offset: u64,
            device_address: DeviceAddress,
            len: u64,
        ) -> Result<(), crate::platform::MapSliceError> {
            if self.fail_at == Some(self.slices.len()) {
                return Err(crate::platform::MapSliceError("injected"));
            }
            self.slices.push((mapping_offset, device_address, len));
            Ok(())
        }
    }

    #[test]
    fn mmap_tiles_the_whole_buffer() {
        let dma = HeapDma::new(PAGE_SIZE);
        let buffer = DmaBuffer::alloc(&dma, 3 * PAGE_SIZE).unwrap();

        let mut vma = RecordingVma::default();
        buffer.mmap(&mut vma, 0, buffer.total_size()).unwrap();

        assert!(vma.flags.contains(
            MappingFlags::LOCKED
                | MappingFlags::IO
                | MappingFlags::DONT_EXPAND
                | MappingFlags::NON_CACHED
        ));
        assert_eq!(vma.slices.len(), 3);
        assert_eq!(vma.slices[0].0, 0);
        assert_eq!(vma.slices[1].0, PAGE_SIZE);
        assert_eq!(vma.slices[2].0, 2 * PAGE_SIZE);
        let mapped: u64 = vma.slices.iter().map(|s| s.2).sum();
        assert_eq!(mapped, buffer.total_size());
    }

    #[test]
    fn mmap_subrange_starts_mid_buffer() {
        let dma = HeapDma::new(2 * PAGE_SIZE);
        let buffer = DmaBuffer::alloc(&dma, 4 * PAGE_SIZE).unwrap();

        let mut vma = RecordingVma::default();
        buffer.mmap(&mut vma, PAGE_SIZE, 2 * PAGE_SIZE).unwrap();

        let mapped: u64 = vma.slices.iter().map(|s| s.2).sum();
        assert_eq!(mapped, 2 * PAGE_SIZE);
        // Offsets into the area are dense starting at zero.
        assert_eq!(vma.slices[0].0, 0);
    }

    #[test]
    fn mmap_rejects_misaligned_offset_and_bad_range() {
        let dma = HeapDma::new(PAGE_SIZE);
        let buffer = DmaBuffer::alloc(&dma, 2 * PAGE_SIZE).unwrap();
        let mut vma = RecordingVma::default();

        assert!(matches!(
            buffer.mmap(&mut vma, 123, PAGE_SIZE),
            Err(MmapError::Misaligned { .. })
        ));
        assert!(matches!(
            buffer.mmap(&mut vma, 0, 2 * PAGE_SIZE + 1),
            Err(MmapError::OutOfRange { .. })
        ));
        assert!(matches!(
            buffer.mmap(&mut vma, PAGE_SIZE, u64::MAX),
            Err(MmapError::OutOfRange { .. })
        ));
        assert!(vma.slices.is_empty());
    }

    #[test]
    fn mmap_fails_whole_call_on_slice_failure() {
        let dma = HeapDma::new(PAGE_SIZE);
        let buffer = DmaBuffer::alloc(&dma, 3 * PAGE_SIZE).unwrap();

        let mut vma = RecordingVma {
            fail_at: Some(1),
            ..RecordingVma::default()
        };
        assert!(matches!(
            buffer.mmap(&mut vma, 0, buffer.total_size()),
            Err(MmapError::Platform(_))
        ));
        // The first slice had been installed before the failure.
        assert_eq!(vma.slices.len(), 1);
    }
}
