//! Simulated virtual-memory area.

use dmabuf_addresses::DeviceAddress;
use dmabuf_engine::{MapSliceError, MappingFlags, VmMapper};

use crate::dma::SimDma;

/// One installed page-table mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedSlice {
    /// Offset into the area.
    pub mapping_offset: u64,
    /// Bus address the slice points at.
    pub device_address: DeviceAddress,
    pub len: u64,
}

/// A virtual-memory area that records what the engine maps into it instead
/// of touching page tables.
///
/// [`snapshot`](Self::snapshot) materializes the bytes the area would show
/// to user space, so tests can compare an mmap view against `read`.
pub struct SimVma {
    size: u64,
    flags: MappingFlags,
    slices: Vec<MappedSlice>,
    fail_at: Option<usize>,
}

impl SimVma {
    /// An area of `size` bytes with nothing mapped yet.
    #[must_use]
    pub fn new(size: u64) -> Self {
        Self {
            size,
            flags: MappingFlags::empty(),
            slices: Vec::new(),
            fail_at: None,
        }
    }

    /// Make the `index`-th mapping call fail.
    pub fn fail_map_at(&mut self, index: usize) {
        self.fail_at = Some(index);
    }

    #[must_use]
    pub fn flags(&self) -> MappingFlags {
        self.flags
    }

    #[must_use]
    pub fn slices(&self) -> &[MappedSlice] {
        &self.slices
    }

    /// The bytes a consumer of the area would observe.
    ///
    /// Unmapped parts read as zero.
    ///
    /// # Panics
    /// If a recorded slice no longer resolves to live simulated memory.
    #[must_use]
    pub fn snapshot(&self, dma: &SimDma) -> Vec<u8> {
        let mut view = vec![0u8; usize::try_from(self.size).expect("area fits memory")];
        for slice in &self.slices {
            let bytes = dma
                .read_device(slice.device_address, slice.len)
                .expect("mapped slice resolves to live device memory");
            let start = slice.mapping_offset as usize;
            view[start..start + bytes.len()].copy_from_slice(&bytes);
        }
        view
    }
}

impl VmMapper for SimVma {
    fn protect(&mut self, flags: MappingFlags) {
        self.flags = flags;
    }

    fn map_slice(
        &mut self,
        mapping_offset: u64,
        device_address: DeviceAddress,
        len: u64,
    ) -> Result<(), MapSliceError> {
        if self.fail_at == Some(self.slices.len()) {
            return Err(MapSliceError("simulated mapping failure"));
        }
        if mapping_offset + len > self.size {
            return Err(MapSliceError("slice outside the area"));
        }
        self.slices.push(MappedSlice {
            mapping_offset,
            device_address,
            len,
        });
        Ok(())
    }
}
