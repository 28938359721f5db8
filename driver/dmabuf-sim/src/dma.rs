//! Simulated coherent-memory allocator.

use std::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};
use std::cell::RefCell;
use std::ptr::NonNull;
use std::rc::Rc;

use dmabuf_addresses::{DeviceAddress, PAGE_SIZE, is_page_aligned};
use dmabuf_engine::{CoherentAllocError, CoherentAllocator, DmaAllocation};
use log::debug;

struct LiveAlloc {
    device_address: u64,
    size: usize,
    ptr: *mut u8,
}

struct State {
    max_contiguous: u64,
    address_gap: u64,
    fail_over: Option<u64>,
    fail_after: Option<u32>,
    next_address: u64,
    attempts: u32,
    grants: u32,
    outstanding: u64,
    total_allocated: u64,
    total_freed: u64,
    live: Vec<LiveAlloc>,
}

impl Drop for State {
    fn drop(&mut self) {
        // Reclaim whatever a failing test left behind.
        for entry in self.live.drain(..) {
            // SAFETY: allocated below with the same layout.
            unsafe { dealloc(entry.ptr, page_layout(entry.size)) };
        }
    }
}

fn page_layout(size: usize) -> Layout {
    Layout::from_size_align(size, PAGE_SIZE as usize).expect("page layout")
}

/// Cloneable handle to a simulated platform memory pool.
///
/// Backs every grant with real page-aligned heap memory while handing out
/// fake bus addresses from a bump counter, so the coherent-allocation
/// contract can be exercised (and violated on demand) from tests:
///
/// - [`set_max_contiguous`](Self::set_max_contiguous) bounds how much one
///   grant may deliver, forcing multi-segment buffers;
/// - [`fail_requests_over`](Self::fail_requests_over) refuses large
///   requests, driving the engine's geometric decay;
/// - [`fail_after_grants`](Self::fail_after_grants) cuts the pool off after
///   a number of successful grants, driving rollback paths;
/// - [`set_address_gap`](Self::set_address_gap) punches holes between the
///   bus addresses of consecutive grants, splitting the coalescing report.
#[derive(Clone)]
pub struct SimDma {
    state: Rc<RefCell<State>>,
}

impl Default for SimDma {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDma {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                max_contiguous: u64::MAX,
                address_gap: 0,
                fail_over: None,
                fail_after: None,
                next_address: 0x1000_0000,
                attempts: 0,
                grants: 0,
                outstanding: 0,
                total_allocated: 0,
                total_freed: 0,
                live: Vec::new(),
            })),
        }
    }

    /// Largest contiguous grant the pool will deliver.
    ///
    /// # Panics
    /// If `bytes` is not a positive page multiple.
    pub fn set_max_contiguous(&self, bytes: u64) {
        assert!(bytes >= PAGE_SIZE && is_page_aligned(bytes));
        self.state.borrow_mut().max_contiguous = bytes;
    }

    /// Refuse outright any request larger than `bytes`.
    pub fn fail_requests_over(&self, bytes: u64) {
        self.state.borrow_mut().fail_over = Some(bytes);
    }

    /// Refuse every request once `grants` grants have succeeded.
    pub fn fail_after_grants(&self, grants: u32) {
        self.state.borrow_mut().fail_after = Some(grants);
    }

    /// Insert a hole of `bytes` between consecutive bus addresses.
    pub fn set_address_gap(&self, bytes: u64) {
        self.state.borrow_mut().address_gap = bytes;
    }

    /// Bytes currently allocated and not yet freed.
    #[must_use]
    pub fn outstanding_bytes(&self) -> u64 {
        self.state.borrow().outstanding
    }

    #[must_use]
    pub fn total_allocated(&self) -> u64 {
        self.state.borrow().total_allocated
    }

    #[must_use]
    pub fn total_freed(&self) -> u64 {
        self.state.borrow().total_freed
    }

    /// Allocation attempts seen, including refused ones.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.state.borrow().attempts
    }

    /// Copy `len` bytes of simulated device memory at `device_address`.
    ///
    /// Returns `None` when the range is not covered by a single live grant,
    /// which for engine-produced slices would indicate a bookkeeping bug.
    #[must_use]
    pub fn read_device(&self, device_address: DeviceAddress, len: u64) -> Option<Vec<u8>> {
        let state = self.state.borrow();
        let start = device_address.as_u64();
        let entry = state.live.iter().find(|e| {
            start >= e.device_address && start + len <= e.device_address + e.size as u64
        })?;
        let delta = (start - entry.device_address) as usize;
        let mut out = vec![0u8; len as usize];
        // SAFETY: range checked against the live grant above.
        unsafe {
            std::ptr::copy_nonoverlapping(entry.ptr.add(delta), out.as_mut_ptr(), len as usize);
        }
        Some(out)
    }
}

// SAFETY: grants are page-aligned heap blocks, exclusively owned by the
// caller until returned, and trivially CPU-coherent.
unsafe impl CoherentAllocator for SimDma {
    fn alloc_coherent(&self, size: u64) -> Result<DmaAllocation, CoherentAllocError> {
        let mut state = self.state.borrow_mut();
        state.attempts += 1;

        if state.fail_after.is_some_and(|n| state.grants >= n)
            || state.fail_over.is_some_and(|limit| size > limit)
        {
            return Err(CoherentAllocError { size });
        }

        let granted = size.min(state.max_contiguous);
        let layout = page_layout(granted as usize);
        // SAFETY: layout has non-zero size (size >= one page).
        let ptr = unsafe { alloc_zeroed(layout) };
        let Some(cpu) = NonNull::new(ptr) else {
            handle_alloc_error(layout)
        };

        let device_address = state.next_address;
        state.next_address += granted + state.address_gap;
        state.grants += 1;
        state.outstanding += granted;
        state.total_allocated += granted;
        state.live.push(LiveAlloc {
            device_address,
            size: granted as usize,
            ptr,
        });

        debug!("sim grant: device_address = {device_address:#x}, size = {granted:#x}");
        Ok(DmaAllocation {
            size: granted,
            cpu,
            device_address: DeviceAddress::new(device_address),
        })
    }

    fn free_coherent(&self, allocation: DmaAllocation) {
        let mut state = self.state.borrow_mut();
        let key = allocation.device_address.as_u64();
        let index = state
            .live
            .iter()
            .position(|e| e.device_address == key && e.size as u64 == allocation.size)
            .expect("free_coherent of unknown allocation");
        let entry = state.live.swap_remove(index);
        // SAFETY: allocated in alloc_coherent with the same layout.
        unsafe { dealloc(entry.ptr, page_layout(entry.size)) };
        state.outstanding -= allocation.size;
        state.total_freed += allocation.size;
    }
}
