//! # Device-Visible Addresses and Page Granularity
//!
//! Strongly typed wrapper for bus/DMA-visible addresses plus the page-size
//! helpers the buffer engine aligns everything to.
//!
//! ## Overview
//!
//! Backing memory for a DMA buffer lives at two addresses at once: the CPU
//! pointer the driver dereferences, and the address a bus-mastering device
//! uses to reach the same bytes. The two must never be mixed. CPU pointers
//! stay ordinary (`NonNull<u8>`); the device side gets its own zero-cost
//! newtype:
//!
//! | Type | Meaning |
//! |-------|----------|
//! | [`DeviceAddress`] | An address as seen from the bus/DMA engine. |
//!
//! ## Page granularity
//!
//! The platform hands out device-visible memory in whole pages. [`PAGE_SIZE`]
//! and [`PAGE_SHIFT`] fix the granularity; [`is_page_aligned`], [`align_up`],
//! [`align_down`] and [`page_count`] are the `const` helpers built on them.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use dmabuf_addresses::*;
//! let da = DeviceAddress::new(0x1000_2000);
//! assert!(is_page_aligned(da.as_u64()));
//! assert_eq!((da + PAGE_SIZE).as_u64(), 0x1000_3000);
//!
//! assert_eq!(align_up(0x1001), 0x2000);
//! assert_eq!(page_count(0x2001), 3);
//! ```
//!
//! ## Design Notes
//!
//! - `DeviceAddress` is `#[repr(transparent)]` over `u64` and implements
//!   `Copy`, `Eq`, `Ord`, and `Hash`, so it can key maps or cross FFI.
//! - All helpers are `const fn` and zero-cost in release builds.

#![cfg_attr(not(any(test, doctest)), no_std)]

use core::fmt;
use core::ops::{Add, AddAssign};

/// log2 of the platform page size.
pub const PAGE_SHIFT: u32 = 12;

/// Platform page size in bytes (4 KiB).
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;

/// Whether `value` is a multiple of [`PAGE_SIZE`].
#[inline]
#[must_use]
pub const fn is_page_aligned(value: u64) -> bool {
    value & (PAGE_SIZE - 1) == 0
}

/// Round `value` up to the next page boundary.
#[inline]
#[must_use]
pub const fn align_up(value: u64) -> u64 {
    (value + (PAGE_SIZE - 1)) & !(PAGE_SIZE - 1)
}

/// Round `value` down to a page boundary.
#[inline]
#[must_use]
pub const fn align_down(value: u64) -> u64 {
    value & !(PAGE_SIZE - 1)
}

/// Number of whole pages needed to cover `bytes`.
#[inline]
#[must_use]
pub const fn page_count(bytes: u64) -> u64 {
    align_up(bytes) >> PAGE_SHIFT
}

/// Bus/DMA-visible memory address.
///
/// A thin wrapper around `u64` that denotes addresses as seen by a
/// bus-mastering device. It carries intent only, so a device address is never
/// confused with a CPU pointer to the same memory.
///
/// ### Semantics
/// - Ordering and equality compare the raw address, which is what segment
///   sorting and run coalescing need.
/// - [`DeviceAddress::checked_add`] is for arithmetic that must not wrap,
///   e.g. computing the exclusive end of a segment.
///
/// ### Examples
/// ```rust
/// # use dmabuf_addresses::*;
/// let a = DeviceAddress::new(0x1000);
/// let b = a + 0x2000;
/// assert!(a < b);
/// assert_eq!(b.as_u64(), 0x3000);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DeviceAddress(u64);

impl DeviceAddress {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The page base containing this address (lower bits zeroed).
    #[inline]
    #[must_use]
    pub const fn page_base(self) -> Self {
        Self(align_down(self.0))
    }

    /// The offset of this address within its page.
    #[inline]
    #[must_use]
    pub const fn page_offset(self) -> u64 {
        self.0 & (PAGE_SIZE - 1)
    }

    /// Checked add, returning `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u64) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DA(0x{:016X})", self.0)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for DeviceAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<DeviceAddress> for u64 {
    #[inline]
    fn from(a: DeviceAddress) -> Self {
        a.as_u64()
    }
}

impl Add<u64> for DeviceAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for DeviceAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}
