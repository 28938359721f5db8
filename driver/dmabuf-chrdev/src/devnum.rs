//! Device numbers and contiguous number ranges.

use core::fmt;

/// One externally visible device number, the `major:minor` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceNumber {
    major: u32,
    minor: u32,
}

impl DeviceNumber {
    #[inline]
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    #[inline]
    #[must_use]
    pub const fn major(self) -> u32 {
        self.major
    }

    #[inline]
    #[must_use]
    pub const fn minor(self) -> u32 {
        self.minor
    }
}

impl fmt::Display for DeviceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// A contiguous range of device numbers reserved for one registry:
/// `count` minors starting at `base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceNumberRange {
    base: DeviceNumber,
    count: u32,
}

impl DeviceNumberRange {
    #[inline]
    #[must_use]
    pub const fn new(base: DeviceNumber, count: u32) -> Self {
        Self { base, count }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> DeviceNumber {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn count(self) -> u32 {
        self.count
    }

    /// The `i`-th number of the range, or `None` past the end.
    #[inline]
    #[must_use]
    pub const fn nth(self, i: u32) -> Option<DeviceNumber> {
        if i < self.count {
            Some(DeviceNumber::new(self.base.major, self.base.minor + i))
        } else {
            None
        }
    }

    /// Index of `devno` within the range, or `None` if it lies outside.
    #[inline]
    #[must_use]
    pub fn index_of(self, devno: DeviceNumber) -> Option<usize> {
        if devno.major != self.base.major || devno.minor < self.base.minor {
            return None;
        }
        let i = devno.minor - self.base.minor;
        (i < self.count).then_some(i as usize)
    }
}

impl fmt::Display for DeviceNumberRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.base, self.count)
    }
}
