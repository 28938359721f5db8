//! Host-side simulation of the platform seams.
//!
//! The engine and the registry talk to their surroundings only through
//! traits ([`CoherentAllocator`], [`VmMapper`], `DeviceHost`). This crate
//! provides heap-backed stand-ins for all three so the full driver stack
//! can be exercised end to end in ordinary tests:
//!
//! * [`SimDma`] — a coherent allocator with real (zeroed) heap memory
//!   behind fabricated bus addresses, configurable contiguity limits,
//!   failure injection, and byte-exact alloc/free accounting.
//! * [`SimVma`] — a mapping area that records protection flags and mapped
//!   slices, and can materialize the mapped view for comparison against
//!   ordinary reads.
//! * [`SimHost`] — a device framework that tracks live classes, number
//!   ranges, device objects and nodes, with reservation and publication
//!   fuses for rollback tests.
//!
//! [`CoherentAllocator`]: dmabuf_engine::CoherentAllocator
//! [`VmMapper`]: dmabuf_engine::VmMapper

// Simulated sizes always fit the host's usize.
#![allow(clippy::cast_possible_truncation)]

mod dma;
mod host;
mod vma;

pub use dma::SimDma;
pub use host::{SimHost, SimNodeRecord};
pub use vma::{MappedSlice, SimVma};
