//! # Character-Device Lifecycle Manager
//!
//! A fixed-capacity registry of device identities, each bound to one
//! owner-supplied payload (typically a DMA buffer) and surfaced by the host
//! as a discoverable node named `<base><slot>`.
//!
//! ## Overview
//!
//! The registry owns three host resources acquired at construction — a
//! device class, a contiguous device-number range, and the slot table — and
//! one device object plus one node per registered slot. Every acquisition
//! is paired with a release on the reverse path:
//!
//! ```text
//! Registry::new     create_class → reserve_numbers → slots
//! Registry::add     register_device → publish_node → bind payload
//! Registry::remove  remove_node → unregister_device → drop payload
//! Drop              remove(every slot) → release_numbers → destroy_class
//! ```
//!
//! Slots move `Empty → Registered → Empty`; `remove` is idempotent and
//! tolerates half-initialized slots, so teardown is always safe.
//!
//! The host framework itself sits behind the [`DeviceHost`] trait; the
//! registry contains no platform code.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod devnum;
mod host;
mod registry;

pub use devnum::{DeviceNumber, DeviceNumberRange};
pub use host::{DeviceHost, HostError};
pub use registry::{Registry, RegistryError};
