//! Fixed-capacity registry of device identities.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use log::{error, info};

use crate::devnum::{DeviceNumber, DeviceNumberRange};
use crate::host::{DeviceHost, HostError};

/// A registry operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The requested slot count cannot be backed by device numbers.
    #[error("capacity {capacity} exceeds the device-number space")]
    InvalidCapacity { capacity: usize },
    /// Slot index at or past the fixed capacity.
    #[error("slot {slot} out of range (capacity {capacity})")]
    SlotOutOfRange { slot: usize, capacity: usize },
    /// The slot already holds a registered device identity.
    #[error("slot {slot} is already registered")]
    SlotBusy { slot: usize },
    /// Bookkeeping allocation failed.
    #[error("out of memory for registry bookkeeping")]
    OutOfMemory,
    /// A host collaborator refused.
    #[error(transparent)]
    Host(#[from] HostError),
}

/// One registry slot: `Empty` (all fields vacant) or `Registered`.
///
/// The fields fill strictly in order device → node → payload and drain in
/// reverse, so a slot abandoned halfway through `add` is indistinguishable
/// from an `Empty` one.
struct Slot<H: DeviceHost, T> {
    device: Option<H::Device>,
    node: Option<H::Node>,
    payload: Option<T>,
}

impl<H: DeviceHost, T> Slot<H, T> {
    const fn empty() -> Self {
        Self {
            device: None,
            node: None,
            payload: None,
        }
    }

    const fn is_empty(&self) -> bool {
        self.device.is_none() && self.node.is_none() && self.payload.is_none()
    }
}

/// Owner of a contiguous device-number range and a fixed array of device
/// identities, each independently creatable and destroyable.
///
/// Slot `i` of a registry named `buf` surfaces as the node `buf<i>`
/// (`buf0`, `buf1`, ...). The per-slot payload `T` is the owner-supplied
/// value an open handle resolves back to its buffer; the registry stores it
/// in a plain slot-indexed table and never shares it.
///
/// Dropping the registry removes every slot, then releases the number range
/// and the class, in that order.
pub struct Registry<H: DeviceHost, T> {
    host: H,
    name: String,
    class: Option<H::Class>,
    numbers: DeviceNumberRange,
    slots: Vec<Slot<H, T>>,
}

impl<H: DeviceHost, T> Registry<H, T> {
    /// Reserve `capacity` device numbers and create the class `name`.
    ///
    /// Fails without leaking: whatever was acquired before the failing step
    /// is released again before the error is returned.
    ///
    /// # Errors
    /// [`RegistryError::InvalidCapacity`] when `capacity` exceeds the
    /// device-number space, [`RegistryError::Host`] when a collaborator
    /// refuses, [`RegistryError::OutOfMemory`] when slot bookkeeping fails.
    pub fn new(mut host: H, name: &str, capacity: usize) -> Result<Self, RegistryError> {
        info!("name = {name}, capacity = {capacity}");

        let Ok(count) = u32::try_from(capacity) else {
            error!("capacity {capacity} does not fit a device-number range");
            return Err(RegistryError::InvalidCapacity { capacity });
        };

        let class = match host.create_class(name) {
            Ok(class) => class,
            Err(err) => {
                error!("create_class: {err}");
                return Err(err.into());
            }
        };

        let numbers = match host.reserve_numbers(name, count) {
            Ok(numbers) => numbers,
            Err(err) => {
                error!("reserve_numbers: {err}");
                host.destroy_class(class);
                return Err(err.into());
            }
        };

        let mut slots = Vec::new();
        if slots.try_reserve_exact(capacity).is_err() {
            error!("slot bookkeeping: out of memory");
            host.release_numbers(numbers);
            host.destroy_class(class);
            return Err(RegistryError::OutOfMemory);
        }
        slots.resize_with(capacity, Slot::empty);

        Ok(Self {
            host,
            name: String::from(name),
            class: Some(class),
            numbers,
            slots,
        })
    }

    /// Register the device identity in `slot` and publish its node.
    ///
    /// The slot must currently be empty. The device object is registered
    /// first; if publishing the node then fails, the device object is
    /// rolled back and the slot stays empty and reusable.
    ///
    /// # Errors
    /// [`RegistryError::SlotOutOfRange`], [`RegistryError::SlotBusy`], or
    /// [`RegistryError::Host`] from the failing collaborator.
    pub fn add(&mut self, slot: usize, payload: T) -> Result<(), RegistryError> {
        info!("slot = {slot}");

        let capacity = self.slots.len();
        let devno = u32::try_from(slot)
            .ok()
            .filter(|_| slot < capacity)
            .and_then(|i| self.numbers.nth(i));
        let Some(devno) = devno else {
            error!("slot {slot} out of range");
            return Err(RegistryError::SlotOutOfRange { slot, capacity });
        };

        if !self.slots[slot].is_empty() {
            error!("slot {slot} busy");
            return Err(RegistryError::SlotBusy { slot });
        }

        let Some(class) = self.class.as_ref() else {
            // Vacated only during drop; defensive, mirroring the null
            // checks the teardown paths rely on.
            return Err(RegistryError::Host(HostError("device class unavailable")));
        };

        let device = match self.host.register_device(devno) {
            Ok(device) => device,
            Err(err) => {
                error!("register_device({devno}): {err}");
                return Err(err.into());
            }
        };

        let node_name = format!("{}{slot}", self.name);
        match self.host.publish_node(class, devno, &node_name) {
            Ok(node) => {
                let entry = &mut self.slots[slot];
                entry.device = Some(device);
                entry.node = Some(node);
                entry.payload = Some(payload);
                Ok(())
            }
            Err(err) => {
                error!("publish_node({node_name}): {err}");
                self.host.unregister_device(device);
                Err(err.into())
            }
        }
    }

    /// Tear down the identity in `slot`, leaving the slot empty.
    ///
    /// Idempotent: empty slots, half-initialized slots, and out-of-range
    /// indices are all safe no-ops. The node is removed before the device
    /// object, reversing `add`.
    pub fn remove(&mut self, slot: usize) {
        info!("slot = {slot}");

        let Some(entry) = self.slots.get_mut(slot) else {
            return;
        };
        if let Some(node) = entry.node.take() {
            if let Some(class) = self.class.as_ref() {
                self.host.remove_node(class, node);
            }
        }
        if let Some(device) = entry.device.take() {
            self.host.unregister_device(device);
        }
        entry.payload = None;
    }

    /// Fixed number of slots, set at construction.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Base name the device nodes derive from.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The reserved device-number range.
    #[inline]
    #[must_use]
    pub const fn numbers(&self) -> DeviceNumberRange {
        self.numbers
    }

    /// Whether `slot` currently holds a registered identity.
    #[must_use]
    pub fn is_registered(&self, slot: usize) -> bool {
        self.slots.get(slot).is_some_and(|s| !s.is_empty())
    }

    /// The payload bound to `slot`, if the slot is registered.
    #[must_use]
    pub fn payload(&self, slot: usize) -> Option<&T> {
        self.slots.get(slot).and_then(|s| s.payload.as_ref())
    }

    /// Resolve a device number back to its payload; the open-path lookup.
    #[must_use]
    pub fn payload_by_number(&self, devno: DeviceNumber) -> Option<&T> {
        self.payload(self.numbers.index_of(devno)?)
    }

}

impl<H: DeviceHost, T> Drop for Registry<H, T> {
    fn drop(&mut self) {
        info!("name = {}", self.name);

        for slot in 0..self.slots.len() {
            self.remove(slot);
        }
        self.host.release_numbers(self.numbers);
        if let Some(class) = self.class.take() {
            self.host.destroy_class(class);
        }
    }
}
