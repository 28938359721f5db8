//! Trait seam towards the host device framework.

use crate::devnum::{DeviceNumber, DeviceNumberRange};

/// Opaque failure from a host collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("host operation failed: {0}")]
pub struct HostError(pub &'static str);

/// The host facilities a registry needs: a device class namespace, a pool of
/// device numbers, kernel-visible device objects, and discoverable device
/// nodes.
///
/// Handles travel by value through the registry and come back by value on
/// release, so acquisition and release are paired one to one per handle.
/// Implementations are free to fail any acquisition; the registry unwinds
/// in reverse acquisition order.
pub trait DeviceHost {
    /// Class/namespace handle the host publishes nodes under.
    type Class;
    /// One registered kernel-visible device object.
    type Device;
    /// One published, discoverable device node.
    type Node;

    /// # Errors
    /// [`HostError`] when the class cannot be created.
    fn create_class(&mut self, name: &str) -> Result<Self::Class, HostError>;
    fn destroy_class(&mut self, class: Self::Class);

    /// # Errors
    /// [`HostError`] when no contiguous range of `count` numbers is free.
    fn reserve_numbers(&mut self, name: &str, count: u32)
    -> Result<DeviceNumberRange, HostError>;
    fn release_numbers(&mut self, range: DeviceNumberRange);

    /// # Errors
    /// [`HostError`] when the device object cannot be registered.
    fn register_device(&mut self, devno: DeviceNumber) -> Result<Self::Device, HostError>;
    fn unregister_device(&mut self, device: Self::Device);

    /// Publish a node named `name` for `devno` under `class`.
    ///
    /// # Errors
    /// [`HostError`] when the node cannot be published.
    fn publish_node(
        &mut self,
        class: &Self::Class,
        devno: DeviceNumber,
        name: &str,
    ) -> Result<Self::Node, HostError>;
    fn remove_node(&mut self, class: &Self::Class, node: Self::Node);
}
