//! Simulated device framework for the registry.

use std::cell::RefCell;
use std::rc::Rc;

use dmabuf_chrdev::{DeviceHost, DeviceNumber, DeviceNumberRange, HostError};

/// A published node as user space would see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimNodeRecord {
    pub name: String,
    pub devno: DeviceNumber,
}

#[derive(Default)]
struct State {
    next_major: u32,
    live_classes: Vec<String>,
    live_ranges: Vec<DeviceNumberRange>,
    live_devices: Vec<DeviceNumber>,
    live_nodes: Vec<SimNodeRecord>,
    fail_next_publish: bool,
    fail_reserve: bool,
}

/// Cloneable handle to a simulated device framework.
///
/// Records live classes, number ranges, device objects and nodes so tests
/// can assert that every registry acquisition is paired with a release, and
/// injects failures into number reservation and node publication.
#[derive(Clone)]
pub struct SimHost {
    state: Rc<RefCell<State>>,
}

pub struct SimClass(String);
pub struct SimDevice(DeviceNumber);
pub struct SimNode(SimNodeRecord);

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                next_major: 240,
                ..State::default()
            })),
        }
    }

    pub fn fail_next_publish(&self) {
        self.state.borrow_mut().fail_next_publish = true;
    }

    pub fn fail_reserve_numbers(&self) {
        self.state.borrow_mut().fail_reserve = true;
    }

    #[must_use]
    pub fn node_names(&self) -> Vec<String> {
        self.state
            .borrow()
            .live_nodes
            .iter()
            .map(|n| n.name.clone())
            .collect()
    }

    #[must_use]
    pub fn live_classes(&self) -> usize {
        self.state.borrow().live_classes.len()
    }

    #[must_use]
    pub fn live_ranges(&self) -> usize {
        self.state.borrow().live_ranges.len()
    }

    #[must_use]
    pub fn live_devices(&self) -> usize {
        self.state.borrow().live_devices.len()
    }
}

impl DeviceHost for SimHost {
    type Class = SimClass;
    type Device = SimDevice;
    type Node = SimNode;

    fn create_class(&mut self, name: &str) -> Result<SimClass, HostError> {
        self.state.borrow_mut().live_classes.push(name.into());
        Ok(SimClass(name.into()))
    }

    fn destroy_class(&mut self, class: SimClass) {
        self.state.borrow_mut().live_classes.retain(|c| *c != class.0);
    }

    fn reserve_numbers(&mut self, _name: &str, count: u32) -> Result<DeviceNumberRange, HostError> {
        let mut state = self.state.borrow_mut();
        if state.fail_reserve {
            return Err(HostError("device numbers exhausted"));
        }
        let range = DeviceNumberRange::new(DeviceNumber::new(state.next_major, 0), count);
        state.next_major += 1;
        state.live_ranges.push(range);
        Ok(range)
    }

    fn release_numbers(&mut self, range: DeviceNumberRange) {
        self.state.borrow_mut().live_ranges.retain(|r| *r != range);
    }

    fn register_device(&mut self, devno: DeviceNumber) -> Result<SimDevice, HostError> {
        self.state.borrow_mut().live_devices.push(devno);
        Ok(SimDevice(devno))
    }

    fn unregister_device(&mut self, device: SimDevice) {
        self.state.borrow_mut().live_devices.retain(|d| *d != device.0);
    }

    fn publish_node(
        &mut self,
        _class: &SimClass,
        devno: DeviceNumber,
        name: &str,
    ) -> Result<SimNode, HostError> {
        let mut state = self.state.borrow_mut();
        if std::mem::take(&mut state.fail_next_publish) {
            return Err(HostError("node name collision"));
        }
        let record = SimNodeRecord {
            name: name.into(),
            devno,
        };
        state.live_nodes.push(record.clone());
        Ok(SimNode(record))
    }

    fn remove_node(&mut self, _class: &SimClass, node: SimNode) {
        self.state.borrow_mut().live_nodes.retain(|n| *n != node.0);
    }
}
