//! Device registry.
//!
//! Hardware is classified into a tree of [`Device`] nodes rooted at a
//! single `system` device. The tree is an arena indexed by [`DeviceId`];
//! parent, first-child, and next-sibling links are arena indices, so the
//! classic cyclic parent/child pointers cost nothing here.
//!
//! The tree is only mutated during [`initialize`], which probes the
//! built-in drivers in declaration order. Order matters: the interrupt
//! controller is probed first so later drivers can unmask their
//! interrupts, and buses come before the devices that live on them.
//! After initialisation the tree is read-only.

extern crate alloc;

pub mod class;
pub mod driver;

use alloc::string::String;
use alloc::vec::Vec;

pub use class::{DeviceClass, DeviceSubclass, SUBCLASS_BIT, class_name};
pub use driver::{
    BootInfo, DetectContext, DetectFn, DeviceOps, Driver, PciTargetInfo, PicOps, PowerOps,
};

use crate::status::Status;
use crate::sync::SpinLock;
use crate::varlist::VariableList;
use crate::{kinfo, kwarn};

/// Index of a device node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId(usize);

/// A node in the device tree.
pub struct Device {
    /// Device class.
    pub class: DeviceClass,
    /// Optional subclass refinement.
    pub subclass: Option<DeviceSubclass>,
    /// Model string, when the driver can name the hardware.
    pub model: Option<String>,
    /// Class-specific operations.
    pub ops: DeviceOps,
    /// Free-form attributes published for user space.
    pub attrs: VariableList,
    parent: Option<DeviceId>,
    first_child: Option<DeviceId>,
    next_sibling: Option<DeviceId>,
}

impl Device {
    /// Create a device with no operations and empty attributes.
    #[must_use]
    pub fn new(class: DeviceClass, subclass: Option<DeviceSubclass>) -> Self {
        Self {
            class,
            subclass,
            model: None,
            ops: DeviceOps::None,
            attrs: VariableList::with_defaults(),
            parent: None,
            first_child: None,
            next_sibling: None,
        }
    }

    /// Attach a model string.
    #[must_use]
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(String::from(model));
        self
    }

    /// Attach an operations table.
    #[must_use]
    pub fn with_ops(mut self, ops: DeviceOps) -> Self {
        self.ops = ops;
        self
    }

    /// The parent node, `None` only for the root.
    #[must_use]
    pub fn parent(&self) -> Option<DeviceId> {
        self.parent
    }
}

/// The device tree arena.
pub struct DeviceTree {
    nodes: Vec<Device>,
    root: Option<DeviceId>,
}

impl DeviceTree {
    /// Create an empty tree.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
        }
    }

    /// The root device, present after [`init_root`](Self::init_root).
    #[must_use]
    pub fn root(&self) -> Option<DeviceId> {
        self.root
    }

    /// The number of devices in the tree.
    #[must_use]
    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    /// Create the root `system` device. Idempotent.
    pub fn init_root(&mut self) -> DeviceId {
        if let Some(root) = self.root {
            return root;
        }
        let id = DeviceId(self.nodes.len());
        self.nodes.push(Device::new(DeviceClass::System, None));
        self.root = Some(id);
        id
    }

    /// Borrow a device.
    ///
    /// # Panics
    ///
    /// Panics on a dangling [`DeviceId`], which cannot be constructed
    /// outside this module.
    #[must_use]
    pub fn device(&self, id: DeviceId) -> &Device {
        &self.nodes[id.0]
    }

    /// Mutably borrow a device. Only legitimate during initialisation.
    pub fn device_mut(&mut self, id: DeviceId) -> &mut Device {
        &mut self.nodes[id.0]
    }

    /// Add a device under `parent` (the root when `None`).
    ///
    /// The child is appended at the tail of the parent's child list, so
    /// sibling order is probe order.
    ///
    /// # Errors
    ///
    /// Returns [`Status::NotInitialized`] if the root does not exist yet.
    pub fn add(&mut self, parent: Option<DeviceId>, mut device: Device) -> Result<DeviceId, Status> {
        let parent = match parent.or(self.root) {
            Some(p) => p,
            None => return Err(Status::NotInitialized),
        };

        let id = DeviceId(self.nodes.len());
        device.parent = Some(parent);
        device.first_child = None;
        device.next_sibling = None;
        self.nodes.push(device);

        // Append at the tail of the sibling list.
        match self.nodes[parent.0].first_child {
            None => self.nodes[parent.0].first_child = Some(id),
            Some(first) => {
                let mut cursor = first;
                while let Some(next) = self.nodes[cursor.0].next_sibling {
                    cursor = next;
                }
                self.nodes[cursor.0].next_sibling = Some(id);
            }
        }
        Ok(id)
    }

    /// Iterate the children of a node in sibling order.
    pub fn children(&self, id: DeviceId) -> impl Iterator<Item = DeviceId> + '_ {
        let first = self.nodes[id.0].first_child;
        core::iter::successors(first, move |current| self.nodes[current.0].next_sibling)
    }

    /// Pre-order depth-first traversal of the whole tree.
    #[must_use]
    pub fn pre_order(&self) -> Vec<DeviceId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        if let Some(root) = self.root {
            self.pre_order_from(root, &mut out);
        }
        out
    }

    fn pre_order_from(&self, id: DeviceId, out: &mut Vec<DeviceId>) {
        out.push(id);
        let mut child = self.nodes[id.0].first_child;
        while let Some(c) = child {
            self.pre_order_from(c, out);
            child = self.nodes[c.0].next_sibling;
        }
    }

    /// Find up to `max` devices matching a class and (optionally) a
    /// subclass, in pre-order position.
    #[must_use]
    pub fn find_type(
        &self,
        class: DeviceClass,
        subclass: Option<DeviceSubclass>,
        max: usize,
    ) -> Vec<DeviceId> {
        let mut out = Vec::new();
        for id in self.pre_order() {
            if out.len() >= max {
                break;
            }
            let device = self.device(id);
            if device.class == class && (subclass.is_none() || device.subclass == subclass) {
                out.push(id);
            }
        }
        out
    }
}

impl Default for DeviceTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Global device tree instance.
static DEVICE_TREE: SpinLock<DeviceTree> = SpinLock::new(DeviceTree::new());

/// Execute a closure with a shared reference to the device tree.
pub fn with_device_tree<R>(f: impl FnOnce(&DeviceTree) -> R) -> R {
    let tree = DEVICE_TREE.lock();
    f(&tree)
}

/// Execute a closure with a mutable reference to the device tree.
///
/// Mutation is only legitimate during boot-time probing.
pub fn with_device_tree_mut<R>(f: impl FnOnce(&mut DeviceTree) -> R) -> R {
    let mut tree = DEVICE_TREE.lock();
    f(&mut tree)
}

/// Probe every driver in `drivers`, in order, against the global tree.
///
/// Creates the root device first. A driver that fails to probe is logged
/// and skipped; probing continues.
pub fn initialize(drivers: &[Driver], ctx: &mut DetectContext<'_>) {
    let mut tree = DEVICE_TREE.lock();
    let root = tree.init_root();

    for driver in drivers {
        match (driver.detect)(&mut tree, root, ctx) {
            Ok(()) => {}
            Err(status) => {
                kwarn!(
                    "device: probe for class {} failed: {}",
                    driver.class.name(),
                    status
                );
            }
        }
    }

    kinfo!("device: {} devices registered", tree.count());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_layout() -> (DeviceTree, DeviceId, DeviceId, DeviceId, DeviceId) {
        let mut tree = DeviceTree::new();
        let root = tree.init_root();
        let bus = tree
            .add(None, Device::new(DeviceClass::Bus, Some(DeviceSubclass::BusPci)))
            .unwrap();
        let disk1 = tree
            .add(
                Some(bus),
                Device::new(DeviceClass::Disk, Some(DeviceSubclass::DiskIde)),
            )
            .unwrap();
        let disk2 = tree
            .add(
                Some(bus),
                Device::new(DeviceClass::Disk, Some(DeviceSubclass::DiskFloppy)),
            )
            .unwrap();
        (tree, root, bus, disk1, disk2)
    }

    #[test]
    fn every_non_root_device_has_one_parent() {
        let (tree, root, bus, disk1, disk2) = tree_with_layout();
        assert_eq!(tree.device(root).parent(), None);
        assert_eq!(tree.device(bus).parent(), Some(root));
        assert_eq!(tree.device(disk1).parent(), Some(bus));
        assert_eq!(tree.device(disk2).parent(), Some(bus));
    }

    #[test]
    fn children_keep_probe_order() {
        let (tree, _, bus, disk1, disk2) = tree_with_layout();
        let kids: Vec<_> = tree.children(bus).collect();
        assert_eq!(kids, [disk1, disk2]);
    }

    #[test]
    fn pre_order_reaches_every_device_once() {
        let (tree, root, bus, disk1, disk2) = tree_with_layout();
        let order = tree.pre_order();
        assert_eq!(order, [root, bus, disk1, disk2]);
    }

    #[test]
    fn find_type_matches_in_pre_order() {
        let (tree, _, _, disk1, disk2) = tree_with_layout();
        let disks = tree.find_type(DeviceClass::Disk, None, 16);
        assert_eq!(disks, [disk1, disk2]);

        let ide = tree.find_type(DeviceClass::Disk, Some(DeviceSubclass::DiskIde), 16);
        assert_eq!(ide, [disk1]);

        let limited = tree.find_type(DeviceClass::Disk, None, 1);
        assert_eq!(limited, [disk1]);
    }

    #[test]
    fn add_without_root_fails() {
        let mut tree = DeviceTree::new();
        assert!(matches!(
            tree.add(None, Device::new(DeviceClass::Cpu, None)),
            Err(Status::NotInitialized)
        ));
    }

    #[test]
    fn attributes_travel_with_the_device() {
        let (mut tree, _, bus, _, _) = tree_with_layout();
        tree.device_mut(bus)
            .attrs
            .set("bus.width", "32")
            .unwrap();
        assert_eq!(
            tree.device(bus).attrs.get("bus.width"),
            Some(String::from("32"))
        );
    }
}
