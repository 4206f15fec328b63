//! Driver descriptors and per-class operation tables.
//!
//! A [`Driver`] couples a device class to a probe function. Probing
//! constructs zero or more devices under a parent node and attaches an
//! operations table; the table is a per-class trait object, so a consumer
//! that has located a device by class gets a typed interface back.

extern crate alloc;

use alloc::sync::Arc;

use super::class::{DeviceClass, DeviceSubclass};
use super::{DeviceId, DeviceTree};
use crate::mm::FirmwareReader;
use crate::status::Status;

/// Operations exposed by an interrupt controller device.
pub trait PicOps: Send + Sync {
    /// Translate a bus-local IRQ to the global interrupt number this
    /// controller covers.
    ///
    /// # Errors
    ///
    /// Returns [`Status::NoSuchEntry`] if the controller does not route
    /// this bus IRQ.
    fn int_number(&self, bus_id: u8, bus_irq: u8) -> Result<u8, Status>;

    /// Compute the CPU vector for a global interrupt number.
    ///
    /// # Errors
    ///
    /// Returns [`Status::NoSuchEntry`] for an interrupt outside this
    /// controller's range.
    fn vector(&self, int_number: u8) -> Result<u8, Status>;

    /// Acknowledge the interrupt.
    fn end_of_interrupt(&self, int_number: u8);

    /// Unmask (`on == true`) or mask an interrupt.
    ///
    /// # Errors
    ///
    /// Returns [`Status::NoSuchEntry`] if no routing entry carries this
    /// interrupt number.
    fn mask(&self, int_number: u8, on: bool) -> Result<(), Status>;

    /// The interrupt number currently in service, if any.
    fn get_active(&self) -> Option<u8>;

    /// Shut the controller down (optional).
    fn disable(&self) {}
}

/// Operations exposed by a power-management device.
pub trait PowerOps: Send + Sync {
    /// Power the machine off. Does not return on success.
    ///
    /// # Errors
    ///
    /// Returns [`Status::NotImplemented`] when the firmware did not
    /// provide what the driver needs.
    fn power_off(&self) -> Result<(), Status>;
}

/// The per-class operations attached to a device.
#[derive(Clone)]
pub enum DeviceOps {
    /// No operations (leaf informational device).
    None,
    /// Interrupt controller operations.
    Pic(Arc<dyn PicOps>),
    /// Power management operations.
    Power(Arc<dyn PowerOps>),
}

impl DeviceOps {
    /// Borrow the PIC operations, if this device is an interrupt
    /// controller.
    #[must_use]
    pub fn as_pic(&self) -> Option<&Arc<dyn PicOps>> {
        match self {
            Self::Pic(ops) => Some(ops),
            _ => None,
        }
    }

    /// Borrow the power operations, if this device is a power manager.
    #[must_use]
    pub fn as_power(&self) -> Option<&Arc<dyn PowerOps>> {
        match self {
            Self::Power(ops) => Some(ops),
            _ => None,
        }
    }
}

/// Boot-time facts handed to probe functions by the loader.
#[derive(Debug, Clone, Copy, Default)]
pub struct BootInfo {
    /// KB of extended memory reported by the boot loader.
    pub extended_memory_kb: u32,
}

/// A device found during PCI bus enumeration.
///
/// The PCI bus driver proper lives outside the core; it hands the
/// registry this summary per function so class-driven probes (the ISA
/// bridge) can match against it.
#[derive(Debug, Clone, Copy)]
pub struct PciTargetInfo {
    /// PCI vendor ID.
    pub vendor: u16,
    /// PCI device ID.
    pub device: u16,
    /// PCI class code.
    pub class_code: u8,
    /// PCI subclass code.
    pub subclass_code: u8,
}

/// Context handed to every probe function.
pub struct DetectContext<'a> {
    /// Physical memory access for firmware table scans.
    pub firmware: &'a mut dyn FirmwareReader,
    /// Boot loader facts.
    pub boot: &'a BootInfo,
    /// Devices reported by the PCI bus driver, if any.
    pub pci_targets: &'a [PciTargetInfo],
    /// MMIO mapping service, absent on hosts without paging control.
    pub mmio: Option<&'a mut dyn crate::mm::MmioMapper>,
}

/// A device probe function.
///
/// Probes the hardware and adds zero or more devices under `parent`.
/// "Nothing found" is success; a probe error is logged by the registry
/// and does not stop the remaining drivers.
pub type DetectFn = fn(&mut DeviceTree, DeviceId, &mut DetectContext<'_>) -> Result<(), Status>;

/// A built-in driver: class identity plus its probe entry point.
pub struct Driver {
    /// Class of the devices this driver detects.
    pub class: DeviceClass,
    /// Optional subclass refinement.
    pub subclass: Option<DeviceSubclass>,
    /// Probe function installed at registration.
    pub detect: DetectFn,
}
