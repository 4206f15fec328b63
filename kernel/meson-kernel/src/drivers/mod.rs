//! Built-in device drivers.
//!
//! Only the drivers that belong to the kernel core live here: firmware
//! discovery ([`system`], [`acpi`]) and the interrupt controllers (under
//! [`crate::interrupt`]). Disk, network, input, and display drivers plug
//! in from outside through the same [`Driver`](crate::device::Driver)
//! interface.

pub mod acpi;
pub mod system;

extern crate alloc;

use alloc::vec::Vec;

use crate::device::{DeviceClass, DeviceSubclass, Driver};

/// The built-in driver table, in probe order.
///
/// Order matters: the interrupt controller goes first so later drivers
/// can unmask their interrupts, and firmware discovery precedes the
/// bus-dependent bridge probe.
#[must_use]
pub fn builtin() -> Vec<Driver> {
    Vec::from([
        Driver {
            class: DeviceClass::Pic,
            subclass: None,
            detect: crate::interrupt::detect,
        },
        Driver {
            class: DeviceClass::Memory,
            subclass: None,
            detect: system::detect_memory,
        },
        Driver {
            class: DeviceClass::System,
            subclass: Some(DeviceSubclass::SystemBios32),
            detect: system::detect_bios32,
        },
        Driver {
            class: DeviceClass::System,
            subclass: Some(DeviceSubclass::SystemBiosPnp),
            detect: system::detect_pnp_bios,
        },
        Driver {
            class: DeviceClass::Power,
            subclass: Some(DeviceSubclass::PowerAcpi),
            detect: acpi::detect,
        },
        Driver {
            class: DeviceClass::Bridge,
            subclass: Some(DeviceSubclass::BridgeIsa),
            detect: system::detect_isa_bridge,
        },
    ])
}
