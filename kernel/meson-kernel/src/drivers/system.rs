//! Motherboard-level discovery: memory sizing, 32-bit BIOS, PnP BIOS,
//! and the PCI-to-ISA bridge.
//!
//! The BIOS structures live in the ROM area `[0xE0000, 0x100000)`. Both
//! headers are located by a signature scan on fixed strides and accepted
//! only when their bytes sum to zero; everything is parsed from a copy.

extern crate alloc;

use alloc::format;
use alloc::vec::Vec;

use crate::device::{
    DetectContext, Device, DeviceClass, DeviceId, DeviceSubclass, DeviceTree,
};
use crate::kinfo;
use crate::mm::FirmwareReader;
use crate::status::Status;

/// Start of the scanned BIOS ROM area.
pub const BIOS_AREA_START: u32 = 0xE0000;

/// Size of the scanned BIOS ROM area.
pub const BIOS_AREA_SIZE: usize = 0x20000;

/// 32-bit BIOS services directory signature.
pub const BIOS32_SIGNATURE: &[u8; 4] = b"_32_";

/// Plug-and-Play BIOS installation check signature.
pub const PNP_SIGNATURE: &[u8; 4] = b"$PnP";

/// Size of the 32-bit BIOS services directory header.
const BIOS32_HEADER_SIZE: usize = 16;

/// Size of the PnP BIOS installation check structure.
const PNP_HEADER_SIZE: usize = 33;

/// Parsed 32-bit BIOS services directory header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bios32Header {
    /// Physical address of the 32-bit services entry point.
    pub entry_point: u32,
    /// Structure revision.
    pub revision: u8,
}

/// Parsed PnP BIOS installation check structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PnpBiosHeader {
    /// Packed BCD version (`0x10` is PnP 1.0).
    pub version: u8,
    /// Real-mode entry point offset.
    pub rm_entry: u16,
    /// Real-mode entry code segment.
    pub rm_code_segment: u16,
    /// Protected-mode entry point offset.
    pub pm_entry: u16,
    /// Protected-mode code segment base.
    pub pm_code_base: u32,
}

impl PnpBiosHeader {
    /// Version as a dotted string, e.g. `"1.0"`.
    #[must_use]
    pub fn version_string(&self) -> alloc::string::String {
        format!("{}.{}", (self.version & 0xF0) >> 4, self.version & 0x0F)
    }
}

fn sums_to_zero(bytes: &[u8]) -> bool {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b)) == 0
}

/// Scan a copied BIOS area for the 32-bit services directory.
///
/// The header recurs on 16-byte strides; a hit must checksum to zero.
#[must_use]
pub fn find_bios32(region: &[u8]) -> Option<(usize, Bios32Header)> {
    let mut offset = 0usize;
    while offset + BIOS32_HEADER_SIZE <= region.len() {
        let header = &region[offset..offset + BIOS32_HEADER_SIZE];
        if &header[0..4] == BIOS32_SIGNATURE && sums_to_zero(header) {
            return Some((
                offset,
                Bios32Header {
                    entry_point: u32::from_le_bytes([header[4], header[5], header[6], header[7]]),
                    revision: header[8],
                },
            ));
        }
        offset += BIOS32_HEADER_SIZE;
    }
    None
}

/// Scan a copied BIOS area for the PnP BIOS installation structure.
///
/// Searched on 16-byte boundaries; a hit must checksum to zero over the
/// whole 33-byte structure.
#[must_use]
pub fn find_pnp_bios(region: &[u8]) -> Option<(usize, PnpBiosHeader)> {
    let mut offset = 0usize;
    while offset + PNP_HEADER_SIZE <= region.len() {
        let header = &region[offset..offset + PNP_HEADER_SIZE];
        if &header[0..4] == PNP_SIGNATURE && sums_to_zero(header) {
            return Some((
                offset,
                PnpBiosHeader {
                    version: header[4],
                    rm_entry: u16::from_le_bytes([header[13], header[14]]),
                    rm_code_segment: u16::from_le_bytes([header[15], header[16]]),
                    pm_entry: u16::from_le_bytes([header[17], header[18]]),
                    pm_code_base: u32::from_le_bytes([
                        header[19], header[20], header[21], header[22],
                    ]),
                },
            ));
        }
        offset += 16;
    }
    None
}

/// Publish the memory device with its sizing attribute.
///
/// Total memory is the 1 MB of base/reserved space plus the extended
/// memory count the boot loader probed.
///
/// # Errors
///
/// Propagates device tree errors.
pub fn detect_memory(
    tree: &mut DeviceTree,
    parent: DeviceId,
    ctx: &mut DetectContext<'_>,
) -> Result<(), Status> {
    let id = tree.add(Some(parent), Device::new(DeviceClass::Memory, None))?;
    let total = 1024 + ctx.boot.extended_memory_kb;
    tree.device_mut(id)
        .attrs
        .set("memory.size", &format!("{total} Kb"))?;
    Ok(())
}

/// Detect the 32-bit BIOS services directory.
///
/// # Errors
///
/// Propagates firmware read and device tree errors.
pub fn detect_bios32(
    tree: &mut DeviceTree,
    parent: DeviceId,
    ctx: &mut DetectContext<'_>,
) -> Result<(), Status> {
    let region = ctx.firmware.read_physical(BIOS_AREA_START, BIOS_AREA_SIZE)?;
    let Some((offset, header)) = find_bios32(&region) else {
        return Ok(());
    };

    kinfo!(
        "bios32: directory at {:#x}, entry point {:#x}",
        BIOS_AREA_START + offset as u32,
        header.entry_point
    );

    let id = tree.add(
        Some(parent),
        Device::new(DeviceClass::System, Some(DeviceSubclass::SystemBios32)),
    )?;
    tree.device_mut(id)
        .attrs
        .set("bios32.entry", &format!("{:#x}", header.entry_point))?;
    Ok(())
}

/// Detect the Plug-and-Play BIOS.
///
/// # Errors
///
/// Propagates firmware read and device tree errors.
pub fn detect_pnp_bios(
    tree: &mut DeviceTree,
    parent: DeviceId,
    ctx: &mut DetectContext<'_>,
) -> Result<(), Status> {
    let region = ctx.firmware.read_physical(BIOS_AREA_START, BIOS_AREA_SIZE)?;
    let Some((offset, header)) = find_pnp_bios(&region) else {
        return Ok(());
    };

    kinfo!(
        "pnpbios: structure at {:#x}, version {}",
        BIOS_AREA_START + offset as u32,
        header.version_string()
    );

    let id = tree.add(
        Some(parent),
        Device::new(DeviceClass::System, Some(DeviceSubclass::SystemBiosPnp)),
    )?;
    tree.device_mut(id)
        .attrs
        .set("pnp.version", &header.version_string())?;
    Ok(())
}

/// PCI class code for bridges.
const PCI_CLASS_BRIDGE: u8 = 0x06;
/// PCI subclass code for PCI-to-ISA bridges.
const PCI_SUBCLASS_ISA: u8 = 0x01;

/// Register a bridge device for every PCI-to-ISA bridge the bus driver
/// reported.
///
/// # Errors
///
/// Propagates device tree errors.
pub fn detect_isa_bridge(
    tree: &mut DeviceTree,
    parent: DeviceId,
    ctx: &mut DetectContext<'_>,
) -> Result<(), Status> {
    let hits: Vec<_> = ctx
        .pci_targets
        .iter()
        .filter(|t| t.class_code == PCI_CLASS_BRIDGE && t.subclass_code == PCI_SUBCLASS_ISA)
        .copied()
        .collect();

    for target in hits {
        let id = tree.add(
            Some(parent),
            Device::new(DeviceClass::Bridge, Some(DeviceSubclass::BridgeIsa)),
        )?;
        tree.device_mut(id).attrs.set(
            "bridge.pci-id",
            &format!("{:04x}:{:04x}", target.vendor, target.device),
        )?;
    }
    Ok(())
}
