//! ACPI firmware discovery and power management.
//!
//! Scans the BIOS area for the RSDP, walks the RSDT, and keeps validated
//! copies of the tables the kernel uses: the FADT (PM1 control ports,
//! FACS and DSDT addresses), the FACS, the DSDT (for the `_S5_` sleep
//! package), and the MADT (interrupt topology counts published as device
//! attributes). Each table is copied into kernel memory and
//! checksum-validated before anything reads a field.
//!
//! This is deliberately a minimum ACPI. There is no AML interpreter, and
//! the SCI enable handshake (writing `acpi_enable` to the SMI command
//! port) stays off: taking over fixed-feature events interferes with IDE
//! interrupt routing on the hardware this kernel targets, and power-off
//! works without it.

extern crate alloc;

use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;

use meson_acpi::{AcpiError, Facs, Fadt, Madt, MadtEntry, Rsdt, SdtHeader, dsdt, rsdp};

use crate::device::{
    DetectContext, Device, DeviceClass, DeviceId, DeviceOps, DeviceSubclass, DeviceTree, PowerOps,
};
use crate::mm::FirmwareReader;
use crate::status::Status;
use crate::{kinfo, kwarn};

/// Start of the RSDP search area.
const RSDP_AREA_START: u32 = 0xE0000;

/// Size of the RSDP search area.
const RSDP_AREA_SIZE: usize = 0x20000;

/// The ACPI state discovered at boot.
pub struct AcpiTables {
    /// Parsed FADT fields.
    pub fadt: Fadt,
    /// Parsed FACS, when the FADT points at one.
    pub facs: Option<Facs>,
    /// Checksummed copy of the whole DSDT.
    pub dsdt: Option<Vec<u8>>,
    /// Number of local APIC entries in the MADT.
    pub madt_cpus: usize,
    /// Number of I/O APIC entries in the MADT.
    pub madt_io_apics: usize,
}

/// Read a whole ACPI table: header first for the length, then the body.
fn read_table(firmware: &mut dyn FirmwareReader, phys: u32) -> Result<Vec<u8>, Status> {
    let header_bytes = firmware.read_physical(phys, SdtHeader::SIZE)?;
    let header = SdtHeader::read_from_bytes(&header_bytes).ok_or(Status::Invalid)?;
    let length = header.length as usize;
    if length < SdtHeader::SIZE {
        return Err(Status::Invalid);
    }
    firmware.read_physical(phys, length)
}

/// Locate and copy the ACPI tables out of firmware memory.
///
/// # Errors
///
/// Returns [`Status::NoSuchEntry`] when no valid RSDP exists, or
/// [`Status::Invalid`] for tables that fail validation.
pub fn discover(firmware: &mut dyn FirmwareReader) -> Result<AcpiTables, Status> {
    let region = firmware.read_physical(RSDP_AREA_START, RSDP_AREA_SIZE)?;
    let (rsdp_phys, rsdp) = rsdp::scan(&region, RSDP_AREA_START).ok_or(Status::NoSuchEntry)?;

    kinfo!(
        "acpi: RSDP at {:#x}, revision {}, RSDT at {:#x}",
        rsdp_phys,
        rsdp.revision,
        rsdp.rsdt_address
    );

    let rsdt_data = read_table(firmware, rsdp.rsdt_address)?;
    let rsdt = Rsdt::parse(&rsdt_data).map_err(Status::from)?;

    let mut fadt: Option<Fadt> = None;
    let mut madt_cpus = 0usize;
    let mut madt_io_apics = 0usize;

    for entry_phys in rsdt.entries() {
        let Ok(table) = read_table(firmware, entry_phys) else {
            continue;
        };
        let signature = &table[0..4];
        if signature == b"FACP" {
            match Fadt::parse(&table) {
                Ok(parsed) => fadt = Some(parsed),
                Err(err) => kwarn!("acpi: bad FADT: {err:?}"),
            }
        } else if signature == b"APIC" {
            match Madt::parse(&table) {
                Ok(madt) => {
                    for entry in madt.entries() {
                        match entry {
                            MadtEntry::LocalApic { .. } => madt_cpus += 1,
                            MadtEntry::IoApic { .. } => madt_io_apics += 1,
                            _ => {}
                        }
                    }
                }
                Err(err) => kwarn!("acpi: bad MADT: {err:?}"),
            }
        }
        // Unrecognised tables are dropped with their copy.
    }

    let fadt = fadt.ok_or(Status::NoSuchEntry)?;

    let facs = if fadt.firmware_ctrl != 0 {
        let facs_bytes = firmware.read_physical(fadt.firmware_ctrl, Facs::MIN_SIZE)?;
        match Facs::parse(&facs_bytes) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                kwarn!("acpi: bad FACS: {err:?}");
                None
            }
        }
    } else {
        None
    };

    let dsdt_copy = if fadt.dsdt_address != 0 {
        // The first read covers one header; the declared length then
        // drives a full-size read, however large the DSDT is.
        match read_table(firmware, fadt.dsdt_address) {
            Ok(data) => match dsdt::validate(&data) {
                Ok(_) => Some(data),
                Err(err) => {
                    kwarn!("acpi: bad DSDT: {err:?}");
                    None
                }
            },
            Err(_) => None,
        }
    } else {
        None
    };

    Ok(AcpiTables {
        fadt,
        facs,
        dsdt: dsdt_copy,
        madt_cpus,
        madt_io_apics,
    })
}

/// The ACPI power-off device.
pub struct AcpiPower {
    fadt: Fadt,
    dsdt: Option<Vec<u8>>,
}

impl AcpiPower {
    /// Extract the `_S5_` sleep-type values from the stored DSDT.
    ///
    /// # Errors
    ///
    /// Returns [`Status::NotImplemented`] without a DSDT, or maps the
    /// scan failure.
    pub fn sleep_values(&self) -> Result<dsdt::SleepType, Status> {
        let data = self.dsdt.as_deref().ok_or(Status::NotImplemented)?;
        dsdt::find_s5(data).map_err(|err| match err {
            AcpiError::NotFound => Status::NotImplemented,
            _ => Status::Invalid,
        })
    }
}

impl PowerOps for AcpiPower {
    fn power_off(&self) -> Result<(), Status> {
        let sleep = self.sleep_values()?;
        if self.fadt.pm1a_control_block == 0 {
            return Err(Status::NotImplemented);
        }

        // SAFETY: PM1 control ports come from a validated FADT; writing
        // SLP_EN with the S5 sleep type is the defined power-off protocol.
        unsafe {
            crate::arch::Port::<u16>::new(self.fadt.pm1a_control_block as u16)
                .write(dsdt::SLP_EN | sleep.slp_typ_a);
            if self.fadt.pm1b_control_block != 0 {
                crate::arch::Port::<u16>::new(self.fadt.pm1b_control_block as u16)
                    .write(dsdt::SLP_EN | sleep.slp_typ_b);
            }
        }

        // Conforming hardware has turned off by now.
        Ok(())
    }
}

/// ACPI probe: discover the tables and publish the power device.
///
/// A machine without ACPI is not an error; the probe simply adds
/// nothing.
///
/// # Errors
///
/// Propagates device tree errors.
pub fn detect(
    tree: &mut DeviceTree,
    parent: DeviceId,
    ctx: &mut DetectContext<'_>,
) -> Result<(), Status> {
    let tables = match discover(ctx.firmware) {
        Ok(tables) => tables,
        Err(Status::NoSuchEntry) | Err(Status::Memory) => return Ok(()),
        Err(err) => return Err(err),
    };

    let power = Arc::new(AcpiPower {
        fadt: tables.fadt,
        dsdt: tables.dsdt,
    });

    let id = tree.add(
        Some(parent),
        Device::new(DeviceClass::Power, Some(DeviceSubclass::PowerAcpi))
            .with_model("ACPI")
            .with_ops(DeviceOps::Power(power)),
    )?;

    let device = tree.device_mut(id);
    device
        .attrs
        .set("acpi.sci", &format!("{}", tables.fadt.sci_interrupt))?;
    device
        .attrs
        .set("acpi.cpus", &format!("{}", tables.madt_cpus))?;
    device
        .attrs
        .set("acpi.ioapics", &format!("{}", tables.madt_io_apics))?;
    if let Some(facs) = tables.facs {
        device
            .attrs
            .set("acpi.hwsignature", &format!("{:#x}", facs.hardware_signature))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::BootInfo;
    use crate::mm::LinearImage;
    use alloc::string::String;
    use alloc::vec;

    fn checksum_table(data: &mut [u8]) {
        data[9] = 0;
        let sum: u8 = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        data[9] = 0u8.wrapping_sub(sum);
    }

    /// Builds a firmware image with RSDP -> RSDT -> {FADT, MADT}, FACS,
    /// and a DSDT holding an _S5_ package.
    fn firmware_image() -> LinearImage {
        // One contiguous image covering 0xE0000..0x100000 plus the
        // table area at 0x100000..0x110000 is simplest: base at 0xE0000.
        let mut memory = vec![0u8; 0x30000];
        let base = 0xE0000u32;

        let at = |phys: u32| (phys - base) as usize;

        let rsdt_phys = 0xF8000u32;
        let fadt_phys = 0xF8100u32;
        let madt_phys = 0xF8200u32;
        let facs_phys = 0xF8300u32;
        let dsdt_phys = 0xF8400u32;

        // RSDP at 0xE0040.
        let mut rsdp = [0u8; 20];
        rsdp[0..8].copy_from_slice(b"RSD PTR ");
        rsdp[9..15].copy_from_slice(b"MESON ");
        rsdp[16..20].copy_from_slice(&rsdt_phys.to_le_bytes());
        let sum: u8 = rsdp.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        rsdp[8] = 0u8.wrapping_sub(sum);
        memory[at(0xE0040)..at(0xE0040) + 20].copy_from_slice(&rsdp);

        // RSDT with two entries.
        let mut rsdt = vec![0u8; 36 + 8];
        rsdt[0..4].copy_from_slice(b"RSDT");
        rsdt[4..8].copy_from_slice(&(44u32).to_le_bytes());
        rsdt[36..40].copy_from_slice(&fadt_phys.to_le_bytes());
        rsdt[40..44].copy_from_slice(&madt_phys.to_le_bytes());
        checksum_table(&mut rsdt);
        memory[at(rsdt_phys)..at(rsdt_phys) + rsdt.len()].copy_from_slice(&rsdt);

        // FADT pointing at FACS and DSDT, PM1a control at 0x604.
        let mut fadt = vec![0u8; 116];
        fadt[0..4].copy_from_slice(b"FACP");
        fadt[4..8].copy_from_slice(&116u32.to_le_bytes());
        fadt[36..40].copy_from_slice(&facs_phys.to_le_bytes());
        fadt[40..44].copy_from_slice(&dsdt_phys.to_le_bytes());
        fadt[46..48].copy_from_slice(&9u16.to_le_bytes());
        fadt[64..68].copy_from_slice(&0x604u32.to_le_bytes());
        fadt[89] = 2;
        checksum_table(&mut fadt);
        memory[at(fadt_phys)..at(fadt_phys) + fadt.len()].copy_from_slice(&fadt);

        // MADT with one CPU and one I/O APIC.
        let mut madt = vec![0u8; 44];
        madt[0..4].copy_from_slice(b"APIC");
        madt[36..40].copy_from_slice(&0xFEE0_0000u32.to_le_bytes());
        madt.extend_from_slice(&[0, 8, 0, 0, 1, 0, 0, 0]);
        madt.extend_from_slice(&[1, 12, 1, 0]);
        madt.extend_from_slice(&0xFEC0_0000u32.to_le_bytes());
        madt.extend_from_slice(&0u32.to_le_bytes());
        let len = madt.len() as u32;
        madt[4..8].copy_from_slice(&len.to_le_bytes());
        checksum_table(&mut madt);
        memory[at(madt_phys)..at(madt_phys) + madt.len()].copy_from_slice(&madt);

        // FACS.
        let mut facs = vec![0u8; 64];
        facs[0..4].copy_from_slice(b"FACS");
        facs[4..8].copy_from_slice(&64u32.to_le_bytes());
        facs[8..12].copy_from_slice(&0xCAFE_F00Du32.to_le_bytes());
        memory[at(facs_phys)..at(facs_phys) + 64].copy_from_slice(&facs);

        // DSDT with _S5_ = (5, 7).
        let aml = [
            0x08, b'\\', b'_', b'S', b'5', b'_', 0x12, 0x06, 0x02, 0x0A, 0x05, 0x0A, 0x07,
        ];
        let mut dsdt_table = vec![0u8; 36];
        dsdt_table[0..4].copy_from_slice(b"DSDT");
        dsdt_table.extend_from_slice(&aml);
        let len = dsdt_table.len() as u32;
        dsdt_table[4..8].copy_from_slice(&len.to_le_bytes());
        checksum_table(&mut dsdt_table);
        memory[at(dsdt_phys)..at(dsdt_phys) + dsdt_table.len()].copy_from_slice(&dsdt_table);

        LinearImage::new(base, memory)
    }

    #[test]
    fn discover_walks_rsdt_and_copies_tables() {
        let mut firmware = firmware_image();
        let tables = discover(&mut firmware).unwrap();
        assert_eq!(tables.fadt.pm1a_control_block, 0x604);
        assert_eq!(tables.fadt.sci_interrupt, 9);
        assert_eq!(tables.madt_cpus, 1);
        assert_eq!(tables.madt_io_apics, 1);
        assert_eq!(tables.facs.unwrap().hardware_signature, 0xCAFE_F00D);
        assert!(tables.dsdt.is_some());
    }

    #[test]
    fn sleep_values_decode_from_dsdt_copy() {
        let mut firmware = firmware_image();
        let tables = discover(&mut firmware).unwrap();
        let power = AcpiPower {
            fadt: tables.fadt,
            dsdt: tables.dsdt,
        };
        let sleep = power.sleep_values().unwrap();
        assert_eq!(sleep.slp_typ_a, 5 << 10);
        assert_eq!(sleep.slp_typ_b, 7 << 10);
    }

    #[test]
    fn power_off_without_dsdt_is_not_implemented() {
        let mut firmware = firmware_image();
        let tables = discover(&mut firmware).unwrap();
        let power = AcpiPower {
            fadt: tables.fadt,
            dsdt: None,
        };
        assert_eq!(power.sleep_values(), Err(Status::NotImplemented));
    }

    #[test]
    fn detect_publishes_power_device_with_attributes() {
        let mut firmware = firmware_image();
        let mut tree = DeviceTree::new();
        let root = tree.init_root();
        let boot = BootInfo::default();
        let mut ctx = DetectContext {
            firmware: &mut firmware,
            boot: &boot,
            pci_targets: &[],
            mmio: None,
        };

        detect(&mut tree, root, &mut ctx).unwrap();

        let hits = tree.find_type(DeviceClass::Power, Some(DeviceSubclass::PowerAcpi), 1);
        assert_eq!(hits.len(), 1);
        let device = tree.device(hits[0]);
        assert_eq!(device.attrs.get("acpi.sci"), Some(String::from("9")));
        assert_eq!(device.attrs.get("acpi.cpus"), Some(String::from("1")));
        assert!(device.ops.as_power().is_some());
    }

    #[test]
    fn machine_without_acpi_probes_clean() {
        let mut firmware = LinearImage::new(RSDP_AREA_START, vec![0u8; RSDP_AREA_SIZE]);
        let mut tree = DeviceTree::new();
        let root = tree.init_root();
        let boot = BootInfo::default();
        let mut ctx = DetectContext {
            firmware: &mut firmware,
            boot: &boot,
            pci_targets: &[],
            mmio: None,
        };

        detect(&mut tree, root, &mut ctx).unwrap();
        assert!(tree.find_type(DeviceClass::Power, None, 1).is_empty());
    }
}
