//! Fixed ACPI Description Table (FADT) parsing.
//!
//! The FADT (signature `"FACP"`) carries the fixed-hardware register
//! locations the kernel needs: the PM1a/PM1b control blocks written during
//! power-off, the SMI command port, and the physical addresses of the FACS
//! and DSDT.

use crate::{AcpiError, le_u16, le_u32, sdt};

/// FADT table signature.
pub const FADT_SIGNATURE: &[u8; 4] = b"FACP";

/// Parsed FADT fields used by the kernel.
///
/// Only the ACPI 1.0 32-bit fields are read; the extended 64-bit address
/// blocks introduced later duplicate these for hardware this kernel does
/// not target.
#[derive(Debug, Clone, Copy)]
pub struct Fadt {
    /// Physical address of the FACS.
    pub firmware_ctrl: u32,
    /// Physical address of the DSDT.
    pub dsdt_address: u32,
    /// System vector of the SCI interrupt.
    pub sci_interrupt: u16,
    /// I/O port of the SMI command register.
    pub smi_command: u32,
    /// Value written to `smi_command` to take over from the firmware.
    pub acpi_enable: u8,
    /// Value written to `smi_command` to hand control back.
    pub acpi_disable: u8,
    /// PM1a event register block I/O port.
    pub pm1a_event_block: u32,
    /// PM1b event register block I/O port (0 if absent).
    pub pm1b_event_block: u32,
    /// PM1a control register block I/O port.
    pub pm1a_control_block: u32,
    /// PM1b control register block I/O port (0 if absent).
    pub pm1b_control_block: u32,
    /// Number of bytes decoded by each PM1 event block.
    pub pm1_event_length: u8,
    /// Number of bytes decoded by each PM1 control block.
    pub pm1_control_length: u8,
}

impl Fadt {
    /// Parse a FADT from a copied byte slice.
    ///
    /// # Errors
    ///
    /// Returns an [`AcpiError`] if the signature, length, or checksum is
    /// invalid, or the table is shorter than the ACPI 1.0 fixed layout.
    pub fn parse(data: &[u8]) -> Result<Self, AcpiError> {
        sdt::validate_table(data, FADT_SIGNATURE)?;

        // The ACPI 1.0 FADT is 116 bytes; everything we read lies below
        // offset 90.
        let short = AcpiError::TruncatedData;
        Ok(Self {
            firmware_ctrl: le_u32(data, 36).ok_or(short)?,
            dsdt_address: le_u32(data, 40).ok_or(short)?,
            sci_interrupt: le_u16(data, 46).ok_or(short)?,
            smi_command: le_u32(data, 48).ok_or(short)?,
            acpi_enable: *data.get(52).ok_or(short)?,
            acpi_disable: *data.get(53).ok_or(short)?,
            pm1a_event_block: le_u32(data, 56).ok_or(short)?,
            pm1b_event_block: le_u32(data, 60).ok_or(short)?,
            pm1a_control_block: le_u32(data, 64).ok_or(short)?,
            pm1b_control_block: le_u32(data, 68).ok_or(short)?,
            pm1_event_length: *data.get(88).ok_or(short)?,
            pm1_control_length: *data.get(89).ok_or(short)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdt::SdtHeader;

    fn make_fadt() -> Vec<u8> {
        let mut data = vec![0u8; 116];
        data[0..4].copy_from_slice(FADT_SIGNATURE);
        data[4..8].copy_from_slice(&116u32.to_le_bytes());
        data[36..40].copy_from_slice(&0x7FE2000u32.to_le_bytes()); // FACS
        data[40..44].copy_from_slice(&0x7FE3000u32.to_le_bytes()); // DSDT
        data[46..48].copy_from_slice(&9u16.to_le_bytes()); // SCI
        data[64..68].copy_from_slice(&0x604u32.to_le_bytes()); // PM1a_CNT
        data[68..72].copy_from_slice(&0u32.to_le_bytes()); // PM1b_CNT
        data[89] = 2;
        let sum: u8 = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        data[9] = 0u8.wrapping_sub(sum);
        data
    }

    #[test]
    fn parse_reads_control_blocks() {
        let data = make_fadt();
        let fadt = Fadt::parse(&data).unwrap();
        assert_eq!(fadt.dsdt_address, 0x7FE3000);
        assert_eq!(fadt.firmware_ctrl, 0x7FE2000);
        assert_eq!(fadt.pm1a_control_block, 0x604);
        assert_eq!(fadt.pm1b_control_block, 0);
        assert_eq!(fadt.sci_interrupt, 9);
        assert_eq!(fadt.pm1_control_length, 2);
    }

    #[test]
    fn too_short_table_rejected() {
        let mut data = make_fadt();
        data.truncate(SdtHeader::SIZE);
        data[4..8].copy_from_slice(&(SdtHeader::SIZE as u32).to_le_bytes());
        let sum: u8 = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        data[9] = data[9].wrapping_sub(sum);
        assert!(matches!(Fadt::parse(&data), Err(AcpiError::TruncatedData)));
    }
}
