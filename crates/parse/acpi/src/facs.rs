//! Firmware ACPI Control Structure (FACS) parsing.
//!
//! The FACS is pointed to by the FADT's `firmware_ctrl` field. Unlike every
//! other ACPI table it carries no checksum byte, so only the signature and
//! length are validated.

use crate::{AcpiError, le_u32};

/// FACS structure signature.
pub const FACS_SIGNATURE: &[u8; 4] = b"FACS";

/// Parsed FACS fields.
#[derive(Debug, Clone, Copy)]
pub struct Facs {
    /// Total length of the structure in bytes (at least 64).
    pub length: u32,
    /// Firmware's hardware configuration signature.
    pub hardware_signature: u32,
    /// Physical address the firmware jumps to on wake.
    pub waking_vector: u32,
    /// Global lock word shared with the firmware.
    pub global_lock: u32,
}

impl Facs {
    /// Minimum FACS length defined by ACPI 1.0.
    pub const MIN_SIZE: usize = 64;

    /// Parse a FACS from a copied byte slice.
    ///
    /// # Errors
    ///
    /// Returns [`AcpiError::InvalidSignature`] on a signature mismatch or
    /// [`AcpiError::TruncatedData`] if the structure is shorter than 64
    /// bytes.
    pub fn parse(data: &[u8]) -> Result<Self, AcpiError> {
        if data.len() < Self::MIN_SIZE {
            return Err(AcpiError::TruncatedData);
        }
        if &data[0..4] != FACS_SIGNATURE {
            return Err(AcpiError::InvalidSignature);
        }

        let short = AcpiError::TruncatedData;
        Ok(Self {
            length: le_u32(data, 4).ok_or(short)?,
            hardware_signature: le_u32(data, 8).ok_or(short)?,
            waking_vector: le_u32(data, 12).ok_or(short)?,
            global_lock: le_u32(data, 16).ok_or(short)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reads_fields() {
        let mut data = vec![0u8; 64];
        data[0..4].copy_from_slice(FACS_SIGNATURE);
        data[4..8].copy_from_slice(&64u32.to_le_bytes());
        data[8..12].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        let facs = Facs::parse(&data).unwrap();
        assert_eq!(facs.length, 64);
        assert_eq!(facs.hardware_signature, 0xDEAD_BEEF);
    }

    #[test]
    fn short_structure_rejected() {
        let data = vec![0u8; 32];
        assert!(matches!(Facs::parse(&data), Err(AcpiError::TruncatedData)));
    }
}
