//! DSDT `_S5_` sleep-package extraction.
//!
//! The DSDT contains AML bytecode. This kernel does not interpret AML; the
//! only thing it needs from the DSDT is the `_S5_` package holding the
//! `SLP_TYP` values written to the PM1 control blocks to power the machine
//! off. The package is located by a raw byte scan for the `_S5_` name
//! preceded by a `NameOp` (0x08, optionally through a leading root-prefix
//! `'\'`) and followed by a `PackageOp` (0x12).

use crate::sdt::SdtHeader;
use crate::{AcpiError, sdt};

/// DSDT table signature.
pub const DSDT_SIGNATURE: &[u8; 4] = b"DSDT";

/// `SLP_EN` bit in the PM1 control registers.
pub const SLP_EN: u16 = 1 << 13;

/// AML `NameOp` opcode.
const AML_NAME_OP: u8 = 0x08;
/// AML `PackageOp` opcode.
const AML_PACKAGE_OP: u8 = 0x12;
/// AML `BytePrefix` opcode.
const AML_BYTE_PREFIX: u8 = 0x0A;
/// AML root-character prefix.
const AML_ROOT_CHAR: u8 = b'\\';

/// Sleep-type values extracted from the `_S5_` package.
///
/// Both values are pre-shifted into the `SLP_TYP` field position (bits
/// 10-12) of the PM1 control registers, so powering off is
/// `out16(pm1a_control_block, SLP_EN | slp_typ_a)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepType {
    /// `SLP_TYPa`, shifted for PM1a_CNT.
    pub slp_typ_a: u16,
    /// `SLP_TYPb`, shifted for PM1b_CNT.
    pub slp_typ_b: u16,
}

/// Validate a copied DSDT table.
///
/// # Errors
///
/// Returns an [`AcpiError`] if the signature, length, or checksum is
/// invalid.
pub fn validate(data: &[u8]) -> Result<SdtHeader, AcpiError> {
    sdt::validate_table(data, DSDT_SIGNATURE)
}

/// Scan a DSDT (header included) for the `_S5_` package and extract the
/// sleep-type values.
///
/// The scan accepts `08 '_S5_' 12` and `08 '\' '_S5_' 12` forms. After the
/// `PackageOp`, the variable-width `PkgLength` and the element count are
/// skipped, then each sleep-type element is read with its optional
/// `BytePrefix`.
///
/// # Errors
///
/// Returns [`AcpiError::NotFound`] if the DSDT contains no well-formed
/// `_S5_` package, or [`AcpiError::TruncatedData`] if the package runs off
/// the end of the table.
pub fn find_s5(data: &[u8]) -> Result<SleepType, AcpiError> {
    let mut offset = SdtHeader::SIZE;

    while offset + 5 <= data.len() {
        if &data[offset..offset + 4] != b"_S5_" {
            offset += 1;
            continue;
        }

        let name_op = (offset >= 1 && data[offset - 1] == AML_NAME_OP)
            || (offset >= 2
                && data[offset - 2] == AML_NAME_OP
                && data[offset - 1] == AML_ROOT_CHAR);

        if !name_op || data[offset + 4] != AML_PACKAGE_OP {
            // The name appeared in some other context (a string, a
            // comment in the AML source). The original hardware never
            // carries more than one _S5_ definition.
            return Err(AcpiError::NotFound);
        }

        // Skip past the name and the PackageOp.
        let mut pos = offset + 5;

        // PkgLength: the top two bits of the lead byte give the number of
        // extra length bytes; skip those, the lead byte, and the element
        // count byte.
        let lead = *data.get(pos).ok_or(AcpiError::TruncatedData)?;
        pos += ((lead & 0xC0) >> 6) as usize + 2;

        let mut read_element = |pos: &mut usize| -> Result<u16, AcpiError> {
            let mut byte = *data.get(*pos).ok_or(AcpiError::TruncatedData)?;
            if byte == AML_BYTE_PREFIX {
                *pos += 1;
                byte = *data.get(*pos).ok_or(AcpiError::TruncatedData)?;
            }
            *pos += 1;
            Ok(u16::from(byte) << 10)
        };

        let slp_typ_a = read_element(&mut pos)?;
        let slp_typ_b = read_element(&mut pos)?;
        return Ok(SleepType {
            slp_typ_a,
            slp_typ_b,
        });
    }

    Err(AcpiError::NotFound)
}
