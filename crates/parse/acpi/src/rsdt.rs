//! Root System Description Table (RSDT) parsing.
//!
//! The RSDT is an SDT whose body is an array of 32-bit physical addresses,
//! one per ACPI table installed by the firmware. The kernel maps and copies
//! each pointed-to table in turn and identifies it by signature.

use crate::sdt::SdtHeader;
use crate::{AcpiError, le_u32, sdt};

/// RSDT table signature.
pub const RSDT_SIGNATURE: &[u8; 4] = b"RSDT";

/// Parsed RSDT holding the validated entry-pointer region.
pub struct Rsdt<'a> {
    /// The validated SDT header.
    pub header: SdtHeader,
    entries: &'a [u8],
}

impl<'a> Rsdt<'a> {
    /// Parse an RSDT from a copied byte slice.
    ///
    /// # Errors
    ///
    /// Returns an [`AcpiError`] if the signature, length, or checksum is
    /// invalid.
    pub fn parse(data: &'a [u8]) -> Result<Self, AcpiError> {
        let header = sdt::validate_table(data, RSDT_SIGNATURE)?;
        let entries = &data[SdtHeader::SIZE..header.length as usize];
        Ok(Self { header, entries })
    }

    /// Returns the number of table pointers in this RSDT.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len() / 4
    }

    /// Returns `true` if the RSDT contains no table pointers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() < 4
    }

    /// Returns an iterator over the physical addresses of the listed tables.
    pub fn entries(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.len()).filter_map(|i| le_u32(self.entries, i * 4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_rsdt(addrs: &[u32]) -> Vec<u8> {
        let mut data = vec![0u8; SdtHeader::SIZE];
        data[0..4].copy_from_slice(RSDT_SIGNATURE);
        for addr in addrs {
            data.extend_from_slice(&addr.to_le_bytes());
        }
        let len = data.len() as u32;
        data[4..8].copy_from_slice(&len.to_le_bytes());
        let sum: u8 = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        data[9] = 0u8.wrapping_sub(sum);
        data
    }

    #[test]
    fn entries_iterate_in_order() {
        let data = make_rsdt(&[0x1000, 0x2000, 0x3000]);
        let rsdt = Rsdt::parse(&data).unwrap();
        assert_eq!(rsdt.len(), 3);
        assert_eq!(rsdt.entries().collect::<Vec<_>>(), [0x1000, 0x2000, 0x3000]);
    }

    #[test]
    fn empty_rsdt_yields_nothing() {
        let data = make_rsdt(&[]);
        let rsdt = Rsdt::parse(&data).unwrap();
        assert!(rsdt.is_empty());
        assert_eq!(rsdt.entries().count(), 0);
    }
}
