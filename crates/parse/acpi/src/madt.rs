//! Multiple APIC Description Table (MADT) parsing.
//!
//! The MADT (signature `"APIC"`) describes the interrupt controller
//! topology of the system: local APICs, I/O APICs, and the interrupt
//! source overrides that remap ISA IRQs onto global system interrupts.

use crate::sdt::SdtHeader;
use crate::{AcpiError, le_u16, le_u32, sdt};

/// MADT table signature.
pub const MADT_SIGNATURE: &[u8; 4] = b"APIC";

/// MADT flag bit 0: dual 8259 PICs are installed.
pub const MADT_PCAT_COMPAT: u32 = 1 << 0;

/// Parsed MADT table.
///
/// The entry data is accessed through the [`MadtEntryIter`] iterator
/// returned by [`Madt::entries`].
pub struct Madt<'a> {
    /// Physical address of the local APIC.
    pub local_apic_address: u32,
    /// MADT flags (bit 0: dual 8259 PICs installed).
    pub flags: u32,
    entries_data: &'a [u8],
}

impl<'a> Madt<'a> {
    /// Size of the fixed MADT fields after the SDT header (address + flags).
    const FIELDS_SIZE: usize = 8;

    /// Parse a MADT from a copied byte slice.
    ///
    /// # Errors
    ///
    /// Returns an [`AcpiError`] if the signature, length, or checksum is
    /// invalid.
    pub fn parse(data: &'a [u8]) -> Result<Self, AcpiError> {
        let header = sdt::validate_table(data, MADT_SIGNATURE)?;

        let local_apic_address =
            le_u32(data, SdtHeader::SIZE).ok_or(AcpiError::TruncatedData)?;
        let flags = le_u32(data, SdtHeader::SIZE + 4).ok_or(AcpiError::TruncatedData)?;

        let entries_offset = SdtHeader::SIZE + Self::FIELDS_SIZE;
        let entries_data = data
            .get(entries_offset..header.length as usize)
            .unwrap_or(&[]);

        Ok(Self {
            local_apic_address,
            flags,
            entries_data,
        })
    }

    /// Returns an iterator over the MADT interrupt controller entries.
    #[must_use]
    pub fn entries(&self) -> MadtEntryIter<'a> {
        MadtEntryIter {
            data: self.entries_data,
        }
    }
}

/// A single MADT interrupt controller structure entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MadtEntry {
    /// Type 0: Processor Local APIC.
    LocalApic {
        /// ACPI processor UID.
        processor_id: u8,
        /// The processor's local APIC ID.
        apic_id: u8,
        /// Flags (bit 0: enabled).
        flags: u32,
    },
    /// Type 1: I/O APIC.
    IoApic {
        /// The I/O APIC ID.
        io_apic_id: u8,
        /// Physical address of the I/O APIC registers.
        address: u32,
        /// Global System Interrupt base for this I/O APIC.
        gsi_base: u32,
    },
    /// Type 2: Interrupt Source Override.
    InterruptSourceOverride {
        /// Source bus (always 0: ISA).
        bus: u8,
        /// ISA source IRQ number.
        source: u8,
        /// Global System Interrupt number this source maps to.
        gsi: u32,
        /// MPS INTI flags (polarity in bits 0-1, trigger in bits 2-3).
        flags: u16,
    },
    /// Type 5: Local APIC NMI.
    LocalApicNmi {
        /// ACPI processor UID (0xFF means all processors).
        processor_id: u8,
        /// MPS INTI flags.
        flags: u16,
        /// Local APIC LINT pin (0 or 1).
        lint: u8,
    },
    /// An entry type that is not parsed.
    Unknown {
        /// The entry type byte.
        entry_type: u8,
        /// The entry length including the 2-byte header.
        length: u8,
    },
}

/// Iterator over the variable-length MADT entries.
///
/// Each entry begins with a 2-byte `(type, length)` header. Entries whose
/// declared length is shorter than their fixed layout terminate iteration
/// rather than yielding garbage.
pub struct MadtEntryIter<'a> {
    data: &'a [u8],
}

impl Iterator for MadtEntryIter<'_> {
    type Item = MadtEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < 2 {
            return None;
        }
        let entry_type = self.data[0];
        let length = self.data[1] as usize;
        if length < 2 || length > self.data.len() {
            return None;
        }
        let entry = &self.data[..length];
        self.data = &self.data[length..];

        let parsed = match entry_type {
            0 if length >= 8 => MadtEntry::LocalApic {
                processor_id: entry[2],
                apic_id: entry[3],
                flags: le_u32(entry, 4)?,
            },
            1 if length >= 12 => MadtEntry::IoApic {
                io_apic_id: entry[2],
                address: le_u32(entry, 4)?,
                gsi_base: le_u32(entry, 8)?,
            },
            2 if length >= 10 => MadtEntry::InterruptSourceOverride {
                bus: entry[2],
                source: entry[3],
                gsi: le_u32(entry, 4)?,
                flags: le_u16(entry, 8)?,
            },
            5 if length >= 6 => MadtEntry::LocalApicNmi {
                processor_id: entry[2],
                flags: le_u16(entry, 3)?,
                lint: entry[5],
            },
            _ => MadtEntry::Unknown {
                entry_type,
                length: length as u8,
            },
        };
        Some(parsed)
    }
}
