//! `meson-acpi` --- a standalone, `no_std` ACPI table parser.
//!
//! This crate provides types and functions for parsing the ACPI tables the
//! kernel consumes during boot: RSDP, RSDT, FADT, FACS, MADT, and the DSDT
//! (only far enough to extract the `_S5_` sleep-type package used for
//! power-off). There is no AML interpreter.
//!
//! All parsing operates on byte slices. The kernel copies each table out of
//! firmware memory before handing it to this crate, so no function here
//! dereferences physical addresses; checksums are validated on the copy.
//!
//! # Usage
//!
//! ```ignore
//! let rsdp = rsdp::scan(bios_area, 0xE0000).ok_or(AcpiError::NotFound)?;
//! let rsdt = rsdt::Rsdt::parse(rsdt_bytes)?;
//! for entry_addr in rsdt.entries() {
//!     // map, copy, and identify each table by signature
//! }
//! ```

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod dsdt;
pub mod facs;
pub mod fadt;
pub mod madt;
pub mod rsdp;
pub mod rsdt;
pub mod sdt;

pub use dsdt::SleepType;
pub use facs::Facs;
pub use fadt::Fadt;
pub use madt::{Madt, MadtEntry, MadtEntryIter};
pub use rsdp::Rsdp;
pub use rsdt::Rsdt;
pub use sdt::SdtHeader;

/// Errors that can occur during ACPI table parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcpiError {
    /// The checksum of a table or the RSDP did not validate (sum != 0).
    InvalidChecksum,
    /// The table signature did not match the expected value.
    InvalidSignature,
    /// A table or structure was too short to contain the expected data.
    TruncatedData,
    /// The requested structure was not found.
    NotFound,
}

/// Read a little-endian `u16` at `offset`, or `None` past the end.
#[must_use]
pub(crate) fn le_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Read a little-endian `u32` at `offset`, or `None` past the end.
#[must_use]
pub(crate) fn le_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
