//! ELF32 header parsing.
//!
//! Parses the ELF32 file header from raw byte slices using safe field
//! extraction via `from_le_bytes()`.

use core::fmt;

/// ELF magic bytes: `\x7fELF`.
const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// ELF class: 32-bit.
const ELFCLASS32: u8 = 1;

/// ELF data encoding: little-endian.
const ELFDATA2LSB: u8 = 1;

/// ELF type: relocatable object.
pub(crate) const ET_REL: u16 = 1;

/// ELF type: executable.
pub(crate) const ET_EXEC: u16 = 2;

/// ELF type: shared object (dynamic library).
pub(crate) const ET_DYN: u16 = 3;

/// ELF machine: Intel 80386.
const EM_386: u16 = 3;

/// Program header type: loadable segment.
pub(crate) const PT_LOAD: u32 = 1;

/// Size of an ELF32 file header (52 bytes).
const ELF32_EHDR_SIZE: usize = 52;

/// Size of an ELF32 program header entry (32 bytes).
pub(crate) const ELF32_PHDR_SIZE: usize = 32;

/// Size of an ELF32 section header entry (40 bytes).
pub(crate) const ELF32_SHDR_SIZE: usize = 40;

/// Read a little-endian `u16` from `data` at byte offset `off`.
///
/// # Panics
///
/// Panics if `off + 2 > data.len()`. Callers must bounds-check first.
pub(crate) fn le_u16(data: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([data[off], data[off + 1]])
}

/// Read a little-endian `u32` from `data` at byte offset `off`.
pub(crate) fn le_u32(data: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}

/// Errors that can occur when parsing an ELF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfError {
    /// The file does not start with the ELF magic bytes.
    BadMagic,
    /// The ELF file is not 32-bit (`ELFCLASS32`).
    UnsupportedClass,
    /// The ELF file is not little-endian.
    UnsupportedEncoding,
    /// The ELF machine type is not `EM_386`.
    UnsupportedMachine,
    /// The ELF type is not `ET_REL`, `ET_EXEC`, or `ET_DYN`.
    UnsupportedType,
    /// The input data is too short for the declared structure.
    Truncated,
    /// A header offset or size is out of bounds.
    InvalidOffset,
}

impl fmt::Display for ElfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic => write!(f, "invalid ELF magic bytes"),
            Self::UnsupportedClass => write!(f, "unsupported ELF class (expected ELFCLASS32)"),
            Self::UnsupportedEncoding => {
                write!(f, "unsupported data encoding (expected little-endian)")
            }
            Self::UnsupportedMachine => write!(f, "unsupported machine type (expected EM_386)"),
            Self::UnsupportedType => write!(f, "unsupported ELF type"),
            Self::Truncated => write!(f, "input data truncated"),
            Self::InvalidOffset => write!(f, "invalid header offset or size"),
        }
    }
}

/// Classification of a parsed ELF image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfType {
    /// Relocatable object file.
    Relocatable,
    /// Executable program.
    Executable,
    /// Shared object / dynamic library.
    SharedObject,
}

/// Parsed ELF32 file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elf32Header {
    /// ELF type (`ET_REL`, `ET_EXEC`, or `ET_DYN`).
    pub e_type: u16,
    /// Target machine architecture.
    pub e_machine: u16,
    /// Virtual address of the entry point.
    pub e_entry: u32,
    /// Offset of the program header table in the file.
    pub e_phoff: u32,
    /// Number of program header entries.
    pub e_phnum: u16,
    /// Size of each program header entry.
    pub e_phentsize: u16,
    /// Offset of the section header table in the file.
    pub e_shoff: u32,
    /// Size of each section header entry.
    pub e_shentsize: u16,
    /// Number of section header entries.
    pub e_shnum: u16,
    /// Section header string table index.
    pub e_shstrndx: u16,
}

impl Elf32Header {
    /// Parse an ELF32 file header from raw bytes.
    ///
    /// Validates the magic, class, encoding, machine type, ELF type, and
    /// that the program header table fits within `data`.
    ///
    /// # Errors
    ///
    /// Returns [`ElfError`] if validation fails or the data is too short.
    pub fn parse(data: &[u8]) -> Result<Self, ElfError> {
        if data.len() < ELF32_EHDR_SIZE {
            return Err(ElfError::Truncated);
        }
        if data[0..4] != ELF_MAGIC {
            return Err(ElfError::BadMagic);
        }
        if data[4] != ELFCLASS32 {
            return Err(ElfError::UnsupportedClass);
        }
        if data[5] != ELFDATA2LSB {
            return Err(ElfError::UnsupportedEncoding);
        }

        let e_type = le_u16(data, 16);
        if e_type != ET_REL && e_type != ET_EXEC && e_type != ET_DYN {
            return Err(ElfError::UnsupportedType);
        }
        let e_machine = le_u16(data, 18);
        if e_machine != EM_386 {
            return Err(ElfError::UnsupportedMachine);
        }

        let header = Self {
            e_type,
            e_machine,
            e_entry: le_u32(data, 24),
            e_phoff: le_u32(data, 28),
            e_phnum: le_u16(data, 44),
            e_phentsize: le_u16(data, 42),
            e_shoff: le_u32(data, 32),
            e_shentsize: le_u16(data, 46),
            e_shnum: le_u16(data, 48),
            e_shstrndx: le_u16(data, 50),
        };

        // The program header table must lie within the file.
        let ph_end = header.e_phoff as usize
            + header.e_phnum as usize * header.e_phentsize as usize;
        if header.e_phnum > 0
            && (header.e_phentsize as usize) < ELF32_PHDR_SIZE
        {
            return Err(ElfError::InvalidOffset);
        }
        if ph_end > data.len() {
            return Err(ElfError::InvalidOffset);
        }

        Ok(header)
    }

    /// Returns the classification of this image.
    #[must_use]
    pub fn elf_type(&self) -> ElfType {
        match self.e_type {
            ET_REL => ElfType::Relocatable,
            ET_EXEC => ElfType::Executable,
            _ => ElfType::SharedObject,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_header(e_type: u16) -> Vec<u8> {
        let mut data = vec![0u8; ELF32_EHDR_SIZE];
        data[0..4].copy_from_slice(&ELF_MAGIC);
        data[4] = ELFCLASS32;
        data[5] = ELFDATA2LSB;
        data[6] = 1; // EV_CURRENT
        data[16..18].copy_from_slice(&e_type.to_le_bytes());
        data[18..20].copy_from_slice(&EM_386.to_le_bytes());
        data[24..28].copy_from_slice(&0x0804_8000u32.to_le_bytes());
        data[42..44].copy_from_slice(&(ELF32_PHDR_SIZE as u16).to_le_bytes());
        data[46..48].copy_from_slice(&(ELF32_SHDR_SIZE as u16).to_le_bytes());
        data
    }

    #[test]
    fn parses_executable_header() {
        let data = minimal_header(ET_EXEC);
        let header = Elf32Header::parse(&data).unwrap();
        assert_eq!(header.elf_type(), ElfType::Executable);
        assert_eq!(header.e_entry, 0x0804_8000);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = minimal_header(ET_EXEC);
        data[0] = 0;
        assert_eq!(Elf32Header::parse(&data), Err(ElfError::BadMagic));
    }

    #[test]
    fn rejects_elf64_class() {
        let mut data = minimal_header(ET_EXEC);
        data[4] = 2;
        assert_eq!(Elf32Header::parse(&data), Err(ElfError::UnsupportedClass));
    }

    #[test]
    fn rejects_wrong_machine() {
        let mut data = minimal_header(ET_EXEC);
        data[18..20].copy_from_slice(&62u16.to_le_bytes());
        assert_eq!(Elf32Header::parse(&data), Err(ElfError::UnsupportedMachine));
    }

    #[test]
    fn rejects_program_table_past_eof() {
        let mut data = minimal_header(ET_EXEC);
        data[28..32].copy_from_slice(&4096u32.to_le_bytes());
        data[44..46].copy_from_slice(&2u16.to_le_bytes());
        assert_eq!(Elf32Header::parse(&data), Err(ElfError::InvalidOffset));
    }
}
