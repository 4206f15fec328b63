//! Minimal ELF32 parser for the Meson loader.
//!
//! Parses ELF32 headers, `PT_LOAD` segments, symbol tables, and `SHT_REL`
//! relocations from raw byte slices using safe field extraction
//! (`from_le_bytes`). No unsafe code, no allocations.
//!
//! # Usage
//!
//! ```ignore
//! let elf = ElfFile::parse(data)?;
//! let entry = elf.entry_point();
//! for seg in elf.load_segments() {
//!     // Map seg.data at seg.vaddr, zero-fill to seg.memsz
//! }
//! ```

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

pub mod header;
pub mod reloc;
pub mod section;
pub mod segment;

pub use header::{Elf32Header, ElfError, ElfType};
pub use reloc::{
    Elf32Rel, R_386_32, R_386_GLOB_DAT, R_386_JMP_SLOT, R_386_NONE, R_386_PC32, R_386_RELATIVE,
    RelIter, compute_x86_reloc,
};
pub use section::{
    Elf32SectionHeader, Elf32Symbol, SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE, SHN_UNDEF, SHT_REL,
    SHT_STRTAB, SHT_SYMTAB, STB_GLOBAL, STB_WEAK, STT_FUNC, StringTable,
};
pub use segment::{ElfFile, LoadSegment};
