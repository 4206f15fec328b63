//! ELF executable class operations.
//!
//! Implements symbol extraction, program/library layout, and relocation
//! linking over the `meson-elf` parser. Layout produces an in-memory
//! image; actually mapping it into an address space belongs to the
//! memory manager above this module.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use meson_elf::{
    Elf32SectionHeader, ElfFile, SHT_REL, SHT_STRTAB, SHT_SYMTAB, STB_GLOBAL, STB_WEAK, STT_FUNC,
    StringTable, compute_x86_reloc, section,
};

use super::{ExecutableOps, LoadedSegment, ProgramImage, Relocation, RelocationTable, Symbol};
use crate::status::Status;

/// The ELF executable class driver.
pub struct ElfOps;

fn string_table_for<'a>(
    elf: &ElfFile<'a>,
    symtab: &Elf32SectionHeader,
) -> Option<StringTable<'a>> {
    let sections: Vec<_> = elf.sections().collect();
    let strtab = sections.get(symtab.sh_link as usize)?;
    if strtab.sh_type != SHT_STRTAB {
        return None;
    }
    Some(StringTable::new(strtab.data(elf.data())?))
}

fn image_from_segments(elf: &ElfFile<'_>) -> Result<ProgramImage, Status> {
    let mut segments = Vec::new();
    for seg in elf.load_segments() {
        segments.push(LoadedSegment {
            vaddr: seg.vaddr,
            memsz: seg.memsz,
            flags: seg.flags,
            data: seg.data.to_vec(),
        });
    }
    if segments.is_empty() {
        return Err(Status::Invalid);
    }
    Ok(ProgramImage {
        entry: elf.entry_point(),
        segments,
    })
}

impl ExecutableOps for ElfOps {
    fn get_symbols(&self, data: &[u8]) -> Result<Vec<Symbol>, Status> {
        let elf = ElfFile::parse(data)?;
        let Some((symtab, symtab_data)) = elf.section_by_type(SHT_SYMTAB) else {
            return Ok(Vec::new());
        };
        let strings = string_table_for(&elf, &symtab);

        let mut symbols = Vec::new();
        for sym in section::symbols(symtab_data) {
            if !sym.is_defined() {
                continue;
            }
            let name = strings
                .as_ref()
                .and_then(|s| s.get(sym.st_name))
                .unwrap_or("");
            if name.is_empty() {
                continue;
            }
            symbols.push(Symbol {
                name: String::from(name),
                value: sym.st_value,
                size: sym.st_size,
                function: sym.sym_type() == STT_FUNC,
                global: matches!(sym.binding(), STB_GLOBAL | STB_WEAK),
            });
        }
        Ok(symbols)
    }

    fn layout_executable(&self, data: &[u8]) -> Result<ProgramImage, Status> {
        let elf = ElfFile::parse(data)?;
        if elf.header().elf_type() != meson_elf::ElfType::Executable {
            return Err(Status::Invalid);
        }
        image_from_segments(&elf)
    }

    fn layout_library(&self, data: &[u8]) -> Result<ProgramImage, Status> {
        let elf = ElfFile::parse(data)?;
        if elf.header().elf_type() != meson_elf::ElfType::SharedObject {
            return Err(Status::Invalid);
        }
        image_from_segments(&elf)
    }

    fn relocations(&self, data: &[u8]) -> Result<RelocationTable, Status> {
        let elf = ElfFile::parse(data)?;
        let mut table = RelocationTable::new();

        let sections: Vec<_> = elf.sections().collect();
        for section_header in &sections {
            if section_header.sh_type != SHT_REL {
                continue;
            }
            let Some(rel_data) = section_header.data(elf.data()) else {
                continue;
            };
            // The symbol table the entries refer to.
            let Some(symtab) = sections.get(section_header.sh_link as usize) else {
                continue;
            };
            let Some(symtab_data) = symtab.data(elf.data()) else {
                continue;
            };
            let strings = string_table_for(&elf, symtab);
            let symbols: Vec<_> = section::symbols(symtab_data).collect();

            for rel in meson_elf::RelIter::new(rel_data) {
                let name = symbols
                    .get(rel.r_sym as usize)
                    .and_then(|sym| strings.as_ref().and_then(|s| s.get(sym.st_name)))
                    .unwrap_or("");
                table.push(Relocation {
                    offset: rel.r_offset,
                    symbol_name: String::from(name),
                    info: rel.r_type,
                    addend: 0,
                });
            }
        }
        Ok(table)
    }

    fn link(
        &self,
        image: &mut ProgramImage,
        relocations: &RelocationTable,
        symbols: &[Symbol],
    ) -> Result<(), Status> {
        for reloc in relocations {
            let symbol_value = symbols
                .iter()
                .find(|s| s.name == reloc.symbol_name)
                .map(|s| s.value)
                .ok_or(Status::NoSuchEntry)?;

            // Locate the segment holding the relocation site.
            let segment = image
                .segments
                .iter_mut()
                .find(|seg| {
                    reloc.offset >= seg.vaddr
                        && (reloc.offset + 4) <= seg.vaddr + seg.data.len() as u32
                })
                .ok_or(Status::Invalid)?;

            let site = (reloc.offset - segment.vaddr) as usize;
            // x86 REL entries keep the addend in the site itself.
            let implicit = u32::from_le_bytes([
                segment.data[site],
                segment.data[site + 1],
                segment.data[site + 2],
                segment.data[site + 3],
            ]);
            let addend = implicit.wrapping_add(reloc.addend);

            let value = compute_x86_reloc(reloc.info, symbol_value, addend, reloc.offset, 0)
                .map_err(|_| Status::Invalid)?;
            if let Some(value) = value {
                segment.data[site..site + 4].copy_from_slice(&value.to_le_bytes());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meson_elf::R_386_32;

    /// Build an ELF32 executable with one PT_LOAD segment, a symbol
    /// table, and a string table.
    fn sample_elf() -> Vec<u8> {
        const PHOFF: usize = 52;
        const SEG_DATA: &[u8] = &[0xC3, 0, 0, 0, 0x10, 0x20, 0x30, 0x40];
        let seg_off = 52 + 32;
        let symtab_off = seg_off + SEG_DATA.len();
        // Two symbols: null + "entry".
        let strtab: &[u8] = b"\0entry\0";
        let mut symtab = vec![0u8; 16];
        {
            let mut sym = vec![0u8; 16];
            sym[0..4].copy_from_slice(&1u32.to_le_bytes()); // name offset
            sym[4..8].copy_from_slice(&0x1000u32.to_le_bytes()); // value
            sym[8..12].copy_from_slice(&1u32.to_le_bytes()); // size
            sym[12] = (STB_GLOBAL << 4) | STT_FUNC;
            sym[14..16].copy_from_slice(&1u16.to_le_bytes()); // defined
            symtab.extend_from_slice(&sym);
        }
        let strtab_off = symtab_off + symtab.len();
        let shoff = strtab_off + strtab.len();

        let mut data = vec![0u8; 52];
        data[0..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
        data[4] = 1;
        data[5] = 1;
        data[16..18].copy_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        data[18..20].copy_from_slice(&3u16.to_le_bytes()); // EM_386
        data[24..28].copy_from_slice(&0x1000u32.to_le_bytes()); // entry
        data[28..32].copy_from_slice(&(PHOFF as u32).to_le_bytes());
        data[32..36].copy_from_slice(&(shoff as u32).to_le_bytes());
        data[42..44].copy_from_slice(&32u16.to_le_bytes()); // phentsize
        data[44..46].copy_from_slice(&1u16.to_le_bytes()); // phnum
        data[46..48].copy_from_slice(&40u16.to_le_bytes()); // shentsize
        data[48..50].copy_from_slice(&3u16.to_le_bytes()); // shnum

        // Program header: PT_LOAD at vaddr 0x1000.
        let mut ph = vec![0u8; 32];
        ph[0..4].copy_from_slice(&1u32.to_le_bytes());
        ph[4..8].copy_from_slice(&(seg_off as u32).to_le_bytes());
        ph[8..12].copy_from_slice(&0x1000u32.to_le_bytes());
        ph[16..20].copy_from_slice(&(SEG_DATA.len() as u32).to_le_bytes());
        ph[20..24].copy_from_slice(&(SEG_DATA.len() as u32).to_le_bytes());
        ph[24..28].copy_from_slice(&5u32.to_le_bytes());
        data.extend_from_slice(&ph);

        data.extend_from_slice(SEG_DATA);
        data.extend_from_slice(&symtab);
        data.extend_from_slice(strtab);

        // Section headers: null, symtab (link -> 2), strtab.
        let mut sh0 = vec![0u8; 40];
        let mut sh1 = vec![0u8; 40];
        sh1[4..8].copy_from_slice(&SHT_SYMTAB.to_le_bytes());
        sh1[16..20].copy_from_slice(&(symtab_off as u32).to_le_bytes());
        sh1[20..24].copy_from_slice(&(symtab.len() as u32).to_le_bytes());
        sh1[24..28].copy_from_slice(&2u32.to_le_bytes()); // sh_link -> strtab
        let mut sh2 = vec![0u8; 40];
        sh2[4..8].copy_from_slice(&SHT_STRTAB.to_le_bytes());
        sh2[16..20].copy_from_slice(&(strtab_off as u32).to_le_bytes());
        sh2[20..24].copy_from_slice(&(strtab.len() as u32).to_le_bytes());

        data.append(&mut sh0);
        data.append(&mut sh1);
        data.append(&mut sh2);
        data
    }

    #[test]
    fn symbols_come_back_named_and_typed() {
        let data = sample_elf();
        let symbols = ElfOps.get_symbols(&data).unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "entry");
        assert_eq!(symbols[0].value, 0x1000);
        assert!(symbols[0].function);
        assert!(symbols[0].global);
    }

    #[test]
    fn layout_collects_load_segments() {
        let data = sample_elf();
        let image = ElfOps.layout_executable(&data).unwrap();
        assert_eq!(image.entry, 0x1000);
        assert_eq!(image.segments.len(), 1);
        assert_eq!(image.segments[0].vaddr, 0x1000);
        assert_eq!(image.segments[0].data[0], 0xC3);
    }

    #[test]
    fn layout_library_rejects_executables() {
        let data = sample_elf();
        assert!(matches!(
            ElfOps.layout_library(&data),
            Err(Status::Invalid)
        ));
    }

    #[test]
    fn link_applies_absolute_relocation_in_place() {
        let data = sample_elf();
        let mut image = ElfOps.layout_executable(&data).unwrap();
        // Site at vaddr 0x1004 currently holds 0x40302010 (the addend).
        let mut relocs = RelocationTable::new();
        relocs.push(Relocation {
            offset: 0x1004,
            symbol_name: String::from("entry"),
            info: R_386_32,
            addend: 0,
        });
        let symbols = ElfOps.get_symbols(&data).unwrap();
        ElfOps.link(&mut image, &relocs, &symbols).unwrap();

        let patched = u32::from_le_bytes(image.segments[0].data[4..8].try_into().unwrap());
        assert_eq!(patched, 0x1000u32.wrapping_add(0x4030_2010));
    }

    #[test]
    fn link_with_unknown_symbol_fails() {
        let data = sample_elf();
        let mut image = ElfOps.layout_executable(&data).unwrap();
        let mut relocs = RelocationTable::new();
        relocs.push(Relocation {
            offset: 0x1004,
            symbol_name: String::from("missing"),
            info: R_386_32,
            addend: 0,
        });
        assert!(matches!(
            ElfOps.link(&mut image, &relocs, &[]),
            Err(Status::NoSuchEntry)
        ));
    }
}
