//! ELF32 file view and `PT_LOAD` segment iteration.

use crate::header::{ELF32_SHDR_SIZE, Elf32Header, ElfError, PT_LOAD, le_u32};
use crate::section::Elf32SectionHeader;

/// A loadable program segment.
#[derive(Debug, Clone, Copy)]
pub struct LoadSegment<'a> {
    /// Virtual address the segment should be mapped at.
    pub vaddr: u32,
    /// Size of the segment in memory (may exceed `data.len()`; the
    /// remainder is zero-filled BSS).
    pub memsz: u32,
    /// Segment flags (1 = execute, 2 = write, 4 = read).
    pub flags: u32,
    /// The file-backed portion of the segment.
    pub data: &'a [u8],
}

/// A parsed view over an ELF32 file.
pub struct ElfFile<'a> {
    header: Elf32Header,
    data: &'a [u8],
}

impl<'a> ElfFile<'a> {
    /// Parse an ELF32 image from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns [`ElfError`] if the header fails validation.
    pub fn parse(data: &'a [u8]) -> Result<Self, ElfError> {
        let header = Elf32Header::parse(data)?;
        Ok(Self { header, data })
    }

    /// Returns the parsed file header.
    #[must_use]
    pub fn header(&self) -> &Elf32Header {
        &self.header
    }

    /// Returns the program entry point virtual address.
    #[must_use]
    pub fn entry_point(&self) -> u32 {
        self.header.e_entry
    }

    /// Returns the underlying file bytes.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns an iterator over the `PT_LOAD` segments.
    ///
    /// Segments whose file ranges fall outside the image are skipped.
    pub fn load_segments(&self) -> impl Iterator<Item = LoadSegment<'a>> + '_ {
        let phoff = self.header.e_phoff as usize;
        let phentsize = self.header.e_phentsize as usize;
        let data = self.data;

        (0..self.header.e_phnum as usize).filter_map(move |i| {
            let off = phoff + i * phentsize;
            let p_type = le_u32(data, off);
            if p_type != PT_LOAD {
                return None;
            }
            let p_offset = le_u32(data, off + 4) as usize;
            let vaddr = le_u32(data, off + 8);
            let filesz = le_u32(data, off + 16) as usize;
            let memsz = le_u32(data, off + 20);
            let flags = le_u32(data, off + 24);

            let file_data = data.get(p_offset..p_offset.checked_add(filesz)?)?;
            Some(LoadSegment {
                vaddr,
                memsz,
                flags,
                data: file_data,
            })
        })
    }

    /// Returns an iterator over all section headers.
    ///
    /// Yields nothing if the section header table lies outside the image.
    pub fn sections(&self) -> impl Iterator<Item = Elf32SectionHeader> + '_ {
        let shoff = self.header.e_shoff as usize;
        let shentsize = (self.header.e_shentsize as usize).max(ELF32_SHDR_SIZE);
        let shnum = self.header.e_shnum as usize;
        let data = self.data;

        (0..shnum).filter_map(move |i| {
            let off = shoff + i * shentsize;
            if off + ELF32_SHDR_SIZE > data.len() {
                return None;
            }
            Some(Elf32SectionHeader::parse(data, off))
        })
    }

    /// Find the first section of the given type, together with its data.
    #[must_use]
    pub fn section_by_type(&self, sh_type: u32) -> Option<(Elf32SectionHeader, &'a [u8])> {
        self.sections().find_map(|sh| {
            if sh.sh_type == sh_type {
                sh.data(self.data).map(|d| (sh, d))
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{ELF32_PHDR_SIZE, ET_EXEC};

    /// Builds an ELF with one PT_LOAD segment containing `payload`.
    fn make_exec(payload: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; 52 + ELF32_PHDR_SIZE];
        data[0..4].copy_from_slice(&[0x7f, b'E', b'L', b'F']);
        data[4] = 1; // ELFCLASS32
        data[5] = 1; // little-endian
        data[16..18].copy_from_slice(&ET_EXEC.to_le_bytes());
        data[18..20].copy_from_slice(&3u16.to_le_bytes()); // EM_386
        data[24..28].copy_from_slice(&0x0804_8000u32.to_le_bytes());
        data[28..32].copy_from_slice(&52u32.to_le_bytes()); // phoff
        data[42..44].copy_from_slice(&(ELF32_PHDR_SIZE as u16).to_le_bytes());
        data[44..46].copy_from_slice(&1u16.to_le_bytes()); // phnum

        let seg_off = data.len() as u32;
        let ph = 52;
        data[ph..ph + 4].copy_from_slice(&PT_LOAD.to_le_bytes());
        data[ph + 4..ph + 8].copy_from_slice(&seg_off.to_le_bytes());
        data[ph + 8..ph + 12].copy_from_slice(&0x0804_8000u32.to_le_bytes());
        data[ph + 16..ph + 20].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        data[ph + 20..ph + 24].copy_from_slice(&(payload.len() as u32 + 16).to_le_bytes());
        data[ph + 24..ph + 28].copy_from_slice(&5u32.to_le_bytes()); // R+X
        data.extend_from_slice(payload);
        data
    }

    #[test]
    fn load_segment_extraction() {
        let data = make_exec(b"\xC3code");
        let elf = ElfFile::parse(&data).unwrap();
        assert_eq!(elf.entry_point(), 0x0804_8000);

        let segs: Vec<_> = elf.load_segments().collect();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].vaddr, 0x0804_8000);
        assert_eq!(segs[0].data, b"\xC3code");
        assert_eq!(segs[0].memsz, segs[0].data.len() as u32 + 16);
    }

    #[test]
    fn segment_past_eof_is_skipped() {
        let mut data = make_exec(b"x");
        // Point the segment's file offset past the end of the image.
        data[52 + 4..52 + 8].copy_from_slice(&0xFFFFu32.to_le_bytes());
        let elf = ElfFile::parse(&data).unwrap();
        assert_eq!(elf.load_segments().count(), 0);
    }
}
