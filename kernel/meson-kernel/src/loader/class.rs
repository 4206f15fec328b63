//! File class recognition.
//!
//! A byte buffer is classified by running the class drivers' detect
//! functions in a fixed precedence order and taking the first positive
//! match. Magic-number formats go first; the text/config/binary triple
//! at the tail guarantees every buffer lands somewhere.

extern crate alloc;

use alloc::string::String;

use bitflags::bitflags;

bitflags! {
    /// Classification bits carried by a [`FileClassInfo`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileClassBits: u32 {
        /// Plain text content.
        const TEXT    = 1 << 0;
        /// Binary content.
        const BIN     = 1 << 1;
        /// Statically linked.
        const STATIC  = 1 << 2;
        /// Dynamically linked.
        const DYNAMIC = 1 << 3;
        /// Executable program.
        const EXEC    = 1 << 4;
        /// Shared library.
        const LIB     = 1 << 5;
        /// Image data.
        const IMAGE   = 1 << 6;
        /// Font data.
        const FONT    = 1 << 7;
        /// Configuration data.
        const CONFIG  = 1 << 8;
        /// Boot sector.
        const BOOT    = 1 << 9;
        /// Plain data (catch-all qualifier).
        const DATA    = 1 << 10;
        /// Relocatable object.
        const OBJECT  = 1 << 11;
    }
}

/// Subclass refinement for classes with several file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSubclass {
    /// No subclass.
    None,
    /// Windows bitmap image.
    Bmp,
    /// Windows icon image.
    Ico,
    /// JPEG image.
    Jpg,
    /// VBF bitmap font.
    Vbf,
}

/// The outcome of a positive detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileClassInfo {
    /// Human-readable class description.
    pub class_name: String,
    /// Class bits.
    pub flags: FileClassBits,
    /// Format refinement.
    pub subclass: FileSubclass,
}

/// A detect function: returns `Some` iff `data` belongs to the class.
pub type DetectFn = fn(path: &str, data: &[u8]) -> Option<FileClassInfo>;

/// A file class driver: a name, its detector, and the operations the
/// loader can dispatch to for members of the class.
pub struct FileClass {
    /// Class name ("elf", "vbf", "text", ...).
    pub name: &'static str,
    /// Membership test.
    pub detect: DetectFn,
    /// Loader operations for this class.
    pub ops: super::ClassOps,
}

// ── Detectors, in precedence order ───────────────────────────────────

fn detect_elf(_path: &str, data: &[u8]) -> Option<FileClassInfo> {
    let header = meson_elf::Elf32Header::parse(data).ok()?;
    let (name, flags) = match header.elf_type() {
        meson_elf::ElfType::Executable => (
            "ELF executable",
            FileClassBits::BIN | FileClassBits::STATIC | FileClassBits::EXEC,
        ),
        meson_elf::ElfType::SharedObject => (
            "ELF shared library",
            FileClassBits::BIN | FileClassBits::DYNAMIC | FileClassBits::LIB,
        ),
        meson_elf::ElfType::Relocatable => (
            "ELF object",
            FileClassBits::BIN | FileClassBits::STATIC | FileClassBits::OBJECT,
        ),
    };
    Some(FileClassInfo {
        class_name: String::from(name),
        flags,
        subclass: FileSubclass::None,
    })
}

fn detect_bmp(_path: &str, data: &[u8]) -> Option<FileClassInfo> {
    if data.len() >= 2 && &data[0..2] == b"BM" {
        Some(FileClassInfo {
            class_name: String::from("bitmap image"),
            flags: FileClassBits::BIN | FileClassBits::IMAGE,
            subclass: FileSubclass::Bmp,
        })
    } else {
        None
    }
}

fn detect_ico(_path: &str, data: &[u8]) -> Option<FileClassInfo> {
    if data.len() >= 4 && data[0..4] == [0x00, 0x00, 0x01, 0x00] {
        Some(FileClassInfo {
            class_name: String::from("icon image"),
            flags: FileClassBits::BIN | FileClassBits::IMAGE,
            subclass: FileSubclass::Ico,
        })
    } else {
        None
    }
}

fn detect_jpg(_path: &str, data: &[u8]) -> Option<FileClassInfo> {
    if data.len() >= 3 && data[0..3] == [0xFF, 0xD8, 0xFF] {
        Some(FileClassInfo {
            class_name: String::from("JPEG image"),
            flags: FileClassBits::BIN | FileClassBits::IMAGE,
            subclass: FileSubclass::Jpg,
        })
    } else {
        None
    }
}

fn detect_vbf(_path: &str, data: &[u8]) -> Option<FileClassInfo> {
    if meson_vbf::is_vbf(data) {
        Some(FileClassInfo {
            class_name: String::from("VBF font"),
            flags: FileClassBits::BIN | FileClassBits::FONT,
            subclass: FileSubclass::Vbf,
        })
    } else {
        None
    }
}

fn detect_boot(path: &str, data: &[u8]) -> Option<FileClassInfo> {
    // A boot sector is binary with the signature word at offset 510.
    if detect_text(path, data).is_some() {
        return None;
    }
    if data.len() >= 512 && data[510] == 0x55 && data[511] == 0xAA {
        Some(FileClassInfo {
            class_name: String::from("boot sector"),
            flags: FileClassBits::BIN | FileClassBits::STATIC | FileClassBits::EXEC
                | FileClassBits::BOOT,
            subclass: FileSubclass::None,
        })
    } else {
        None
    }
}

fn is_text_byte(byte: u8) -> bool {
    byte == 0x0A || byte == 0x0D || byte == 0x09 || (0x20..=0x7E).contains(&byte)
}

fn detect_text(_path: &str, data: &[u8]) -> Option<FileClassInfo> {
    if data.is_empty() {
        return None;
    }
    let text_bytes = data.iter().filter(|&&b| is_text_byte(b)).count();
    if text_bytes * 100 / data.len() >= 90 {
        Some(FileClassInfo {
            class_name: String::from("text data"),
            flags: FileClassBits::TEXT | FileClassBits::DATA,
            subclass: FileSubclass::None,
        })
    } else {
        None
    }
}

fn detect_config(path: &str, data: &[u8]) -> Option<FileClassInfo> {
    // Config files are text whose lines are (almost) all comments,
    // blanks, or key=value pairs.
    detect_text(path, data)?;
    let text = core::str::from_utf8(data).ok()?;

    let mut total = 0usize;
    let mut config = 0usize;
    for line in text.lines() {
        total += 1;
        if line.is_empty() || line.starts_with('#') {
            config += 1;
        } else if line.bytes().filter(|&b| b == b'=').count() == 1 {
            config += 1;
        }
    }
    if total == 0 {
        return None;
    }
    if config * 100 / total >= 95 {
        Some(FileClassInfo {
            class_name: String::from("config data"),
            flags: FileClassBits::CONFIG | FileClassBits::TEXT | FileClassBits::DATA,
            subclass: FileSubclass::None,
        })
    } else {
        None
    }
}

fn detect_binary(path: &str, data: &[u8]) -> Option<FileClassInfo> {
    // Anything that is not text is binary.
    if detect_text(path, data).is_some() {
        return None;
    }
    Some(FileClassInfo {
        class_name: String::from("binary data"),
        flags: FileClassBits::BIN | FileClassBits::DATA,
        subclass: FileSubclass::None,
    })
}

/// The class drivers in detection precedence order.
#[must_use]
pub fn class_chain() -> &'static [FileClass] {
    use super::ClassOps;

    static CHAIN: &[FileClass] = &[
        FileClass {
            name: "elf",
            detect: detect_elf,
            ops: ClassOps::Executable(&super::elf_exec::ElfOps),
        },
        FileClass {
            name: "bmp",
            detect: detect_bmp,
            // Image decoders plug in from outside the core.
            ops: ClassOps::None,
        },
        FileClass {
            name: "ico",
            detect: detect_ico,
            ops: ClassOps::None,
        },
        FileClass {
            name: "jpg",
            detect: detect_jpg,
            ops: ClassOps::None,
        },
        FileClass {
            name: "vbf",
            detect: detect_vbf,
            ops: ClassOps::Font(&super::VbfFontOps),
        },
        FileClass {
            name: "boot",
            detect: detect_boot,
            ops: ClassOps::None,
        },
        FileClass {
            name: "config",
            detect: detect_config,
            ops: ClassOps::None,
        },
        FileClass {
            name: "text",
            detect: detect_text,
            ops: ClassOps::None,
        },
        FileClass {
            name: "binary",
            detect: detect_binary,
            ops: ClassOps::None,
        },
    ];
    CHAIN
}

/// Classify a buffer, returning the first matching class and its info.
#[must_use]
pub fn classify(path: &str, data: &[u8]) -> Option<(&'static FileClass, FileClassInfo)> {
    for class in class_chain() {
        if let Some(info) = (class.detect)(path, data) {
            return Some((class, info));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elf_magic_wins_over_binary() {
        // A minimal ELF header: magic + class/encoding + EM_386 + ET_EXEC.
        let mut data = vec![0u8; 52];
        data[0..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
        data[4] = 1;
        data[5] = 1;
        data[16..18].copy_from_slice(&2u16.to_le_bytes());
        data[18..20].copy_from_slice(&3u16.to_le_bytes());

        let (class, info) = classify("/programs/ls", &data).unwrap();
        assert_eq!(class.name, "elf");
        assert!(info.flags.contains(FileClassBits::EXEC));
    }

    #[test]
    fn boot_sector_needs_binary_and_signature() {
        let mut data = vec![0u8; 512];
        data[0] = 0xEB; // jump, clearly not text
        data[510] = 0x55;
        data[511] = 0xAA;
        let (class, info) = classify("/boot/mbr", &data).unwrap();
        assert_eq!(class.name, "boot");
        assert!(info.flags.contains(FileClassBits::BOOT));

        // The same bytes as mostly-printable text do not classify boot.
        let mut texty = vec![b'a'; 512];
        texty[510] = 0x55;
        texty[511] = 0xAA;
        let (class, _) = classify("/boot/fake", &texty).unwrap();
        assert_eq!(class.name, "text");
    }

    #[test]
    fn config_needs_95_percent_conforming_lines() {
        let conf = b"# comment\n\nkey=value\nother=1\n";
        let (class, info) = classify("/system/kernel.conf", conf).unwrap();
        assert_eq!(class.name, "config");
        assert!(info.flags.contains(FileClassBits::CONFIG | FileClassBits::TEXT));

        let prose =
            b"This is a paragraph of plain prose text.\nIt goes on and on.\nNo equals signs here.\nJust words.\n";
        let (class, _) = classify("/docs/readme", prose).unwrap();
        assert_eq!(class.name, "text");
    }

    #[test]
    fn mostly_unprintable_is_binary() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1024).collect();
        let (class, info) = classify("/x", &data).unwrap();
        assert_eq!(class.name, "binary");
        assert!(info.flags.contains(FileClassBits::BIN));
    }

    #[test]
    fn image_magics_detect_their_formats() {
        assert_eq!(classify("/a.bmp", b"BMxxxx").unwrap().0.name, "bmp");
        assert_eq!(
            classify("/a.ico", &[0x00, 0x00, 0x01, 0x00, 1, 2]).unwrap().0.name,
            "ico"
        );
        assert_eq!(
            classify("/a.jpg", &[0xFF, 0xD8, 0xFF, 0xE0]).unwrap().0.name,
            "jpg"
        );
    }

    #[test]
    fn vbf_detects_by_header() {
        let font = meson_vbf::VbfFont::new("f", 8, 8, 8).unwrap();
        let bytes = font.write();
        let (class, info) = classify("/fonts/f.vbf", &bytes).unwrap();
        assert_eq!(class.name, "vbf");
        assert_eq!(info.subclass, FileSubclass::Vbf);
    }
}
