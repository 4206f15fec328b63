//! Program loader and file classes.
//!
//! The loader reads files through the filesystem facade, classifies
//! their content ([`class`]), and dispatches to the matching class
//! driver: executables lay out and link, fonts parse, images hand off
//! to external decoders. The executable pipeline is
//! classify -> layout -> resolve -> link -> execute.

extern crate alloc;

pub mod class;
pub mod elf_exec;
pub mod symbols;

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::fs::{self, FileStream, OpenMode};
use crate::proc::{self, Pid};
use crate::status::Status;

pub use class::{FileClass, FileClassBits, FileClassInfo, FileSubclass, classify};
pub use symbols::SymbolTable;

/// One symbol from an executable or library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Symbol name.
    pub name: String,
    /// Address or value.
    pub value: u32,
    /// Size in bytes.
    pub size: u32,
    /// Whether this is a function symbol.
    pub function: bool,
    /// Whether the symbol has global (or weak) binding.
    pub global: bool,
}

/// One relocation to apply while linking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    /// Virtual address of the relocation site.
    pub offset: u32,
    /// Name of the symbol the site refers to.
    pub symbol_name: String,
    /// Format-specific relocation type.
    pub info: u32,
    /// Explicit addend; zero for formats with implicit addends.
    pub addend: u32,
}

/// The relocations of one object, in file order.
pub type RelocationTable = Vec<Relocation>;

/// A loadable segment placed in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSegment {
    /// Virtual address the segment belongs at.
    pub vaddr: u32,
    /// Full in-memory size; the tail past `data` is zero-filled.
    pub memsz: u32,
    /// Access flags (1 = execute, 2 = write, 4 = read).
    pub flags: u32,
    /// File-backed bytes.
    pub data: Vec<u8>,
}

/// A laid-out program or library image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramImage {
    /// Entry point virtual address.
    pub entry: u32,
    /// Load segments.
    pub segments: Vec<LoadedSegment>,
}

/// Operations provided by an executable file class.
pub trait ExecutableOps: Send + Sync {
    /// Extract the defined, named symbols.
    ///
    /// # Errors
    ///
    /// Propagates parse errors as [`Status::Invalid`].
    fn get_symbols(&self, data: &[u8]) -> Result<Vec<Symbol>, Status>;

    /// Lay out an executable into a [`ProgramImage`].
    ///
    /// # Errors
    ///
    /// [`Status::Invalid`] for a non-executable or malformed image.
    fn layout_executable(&self, data: &[u8]) -> Result<ProgramImage, Status>;

    /// Lay out a shared library into a [`ProgramImage`].
    ///
    /// # Errors
    ///
    /// [`Status::Invalid`] for a non-library or malformed image.
    fn layout_library(&self, data: &[u8]) -> Result<ProgramImage, Status>;

    /// Collect the object's relocation table.
    ///
    /// # Errors
    ///
    /// Propagates parse errors as [`Status::Invalid`].
    fn relocations(&self, data: &[u8]) -> Result<RelocationTable, Status>;

    /// Resolve `relocations` against `symbols` and patch the image in
    /// place.
    ///
    /// # Errors
    ///
    /// [`Status::NoSuchEntry`] for an unresolved symbol,
    /// [`Status::Invalid`] for a site outside the image.
    fn link(
        &self,
        image: &mut ProgramImage,
        relocations: &RelocationTable,
        symbols: &[Symbol],
    ) -> Result<(), Status>;
}

/// Operations provided by an image file class.
///
/// The core only classifies image formats; decoders implement this and
/// register alongside the window system.
pub trait ImageOps: Send + Sync {
    /// Decode image data into rows of ARGB pixels.
    ///
    /// # Errors
    ///
    /// [`Status::Invalid`] for malformed data.
    fn load(&self, data: &[u8]) -> Result<(u32, u32, Vec<u32>), Status>;

    /// Encode ARGB pixels back into the file format.
    ///
    /// # Errors
    ///
    /// [`Status::Invalid`] for impossible geometry.
    fn save(&self, width: u32, height: u32, pixels: &[u32]) -> Result<Vec<u8>, Status>;
}

/// Operations provided by a font file class.
pub trait FontOps: Send + Sync {
    /// Parse font data.
    ///
    /// # Errors
    ///
    /// [`Status::Invalid`] for malformed data.
    fn load(&self, data: &[u8]) -> Result<meson_vbf::VbfFont, Status>;
}

/// The VBF font class driver.
pub struct VbfFontOps;

impl FontOps for VbfFontOps {
    fn load(&self, data: &[u8]) -> Result<meson_vbf::VbfFont, Status> {
        meson_vbf::VbfFont::parse(data).map_err(Status::from)
    }
}

/// Per-class operation tables attached to a [`FileClass`].
pub enum ClassOps {
    /// No operations in the core; external drivers may take over.
    None,
    /// Executable operations.
    Executable(&'static dyn ExecutableOps),
    /// Image operations.
    Image(&'static dyn ImageOps),
    /// Font operations.
    Font(&'static dyn FontOps),
}

/// Read a whole file into memory.
///
/// # Errors
///
/// Propagates filesystem errors.
pub fn load_file(path: &str) -> Result<Vec<u8>, Status> {
    let mut stream = FileStream::open(path, OpenMode::READ)?;
    let mut data = vec![0u8; stream.size() as usize];
    let mut done = 0usize;
    while done < data.len() {
        let n = stream.read(&mut data[done..])?;
        if n == 0 {
            break;
        }
        done += n;
    }
    data.truncate(done);
    stream.close()?;
    Ok(data)
}

/// Load and classify a file in one step.
///
/// # Errors
///
/// Propagates filesystem errors; an unclassifiable buffer reports
/// [`Status::Invalid`].
pub fn classify_file(path: &str) -> Result<FileClassInfo, Status> {
    let data = load_file(path)?;
    classify(path, &data)
        .map(|(_, info)| info)
        .ok_or(Status::Invalid)
}

/// Extract the symbols of an executable or library file.
///
/// # Errors
///
/// [`Status::Invalid`] when the file is not an executable class.
pub fn get_symbols(path: &str) -> Result<Vec<Symbol>, Status> {
    let data = load_file(path)?;
    let (class, _) = classify(path, &data).ok_or(Status::Invalid)?;
    match class.ops {
        ClassOps::Executable(ops) => ops.get_symbols(&data),
        _ => Err(Status::Invalid),
    }
}

/// A program loaded and ready to schedule.
pub struct LoadedProgram {
    /// The process created for it.
    pub pid: Pid,
    /// The laid-out image.
    pub image: ProgramImage,
}

/// Load an executable file and create a process for it.
///
/// The returned image still has to be mapped into the new process's
/// address space by the memory manager before [`exec_program`].
///
/// # Errors
///
/// [`Status::Invalid`] for a non-executable file; otherwise propagates
/// filesystem and process errors.
pub fn load_program(path: &str, privilege: u8) -> Result<LoadedProgram, Status> {
    let data = load_file(path)?;
    let (class, info) = classify(path, &data).ok_or(Status::Invalid)?;
    if !info.flags.contains(FileClassBits::EXEC) {
        return Err(Status::Invalid);
    }
    let ClassOps::Executable(ops) = &class.ops else {
        return Err(Status::Invalid);
    };

    let image = ops.layout_executable(&data)?;

    let full = fs::canonical(path);
    let name = fs::path::leaf_of(&full);
    let pid = proc::spawn(name, privilege, proc::DEFAULT_PRIORITY)?;

    Ok(LoadedProgram { pid, image })
}

/// Load a shared library image.
///
/// # Errors
///
/// [`Status::Invalid`] for a non-library file.
pub fn load_library(path: &str) -> Result<ProgramImage, Status> {
    let data = load_file(path)?;
    let (class, info) = classify(path, &data).ok_or(Status::Invalid)?;
    if !info.flags.contains(FileClassBits::LIB) {
        return Err(Status::Invalid);
    }
    let ClassOps::Executable(ops) = &class.ops else {
        return Err(Status::Invalid);
    };
    ops.layout_library(&data)
}

/// Hand a loaded program to the scheduler.
///
/// On the kernel target this maps the image and enters the new process;
/// the facade here marks it runnable and lets the scheduler pick it up.
///
/// # Errors
///
/// Propagates process state errors.
pub fn exec_program(program: &LoadedProgram) -> Result<(), Status> {
    proc::set_process_state(program.pid, proc::ProcessState::Ready)
}

/// Load a program and start it immediately.
///
/// # Errors
///
/// Propagates [`load_program`] and [`exec_program`] errors.
pub fn load_and_exec(path: &str, privilege: u8) -> Result<Pid, Status> {
    let program = load_program(path, privilege)?;
    exec_program(&program)?;
    Ok(program.pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::ramfs::RamFs;
    use alloc::boxed::Box;

    fn mount_with_file(prefix: &str, name: &str, data: &[u8]) {
        fs::mount(prefix, Box::new(RamFs::new())).unwrap();
        let mut stream = FileStream::open(
            &alloc::format!("{prefix}/{name}"),
            OpenMode::WRITE | OpenMode::CREATE,
        )
        .unwrap();
        stream.write(data).unwrap();
        stream.close().unwrap();
    }

    #[test]
    fn load_file_returns_exact_bytes() {
        mount_with_file("/l-load", "blob", b"exact bytes here");
        assert_eq!(load_file("/l-load/blob").unwrap(), b"exact bytes here");
    }

    #[test]
    fn classify_file_reads_and_classifies() {
        mount_with_file("/l-classify", "kernel.conf", b"a=1\nb=2\n");
        let info = classify_file("/l-classify/kernel.conf").unwrap();
        assert!(info.flags.contains(FileClassBits::CONFIG));
    }

    #[test]
    fn load_program_refuses_non_executables() {
        mount_with_file("/l-noexec", "notes.txt", b"just some text\n");
        assert!(matches!(
            load_program("/l-noexec/notes.txt", proc::PRIVILEGE_USER),
            Err(Status::Invalid)
        ));
    }

    #[test]
    fn font_class_ops_parse_vbf() {
        let font = meson_vbf::VbfFont::new("dash", 8, 8, 8).unwrap();
        let parsed = VbfFontOps.load(&font.write()).unwrap();
        assert_eq!(parsed.name_str(), "dash");
    }
}
