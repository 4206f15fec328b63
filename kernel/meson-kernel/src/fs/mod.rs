//! Filesystem facade.
//!
//! The kernel's file operations are filesystem-agnostic: a mount table
//! maps path prefixes to [`Filesystem`] drivers, paths are canonicalised
//! against the caller's working directory, and the driver interface is
//! block-oriented. Byte-granular I/O lives in [`stream`] on top of the
//! block operations.
//!
//! Directory iteration order is whatever the underlying driver reports,
//! but it is stable between calls.

extern crate alloc;

pub mod path;
pub mod ramfs;
pub mod stream;

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use bitflags::bitflags;

use crate::proc;
use crate::status::Status;
use crate::sync::SpinLock;

pub use path::fixup_path;
pub use stream::FileStream;

bitflags! {
    /// File open modes, OR-combinable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OpenMode: u32 {
        /// Open for reading.
        const READ     = 1 << 0;
        /// Open for writing.
        const WRITE    = 1 << 1;
        /// Create the file if it does not exist.
        const CREATE   = 1 << 2;
        /// Truncate to zero length on open.
        const TRUNCATE = 1 << 3;
        /// Start writing at the end of the file.
        const APPEND   = 1 << 4;
    }
}

impl OpenMode {
    /// Read plus write.
    pub const READWRITE: Self = Self::READ.union(Self::WRITE);
}

/// The type of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileKind {
    /// Regular file.
    #[default]
    File,
    /// Directory.
    Dir,
    /// Symbolic link.
    Link,
}

/// Driver-side description of one file or directory.
#[derive(Debug, Clone, Default)]
pub struct FileEntry {
    /// Leaf name.
    pub name: String,
    /// Entry type.
    pub kind: FileKind,
    /// Size in bytes.
    pub size: u32,
    /// Size in blocks.
    pub blocks: u32,
    /// Creation date and time, packed DOS format.
    pub created: (u16, u16),
    /// Last-modification date and time, packed DOS format.
    pub modified: (u16, u16),
    /// Driver-assigned handle for block I/O.
    pub handle: u32,
}

/// An open file as seen by the facade's callers.
#[derive(Debug, Clone, Default)]
pub struct File {
    /// Canonical absolute path.
    pub path: String,
    /// Leaf name.
    pub name: String,
    /// Entry type.
    pub kind: FileKind,
    /// Size in bytes.
    pub size: u32,
    /// Filesystem block size in bytes.
    pub block_size: u32,
    /// Size in blocks.
    pub blocks: u32,
    /// Creation date and time, packed DOS format.
    pub created: (u16, u16),
    /// Last-modification date and time, packed DOS format.
    pub modified: (u16, u16),
    /// Mode the file was opened with (empty for `find` results).
    pub open_mode: OpenMode,
    mount: usize,
    handle: u32,
}

impl File {
    fn from_entry(entry: FileEntry, full_path: String, block_size: u32, mount: usize) -> Self {
        Self {
            path: full_path,
            name: entry.name,
            kind: entry.kind,
            size: entry.size,
            block_size,
            blocks: entry.blocks,
            created: entry.created,
            modified: entry.modified,
            open_mode: OpenMode::empty(),
            mount,
            handle: entry.handle,
        }
    }
}

/// The driver interface every filesystem implements.
///
/// Paths given to a driver are relative to its mount point, canonical,
/// and never begin with a separator; the empty string is the driver's
/// root directory.
pub trait Filesystem: Send {
    /// Filesystem type name ("ramfs", "fat", ...).
    fn fs_type(&self) -> &'static str;

    /// Block size in bytes.
    fn block_size(&self) -> u32;

    /// Whether the filesystem rejects writes.
    fn read_only(&self) -> bool;

    /// Look up an entry by relative path.
    ///
    /// # Errors
    ///
    /// [`Status::NoSuchFile`] if the path does not exist.
    fn find(&mut self, rel_path: &str) -> Result<FileEntry, Status>;

    /// List a directory in the driver's stable order.
    ///
    /// # Errors
    ///
    /// [`Status::NoSuchFile`] for a missing directory,
    /// [`Status::Invalid`] for a non-directory.
    fn list_dir(&mut self, rel_path: &str) -> Result<Vec<FileEntry>, Status>;

    /// Create an empty file.
    ///
    /// # Errors
    ///
    /// [`Status::NoSuchFile`] if the parent directory is missing,
    /// [`Status::NoWrite`] on a read-only filesystem.
    fn create_file(&mut self, rel_path: &str) -> Result<FileEntry, Status>;

    /// Read whole blocks into `buf`. Returns the number of blocks
    /// actually transferred.
    ///
    /// # Errors
    ///
    /// [`Status::Io`] on device failure, [`Status::NoSuchEntry`] for a
    /// dead handle.
    fn read_blocks(
        &mut self,
        handle: u32,
        start_block: u32,
        count: u32,
        buf: &mut [u8],
    ) -> Result<u32, Status>;

    /// Write whole blocks from `buf`. Returns the number of blocks
    /// actually transferred. The file grows as needed.
    ///
    /// # Errors
    ///
    /// [`Status::NoWrite`] on a read-only filesystem, [`Status::Io`] on
    /// device failure.
    fn write_blocks(
        &mut self,
        handle: u32,
        start_block: u32,
        count: u32,
        buf: &[u8],
    ) -> Result<u32, Status>;

    /// Set a file's byte size (truncate or extend).
    ///
    /// # Errors
    ///
    /// [`Status::NoSuchEntry`] for a dead handle, [`Status::NoWrite`] on
    /// a read-only filesystem.
    fn set_size(&mut self, handle: u32, size: u32) -> Result<(), Status>;

    /// Delete a file.
    ///
    /// # Errors
    ///
    /// [`Status::NoSuchFile`], [`Status::Invalid`] for a directory,
    /// [`Status::NoWrite`] on a read-only filesystem.
    fn delete(&mut self, rel_path: &str) -> Result<(), Status>;

    /// Create a directory.
    ///
    /// # Errors
    ///
    /// [`Status::NoSuchFile`] if the parent is missing,
    /// [`Status::NoWrite`] on a read-only filesystem.
    fn make_dir(&mut self, rel_path: &str) -> Result<(), Status>;

    /// Remove an empty directory.
    ///
    /// # Errors
    ///
    /// [`Status::NoSuchFile`], [`Status::Invalid`] for a non-directory
    /// or a non-empty one.
    fn remove_dir(&mut self, rel_path: &str) -> Result<(), Status>;

    /// Rename an entry within this filesystem.
    ///
    /// # Errors
    ///
    /// [`Status::NoSuchFile`] for a missing source, [`Status::NoWrite`]
    /// on a read-only filesystem.
    fn rename(&mut self, from: &str, to: &str) -> Result<(), Status>;

    /// Set an entry's modification timestamp.
    ///
    /// # Errors
    ///
    /// [`Status::NoSuchFile`] for a missing entry.
    fn timestamp(&mut self, rel_path: &str, date: u16, time: u16) -> Result<(), Status>;

    /// Flush any cached state to the backing device.
    ///
    /// # Errors
    ///
    /// [`Status::Io`] on device failure.
    fn flush(&mut self) -> Result<(), Status> {
        Ok(())
    }
}

struct Mount {
    prefix: String,
    fs: Box<dyn Filesystem>,
}

static MOUNTS: SpinLock<Vec<Mount>> = SpinLock::new(Vec::new());

/// Mount a filesystem at a canonical absolute prefix.
///
/// # Errors
///
/// Returns [`Status::Invalid`] for a non-absolute prefix or one that is
/// already mounted.
pub fn mount(prefix: &str, fs: Box<dyn Filesystem>) -> Result<(), Status> {
    if !path::is_absolute(prefix) {
        return Err(Status::Invalid);
    }
    let canonical = path::fixup_path(prefix, "/");
    let mut mounts = MOUNTS.lock();
    if mounts.iter().any(|m| m.prefix == canonical) {
        return Err(Status::Invalid);
    }
    crate::kinfo!("fs: mounted {} at {}", fs.fs_type(), canonical);
    mounts.push(Mount {
        prefix: canonical,
        fs,
    });
    Ok(())
}

/// Flush and remove every mount. Used by shutdown.
///
/// With `force`, flush failures are ignored; otherwise the first failure
/// aborts the teardown.
///
/// # Errors
///
/// Propagates the first flush failure when not forced.
pub fn unmount_all(force: bool) -> Result<(), Status> {
    let mut mounts = MOUNTS.lock();
    for mount in mounts.iter_mut() {
        match mount.fs.flush() {
            Ok(()) => {}
            Err(err) if force => {
                crate::kwarn!("fs: flush of {} failed: {}", mount.prefix, err);
            }
            Err(err) => return Err(err),
        }
    }
    mounts.clear();
    Ok(())
}

/// Resolve a canonical absolute path to `(mount_index, relative_path)`.
fn resolve(canonical: &str) -> Result<(usize, String), Status> {
    let mounts = MOUNTS.lock();
    let mut best: Option<(usize, usize)> = None; // (index, prefix_len)

    for (index, mount) in mounts.iter().enumerate() {
        let p = mount.prefix.as_str();
        let matches = if p == "/" {
            true
        } else {
            canonical == p
                || (canonical.starts_with(p) && canonical.as_bytes().get(p.len()) == Some(&b'/'))
        };
        if matches && best.is_none_or(|(_, len)| p.len() > len) {
            best = Some((index, p.len()));
        }
    }

    let (index, prefix_len) = best.ok_or(Status::NoSuchFile)?;
    let rest = if prefix_len >= canonical.len() {
        String::new()
    } else {
        let skip = if mounts[index].prefix == "/" {
            1
        } else {
            prefix_len + 1
        };
        String::from(canonical.get(skip..).unwrap_or(""))
    };
    Ok((index, rest))
}

/// Run a closure against the filesystem owning `canonical`.
fn with_fs<R>(
    canonical: &str,
    f: impl FnOnce(&mut dyn Filesystem, &str) -> Result<R, Status>,
) -> Result<R, Status> {
    let (index, rest) = resolve(canonical)?;
    let mut mounts = MOUNTS.lock();
    let mount = mounts.get_mut(index).ok_or(Status::NoSuchFile)?;
    f(mount.fs.as_mut(), &rest)
}

/// Run a closure against the filesystem at a known mount index.
pub(crate) fn with_mount<R>(
    index: usize,
    f: impl FnOnce(&mut dyn Filesystem) -> Result<R, Status>,
) -> Result<R, Status> {
    let mut mounts = MOUNTS.lock();
    let mount = mounts.get_mut(index).ok_or(Status::NoSuchFile)?;
    f(mount.fs.as_mut())
}

/// Canonicalise a caller-supplied path against the current process's
/// working directory.
#[must_use]
pub fn canonical(orig: &str) -> String {
    path::fixup_path(orig, &proc::current_directory())
}

/// Look up a file or directory.
///
/// # Errors
///
/// [`Status::NoSuchFile`] if the path does not exist.
pub fn find(orig_path: &str) -> Result<File, Status> {
    if orig_path.is_empty() {
        return Err(Status::NullParameter);
    }
    let full = canonical(orig_path);
    let (index, rest) = resolve(&full)?;
    with_mount(index, |fs| {
        let entry = fs.find(&rest)?;
        Ok(File::from_entry(entry, full.clone(), fs.block_size(), index))
    })
}

/// First entry of a directory.
///
/// # Errors
///
/// [`Status::NoSuchFile`] for a missing directory,
/// [`Status::NoSuchEntry`] for an empty one.
pub fn first(dir_path: &str) -> Result<File, Status> {
    let full = canonical(dir_path);
    let (index, rest) = resolve(&full)?;
    with_mount(index, |fs| {
        let entries = fs.list_dir(&rest)?;
        let entry = entries.into_iter().next().ok_or(Status::NoSuchEntry)?;
        let child_path = join(&full, &entry.name);
        Ok(File::from_entry(entry, child_path, fs.block_size(), index))
    })
}

/// Advance `current` to the next entry of the directory it came from.
///
/// # Errors
///
/// [`Status::NoSuchEntry`] past the last entry.
pub fn next(dir_path: &str, current: &mut File) -> Result<(), Status> {
    let full = canonical(dir_path);
    let (index, rest) = resolve(&full)?;
    let name = current.name.clone();
    let found = with_mount(index, |fs| {
        let entries = fs.list_dir(&rest)?;
        let position = entries
            .iter()
            .position(|e| e.name == name)
            .ok_or(Status::NoSuchEntry)?;
        let entry = entries
            .into_iter()
            .nth(position + 1)
            .ok_or(Status::NoSuchEntry)?;
        let child_path = join(&full, &entry.name);
        Ok(File::from_entry(entry, child_path, fs.block_size(), index))
    })?;
    *current = found;
    Ok(())
}

fn join(dir: &str, leaf: &str) -> String {
    if dir == "/" {
        alloc::format!("/{leaf}")
    } else {
        alloc::format!("{dir}/{leaf}")
    }
}

/// Open a file.
///
/// # Errors
///
/// [`Status::NoSuchFile`] for a missing file without `CREATE`,
/// [`Status::NoWrite`] for a write mode on a read-only filesystem.
pub fn open(orig_path: &str, mode: OpenMode) -> Result<File, Status> {
    if orig_path.is_empty() {
        return Err(Status::NullParameter);
    }
    let full = canonical(orig_path);
    let (index, rest) = resolve(&full)?;

    with_mount(index, |fs| {
        let wants_write =
            mode.intersects(OpenMode::WRITE | OpenMode::CREATE | OpenMode::TRUNCATE);
        if wants_write && fs.read_only() {
            return Err(Status::NoWrite);
        }

        let mut entry = match fs.find(&rest) {
            Ok(entry) => entry,
            Err(Status::NoSuchFile) if mode.contains(OpenMode::CREATE) => fs.create_file(&rest)?,
            Err(err) => return Err(err),
        };

        if entry.kind == FileKind::Dir {
            return Err(Status::Invalid);
        }

        if mode.contains(OpenMode::TRUNCATE) {
            fs.set_size(entry.handle, 0)?;
            entry.size = 0;
            entry.blocks = 0;
        }

        let mut file = File::from_entry(entry, full.clone(), fs.block_size(), index);
        file.open_mode = mode;
        Ok(file)
    })
}

/// Release an open file. Nothing is cached at the facade level, so this
/// only exists to close the lifecycle symmetrically.
pub fn close(_file: &File) {}

/// Read whole blocks from an open file. Returns blocks transferred.
///
/// # Errors
///
/// [`Status::Permission`] when the file is not open for reading,
/// otherwise whatever the driver reports.
pub fn read(file: &File, start_block: u32, count: u32, buf: &mut [u8]) -> Result<u32, Status> {
    if !file.open_mode.contains(OpenMode::READ) {
        return Err(Status::Permission);
    }
    if buf.len() < (count * file.block_size) as usize {
        return Err(Status::Invalid);
    }
    with_mount(file.mount, |fs| {
        fs.read_blocks(file.handle, start_block, count, buf)
    })
}

/// Write whole blocks to an open file. Returns blocks transferred.
///
/// # Errors
///
/// [`Status::Permission`] when the file is not open for writing,
/// otherwise whatever the driver reports.
pub fn write(file: &mut File, start_block: u32, count: u32, buf: &[u8]) -> Result<u32, Status> {
    if !file.open_mode.contains(OpenMode::WRITE) {
        return Err(Status::Permission);
    }
    if buf.len() < (count * file.block_size) as usize {
        return Err(Status::Invalid);
    }
    let written = with_mount(file.mount, |fs| {
        fs.write_blocks(file.handle, start_block, count, buf)
    })?;
    // Refresh cached metadata after growth.
    if let Ok((_, rest)) = resolve(&file.path) {
        if let Ok(entry) = with_mount(file.mount, |fs| fs.find(&rest)) {
            file.size = entry.size;
            file.blocks = entry.blocks;
        }
    }
    Ok(written)
}

/// Set an open file's byte size.
///
/// # Errors
///
/// Propagates driver errors.
pub(crate) fn set_size(file: &mut File, size: u32) -> Result<(), Status> {
    with_mount(file.mount, |fs| fs.set_size(file.handle, size))?;
    file.size = size;
    file.blocks = size.div_ceil(file.block_size.max(1));
    Ok(())
}

/// Delete a file.
///
/// # Errors
///
/// Propagates driver errors.
pub fn delete(orig_path: &str) -> Result<(), Status> {
    let full = canonical(orig_path);
    with_fs(&full, |fs, rest| fs.delete(rest))
}

/// Overwrite a file's contents before deleting it.
///
/// The data blocks are replaced with zeros and flushed, so the deleted
/// content cannot be read back through the block interface.
///
/// # Errors
///
/// Propagates driver errors.
pub fn delete_secure(orig_path: &str) -> Result<(), Status> {
    let full = canonical(orig_path);
    with_fs(&full, |fs, rest| {
        let entry = fs.find(rest)?;
        if entry.blocks > 0 {
            let zeros = vec![0u8; fs.block_size() as usize];
            for block in 0..entry.blocks {
                fs.write_blocks(entry.handle, block, 1, &zeros)?;
            }
        }
        fs.flush()?;
        fs.delete(rest)
    })
}

/// Create a directory.
///
/// # Errors
///
/// Propagates driver errors.
pub fn make_dir(orig_path: &str) -> Result<(), Status> {
    let full = canonical(orig_path);
    with_fs(&full, |fs, rest| fs.make_dir(rest))
}

/// Remove an empty directory.
///
/// # Errors
///
/// Propagates driver errors.
pub fn remove_dir(orig_path: &str) -> Result<(), Status> {
    let full = canonical(orig_path);
    with_fs(&full, |fs, rest| fs.remove_dir(rest))
}

/// Copy a file. The destination is created or truncated.
///
/// # Errors
///
/// Propagates open/read/write errors from either side.
pub fn copy(src_path: &str, dest_path: &str) -> Result<(), Status> {
    let src = open(src_path, OpenMode::READ)?;
    let mut dest = open(
        dest_path,
        OpenMode::WRITE | OpenMode::CREATE | OpenMode::TRUNCATE,
    )?;

    let block = src.block_size as usize;
    let mut buf = vec![0u8; block];
    for block_index in 0..src.blocks {
        read(&src, block_index, 1, &mut buf)?;
        write(&mut dest, block_index, 1, &buf)?;
    }
    // Trim the copy to the byte size, not the block roundup.
    set_size(&mut dest, src.size)?;
    Ok(())
}

/// Copy a directory tree (or a single file).
///
/// # Errors
///
/// Propagates errors from the per-entry operations.
pub fn copy_recursive(src_path: &str, dest_path: &str) -> Result<(), Status> {
    let src = find(src_path)?;
    if src.kind != FileKind::Dir {
        return copy(src_path, dest_path);
    }

    match find(dest_path) {
        Ok(existing) if existing.kind == FileKind::Dir => {}
        Ok(_) => return Err(Status::Invalid),
        Err(_) => make_dir(dest_path)?,
    }

    let full_src = canonical(src_path);
    let full_dest = canonical(dest_path);
    let entries = with_fs(&full_src, |fs, rest| fs.list_dir(rest))?;
    for entry in entries {
        let child_src = join(&full_src, &entry.name);
        let child_dest = join(&full_dest, &entry.name);
        copy_recursive(&child_src, &child_dest)?;
    }
    Ok(())
}

/// Move (rename) a file or directory.
///
/// Within one filesystem this is the driver's rename; across mounts a
/// file is copied and the original deleted.
///
/// # Errors
///
/// [`Status::NotImplemented`] for a cross-mount directory move;
/// otherwise propagates driver errors.
pub fn move_entry(src_path: &str, dest_path: &str) -> Result<(), Status> {
    let full_src = canonical(src_path);
    let full_dest = canonical(dest_path);
    let (src_mount, src_rest) = resolve(&full_src)?;
    let (dest_mount, dest_rest) = resolve(&full_dest)?;

    if src_mount == dest_mount {
        return with_mount(src_mount, |fs| fs.rename(&src_rest, &dest_rest));
    }

    let src = find(src_path)?;
    if src.kind == FileKind::Dir {
        return Err(Status::NotImplemented);
    }
    copy(src_path, dest_path)?;
    delete(src_path)
}

/// Stamp a file with the current date and time.
///
/// # Errors
///
/// Propagates driver errors.
pub fn timestamp(orig_path: &str) -> Result<(), Status> {
    let (date, time) = crate::clock::date_time();
    let full = canonical(orig_path);
    with_fs(&full, |fs, rest| fs.timestamp(rest, date, time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::ramfs::RamFs;

    fn mount_fresh(prefix: &str) {
        mount(prefix, Box::new(RamFs::new())).unwrap();
    }

    #[test]
    fn open_create_write_read_back() {
        mount_fresh("/t-basic");
        let mut file = open(
            "/t-basic/hello.txt",
            OpenMode::WRITE | OpenMode::CREATE | OpenMode::READ,
        )
        .unwrap();

        let block = file.block_size as usize;
        let mut data = vec![0u8; block];
        data[..5].copy_from_slice(b"hello");
        assert_eq!(write(&mut file, 0, 1, &data), Ok(1));

        let mut back = vec![0u8; block];
        assert_eq!(read(&file, 0, 1, &mut back), Ok(1));
        assert_eq!(&back[..5], b"hello");
    }

    #[test]
    fn missing_file_reports_no_such_file() {
        mount_fresh("/t-missing");
        assert_eq!(
            find("/t-missing/nope").unwrap_err(),
            Status::NoSuchFile
        );
        assert_eq!(
            open("/t-missing/nope", OpenMode::READ).unwrap_err(),
            Status::NoSuchFile
        );
    }

    #[test]
    fn directory_iteration_is_stable() {
        mount_fresh("/t-iter");
        make_dir("/t-iter/d").unwrap();
        for name in ["b.txt", "a.txt", "c.txt"] {
            open(
                &alloc::format!("/t-iter/d/{name}"),
                OpenMode::WRITE | OpenMode::CREATE,
            )
            .unwrap();
        }

        let mut entry = first("/t-iter/d").unwrap();
        let mut seen = vec![entry.name.clone()];
        while next("/t-iter/d", &mut entry).is_ok() {
            seen.push(entry.name.clone());
        }
        assert_eq!(seen, ["a.txt", "b.txt", "c.txt"]);
    }

    #[test]
    fn empty_directory_iteration_reports_no_such_entry() {
        mount_fresh("/t-empty");
        make_dir("/t-empty/hollow").unwrap();
        assert_eq!(first("/t-empty/hollow").unwrap_err(), Status::NoSuchEntry);
        assert_eq!(first("/t-empty/ghost").unwrap_err(), Status::NoSuchFile);
    }

    #[test]
    fn copy_preserves_content_and_size() {
        mount_fresh("/t-copy");
        let mut src = open(
            "/t-copy/src",
            OpenMode::READWRITE | OpenMode::CREATE,
        )
        .unwrap();
        let block = src.block_size as usize;
        let mut data = vec![0xABu8; block];
        data[block - 1] = 0xCD;
        write(&mut src, 0, 1, &data).unwrap();
        set_size(&mut src, 100).unwrap();

        copy("/t-copy/src", "/t-copy/dst").unwrap();
        let dst = find("/t-copy/dst").unwrap();
        assert_eq!(dst.size, 100);

        let opened = open("/t-copy/dst", OpenMode::READ).unwrap();
        let mut back = vec![0u8; block];
        read(&opened, 0, 1, &mut back).unwrap();
        assert_eq!(back[0], 0xAB);
    }

    #[test]
    fn move_within_mount_renames() {
        mount_fresh("/t-move");
        open("/t-move/old", OpenMode::WRITE | OpenMode::CREATE).unwrap();
        move_entry("/t-move/old", "/t-move/new").unwrap();
        assert!(find("/t-move/old").is_err());
        assert!(find("/t-move/new").is_ok());
    }

    #[test]
    fn recursive_copy_clones_tree() {
        mount_fresh("/t-rcopy");
        make_dir("/t-rcopy/a").unwrap();
        make_dir("/t-rcopy/a/sub").unwrap();
        open("/t-rcopy/a/f1", OpenMode::WRITE | OpenMode::CREATE).unwrap();
        open("/t-rcopy/a/sub/f2", OpenMode::WRITE | OpenMode::CREATE).unwrap();

        copy_recursive("/t-rcopy/a", "/t-rcopy/b").unwrap();
        assert!(find("/t-rcopy/b/f1").is_ok());
        assert!(find("/t-rcopy/b/sub/f2").is_ok());
    }

    #[test]
    fn longest_prefix_mount_wins() {
        mount_fresh("/t-nest");
        mount_fresh("/t-nest/inner");
        open("/t-nest/inner/x", OpenMode::WRITE | OpenMode::CREATE).unwrap();

        // The file lives in the inner mount, not the outer one at
        // relative path "inner/x".
        let outer_view = with_fs("/t-nest", |fs, _| {
            Ok(fs.find("inner/x").is_ok())
        })
        .unwrap();
        assert!(!outer_view);
        assert!(find("/t-nest/inner/x").is_ok());
    }
}
