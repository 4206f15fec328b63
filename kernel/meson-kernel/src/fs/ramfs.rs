//! Memory-backed filesystem.
//!
//! Backs the boot ramdisk and every facade test. Entries are kept in a
//! sorted map from relative path to node, which makes directory listing
//! order lexicographic and stable, and handles are small integers that
//! stay valid across renames.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use super::{FileEntry, FileKind, Filesystem};
use crate::clock;
use crate::status::Status;

/// Block size reported by the RAM filesystem.
pub const BLOCK_SIZE: u32 = 512;

struct Node {
    kind: FileKind,
    data: Vec<u8>,
    handle: u32,
    created: (u16, u16),
    modified: (u16, u16),
}

impl Node {
    fn new(kind: FileKind, handle: u32) -> Self {
        let stamp = clock::date_time();
        Self {
            kind,
            data: Vec::new(),
            handle,
            created: stamp,
            modified: stamp,
        }
    }
}

/// An in-memory [`Filesystem`].
pub struct RamFs {
    /// Relative path -> node. The root directory is the empty path.
    nodes: BTreeMap<String, Node>,
    /// Handle -> path, for block I/O after lookup.
    handles: BTreeMap<u32, String>,
    next_handle: u32,
    read_only: bool,
}

impl RamFs {
    /// Create an empty, writable RAM filesystem.
    #[must_use]
    pub fn new() -> Self {
        let mut fs = Self {
            nodes: BTreeMap::new(),
            handles: BTreeMap::new(),
            next_handle: 1,
            read_only: false,
        };
        fs.insert_node(String::new(), FileKind::Dir);
        fs
    }

    /// Create a RAM filesystem that rejects writes after setup.
    ///
    /// Useful for modelling a write-protected boot volume: build the
    /// content with `new`, then flip it read-only.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    fn insert_node(&mut self, path: String, kind: FileKind) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(handle, path.clone());
        self.nodes.insert(path, Node::new(kind, handle));
        handle
    }

    fn entry_for(&self, path: &str) -> Option<FileEntry> {
        let node = self.nodes.get(path)?;
        Some(FileEntry {
            name: String::from(super::path::leaf_of(path)),
            kind: node.kind,
            size: node.data.len() as u32,
            blocks: (node.data.len() as u32).div_ceil(BLOCK_SIZE),
            created: node.created,
            modified: node.modified,
            handle: node.handle,
        })
    }

    fn parent_exists(&self, path: &str) -> bool {
        match path.rfind('/') {
            None => true, // parent is the root
            Some(idx) => self
                .nodes
                .get(&path[..idx])
                .is_some_and(|n| n.kind == FileKind::Dir),
        }
    }

    fn children_of<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.nodes.keys().map(String::as_str).filter(move |p| {
            if p.is_empty() {
                return false;
            }
            if dir.is_empty() {
                !p.contains('/')
            } else {
                p.len() > dir.len() + 1
                    && p.starts_with(dir)
                    && p.as_bytes()[dir.len()] == b'/'
                    && !p[dir.len() + 1..].contains('/')
            }
        })
    }

    fn deny_writes(&self) -> Result<(), Status> {
        if self.read_only {
            Err(Status::NoWrite)
        } else {
            Ok(())
        }
    }
}

impl Default for RamFs {
    fn default() -> Self {
        Self::new()
    }
}

impl Filesystem for RamFs {
    fn fs_type(&self) -> &'static str {
        "ramfs"
    }

    fn block_size(&self) -> u32 {
        BLOCK_SIZE
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn find(&mut self, rel_path: &str) -> Result<FileEntry, Status> {
        self.entry_for(rel_path).ok_or(Status::NoSuchFile)
    }

    fn list_dir(&mut self, rel_path: &str) -> Result<Vec<FileEntry>, Status> {
        let node = self.nodes.get(rel_path).ok_or(Status::NoSuchFile)?;
        if node.kind != FileKind::Dir {
            return Err(Status::Invalid);
        }
        let children: Vec<String> = self.children_of(rel_path).map(String::from).collect();
        Ok(children
            .iter()
            .filter_map(|p| self.entry_for(p))
            .collect())
    }

    fn create_file(&mut self, rel_path: &str) -> Result<FileEntry, Status> {
        self.deny_writes()?;
        if rel_path.is_empty() || self.nodes.contains_key(rel_path) {
            return Err(Status::Invalid);
        }
        if !self.parent_exists(rel_path) {
            return Err(Status::NoSuchFile);
        }
        self.insert_node(String::from(rel_path), FileKind::File);
        self.entry_for(rel_path).ok_or(Status::Bug)
    }

    fn read_blocks(
        &mut self,
        handle: u32,
        start_block: u32,
        count: u32,
        buf: &mut [u8],
    ) -> Result<u32, Status> {
        let path = self.handles.get(&handle).ok_or(Status::NoSuchEntry)?;
        let node = self.nodes.get(path).ok_or(Status::NoSuchEntry)?;

        // The final partial block reads back zero-padded; blocks past the
        // end read as zeros and still count as transferred.
        for i in 0..count {
            let start = ((start_block + i) * BLOCK_SIZE) as usize;
            let dest = &mut buf[(i * BLOCK_SIZE) as usize..((i + 1) * BLOCK_SIZE) as usize];
            dest.fill(0);
            if start < node.data.len() {
                let end = (start + BLOCK_SIZE as usize).min(node.data.len());
                dest[..end - start].copy_from_slice(&node.data[start..end]);
            }
        }
        Ok(count)
    }

    fn write_blocks(
        &mut self,
        handle: u32,
        start_block: u32,
        count: u32,
        buf: &[u8],
    ) -> Result<u32, Status> {
        self.deny_writes()?;
        let path = self.handles.get(&handle).ok_or(Status::NoSuchEntry)?.clone();
        let node = self.nodes.get_mut(&path).ok_or(Status::NoSuchEntry)?;

        let end = ((start_block + count) * BLOCK_SIZE) as usize;
        if node.data.len() < end {
            node.data.resize(end, 0);
        }
        let start = (start_block * BLOCK_SIZE) as usize;
        node.data[start..end].copy_from_slice(&buf[..(count * BLOCK_SIZE) as usize]);
        node.modified = clock::date_time();
        Ok(count)
    }

    fn set_size(&mut self, handle: u32, size: u32) -> Result<(), Status> {
        self.deny_writes()?;
        let path = self.handles.get(&handle).ok_or(Status::NoSuchEntry)?.clone();
        let node = self.nodes.get_mut(&path).ok_or(Status::NoSuchEntry)?;
        node.data.resize(size as usize, 0);
        node.modified = clock::date_time();
        Ok(())
    }

    fn delete(&mut self, rel_path: &str) -> Result<(), Status> {
        self.deny_writes()?;
        let node = self.nodes.get(rel_path).ok_or(Status::NoSuchFile)?;
        if node.kind == FileKind::Dir {
            return Err(Status::Invalid);
        }
        let handle = node.handle;
        self.nodes.remove(rel_path);
        self.handles.remove(&handle);
        Ok(())
    }

    fn make_dir(&mut self, rel_path: &str) -> Result<(), Status> {
        self.deny_writes()?;
        if rel_path.is_empty() || self.nodes.contains_key(rel_path) {
            return Err(Status::Invalid);
        }
        if !self.parent_exists(rel_path) {
            return Err(Status::NoSuchFile);
        }
        self.insert_node(String::from(rel_path), FileKind::Dir);
        Ok(())
    }

    fn remove_dir(&mut self, rel_path: &str) -> Result<(), Status> {
        self.deny_writes()?;
        let node = self.nodes.get(rel_path).ok_or(Status::NoSuchFile)?;
        if node.kind != FileKind::Dir || rel_path.is_empty() {
            return Err(Status::Invalid);
        }
        if self.children_of(rel_path).next().is_some() {
            return Err(Status::Invalid);
        }
        let handle = node.handle;
        self.nodes.remove(rel_path);
        self.handles.remove(&handle);
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), Status> {
        self.deny_writes()?;
        if !self.nodes.contains_key(from) {
            return Err(Status::NoSuchFile);
        }
        if self.nodes.contains_key(to) || !self.parent_exists(to) {
            return Err(Status::Invalid);
        }

        // Move the node itself, then every descendant path.
        let descendants: Vec<String> = self
            .nodes
            .keys()
            .filter(|p| {
                p.as_str() == from
                    || (p.len() > from.len() + 1
                        && p.starts_with(from)
                        && p.as_bytes()[from.len()] == b'/')
            })
            .cloned()
            .collect();

        for old_path in descendants {
            let new_path = alloc::format!("{to}{}", &old_path[from.len()..]);
            if let Some(node) = self.nodes.remove(&old_path) {
                self.handles.insert(node.handle, new_path.clone());
                self.nodes.insert(new_path, node);
            }
        }
        Ok(())
    }

    fn timestamp(&mut self, rel_path: &str, date: u16, time: u16) -> Result<(), Status> {
        let node = self.nodes.get_mut(rel_path).ok_or(Status::NoSuchFile)?;
        node.modified = (date, time);
        Ok(())
    }
}
