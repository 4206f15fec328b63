//! Byte-granular file streams.
//!
//! A [`FileStream`] buffers one filesystem block and exposes sequential
//! byte I/O, line reads, and seeking over the block-oriented facade.
//! Writes are gathered in the buffer and land on the filesystem when the
//! stream moves to another block, flushes, or closes.
//!
//! Every stream embeds its own [`ResourceLock`]; streams are handed
//! between processes (the console login sequence does this) and a stream
//! wedged by a dead process must stay recoverable.

extern crate alloc;

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use super::{File, OpenMode};
use crate::status::Status;
use crate::sync::ResourceLock;

/// A buffered byte stream over an open [`File`].
pub struct FileStream {
    file: File,
    offset: u32,
    /// Logical end of file; may run ahead of the on-disk size until the
    /// next flush.
    size: u32,
    buffer: Vec<u8>,
    buffered_block: Option<u32>,
    dirty: bool,
    lock: ResourceLock,
}

impl FileStream {
    /// Open a stream on a path.
    ///
    /// `APPEND` positions the stream at the end of the file; everything
    /// else starts at byte 0.
    ///
    /// # Errors
    ///
    /// Propagates [`super::open`] errors.
    pub fn open(orig_path: &str, mode: OpenMode) -> Result<Self, Status> {
        let file = super::open(orig_path, mode)?;
        let size = file.size;
        let offset = if mode.contains(OpenMode::APPEND) {
            size
        } else {
            0
        };
        let block_size = file.block_size.max(1) as usize;
        Ok(Self {
            file,
            offset,
            size,
            buffer: vec![0u8; block_size],
            buffered_block: None,
            dirty: false,
            lock: ResourceLock::new(),
        })
    }

    /// The stream's current byte offset.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// The stream's logical size in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Borrow the underlying file.
    #[must_use]
    pub fn file(&self) -> &File {
        &self.file
    }

    fn block_size(&self) -> u32 {
        self.file.block_size.max(1)
    }

    fn flush_buffer(&mut self) -> Result<(), Status> {
        if self.dirty {
            if let Some(block) = self.buffered_block {
                let handle = self.file.handle;
                let buffer = &self.buffer;
                super::with_mount(self.file.mount, |fs| {
                    fs.write_blocks(handle, block, 1, buffer)
                })?;
            }
            self.dirty = false;
        }
        Ok(())
    }

    fn load_block(&mut self, block: u32) -> Result<(), Status> {
        if self.buffered_block == Some(block) {
            return Ok(());
        }
        self.flush_buffer()?;
        let handle = self.file.handle;
        let buffer = &mut self.buffer;
        super::with_mount(self.file.mount, |fs| {
            fs.read_blocks(handle, block, 1, buffer)
        })?;
        self.buffered_block = Some(block);
        Ok(())
    }

    /// Move the stream position.
    ///
    /// Seeking past the logical end is allowed for writable streams; the
    /// gap reads back as zeros once written over.
    ///
    /// # Errors
    ///
    /// Returns [`Status::Invalid`] when a read-only stream seeks past
    /// the end.
    pub fn seek(&mut self, offset: u32) -> Result<(), Status> {
        if offset > self.size && !self.file.open_mode.contains(OpenMode::WRITE) {
            return Err(Status::Invalid);
        }
        self.offset = offset;
        Ok(())
    }

    /// Read up to `buf.len()` bytes. Returns the number read; 0 at end
    /// of file.
    ///
    /// # Errors
    ///
    /// [`Status::Permission`] on a stream not open for reading, or
    /// driver errors.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Status> {
        if !self.file.open_mode.contains(OpenMode::READ) {
            return Err(Status::Permission);
        }
        self.lock.acquire()?;
        let result = self.read_locked(buf);
        let _ = self.lock.release();
        result
    }

    fn read_locked(&mut self, buf: &mut [u8]) -> Result<usize, Status> {
        let block_size = self.block_size();
        let mut done = 0usize;

        while done < buf.len() && self.offset < self.size {
            let block = self.offset / block_size;
            self.load_block(block)?;

            let within = (self.offset % block_size) as usize;
            let in_block = block_size as usize - within;
            let to_eof = (self.size - self.offset) as usize;
            let take = in_block.min(to_eof).min(buf.len() - done);

            buf[done..done + take].copy_from_slice(&self.buffer[within..within + take]);
            done += take;
            self.offset += take as u32;
        }
        Ok(done)
    }

    /// Write the whole of `buf` at the current position, growing the
    /// file as needed.
    ///
    /// # Errors
    ///
    /// [`Status::Permission`] on a stream not open for writing, or
    /// driver errors.
    pub fn write(&mut self, buf: &[u8]) -> Result<(), Status> {
        if !self.file.open_mode.contains(OpenMode::WRITE) {
            return Err(Status::Permission);
        }
        self.lock.acquire()?;
        let result = self.write_locked(buf);
        let _ = self.lock.release();
        result
    }

    fn write_locked(&mut self, buf: &[u8]) -> Result<(), Status> {
        let block_size = self.block_size();
        let mut done = 0usize;

        while done < buf.len() {
            let block = self.offset / block_size;
            self.load_block(block)?;

            let within = (self.offset % block_size) as usize;
            let take = (block_size as usize - within).min(buf.len() - done);

            self.buffer[within..within + take].copy_from_slice(&buf[done..done + take]);
            self.dirty = true;
            done += take;
            self.offset += take as u32;
            self.size = self.size.max(self.offset);
        }
        Ok(())
    }

    /// Read one line, up to `max_len` bytes, including the trailing
    /// newline when present. Returns `None` at end of file.
    ///
    /// # Errors
    ///
    /// Propagates read errors.
    pub fn read_line(&mut self, max_len: usize) -> Result<Option<String>, Status> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        while line.len() < max_len {
            if self.read(&mut byte)? == 0 {
                break;
            }
            line.push(byte[0]);
            if byte[0] == b'\n' {
                break;
            }
        }
        if line.is_empty() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    /// Write a string followed by a newline.
    ///
    /// # Errors
    ///
    /// Propagates write errors.
    pub fn write_line(&mut self, line: &str) -> Result<(), Status> {
        self.write(line.as_bytes())?;
        self.write(b"\n")
    }

    /// Push buffered data and the logical size to the filesystem.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn flush(&mut self) -> Result<(), Status> {
        self.lock.acquire()?;
        let result = self.flush_locked();
        let _ = self.lock.release();
        result
    }

    fn flush_locked(&mut self) -> Result<(), Status> {
        self.flush_buffer()?;
        if self.file.open_mode.contains(OpenMode::WRITE) {
            super::set_size(&mut self.file, self.size)?;
        }
        Ok(())
    }

    /// Flush and close the stream.
    ///
    /// # Errors
    ///
    /// Propagates flush errors; the stream is consumed either way.
    pub fn close(mut self) -> Result<(), Status> {
        let result = self.flush();
        super::close(&self.file);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs;
    use crate::fs::ramfs::RamFs;
    use alloc::boxed::Box;

    fn mount_fresh(prefix: &str) {
        fs::mount(prefix, Box::new(RamFs::new())).unwrap();
    }

    #[test]
    fn write_then_read_back_bytes() {
        mount_fresh("/s-rw");
        let mut out = FileStream::open(
            "/s-rw/f",
            OpenMode::READWRITE | OpenMode::CREATE,
        )
        .unwrap();
        out.write(b"one\ntwo\n").unwrap();
        out.close().unwrap();

        let mut input = FileStream::open("/s-rw/f", OpenMode::READ).unwrap();
        let mut buf = [0u8; 64];
        let n = input.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"one\ntwo\n");
        // A second read reports end of file.
        assert_eq!(input.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn line_reads_include_newline() {
        mount_fresh("/s-line");
        let mut out = FileStream::open(
            "/s-line/f",
            OpenMode::WRITE | OpenMode::CREATE,
        )
        .unwrap();
        out.write_line("alpha").unwrap();
        out.write_line("").unwrap();
        out.write(b"tail").unwrap();
        out.close().unwrap();

        let mut input = FileStream::open("/s-line/f", OpenMode::READ).unwrap();
        assert_eq!(input.read_line(64).unwrap().as_deref(), Some("alpha\n"));
        assert_eq!(input.read_line(64).unwrap().as_deref(), Some("\n"));
        assert_eq!(input.read_line(64).unwrap().as_deref(), Some("tail"));
        assert_eq!(input.read_line(64).unwrap(), None);
    }

    #[test]
    fn seek_repositions_reads() {
        mount_fresh("/s-seek");
        let mut out = FileStream::open(
            "/s-seek/f",
            OpenMode::READWRITE | OpenMode::CREATE,
        )
        .unwrap();
        out.write(b"0123456789").unwrap();
        out.seek(4).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(out.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"456");
        out.close().unwrap();
    }

    #[test]
    fn writes_spanning_blocks_survive() {
        mount_fresh("/s-span");
        let mut out = FileStream::open(
            "/s-span/f",
            OpenMode::READWRITE | OpenMode::CREATE,
        )
        .unwrap();

        // Three full blocks plus a tail, written in awkward chunks.
        let block = out.file().block_size as usize;
        let payload: Vec<u8> = (0..(block * 3 + 17)).map(|i| (i % 251) as u8).collect();
        for chunk in payload.chunks(97) {
            out.write(chunk).unwrap();
        }
        out.flush().unwrap();

        let mut input = FileStream::open("/s-span/f", OpenMode::READ).unwrap();
        assert_eq!(input.size() as usize, payload.len());
        let mut back = vec![0u8; payload.len()];
        let mut read_total = 0;
        while read_total < back.len() {
            let n = input.read(&mut back[read_total..]).unwrap();
            assert!(n > 0);
            read_total += n;
        }
        assert_eq!(back, payload);
    }

    #[test]
    fn read_only_stream_rejects_writes() {
        mount_fresh("/s-ro");
        FileStream::open("/s-ro/f", OpenMode::WRITE | OpenMode::CREATE)
            .unwrap()
            .close()
            .unwrap();
        let mut input = FileStream::open("/s-ro/f", OpenMode::READ).unwrap();
        assert_eq!(input.write(b"x"), Err(Status::Permission));
    }

    #[test]
    fn append_positions_at_end() {
        mount_fresh("/s-append");
        let mut out = FileStream::open(
            "/s-append/f",
            OpenMode::WRITE | OpenMode::CREATE,
        )
        .unwrap();
        out.write(b"head,").unwrap();
        out.close().unwrap();

        let mut appender = FileStream::open(
            "/s-append/f",
            OpenMode::WRITE | OpenMode::APPEND,
        )
        .unwrap();
        appender.write(b"tail").unwrap();
        appender.close().unwrap();

        let mut input = FileStream::open("/s-append/f", OpenMode::READ).unwrap();
        let mut buf = [0u8; 16];
        let n = input.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"head,tail");
    }
}
