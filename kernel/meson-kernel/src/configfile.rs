//! Configuration file reader and writer.
//!
//! Configuration files are line-based: `#` comments, blank lines, and
//! `key=value` data lines. Reading produces a [`VariableList`] in file
//! order; malformed lines are skipped. Writing is transactional: the new
//! content is assembled in a sibling temporary file that replaces the
//! original by rename, so an I/O failure mid-write leaves the original
//! untouched. When the target already exists, comment and blank lines
//! leading up to each data line are carried over into the rewrite.

extern crate alloc;

use alloc::format;
use alloc::string::String;

use crate::fs::{self, FileStream, OpenMode};
use crate::status::Status;
use crate::varlist::VariableList;

/// Longest line read from a configuration file.
const MAX_LINE: usize = 256;

/// Parse a configuration file into a [`VariableList`].
///
/// # Errors
///
/// Returns [`Status::NoSuchFile`] when the file does not exist and
/// propagates stream errors. Malformed lines are not errors.
pub fn read_config(path: &str) -> Result<VariableList, Status> {
    let mut stream = FileStream::open(path, OpenMode::READ)?;
    let mut list = VariableList::with_defaults();

    while let Some(line) = stream.read_line(MAX_LINE)? {
        let trimmed = line.strip_suffix('\n').unwrap_or(&line);
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        // The first '=' splits; a line without one is skipped.
        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        let _ = list.set(key, value);
    }

    stream.close()?;
    Ok(list)
}

/// Write a [`VariableList`] out as a configuration file.
///
/// # Errors
///
/// Returns [`Status::NoWrite`] on a read-only filesystem and propagates
/// stream errors.
pub fn write_config(path: &str, list: &VariableList) -> Result<(), Status> {
    let has_old = fs::find(path).is_ok();

    // Assemble next to the target so the final rename stays on one
    // filesystem.
    let (target, temp_name): (String, String) = if has_old {
        (String::from(path), format!("{path}.TMP"))
    } else {
        (String::from(path), String::from(path))
    };

    let mut old_stream = if has_old {
        Some(FileStream::open(path, OpenMode::READ)?)
    } else {
        None
    };

    let mut new_stream = FileStream::open(
        &temp_name,
        OpenMode::WRITE | OpenMode::CREATE | OpenMode::TRUNCATE,
    )?;

    let result = write_entries(list, old_stream.as_mut(), &mut new_stream);
    if let Some(stream) = old_stream {
        let _ = stream.close();
    }

    match result {
        Ok(()) => {
            new_stream.close()?;
            if has_old {
                fs::move_entry(&temp_name, &target)?;
            }
            Ok(())
        }
        Err(err) => {
            // Leave the original alone; drop the partial temp file.
            let _ = new_stream.close();
            if has_old {
                let _ = fs::delete(&temp_name);
            }
            Err(err)
        }
    }
}

fn write_entries(
    list: &VariableList,
    mut old_stream: Option<&mut FileStream>,
    new_stream: &mut FileStream,
) -> Result<(), Status> {
    for (key, value) in list.iter() {
        // Keep the rewrite in step with the old file: copy the comment
        // and blank lines that led up to the data line this entry
        // replaces.
        if let Some(old) = old_stream.as_deref_mut() {
            while let Some(line) = old.read_line(MAX_LINE)? {
                if line.starts_with('#') || line == "\n" {
                    new_stream.write(line.as_bytes())?;
                } else {
                    // The old data line itself is superseded.
                    break;
                }
            }
        }
        new_stream.write_line(&format!("{key}={value}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::ramfs::RamFs;
    use alloc::boxed::Box;
    use alloc::string::ToString;
    use alloc::vec::Vec;

    fn mount_fresh(prefix: &str) {
        fs::mount(prefix, Box::new(RamFs::new())).unwrap();
    }

    fn write_raw(path: &str, content: &str) {
        let mut stream = FileStream::open(
            path,
            OpenMode::WRITE | OpenMode::CREATE | OpenMode::TRUNCATE,
        )
        .unwrap();
        stream.write(content.as_bytes()).unwrap();
        stream.close().unwrap();
    }

    fn read_raw(path: &str) -> String {
        let mut stream = FileStream::open(path, OpenMode::READ).unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn read_skips_comments_blanks_and_noise() {
        mount_fresh("/c-read");
        write_raw(
            "/c-read/a.conf",
            "# heading\n\nkernel.log=1\nbroken line\nshell=/programs/vsh\n",
        );

        let list = read_config("/c-read/a.conf").unwrap();
        assert_eq!(list.count(), 2);
        assert_eq!(list.get("kernel.log"), Some("1".to_string()));
        assert_eq!(list.get("shell"), Some("/programs/vsh".to_string()));
    }

    #[test]
    fn value_may_contain_equals() {
        mount_fresh("/c-eq");
        write_raw("/c-eq/a.conf", "flags=a=b=c\n");
        let list = read_config("/c-eq/a.conf").unwrap();
        assert_eq!(list.get("flags"), Some("a=b=c".to_string()));
    }

    #[test]
    fn missing_file_reports_no_such_file() {
        mount_fresh("/c-miss");
        assert!(matches!(
            read_config("/c-miss/none.conf"),
            Err(Status::NoSuchFile)
        ));
    }

    #[test]
    fn fresh_write_emits_entries_in_order() {
        mount_fresh("/c-fresh");
        let mut list = VariableList::with_defaults();
        list.set("a", "1").unwrap();
        list.set("b", "2").unwrap();
        write_config("/c-fresh/new.conf", &list).unwrap();

        assert_eq!(read_raw("/c-fresh/new.conf"), "a=1\nb=2\n");
    }

    #[test]
    fn rewrite_preserves_leading_comments_and_blanks() {
        mount_fresh("/c-keep");
        write_raw("/c-keep/k.conf", "# top comment\na=1\n\nb=2\n");

        let list = read_config("/c-keep/k.conf").unwrap();
        write_config("/c-keep/k.conf", &list).unwrap();

        assert_eq!(read_raw("/c-keep/k.conf"), "# top comment\na=1\n\nb=2\n");
    }

    #[test]
    fn round_trip_is_stable_as_a_map() {
        mount_fresh("/c-round");
        write_raw("/c-round/k.conf", "# note\nx=left\ny=right\n");

        let first = read_config("/c-round/k.conf").unwrap();
        write_config("/c-round/k.conf", &first).unwrap();
        let second = read_config("/c-round/k.conf").unwrap();

        let a: Vec<_> = first.iter().collect();
        let b: Vec<_> = second.iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn rewrite_updates_changed_values() {
        mount_fresh("/c-update");
        write_raw("/c-update/k.conf", "# keep me\nmode=text\n");

        let mut list = read_config("/c-update/k.conf").unwrap();
        list.set("mode", "graphics").unwrap();
        write_config("/c-update/k.conf", &list).unwrap();

        assert_eq!(read_raw("/c-update/k.conf"), "# keep me\nmode=graphics\n");
        let reread = read_config("/c-update/k.conf").unwrap();
        assert_eq!(reread.get("mode"), Some("graphics".to_string()));
    }

    #[test]
    fn read_only_filesystem_reports_no_write() {
        use crate::fs::Filesystem as _;

        // Populate a RAM filesystem, then write-protect it and mount.
        let mut ram = RamFs::new();
        let entry = ram.create_file("k.conf").unwrap();
        let mut block = [0u8; crate::fs::ramfs::BLOCK_SIZE as usize];
        block[..4].copy_from_slice(b"a=1\n");
        ram.write_blocks(entry.handle, 0, 1, &block).unwrap();
        ram.set_size(entry.handle, 4).unwrap();
        ram.set_read_only(true);
        fs::mount("/c-ro", Box::new(ram)).unwrap();

        let list = read_config("/c-ro/k.conf").unwrap();
        assert_eq!(list.get("a"), Some("1".to_string()));
        assert!(matches!(
            write_config("/c-ro/k.conf", &list),
            Err(Status::NoWrite)
        ));
    }
}
