//! Kernel-side API function handlers.
//!
//! Thin adapters between the raw `u32` calling convention and the typed
//! kernel interfaces. Pointer arguments are validated with
//! [`UserSlice`](super::userptr::UserSlice) before anything touches
//! them; open files and streams are represented to user space as small
//! integer handles owned by the tables here.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use super::numbers;
use super::userptr::UserSlice;
use super::{ApiHandler, ApiTable, FunctionEntry};
use crate::fs::{self, FileStream, OpenMode};
use crate::proc::{self, PRIVILEGE_SUPERVISOR, PRIVILEGE_USER, ProcessState};
use crate::status::Status;
use crate::sync::SpinLock;
use crate::{console, environment, loader, power};

/// Open files handed to user space, by handle.
static OPEN_FILES: SpinLock<BTreeMap<u32, fs::File>> = SpinLock::new(BTreeMap::new());

/// Open streams handed to user space, by handle.
static OPEN_STREAMS: SpinLock<BTreeMap<u32, FileStream>> = SpinLock::new(BTreeMap::new());

/// Next handle for both tables; shared so handles stay unambiguous.
static NEXT_HANDLE: SpinLock<u32> = SpinLock::new(1);

fn fresh_handle() -> u32 {
    let mut next = NEXT_HANDLE.lock();
    let handle = *next;
    *next += 1;
    handle
}

fn code_of(result: Result<i32, Status>) -> i32 {
    match result {
        Ok(value) => value,
        Err(status) => status.code(),
    }
}

/// Serialised `File` record written to user space by `first`/`next`/
/// `find`: a 64-byte name, then seven little-endian 32-bit words
/// (kind, size, block size, blocks, created date/time, modified
/// date/time packed as two half-words each).
pub const FILE_RECORD_SIZE: u32 = 64 + 7 * 4;

fn serialize_file(file: &fs::File) -> Vec<u8> {
    let mut out = Vec::with_capacity(FILE_RECORD_SIZE as usize);
    let mut name = [0u8; 64];
    for (dst, src) in name.iter_mut().zip(file.name.bytes()) {
        *dst = src;
    }
    out.extend_from_slice(&name);
    let kind = match file.kind {
        fs::FileKind::File => 0u32,
        fs::FileKind::Dir => 1,
        fs::FileKind::Link => 2,
    };
    out.extend_from_slice(&kind.to_le_bytes());
    out.extend_from_slice(&file.size.to_le_bytes());
    out.extend_from_slice(&file.block_size.to_le_bytes());
    out.extend_from_slice(&file.blocks.to_le_bytes());
    out.extend_from_slice(
        &(u32::from(file.created.0) | (u32::from(file.created.1) << 16)).to_le_bytes(),
    );
    out.extend_from_slice(
        &(u32::from(file.modified.0) | (u32::from(file.modified.1) << 16)).to_le_bytes(),
    );
    out.extend_from_slice(&0u32.to_le_bytes());
    out
}

// ── Text console ─────────────────────────────────────────────────────

fn text_print(text_ptr: u32) -> i32 {
    code_of((|| {
        let slice = UserSlice::new(text_ptr, 1024)?;
        // SAFETY: validated user range; the gate runs with the caller's
        // address space mapped.
        let text = unsafe { slice.read_str() };
        console::print(&text);
        Ok(0)
    })())
}

fn text_print_line(text_ptr: u32) -> i32 {
    let status = text_print(text_ptr);
    if status < 0 {
        return status;
    }
    console::print("\n");
    0
}

fn text_newline() -> i32 {
    console::print("\n");
    0
}

fn text_backspace() -> i32 {
    code_of(
        console::with_console(|c| {
            c.delete_char();
        })
        .map(|()| 0),
    )
}

fn text_tab() -> i32 {
    console::print("\t");
    0
}

fn text_clear_screen() -> i32 {
    code_of(
        console::with_console(|c| {
            c.clear_screen();
        })
        .map(|()| 0),
    )
}

fn text_get_num_columns() -> i32 {
    code_of(console::with_console(|c| i32::from(c.area.columns)))
}

fn text_get_num_rows() -> i32 {
    code_of(console::with_console(|c| i32::from(c.area.rows)))
}

fn text_get_column() -> i32 {
    code_of(console::with_console(|c| i32::from(c.area.cursor_column)))
}

fn text_set_column(column: u32) -> i32 {
    code_of(
        console::with_console(|c| {
            let row = c.area.cursor_row;
            c.set_cursor(row, column as u16);
        })
        .map(|()| 0),
    )
}

fn text_get_row() -> i32 {
    code_of(console::with_console(|c| i32::from(c.area.cursor_row)))
}

fn text_set_row(row: u32) -> i32 {
    code_of(
        console::with_console(|c| {
            let column = c.area.cursor_column;
            c.set_cursor(row as u16, column);
        })
        .map(|()| 0),
    )
}

fn text_get_foreground() -> i32 {
    code_of(console::with_console(|c| i32::from(c.area.foreground.code())))
}

fn text_set_foreground(color: u32) -> i32 {
    code_of(
        console::with_console(|c| {
            c.set_foreground(console::ConsoleColor::from_code(color as u8));
        })
        .map(|()| 0),
    )
}

fn text_get_background() -> i32 {
    code_of(console::with_console(|c| i32::from(c.area.background.code())))
}

fn text_set_background(color: u32) -> i32 {
    code_of(
        console::with_console(|c| {
            c.set_background(console::ConsoleColor::from_code(color as u8));
        })
        .map(|()| 0),
    )
}

fn text_input_count() -> i32 {
    code_of(console::with_console(|c| c.area.input.count() as i32))
}

fn text_input_getc(out_ptr: u32) -> i32 {
    code_of((|| {
        let slice = UserSlice::new(out_ptr, 1)?;
        let ch = console::with_console(|c| c.area.input.getc())?;
        match ch {
            Some(ch) => {
                // SAFETY: validated single-byte user range.
                unsafe { slice.write_bytes(&[ch]) };
                Ok(0)
            }
            None => Err(Status::NoSuchEntry),
        }
    })())
}

fn text_input_set_echo(on: u32) -> i32 {
    code_of(
        console::with_console(|c| {
            c.area.input.set_echo(on != 0);
        })
        .map(|()| 0),
    )
}

// ── Files ────────────────────────────────────────────────────────────

fn read_user_path(ptr: u32) -> Result<alloc::string::String, Status> {
    let slice = UserSlice::new(ptr, 256)?;
    // SAFETY: validated user range.
    let path = unsafe { slice.read_str() };
    if path.is_empty() {
        return Err(Status::NullParameter);
    }
    Ok(path)
}

fn file_fixup_path(orig_ptr: u32, fixed_ptr: u32) -> i32 {
    code_of((|| {
        let orig = read_user_path(orig_ptr)?;
        let out = UserSlice::new(fixed_ptr, 256)?;
        let fixed = fs::canonical(&orig);
        // SAFETY: validated user range.
        unsafe { out.write_str(&fixed) };
        Ok(0)
    })())
}

fn file_first(dir_ptr: u32, record_ptr: u32) -> i32 {
    code_of((|| {
        let dir = read_user_path(dir_ptr)?;
        let out = UserSlice::new(record_ptr, FILE_RECORD_SIZE)?;
        let file = fs::first(&dir)?;
        // SAFETY: validated user range.
        unsafe { out.write_bytes(&serialize_file(&file)) };
        Ok(0)
    })())
}

fn file_next(dir_ptr: u32, record_ptr: u32) -> i32 {
    code_of((|| {
        let dir = read_user_path(dir_ptr)?;
        let record = UserSlice::new(record_ptr, FILE_RECORD_SIZE)?;
        // SAFETY: validated user range; the record's first 64 bytes are
        // the NUL-padded current entry name written by `first`.
        let bytes = unsafe { record.read_bytes() };
        let end = bytes[..64].iter().position(|&b| b == 0).unwrap_or(64);
        let name = core::str::from_utf8(&bytes[..end]).map_err(|_| Status::Invalid)?;

        let mut current = fs::first(&dir)?;
        // Re-anchor on the caller's current entry, then advance.
        while current.name != name {
            fs::next(&dir, &mut current)?;
        }
        fs::next(&dir, &mut current)?;
        // SAFETY: validated user range.
        unsafe { record.write_bytes(&serialize_file(&current)) };
        Ok(0)
    })())
}

fn file_find(path_ptr: u32, record_ptr: u32) -> i32 {
    code_of((|| {
        let path = read_user_path(path_ptr)?;
        let out = UserSlice::new(record_ptr, FILE_RECORD_SIZE)?;
        let file = fs::find(&path)?;
        // SAFETY: validated user range.
        unsafe { out.write_bytes(&serialize_file(&file)) };
        Ok(0)
    })())
}

fn file_open(path_ptr: u32, mode: u32, handle_ptr: u32) -> i32 {
    code_of((|| {
        let path = read_user_path(path_ptr)?;
        let out = UserSlice::new(handle_ptr, 4)?;
        let mode = OpenMode::from_bits(mode).ok_or(Status::Invalid)?;
        let file = fs::open(&path, mode)?;
        let handle = fresh_handle();
        OPEN_FILES.lock().insert(handle, file);
        // SAFETY: validated user range.
        unsafe { out.write_bytes(&handle.to_le_bytes()) };
        Ok(0)
    })())
}

fn file_close(handle: u32) -> i32 {
    match OPEN_FILES.lock().remove(&handle) {
        Some(file) => {
            fs::close(&file);
            0
        }
        None => Status::NoSuchEntry.code(),
    }
}

fn file_read(handle: u32, start_block: u32, count: u32, buf_ptr: u32) -> i32 {
    code_of((|| {
        let files = OPEN_FILES.lock();
        let file = files.get(&handle).ok_or(Status::NoSuchEntry)?;
        let out = UserSlice::new(buf_ptr, count * file.block_size)?;
        let mut buf = alloc::vec![0u8; (count * file.block_size) as usize];
        let transferred = fs::read(file, start_block, count, &mut buf)?;
        // SAFETY: validated user range.
        unsafe { out.write_bytes(&buf) };
        Ok(transferred as i32)
    })())
}

fn file_write(handle: u32, start_block: u32, count: u32, buf_ptr: u32) -> i32 {
    code_of((|| {
        let mut files = OPEN_FILES.lock();
        let file = files.get_mut(&handle).ok_or(Status::NoSuchEntry)?;
        let input = UserSlice::new(buf_ptr, count * file.block_size)?;
        // SAFETY: validated user range.
        let buf = unsafe { input.read_bytes() };
        let transferred = fs::write(file, start_block, count, &buf)?;
        Ok(transferred as i32)
    })())
}

fn file_delete(path_ptr: u32) -> i32 {
    code_of(read_user_path(path_ptr).and_then(|p| fs::delete(&p)).map(|()| 0))
}

fn file_delete_secure(path_ptr: u32) -> i32 {
    code_of(
        read_user_path(path_ptr)
            .and_then(|p| fs::delete_secure(&p))
            .map(|()| 0),
    )
}

fn file_make_dir(path_ptr: u32) -> i32 {
    code_of(read_user_path(path_ptr).and_then(|p| fs::make_dir(&p)).map(|()| 0))
}

fn file_remove_dir(path_ptr: u32) -> i32 {
    code_of(
        read_user_path(path_ptr)
            .and_then(|p| fs::remove_dir(&p))
            .map(|()| 0),
    )
}

fn file_copy(src_ptr: u32, dest_ptr: u32) -> i32 {
    code_of((|| {
        let src = read_user_path(src_ptr)?;
        let dest = read_user_path(dest_ptr)?;
        fs::copy(&src, &dest)?;
        Ok(0)
    })())
}

fn file_copy_recursive(src_ptr: u32, dest_ptr: u32) -> i32 {
    code_of((|| {
        let src = read_user_path(src_ptr)?;
        let dest = read_user_path(dest_ptr)?;
        fs::copy_recursive(&src, &dest)?;
        Ok(0)
    })())
}

fn file_move(src_ptr: u32, dest_ptr: u32) -> i32 {
    code_of((|| {
        let src = read_user_path(src_ptr)?;
        let dest = read_user_path(dest_ptr)?;
        fs::move_entry(&src, &dest)?;
        Ok(0)
    })())
}

fn file_timestamp(path_ptr: u32) -> i32 {
    code_of(
        read_user_path(path_ptr)
            .and_then(|p| fs::timestamp(&p))
            .map(|()| 0),
    )
}

// ── File streams ─────────────────────────────────────────────────────

fn file_stream_open(path_ptr: u32, mode: u32, handle_ptr: u32) -> i32 {
    code_of((|| {
        let path = read_user_path(path_ptr)?;
        let out = UserSlice::new(handle_ptr, 4)?;
        let mode = OpenMode::from_bits(mode).ok_or(Status::Invalid)?;
        let stream = FileStream::open(&path, mode)?;
        let handle = fresh_handle();
        OPEN_STREAMS.lock().insert(handle, stream);
        // SAFETY: validated user range.
        unsafe { out.write_bytes(&handle.to_le_bytes()) };
        Ok(0)
    })())
}

fn file_stream_seek(handle: u32, offset: u32) -> i32 {
    code_of((|| {
        let mut streams = OPEN_STREAMS.lock();
        let stream = streams.get_mut(&handle).ok_or(Status::NoSuchEntry)?;
        stream.seek(offset)?;
        Ok(0)
    })())
}

fn file_stream_read(handle: u32, count: u32, buf_ptr: u32) -> i32 {
    code_of((|| {
        let out = UserSlice::new(buf_ptr, count)?;
        let mut streams = OPEN_STREAMS.lock();
        let stream = streams.get_mut(&handle).ok_or(Status::NoSuchEntry)?;
        let mut buf = alloc::vec![0u8; count as usize];
        let n = stream.read(&mut buf)?;
        // SAFETY: validated user range.
        unsafe { out.write_bytes(&buf[..n]) };
        Ok(n as i32)
    })())
}

fn file_stream_write(handle: u32, count: u32, buf_ptr: u32) -> i32 {
    code_of((|| {
        let input = UserSlice::new(buf_ptr, count)?;
        let mut streams = OPEN_STREAMS.lock();
        let stream = streams.get_mut(&handle).ok_or(Status::NoSuchEntry)?;
        // SAFETY: validated user range.
        let buf = unsafe { input.read_bytes() };
        stream.write(&buf)?;
        Ok(count as i32)
    })())
}

fn file_stream_flush(handle: u32) -> i32 {
    code_of((|| {
        let mut streams = OPEN_STREAMS.lock();
        let stream = streams.get_mut(&handle).ok_or(Status::NoSuchEntry)?;
        stream.flush()?;
        Ok(0)
    })())
}

fn file_stream_close(handle: u32) -> i32 {
    code_of((|| {
        let stream = OPEN_STREAMS
            .lock()
            .remove(&handle)
            .ok_or(Status::NoSuchEntry)?;
        stream.close()?;
        Ok(0)
    })())
}

// ── Multitasker ──────────────────────────────────────────────────────

fn multitasker_get_current_pid() -> i32 {
    proc::current_pid() as i32
}

fn state_code(state: ProcessState) -> i32 {
    match state {
        ProcessState::Running => 0,
        ProcessState::Ready => 1,
        ProcessState::Waiting => 2,
        ProcessState::Sleeping => 3,
        ProcessState::Stopped => 4,
        ProcessState::Finished => 5,
        ProcessState::Zombie => 6,
    }
}

fn state_from_code(code: u32) -> Option<ProcessState> {
    Some(match code {
        0 => ProcessState::Running,
        1 => ProcessState::Ready,
        2 => ProcessState::Waiting,
        3 => ProcessState::Sleeping,
        4 => ProcessState::Stopped,
        5 => ProcessState::Finished,
        6 => ProcessState::Zombie,
        _ => return None,
    })
}

fn multitasker_get_process_state(pid: u32, out_ptr: u32) -> i32 {
    code_of((|| {
        let out = UserSlice::new(out_ptr, 4)?;
        let state = proc::process_state(pid)?;
        // SAFETY: validated user range.
        unsafe { out.write_bytes(&(state_code(state) as u32).to_le_bytes()) };
        Ok(0)
    })())
}

fn multitasker_set_process_state(pid: u32, state: u32) -> i32 {
    code_of((|| {
        let state = state_from_code(state).ok_or(Status::Invalid)?;
        proc::set_process_state(pid, state)?;
        Ok(0)
    })())
}

fn multitasker_get_process_privilege(pid: u32) -> i32 {
    code_of(proc::process_privilege(pid).map(i32::from))
}

fn multitasker_yield() -> i32 {
    proc::yield_timeslice();
    0
}

fn multitasker_wait(ticks: u32) -> i32 {
    proc::wait_ticks(ticks);
    0
}

fn multitasker_block(pid: u32) -> i32 {
    proc::block_on(pid);
    0
}

fn multitasker_kill_process(pid: u32, force: u32) -> i32 {
    code_of(proc::kill(pid, force != 0).map(|()| 0))
}

fn multitasker_get_current_directory(buf_ptr: u32, len: u32) -> i32 {
    code_of((|| {
        let out = UserSlice::new(buf_ptr, len)?;
        let cwd = proc::current_directory();
        // SAFETY: validated user range.
        unsafe { out.write_str(&cwd) };
        Ok(0)
    })())
}

fn multitasker_set_current_directory(path_ptr: u32) -> i32 {
    code_of((|| {
        let path = read_user_path(path_ptr)?;
        let full = fs::canonical(&path);
        // The directory must exist and be a directory.
        let found = fs::find(&full)?;
        if found.kind != fs::FileKind::Dir {
            return Err(Status::Invalid);
        }
        proc::set_current_directory(&full)?;
        Ok(0)
    })())
}

// ── Loader ───────────────────────────────────────────────────────────

fn loader_load(path_ptr: u32, buf_ptr: u32) -> i32 {
    code_of((|| {
        let path = read_user_path(path_ptr)?;
        let data = loader::load_file(&path)?;
        let out = UserSlice::new(buf_ptr, data.len() as u32)?;
        // SAFETY: validated user range.
        unsafe { out.write_bytes(&data) };
        Ok(data.len() as i32)
    })())
}

fn loader_load_program(path_ptr: u32, privilege: u32) -> i32 {
    code_of((|| {
        let path = read_user_path(path_ptr)?;
        let program = loader::load_program(&path, privilege as u8)?;
        Ok(program.pid as i32)
    })())
}

fn loader_exec_program(pid: u32) -> i32 {
    code_of(
        proc::set_process_state(pid, ProcessState::Ready).map(|()| 0),
    )
}

fn loader_load_and_exec(path_ptr: u32, privilege: u32) -> i32 {
    code_of((|| {
        let path = read_user_path(path_ptr)?;
        let pid = loader::load_and_exec(&path, privilege as u8)?;
        Ok(pid as i32)
    })())
}

fn loader_classify_file(path_ptr: u32) -> i32 {
    code_of((|| {
        let path = read_user_path(path_ptr)?;
        let info = loader::classify_file(&path)?;
        Ok(info.flags.bits() as i32)
    })())
}

// ── Real-time clock ──────────────────────────────────────────────────

fn rtc_uptime_seconds() -> i32 {
    crate::clock::uptime_seconds() as i32
}

fn rtc_date_time(out_ptr: u32) -> i32 {
    code_of((|| {
        let out = UserSlice::new(out_ptr, 4)?;
        let (date, time) = crate::clock::date_time();
        let packed = u32::from(date) | (u32::from(time) << 16);
        // SAFETY: validated user range.
        unsafe { out.write_bytes(&packed.to_le_bytes()) };
        Ok(0)
    })())
}

// ── Environment ──────────────────────────────────────────────────────

fn environment_get(key_ptr: u32, buf_ptr: u32, len: u32) -> i32 {
    code_of((|| {
        let key = read_user_path(key_ptr)?;
        let out = UserSlice::new(buf_ptr, len)?;
        let value = environment::get(&key).ok_or(Status::NoSuchEntry)?;
        // SAFETY: validated user range.
        unsafe { out.write_str(&value) };
        Ok(0)
    })())
}

fn environment_set(key_ptr: u32, value_ptr: u32) -> i32 {
    code_of((|| {
        let key = read_user_path(key_ptr)?;
        let value_slice = UserSlice::new(value_ptr, 256)?;
        // SAFETY: validated user range.
        let value = unsafe { value_slice.read_str() };
        environment::set(&key, &value)?;
        Ok(0)
    })())
}

fn environment_unset(key_ptr: u32) -> i32 {
    code_of((|| {
        let key = read_user_path(key_ptr)?;
        environment::unset(&key)?;
        Ok(0)
    })())
}

fn environment_dump() -> i32 {
    for (key, value) in environment::dump() {
        console::print(&alloc::format!("{key}={value}\n"));
    }
    0
}

// ── Miscellaneous ────────────────────────────────────────────────────

fn misc_shutdown(kind: u32, force: u32) -> i32 {
    let kind = match kind {
        0 => power::ShutdownKind::Halt,
        1 => power::ShutdownKind::Reboot,
        2 => power::ShutdownKind::PowerOff,
        _ => return Status::Invalid.code(),
    };
    code_of(power::shutdown(kind, force != 0).map(|()| 0))
}

fn misc_version(buf_ptr: u32, len: u32) -> i32 {
    code_of((|| {
        let out = UserSlice::new(buf_ptr, len)?;
        let version = alloc::format!("{} {}", crate::KERNEL_NAME, crate::KERNEL_VERSION);
        // SAFETY: validated user range.
        unsafe { out.write_str(&version) };
        Ok(0)
    })())
}

fn misc_font_load(path_ptr: u32, name_ptr: u32) -> i32 {
    code_of((|| {
        let path = read_user_path(path_ptr)?;
        let name = read_user_path(name_ptr)?;
        console::font::load(&path, &name)?;
        Ok(0)
    })())
}

fn misc_font_set_default(name_ptr: u32) -> i32 {
    code_of((|| {
        let name = read_user_path(name_ptr)?;
        console::font::set_default(&name)?;
        Ok(0)
    })())
}

/// Register every kernel API function into `table`.
///
/// # Errors
///
/// Returns [`Status::Bug`] when two registrations collide, which means
/// the constants in [`numbers`] overlap.
pub fn register_all(table: &mut ApiTable) -> Result<(), Status> {
    use ApiHandler as H;
    use numbers as n;

    let entries: &[(u32, u8, ApiHandler)] = &[
        // Text console.
        (n::TEXT_PRINT, PRIVILEGE_USER, H::N1(text_print)),
        (n::TEXT_PRINT_LINE, PRIVILEGE_USER, H::N1(text_print_line)),
        (n::TEXT_NEWLINE, PRIVILEGE_USER, H::N0(text_newline)),
        (n::TEXT_BACKSPACE, PRIVILEGE_USER, H::N0(text_backspace)),
        (n::TEXT_TAB, PRIVILEGE_USER, H::N0(text_tab)),
        (n::TEXT_CLEAR_SCREEN, PRIVILEGE_USER, H::N0(text_clear_screen)),
        (n::TEXT_GET_NUM_COLUMNS, PRIVILEGE_USER, H::N0(text_get_num_columns)),
        (n::TEXT_GET_NUM_ROWS, PRIVILEGE_USER, H::N0(text_get_num_rows)),
        (n::TEXT_GET_COLUMN, PRIVILEGE_USER, H::N0(text_get_column)),
        (n::TEXT_SET_COLUMN, PRIVILEGE_USER, H::N1(text_set_column)),
        (n::TEXT_GET_ROW, PRIVILEGE_USER, H::N0(text_get_row)),
        (n::TEXT_SET_ROW, PRIVILEGE_USER, H::N1(text_set_row)),
        (n::TEXT_GET_FOREGROUND, PRIVILEGE_USER, H::N0(text_get_foreground)),
        (n::TEXT_SET_FOREGROUND, PRIVILEGE_USER, H::N1(text_set_foreground)),
        (n::TEXT_GET_BACKGROUND, PRIVILEGE_USER, H::N0(text_get_background)),
        (n::TEXT_SET_BACKGROUND, PRIVILEGE_USER, H::N1(text_set_background)),
        (n::TEXT_INPUT_COUNT, PRIVILEGE_USER, H::N0(text_input_count)),
        (n::TEXT_INPUT_GETC, PRIVILEGE_USER, H::N1(text_input_getc)),
        (n::TEXT_INPUT_SET_ECHO, PRIVILEGE_USER, H::N1(text_input_set_echo)),
        // Files.
        (n::FILE_FIXUP_PATH, PRIVILEGE_USER, H::N2(file_fixup_path)),
        (n::FILE_FIRST, PRIVILEGE_USER, H::N2(file_first)),
        (n::FILE_NEXT, PRIVILEGE_USER, H::N2(file_next)),
        (n::FILE_FIND, PRIVILEGE_USER, H::N2(file_find)),
        (n::FILE_OPEN, PRIVILEGE_USER, H::N3(file_open)),
        (n::FILE_CLOSE, PRIVILEGE_USER, H::N1(file_close)),
        (n::FILE_READ, PRIVILEGE_USER, H::N4(file_read)),
        (n::FILE_WRITE, PRIVILEGE_USER, H::N4(file_write)),
        (n::FILE_DELETE, PRIVILEGE_USER, H::N1(file_delete)),
        (n::FILE_DELETE_SECURE, PRIVILEGE_USER, H::N1(file_delete_secure)),
        (n::FILE_MAKE_DIR, PRIVILEGE_USER, H::N1(file_make_dir)),
        (n::FILE_REMOVE_DIR, PRIVILEGE_USER, H::N1(file_remove_dir)),
        (n::FILE_COPY, PRIVILEGE_USER, H::N2(file_copy)),
        (n::FILE_COPY_RECURSIVE, PRIVILEGE_USER, H::N2(file_copy_recursive)),
        (n::FILE_MOVE, PRIVILEGE_USER, H::N2(file_move)),
        (n::FILE_TIMESTAMP, PRIVILEGE_USER, H::N1(file_timestamp)),
        (n::FILE_STREAM_OPEN, PRIVILEGE_USER, H::N3(file_stream_open)),
        (n::FILE_STREAM_SEEK, PRIVILEGE_USER, H::N2(file_stream_seek)),
        (n::FILE_STREAM_READ, PRIVILEGE_USER, H::N3(file_stream_read)),
        (n::FILE_STREAM_WRITE, PRIVILEGE_USER, H::N3(file_stream_write)),
        (n::FILE_STREAM_FLUSH, PRIVILEGE_USER, H::N1(file_stream_flush)),
        (n::FILE_STREAM_CLOSE, PRIVILEGE_USER, H::N1(file_stream_close)),
        // Multitasker.
        (n::MULTITASKER_GET_CURRENT_PID, PRIVILEGE_USER, H::N0(multitasker_get_current_pid)),
        (n::MULTITASKER_GET_PROCESS_STATE, PRIVILEGE_USER, H::N2(multitasker_get_process_state)),
        (n::MULTITASKER_SET_PROCESS_STATE, PRIVILEGE_USER, H::N2(multitasker_set_process_state)),
        (
            n::MULTITASKER_GET_PROCESS_PRIVILEGE,
            PRIVILEGE_USER,
            H::N1(multitasker_get_process_privilege),
        ),
        (n::MULTITASKER_YIELD, PRIVILEGE_USER, H::N0(multitasker_yield)),
        (n::MULTITASKER_WAIT, PRIVILEGE_USER, H::N1(multitasker_wait)),
        (n::MULTITASKER_BLOCK, PRIVILEGE_USER, H::N1(multitasker_block)),
        (n::MULTITASKER_KILL_PROCESS, PRIVILEGE_USER, H::N2(multitasker_kill_process)),
        (
            n::MULTITASKER_GET_CURRENT_DIRECTORY,
            PRIVILEGE_USER,
            H::N2(multitasker_get_current_directory),
        ),
        (
            n::MULTITASKER_SET_CURRENT_DIRECTORY,
            PRIVILEGE_USER,
            H::N1(multitasker_set_current_directory),
        ),
        // Loader.
        (n::LOADER_LOAD, PRIVILEGE_USER, H::N2(loader_load)),
        (n::LOADER_LOAD_PROGRAM, PRIVILEGE_USER, H::N2(loader_load_program)),
        (n::LOADER_EXEC_PROGRAM, PRIVILEGE_USER, H::N1(loader_exec_program)),
        (n::LOADER_LOAD_AND_EXEC, PRIVILEGE_USER, H::N2(loader_load_and_exec)),
        (n::LOADER_CLASSIFY_FILE, PRIVILEGE_USER, H::N1(loader_classify_file)),
        // Real-time clock.
        (n::RTC_UPTIME_SECONDS, PRIVILEGE_USER, H::N0(rtc_uptime_seconds)),
        (n::RTC_DATE_TIME, PRIVILEGE_USER, H::N1(rtc_date_time)),
        // Environment.
        (n::ENVIRONMENT_GET, PRIVILEGE_USER, H::N3(environment_get)),
        (n::ENVIRONMENT_SET, PRIVILEGE_USER, H::N2(environment_set)),
        (n::ENVIRONMENT_UNSET, PRIVILEGE_USER, H::N1(environment_unset)),
        (n::ENVIRONMENT_DUMP, PRIVILEGE_USER, H::N0(environment_dump)),
        // Miscellaneous.
        (n::MISC_SHUTDOWN, PRIVILEGE_USER, H::N2(misc_shutdown)),
        (n::MISC_VERSION, PRIVILEGE_USER, H::N2(misc_version)),
        (n::MISC_FONT_LOAD, PRIVILEGE_USER, H::N2(misc_font_load)),
        (n::MISC_FONT_SET_DEFAULT, PRIVILEGE_SUPERVISOR, H::N1(misc_font_set_default)),
    ];

    for &(number, privilege, handler) in entries {
        table.register(FunctionEntry {
            number,
            privilege,
            handler,
        })?;
    }
    Ok(())
}
