//! API function numbers.
//!
//! Function numbers are organised in thousand-wide family ranges; the
//! miscellaneous family owns numbers from 99000 up and is stored at
//! family index 0. These constants are the single source of truth: the
//! dispatch table is built from them and user-space bindings are
//! generated from them, so the two cannot drift apart.

/// Family range width.
pub const FAMILY_SIZE: u32 = 1000;

/// Number of family slots in the dispatch table (misc plus 1000-12999).
pub const NUM_FAMILIES: usize = 13;

/// First number of the miscellaneous family.
pub const MISC_BASE: u32 = 99000;

// ── Text console (1000-1999) ─────────────────────────────────────────

/// Print a string at the cursor.
pub const TEXT_PRINT: u32 = 1000;
/// Print a string followed by a newline.
pub const TEXT_PRINT_LINE: u32 = 1001;
/// Emit a newline.
pub const TEXT_NEWLINE: u32 = 1002;
/// Erase the character before the cursor.
pub const TEXT_BACKSPACE: u32 = 1003;
/// Emit a tab.
pub const TEXT_TAB: u32 = 1004;
/// Clear the screen.
pub const TEXT_CLEAR_SCREEN: u32 = 1005;
/// Number of console columns.
pub const TEXT_GET_NUM_COLUMNS: u32 = 1006;
/// Number of console rows.
pub const TEXT_GET_NUM_ROWS: u32 = 1007;
/// Current cursor column.
pub const TEXT_GET_COLUMN: u32 = 1008;
/// Move the cursor to a column.
pub const TEXT_SET_COLUMN: u32 = 1009;
/// Current cursor row.
pub const TEXT_GET_ROW: u32 = 1010;
/// Move the cursor to a row.
pub const TEXT_SET_ROW: u32 = 1011;
/// Current foreground colour code.
pub const TEXT_GET_FOREGROUND: u32 = 1012;
/// Set the foreground colour.
pub const TEXT_SET_FOREGROUND: u32 = 1013;
/// Current background colour code.
pub const TEXT_GET_BACKGROUND: u32 = 1014;
/// Set the background colour.
pub const TEXT_SET_BACKGROUND: u32 = 1015;
/// Number of buffered input characters.
pub const TEXT_INPUT_COUNT: u32 = 1016;
/// Take one input character.
pub const TEXT_INPUT_GETC: u32 = 1017;
/// Turn input echo on or off.
pub const TEXT_INPUT_SET_ECHO: u32 = 1018;

// ── File operations (4000-4999) ──────────────────────────────────────

/// Canonicalise a path.
pub const FILE_FIXUP_PATH: u32 = 4000;
/// First entry of a directory.
pub const FILE_FIRST: u32 = 4001;
/// Next entry of a directory.
pub const FILE_NEXT: u32 = 4002;
/// Look up a file.
pub const FILE_FIND: u32 = 4003;
/// Open a file.
pub const FILE_OPEN: u32 = 4004;
/// Close a file.
pub const FILE_CLOSE: u32 = 4005;
/// Read blocks from a file.
pub const FILE_READ: u32 = 4006;
/// Write blocks to a file.
pub const FILE_WRITE: u32 = 4007;
/// Delete a file.
pub const FILE_DELETE: u32 = 4008;
/// Overwrite, then delete a file.
pub const FILE_DELETE_SECURE: u32 = 4009;
/// Create a directory.
pub const FILE_MAKE_DIR: u32 = 4010;
/// Remove an empty directory.
pub const FILE_REMOVE_DIR: u32 = 4011;
/// Copy a file.
pub const FILE_COPY: u32 = 4012;
/// Copy a directory tree.
pub const FILE_COPY_RECURSIVE: u32 = 4013;
/// Move a file or directory.
pub const FILE_MOVE: u32 = 4014;
/// Stamp a file with the current time.
pub const FILE_TIMESTAMP: u32 = 4015;
/// Open a byte stream on a file.
pub const FILE_STREAM_OPEN: u32 = 4016;
/// Reposition a stream.
pub const FILE_STREAM_SEEK: u32 = 4017;
/// Read bytes from a stream.
pub const FILE_STREAM_READ: u32 = 4018;
/// Write bytes to a stream.
pub const FILE_STREAM_WRITE: u32 = 4019;
/// Flush a stream.
pub const FILE_STREAM_FLUSH: u32 = 4020;
/// Close a stream.
pub const FILE_STREAM_CLOSE: u32 = 4021;

// ── Multitasker (6000-6999) ──────────────────────────────────────────

/// PID of the calling process.
pub const MULTITASKER_GET_CURRENT_PID: u32 = 6000;
/// Scheduling state of a process.
pub const MULTITASKER_GET_PROCESS_STATE: u32 = 6001;
/// Set the scheduling state of a process.
pub const MULTITASKER_SET_PROCESS_STATE: u32 = 6002;
/// Privilege level of a process.
pub const MULTITASKER_GET_PROCESS_PRIVILEGE: u32 = 6003;
/// Yield the rest of the timeslice.
pub const MULTITASKER_YIELD: u32 = 6004;
/// Wait a number of ticks.
pub const MULTITASKER_WAIT: u32 = 6005;
/// Block on another process.
pub const MULTITASKER_BLOCK: u32 = 6006;
/// Kill a process.
pub const MULTITASKER_KILL_PROCESS: u32 = 6007;
/// The calling process's working directory.
pub const MULTITASKER_GET_CURRENT_DIRECTORY: u32 = 6008;
/// Change the calling process's working directory.
pub const MULTITASKER_SET_CURRENT_DIRECTORY: u32 = 6009;

// ── Loader (7000-7999) ───────────────────────────────────────────────

/// Read a file into memory.
pub const LOADER_LOAD: u32 = 7000;
/// Load a program and create its process.
pub const LOADER_LOAD_PROGRAM: u32 = 7001;
/// Start a loaded program.
pub const LOADER_EXEC_PROGRAM: u32 = 7002;
/// Load and immediately start a program.
pub const LOADER_LOAD_AND_EXEC: u32 = 7003;
/// Classify a file.
pub const LOADER_CLASSIFY_FILE: u32 = 7004;

// ── Real-time clock (8000-8999) ──────────────────────────────────────

/// Seconds since boot.
pub const RTC_UPTIME_SECONDS: u32 = 8000;
/// Packed date and time.
pub const RTC_DATE_TIME: u32 = 8001;

// ── Environment (10000-10999) ────────────────────────────────────────

/// Read an environment variable.
pub const ENVIRONMENT_GET: u32 = 10000;
/// Set an environment variable.
pub const ENVIRONMENT_SET: u32 = 10001;
/// Remove an environment variable.
pub const ENVIRONMENT_UNSET: u32 = 10002;
/// Print the whole environment to the console.
pub const ENVIRONMENT_DUMP: u32 = 10003;

// ── Miscellaneous (99000+) ───────────────────────────────────────────

/// Halt, reboot, or power off.
pub const MISC_SHUTDOWN: u32 = 99001;
/// Kernel name and version.
pub const MISC_VERSION: u32 = 99002;
/// Load a font file.
pub const MISC_FONT_LOAD: u32 = 99003;
/// Make a loaded font the default.
pub const MISC_FONT_SET_DEFAULT: u32 = 99004;

/// The dispatch-table family index for a function number.
///
/// Returns `None` for numbers outside every family range.
#[must_use]
pub fn family_index(number: u32) -> Option<usize> {
    if number >= MISC_BASE {
        return Some(0);
    }
    let family = (number / FAMILY_SIZE) as usize;
    if (1..NUM_FAMILIES).contains(&family) {
        Some(family)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn misc_family_lives_at_index_zero() {
        assert_eq!(family_index(MISC_SHUTDOWN), Some(0));
        assert_eq!(family_index(99999), Some(0));
    }

    #[test]
    fn families_map_by_thousands() {
        assert_eq!(family_index(TEXT_PRINT), Some(1));
        assert_eq!(family_index(FILE_OPEN), Some(4));
        assert_eq!(family_index(MULTITASKER_YIELD), Some(6));
        assert_eq!(family_index(ENVIRONMENT_GET), Some(10));
    }

    #[test]
    fn out_of_range_numbers_have_no_family() {
        assert_eq!(family_index(0), None);
        assert_eq!(family_index(13000), None);
        assert_eq!(family_index(98999), None);
    }
}
