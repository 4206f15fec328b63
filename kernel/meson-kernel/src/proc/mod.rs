//! Multitasker facade.
//!
//! The scheduler proper runs one CPU and is driven from the timer
//! interrupt; what the rest of the kernel depends on is this process
//! table: PID allocation, scheduling states, privilege and priority,
//! the per-process working directory, and the per-process I/O-port
//! permission bitmap.
//!
//! PID 0 is reserved to mean "no process" (a free lock); PID 1 is the
//! kernel itself and can never be killed through this interface.

extern crate alloc;

use alloc::borrow::ToOwned;
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
#[cfg(not(test))]
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::status::Status;
use crate::sync::SpinLock;

/// Process identifier.
pub type Pid = u32;

/// The "no process" PID; a lock owned by `NO_PROCESS` is free.
pub const NO_PROCESS: Pid = 0;

/// The kernel's own PID.
pub const KERNEL_PID: Pid = 1;

/// Supervisor privilege level (most privileged).
pub const PRIVILEGE_SUPERVISOR: u8 = 0;

/// User privilege level.
pub const PRIVILEGE_USER: u8 = 3;

/// Default scheduling priority for new processes.
pub const DEFAULT_PRIORITY: u8 = 3;

/// Size of the I/O-port permission bitmap in bytes (one bit per port).
const IO_PERM_BYTES: usize = 8192;

/// Scheduling states recognised by the multitasker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Currently executing.
    Running,
    /// Runnable, waiting for a timeslice.
    Ready,
    /// Waiting on an event or another process.
    Waiting,
    /// Sleeping until a deadline.
    Sleeping,
    /// Stopped by the exception handler or a debugger.
    Stopped,
    /// Exited; awaiting reaping.
    Finished,
    /// Orphaned after its parent exited.
    Zombie,
}

impl ProcessState {
    /// States in which a process cannot legitimately hold a resource lock.
    #[must_use]
    pub fn is_defunct(self) -> bool {
        matches!(
            self,
            Self::Sleeping | Self::Stopped | Self::Finished | Self::Zombie
        )
    }
}

/// A process table entry.
struct Process {
    name: String,
    state: ProcessState,
    privilege: u8,
    priority: u8,
    cwd: String,
    /// Allocated on first `set_io_perm`; most processes never touch ports.
    io_perm: Option<Box<[u8]>>,
}

/// The process table.
struct ProcessTable {
    processes: BTreeMap<Pid, Process>,
    next_pid: Pid,
}

impl ProcessTable {
    const fn new() -> Self {
        Self {
            processes: BTreeMap::new(),
            next_pid: KERNEL_PID + 1,
        }
    }

    fn ensure_kernel(&mut self) {
        self.processes.entry(KERNEL_PID).or_insert(Process {
            name: String::new(),
            state: ProcessState::Running,
            privilege: PRIVILEGE_SUPERVISOR,
            priority: 0,
            cwd: String::new(),
            io_perm: None,
        });
    }
}

static TABLE: SpinLock<ProcessTable> = SpinLock::new(ProcessTable::new());

// On the kernel target there is exactly one CPU and one current process.
// Host tests run on many threads at once, so there the marker is kept
// per-thread to keep tests independent of each other.
#[cfg(not(test))]
static CURRENT: AtomicU32 = AtomicU32::new(KERNEL_PID);
#[cfg(not(test))]
static IN_INTERRUPT: AtomicBool = AtomicBool::new(false);

#[cfg(test)]
std::thread_local! {
    static CURRENT: core::cell::Cell<Pid> = const { core::cell::Cell::new(KERNEL_PID) };
    static IN_INTERRUPT: core::cell::Cell<bool> = const { core::cell::Cell::new(false) };
}

fn with_table<R>(f: impl FnOnce(&mut ProcessTable) -> R) -> R {
    let mut table = TABLE.lock();
    table.ensure_kernel();
    f(&mut table)
}

/// Returns the PID of the currently running process.
#[must_use]
pub fn current_pid() -> Pid {
    #[cfg(not(test))]
    {
        CURRENT.load(Ordering::Acquire)
    }
    #[cfg(test)]
    {
        CURRENT.with(core::cell::Cell::get)
    }
}

/// Switch the current-process marker. Used by the scheduler and by tests.
pub fn set_current_pid(pid: Pid) {
    #[cfg(not(test))]
    CURRENT.store(pid, Ordering::Release);
    #[cfg(test)]
    CURRENT.with(|c| c.set(pid));
}

/// Returns `true` while an interrupt handler is executing.
#[must_use]
pub fn in_interrupt() -> bool {
    #[cfg(not(test))]
    {
        IN_INTERRUPT.load(Ordering::Acquire)
    }
    #[cfg(test)]
    {
        IN_INTERRUPT.with(core::cell::Cell::get)
    }
}

/// Mark entry/exit of interrupt context.
pub fn set_in_interrupt(active: bool) {
    #[cfg(not(test))]
    IN_INTERRUPT.store(active, Ordering::Release);
    #[cfg(test)]
    IN_INTERRUPT.with(|c| c.set(active));
}

/// Create a new process in the `Ready` state and return its PID.
///
/// The new process inherits the caller's working directory.
///
/// # Errors
///
/// Returns [`Status::Invalid`] if `name` is empty.
pub fn spawn(name: &str, privilege: u8, priority: u8) -> Result<Pid, Status> {
    if name.is_empty() {
        return Err(Status::Invalid);
    }
    with_table(|table| {
        let cwd = table
            .processes
            .get(&current_pid())
            .map(|p| p.cwd.clone())
            .unwrap_or_default();
        let pid = table.next_pid;
        table.next_pid += 1;
        table.processes.insert(
            pid,
            Process {
                name: name.to_owned(),
                state: ProcessState::Ready,
                privilege,
                priority,
                cwd,
                io_perm: None,
            },
        );
        Ok(pid)
    })
}

/// Returns `true` if a process with this PID exists.
#[must_use]
pub fn process_exists(pid: Pid) -> bool {
    with_table(|table| table.processes.contains_key(&pid))
}

/// Returns the scheduling state of a process.
///
/// # Errors
///
/// Returns [`Status::NoSuchEntry`] for an unknown PID.
pub fn process_state(pid: Pid) -> Result<ProcessState, Status> {
    with_table(|table| {
        table
            .processes
            .get(&pid)
            .map(|p| p.state)
            .ok_or(Status::NoSuchEntry)
    })
}

/// Set the scheduling state of a process.
///
/// # Errors
///
/// Returns [`Status::NoSuchEntry`] for an unknown PID.
pub fn set_process_state(pid: Pid, state: ProcessState) -> Result<(), Status> {
    with_table(|table| {
        table
            .processes
            .get_mut(&pid)
            .map(|p| p.state = state)
            .ok_or(Status::NoSuchEntry)
    })
}

/// Returns the privilege level of a process.
///
/// # Errors
///
/// Returns [`Status::NoSuchEntry`] for an unknown PID.
pub fn process_privilege(pid: Pid) -> Result<u8, Status> {
    with_table(|table| {
        table
            .processes
            .get(&pid)
            .map(|p| p.privilege)
            .ok_or(Status::NoSuchEntry)
    })
}

/// Returns the privilege level of the current process.
#[must_use]
pub fn current_privilege() -> u8 {
    process_privilege(current_pid()).unwrap_or(PRIVILEGE_SUPERVISOR)
}

/// Returns the scheduling priority of a process.
///
/// # Errors
///
/// Returns [`Status::NoSuchEntry`] for an unknown PID.
pub fn process_priority(pid: Pid) -> Result<u8, Status> {
    with_table(|table| {
        table
            .processes
            .get(&pid)
            .map(|p| p.priority)
            .ok_or(Status::NoSuchEntry)
    })
}

/// Set the scheduling priority of a process.
///
/// # Errors
///
/// Returns [`Status::NoSuchEntry`] for an unknown PID.
pub fn set_process_priority(pid: Pid, priority: u8) -> Result<(), Status> {
    with_table(|table| {
        table
            .processes
            .get_mut(&pid)
            .map(|p| p.priority = priority)
            .ok_or(Status::NoSuchEntry)
    })
}

/// Returns the name of a process.
///
/// # Errors
///
/// Returns [`Status::NoSuchEntry`] for an unknown PID.
pub fn process_name(pid: Pid) -> Result<String, Status> {
    with_table(|table| {
        table
            .processes
            .get(&pid)
            .map(|p| p.name.clone())
            .ok_or(Status::NoSuchEntry)
    })
}

/// Returns every live PID, in ascending order.
#[must_use]
pub fn all_pids() -> Vec<Pid> {
    with_table(|table| table.processes.keys().copied().collect())
}

/// Yield the rest of the current timeslice.
///
/// On the kernel target this re-enters the scheduler; on the host it is a
/// CPU hint so lock retry loops stay honest in tests.
pub fn yield_timeslice() {
    crate::arch::halt();
}

/// Busy-wait for roughly `ticks` scheduler ticks, yielding throughout.
pub fn wait_ticks(ticks: u32) {
    let deadline = crate::clock::uptime_ticks() + u64::from(ticks);
    while crate::clock::uptime_ticks() < deadline {
        yield_timeslice();
        // Off-target the clock does not advance on its own.
        if cfg!(not(target_os = "none")) {
            crate::clock::tick();
        }
    }
}

/// Block the current process until `pid` no longer exists or has finished.
pub fn block_on(pid: Pid) {
    loop {
        match process_state(pid) {
            Ok(state) if !matches!(state, ProcessState::Finished | ProcessState::Zombie) => {
                yield_timeslice();
            }
            _ => return,
        }
    }
}

/// Kill a process, removing it from the table.
///
/// The kernel process cannot be killed. Without `force`, a process in the
/// middle of being traced (`Stopped`) is killed anyway; the flag only
/// controls whether a failure to stop it first is tolerated elsewhere
/// (shutdown uses `force`).
///
/// # Errors
///
/// Returns [`Status::Permission`] for the kernel PID and
/// [`Status::NoSuchEntry`] for an unknown PID.
pub fn kill(pid: Pid, _force: bool) -> Result<(), Status> {
    if pid == KERNEL_PID {
        return Err(Status::Permission);
    }
    with_table(|table| {
        table
            .processes
            .remove(&pid)
            .map(|_| ())
            .ok_or(Status::NoSuchEntry)
    })
}

/// Returns the current process's working directory.
#[must_use]
pub fn current_directory() -> String {
    with_table(|table| {
        table
            .processes
            .get(&current_pid())
            .map(|p| {
                if p.cwd.is_empty() {
                    String::from("/")
                } else {
                    p.cwd.clone()
                }
            })
            .unwrap_or_else(|| String::from("/"))
    })
}

/// Set the current process's working directory.
///
/// The path must already be canonical (the filesystem facade fixes paths
/// up before calling this).
///
/// # Errors
///
/// Returns [`Status::NullParameter`] for an empty path.
pub fn set_current_directory(path: &str) -> Result<(), Status> {
    if path.is_empty() {
        return Err(Status::NullParameter);
    }
    with_table(|table| {
        let pid = current_pid();
        table
            .processes
            .get_mut(&pid)
            .map(|p| p.cwd = path.to_owned())
            .ok_or(Status::NoSuchEntry)
    })
}

/// Grant or revoke a process's permission to touch an I/O port.
///
/// # Errors
///
/// Returns [`Status::NoSuchEntry`] for an unknown PID.
pub fn set_io_perm(pid: Pid, port: u16, allow: bool) -> Result<(), Status> {
    with_table(|table| {
        let process = table.processes.get_mut(&pid).ok_or(Status::NoSuchEntry)?;
        let bitmap = process
            .io_perm
            .get_or_insert_with(|| vec![0u8; IO_PERM_BYTES].into_boxed_slice());
        let byte = usize::from(port) / 8;
        let bit = 1u8 << (port % 8);
        if allow {
            bitmap[byte] |= bit;
        } else {
            bitmap[byte] &= !bit;
        }
        Ok(())
    })
}

/// Returns whether a process may touch an I/O port.
///
/// Supervisor processes may touch every port; user processes only those
/// granted through [`set_io_perm`].
#[must_use]
pub fn io_perm(pid: Pid, port: u16) -> bool {
    with_table(|table| {
        let Some(process) = table.processes.get(&pid) else {
            return false;
        };
        if process.privilege == PRIVILEGE_SUPERVISOR {
            return true;
        }
        match &process.io_perm {
            Some(bitmap) => bitmap[usize::from(port) / 8] & (1 << (port % 8)) != 0,
            None => false,
        }
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers for tests that need a private process to play with.

    use super::*;

    /// Spawn a user process and switch the current-process marker to it.
    /// Returns the previous current PID.
    pub fn enter_new_process(name: &str) -> (Pid, Pid) {
        let pid = spawn(name, PRIVILEGE_USER, DEFAULT_PRIORITY).unwrap();
        set_process_state(pid, ProcessState::Running).unwrap();
        let previous = current_pid();
        set_current_pid(pid);
        (pid, previous)
    }

    /// Restore the current-process marker.
    pub fn leave_process(previous: Pid) {
        set_current_pid(previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_assigns_fresh_pids() {
        let a = spawn("worker-a", PRIVILEGE_USER, DEFAULT_PRIORITY).unwrap();
        let b = spawn("worker-b", PRIVILEGE_USER, DEFAULT_PRIORITY).unwrap();
        assert_ne!(a, b);
        assert_eq!(process_state(a).unwrap(), ProcessState::Ready);
        kill(a, false).unwrap();
        kill(b, false).unwrap();
    }

    #[test]
    fn kernel_pid_cannot_be_killed() {
        assert_eq!(kill(KERNEL_PID, true), Err(Status::Permission));
        assert!(process_exists(KERNEL_PID));
    }

    #[test]
    fn killed_process_stops_existing() {
        let pid = spawn("doomed", PRIVILEGE_USER, DEFAULT_PRIORITY).unwrap();
        assert!(process_exists(pid));
        kill(pid, false).unwrap();
        assert!(!process_exists(pid));
        assert_eq!(process_state(pid), Err(Status::NoSuchEntry));
    }

    #[test]
    fn io_perm_defaults_deny_for_user() {
        let pid = spawn("ports", PRIVILEGE_USER, DEFAULT_PRIORITY).unwrap();
        assert!(!io_perm(pid, 0x3F8));
        set_io_perm(pid, 0x3F8, true).unwrap();
        assert!(io_perm(pid, 0x3F8));
        assert!(!io_perm(pid, 0x3F9));
        set_io_perm(pid, 0x3F8, false).unwrap();
        assert!(!io_perm(pid, 0x3F8));
        kill(pid, false).unwrap();
    }

    #[test]
    fn supervisor_has_all_ports() {
        assert!(io_perm(KERNEL_PID, 0x60));
    }
}
