//! Processor exception handling.
//!
//! Exceptions are classified by vector into a name, a kind, and whether
//! the faulting process can survive. An exception in the kernel's own
//! PID is always a panic; a fatal exception in a user process stops and
//! kills that process and lets the scheduler carry on. When the kernel
//! symbol table has been loaded, the panic path walks the stack and
//! names the likely functions.

extern crate alloc;

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::loader::symbols;
use crate::proc::{self, KERNEL_PID, Pid, ProcessState};
use crate::status::Status;
use crate::{kerror, kwarn};

/// Broad exception classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    /// Restartable at the faulting instruction.
    Fault,
    /// Reported after the trapping instruction.
    Trap,
    /// Unrecoverable processor state.
    Abort,
    /// Outside the architectural table.
    Unknown,
}

/// Description of one exception vector.
#[derive(Debug, Clone, Copy)]
pub struct ExceptionInfo {
    /// Human-readable name.
    pub name: &'static str,
    /// Classification.
    pub kind: ExceptionKind,
    /// Whether the faulting process must die.
    pub fatal: bool,
}

/// The architectural exception vectors.
static EXCEPTIONS: [ExceptionInfo; 19] = [
    ExceptionInfo { name: "divide by zero", kind: ExceptionKind::Fault, fatal: true },
    ExceptionInfo { name: "debug", kind: ExceptionKind::Trap, fatal: false },
    ExceptionInfo { name: "non-maskable interrupt", kind: ExceptionKind::Trap, fatal: true },
    ExceptionInfo { name: "breakpoint", kind: ExceptionKind::Trap, fatal: false },
    ExceptionInfo { name: "overflow", kind: ExceptionKind::Trap, fatal: true },
    ExceptionInfo { name: "bound range exceeded", kind: ExceptionKind::Fault, fatal: true },
    ExceptionInfo { name: "invalid opcode", kind: ExceptionKind::Fault, fatal: true },
    ExceptionInfo { name: "device not available", kind: ExceptionKind::Fault, fatal: true },
    ExceptionInfo { name: "double fault", kind: ExceptionKind::Abort, fatal: true },
    ExceptionInfo { name: "coprocessor segment overrun", kind: ExceptionKind::Abort, fatal: true },
    ExceptionInfo { name: "invalid TSS", kind: ExceptionKind::Fault, fatal: true },
    ExceptionInfo { name: "segment not present", kind: ExceptionKind::Fault, fatal: true },
    ExceptionInfo { name: "stack", kind: ExceptionKind::Fault, fatal: true },
    ExceptionInfo { name: "general protection", kind: ExceptionKind::Fault, fatal: true },
    ExceptionInfo { name: "page", kind: ExceptionKind::Fault, fatal: true },
    ExceptionInfo { name: "reserved", kind: ExceptionKind::Unknown, fatal: true },
    ExceptionInfo { name: "floating point error", kind: ExceptionKind::Fault, fatal: true },
    ExceptionInfo { name: "alignment check", kind: ExceptionKind::Fault, fatal: true },
    ExceptionInfo { name: "machine check", kind: ExceptionKind::Abort, fatal: true },
];

static UNKNOWN_EXCEPTION: ExceptionInfo = ExceptionInfo {
    name: "UNKNOWN",
    kind: ExceptionKind::Unknown,
    fatal: true,
};

/// Classify an exception vector.
#[must_use]
pub fn classify(vector: u32) -> &'static ExceptionInfo {
    EXCEPTIONS
        .get(vector as usize)
        .unwrap_or(&UNKNOWN_EXCEPTION)
}

/// The outcome the handler decided on; the architectural entry stub
/// acts on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionOutcome {
    /// Return to the faulting process.
    Resume,
    /// The process was stopped and killed; schedule something else.
    ProcessKilled,
    /// The kernel cannot continue.
    Panic,
}

/// Handle an exception raised while `pid` was running.
///
/// `stack_words` is a copy of the faulting stack for the trace attempt;
/// it may be empty.
pub fn handle(vector: u32, pid: Pid, stack_words: &[u32]) -> ExceptionOutcome {
    let info = classify(vector);
    let process_name = proc::process_name(pid).unwrap_or_default();

    let message = if info.fatal {
        format!(
            "{} exception (fatal) occurred in process \"{}\"",
            info.name, process_name
        )
    } else {
        format!(
            "{} exception occurred in process \"{}\"",
            info.name, process_name
        )
    };

    if pid == KERNEL_PID {
        panic_with_trace(&message, stack_words);
        return ExceptionOutcome::Panic;
    }

    if !info.fatal {
        kwarn!("{}", message);
        return ExceptionOutcome::Resume;
    }

    kerror!("{}", message);

    // Stop the process first; if even that fails the process might run
    // again, which the kernel cannot permit.
    if proc::set_process_state(pid, ProcessState::Stopped).is_err() {
        panic_with_trace("cannot stop faulting process", stack_words);
        return ExceptionOutcome::Panic;
    }
    let _ = proc::kill(pid, true);
    ExceptionOutcome::ProcessKilled
}

/// Render a stack trace from raw stack words.
///
/// Every word at or above the kernel virtual base is matched against the
/// kernel symbol table; without a loaded table the trace is empty.
#[must_use]
pub fn stack_trace(stack_words: &[u32]) -> Vec<String> {
    let mut frames = Vec::new();
    if !symbols::have_kernel_symbols() {
        return frames;
    }
    for &word in stack_words {
        if word < crate::api::userptr::KERNEL_VIRT_BASE {
            continue;
        }
        if let Some((name, offset)) = symbols::resolve_kernel_address(word) {
            frames.push(format!("  {word:#010x}  {name}+{offset:#x}"));
        }
    }
    frames
}

/// Log a panic, print a stack trace, and (on the kernel target) stop
/// the machine for good.
pub fn panic_with_trace(message: &str, stack_words: &[u32]) {
    kerror!("kernel panic: {}", message);
    for frame in stack_trace(stack_words) {
        kerror!("{}", frame);
    }

    #[cfg(target_os = "none")]
    {
        let _ = crate::arch::suspend_ints();
        loop {
            crate::arch::halt();
        }
    }
}

/// Map an exception outcome to a status for callers that report one.
#[must_use]
pub fn outcome_status(outcome: ExceptionOutcome) -> Status {
    match outcome {
        ExceptionOutcome::Resume => Status::Cancelled,
        ExceptionOutcome::ProcessKilled => Status::Cancelled,
        ExceptionOutcome::Panic => Status::Bug,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::testing::{enter_new_process, leave_process};

    #[test]
    fn classification_covers_the_architectural_table() {
        assert_eq!(classify(0).name, "divide by zero");
        assert_eq!(classify(8).kind, ExceptionKind::Abort);
        assert_eq!(classify(13).name, "general protection");
        assert_eq!(classify(14).kind, ExceptionKind::Fault);
        assert_eq!(classify(200).name, "UNKNOWN");
        assert_eq!(classify(200).kind, ExceptionKind::Unknown);
    }

    #[test]
    fn fatal_exception_kills_the_user_process() {
        let (pid, previous) = enter_new_process("gp-victim");
        leave_process(previous);

        let outcome = handle(13, pid, &[]);
        assert_eq!(outcome, ExceptionOutcome::ProcessKilled);
        assert!(!proc::process_exists(pid));
    }

    #[test]
    fn non_fatal_exception_resumes() {
        let (pid, previous) = enter_new_process("bp-survivor");
        leave_process(previous);

        let outcome = handle(3, pid, &[]);
        assert_eq!(outcome, ExceptionOutcome::Resume);
        assert!(proc::process_exists(pid));
        proc::kill(pid, false).unwrap();
    }

    #[test]
    fn trace_is_empty_without_symbols() {
        // Host tests never load the kernel symbol table globally unless
        // a dedicated test does; guard on that.
        if !symbols::have_kernel_symbols() {
            assert!(stack_trace(&[0xC010_0000]).is_empty());
        }
    }
}
