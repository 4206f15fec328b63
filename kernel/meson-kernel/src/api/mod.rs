//! The kernel API gateway.
//!
//! User space reaches the kernel through one far-call gate. The gate
//! hands [`process_call`] a pointer to the caller's argument array:
//! `args[0]` is the argument count plus one, `args[1]` the function
//! number, and the rest the arguments. Dispatch validates, in order,
//! the argument count bound, the function number, the exact arity, and
//! the caller's privilege, then calls the handler.
//!
//! Handlers are typed: an [`ApiHandler`] variant carries a function
//! pointer of fixed arity, and the entry's expected argument count is
//! derived from the variant. The table cannot disagree with its
//! consumers about arity, and duplicate or misnumbered registrations
//! are rejected when the table is built.

extern crate alloc;

pub mod functions;
pub mod gate;
pub mod numbers;
pub mod userptr;

use alloc::vec;
use alloc::vec::Vec;

use crate::proc;
use crate::status::Status;
use crate::sync::SpinLock;

/// The most arguments any API function may take.
pub const API_MAX_ARGS: usize = 9;

/// A typed API handler. The variant fixes the arity.
#[derive(Clone, Copy)]
#[allow(missing_docs)]
pub enum ApiHandler {
    N0(fn() -> i32),
    N1(fn(u32) -> i32),
    N2(fn(u32, u32) -> i32),
    N3(fn(u32, u32, u32) -> i32),
    N4(fn(u32, u32, u32, u32) -> i32),
    N5(fn(u32, u32, u32, u32, u32) -> i32),
    N6(fn(u32, u32, u32, u32, u32, u32) -> i32),
    N7(fn(u32, u32, u32, u32, u32, u32, u32) -> i32),
    N8(fn(u32, u32, u32, u32, u32, u32, u32, u32) -> i32),
    N9(fn(u32, u32, u32, u32, u32, u32, u32, u32, u32) -> i32),
}

impl ApiHandler {
    /// The arity this handler expects.
    #[must_use]
    pub fn arg_count(&self) -> usize {
        match self {
            Self::N0(_) => 0,
            Self::N1(_) => 1,
            Self::N2(_) => 2,
            Self::N3(_) => 3,
            Self::N4(_) => 4,
            Self::N5(_) => 5,
            Self::N6(_) => 6,
            Self::N7(_) => 7,
            Self::N8(_) => 8,
            Self::N9(_) => 9,
        }
    }

    /// Invoke the handler with exactly `arg_count` arguments.
    fn call(&self, a: &[u32]) -> i32 {
        match self {
            Self::N0(f) => f(),
            Self::N1(f) => f(a[0]),
            Self::N2(f) => f(a[0], a[1]),
            Self::N3(f) => f(a[0], a[1], a[2]),
            Self::N4(f) => f(a[0], a[1], a[2], a[3]),
            Self::N5(f) => f(a[0], a[1], a[2], a[3], a[4]),
            Self::N6(f) => f(a[0], a[1], a[2], a[3], a[4], a[5]),
            Self::N7(f) => f(a[0], a[1], a[2], a[3], a[4], a[5], a[6]),
            Self::N8(f) => f(a[0], a[1], a[2], a[3], a[4], a[5], a[6], a[7]),
            Self::N9(f) => f(a[0], a[1], a[2], a[3], a[4], a[5], a[6], a[7], a[8]),
        }
    }
}

/// One dispatch table entry.
#[derive(Clone, Copy)]
pub struct FunctionEntry {
    /// The function number this entry serves.
    pub number: u32,
    /// Least privileged level allowed to call (numerically larger is
    /// less privileged).
    pub privilege: u8,
    /// The typed handler.
    pub handler: ApiHandler,
}

/// The dispatch table: per-family slot arrays addressed by
/// `number / 1000`, with the miscellaneous family at index 0.
pub struct ApiTable {
    families: Vec<Vec<Option<FunctionEntry>>>,
}

impl ApiTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            families: vec![Vec::new(); numbers::NUM_FAMILIES],
        }
    }

    /// Register an entry.
    ///
    /// # Errors
    ///
    /// Returns [`Status::Invalid`] for a number outside every family
    /// range, or [`Status::Bug`] for a slot registered twice.
    pub fn register(&mut self, entry: FunctionEntry) -> Result<(), Status> {
        let family = numbers::family_index(entry.number).ok_or(Status::Invalid)?;
        let slot = (entry.number % numbers::FAMILY_SIZE) as usize;

        let slots = &mut self.families[family];
        if slots.len() <= slot {
            slots.resize(slot + 1, None);
        }
        if slots[slot].is_some() {
            return Err(Status::Bug);
        }
        slots[slot] = Some(entry);
        Ok(())
    }

    /// Look up the entry for a function number.
    #[must_use]
    pub fn lookup(&self, number: u32) -> Option<&FunctionEntry> {
        let family = numbers::family_index(number)?;
        let slot = (number % numbers::FAMILY_SIZE) as usize;
        let entry = self.families[family].get(slot)?.as_ref()?;
        // Guard against a misnumbered registration.
        if entry.number != number {
            return None;
        }
        Some(entry)
    }

    /// Dispatch one call.
    ///
    /// `args[0]` is the argument count plus one, `args[1]` the function
    /// number, `args[2..]` the arguments. The return value is the
    /// handler's result, or a negative status code from validation.
    #[must_use]
    pub fn process_call(&self, args: &[u32]) -> i32 {
        if args.len() < 2 {
            return Status::NullParameter.code();
        }

        let arg_count = (args[0] as usize).wrapping_sub(1);
        if arg_count > API_MAX_ARGS {
            return Status::ArgumentCount.code();
        }

        let number = args[1];
        let Some(entry) = self.lookup(number) else {
            crate::kdebug!("api: no such function {}", number);
            return Status::NoSuchFunction.code();
        };

        if arg_count != entry.handler.arg_count() || args.len() < 2 + arg_count {
            return Status::ArgumentCount.code();
        }

        // Numerically-lower privilege is more privileged; a caller may
        // only invoke entries at its own level or below it.
        let caller = proc::current_privilege();
        if caller > entry.privilege {
            return Status::Permission.code();
        }

        entry.handler.call(&args[2..2 + arg_count])
    }
}

impl Default for ApiTable {
    fn default() -> Self {
        Self::new()
    }
}

static API_TABLE: SpinLock<Option<ApiTable>> = SpinLock::new(None);

/// Build and install the kernel's dispatch table.
///
/// # Errors
///
/// Returns [`Status::Bug`] for a duplicate registration, which means
/// the number constants collide.
pub fn init() -> Result<(), Status> {
    let mut table = ApiTable::new();
    functions::register_all(&mut table)?;
    *API_TABLE.lock() = Some(table);
    Ok(())
}

/// Dispatch a call against the installed table.
///
/// Called from the far-call gate with the caller's argument array
/// already copied out of its stack.
#[must_use]
pub fn process_call(args: &[u32]) -> i32 {
    let table = API_TABLE.lock();
    match table.as_ref() {
        Some(table) => table.process_call(args),
        None => Status::NotInitialized.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::testing::{enter_new_process, leave_process};

    fn ret_zero() -> i32 {
        0
    }
    fn ret_sum(a: u32, b: u32) -> i32 {
        (a + b) as i32
    }

    fn test_table() -> ApiTable {
        let mut table = ApiTable::new();
        table
            .register(FunctionEntry {
                number: numbers::MISC_SHUTDOWN,
                privilege: proc::PRIVILEGE_USER,
                handler: ApiHandler::N2(|_, _| 0),
            })
            .unwrap();
        table
            .register(FunctionEntry {
                number: numbers::MULTITASKER_YIELD,
                privilege: proc::PRIVILEGE_USER,
                handler: ApiHandler::N0(ret_zero),
            })
            .unwrap();
        table
            .register(FunctionEntry {
                number: numbers::RTC_UPTIME_SECONDS,
                privilege: proc::PRIVILEGE_SUPERVISOR,
                handler: ApiHandler::N0(ret_zero),
            })
            .unwrap();
        table
            .register(FunctionEntry {
                number: numbers::FILE_FIXUP_PATH,
                privilege: proc::PRIVILEGE_USER,
                handler: ApiHandler::N2(ret_sum),
            })
            .unwrap();
        table
    }

    #[test]
    fn lookups_are_distinct_and_missing_numbers_fail() {
        let table = test_table();
        let a = table.lookup(numbers::MISC_SHUTDOWN).unwrap();
        let b = table.lookup(numbers::MULTITASKER_YIELD).unwrap();
        assert_ne!(a.number, b.number);
        assert!(table.lookup(5555).is_none());
        assert_eq!(
            table.process_call(&[1, 5555]),
            Status::NoSuchFunction.code()
        );
    }

    #[test]
    fn shutdown_call_shape_dispatches() {
        let table = test_table();
        // argc+1 = 3, function 99001, args (halt, nice).
        assert_eq!(table.process_call(&[3, numbers::MISC_SHUTDOWN, 0, 1]), 0);
    }

    #[test]
    fn arg_count_mismatch_is_rejected() {
        let table = test_table();
        assert_eq!(
            table.process_call(&[2, numbers::MISC_SHUTDOWN, 0]),
            Status::ArgumentCount.code()
        );
        assert_eq!(
            table.process_call(&[12, numbers::MISC_SHUTDOWN, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
            Status::ArgumentCount.code()
        );
    }

    #[test]
    fn privilege_gate_blocks_user_callers() {
        let (pid, previous) = enter_new_process("api-user");

        let table = test_table();
        // A user process may not call a supervisor-only entry.
        assert_eq!(
            table.process_call(&[1, numbers::RTC_UPTIME_SECONDS]),
            Status::Permission.code()
        );
        // But user-level entries work.
        assert_eq!(table.process_call(&[1, numbers::MULTITASKER_YIELD]), 0);

        leave_process(previous);
        proc::kill(pid, false).unwrap();
    }

    #[test]
    fn supervisor_may_call_everything() {
        // The kernel process is the default current process in tests.
        let table = test_table();
        assert_eq!(table.process_call(&[1, numbers::RTC_UPTIME_SECONDS]), 0);
    }

    #[test]
    fn arguments_reach_the_handler() {
        let table = test_table();
        assert_eq!(
            table.process_call(&[3, numbers::FILE_FIXUP_PATH, 30, 12]),
            42
        );
    }

    #[test]
    fn duplicate_registration_is_a_bug() {
        let mut table = test_table();
        assert_eq!(
            table.register(FunctionEntry {
                number: numbers::MISC_SHUTDOWN,
                privilege: proc::PRIVILEGE_USER,
                handler: ApiHandler::N2(|_, _| 0),
            }),
            Err(Status::Bug)
        );
    }

    #[test]
    fn full_kernel_table_builds_without_collisions() {
        let mut table = ApiTable::new();
        functions::register_all(&mut table).unwrap();
        assert!(table.lookup(numbers::FILE_OPEN).is_some());
        assert!(table.lookup(numbers::TEXT_PRINT).is_some());
        assert!(table.lookup(numbers::ENVIRONMENT_SET).is_some());
        assert!(table.lookup(numbers::MISC_VERSION).is_some());
    }
}
