//! Per-process environment variables.
//!
//! Each process owns one [`VariableList`] created on first use. A child
//! spawned through the loader inherits a copy of its parent's
//! environment at spawn time; later changes do not propagate.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::proc::{self, Pid};
use crate::status::Status;
use crate::sync::SpinLock;
use crate::varlist::VariableList;

static ENVIRONMENTS: SpinLock<BTreeMap<Pid, VariableList>> = SpinLock::new(BTreeMap::new());

fn with_env<R>(pid: Pid, f: impl FnOnce(&mut VariableList) -> R) -> R {
    let mut environments = ENVIRONMENTS.lock();
    let env = environments
        .entry(pid)
        .or_insert_with(VariableList::with_defaults);
    f(env)
}

/// Read a variable from the current process's environment.
#[must_use]
pub fn get(key: &str) -> Option<String> {
    with_env(proc::current_pid(), |env| env.get(key))
}

/// Set a variable in the current process's environment.
///
/// # Errors
///
/// Propagates [`VariableList::set`] errors.
pub fn set(key: &str, value: &str) -> Result<(), Status> {
    with_env(proc::current_pid(), |env| env.set(key, value))
}

/// Remove a variable from the current process's environment.
///
/// # Errors
///
/// Returns [`Status::NoSuchEntry`] when the key is not set.
pub fn unset(key: &str) -> Result<(), Status> {
    with_env(proc::current_pid(), |env| env.unset(key))
}

/// Every `(key, value)` pair of the current process's environment, in
/// insertion order.
#[must_use]
pub fn dump() -> Vec<(String, String)> {
    with_env(proc::current_pid(), |env| env.iter().collect())
}

/// Copy the parent's environment into a fresh child environment.
pub fn inherit(parent: Pid, child: Pid) {
    let pairs: Vec<(String, String)> = with_env(parent, |env| env.iter().collect());
    let mut environments = ENVIRONMENTS.lock();
    let child_env = environments
        .entry(child)
        .or_insert_with(VariableList::with_defaults);
    for (key, value) in pairs {
        let _ = child_env.set(&key, &value);
    }
}

/// Drop a dead process's environment.
pub fn release(pid: Pid) {
    ENVIRONMENTS.lock().remove(&pid);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::testing::{enter_new_process, leave_process};
    use alloc::string::ToString;

    #[test]
    fn set_get_unset_in_own_environment() {
        let (pid, previous) = enter_new_process("env-basic");

        set("PATH", "/programs").unwrap();
        assert_eq!(get("PATH"), Some("/programs".to_string()));
        unset("PATH").unwrap();
        assert_eq!(get("PATH"), None);
        assert_eq!(unset("PATH"), Err(Status::NoSuchEntry));

        leave_process(previous);
        release(pid);
        proc::kill(pid, false).unwrap();
    }

    #[test]
    fn environments_are_per_process() {
        let (first, previous) = enter_new_process("env-a");
        set("WHO", "first").unwrap();
        leave_process(previous);

        let (second, previous) = enter_new_process("env-b");
        assert_eq!(get("WHO"), None);
        set("WHO", "second").unwrap();
        leave_process(previous);

        release(first);
        release(second);
        proc::kill(first, false).unwrap();
        proc::kill(second, false).unwrap();
    }

    #[test]
    fn child_inherits_a_copy() {
        let (parent, previous) = enter_new_process("env-parent");
        set("LANG", "en_GB").unwrap();
        leave_process(previous);

        let (child, previous) = enter_new_process("env-child");
        inherit(parent, child);
        assert_eq!(get("LANG"), Some("en_GB".to_string()));
        // Changing the child does not touch the parent.
        set("LANG", "de_DE").unwrap();
        leave_process(previous);

        let check = with_env(parent, |env| env.get("LANG"));
        assert_eq!(check, Some("en_GB".to_string()));

        release(parent);
        release(child);
        proc::kill(parent, false).unwrap();
        proc::kill(child, false).unwrap();
    }
}
