//! Process-owned resource lock.
//!
//! A [`ResourceLock`] is embedded in whatever structure it protects and
//! records the PID of its holder. Unlike a [`SpinLock`](super::SpinLock)
//! it cooperates with the multitasker:
//!
//! - A contended [`acquire`](ResourceLock::acquire) yields its timeslice
//!   between retries instead of spinning.
//! - Before every retry the current holder is checked with
//!   [`verify`](ResourceLock::verify); a holder that no longer exists, or
//!   that has gone sleeping, stopped, finished, or zombie, forfeits the
//!   lock. The multitasker can kill a process at any moment, so a lock
//!   that could not self-heal would wedge the kernel.
//! - An interrupt-context caller is never allowed to wait: a contended
//!   acquire fails with [`Status::Busy`] immediately.
//!
//! Interrupts are suspended around the owner-field test-and-set so the
//! grant cannot be torn by a preemption. Acquisition order under
//! contention is best-effort first-come, which is acceptable because
//! kernel critical sections are short.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::proc::{self, NO_PROCESS, Pid};
use crate::status::Status;
use crate::arch;

/// A process-owned lock with owner liveness verification.
///
/// Const-constructable so it can be embedded anywhere, including statics.
pub struct ResourceLock {
    owner: AtomicU32,
}

impl Default for ResourceLock {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceLock {
    /// Creates a free lock.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            owner: AtomicU32::new(NO_PROCESS),
        }
    }

    /// Returns the PID of the current holder, or `NO_PROCESS` if free.
    #[must_use]
    pub fn owner(&self) -> Pid {
        self.owner.load(Ordering::Acquire)
    }

    /// Acquire the lock for the current process.
    ///
    /// Succeeds immediately if the lock is free or already held by the
    /// caller (re-entrant on the same PID). Otherwise yields and retries
    /// until the holder releases or forfeits the lock.
    ///
    /// # Errors
    ///
    /// Returns [`Status::Busy`] when called from interrupt context while
    /// the lock is held by someone else.
    pub fn acquire(&self) -> Result<(), Status> {
        let current = proc::current_pid();

        if self.owner() == current {
            return Ok(());
        }

        #[cfg(feature = "priority-inversion")]
        let mut boosted: Option<(Pid, u8)> = None;

        loop {
            let ints = arch::suspend_ints();

            if self
                .owner
                .compare_exchange(NO_PROCESS, current, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                #[cfg(feature = "priority-inversion")]
                if let Some((holder, old_priority)) = boosted.take() {
                    let _ = proc::set_process_priority(holder, old_priority);
                }

                arch::restore_ints(ints);
                return Ok(());
            }

            if !self.verify() {
                // The holder is gone or defunct; clear the grant so the
                // next iteration can take it.
                self.owner.store(NO_PROCESS, Ordering::Release);
            } else {
                #[cfg(feature = "priority-inversion")]
                if boosted.is_none() {
                    boosted = self.boost_holder(current);
                }
            }

            arch::restore_ints(ints);

            if proc::in_interrupt() {
                // Interrupt handlers may not wait on anything.
                return Err(Status::Busy);
            }

            proc::yield_timeslice();
        }
    }

    /// Attempt to acquire the lock without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`Status::Busy`] if the lock is held by a viable process.
    pub fn try_acquire(&self) -> Result<(), Status> {
        let current = proc::current_pid();

        if self.owner() == current {
            return Ok(());
        }

        let ints = arch::suspend_ints();
        if !self.verify() {
            self.owner.store(NO_PROCESS, Ordering::Release);
        }
        let result = self
            .owner
            .compare_exchange(NO_PROCESS, current, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| Status::Busy);
        arch::restore_ints(ints);
        result
    }

    /// Release the lock.
    ///
    /// # Errors
    ///
    /// Returns [`Status::NoLock`] if the current process is not the holder.
    pub fn release(&self) -> Result<(), Status> {
        let current = proc::current_pid();
        let ints = arch::suspend_ints();
        let result = self
            .owner
            .compare_exchange(current, NO_PROCESS, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| Status::NoLock);
        arch::restore_ints(ints);
        result
    }

    /// Check whether the current holder may legitimately keep the lock.
    ///
    /// Returns `false` for a free lock, a holder that no longer exists, or
    /// a holder in a state from which it cannot run again soon (sleeping,
    /// stopped, finished, zombie).
    #[must_use]
    pub fn verify(&self) -> bool {
        let owner = self.owner();
        if owner == NO_PROCESS {
            return false;
        }
        match proc::process_state(owner) {
            Ok(state) => !state.is_defunct(),
            Err(_) => false,
        }
    }

    /// Temporarily raise the holder's priority to the requester's.
    ///
    /// Returns the holder and its previous priority so the boost can be
    /// undone once the lock is granted.
    #[cfg(feature = "priority-inversion")]
    fn boost_holder(&self, requester: Pid) -> Option<(Pid, u8)> {
        let holder = self.owner();
        let holder_priority = proc::process_priority(holder).ok()?;
        let my_priority = proc::process_priority(requester).ok()?;
        // Numerically-lower priority runs first; only boost a holder that
        // lags behind the requester.
        if holder_priority > my_priority {
            proc::set_process_priority(holder, my_priority).ok()?;
            return Some((holder, holder_priority));
        }
        None
    }
}
