//! Synchronisation primitives.
//!
//! [`SpinLock`] protects kernel-internal structures with short critical
//! sections (the device registry, the logger, the process table).
//! [`ResourceLock`] is the process-owned lock embedded in every shared
//! resource; it cooperates with the multitasker so that a dead owner can
//! never wedge the kernel.

pub mod resource_lock;
pub mod spinlock;

pub use resource_lock::ResourceLock;
pub use spinlock::{SpinLock, SpinLockGuard};
