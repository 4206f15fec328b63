//! Architecture support.
//!
//! Real hardware access (port I/O, interrupt flag control, halting) is
//! compiled only for the kernel target. On a host build the same functions
//! exist as inert stubs so that the pure-logic modules above them compile
//! and test unchanged.

pub mod x86;

pub use x86::{Port, halt, read_msr, restore_ints, suspend_ints, write_msr};
