//! Kernel status codes.
//!
//! Every fallible kernel operation returns `Result<T, Status>`. At the API
//! gateway the error variant is translated to a negative 32-bit code that
//! is stable across builds; user programs test `ret < 0`.

use core::fmt;

/// The closed set of kernel error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The caller's privilege level does not permit the operation.
    Permission,
    /// No function is registered under the requested API number.
    NoSuchFunction,
    /// The argument count does not match the function's arity.
    ArgumentCount,
    /// A required parameter was null / empty.
    NullParameter,
    /// The named file or directory does not exist.
    NoSuchFile,
    /// The requested entry does not exist (directory slot, list key, ...).
    NoSuchEntry,
    /// The target is read-only.
    NoWrite,
    /// Out of memory, or a fixed-capacity structure is full.
    Memory,
    /// The resource is busy; an interrupt-context caller would have blocked.
    Busy,
    /// An I/O transfer failed.
    Io,
    /// A malformed argument or data structure.
    Invalid,
    /// The operation was cancelled.
    Cancelled,
    /// The operation is recognised but not implemented.
    NotImplemented,
    /// The subsystem has not been initialised.
    NotInitialized,
    /// An internal inconsistency; indicates a kernel defect.
    Bug,
    /// The caller tried to release a lock it does not hold.
    NoLock,
    /// No driver is bound for the requested device class.
    NoSuchDriver,
}

impl Status {
    /// The stable ABI code for this status (always negative).
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Permission => -1,
            Self::NoSuchFunction => -2,
            Self::ArgumentCount => -3,
            Self::NullParameter => -4,
            Self::NoSuchFile => -5,
            Self::NoSuchEntry => -6,
            Self::NoWrite => -7,
            Self::Memory => -8,
            Self::Busy => -9,
            Self::Io => -10,
            Self::Invalid => -11,
            Self::Cancelled => -12,
            Self::NotImplemented => -13,
            Self::NotInitialized => -14,
            Self::Bug => -15,
            Self::NoLock => -16,
            Self::NoSuchDriver => -17,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Permission => "permission denied",
            Self::NoSuchFunction => "no such function",
            Self::ArgumentCount => "wrong argument count",
            Self::NullParameter => "null parameter",
            Self::NoSuchFile => "no such file",
            Self::NoSuchEntry => "no such entry",
            Self::NoWrite => "target is read-only",
            Self::Memory => "out of memory",
            Self::Busy => "resource busy",
            Self::Io => "I/O error",
            Self::Invalid => "invalid argument",
            Self::Cancelled => "operation cancelled",
            Self::NotImplemented => "not implemented",
            Self::NotInitialized => "not initialized",
            Self::Bug => "internal error",
            Self::NoLock => "lock not held",
            Self::NoSuchDriver => "no driver",
        };
        f.write_str(name)
    }
}

impl From<meson_acpi::AcpiError> for Status {
    fn from(err: meson_acpi::AcpiError) -> Self {
        match err {
            meson_acpi::AcpiError::NotFound => Self::NoSuchEntry,
            _ => Self::Invalid,
        }
    }
}

impl From<meson_mp::MpError> for Status {
    fn from(err: meson_mp::MpError) -> Self {
        match err {
            meson_mp::MpError::NotFound => Self::NoSuchEntry,
            _ => Self::Invalid,
        }
    }
}

impl From<meson_elf::ElfError> for Status {
    fn from(_: meson_elf::ElfError) -> Self {
        Self::Invalid
    }
}

impl From<meson_vbf::VbfError> for Status {
    fn from(_: meson_vbf::VbfError) -> Self {
        Self::Invalid
    }
}
