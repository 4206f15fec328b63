//! System shutdown.
//!
//! All roads out of the kernel pass through [`shutdown`]: filesystems
//! are flushed and unmounted, non-kernel processes are stopped, and then
//! the machine halts, reboots through the keyboard controller, or powers
//! off through the ACPI device if discovery registered one.

use crate::device::{self, DeviceClass, DeviceSubclass};
use crate::proc::{self, KERNEL_PID};
use crate::status::Status;
use crate::{fs, interrupt, kinfo, kwarn};

/// How to leave the running system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownKind {
    /// Stop scheduling and idle the CPU with interrupts off.
    Halt,
    /// Reset the machine through the keyboard controller.
    Reboot,
    /// Power the machine off through ACPI.
    PowerOff,
}

/// Shut the system down.
///
/// Without `force`, a filesystem that fails to flush aborts the
/// shutdown so the caller can retry; with `force`, flush failures are
/// logged and ignored.
///
/// On the kernel target `Halt` and a successful `Reboot`/`PowerOff`
/// do not return.
///
/// # Errors
///
/// Returns the first flush failure when not forced, or
/// [`Status::NotImplemented`] when a power-off was requested but no
/// power-management device exists.
pub fn shutdown(kind: ShutdownKind, force: bool) -> Result<(), Status> {
    kinfo!("power: shutting down ({kind:?})");

    fs::unmount_all(force)?;

    // Stop everything that is not the kernel.
    for pid in proc::all_pids() {
        if pid != KERNEL_PID {
            let _ = proc::kill(pid, force);
        }
    }

    match kind {
        ShutdownKind::Halt => halt_forever(),
        ShutdownKind::Reboot => reboot(),
        ShutdownKind::PowerOff => power_off(),
    }
}

fn halt_forever() -> Result<(), Status> {
    interrupt::disable_all();
    #[cfg(target_os = "none")]
    loop {
        crate::arch::halt();
    }
    #[cfg(not(target_os = "none"))]
    Ok(())
}

fn reboot() -> Result<(), Status> {
    #[cfg(target_os = "none")]
    {
        use crate::arch::Port;
        let status_port = Port::<u8>::new(0x64);
        // Drain the controller's input buffer, then pulse the reset line.
        // SAFETY: standard 8042 reset protocol.
        unsafe {
            for _ in 0..0x10000 {
                if status_port.read() & 0x02 == 0 {
                    break;
                }
            }
            status_port.write(0xFE);
        }
        // The pulse takes effect within a few cycles.
        loop {
            crate::arch::halt();
        }
    }
    #[cfg(not(target_os = "none"))]
    Ok(())
}

fn power_off() -> Result<(), Status> {
    let ops = device::with_device_tree(|tree| {
        tree.find_type(DeviceClass::Power, Some(DeviceSubclass::PowerAcpi), 1)
            .first()
            .and_then(|&id| tree.device(id).ops.as_power().cloned())
    });

    match ops {
        Some(power) => {
            power.power_off()?;
            // Conforming hardware is off; anything still running falls
            // back to a halt.
            halt_forever()
        }
        None => {
            kwarn!("power: no power-management device, halting instead");
            Err(Status::NotImplemented)
        }
    }
}
