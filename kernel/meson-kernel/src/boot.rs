//! Kernel initialisation sequence.
//!
//! [`kernel_init`] wires the core together in dependency order: the API
//! dispatch table, then device probing (interrupt controller first, per
//! the driver table), and finally the settings file once a root
//! filesystem is mounted. The boot stub on the kernel target calls this
//! with real firmware access; host tests call it with an image.

extern crate alloc;

use crate::configfile;
use crate::device::{self, BootInfo, DetectContext, PciTargetInfo};
use crate::log::LogLevel;
use crate::mm::FirmwareReader;
use crate::status::Status;
use crate::{api, drivers, kinfo, kwarn};

/// Path of the kernel settings file.
pub const KERNEL_CONF: &str = "/system/kernel.conf";

/// Settings the boot path consumes from `kernel.conf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelSettings {
    /// Global log verbosity.
    pub log_level: LogLevel,
    /// Console scrollback depth in rows.
    pub console_scrollback: usize,
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            console_scrollback: 200,
        }
    }
}

/// Initialise the kernel core.
///
/// Builds the API table and probes the built-in drivers. Filesystem
/// mounts and the console come from the boot stub around this, because
/// both depend on devices this call discovers.
///
/// # Errors
///
/// Propagates API table construction failures; driver probe failures
/// are logged, not fatal.
pub fn kernel_init(
    boot: &BootInfo,
    firmware: &mut dyn FirmwareReader,
    pci_targets: &[PciTargetInfo],
) -> Result<(), Status> {
    api::init()?;

    let mut ctx = DetectContext {
        firmware,
        boot,
        pci_targets,
        mmio: None,
    };
    device::initialize(&drivers::builtin(), &mut ctx);

    kinfo!(
        "{} {} core initialised",
        crate::KERNEL_NAME,
        crate::KERNEL_VERSION
    );
    Ok(())
}

/// Read and apply `kernel.conf` from the mounted root.
///
/// A missing file is not an error; defaults apply. Unknown keys are
/// ignored, and a malformed value falls back to its default with a
/// warning.
#[must_use]
pub fn apply_kernel_config() -> KernelSettings {
    let mut settings = KernelSettings::default();

    let Ok(list) = configfile::read_config(KERNEL_CONF) else {
        return settings;
    };

    if let Some(value) = list.get("log.level") {
        settings.log_level = match value.as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            other => {
                kwarn!("boot: unknown log.level \"{}\"", other);
                settings.log_level
            }
        };
    }

    if let Some(value) = list.get("console.scrollback") {
        match value.parse::<usize>() {
            Ok(rows) => settings.console_scrollback = rows,
            Err(_) => kwarn!("boot: bad console.scrollback \"{}\"", value),
        }
    }

    crate::log::set_global_level(settings.log_level);
    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::ramfs::RamFs;
    use crate::fs::{self, FileStream, OpenMode};
    use crate::mm::LinearImage;
    use alloc::boxed::Box;
    use alloc::vec;

    #[test]
    fn init_probes_devices_and_builds_the_api() {
        let boot = BootInfo {
            extended_memory_kb: 31744,
        };
        let mut firmware = LinearImage::new(0xE0000, vec![0u8; 0x20000]);

        kernel_init(&boot, &mut firmware, &[]).unwrap();

        // The driver table ran: a PIC and the memory device exist.
        device::with_device_tree(|tree| {
            assert!(!tree.find_type(device::DeviceClass::Pic, None, 1).is_empty());
            let memory = tree.find_type(device::DeviceClass::Memory, None, 1);
            assert_eq!(
                tree.device(memory[0]).attrs.get("memory.size"),
                Some(alloc::string::String::from("32768 Kb"))
            );
        });

        // The API table answers.
        assert_eq!(
            api::process_call(&[1, api::numbers::MULTITASKER_GET_CURRENT_PID]),
            crate::proc::current_pid() as i32
        );
    }

    #[test]
    fn kernel_conf_settings_apply() {
        fs::mount("/", Box::new(RamFs::new())).unwrap();
        fs::make_dir("/system").unwrap();
        let mut stream = FileStream::open(
            KERNEL_CONF,
            OpenMode::WRITE | OpenMode::CREATE,
        )
        .unwrap();
        stream
            .write(b"# kernel settings\nlog.level=warn\nconsole.scrollback=64\n")
            .unwrap();
        stream.close().unwrap();

        let settings = apply_kernel_config();
        assert_eq!(settings.log_level, LogLevel::Warn);
        assert_eq!(settings.console_scrollback, 64);

        // Put the global level back for the other tests.
        crate::log::set_global_level(LogLevel::Info);
    }
}
