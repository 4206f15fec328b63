//! Interrupt controller abstraction.
//!
//! Every interrupt controller in the machine registers a [`PicDescriptor`]
//! here: the legacy 8259 pair, or one descriptor per I/O APIC. Each
//! descriptor covers a contiguous range of global interrupt numbers; the
//! top-level operations route by that range, so the rest of the kernel
//! masks and acknowledges interrupts without knowing which silicon is
//! underneath.

extern crate alloc;

pub mod apic;
pub mod pic8259;

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::device::PicOps;
use crate::status::Status;
use crate::sync::SpinLock;

/// The lowest CPU vector used for hardware interrupts; everything below
/// is CPU exceptions.
pub const VECTOR_START: u8 = 0x20;

/// Kind of interrupt controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PicKind {
    /// Legacy 8259A master/slave pair.
    Legacy,
    /// I/O APIC fed by the local APIC.
    IoApic,
}

/// A registered interrupt controller.
pub struct PicDescriptor {
    /// Controller kind.
    pub kind: PicKind,
    /// Whether the controller is delivering interrupts.
    pub enabled: bool,
    /// First global interrupt number this controller covers.
    pub start_irq: u8,
    /// Number of interrupt inputs.
    pub num_irqs: u8,
    /// The driver operations.
    pub ops: Arc<dyn PicOps>,
}

static CONTROLLERS: SpinLock<Vec<PicDescriptor>> = SpinLock::new(Vec::new());

/// Register an interrupt controller.
pub fn register(descriptor: PicDescriptor) {
    CONTROLLERS.lock().push(descriptor);
}

/// Drop every registered controller. Intended for tests and shutdown.
pub fn clear() {
    CONTROLLERS.lock().clear();
}

/// Run `f` with the controller covering `int_number`.
fn with_controller<R>(
    int_number: u8,
    f: impl FnOnce(&PicDescriptor) -> Result<R, Status>,
) -> Result<R, Status> {
    let controllers = CONTROLLERS.lock();
    for descriptor in controllers.iter() {
        let end = u16::from(descriptor.start_irq) + u16::from(descriptor.num_irqs);
        if int_number >= descriptor.start_irq && u16::from(int_number) < end {
            return f(descriptor);
        }
    }
    Err(Status::NoSuchDriver)
}

/// Translate a bus-local IRQ into a global interrupt number.
///
/// Asks each controller in registration order; the first one that routes
/// the bus IRQ wins.
///
/// # Errors
///
/// Returns [`Status::NoSuchEntry`] if no controller routes this bus IRQ.
pub fn int_number(bus_id: u8, bus_irq: u8) -> Result<u8, Status> {
    let controllers = CONTROLLERS.lock();
    for descriptor in controllers.iter() {
        if let Ok(int) = descriptor.ops.int_number(bus_id, bus_irq) {
            return Ok(int);
        }
    }
    Err(Status::NoSuchEntry)
}

/// The CPU vector assigned to a global interrupt number.
///
/// # Errors
///
/// Returns [`Status::NoSuchDriver`] if no controller covers the number.
pub fn vector(int_number: u8) -> Result<u8, Status> {
    with_controller(int_number, |d| d.ops.vector(int_number))
}

/// Acknowledge an interrupt.
///
/// # Errors
///
/// Returns [`Status::NoSuchDriver`] if no controller covers the number.
pub fn end_of_interrupt(int_number: u8) -> Result<(), Status> {
    with_controller(int_number, |d| {
        d.ops.end_of_interrupt(int_number);
        Ok(())
    })
}

/// Mask (`on == false`) or unmask an interrupt.
///
/// # Errors
///
/// Returns [`Status::NoSuchDriver`] if no controller covers the number,
/// or [`Status::NoSuchEntry`] if the controller has no routing entry for
/// it.
pub fn mask(int_number: u8, on: bool) -> Result<(), Status> {
    with_controller(int_number, |d| d.ops.mask(int_number, on))
}

/// The interrupt number currently in service, if any controller reports
/// one.
#[must_use]
pub fn get_active() -> Option<u8> {
    let controllers = CONTROLLERS.lock();
    controllers.iter().find_map(|d| d.ops.get_active())
}

/// Disable every registered controller.
pub fn disable_all() {
    let controllers = CONTROLLERS.lock();
    for descriptor in controllers.iter() {
        descriptor.ops.disable();
    }
}

/// Interrupt controller probe, run first in the driver table.
///
/// Prefers the APIC when the MP tables are present and route the system
/// timer; otherwise falls back to the legacy 8259 pair. Either way a PIC
/// device is published in the tree with its operations attached.
pub fn detect(
    tree: &mut crate::device::DeviceTree,
    parent: crate::device::DeviceId,
    ctx: &mut crate::device::DetectContext<'_>,
) -> Result<(), Status> {
    #[cfg(target_os = "none")]
    if apic::detect_and_register(tree, parent, ctx)? {
        return Ok(());
    }
    #[cfg(not(target_os = "none"))]
    let _ = ctx;

    // Legacy fallback.
    let pic = Arc::new(pic8259::Pic8259::new());
    // SAFETY: interrupts are still disabled this early in boot, and this
    // probe runs exactly once.
    #[cfg(target_os = "none")]
    unsafe {
        pic.remap();
    }

    register(PicDescriptor {
        kind: PicKind::Legacy,
        enabled: true,
        start_irq: 0,
        num_irqs: pic8259::NUM_IRQS,
        ops: pic.clone(),
    });

    tree.add(
        Some(parent),
        crate::device::Device::new(crate::device::DeviceClass::Pic, None)
            .with_model("8259")
            .with_ops(crate::device::DeviceOps::Pic(pic)),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakePic {
        base: u8,
    }

    impl PicOps for FakePic {
        fn int_number(&self, _bus_id: u8, bus_irq: u8) -> Result<u8, Status> {
            Ok(self.base + bus_irq)
        }
        fn vector(&self, int_number: u8) -> Result<u8, Status> {
            Ok(VECTOR_START + int_number)
        }
        fn end_of_interrupt(&self, _int_number: u8) {}
        fn mask(&self, _int_number: u8, _on: bool) -> Result<(), Status> {
            Ok(())
        }
        fn get_active(&self) -> Option<u8> {
            None
        }
    }

    #[test]
    fn routing_picks_covering_controller() {
        clear();
        register(PicDescriptor {
            kind: PicKind::IoApic,
            enabled: true,
            start_irq: 0,
            num_irqs: 24,
            ops: Arc::new(FakePic { base: 0 }),
        });
        register(PicDescriptor {
            kind: PicKind::IoApic,
            enabled: true,
            start_irq: 24,
            num_irqs: 24,
            ops: Arc::new(FakePic { base: 24 }),
        });

        assert_eq!(vector(3), Ok(VECTOR_START + 3));
        assert_eq!(vector(30), Ok(VECTOR_START + 30));
        assert_eq!(vector(50), Err(Status::NoSuchDriver));
        clear();
    }
}
