//! APIC driver: local APIC plus I/O APICs.
//!
//! Routing data comes from the MP configuration table. Each I/O APIC is
//! registered as its own interrupt controller covering a contiguous range
//! of global interrupt numbers; the local APIC is shared between them.
//!
//! # Vector assignment
//!
//! For APICs the upper 4 bits of a vector are its priority level, 0xF
//! highest, and the hardware takes at most two in-service interrupts per
//! level. ISA IRQs 0-15 are numbered by priority with 0 highest, so IRQs
//! 0+1 get level 0xF, IRQs 2+3 level 0xE, down to level 2 (below that are
//! CPU exceptions). That yields 14 usable levels, a sensible distribution
//! for up to 28 IRQs; past 28 the assignment wraps back to the top level.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec::Vec;

use meson_mp::{BusKind, IntPolarity, IntTrigger, IntType, MpConfigTable, MpEntry};

use crate::device::PicOps;
use crate::interrupt::VECTOR_START;
use crate::status::Status;

// Local APIC register offsets.
const REG_ID: u16 = 0x20;
const REG_TASKPRI: u16 = 0x80;
const REG_EOI: u16 = 0xB0;
const REG_LOGDEST: u16 = 0xD0;
const REG_DESTFMT: u16 = 0xE0;
const REG_SPURINT: u16 = 0xF0;
const REG_ISR: u16 = 0x100;
const REG_LVT_TIMER: u16 = 0x320;
const REG_LVT_PERFCNT: u16 = 0x340;
const REG_LVT_LINT0: u16 = 0x350;
const REG_LVT_LINT1: u16 = 0x360;
const REG_LVT_ERROR: u16 = 0x370;

/// LVT / redirection "masked" bit.
const BIT_MASKED: u32 = 1 << 16;
/// Level-trigger bit.
const BIT_LEVEL: u32 = 1 << 15;
/// Active-low polarity bit.
const BIT_ACTIVE_LOW: u32 = 1 << 13;
/// Logical destination mode bit.
const BIT_LOGICAL_DEST: u32 = 1 << 11;
/// Delivery mode field mask within a redirection entry.
const DELIVERY_MASK: u32 = 0x700;
/// Delivery mode: SMI.
const DELIVERY_SMI: u32 = 0x02 << 8;
/// Delivery mode: NMI.
const DELIVERY_NMI: u32 = 0x04 << 8;
/// Delivery mode: ExtINT (8259-compatible).
const DELIVERY_EXTINT: u32 = 0x07 << 8;

/// Compute the CPU vector for a global interrupt number.
#[must_use]
pub fn vector_for_irq(vector_start: u8, irq: u8) -> u8 {
    let priorities = (0x100 - u32::from(vector_start)) >> 4;
    let irq = u32::from(irq);
    let level = 0xF - ((irq % (priorities * 2)) / 2);
    let index = ((irq / (priorities * 2)) * 2) + (irq & 1);
    ((level << 4) | index) as u8
}

/// Reverse of [`vector_for_irq`].
#[must_use]
pub fn irq_for_vector(vector_start: u8, vector: u8) -> u8 {
    let priorities = (0x100 - u32::from(vector_start)) >> 4;
    let vector = u32::from(vector);
    (((vector & 0xF) / 2) * (priorities * 2) + ((0xF - (vector >> 4)) * 2) + (vector & 1)) as u8
}

/// Register access to the local APIC.
pub trait LocalApicAccess: Send + Sync {
    /// Read a 32-bit local APIC register.
    fn read(&self, offset: u16) -> u32;
    /// Write a 32-bit local APIC register.
    fn write(&self, offset: u16, value: u32);
}

/// Register access to one I/O APIC.
pub trait IoApicAccess: Send + Sync {
    /// The I/O APIC's ID from the MP table.
    fn id(&self) -> u8;
    /// Read an indirect register.
    fn read(&self, reg: u8) -> u32;
    /// Write an indirect register.
    fn write(&self, reg: u8, value: u32);
}

/// MMIO-backed local APIC register access.
pub struct MmioLocalApic {
    base: *mut u32,
}

// SAFETY: the registers belong to the boot CPU and writes are whole-word
// volatile accesses.
unsafe impl Send for MmioLocalApic {}
unsafe impl Sync for MmioLocalApic {}

impl MmioLocalApic {
    /// Wrap a mapped local APIC register page.
    ///
    /// # Safety
    ///
    /// `virt_base` must be an uncacheable mapping of the local APIC MMIO
    /// page.
    #[must_use]
    pub unsafe fn new(virt_base: u32) -> Self {
        Self {
            base: virt_base as *mut u32,
        }
    }
}

impl LocalApicAccess for MmioLocalApic {
    fn read(&self, offset: u16) -> u32 {
        // SAFETY: construction guarantees a valid mapping; offsets are
        // word-aligned register offsets.
        unsafe { core::ptr::read_volatile(self.base.byte_add(offset as usize)) }
    }

    fn write(&self, offset: u16, value: u32) {
        // SAFETY: as above.
        unsafe { core::ptr::write_volatile(self.base.byte_add(offset as usize), value) }
    }
}

/// MMIO-backed I/O APIC register access (IOREGSEL/IOWIN indirection).
pub struct MmioIoApic {
    id: u8,
    base: *mut u32,
}

// SAFETY: single CPU; the select/read pair is not interleaved because all
// users go through the controller, which serialises behind the registry
// lock.
unsafe impl Send for MmioIoApic {}
unsafe impl Sync for MmioIoApic {}

impl MmioIoApic {
    /// Wrap a mapped I/O APIC register window.
    ///
    /// # Safety
    ///
    /// `virt_base` must be an uncacheable mapping of the I/O APIC MMIO
    /// window.
    #[must_use]
    pub unsafe fn new(id: u8, virt_base: u32) -> Self {
        Self {
            id,
            base: virt_base as *mut u32,
        }
    }
}

impl IoApicAccess for MmioIoApic {
    fn id(&self) -> u8 {
        self.id
    }

    fn read(&self, reg: u8) -> u32 {
        // SAFETY: IOREGSEL at +0, IOWIN at +0x10, both in the mapped window.
        unsafe {
            core::ptr::write_volatile(self.base, u32::from(reg));
            core::ptr::read_volatile(self.base.byte_add(0x10))
        }
    }

    fn write(&self, reg: u8, value: u32) {
        // SAFETY: as above.
        unsafe {
            core::ptr::write_volatile(self.base, u32::from(reg));
            core::ptr::write_volatile(self.base.byte_add(0x10), value);
        }
    }
}

/// One bus from the MP table.
#[derive(Debug, Clone, Copy)]
pub struct BusInfo {
    /// Bus ID.
    pub id: u8,
    /// Bus classification.
    pub kind: BusKind,
}

/// One I/O APIC from the MP table.
#[derive(Debug, Clone, Copy)]
pub struct IoApicInfo {
    /// I/O APIC ID.
    pub id: u8,
    /// Physical register base address.
    pub address: u32,
}

/// One interrupt assignment (I/O or local) from the MP table.
#[derive(Debug, Clone, Copy)]
pub struct IntAssignment {
    /// Interrupt type.
    pub int_type: IntType,
    /// Raw MPS INTI flags.
    pub flags: u16,
    /// Source bus ID.
    pub bus: u8,
    /// Source bus IRQ.
    pub bus_irq: u8,
    /// Destination I/O APIC ID (or local APIC ID for local entries).
    pub dest: u8,
    /// Destination pin (I/O APIC input or LINT number).
    pub pin: u8,
}

/// The routing-relevant contents of the MP configuration table, copied
/// out so the firmware pages can be unmapped.
pub struct MpInfo {
    /// Local APIC IDs of all usable CPUs, bootstrap first.
    pub cpu_apic_ids: Vec<u8>,
    /// Buses by ID.
    pub buses: Vec<BusInfo>,
    /// I/O APICs.
    pub io_apics: Vec<IoApicInfo>,
    /// Bus-IRQ to I/O-APIC-pin assignments.
    pub io_assignments: Vec<IntAssignment>,
    /// Bus-IRQ to LINT-pin assignments.
    pub local_assignments: Vec<IntAssignment>,
    /// Physical address of the local APIC registers.
    pub local_apic_address: u32,
}

impl MpInfo {
    /// Extract routing data from a parsed MP configuration table.
    #[must_use]
    pub fn from_table(table: &MpConfigTable<'_>) -> Self {
        let mut info = Self {
            cpu_apic_ids: Vec::new(),
            buses: Vec::new(),
            io_apics: Vec::new(),
            io_assignments: Vec::new(),
            local_assignments: Vec::new(),
            local_apic_address: table.local_apic_address,
        };

        for entry in table.entries() {
            match entry {
                MpEntry::Cpu {
                    lapic_id,
                    enabled,
                    bootstrap,
                    ..
                } if enabled => {
                    if bootstrap {
                        info.cpu_apic_ids.insert(0, lapic_id);
                    } else {
                        info.cpu_apic_ids.push(lapic_id);
                    }
                }
                MpEntry::Bus { bus_id, bus_type } => {
                    info.buses.push(BusInfo {
                        id: bus_id,
                        kind: BusKind::from_type_string(&bus_type),
                    });
                }
                MpEntry::IoApic {
                    io_apic_id,
                    enabled,
                    address,
                    ..
                } if enabled => {
                    info.io_apics.push(IoApicInfo {
                        id: io_apic_id,
                        address,
                    });
                }
                MpEntry::IoInterrupt {
                    int_type,
                    flags,
                    source_bus,
                    source_irq,
                    dest_io_apic,
                    dest_pin,
                } => {
                    info.io_assignments.push(IntAssignment {
                        int_type,
                        flags,
                        bus: source_bus,
                        bus_irq: source_irq,
                        dest: dest_io_apic,
                        pin: dest_pin,
                    });
                }
                MpEntry::LocalInterrupt {
                    int_type,
                    flags,
                    source_bus,
                    source_irq,
                    dest_lapic,
                    dest_lint,
                } => {
                    info.local_assignments.push(IntAssignment {
                        int_type,
                        flags,
                        bus: source_bus,
                        bus_irq: source_irq,
                        dest: dest_lapic,
                        pin: dest_lint,
                    });
                }
                _ => {}
            }
        }
        info
    }

    /// The bus kind for a bus ID.
    #[must_use]
    pub fn bus_kind(&self, bus_id: u8) -> Option<BusKind> {
        self.buses.iter().find(|b| b.id == bus_id).map(|b| b.kind)
    }

    /// Whether the system timer (ISA IRQ 0) is routed to some I/O APIC.
    ///
    /// If it is not, the MP table cannot be trusted to drive scheduling
    /// and the APIC setup is abandoned in favour of the legacy PIC.
    #[must_use]
    pub fn timer_irq_mapped(&self) -> bool {
        self.io_assignments.iter().any(|a| {
            a.int_type == IntType::Int
                && a.bus_irq == 0
                && self.bus_kind(a.bus) == Some(BusKind::Isa)
        })
    }
}

/// Program the boot CPU's local APIC.
///
/// Masks every LVT entry, programs LINT0/LINT1 from the MP table's local
/// interrupt assignments, selects the flat destination model with a
/// logical ID derived from the low 4 bits of the APIC ID, and enables the
/// APIC through the spurious-interrupt register (bit 8, vector 0xFF).
///
/// Returns the logical destination bitmap chosen for this CPU.
pub fn enable_local_apic(local: &dyn LocalApicAccess, mp: &MpInfo) -> u8 {
    let apic_id = (local.read(REG_ID) >> 24) as u8;

    // Accept all interrupt priorities.
    local.write(REG_TASKPRI, 0);

    // Mask everything until the table says otherwise.
    local.write(REG_LVT_TIMER, BIT_MASKED);
    local.write(REG_LVT_PERFCNT, BIT_MASKED);
    local.write(REG_LVT_LINT0, BIT_MASKED);
    local.write(REG_LVT_LINT1, BIT_MASKED);
    local.write(REG_LVT_ERROR, BIT_MASKED);

    for entry in &mp.local_assignments {
        // This local APIC, or all of them.
        if entry.dest != 0xFF && entry.dest != apic_id {
            continue;
        }

        let mut lint = 0u32;

        // The trigger bit only applies to fixed delivery.
        if entry.int_type == IntType::Int
            && IntTrigger::from_flags(entry.flags) == IntTrigger::Level
        {
            lint |= BIT_LEVEL;
        }
        if IntPolarity::from_flags(entry.flags) == IntPolarity::ActiveLow {
            lint |= BIT_ACTIVE_LOW;
        }
        match entry.int_type {
            IntType::Nmi => lint |= DELIVERY_NMI,
            IntType::ExtInt => lint |= DELIVERY_EXTINT,
            IntType::Int => lint |= u32::from(vector_for_irq(VECTOR_START, entry.bus_irq)),
            IntType::Smi => lint |= DELIVERY_SMI,
        }

        if entry.pin == 0 {
            local.write(REG_LVT_LINT0, lint);
        } else {
            local.write(REG_LVT_LINT1, lint);
        }
    }

    local.write(REG_TASKPRI, 0);

    // Flat destination model.
    local.write(REG_DESTFMT, local.read(REG_DESTFMT) | (0xF << 28));

    // Logical destination: a bitmap over the low 4 bits of the APIC ID.
    let logical_dest = 1u8 << (apic_id & 0xF);
    local.write(
        REG_LOGDEST,
        (local.read(REG_LOGDEST) & 0x00FF_FFFF) | (u32::from(logical_dest) << 24),
    );

    // APIC enable (bit 8) + spurious vector 0xFF.
    local.write(REG_SPURINT, local.read(REG_SPURINT) | 0x1FF);

    logical_dest
}

/// Redirection slot programming shared by the ISA and PCI paths.
fn program_slot(
    io: &dyn IoApicAccess,
    pin: u8,
    vector: u8,
    int_type: IntType,
    level: bool,
    active_low: bool,
    logical_dest: u8,
) {
    let slot_hi = u32::from(logical_dest) << 24;

    let mut slot_lo = BIT_MASKED | u32::from(vector) | BIT_LOGICAL_DEST;
    if level {
        slot_lo |= BIT_LEVEL;
    }
    if active_low {
        slot_lo |= BIT_ACTIVE_LOW;
    }
    match int_type {
        IntType::Smi => slot_lo |= DELIVERY_SMI,
        IntType::Nmi => slot_lo |= DELIVERY_NMI,
        IntType::ExtInt => slot_lo |= DELIVERY_EXTINT,
        IntType::Int => {}
    }

    let reg_lo = 0x10 + pin * 2;
    io.write(reg_lo + 1, slot_hi);
    io.write(reg_lo, slot_lo);
}

/// Program this I/O APIC's redirection slots for every ISA interrupt
/// assignment that targets it.
///
/// ISA defaults: edge-triggered, active-high; a level-triggered entry
/// with bus-default polarity is forced active-low. The slot vector comes
/// from the ISA bus IRQ.
pub fn setup_isa_ints(io: &dyn IoApicAccess, mp: &MpInfo, logical_dest: u8) {
    for entry in &mp.io_assignments {
        if entry.dest != io.id() || mp.bus_kind(entry.bus) != Some(BusKind::Isa) {
            continue;
        }

        let level = IntTrigger::from_flags(entry.flags) == IntTrigger::Level;
        let active_low = match IntPolarity::from_flags(entry.flags) {
            IntPolarity::ActiveHigh => false,
            IntPolarity::ActiveLow => true,
            IntPolarity::BusDefault => level,
        };

        program_slot(
            io,
            entry.pin,
            vector_for_irq(VECTOR_START, entry.bus_irq),
            entry.int_type,
            level,
            active_low,
            logical_dest,
        );
    }
}

/// Program this I/O APIC's redirection slots for every PCI interrupt
/// assignment that targets it.
///
/// PCI defaults: level-triggered, active-low. PCI interrupt numbers are
/// pin-based: the slot vector comes from `start_irq + pin`.
pub fn setup_pci_ints(io: &dyn IoApicAccess, mp: &MpInfo, start_irq: u8, logical_dest: u8) {
    for entry in &mp.io_assignments {
        if entry.dest != io.id() || mp.bus_kind(entry.bus) != Some(BusKind::Pci) {
            continue;
        }

        let level = IntTrigger::from_flags(entry.flags) != IntTrigger::Edge;
        let active_low = IntPolarity::from_flags(entry.flags) != IntPolarity::ActiveHigh;

        program_slot(
            io,
            entry.pin,
            vector_for_irq(VECTOR_START, start_irq + entry.pin),
            entry.int_type,
            level,
            active_low,
            logical_dest,
        );
    }
}

/// One I/O APIC acting as an interrupt controller.
pub struct ApicController {
    local: Arc<dyn LocalApicAccess>,
    io: Arc<dyn IoApicAccess>,
    mp: Arc<MpInfo>,
    start_irq: u8,
    num_irqs: u8,
}

impl ApicController {
    /// Create a controller covering `num_irqs` global interrupt numbers
    /// starting at `start_irq`.
    #[must_use]
    pub fn new(
        local: Arc<dyn LocalApicAccess>,
        io: Arc<dyn IoApicAccess>,
        mp: Arc<MpInfo>,
        start_irq: u8,
        num_irqs: u8,
    ) -> Self {
        Self {
            local,
            io,
            mp,
            start_irq,
            num_irqs,
        }
    }

    /// The number of redirection slots, from the I/O APIC version
    /// register.
    #[must_use]
    pub fn slot_count(io: &dyn IoApicAccess) -> u8 {
        (((io.read(1) >> 16) & 0xFF) + 1) as u8
    }

    /// Program redirection entries from the MP data.
    pub fn program_slots(&self, logical_dest: u8) {
        setup_isa_ints(self.io.as_ref(), &self.mp, logical_dest);
        setup_pci_ints(self.io.as_ref(), &self.mp, self.start_irq, logical_dest);
    }
}

impl PicOps for ApicController {
    fn int_number(&self, bus_id: u8, bus_irq: u8) -> Result<u8, Status> {
        for entry in &self.mp.io_assignments {
            if entry.dest == self.io.id()
                && entry.bus == bus_id
                && entry.int_type == IntType::Int
                && entry.bus_irq == bus_irq
            {
                return Ok(self.start_irq + entry.pin);
            }
        }
        Err(Status::NoSuchEntry)
    }

    fn vector(&self, int_number: u8) -> Result<u8, Status> {
        Ok(vector_for_irq(VECTOR_START, int_number))
    }

    fn end_of_interrupt(&self, _int_number: u8) {
        self.local.write(REG_EOI, 0);
    }

    fn mask(&self, int_number: u8, on: bool) -> Result<(), Status> {
        let mut found = false;

        // Scan every slot: several inputs may share one interrupt number.
        for pin in 0..self.num_irqs {
            let reg_lo = 0x10 + pin * 2;
            let slot_lo = self.io.read(reg_lo);

            // ExtINT slots belong to the 8259 passthrough, not to us.
            if slot_lo & DELIVERY_MASK == DELIVERY_EXTINT {
                continue;
            }
            if irq_for_vector(VECTOR_START, (slot_lo & 0xFF) as u8) != int_number {
                continue;
            }

            found = true;
            if on {
                self.io.write(reg_lo, slot_lo & !BIT_MASKED);
            } else {
                self.io.write(reg_lo, slot_lo | BIT_MASKED);
            }
        }

        if found { Ok(()) } else { Err(Status::NoSuchEntry) }
    }

    fn get_active(&self) -> Option<u8> {
        // ISR registers sit at 16-byte strides, 32 vectors each; the
        // first covers the exception range and is skipped.
        let mut vector = 0x20u32;
        let mut offset = 16u16;
        while offset < 128 {
            let mut isr = self.local.read(REG_ISR + offset);
            if isr != 0 {
                while isr & 1 == 0 {
                    isr >>= 1;
                    vector += 1;
                }
                return Some(irq_for_vector(VECTOR_START, vector as u8));
            }
            vector += 32;
            offset += 16;
        }
        None
    }

    fn disable(&self) {
        for pin in 0..self.num_irqs {
            let reg_lo = 0x10 + pin * 2;
            let slot_lo = self.io.read(reg_lo);
            self.io.write(reg_lo, slot_lo | BIT_MASKED);
        }
    }
}

/// Scan firmware memory for the MP configuration table and extract the
/// routing data.
///
/// Searches the BIOS ROM area `[0xF0000, 0x100000)` on 16-byte
/// boundaries for the floating pointer, then reads and validates the
/// configuration table it points to.
///
/// # Errors
///
/// Propagates [`Status::Memory`] from the firmware reader; returns
/// `Ok(None)` when no usable table exists.
pub fn detect_mp(firmware: &mut dyn crate::mm::FirmwareReader) -> Result<Option<MpInfo>, Status> {
    use meson_mp::table;

    let region = firmware.read_physical(0xF0000, 0x10000)?;
    let Some((_, floating)) = table::scan(&region, 0xF0000) else {
        return Ok(None);
    };
    if floating.config_table_address == 0 {
        // A default configuration without a table carries too little
        // routing data to drive the APIC.
        return Ok(None);
    }

    // Read the header first to learn the base table length, then the
    // whole table.
    let header = firmware.read_physical(floating.config_table_address, MpConfigTable::HEADER_SIZE)?;
    let base_length = u16::from_le_bytes([header[4], header[5]]) as usize;
    if base_length < MpConfigTable::HEADER_SIZE {
        return Ok(None);
    }
    let data = firmware.read_physical(floating.config_table_address, base_length)?;

    match MpConfigTable::parse(&data) {
        Ok(table) => Ok(Some(MpInfo::from_table(&table))),
        Err(_) => Ok(None),
    }
}

/// Bring up the local APIC and every I/O APIC listed in the MP table,
/// registering one controller per I/O APIC.
///
/// Returns `Ok(false)` when the machine has no usable APIC setup (no MP
/// table, or the system timer is not routed through an I/O APIC), in
/// which case the caller falls back to the legacy PIC.
///
/// # Errors
///
/// Propagates firmware read and device tree errors.
#[cfg(target_os = "none")]
pub fn detect_and_register(
    tree: &mut crate::device::DeviceTree,
    parent: crate::device::DeviceId,
    ctx: &mut crate::device::DetectContext<'_>,
) -> Result<bool, Status> {
    use crate::device::{Device, DeviceClass, DeviceOps, DeviceSubclass};
    use crate::interrupt::{PicDescriptor, PicKind};
    use crate::mm::{PAGE_SIZE, PageAttrs};

    /// `IA32_APIC_BASE` MSR.
    const MSR_APICBASE: u32 = 0x1B;
    /// APIC global enable bit in `IA32_APIC_BASE`.
    const MSR_APICBASE_ENABLE: u64 = 1 << 11;

    let Some(mp) = detect_mp(ctx.firmware)? else {
        return Ok(false);
    };
    if !mp.timer_irq_mapped() {
        crate::kwarn!("apic: system timer not routed through an I/O APIC, using 8259");
        return Ok(false);
    }
    let Some(mmio) = ctx.mmio.as_deref_mut() else {
        return Ok(false);
    };

    // Enable the local APIC at the base advertised in the MSR and map
    // its registers uncacheable.
    // SAFETY: the APIC base MSR exists on every CPU with an MP table.
    let apic_base = unsafe {
        let base = crate::arch::read_msr(MSR_APICBASE);
        crate::arch::write_msr(MSR_APICBASE, base | MSR_APICBASE_ENABLE);
        (base as u32) & 0xFFFF_F000
    };
    let local_virt = mmio.map_physical(
        apic_base,
        PAGE_SIZE,
        PageAttrs::WRITABLE | PageAttrs::UNCACHED,
    )?;
    // SAFETY: just mapped, uncacheable, page-sized.
    let local: Arc<dyn LocalApicAccess> = Arc::new(unsafe { MmioLocalApic::new(local_virt) });

    let mp = Arc::new(mp);
    let logical_dest = enable_local_apic(local.as_ref(), &mp);

    let mut start_irq = 0u8;
    for info in &mp.io_apics {
        let io_virt = mmio.map_physical(
            info.address,
            PAGE_SIZE,
            PageAttrs::WRITABLE | PageAttrs::UNCACHED,
        )?;
        // SAFETY: just mapped, uncacheable, page-sized.
        let io: Arc<dyn IoApicAccess> = Arc::new(unsafe { MmioIoApic::new(info.id, io_virt) });

        let num_irqs = ApicController::slot_count(io.as_ref());
        let controller = Arc::new(ApicController::new(
            local.clone(),
            io,
            mp.clone(),
            start_irq,
            num_irqs,
        ));
        controller.program_slots(logical_dest);

        crate::interrupt::register(PicDescriptor {
            kind: PicKind::IoApic,
            enabled: true,
            start_irq,
            num_irqs,
            ops: controller.clone(),
        });

        tree.add(
            Some(parent),
            Device::new(DeviceClass::Pic, Some(DeviceSubclass::PicApic))
                .with_model("I/O APIC")
                .with_ops(DeviceOps::Pic(controller)),
        )?;

        start_irq += num_irqs;
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::vec;

    #[test]
    fn vector_formula_known_values() {
        assert_eq!(vector_for_irq(0x20, 0), 0xF0);
        assert_eq!(vector_for_irq(0x20, 1), 0xF1);
        assert_eq!(vector_for_irq(0x20, 2), 0xE0);
        assert_eq!(vector_for_irq(0x20, 3), 0xE1);
        assert_eq!(vector_for_irq(0x20, 15), 0x81);
        // Past 28 IRQs the assignment wraps back to the top level.
        assert_eq!(vector_for_irq(0x20, 28), 0xF2);
        assert_eq!(vector_for_irq(0x20, 29), 0xF3);
    }

    #[test]
    fn vector_assignment_round_trips() {
        for irq in 0..128u8 {
            let vector = vector_for_irq(0x20, irq);
            assert_eq!(irq_for_vector(0x20, vector), irq, "irq {irq}");
        }
    }

    #[test]
    fn lower_irqs_get_higher_priority() {
        assert!(vector_for_irq(0x20, 0) > vector_for_irq(0x20, 2));
        assert!(vector_for_irq(0x20, 2) > vector_for_irq(0x20, 4));
    }

    // ── RAM-backed register fakes ────────────────────────────────────

    struct FakeLocal {
        regs: Mutex<[u32; 64]>,
    }

    impl FakeLocal {
        fn new(apic_id: u8) -> Self {
            let mut regs = [0u32; 64];
            regs[(REG_ID / 16) as usize] = u32::from(apic_id) << 24;
            Self {
                regs: Mutex::new(regs),
            }
        }
    }

    impl LocalApicAccess for FakeLocal {
        fn read(&self, offset: u16) -> u32 {
            self.regs.lock().unwrap()[(offset / 16) as usize]
        }
        fn write(&self, offset: u16, value: u32) {
            self.regs.lock().unwrap()[(offset / 16) as usize] = value;
        }
    }

    struct FakeIo {
        id: u8,
        regs: Mutex<[u32; 64]>,
    }

    impl FakeIo {
        fn new(id: u8) -> Self {
            let mut regs = [0u32; 64];
            regs[1] = 23 << 16; // 24 redirection slots
            Self {
                id,
                regs: Mutex::new(regs),
            }
        }
    }

    impl IoApicAccess for FakeIo {
        fn id(&self) -> u8 {
            self.id
        }
        fn read(&self, reg: u8) -> u32 {
            self.regs.lock().unwrap()[reg as usize]
        }
        fn write(&self, reg: u8, value: u32) {
            self.regs.lock().unwrap()[reg as usize] = value;
        }
    }

    fn sample_mp() -> MpInfo {
        MpInfo {
            cpu_apic_ids: vec![0],
            buses: vec![
                BusInfo {
                    id: 0,
                    kind: BusKind::Isa,
                },
                BusInfo {
                    id: 1,
                    kind: BusKind::Pci,
                },
            ],
            io_apics: vec![IoApicInfo {
                id: 2,
                address: 0xFEC0_0000,
            }],
            io_assignments: vec![
                // ISA IRQ 0 (timer) -> pin 2, bus defaults.
                IntAssignment {
                    int_type: IntType::Int,
                    flags: 0,
                    bus: 0,
                    bus_irq: 0,
                    dest: 2,
                    pin: 2,
                },
                // ISA IRQ 1 (keyboard) -> pin 1, bus defaults.
                IntAssignment {
                    int_type: IntType::Int,
                    flags: 0,
                    bus: 0,
                    bus_irq: 1,
                    dest: 2,
                    pin: 1,
                },
                // PCI INTA# of device 3 -> pin 16, bus defaults.
                IntAssignment {
                    int_type: IntType::Int,
                    flags: 0,
                    bus: 1,
                    bus_irq: 3 << 2,
                    dest: 2,
                    pin: 16,
                },
            ],
            local_assignments: vec![
                // ExtINT on LINT0, NMI on LINT1, all CPUs.
                IntAssignment {
                    int_type: IntType::ExtInt,
                    flags: 0,
                    bus: 0,
                    bus_irq: 0,
                    dest: 0xFF,
                    pin: 0,
                },
                IntAssignment {
                    int_type: IntType::Nmi,
                    flags: 0,
                    bus: 0,
                    bus_irq: 0,
                    dest: 0xFF,
                    pin: 1,
                },
            ],
            local_apic_address: 0xFEE0_0000,
        }
    }

    #[test]
    fn local_apic_programming() {
        let local = FakeLocal::new(5);
        let mp = sample_mp();

        let logical_dest = enable_local_apic(&local, &mp);
        assert_eq!(logical_dest, 1 << 5);

        // Spurious register: enabled, vector 0xFF.
        assert_eq!(local.read(REG_SPURINT) & 0x1FF, 0x1FF);
        // Flat model.
        assert_eq!(local.read(REG_DESTFMT) >> 28, 0xF);
        // Logical destination bitmap in the top byte.
        assert_eq!(local.read(REG_LOGDEST) >> 24, u32::from(logical_dest));
        // LINT0 ExtINT, LINT1 NMI.
        assert_eq!(local.read(REG_LVT_LINT0) & DELIVERY_MASK, DELIVERY_EXTINT);
        assert_eq!(local.read(REG_LVT_LINT1) & DELIVERY_MASK, DELIVERY_NMI);
        // Timer stays masked.
        assert_eq!(local.read(REG_LVT_TIMER) & BIT_MASKED, BIT_MASKED);
    }

    #[test]
    fn isa_slots_default_edge_active_high() {
        let io = FakeIo::new(2);
        let mp = sample_mp();
        setup_isa_ints(&io, &mp, 1);

        // Keyboard on pin 1.
        let lo = io.read(0x10 + 1 * 2);
        assert_eq!(lo & BIT_LEVEL, 0);
        assert_eq!(lo & BIT_ACTIVE_LOW, 0);
        assert_eq!(lo & BIT_MASKED, BIT_MASKED);
        assert_eq!(lo & 0xFF, u32::from(vector_for_irq(0x20, 1)));
        let hi = io.read(0x10 + 1 * 2 + 1);
        assert_eq!(hi >> 24, 1);
    }

    #[test]
    fn pci_slots_default_level_active_low() {
        let io = FakeIo::new(2);
        let mp = sample_mp();
        setup_pci_ints(&io, &mp, 0, 1);

        let lo = io.read(0x10 + 16 * 2);
        assert_eq!(lo & BIT_LEVEL, BIT_LEVEL);
        assert_eq!(lo & BIT_ACTIVE_LOW, BIT_ACTIVE_LOW);
        // PCI vectors are pin-based.
        assert_eq!(lo & 0xFF, u32::from(vector_for_irq(0x20, 16)));
    }

    #[test]
    fn controller_translates_and_masks() {
        let local = Arc::new(FakeLocal::new(0));
        let io = Arc::new(FakeIo::new(2));
        let mp = Arc::new(sample_mp());
        let controller = ApicController::new(local, io.clone(), mp, 0, 24);
        controller.program_slots(1);

        // Keyboard: ISA IRQ 1 routes to interrupt number = pin 1.
        assert_eq!(controller.int_number(0, 1), Ok(1));
        assert_eq!(controller.int_number(0, 9), Err(Status::NoSuchEntry));

        // Unmask interrupt 1: the slot carrying its vector loses the
        // mask bit.
        controller.mask(1, true).unwrap();
        assert_eq!(io.read(0x10 + 1 * 2) & BIT_MASKED, 0);
        controller.mask(1, false).unwrap();
        assert_eq!(io.read(0x10 + 1 * 2) & BIT_MASKED, BIT_MASKED);

        // No slot carries interrupt 9.
        assert_eq!(controller.mask(9, true), Err(Status::NoSuchEntry));
    }

    #[test]
    fn get_active_reads_in_service_register() {
        let local = Arc::new(FakeLocal::new(0));
        let io = Arc::new(FakeIo::new(2));
        let mp = Arc::new(sample_mp());
        let controller = ApicController::new(local.clone(), io, mp, 0, 24);

        assert_eq!(controller.get_active(), None);

        // Mark the keyboard vector (0xF1) in service. 0xF1 lives in the
        // ISR register covering 0xE0-0xFF, bit 0x11.
        let vector = vector_for_irq(0x20, 1);
        let reg = REG_ISR + u16::from(vector / 32) * 16;
        local.write(reg, 1 << (vector % 32));
        assert_eq!(controller.get_active(), Some(1));
    }

    #[test]
    fn detect_mp_reads_firmware_copy() {
        use crate::mm::LinearImage;

        // Build a config table with one ISA bus and the timer assignment.
        let mut entries = vec![1u8, 0];
        entries.extend_from_slice(b"ISA   ");
        entries.extend_from_slice(&[2, 3, 0x11, 0x01]);
        entries.extend_from_slice(&0xFEC0_0000u32.to_le_bytes());
        entries.extend_from_slice(&[3, 0, 0, 0, 0, 0, 3, 2]);

        let mut table = vec![0u8; MpConfigTable::HEADER_SIZE];
        table[0..4].copy_from_slice(b"PCMP");
        table[6] = 4;
        table[34..36].copy_from_slice(&3u16.to_le_bytes());
        table[36..40].copy_from_slice(&0xFEE0_0000u32.to_le_bytes());
        table.extend_from_slice(&entries);
        let base_len = table.len() as u16;
        table[4..6].copy_from_slice(&base_len.to_le_bytes());
        let sum: u8 = table.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        table[7] = 0u8.wrapping_sub(sum);

        // Lay out the region: floating pointer at +0x40, table at +0x800.
        let mut region = vec![0u8; 0x10000];
        let table_phys = 0xF0000u32 + 0x800;
        let mut fp = [0u8; 16];
        fp[0..4].copy_from_slice(b"_MP_");
        fp[4..8].copy_from_slice(&table_phys.to_le_bytes());
        fp[8] = 1;
        fp[9] = 4;
        let sum: u8 = fp.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        fp[10] = 0u8.wrapping_sub(sum);
        region[0x40..0x50].copy_from_slice(&fp);
        region[0x800..0x800 + table.len()].copy_from_slice(&table);

        let mut firmware = LinearImage::new(0xF0000, region);
        let mp = detect_mp(&mut firmware).unwrap().unwrap();
        assert_eq!(mp.local_apic_address, 0xFEE0_0000);
        assert_eq!(mp.io_apics.len(), 1);
        assert_eq!(mp.io_apics[0].id, 3);
        assert!(mp.timer_irq_mapped());
    }

    #[test]
    fn timer_mapping_detection() {
        let mp = sample_mp();
        assert!(mp.timer_irq_mapped());

        let mut no_timer = sample_mp();
        no_timer.io_assignments.retain(|a| a.bus_irq != 0 || a.bus != 0);
        assert!(!no_timer.timer_irq_mapped());
    }
}
