//! Legacy 8259A PIC driver.
//!
//! The fallback interrupt controller on machines without usable APIC
//! tables. The master/slave pair is remapped so that IRQ 0 lands on
//! [`VECTOR_START`](super::VECTOR_START) instead of colliding with CPU
//! exceptions, and ISA IRQ numbers map one-to-one onto global interrupt
//! numbers 0-15.

use crate::arch::Port;
use crate::device::PicOps;
use crate::interrupt::VECTOR_START;
use crate::status::Status;

const PIC1_CMD: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_CMD: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

/// ICW1: initialize + ICW4 needed.
const ICW1_INIT: u8 = 0x11;
/// ICW4: 8086 mode.
const ICW4_8086: u8 = 0x01;
/// OCW2: non-specific end of interrupt.
const OCW2_EOI: u8 = 0x20;
/// OCW3: read the in-service register on the next data read.
const OCW3_READ_ISR: u8 = 0x0B;

/// Number of IRQ inputs across the pair.
pub const NUM_IRQS: u8 = 16;

/// Driver for the 8259A master/slave pair.
pub struct Pic8259 {
    vector_start: u8,
}

impl Pic8259 {
    /// Create the driver. Call [`remap`](Self::remap) before enabling
    /// interrupts.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            vector_start: VECTOR_START,
        }
    }

    /// Remap the pair to `vector_start..vector_start+16` and mask every
    /// line except the cascade.
    ///
    /// # Safety
    ///
    /// Must run with interrupts disabled, once, during controller
    /// initialisation.
    #[cfg(target_os = "none")]
    pub unsafe fn remap(&self) {
        let pic1_cmd = Port::<u8>::new(PIC1_CMD);
        let pic1_data = Port::<u8>::new(PIC1_DATA);
        let pic2_cmd = Port::<u8>::new(PIC2_CMD);
        let pic2_data = Port::<u8>::new(PIC2_DATA);

        // SAFETY: standard 8259 initialisation sequence with interrupts off.
        unsafe {
            pic1_cmd.write(ICW1_INIT);
            io_wait();
            pic2_cmd.write(ICW1_INIT);
            io_wait();

            // ICW2: vector offsets.
            pic1_data.write(self.vector_start);
            io_wait();
            pic2_data.write(self.vector_start + 8);
            io_wait();

            // ICW3: slave on IRQ2.
            pic1_data.write(4);
            io_wait();
            pic2_data.write(2);
            io_wait();

            pic1_data.write(ICW4_8086);
            io_wait();
            pic2_data.write(ICW4_8086);
            io_wait();

            // Mask everything except the cascade line.
            pic1_data.write(0xFB);
            pic2_data.write(0xFF);
        }
    }
}

impl Default for Pic8259 {
    fn default() -> Self {
        Self::new()
    }
}

impl PicOps for Pic8259 {
    fn int_number(&self, bus_id: u8, bus_irq: u8) -> Result<u8, Status> {
        // The legacy PIC only knows the ISA bus (id 0), where bus IRQs
        // are global interrupt numbers.
        if bus_id == 0 && bus_irq < NUM_IRQS {
            Ok(bus_irq)
        } else {
            Err(Status::NoSuchEntry)
        }
    }

    fn vector(&self, int_number: u8) -> Result<u8, Status> {
        if int_number < NUM_IRQS {
            Ok(self.vector_start + int_number)
        } else {
            Err(Status::NoSuchEntry)
        }
    }

    fn end_of_interrupt(&self, int_number: u8) {
        // SAFETY: OCW2 EOI writes are the defined acknowledge protocol.
        unsafe {
            if int_number >= 8 {
                Port::<u8>::new(PIC2_CMD).write(OCW2_EOI);
            }
            Port::<u8>::new(PIC1_CMD).write(OCW2_EOI);
        }
    }

    fn mask(&self, int_number: u8, on: bool) -> Result<(), Status> {
        if int_number >= NUM_IRQS {
            return Err(Status::NoSuchEntry);
        }
        let (port, bit) = if int_number < 8 {
            (Port::<u8>::new(PIC1_DATA), int_number)
        } else {
            (Port::<u8>::new(PIC2_DATA), int_number - 8)
        };
        // SAFETY: read-modify-write of the interrupt mask register.
        unsafe {
            let current = port.read();
            if on {
                port.write(current & !(1 << bit));
            } else {
                port.write(current | (1 << bit));
            }
        }
        Ok(())
    }

    fn get_active(&self) -> Option<u8> {
        // SAFETY: OCW3 selects the ISR for the next read on each chip.
        let (isr1, isr2) = unsafe {
            let cmd1 = Port::<u8>::new(PIC1_CMD);
            let cmd2 = Port::<u8>::new(PIC2_CMD);
            cmd1.write(OCW3_READ_ISR);
            cmd2.write(OCW3_READ_ISR);
            (cmd1.read(), cmd2.read())
        };
        let in_service = u16::from(isr1) | (u16::from(isr2) << 8);
        if in_service == 0 {
            None
        } else {
            Some(in_service.trailing_zeros() as u8)
        }
    }

    fn disable(&self) {
        // SAFETY: masking every line stops delivery from both chips.
        unsafe {
            Port::<u8>::new(PIC1_DATA).write(0xFF);
            Port::<u8>::new(PIC2_DATA).write(0xFF);
        }
    }
}

/// Small I/O delay by writing to the POST diagnostic port.
#[cfg(target_os = "none")]
#[inline]
fn io_wait() {
    let port = Port::<u8>::new(0x80);
    // SAFETY: port 0x80 writes are harmless and give old chips settle time.
    unsafe { port.write(0) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isa_irqs_map_identity() {
        let pic = Pic8259::new();
        assert_eq!(pic.int_number(0, 6), Ok(6));
        assert_eq!(pic.int_number(1, 6), Err(Status::NoSuchEntry));
        assert_eq!(pic.int_number(0, 16), Err(Status::NoSuchEntry));
    }

    #[test]
    fn vectors_offset_past_exceptions() {
        let pic = Pic8259::new();
        assert_eq!(pic.vector(0), Ok(VECTOR_START));
        assert_eq!(pic.vector(15), Ok(VECTOR_START + 15));
        assert_eq!(pic.vector(16), Err(Status::NoSuchEntry));
    }
}
