//! Uptime tick counter and date/time source.
//!
//! The system timer interrupt calls [`tick`] at `TICKS_PER_SECOND`; uptime
//! and lock timeouts are derived from the counter. Calendar time is seeded
//! once from the RTC at boot ([`set_boot_time`]) and carried forward from
//! uptime, packed in the DOS on-disk format the filesystem facade stores.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Scheduler tick rate.
pub const TICKS_PER_SECOND: u64 = 100;

static TICKS: AtomicU64 = AtomicU64::new(0);
static BOOT_DATE: AtomicU32 = AtomicU32::new(0);
static BOOT_TIME: AtomicU32 = AtomicU32::new(0);

/// Advance the uptime counter by one tick. Called from the timer interrupt.
pub fn tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

/// Uptime in scheduler ticks.
#[must_use]
pub fn uptime_ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Uptime in whole seconds.
#[must_use]
pub fn uptime_seconds() -> u32 {
    (uptime_ticks() / TICKS_PER_SECOND) as u32
}

/// Pack a calendar date in the DOS on-disk format.
///
/// Bits 15-9 are the year since 1980, 8-5 the month, 4-0 the day.
#[must_use]
pub fn pack_date(year: u16, month: u8, day: u8) -> u16 {
    (year.saturating_sub(1980) << 9) | (u16::from(month & 0x0F) << 5) | u16::from(day & 0x1F)
}

/// Pack a time of day in the DOS on-disk format.
///
/// Bits 15-11 are hours, 10-5 minutes, 4-0 seconds divided by two.
#[must_use]
pub fn pack_time(hours: u8, minutes: u8, seconds: u8) -> u16 {
    (u16::from(hours & 0x1F) << 11) | (u16::from(minutes & 0x3F) << 5) | u16::from((seconds / 2) & 0x1F)
}

/// Unpack a DOS-format date into `(year, month, day)`.
#[must_use]
pub fn unpack_date(packed: u16) -> (u16, u8, u8) {
    (
        1980 + (packed >> 9),
        ((packed >> 5) & 0x0F) as u8,
        (packed & 0x1F) as u8,
    )
}

/// Unpack a DOS-format time into `(hours, minutes, seconds)`.
#[must_use]
pub fn unpack_time(packed: u16) -> (u8, u8, u8) {
    (
        (packed >> 11) as u8,
        ((packed >> 5) & 0x3F) as u8,
        ((packed & 0x1F) as u8) * 2,
    )
}

/// Record the RTC reading taken at boot, in packed DOS format.
pub fn set_boot_time(date: u16, time: u16) {
    BOOT_DATE.store(u32::from(date), Ordering::Relaxed);
    BOOT_TIME.store(u32::from(time), Ordering::Relaxed);
}

/// Read the CMOS real-time clock and seed the boot time from it.
///
/// # Safety
///
/// Must run with interrupts disabled, before any other CMOS user.
#[cfg(target_os = "none")]
pub unsafe fn init_from_rtc() {
    use crate::arch::Port;

    const CMOS_INDEX: u16 = 0x70;
    const CMOS_DATA: u16 = 0x71;

    fn bcd(value: u8) -> u8 {
        (value >> 4) * 10 + (value & 0x0F)
    }

    let index = Port::<u8>::new(CMOS_INDEX);
    let data = Port::<u8>::new(CMOS_DATA);

    // SAFETY: standard CMOS index/data protocol; caller holds interrupts
    // off so the pair cannot be split.
    let read = |register: u8| -> u8 {
        unsafe {
            index.write(register);
            data.read()
        }
    };

    // Wait out an update cycle so the fields are consistent.
    while read(0x0A) & 0x80 != 0 {}

    let seconds = bcd(read(0x00));
    let minutes = bcd(read(0x02));
    let hours = bcd(read(0x04));
    let day = bcd(read(0x07));
    let month = bcd(read(0x08));
    let year = 2000 + u16::from(bcd(read(0x09)));

    set_boot_time(pack_date(year, month, day), pack_time(hours, minutes, seconds));
}

/// Current date and time in packed DOS format.
///
/// Derived from the boot reading plus uptime; day rollover past the boot
/// date is folded into the day field without calendar arithmetic, which is
/// adequate for file timestamps between reboots.
#[must_use]
pub fn date_time() -> (u16, u16) {
    let date = BOOT_DATE.load(Ordering::Relaxed) as u16;
    let time = BOOT_TIME.load(Ordering::Relaxed) as u16;

    let (bh, bm, bs) = unpack_time(time);
    let elapsed = u64::from(bh) * 3600 + u64::from(bm) * 60 + u64::from(bs)
        + u64::from(uptime_seconds());

    let days = (elapsed / 86_400) as u16;
    let rem = elapsed % 86_400;
    let (year, month, day) = unpack_date(date);

    (
        pack_date(year, month, day.saturating_add(days as u8)),
        pack_time((rem / 3600) as u8, ((rem % 3600) / 60) as u8, (rem % 60) as u8),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_packing_round_trips() {
        let packed = pack_date(2004, 11, 23);
        assert_eq!(unpack_date(packed), (2004, 11, 23));
    }

    #[test]
    fn time_packing_loses_odd_seconds() {
        let packed = pack_time(13, 59, 31);
        assert_eq!(unpack_time(packed), (13, 59, 30));
    }

    #[test]
    fn uptime_advances_with_ticks() {
        let before = uptime_ticks();
        tick();
        tick();
        assert!(uptime_ticks() >= before + 2);
    }
}
