//! Live CMOS/RTC wrapper (spec.md 1 "the CMOS driver (supplies wall-clock
//! reads)"). Thin glue over [`crate::rtc::read_datetime`]: the NMI
//! discipline the pure routine assumes its caller upholds is enforced
//! here with [`crate::arch::port::without_interrupts`].

use crate::arch::port::{without_interrupts, Io};
use crate::rtc::DateTime;

/// Century register is present on every CMOS implementation QEMU/Bochs
/// emulate; real hardware without one falls back to the pure routine's
/// `DEFAULT_CENTURY` constant, which this kernel never needs to special
/// case since it only targets those two emulators (spec.md 1's scope).
const HAS_CENTURY_REGISTER: bool = true;

pub fn now() -> DateTime {
    without_interrupts(|| {
        let mut io = Io::new();
        crate::rtc::read_datetime(&mut io, HAS_CENTURY_REGISTER)
    })
}


