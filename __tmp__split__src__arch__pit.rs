//! Live PIT programming and the global tick counter the IRQ0 handler
//! drives (spec.md 4.2 "the timer handler increments a monotonic tick
//! counter and posts an `EVENT_TIMER_TICK` every 10 ticks"). Thin wrapper
//! over the pure [`crate::pit`] the way `arch::pic` wraps `crate::pic`.

use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use crate::pit::TickCounter;

use super::port::Io;

static INITIALIZED: AtomicBool = AtomicBool::new(false);
static TICKS: Mutex<TickCounter> = Mutex::new(TickCounter::new());

/// # Safety
/// Must run after `arch::pic::init` and before interrupts are enabled,
/// so the first tick is never lost to an unprogrammed PIC mask.
pub unsafe fn init(frequency_hz: u32) {
    let mut io = Io::new();
    crate::pit::program(&mut io, frequency_hz);
    INITIALIZED.store(true, Ordering::Release);
}

pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::Acquire)
}

/// Called from the IRQ0 handler installed in `kernel_main`; advances the
/// global tick counter and reports whether this tick should post the
/// logical `EVENT_TIMER_TICK`.
pub fn tick() -> bool {
    TICKS.lock().tick()
}

pub fn ticks() -> u64 {
    TICKS.lock().ticks()
}


