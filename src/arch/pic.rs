//! Live 8259 remap (spec.md 4.2). Thin wrapper over the pure
//! [`crate::pic::remap`]/[`crate::pic::send_eoi`] the way `arch::gdt` and
//! `arch::idt` wrap their respective pure-logic modules.

use core::sync::atomic::{AtomicBool, Ordering};

use super::port::Io;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// # Safety
/// Must run once, early in boot, before `arch::idt::init` unmasks any
/// IRQ by installing a handler.
pub unsafe fn init() {
    let mut io = Io::new();
    crate::pic::remap(&mut io);
    INITIALIZED.store(true, Ordering::Release);
}

pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::Acquire)
}
