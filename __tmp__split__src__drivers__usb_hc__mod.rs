//! USB host controller variants (spec.md 4.6, 9 "controller polymorphism",
//! 6 "Register offsets per spec"). Each submodule owns one variant's
//! register file and DMA-visible TD/QH layout and implements
//! [`crate::usb::UsbController`]; `drivers::pci::scan` plus
//! `usb::ControllerKind::from_prog_if` decide which one to instantiate for
//! a given PCI function.

pub mod ehci;
pub mod ohci;
pub mod uhci;

/// Poll budget shared by all three variants' register-bit spins (spec.md
/// 4.6 "Poll each descriptor's status word with a 100 ms timeout"; a
/// fixed iteration count stands in for wall-clock time the same way
/// `crate::ata::POLL_BUDGET` does, since there is no cheap calibrated
/// busy-wait at this layer).
pub(crate) const POLL_BUDGET: u32 = 2_000_000;

/// A thin volatile accessor over one MMIO register file (OHCI/EHCI, BAR0
/// memory-mapped; spec.md 9 "Raw pointers to MMIO... wrap each register
/// block in a typed newtype exposing only the operations spec permits").
#[derive(Clone, Copy)]
pub(crate) struct Mmio {
    base: *mut u8,
}

impl Mmio {
    /// # Safety
    /// `base` must be the start of a valid, mapped MMIO register block.
    pub(crate) unsafe fn new(base: u32) -> Mmio {
        Mmio { base: base as usize as *mut u8 }
    }

    pub(crate) fn read32(&self, offset: u32) -> u32 {
        unsafe { core::ptr::read_volatile(self.base.add(offset as usize) as *const u32) }
    }

    pub(crate) fn write32(&self, offset: u32, value: u32) {
        unsafe { core::ptr::write_volatile(self.base.add(offset as usize) as *mut u32, value) }
    }

    pub(crate) fn read8(&self, offset: u32) -> u8 {
        unsafe { core::ptr::read_volatile(self.base.add(offset as usize)) }
    }
}


