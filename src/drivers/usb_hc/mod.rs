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

/// Per-(address, endpoint) DATA0/DATA1 toggle cache for the variants
/// whose controller does not track it in hardware (UHCI and EHCI; OHCI
/// defers to `TD_TOGGLE_FROM_TD` instead). Spec.md 4.6 "data toggle
/// starts at 0 on both directions and flips after every successful
/// data-phase transfer on that endpoint" — this is the device layer's
/// repeated IN polling case (`interrupt_transfer`), since control
/// transfers reset toggle state to 0/1/0 per the fixed SETUP/DATA/STATUS
/// sequence and never need to remember it across calls.
pub(crate) struct ToggleTable {
    entries: [(u8, u8, bool); 16],
    len: usize,
}

impl ToggleTable {
    pub(crate) const fn new() -> ToggleTable {
        ToggleTable {
            entries: [(0, 0, false); 16],
            len: 0,
        }
    }

    /// Returns the toggle bit to use for this IN transaction and advances
    /// it for next time. Unseen (address, endpoint) pairs start at
    /// DATA0, evicting the oldest entry if the table is full — this
    /// kernel never has more than a handful of resident HID endpoints.
    pub(crate) fn next(&mut self, address: u8, endpoint: u8) -> bool {
        if let Some(slot) = self.entries[..self.len]
            .iter_mut()
            .find(|(a, e, _)| *a == address && *e == endpoint)
        {
            let current = slot.2;
            slot.2 = !current;
            return current;
        }
        let idx = if self.len < self.entries.len() {
            let i = self.len;
            self.len += 1;
            i
        } else {
            0
        };
        self.entries[idx] = (address, endpoint, true);
        false
    }
}
