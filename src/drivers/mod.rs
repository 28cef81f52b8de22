//! Live hardware drivers: real port/MMIO access wired onto the pure
//! always-available decoders (`crate::ata`, `crate::pci`, `crate::ps2`,
//! `crate::rtc`), plus the framebuffer compositor and USB host
//! controllers that have no pure counterpart to wrap.

pub mod ata;
pub mod pci;
pub mod ps2;
pub mod rtc;
pub mod usb_hc;
pub mod vesa;
