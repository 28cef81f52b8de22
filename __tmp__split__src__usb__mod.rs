//! USB host stack (spec.md 4.6, 8 scenario 5).
//!
//! The controller layer is polymorphic over UHCI/OHCI/EHCI behind a
//! two-method trait (spec.md 9 "controller polymorphism": "model as a
//! sum-of-variants ... or as a trait object with a stable vtable — not
//! as inheritance"); this module takes the trait-object route since the
//! device layer (`enumeration`) only ever needs `control_transfer` and
//! `interrupt_transfer`, and a trait object lets the enumeration state
//! machine and its tests run against a mock controller with no MMIO at
//! all. Variant-specific register layouts and TD/QH memory live in
//! `drivers::usb_hc` (hardware-gated); this module only models the
//! shapes the spec names: devices, descriptors, and the state machine.

pub mod controller;
pub mod descriptor;
pub mod enumeration;
pub mod hid;

pub use controller::{Speed, TransferDirection, UsbController, UsbError};
pub use descriptor::{ConfigDescriptor, DeviceDescriptor, EndpointDescriptor, InterfaceDescriptor};
pub use enumeration::{DeviceState, UsbDevice};

/// Controller family, spec.md 3 "USB controller". XHCI is named in the
/// data model's `kind` enumeration but has no driver in spec.md 4.6's
/// scope (UHCI/OHCI/EHCI only) — kept here so a scanner hit on an XHCI
/// function can still be recorded as "present, unsupported" rather than
/// silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    Uhci,
    Ohci,
    Ehci,
    Xhci,
}

impl ControllerKind {
    /// Maps a PCI USB controller's prog-if byte (class 0x0C, subclass
    /// 0x03) to a controller kind, per spec.md 4.6.
    pub fn from_prog_if(prog_if: u8) -> Option<ControllerKind> {
        match prog_if {
            0x00 => Some(ControllerKind::Uhci),
            0x10 => Some(ControllerKind::Ohci),
            0x20 => Some(ControllerKind::Ehci),
            0x30 => Some(ControllerKind::Xhci),
            _ => None,
        }
    }
}

