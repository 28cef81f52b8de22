//! The controller-facing trait shared by UHCI/OHCI/EHCI (spec.md 4.6, 9).
//!
//! Real register/TD/QH layouts live in `drivers::usb_hc` behind
//! `cfg(target_os = "none")`; this trait is the stable two-method seam
//! the device-enumeration state machine programs against, which is what
//! lets `enumeration` be unit-tested with a plain in-memory mock.

use crate::usb::descriptor::SetupPacket;
use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    Low,
    Full,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    In,
    Out,
}

impl TransferDirection {
    /// Derives direction from the data phase, not the device — spec.md 9
    /// open question 1: "status direction should be derived from data
    /// direction regardless of device."
    pub fn from_setup(setup: &SetupPacket) -> TransferDirection {
        if setup.w_length == 0 {
            // No data phase: status is always the opposite of a
            // nonexistent IN data stage, which collapses to OUT.
            TransferDirection::Out
        } else if setup.is_device_to_host() {
            TransferDirection::In
        } else {
            TransferDirection::Out
        }
    }

    pub fn opposite(self) -> TransferDirection {
        match self {
            TransferDirection::In => TransferDirection::Out,
            TransferDirection::Out => TransferDirection::In,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbError {
    Timeout,
    Stall,
    ControllerDisabled,
}

/// The two operations every host-controller variant exposes to the
/// device layer (spec.md 4.6).
pub trait UsbController {
    /// Performs a control transfer to `address`, endpoint 0. `buf` is
    /// both the OUT payload source (when `setup` is host-to-device with
    /// data) and the IN destination (when device-to-host); its length
    /// must equal `setup.w_length`. Returns bytes transferred or an
    /// error (spec.md 4.6 steps 1-6).
    fn control_transfer(
        &mut self,
        address: u8,
        setup: SetupPacket,
        buf: &mut [u8],
    ) -> Result<usize, UsbError>;

    /// Polls an interrupt endpoint once, per spec.md 4.6's HID polling
    /// description. `timeout_ms` bounds the controller's own poll loop.
    fn interrupt_transfer(
        &mut self,
        address: u8,
        endpoint: u8,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<usize, UsbError>;
}

/// A software stand-in used by tests and by the happy-path scenario in
/// spec.md 8 scenario 5: records every control transfer issued against
/// it and replays canned device/config descriptor bytes.
#[cfg(test)]
pub(crate) struct MockController {
    pub calls: Vec<(u8, SetupPacket)>,
    pub device_descriptor: [u8; 18],
    pub config_descriptor: Vec<u8>,
    pub fail_after: Option<usize>,
}

#[cfg(test)]
impl MockController {
    pub fn new(device_descriptor: [u8; 18], config_descriptor: Vec<u8>) -> MockController {
        MockController {
            calls: Vec::new(),
            device_descriptor,
            config_descriptor,
            fail_after: None,
        }
    }
}

#[cfg(test)]
impl UsbController for MockController {
    fn control_transfer(
        &mut self,
        address: u8,
        setup: SetupPacket,
        buf: &mut [u8],
    ) -> Result<usize, UsbError> {
        use crate::usb::descriptor::{
            REQUEST_GET_DESCRIPTOR, REQUEST_SET_ADDRESS, REQUEST_SET_CONFIGURATION,
        };
        self.calls.push((address, setup));
        if let Some(n) = self.fail_after {
            if self.calls.len() > n {
                return Err(UsbError::Timeout);
            }
        }
        match setup.b_request {
            REQUEST_GET_DESCRIPTOR => {
                let descriptor_type = (setup.w_value >> 8) as u8;
                let src: &[u8] = if descriptor_type == 0x01 {
                    &self.device_descriptor
                } else {
                    &self.config_descriptor
                };
                let n = buf.len().min(src.len());
                buf[..n].copy_from_slice(&src[..n]);
                Ok(n)
            }
            REQUEST_SET_ADDRESS | REQUEST_SET_CONFIGURATION => Ok(0),
            _ => Ok(0),
        }
    }

    fn interrupt_transfer(
        &mut self,
        _address: u8,
        _endpoint: u8,
        _buf: &mut [u8],
        _timeout_ms: u32,
    ) -> Result<usize, UsbError> {
        Err(UsbError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::descriptor::SetupPacket;

    #[test]
    fn status_direction_derives_from_data_phase() {
        let no_data = SetupPacket::set_address(1);
        assert_eq!(TransferDirection::from_setup(&no_data), TransferDirection::Out);

        let read = SetupPacket::get_descriptor(0x01, 0, 18);
        assert_eq!(TransferDirection::from_setup(&read), TransferDirection::In);
    }
}
