//! Device enumeration state machine (spec.md 4.6, 8 scenario 5).

use crate::usb::controller::{Speed, TransferDirection, UsbController, UsbError};
use crate::usb::descriptor::{
    ConfigDescriptor, DeviceDescriptor, SetupPacket, DESCRIPTOR_TYPE_CONFIGURATION,
    DESCRIPTOR_TYPE_DEVICE,
};
use alloc::vec;
use alloc::vec::Vec;

const MAX_ADDRESS: u8 = 127;
const CONFIG_BUFFER_SIZE: usize = 256;
const HID_CLASS: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Connected,
    Describe0,
    Addressed,
    Described,
    Configured,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DataToggle {
    pub in_toggle: bool,
    pub out_toggle: bool,
}

impl DataToggle {
    pub fn flip(&mut self, dir: TransferDirection) {
        match dir {
            TransferDirection::In => self.in_toggle = !self.in_toggle,
            TransferDirection::Out => self.out_toggle = !self.out_toggle,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HidInfo {
    pub interface_number: u8,
    pub in_endpoint: u8,
    pub report_size: u16,
}

/// One USB device slot, spec.md 3 "USB device". Address 0 means "the
/// currently-enumerating device" (not yet assigned a real address).
pub struct UsbDevice {
    pub present: bool,
    pub address: u8,
    pub speed: Speed,
    pub state: DeviceState,
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_class: u8,
    pub max_packet_size0: u8,
    pub config: Option<ConfigDescriptor>,
    pub toggles: Vec<DataToggle>,
    pub hid: Option<HidInfo>,
}

impl UsbDevice {
    pub fn new(speed: Speed) -> UsbDevice {
        UsbDevice {
            present: false,
            address: 0,
            speed,
            state: DeviceState::Connected,
            vendor_id: 0,
            product_id: 0,
            device_class: 0,
            max_packet_size0: 8,
            config: None,
            toggles: Vec::new(),
            hid: None,
        }
    }
}

/// Allocates the next free device address, wrapping at 127 back to 1
/// (spec.md 4.6 "address allocation wraps at 127").
pub struct AddressAllocator {
    next: u8,
}

impl AddressAllocator {
    pub fn new() -> AddressAllocator {
        AddressAllocator { next: 1 }
    }

    pub fn allocate(&mut self) -> u8 {
        let addr = self.next;
        self.next = if self.next >= MAX_ADDRESS {
            1
        } else {
            self.next + 1
        };
        addr
    }
}

impl Default for AddressAllocator {
    fn default() -> Self {
        AddressAllocator::new()
    }
}

/// Drives one device through `CONNECTED -> ... -> READY | FAILED`
/// against any `UsbController`, per spec.md 4.6's state diagram. On any
/// step's error or timeout the device transitions to `FAILED` and
/// `present` is cleared.
pub fn enumerate(
    ctrl: &mut dyn UsbController,
    device: &mut UsbDevice,
    addresses: &mut AddressAllocator,
) {
    device.state = DeviceState::Connected;

    // CONNECTED -> DESCRIBE0 : GET_DESCRIPTOR(DEVICE, 8) @ address 0
    let mut buf8 = [0u8; 8];
    let setup = SetupPacket::get_descriptor(DESCRIPTOR_TYPE_DEVICE, 0, 8);
    if ctrl.control_transfer(0, setup, &mut buf8).is_err() {
        return fail(device);
    }
    let Some(partial) = DeviceDescriptor::parse_partial(&buf8) else {
        return fail(device);
    };
    device.max_packet_size0 = partial.max_packet_size0;
    device.state = DeviceState::Describe0;

    // DESCRIBE0 -> ADDRESSED : SET_ADDRESS(next free 1..127)
    let new_address = addresses.allocate();
    let mut empty = [0u8; 0];
    let setup = SetupPacket::set_address(new_address);
    if ctrl.control_transfer(0, setup, &mut empty).is_err() {
        return fail(device);
    }
    device.address = new_address;
    device.state = DeviceState::Addressed;

    // ADDRESSED -> DESCRIBED : GET_DESCRIPTOR(DEVICE, full)
    let mut buf18 = [0u8; 18];
    let setup = SetupPacket::get_descriptor(DESCRIPTOR_TYPE_DEVICE, 0, 18);
    if ctrl
        .control_transfer(device.address, setup, &mut buf18)
        .is_err()
    {
        return fail(device);
    }
    let Some(full) = DeviceDescriptor::parse_full(&buf18) else {
        return fail(device);
    };
    device.vendor_id = full.vendor_id;
    device.product_id = full.product_id;
    device.device_class = full.device_class;
    device.state = DeviceState::Described;

    // DESCRIBED -> CONFIGURED : GET_DESCRIPTOR(CONFIG, buffer), parse
    let mut config_buf = vec![0u8; CONFIG_BUFFER_SIZE];
    let setup = SetupPacket::get_descriptor(DESCRIPTOR_TYPE_CONFIGURATION, 0, CONFIG_BUFFER_SIZE as u16);
    if ctrl
        .control_transfer(device.address, setup, &mut config_buf)
        .is_err()
    {
        return fail(device);
    }
    let Some(config) = ConfigDescriptor::parse(&config_buf) else {
        return fail(device);
    };

    let hid = config
        .interfaces
        .iter()
        .find(|iface| iface.interface_class == HID_CLASS)
        .and_then(|iface| {
            iface
                .endpoints
                .iter()
                .find(|ep| ep.is_in() && ep.is_interrupt())
                .map(|ep| HidInfo {
                    interface_number: iface.interface_number,
                    in_endpoint: ep.number(),
                    report_size: ep.max_packet_size,
                })
        });

    let toggles = config
        .interfaces
        .iter()
        .map(|i| i.endpoints.len())
        .sum::<usize>();
    device.toggles = vec![DataToggle::default(); toggles.max(1)];
    device.config = Some(config);
    device.hid = hid;
    device.state = DeviceState::Configured;

    // CONFIGURED -> READY : SET_CONFIGURATION(1); if HID, SET_PROTOCOL(boot)
    let mut empty = [0u8; 0];
    let setup = SetupPacket::set_configuration(1);
    if ctrl
        .control_transfer(device.address, setup, &mut empty)
        .is_err()
    {
        return fail(device);
    }
    if let Some(hid) = device.hid {
        let setup = SetupPacket::set_protocol_boot(hid.interface_number as u16);
        if ctrl
            .control_transfer(device.address, setup, &mut empty)
            .is_err()
        {
            return fail(device);
        }
    }

    device.present = true;
    device.state = DeviceState::Ready;
}

fn fail(device: &mut UsbDevice) {
    device.state = DeviceState::Failed;
    device.present = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::controller::MockController;
    use crate::usb::descriptor::{
        REQUEST_GET_DESCRIPTOR, REQUEST_SET_ADDRESS, REQUEST_SET_CONFIGURATION,
    };

    fn sample_device_descriptor() -> [u8; 18] {
        let mut d = [0u8; 18];
        d[0] = 18;
        d[1] = DESCRIPTOR_TYPE_DEVICE;
        d[7] = 64;
        d[8..10].copy_from_slice(&0x046Du16.to_le_bytes());
        d[10..12].copy_from_slice(&0xC077u16.to_le_bytes());
        d
    }

    fn sample_config_descriptor() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&[9, 0x02, 0, 0, 1, 1, 0, 0, 0]);
        buf.extend_from_slice(&[9, 0x04, 0, 0, 1, HID_CLASS, 1, 2, 0]);
        buf.extend_from_slice(&[7, 0x05, 0x81, 0x03, 4, 0, 10]);
        let total = buf.len() as u16;
        buf[2..4].copy_from_slice(&total.to_le_bytes());
        buf
    }

    #[test]
    fn happy_path_enumeration_scenario() {
        let mut ctrl = MockController::new(sample_device_descriptor(), sample_config_descriptor());
        let mut device = UsbDevice::new(Speed::High);
        let mut addrs = AddressAllocator::new();

        enumerate(&mut ctrl, &mut device, &mut addrs);

        assert_eq!(device.state, DeviceState::Ready);
        assert!(device.present);
        assert_eq!(device.address, 1);
        assert!(device.config.is_some());
        assert!(device.hid.is_some());

        // spec.md 8 scenario 5: exact call order.
        let order: Vec<(u8, u8, u8)> = ctrl
            .calls
            .iter()
            .map(|(addr, setup)| (*addr, setup.b_request, (setup.w_value >> 8) as u8))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, REQUEST_GET_DESCRIPTOR, DESCRIPTOR_TYPE_DEVICE),
                (0, REQUEST_SET_ADDRESS, 0),
                (1, REQUEST_GET_DESCRIPTOR, DESCRIPTOR_TYPE_DEVICE),
                (1, REQUEST_GET_DESCRIPTOR, DESCRIPTOR_TYPE_CONFIGURATION),
                (1, REQUEST_SET_CONFIGURATION, 0),
                (1, 0x0B, 0), // SET_PROTOCOL(boot)
            ]
        );
    }

    #[test]
    fn failure_marks_device_not_present() {
        let mut ctrl = MockController::new(sample_device_descriptor(), sample_config_descriptor());
        ctrl.fail_after = Some(0);
        let mut device = UsbDevice::new(Speed::Full);
        let mut addrs = AddressAllocator::new();
        enumerate(&mut ctrl, &mut device, &mut addrs);
        assert_eq!(device.state, DeviceState::Failed);
        assert!(!device.present);
    }

    #[test]
    fn address_allocator_wraps_at_127() {
        let mut a = AddressAllocator::new();
        for expected in 1..=127u8 {
            assert_eq!(a.allocate(), expected);
        }
        assert_eq!(a.allocate(), 1);
    }

    #[test]
    fn data_toggle_flips_on_successful_transfer() {
        let mut t = DataToggle::default();
        t.flip(TransferDirection::In);
        assert!(t.in_toggle);
        assert!(!t.out_toggle);
        t.flip(TransferDirection::In);
        assert!(!t.in_toggle);
    }
}


