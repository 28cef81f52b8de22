//! USB descriptor wire formats and parsing (spec.md 4.6, 6).

/// The 8-byte SETUP packet carried by every control transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPacket {
    pub bm_request_type: u8,
    pub b_request: u8,
    pub w_value: u16,
    pub w_index: u16,
    pub w_length: u16,
}

pub const REQUEST_TYPE_DEVICE_TO_HOST: u8 = 0x80;
pub const REQUEST_GET_DESCRIPTOR: u8 = 0x06;
pub const REQUEST_SET_ADDRESS: u8 = 0x05;
pub const REQUEST_SET_CONFIGURATION: u8 = 0x09;
pub const REQUEST_SET_PROTOCOL: u8 = 0x0B;

pub const DESCRIPTOR_TYPE_DEVICE: u8 = 0x01;
pub const DESCRIPTOR_TYPE_CONFIGURATION: u8 = 0x02;
pub const DESCRIPTOR_TYPE_INTERFACE: u8 = 0x04;
pub const DESCRIPTOR_TYPE_ENDPOINT: u8 = 0x05;

impl SetupPacket {
    pub fn get_descriptor(descriptor_type: u8, index: u8, length: u16) -> SetupPacket {
        SetupPacket {
            bm_request_type: REQUEST_TYPE_DEVICE_TO_HOST,
            b_request: REQUEST_GET_DESCRIPTOR,
            w_value: ((descriptor_type as u16) << 8) | index as u16,
            w_index: 0,
            w_length: length,
        }
    }

    pub fn set_address(addr: u8) -> SetupPacket {
        SetupPacket {
            bm_request_type: 0x00,
            b_request: REQUEST_SET_ADDRESS,
            w_value: addr as u16,
            w_index: 0,
            w_length: 0,
        }
    }

    pub fn set_configuration(config: u8) -> SetupPacket {
        SetupPacket {
            bm_request_type: 0x00,
            b_request: REQUEST_SET_CONFIGURATION,
            w_value: config as u16,
            w_index: 0,
            w_length: 0,
        }
    }

    pub fn set_protocol_boot(interface: u16) -> SetupPacket {
        SetupPacket {
            bm_request_type: 0x21,
            b_request: REQUEST_SET_PROTOCOL,
            w_value: 0,
            w_index: interface,
            w_length: 0,
        }
    }

    /// Direction is derived from bit 7 of `bmRequestType`, not assumed —
    /// see spec.md 9 open question 1 ("status direction should derive
    /// from data direction regardless of device").
    pub fn is_device_to_host(&self) -> bool {
        self.bm_request_type & 0x80 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceDescriptor {
    pub length: u8,
    pub descriptor_type: u8,
    pub usb_version: u16,
    pub device_class: u8,
    pub device_subclass: u8,
    pub device_protocol: u8,
    pub max_packet_size0: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub num_configurations: u8,
}

impl DeviceDescriptor {
    /// Parses the first 8 bytes only (enough for `bMaxPacketSize0`),
    /// used for the initial `GET_DESCRIPTOR(DEVICE, 8)` at address 0
    /// (spec.md 4.6 state `CONNECTED -> DESCRIBE0`).
    pub fn parse_partial(buf: &[u8]) -> Option<DeviceDescriptor> {
        if buf.len() < 8 {
            return None;
        }
        Some(DeviceDescriptor {
            length: buf[0],
            descriptor_type: buf[1],
            usb_version: u16::from_le_bytes([buf[2], buf[3]]),
            device_class: buf[4],
            device_subclass: buf[5],
            device_protocol: buf[6],
            max_packet_size0: buf[7],
            ..DeviceDescriptor::default()
        })
    }

    /// Parses the full 18-byte device descriptor (`DESCRIBE0 ->
    /// ADDRESSED -> DESCRIBED`).
    pub fn parse_full(buf: &[u8]) -> Option<DeviceDescriptor> {
        if buf.len() < 18 {
            return None;
        }
        let mut d = DeviceDescriptor::parse_partial(buf)?;
        d.vendor_id = u16::from_le_bytes([buf[8], buf[9]]);
        d.product_id = u16::from_le_bytes([buf[10], buf[11]]);
        d.num_configurations = buf[17];
        Some(d)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndpointDescriptor {
    pub endpoint_address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

impl EndpointDescriptor {
    pub fn is_in(&self) -> bool {
        self.endpoint_address & 0x80 != 0
    }

    pub fn number(&self) -> u8 {
        self.endpoint_address & 0x0F
    }

    pub fn is_interrupt(&self) -> bool {
        self.attributes & 0x03 == 0x03
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InterfaceDescriptor {
    pub interface_number: u8,
    pub interface_class: u8,
    pub interface_subclass: u8,
    pub interface_protocol: u8,
    pub endpoints: alloc::vec::Vec<EndpointDescriptor>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigDescriptor {
    pub config_value: u8,
    pub total_length: u16,
    pub interfaces: alloc::vec::Vec<InterfaceDescriptor>,
}

const MAX_INTERFACES: usize = 4;
const MAX_ENDPOINTS_PER_INTERFACE: usize = 16;

impl ConfigDescriptor {
    /// Walks the concatenated configuration/interface/endpoint descriptor
    /// blob returned by `GET_DESCRIPTOR(CONFIG, ...)`, per spec.md 4.6
    /// state `DESCRIBED -> CONFIGURED`. Bounded to `MAX_INTERFACES`
    /// interfaces of `MAX_ENDPOINTS_PER_INTERFACE` endpoints each, per
    /// spec.md 3 "USB device".
    pub fn parse(buf: &[u8]) -> Option<ConfigDescriptor> {
        if buf.len() < 9 || buf[1] != 0x02 {
            return None;
        }
        let total_length = u16::from_le_bytes([buf[2], buf[3]]);
        let config_value = buf[5];

        let mut config = ConfigDescriptor {
            config_value,
            total_length,
            interfaces: alloc::vec::Vec::new(),
        };

        let mut off = buf[0] as usize; // skip the configuration descriptor itself
        while off + 2 <= buf.len() && off < total_length as usize {
            let len = buf[off] as usize;
            let desc_type = buf[off + 1];
            if len < 2 {
                break;
            }
            if off + len > buf.len() {
                break;
            }
            match desc_type {
                DESCRIPTOR_TYPE_INTERFACE if len >= 9 => {
                    if config.interfaces.len() < MAX_INTERFACES {
                        config.interfaces.push(InterfaceDescriptor {
                            interface_number: buf[off + 2],
                            interface_class: buf[off + 5],
                            interface_subclass: buf[off + 6],
                            interface_protocol: buf[off + 7],
                            endpoints: alloc::vec::Vec::new(),
                        });
                    }
                }
                DESCRIPTOR_TYPE_ENDPOINT if len >= 7 => {
                    if let Some(iface) = config.interfaces.last_mut() {
                        if iface.endpoints.len() < MAX_ENDPOINTS_PER_INTERFACE {
                            iface.endpoints.push(EndpointDescriptor {
                                endpoint_address: buf[off + 2],
                                attributes: buf[off + 3],
                                max_packet_size: u16::from_le_bytes([buf[off + 4], buf[off + 5]]),
                                interval: buf[off + 6],
                            });
                        }
                    }
                }
                _ => {}
            }
            off += len;
        }
        Some(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_packet_get_descriptor_encodes_value() {
        let p = SetupPacket::get_descriptor(DESCRIPTOR_TYPE_DEVICE, 0, 18);
        assert_eq!(p.w_value, 0x0100);
        assert_eq!(p.w_length, 18);
        assert!(p.is_device_to_host());
    }

    #[test]
    fn set_address_is_host_to_device() {
        let p = SetupPacket::set_address(5);
        assert!(!p.is_device_to_host());
        assert_eq!(p.w_value, 5);
    }

    #[test]
    fn parses_partial_then_full_device_descriptor() {
        let mut buf = [0u8; 18];
        buf[0] = 18;
        buf[1] = DESCRIPTOR_TYPE_DEVICE;
        buf[7] = 64; // max packet size 0
        buf[8..10].copy_from_slice(&0x1234u16.to_le_bytes());
        buf[10..12].copy_from_slice(&0x5678u16.to_le_bytes());
        buf[17] = 1;

        let partial = DeviceDescriptor::parse_partial(&buf[..8]).unwrap();
        assert_eq!(partial.max_packet_size0, 64);
        assert_eq!(partial.vendor_id, 0);

        let full = DeviceDescriptor::parse_full(&buf).unwrap();
        assert_eq!(full.vendor_id, 0x1234);
        assert_eq!(full.product_id, 0x5678);
        assert_eq!(full.num_configurations, 1);
    }

    fn push_desc(buf: &mut alloc::vec::Vec<u8>, bytes: &[u8]) {
        buf.extend_from_slice(bytes);
    }

    #[test]
    fn config_descriptor_parses_one_interface_two_endpoints() {
        let mut buf = alloc::vec::Vec::new();
        // configuration descriptor, 9 bytes
        push_desc(&mut buf, &[9, 0x02, 0, 0, 1, 1, 0, 0, 0]);
        // interface descriptor, 9 bytes, class 3 (HID)
        push_desc(&mut buf, &[9, DESCRIPTOR_TYPE_INTERFACE, 0, 0, 2, 3, 1, 1, 0]);
        // endpoint descriptor IN interrupt
        push_desc(
            &mut buf,
            &[7, DESCRIPTOR_TYPE_ENDPOINT, 0x81, 0x03, 8, 0, 10],
        );
        // endpoint descriptor OUT bulk
        push_desc(
            &mut buf,
            &[7, DESCRIPTOR_TYPE_ENDPOINT, 0x02, 0x02, 64, 0, 0],
        );
        let total_len = buf.len() as u16;
        buf[2..4].copy_from_slice(&total_len.to_le_bytes());

        let config = ConfigDescriptor::parse(&buf).unwrap();
        assert_eq!(config.interfaces.len(), 1);
        let iface = &config.interfaces[0];
        assert_eq!(iface.interface_class, 3);
        assert_eq!(iface.endpoints.len(), 2);
        assert!(iface.endpoints[0].is_in());
        assert!(iface.endpoints[0].is_interrupt());
        assert!(!iface.endpoints[1].is_in());
    }

    #[test]
    fn config_descriptor_bounds_interfaces_and_endpoints() {
        let mut buf = alloc::vec::Vec::new();
        push_desc(&mut buf, &[9, 0x02, 0, 0, 6, 1, 0, 0, 0]);
        for _ in 0..6 {
            push_desc(&mut buf, &[9, DESCRIPTOR_TYPE_INTERFACE, 0, 0, 0, 0, 0, 0, 0]);
        }
        let total_len = buf.len() as u16;
        buf[2..4].copy_from_slice(&total_len.to_le_bytes());
        let config = ConfigDescriptor::parse(&buf).unwrap();
        assert_eq!(config.interfaces.len(), MAX_INTERFACES);
    }
}


