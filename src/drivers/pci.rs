//! Live 0xCF8/0xCFC configuration-space bus walk and CPUID fingerprint
//! (spec.md 4.9 "Hardware scanner"). Builds the pure
//! [`crate::pci::HardwareInventory`] the way `drivers::ps2`/`drivers::ata`
//! build their pure decoders: real port cycles here, classification and
//! conflict detection in the always-compiled module.

use alloc::vec::Vec;

use crate::arch::cpu;
use crate::arch::port::Io;
use crate::pci::{self, CpuInfo, HardwareInventory, PciFunction};
use crate::ports::Ports;

const MAX_BUS: u8 = 32;
const MAX_DEVICE: u8 = 32;

fn read_config_dword(io: &mut Io, bus: u8, device: u8, function: u8, offset: u8) -> u32 {
    io.outl(pci::CONFIG_ADDRESS, pci::config_address(bus, device, function, offset));
    io.inl(pci::CONFIG_DATA)
}

fn probe_function(io: &mut Io, bus: u8, device: u8, function: u8) -> Option<PciFunction> {
    let id = read_config_dword(io, bus, device, function, 0x00);
    let vendor_id = (id & 0xFFFF) as u16;
    if !pci::is_present(vendor_id) {
        return None;
    }
    let device_id = (id >> 16) as u16;

    let class_reg = read_config_dword(io, bus, device, function, 0x08);
    let prog_if = ((class_reg >> 8) & 0xFF) as u8;
    let subclass = ((class_reg >> 16) & 0xFF) as u8;
    let class = ((class_reg >> 24) & 0xFF) as u8;

    let header_reg = read_config_dword(io, bus, device, function, 0x0C);
    let header_type = ((header_reg >> 16) & 0xFF) as u8;

    let irq_reg = read_config_dword(io, bus, device, function, 0x3C);
    let interrupt_line = (irq_reg & 0xFF) as u8;
    let interrupt_pin = ((irq_reg >> 8) & 0xFF) as u8;

    let secondary_bus = if pci::is_bridge(header_type) {
        ((read_config_dword(io, bus, device, function, 0x18) >> 8) & 0xFF) as u8
    } else {
        0
    };

    let mut bars = [0u32; 6];
    if !pci::is_bridge(header_type) {
        for (i, bar) in bars.iter_mut().enumerate() {
            *bar = read_config_dword(io, bus, device, function, 0x10 + (i as u8) * 4);
        }
    }

    Some(PciFunction {
        bus,
        device,
        function,
        vendor_id,
        device_id,
        class,
        subclass,
        prog_if,
        header_type,
        secondary_bus,
        interrupt_line,
        interrupt_pin,
        bars,
    })
}

/// Walks every bus/device/function reachable via config-space accesses
/// (spec.md 9 open question 3: only function 0 is probed unless its
/// header type marks the device multifunction) and fingerprints the CPU
/// via CPUID.
pub fn scan() -> HardwareInventory {
    let mut io = Io::new();
    let mut inventory = HardwareInventory::new();
    let mut buses_to_walk: Vec<u8> = alloc::vec![0];
    let mut visited = [false; MAX_BUS as usize];

    while let Some(bus) = buses_to_walk.pop() {
        if visited[bus as usize] {
            continue;
        }
        visited[bus as usize] = true;

        for device in 0..MAX_DEVICE {
            let Some(function0) = probe_function(&mut io, bus, device, 0) else {
                continue;
            };
            let multi = pci::is_multifunction(function0.header_type);
            if pci::is_bridge(function0.header_type) && function0.secondary_bus > bus {
                buses_to_walk.push(function0.secondary_bus);
            }
            inventory.pci_functions.push(function0);

            if multi {
                for function in 1..8u8 {
                    if let Some(f) = probe_function(&mut io, bus, device, function) {
                        if pci::is_bridge(f.header_type) && f.secondary_bus > bus {
                            buses_to_walk.push(f.secondary_bus);
                        }
                        inventory.pci_functions.push(f);
                    }
                }
            }
        }
    }

    inventory
}

pub fn cpu_info() -> CpuInfo {
    cpu::cpu_info()
}
