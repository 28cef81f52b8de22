//! OHCI (USB 1.1) host controller (spec.md 4.6, 6 "OHCI memory-mapped
//! register set"; "16/32-byte alignment for OHCI TD/QH").
//!
//! Register access goes through the shared [`super::Mmio`] newtype the
//! same way [`super::ehci::EhciController`] uses it, rather than the
//! I/O-port `Ports` trait `uhci` is built on -- OHCI's whole register
//! file, including the HC communication area, lives in one BAR0 memory
//! window.

use core::ptr;

use crate::usb::controller::{Speed, TransferDirection, UsbController, UsbError};
use crate::usb::descriptor::SetupPacket;

use super::Mmio;

const REG_HC_CONTROL: u32 = 0x04;
const REG_HC_COMMAND_STATUS: u32 = 0x08;
const REG_HC_CONTROL_HEAD_ED: u32 = 0x20;
const REG_HC_CONTROL_CURRENT_ED: u32 = 0x24;
const REG_HC_FM_INTERVAL: u32 = 0x34;
const REG_HC_PERIODIC_START: u32 = 0x40;
const REG_HC_RH_DESCRIPTOR_A: u32 = 0x48;
const REG_HC_RH_PORT_STATUS_BASE: u32 = 0x54;

const CTRL_CBSR_MASK: u32 = 0x3;
const CTRL_PLE: u32 = 1 << 2;
const CTRL_CLE: u32 = 1 << 4;
const CTRL_HCFS_OPERATIONAL: u32 = 0x2 << 6;
const CMD_STATUS_HCR: u32 = 1 << 0;
const CMD_STATUS_CLF: u32 = 1 << 1;

const PORT_CURRENT_CONNECT_STATUS: u32 = 1 << 0;
const PORT_RESET_STATUS: u32 = 1 << 4;
const PORT_LOW_SPEED_DEVICE: u32 = 1 << 9;
const PORT_SET_PORT_RESET: u32 = 1 << 4;
const PORT_SET_PORT_POWER: u32 = 1 << 8;

const TD_STATUS_COMPLETE_MASK: u32 = 0xF << 28;
const TD_CONDITION_NO_ERROR: u32 = 0x0 << 28;
const TD_CONDITION_NOT_ACCESSED: u32 = 0xF << 28;
const TD_CONDITION_STALL: u32 = 0x4 << 28;

const PID_SETUP: u32 = 0x0 << 19;
const PID_OUT: u32 = 0x1 << 19;
const PID_IN: u32 = 0x2 << 19;
const TD_ROUND: u32 = 1 << 18;
const TD_DELAY_INTERRUPT_NONE: u32 = 0x7 << 21;
const TD_TOGGLE_FROM_TD: u32 = 0x2 << 24;
const TD_TOGGLE_DATA1: u32 = 0x3 << 24;
const TD_TOGGLE_DATA0: u32 = 0x2 << 24;

/// 32-byte-aligned general transfer descriptor (spec.md 6).
#[repr(C, align(32))]
struct Td {
    control: u32,
    current_buffer_pointer: u32,
    next_td: u32,
    buffer_end: u32,
}

/// 16-byte-aligned endpoint descriptor.
#[repr(C, align(16))]
struct Ed {
    control: u32,
    tail_td: u32,
    head_td: u32,
    next_ed: u32,
}

const ED_SKIP: u32 = 1 << 14;

pub struct OhciController {
    mmio: Mmio,
    control_ed: *mut Ed,
    disabled: bool,
}

impl OhciController {
    /// Resets and brings up an OHCI controller whose MMIO register file
    /// starts at `mmio_base` (spec.md 6), per the common init shape in
    /// spec.md 4.6.
    ///
    /// # Safety
    /// `mmio_base` must be a valid, enabled OHCI BAR0 MMIO window.
    pub unsafe fn init(mmio_base: u32) -> Result<OhciController, UsbError> {
        let mmio = unsafe { Mmio::new(mmio_base) };

        mmio.write32(REG_HC_COMMAND_STATUS, CMD_STATUS_HCR);
        let mut reset_ok = false;
        for _ in 0..super::POLL_BUDGET {
            if mmio.read32(REG_HC_COMMAND_STATUS) & CMD_STATUS_HCR == 0 {
                reset_ok = true;
                break;
            }
        }
        if !reset_ok {
            return Err(UsbError::Timeout);
        }

        let heap = crate::kernel_main::heap();
        let control_ed = heap.malloc_aligned(core::mem::size_of::<Ed>(), 16) as *mut Ed;
        if control_ed.is_null() {
            return Err(UsbError::Timeout);
        }
        unsafe {
            ptr::write_volatile(&mut (*control_ed).control, ED_SKIP);
            ptr::write_volatile(&mut (*control_ed).tail_td, 0);
            ptr::write_volatile(&mut (*control_ed).head_td, 0);
            ptr::write_volatile(&mut (*control_ed).next_ed, 0);
        }

        mmio.write32(REG_HC_CONTROL_HEAD_ED, control_ed as usize as u32);
        mmio.write32(REG_HC_CONTROL_CURRENT_ED, 0);
        mmio.write32(REG_HC_FM_INTERVAL, 0x2EDF | (0x2778 << 16));
        mmio.write32(REG_HC_PERIODIC_START, 0x2A2F);

        let control = mmio.read32(REG_HC_CONTROL) & !CTRL_CBSR_MASK;
        mmio.write32(REG_HC_CONTROL, control | CTRL_CBSR_MASK | CTRL_CLE | CTRL_HCFS_OPERATIONAL);

        Ok(OhciController { mmio, control_ed, disabled: false })
    }

    fn num_root_ports(&self) -> u8 {
        (self.mmio.read32(REG_HC_RH_DESCRIPTOR_A) & 0xFF) as u8
    }

    fn port_reg(&self, port: u8) -> u32 {
        REG_HC_RH_PORT_STATUS_BASE + (port as u32) * 4
    }

    /// Powers and resets one root port, returning its negotiated speed
    /// once the reset completes (spec.md 4.6 "power and reset each root
    /// port").
    pub fn reset_port(&self, port: u8) -> Result<Speed, UsbError> {
        if port >= self.num_root_ports() {
            return Err(UsbError::Timeout);
        }
        let reg = self.port_reg(port);
        self.mmio.write32(reg, PORT_SET_PORT_POWER);
        if self.mmio.read32(reg) & PORT_CURRENT_CONNECT_STATUS == 0 {
            return Err(UsbError::Timeout);
        }

        self.mmio.write32(reg, PORT_SET_PORT_RESET);
        let mut reset_done = false;
        for _ in 0..super::POLL_BUDGET {
            if self.mmio.read32(reg) & PORT_RESET_STATUS == 0 {
                reset_done = true;
                break;
            }
        }
        if !reset_done {
            return Err(UsbError::Timeout);
        }

        let status = self.mmio.read32(reg);
        Ok(if status & PORT_LOW_SPEED_DEVICE != 0 { Speed::Low } else { Speed::Full })
    }

    fn alloc_td(&self) -> *mut Td {
        crate::kernel_main::heap().malloc_aligned(core::mem::size_of::<Td>(), 32) as *mut Td
    }

    fn free_td(&self, td: *mut Td) {
        if !td.is_null() {
            crate::kernel_main::heap().free_aligned(td as *mut u8);
        }
    }

    fn build_td(&self, pid: u32, toggle: u32, buffer: *mut u8, len: usize) -> *mut Td {
        let td = self.alloc_td();
        if td.is_null() {
            return td;
        }
        let control = pid | toggle | TD_ROUND | TD_DELAY_INTERRUPT_NONE | TD_CONDITION_NOT_ACCESSED;
        unsafe {
            ptr::write_volatile(&mut (*td).control, control);
            ptr::write_volatile(&mut (*td).current_buffer_pointer, buffer as usize as u32);
            ptr::write_volatile(&mut (*td).next_td, 0);
            ptr::write_volatile(
                &mut (*td).buffer_end,
                if len == 0 { 0 } else { buffer as usize as u32 + len as u32 - 1 },
            );
        }
        td
    }

    /// Polls `td`'s condition code field with a 100 ms-equivalent timeout
    /// (spec.md 4.6 step 5).
    fn poll_td(&self, td: *mut Td, len: usize) -> Result<usize, UsbError> {
        for _ in 0..super::POLL_BUDGET {
            let control = unsafe { ptr::read_volatile(&(*td).control) };
            let condition = control & TD_STATUS_COMPLETE_MASK;
            if condition == TD_CONDITION_NOT_ACCESSED {
                continue;
            }
            if condition != TD_CONDITION_NO_ERROR {
                return Err(if condition == TD_CONDITION_STALL { UsbError::Stall } else { UsbError::Timeout });
            }
            return Ok(len);
        }
        Err(UsbError::Timeout)
    }

    fn kick_control_list(&self) {
        let status = self.mmio.read32(REG_HC_COMMAND_STATUS);
        self.mmio.write32(REG_HC_COMMAND_STATUS, status | CMD_STATUS_CLF);
    }
}

impl UsbController for OhciController {
    fn control_transfer(&mut self, address: u8, setup: SetupPacket, buf: &mut [u8]) -> Result<usize, UsbError> {
        if self.disabled {
            return Err(UsbError::ControllerDisabled);
        }
        let setup_bytes = [
            setup.bm_request_type,
            setup.b_request,
            (setup.w_value & 0xFF) as u8,
            (setup.w_value >> 8) as u8,
            (setup.w_index & 0xFF) as u8,
            (setup.w_index >> 8) as u8,
            (setup.w_length & 0xFF) as u8,
            (setup.w_length >> 8) as u8,
        ];
        let heap = crate::kernel_main::heap();
        let setup_dma = heap.malloc_aligned(8, 16);
        if setup_dma.is_null() {
            return Err(UsbError::Timeout);
        }
        unsafe { ptr::copy_nonoverlapping(setup_bytes.as_ptr(), setup_dma, 8) };

        let data_direction = TransferDirection::from_setup(&setup);
        let data_pid = if matches!(data_direction, TransferDirection::In) { PID_IN } else { PID_OUT };
        let status_pid = if matches!(data_direction.opposite(), TransferDirection::In) { PID_IN } else { PID_OUT };

        let td_setup = self.build_td(PID_SETUP, TD_TOGGLE_DATA0, setup_dma, 8);
        let td_data = if setup.w_length > 0 {
            self.build_td(data_pid, TD_TOGGLE_DATA1, buf.as_mut_ptr(), buf.len())
        } else {
            ptr::null_mut()
        };
        let td_status = self.build_td(status_pid, TD_TOGGLE_DATA1, ptr::null_mut(), 0);

        if td_setup.is_null() || td_status.is_null() || (setup.w_length > 0 && td_data.is_null()) {
            heap.free_aligned(setup_dma);
            self.free_td(td_setup);
            self.free_td(td_data);
            self.free_td(td_status);
            return Err(UsbError::Timeout);
        }

        unsafe {
            if !td_data.is_null() {
                ptr::write_volatile(&mut (*td_setup).next_td, td_data as usize as u32);
                ptr::write_volatile(&mut (*td_data).next_td, td_status as usize as u32);
            } else {
                ptr::write_volatile(&mut (*td_setup).next_td, td_status as usize as u32);
            }
            ptr::write_volatile(&mut (*self.control_ed).head_td, td_setup as usize as u32);
            ptr::write_volatile(&mut (*self.control_ed).tail_td, 0);
            ptr::write_volatile(&mut (*self.control_ed).control, (address as u32) & 0x7F);
        }
        self.kick_control_list();

        let result = self.poll_td(td_status, 0);
        let transferred = if !td_data.is_null() { self.poll_td(td_data, buf.len()).unwrap_or(0) } else { 0 };

        unsafe { ptr::write_volatile(&mut (*self.control_ed).control, ED_SKIP) };
        heap.free_aligned(setup_dma);
        self.free_td(td_setup);
        self.free_td(td_data);
        self.free_td(td_status);

        result?;
        Ok(transferred)
    }

    fn interrupt_transfer(
        &mut self,
        address: u8,
        _endpoint: u8,
        buf: &mut [u8],
        _timeout_ms: u32,
    ) -> Result<usize, UsbError> {
        if self.disabled {
            return Err(UsbError::ControllerDisabled);
        }
        let td = self.build_td(PID_IN, TD_TOGGLE_FROM_TD, buf.as_mut_ptr(), buf.len());
        if td.is_null() {
            return Err(UsbError::Timeout);
        }
        unsafe {
            ptr::write_volatile(&mut (*self.control_ed).head_td, td as usize as u32);
            ptr::write_volatile(&mut (*self.control_ed).tail_td, 0);
            ptr::write_volatile(&mut (*self.control_ed).control, (address as u32) & 0x7F);
        }
        self.kick_control_list();
        let result = self.poll_td(td, buf.len());
        unsafe { ptr::write_volatile(&mut (*self.control_ed).control, ED_SKIP) };
        self.free_td(td);
        result
    }
}

impl Drop for OhciController {
    fn drop(&mut self) {
        self.mmio.write32(REG_HC_CONTROL, 0);
        crate::kernel_main::heap().free_aligned(self.control_ed as *mut u8);
    }
}
