//! UHCI (USB 1.1) host controller (spec.md 4.6, 6 "UHCI word-register
//! file starting at PCI BAR4"; "16-byte alignment for UHCI TD/QH").
//!
//! Unlike OHCI/EHCI this variant is entirely I/O-port mapped rather than
//! MMIO, so it is generic over [`crate::ports::Ports`] the same way
//! `drivers::ata`/`drivers::ps2` are, instead of going through
//! [`super::Mmio`]. Descriptor memory (the 1024-entry frame list, one
//! permanent control queue head, and per-transfer TDs) is allocated from
//! the kernel heap with [`crate::heap::Heap::malloc_aligned`] and freed
//! symmetrically on drop or on an init timeout (spec.md 4.6 "On any
//! timeout the controller is marked disabled and its memory freed").

use core::ptr;

use crate::arch::port::Io;
use crate::ports::Ports;
use crate::usb::controller::{Speed, TransferDirection, UsbController, UsbError};
use crate::usb::descriptor::SetupPacket;

const REG_USBCMD: u16 = 0x00;
const REG_USBSTS: u16 = 0x02;
const REG_USBINTR: u16 = 0x04;
const REG_FRNUM: u16 = 0x06;
const REG_FRBASEADD: u16 = 0x08;
const REG_PORTSC1: u16 = 0x10;

const CMD_RUN: u16 = 1 << 0;
const CMD_HCRESET: u16 = 1 << 1;
const CMD_CONFIGURE: u16 = 1 << 6;
const STS_HC_HALTED: u16 = 1 << 5;
const PORTSC_CONNECT_STATUS: u16 = 1 << 0;
const PORTSC_PORT_ENABLE: u16 = 1 << 2;
const PORTSC_LOW_SPEED: u16 = 1 << 8;
const PORTSC_RESET: u16 = 1 << 9;

const FRAME_LIST_ENTRIES: usize = 1024;
const FRAME_LIST_ALIGN: usize = 4096;

/// Default control pipe packet size (USB 2.0 5.5.3): every device's
/// endpoint 0 supports at least this much regardless of speed, and it's
/// all `UhciController` assumes before `bMaxPacketSize0` is known. A UHCI
/// TD is one bus transaction, not a DMA scatter of the whole buffer, so
/// the data stage has to be split into packet-sized TDs chained off the
/// same queue head rather than handed to a single TD as one transfer.
const CONTROL_MAX_PACKET: usize = 8;
/// Longest data stage `control_transfer` chains TDs for (256-byte config
/// descriptor reads / `CONTROL_MAX_PACKET`, rounded up).
const MAX_DATA_TDS: usize = 32;

const PID_SETUP: u8 = 0x2D;
const PID_IN: u8 = 0x69;
const PID_OUT: u8 = 0xE1;

const TD_STATUS_ACTIVE: u32 = 1 << 23;
const TD_STATUS_STALLED: u32 = 1 << 22;
const TD_STATUS_BUFFER_ERR: u32 = 1 << 21;
const TD_STATUS_BABBLE: u32 = 1 << 20;
const TD_STATUS_NAK: u32 = 1 << 19;
const TD_STATUS_CRC_TIMEOUT: u32 = 1 << 18;
const TD_STATUS_ERROR_MASK: u32 =
    TD_STATUS_STALLED | TD_STATUS_BUFFER_ERR | TD_STATUS_BABBLE | TD_STATUS_CRC_TIMEOUT;
const TD_LINK_TERMINATE: u32 = 1 << 0;
const TD_LINK_QH_SELECT: u32 = 1 << 1;

/// On-the-wire UHCI transfer descriptor, 16-byte aligned, 4 dwords
/// (spec.md 6).
#[repr(C, align(16))]
struct Td {
    link: u32,
    status: u32,
    token: u32,
    buffer: u32,
}

/// On-the-wire UHCI queue head, 16-byte aligned, 2 dwords.
#[repr(C, align(16))]
struct Qh {
    head_link: u32,
    element_link: u32,
}

pub struct UhciController {
    io_base: u16,
    frame_list: *mut u32,
    control_qh: *mut Qh,
    disabled: bool,
    toggles: super::ToggleTable,
}

impl UhciController {
    /// Resets and brings up a UHCI controller whose registers start at
    /// `io_base` (the PCI BAR4 I/O window, spec.md 6), per the common
    /// init shape in spec.md 4.6: halt, reset with timeout, allocate and
    /// program the frame list, power on with `CF`.
    ///
    /// # Safety
    /// `io_base` must be a valid, enabled UHCI I/O BAR.
    pub unsafe fn init(io_base: u16) -> Result<UhciController, UsbError> {
        let mut io = Io::new();

        io.outw(io_base + REG_USBCMD, 0);
        io.outw(io_base + REG_USBCMD, CMD_HCRESET);
        let mut reset_ok = false;
        for _ in 0..super::POLL_BUDGET {
            if io.inw(io_base + REG_USBCMD) & CMD_HCRESET == 0 {
                reset_ok = true;
                break;
            }
        }
        if !reset_ok {
            return Err(UsbError::Timeout);
        }

        let heap = crate::kernel_main::heap();
        let frame_list =
            heap.malloc_aligned(FRAME_LIST_ENTRIES * core::mem::size_of::<u32>(), FRAME_LIST_ALIGN) as *mut u32;
        let control_qh = heap.malloc_aligned(core::mem::size_of::<Qh>(), 16) as *mut Qh;
        if frame_list.is_null() || control_qh.is_null() {
            if !frame_list.is_null() {
                heap.free_aligned(frame_list as *mut u8);
            }
            if !control_qh.is_null() {
                heap.free_aligned(control_qh as *mut u8);
            }
            return Err(UsbError::Timeout);
        }

        unsafe {
            ptr::write_volatile(&mut (*control_qh).head_link, TD_LINK_TERMINATE);
            ptr::write_volatile(&mut (*control_qh).element_link, TD_LINK_TERMINATE);
            let qh_phys = (control_qh as usize as u32) | TD_LINK_QH_SELECT;
            for i in 0..FRAME_LIST_ENTRIES {
                ptr::write_volatile(frame_list.add(i), qh_phys);
            }
        }

        io.outl(io_base + REG_FRBASEADD, frame_list as usize as u32);
        io.outw(io_base + REG_FRNUM, 0);
        io.outw(io_base + REG_USBINTR, 0);
        io.outw(io_base + REG_USBCMD, CMD_RUN | CMD_CONFIGURE);

        Ok(UhciController { io_base, frame_list, control_qh, disabled: false, toggles: super::ToggleTable::new() })
    }

    fn port_regs(&self, port: u8) -> u16 {
        REG_PORTSC1 + (port as u16) * 2
    }

    /// Powers and resets one root port, returning its negotiated speed
    /// once the port reports enabled (spec.md 4.6 "power and reset each
    /// root port").
    pub fn reset_port(&self, port: u8) -> Result<Speed, UsbError> {
        let mut io = Io::new();
        let reg = self.io_base + self.port_regs(port);
        if io.inw(reg) & PORTSC_CONNECT_STATUS == 0 {
            return Err(UsbError::Timeout);
        }

        io.outw(reg, PORTSC_RESET);
        for _ in 0..super::POLL_BUDGET {
            core::hint::spin_loop();
        }
        io.outw(reg, 0);

        let mut enabled = false;
        for _ in 0..super::POLL_BUDGET {
            let status = io.inw(reg);
            if status & PORTSC_PORT_ENABLE != 0 {
                enabled = true;
                break;
            }
            io.outw(reg, status | PORTSC_PORT_ENABLE);
        }
        if !enabled {
            return Err(UsbError::Timeout);
        }

        let status = io.inw(reg);
        Ok(if status & PORTSC_LOW_SPEED != 0 { Speed::Low } else { Speed::Full })
    }

    /// Allocates one 16-byte-aligned TD from the heap.
    fn alloc_td(&self) -> *mut Td {
        crate::kernel_main::heap().malloc_aligned(core::mem::size_of::<Td>(), 16) as *mut Td
    }

    fn free_td(&self, td: *mut Td) {
        if !td.is_null() {
            crate::kernel_main::heap().free_aligned(td as *mut u8);
        }
    }

    /// Builds a single TD for `pid` against `address`/`endpoint`, with an
    /// optional data stage backed by `buffer` (spec.md 4.6 steps 1-3).
    fn build_td(&self, pid: u8, address: u8, endpoint: u8, toggle: bool, buffer: *mut u8, len: usize) -> *mut Td {
        let td = self.alloc_td();
        if td.is_null() {
            return td;
        }
        let max_len_field = if len == 0 { 0x7FF } else { (len as u32 - 1) & 0x7FF };
        let token = (pid as u32)
            | ((address as u32) << 8)
            | ((endpoint as u32 & 0x0F) << 15)
            | ((toggle as u32) << 19)
            | (max_len_field << 21);
        unsafe {
            ptr::write_volatile(&mut (*td).link, TD_LINK_TERMINATE);
            ptr::write_volatile(&mut (*td).status, TD_STATUS_ACTIVE | (3 << 27));
            ptr::write_volatile(&mut (*td).token, token);
            ptr::write_volatile(&mut (*td).buffer, buffer as usize as u32);
        }
        td
    }

    /// Polls `td`'s status word for completion with a 100 ms-equivalent
    /// timeout (spec.md 4.6 step 5), returning the actual-length field or
    /// an error classified from the status bits.
    fn poll_td(&self, td: *mut Td) -> Result<usize, UsbError> {
        for _ in 0..super::POLL_BUDGET {
            let status = unsafe { ptr::read_volatile(&(*td).status) };
            if status & TD_STATUS_ACTIVE != 0 {
                continue;
            }
            if status & TD_STATUS_ERROR_MASK != 0 {
                return Err(if status & TD_STATUS_STALLED != 0 { UsbError::Stall } else { UsbError::Timeout });
            }
            if status & TD_STATUS_NAK != 0 {
                return Err(UsbError::Timeout);
            }
            let act_len = (status & 0x7FF) as usize;
            return Ok(if act_len == 0x7FF { 0 } else { act_len + 1 });
        }
        Err(UsbError::Timeout)
    }
}

impl UsbController for UhciController {
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
        let out_pid = if matches!(data_direction, TransferDirection::In) { PID_IN } else { PID_OUT };
        let status_pid = if matches!(data_direction.opposite(), TransferDirection::In) { PID_IN } else { PID_OUT };

        let td_setup = self.build_td(PID_SETUP, address, 0, false, setup_dma, 8);

        // Data stage is one TD per CONTROL_MAX_PACKET-sized chunk, toggle
        // alternating DATA1/DATA0/... starting at DATA1, chained together.
        let mut data_tds = [ptr::null_mut::<Td>(); MAX_DATA_TDS];
        let mut data_td_count = 0;
        let mut alloc_failed = false;
        if setup.w_length > 0 {
            let mut offset = 0;
            let mut toggle = true;
            while offset < buf.len() && data_td_count < MAX_DATA_TDS {
                let chunk_len = core::cmp::min(CONTROL_MAX_PACKET, buf.len() - offset);
                let chunk_ptr = unsafe { buf.as_mut_ptr().add(offset) };
                let td = self.build_td(out_pid, address, 0, toggle, chunk_ptr, chunk_len);
                if td.is_null() {
                    alloc_failed = true;
                    break;
                }
                data_tds[data_td_count] = td;
                data_td_count += 1;
                toggle = !toggle;
                offset += chunk_len;
            }
            if offset < buf.len() {
                alloc_failed = true;
            }
        }
        let td_status = self.build_td(status_pid, address, 0, true, ptr::null_mut(), 0);

        if td_setup.is_null() || td_status.is_null() || alloc_failed {
            heap.free_aligned(setup_dma);
            self.free_td(td_setup);
            for &td in data_tds[..data_td_count].iter() {
                self.free_td(td);
            }
            self.free_td(td_status);
            return Err(UsbError::Timeout);
        }

        unsafe {
            let mut prev = td_setup;
            for &td in data_tds[..data_td_count].iter() {
                ptr::write_volatile(&mut (*prev).link, td as usize as u32);
                prev = td;
            }
            ptr::write_volatile(&mut (*prev).link, td_status as usize as u32);
            ptr::write_volatile(&mut (*self.control_qh).element_link, td_setup as usize as u32);
        }

        let result = self.poll_td(td_status);

        let mut transferred = 0;
        for &td in data_tds[..data_td_count].iter() {
            match self.poll_td(td) {
                Ok(len) => {
                    transferred += len;
                    if len < CONTROL_MAX_PACKET {
                        break;
                    }
                }
                Err(_) => break,
            }
        }

        unsafe { ptr::write_volatile(&mut (*self.control_qh).element_link, TD_LINK_TERMINATE) };
        heap.free_aligned(setup_dma);
        self.free_td(td_setup);
        for &td in data_tds[..data_td_count].iter() {
            self.free_td(td);
        }
        self.free_td(td_status);

        result?;
        Ok(transferred)
    }

    fn interrupt_transfer(
        &mut self,
        address: u8,
        endpoint: u8,
        buf: &mut [u8],
        _timeout_ms: u32,
    ) -> Result<usize, UsbError> {
        if self.disabled {
            return Err(UsbError::ControllerDisabled);
        }
        let toggle = self.toggles.next(address, endpoint);
        let td = self.build_td(PID_IN, address, endpoint, toggle, buf.as_mut_ptr(), buf.len());
        if td.is_null() {
            return Err(UsbError::Timeout);
        }
        unsafe { ptr::write_volatile(&mut (*self.control_qh).element_link, td as usize as u32) };
        let result = self.poll_td(td);
        unsafe { ptr::write_volatile(&mut (*self.control_qh).element_link, TD_LINK_TERMINATE) };
        self.free_td(td);
        result
    }
}

impl Drop for UhciController {
    fn drop(&mut self) {
        let mut io = Io::new();
        io.outw(self.io_base + REG_USBCMD, 0);
        let _ = io.inw(self.io_base + REG_USBSTS) & STS_HC_HALTED;
        let heap = crate::kernel_main::heap();
        heap.free_aligned(self.frame_list as *mut u8);
        heap.free_aligned(self.control_qh as *mut u8);
    }
}
