//! EHCI (USB 2.0) host controller (spec.md 4.6, 6 "EHCI split capability
//! + operational regions"; "32-byte alignment for EHCI" descriptors).
//!
//! This kernel runs every device through control and interrupt transfers
//! only (spec.md 4.6, 1 Non-goals: no bulk/isochronous, no USB 3),
//! so EHCI here is used strictly in its USB 1.1-compatible async
//! schedule mode -- high-speed split transactions are out of scope the
//! same way they are for `uhci`/`ohci`'s simplified schedules.

use core::ptr;

use crate::usb::controller::{Speed, TransferDirection, UsbController, UsbError};
use crate::usb::descriptor::SetupPacket;

use super::Mmio;

const CAP_CAPLENGTH: u32 = 0x00;
const CAP_HCSPARAMS: u32 = 0x04;

const OP_USBCMD: u32 = 0x00;
const OP_USBSTS: u32 = 0x04;
const OP_ASYNCLISTADDR: u32 = 0x18;
const OP_CONFIGFLAG: u32 = 0x40;
const OP_PORTSC_BASE: u32 = 0x44;

const CMD_RUN: u32 = 1 << 0;
const CMD_HCRESET: u32 = 1 << 1;
const CMD_ASYNC_ENABLE: u32 = 1 << 5;
const STS_HC_HALTED: u32 = 1 << 12;

const PORTSC_CONNECT_STATUS: u32 = 1 << 0;
const PORTSC_ENABLED: u32 = 1 << 2;
const PORTSC_LINE_STATUS_MASK: u32 = 0x3 << 10;
const PORTSC_LINE_STATUS_LOW_SPEED: u32 = 0x1 << 10;
const PORTSC_RESET: u32 = 1 << 8;
const PORTSC_PORT_POWER: u32 = 1 << 12;
const PORTSC_PORT_OWNER: u32 = 1 << 13;

const QTD_STATUS_ACTIVE: u32 = 1 << 7;
const QTD_STATUS_HALTED: u32 = 1 << 6;
const QTD_STATUS_BUFFER_ERR: u32 = 1 << 5;
const QTD_STATUS_BABBLE: u32 = 1 << 4;
const QTD_STATUS_XACT_ERR: u32 = 1 << 3;
const QTD_STATUS_ERROR_MASK: u32 =
    QTD_STATUS_HALTED | QTD_STATUS_BUFFER_ERR | QTD_STATUS_BABBLE | QTD_STATUS_XACT_ERR;
const QTD_TERMINATE: u32 = 1 << 0;

const PID_OUT: u32 = 0x0 << 8;
const PID_IN: u32 = 0x1 << 8;
const PID_SETUP: u32 = 0x2 << 8;

const QH_LINK_TYPE_QH: u32 = 0x1 << 1;

/// 32-byte-aligned queue transfer descriptor.
#[repr(C, align(32))]
struct Qtd {
    next_qtd: u32,
    alt_next_qtd: u32,
    token: u32,
    buffer: [u32; 5],
}

/// 32-byte-aligned queue head.
#[repr(C, align(32))]
struct Qh {
    horizontal_link: u32,
    endpoint_characteristics: u32,
    endpoint_capabilities: u32,
    current_qtd: u32,
    overlay: [u32; 8],
}

pub struct EhciController {
    capabilities: Mmio,
    operational: Mmio,
    control_qh: *mut Qh,
    disabled: bool,
    toggles: super::ToggleTable,
}

impl EhciController {
    /// Resets and brings up an EHCI controller whose capability register
    /// block starts at `mmio_base` (spec.md 6), per the common init shape
    /// in spec.md 4.6. The operational register block follows at
    /// `CAPLENGTH` bytes past `mmio_base`, per the EHCI split layout.
    ///
    /// # Safety
    /// `mmio_base` must be a valid, enabled EHCI BAR0 MMIO window.
    pub unsafe fn init(mmio_base: u32) -> Result<EhciController, UsbError> {
        let capabilities = unsafe { Mmio::new(mmio_base) };
        let cap_length = capabilities.read8(CAP_CAPLENGTH) as u32;
        let operational = unsafe { Mmio::new(mmio_base + cap_length) };

        operational.write32(OP_USBCMD, 0);
        let mut halted = false;
        for _ in 0..super::POLL_BUDGET {
            if operational.read32(OP_USBSTS) & STS_HC_HALTED != 0 {
                halted = true;
                break;
            }
        }
        if !halted {
            return Err(UsbError::Timeout);
        }

        operational.write32(OP_USBCMD, CMD_HCRESET);
        let mut reset_ok = false;
        for _ in 0..super::POLL_BUDGET {
            if operational.read32(OP_USBCMD) & CMD_HCRESET == 0 {
                reset_ok = true;
                break;
            }
        }
        if !reset_ok {
            return Err(UsbError::Timeout);
        }

        let heap = crate::kernel_main::heap();
        let control_qh = heap.malloc_aligned(core::mem::size_of::<Qh>(), 32) as *mut Qh;
        if control_qh.is_null() {
            return Err(UsbError::Timeout);
        }
        unsafe {
            let self_link = (control_qh as usize as u32) | QH_LINK_TYPE_QH;
            ptr::write_volatile(&mut (*control_qh).horizontal_link, self_link);
            ptr::write_volatile(&mut (*control_qh).endpoint_characteristics, 1 << 15);
            ptr::write_volatile(&mut (*control_qh).endpoint_capabilities, 0);
            ptr::write_volatile(&mut (*control_qh).current_qtd, QTD_TERMINATE);
            for slot in (*control_qh).overlay.iter_mut() {
                ptr::write_volatile(slot, QTD_TERMINATE);
            }
        }

        operational.write32(OP_ASYNCLISTADDR, control_qh as usize as u32);
        operational.write32(OP_CONFIGFLAG, 1);
        operational.write32(OP_USBCMD, CMD_RUN | CMD_ASYNC_ENABLE);

        Ok(EhciController { capabilities, operational, control_qh, disabled: false, toggles: super::ToggleTable::new() })
    }

    fn num_root_ports(&self) -> u8 {
        (self.capabilities.read32(CAP_HCSPARAMS) & 0x0F) as u8
    }

    fn port_reg(&self, port: u8) -> u32 {
        OP_PORTSC_BASE + (port as u32) * 4
    }

    /// Powers and resets one root port. A port that comes out of reset
    /// still owned by the companion controller (low/full speed device,
    /// spec.md 4.6's note that EHCI only handles high-speed devices
    /// itself) is handed back rather than claimed, and reported as an
    /// error to the caller -- route-to-companion enumeration is out of
    /// scope here (spec.md 1 Non-goals).
    pub fn reset_port(&self, port: u8) -> Result<Speed, UsbError> {
        if port >= self.num_root_ports() {
            return Err(UsbError::Timeout);
        }
        let reg = self.port_reg(port);
        self.operational.write32(reg, PORTSC_PORT_POWER);
        if self.operational.read32(reg) & PORTSC_CONNECT_STATUS == 0 {
            return Err(UsbError::Timeout);
        }

        let line_status = self.operational.read32(reg) & PORTSC_LINE_STATUS_MASK;
        if line_status == PORTSC_LINE_STATUS_LOW_SPEED {
            self.operational.write32(reg, self.operational.read32(reg) | PORTSC_PORT_OWNER);
            return Err(UsbError::ControllerDisabled);
        }

        self.operational.write32(reg, self.operational.read32(reg) | PORTSC_RESET);
        for _ in 0..super::POLL_BUDGET {
            core::hint::spin_loop();
        }
        self.operational.write32(reg, self.operational.read32(reg) & !PORTSC_RESET);

        let mut enabled = false;
        for _ in 0..super::POLL_BUDGET {
            if self.operational.read32(reg) & PORTSC_ENABLED != 0 {
                enabled = true;
                break;
            }
        }
        if !enabled {
            self.operational.write32(reg, self.operational.read32(reg) | PORTSC_PORT_OWNER);
            return Err(UsbError::ControllerDisabled);
        }
        Ok(Speed::High)
    }

    fn alloc_qtd(&self) -> *mut Qtd {
        crate::kernel_main::heap().malloc_aligned(core::mem::size_of::<Qtd>(), 32) as *mut Qtd
    }

    fn free_qtd(&self, qtd: *mut Qtd) {
        if !qtd.is_null() {
            crate::kernel_main::heap().free_aligned(qtd as *mut u8);
        }
    }

    fn build_qtd(&self, pid: u32, toggle: bool, buffer: *mut u8, len: usize) -> *mut Qtd {
        let qtd = self.alloc_qtd();
        if qtd.is_null() {
            return qtd;
        }
        let token = pid
            | QTD_STATUS_ACTIVE
            | ((len as u32 & 0x7FFF) << 16)
            | ((toggle as u32) << 31)
            | (3 << 10);
        unsafe {
            ptr::write_volatile(&mut (*qtd).next_qtd, QTD_TERMINATE);
            ptr::write_volatile(&mut (*qtd).alt_next_qtd, QTD_TERMINATE);
            ptr::write_volatile(&mut (*qtd).token, token);
            for (i, slot) in (*qtd).buffer.iter_mut().enumerate() {
                ptr::write_volatile(slot, if i == 0 { buffer as usize as u32 } else { 0 });
            }
        }
        qtd
    }

    /// Polls `qtd`'s token status bits with a 100 ms-equivalent timeout
    /// (spec.md 4.6 step 5).
    fn poll_qtd(&self, qtd: *mut Qtd, len: usize) -> Result<usize, UsbError> {
        for _ in 0..super::POLL_BUDGET {
            let token = unsafe { ptr::read_volatile(&(*qtd).token) };
            if token & QTD_STATUS_ACTIVE != 0 {
                continue;
            }
            if token & QTD_STATUS_ERROR_MASK != 0 {
                return Err(if token & QTD_STATUS_HALTED != 0 { UsbError::Stall } else { UsbError::Timeout });
            }
            let remaining = (token >> 16) & 0x7FFF;
            return Ok(len.saturating_sub(remaining as usize));
        }
        Err(UsbError::Timeout)
    }
}

impl UsbController for EhciController {
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
        let setup_dma = heap.malloc_aligned(8, 32);
        if setup_dma.is_null() {
            return Err(UsbError::Timeout);
        }
        unsafe { ptr::copy_nonoverlapping(setup_bytes.as_ptr(), setup_dma, 8) };

        let data_direction = TransferDirection::from_setup(&setup);
        let data_pid = if matches!(data_direction, TransferDirection::In) { PID_IN } else { PID_OUT };
        let status_pid = if matches!(data_direction.opposite(), TransferDirection::In) { PID_IN } else { PID_OUT };

        let qtd_setup = self.build_qtd(PID_SETUP, false, setup_dma, 8);
        let qtd_data = if setup.w_length > 0 {
            self.build_qtd(data_pid, true, buf.as_mut_ptr(), buf.len())
        } else {
            ptr::null_mut()
        };
        let qtd_status = self.build_qtd(status_pid, true, ptr::null_mut(), 0);

        if qtd_setup.is_null() || qtd_status.is_null() || (setup.w_length > 0 && qtd_data.is_null()) {
            heap.free_aligned(setup_dma);
            self.free_qtd(qtd_setup);
            self.free_qtd(qtd_data);
            self.free_qtd(qtd_status);
            return Err(UsbError::Timeout);
        }

        unsafe {
            if !qtd_data.is_null() {
                ptr::write_volatile(&mut (*qtd_setup).next_qtd, qtd_data as usize as u32);
                ptr::write_volatile(&mut (*qtd_data).next_qtd, qtd_status as usize as u32);
            } else {
                ptr::write_volatile(&mut (*qtd_setup).next_qtd, qtd_status as usize as u32);
            }
            let characteristics = ((address as u32) & 0x7F) | (64 << 16) | (1 << 14);
            ptr::write_volatile(&mut (*self.control_qh).endpoint_characteristics, characteristics);
            ptr::write_volatile(&mut (*self.control_qh).current_qtd, qtd_setup as usize as u32);
            ptr::write_volatile(&mut (*self.control_qh).overlay[0], QTD_TERMINATE);
        }

        let result = self.poll_qtd(qtd_status, 0);
        let transferred = if !qtd_data.is_null() { self.poll_qtd(qtd_data, buf.len()).unwrap_or(0) } else { 0 };

        heap.free_aligned(setup_dma);
        self.free_qtd(qtd_setup);
        self.free_qtd(qtd_data);
        self.free_qtd(qtd_status);

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
        let qtd = self.build_qtd(PID_IN, toggle, buf.as_mut_ptr(), buf.len());
        if qtd.is_null() {
            return Err(UsbError::Timeout);
        }
        unsafe {
            let characteristics = ((address as u32) & 0x7F) | (64 << 16) | (1 << 14);
            ptr::write_volatile(&mut (*self.control_qh).endpoint_characteristics, characteristics);
            ptr::write_volatile(&mut (*self.control_qh).current_qtd, qtd as usize as u32);
        }
        let result = self.poll_qtd(qtd, buf.len());
        self.free_qtd(qtd);
        result
    }
}

impl Drop for EhciController {
    fn drop(&mut self) {
        self.operational.write32(OP_USBCMD, 0);
        crate::kernel_main::heap().free_aligned(self.control_qh as *mut u8);
    }
}
