//! COM1 16550 UART driver (spec.md 2 "Port I/O + serial log"). Grounded
//! in the teacher's `arch/x86_64/serial.rs` register map and init
//! sequence, hand-rolled over `arch::port::Io` instead of the
//! `uart_16550` crate since that crate targets `x86_64` only.

use core::fmt;

use lazy_static::lazy_static;
use spin::Mutex;

use crate::ports::Ports;

use super::port::Io;

pub const COM1_PORT: u16 = 0x3F8;

const REG_DATA: u16 = 0;
const REG_INTERRUPT_ENABLE: u16 = 1;
const REG_FIFO_CONTROL: u16 = 2;
const REG_LINE_CONTROL: u16 = 3;
const REG_MODEM_CONTROL: u16 = 4;
const REG_LINE_STATUS: u16 = 5;

const LCR_DLAB: u8 = 1 << 7;
const LCR_8N1: u8 = 0x03;
const FCR_ENABLE_CLEAR_14BYTE: u8 = 0xC7;
const MCR_DTR_RTS_OUT2: u8 = 0x0B;
const LSR_TRANSMIT_EMPTY: u8 = 1 << 5;

/// Divisor for 38400 baud off the UART's 115200 baud base clock; faster
/// than the teacher's default but still comfortably inside what every
/// 16550-compatible emulator accepts, and fast enough that the PIT/PS2
/// interrupt handlers never stall waiting for serial output to drain.
const BAUD_DIVISOR: u16 = 3;

pub struct SerialPort {
    base: u16,
    io: Io,
}

impl SerialPort {
    const fn new(base: u16) -> SerialPort {
        SerialPort { base, io: Io::new() }
    }

    fn init(&mut self) {
        self.io.outb(self.base + REG_INTERRUPT_ENABLE, 0x00);
        self.io.outb(self.base + REG_LINE_CONTROL, LCR_DLAB);
        self.io.outb(self.base + REG_DATA, (BAUD_DIVISOR & 0xFF) as u8);
        self.io
            .outb(self.base + REG_INTERRUPT_ENABLE, ((BAUD_DIVISOR >> 8) & 0xFF) as u8);
        self.io.outb(self.base + REG_LINE_CONTROL, LCR_8N1);
        self.io.outb(self.base + REG_FIFO_CONTROL, FCR_ENABLE_CLEAR_14BYTE);
        self.io.outb(self.base + REG_MODEM_CONTROL, MCR_DTR_RTS_OUT2);
    }

    fn is_transmit_empty(&mut self) -> bool {
        self.io.inb(self.base + REG_LINE_STATUS) & LSR_TRANSMIT_EMPTY != 0
    }

    fn send(&mut self, byte: u8) {
        while !self.is_transmit_empty() {
            super::cpu::pause();
        }
        match byte {
            b'\n' => {
                self.send(b'\r');
                self.send(b'\n');
            }
            byte => self.io.outb(self.base + REG_DATA, byte),
        }
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.send(byte);
        }
        Ok(())
    }
}

lazy_static! {
    pub static ref SERIAL1: Mutex<SerialPort> = {
        let mut port = SerialPort::new(COM1_PORT);
        port.init();
        Mutex::new(port)
    };
}

/// # Safety
/// Must run during early boot, before any other code writes to COM1.
pub unsafe fn init() {
    let _ = &*SERIAL1;
}

/// Used by `crate::logging`'s `klog_*` macros.
pub fn _print(args: fmt::Arguments) {
    use fmt::Write;
    let _ = SERIAL1.lock().write_fmt(args);
}


