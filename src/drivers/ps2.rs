//! Live PS/2 keyboard (IRQ1) and mouse (IRQ12) handlers (spec.md 4.4).
//!
//! Reads the raw byte off port 0x60, feeds it to the pure
//! [`crate::ps2::KeyboardDecoder`]/[`crate::ps2::MouseDecoder`], and posts
//! whatever [`crate::event::Event`]s come back onto the main loop's queue
//! via [`crate::kernel_main::post_event`]. Mouse packet synchronization
//! needs per-device state across interrupts, so both decoders live behind
//! a `spin::Mutex` here rather than being recreated per interrupt.

use spin::Mutex;

use crate::arch::port::Io;
use crate::ports::Ports;
use crate::ps2::{KeyboardDecoder, MouseDecoder};

const DATA_PORT: u16 = 0x60;
const STATUS_COMMAND_PORT: u16 = 0x64;

const STATUS_OUTPUT_FULL: u8 = 1 << 0;
const CMD_ENABLE_AUX_PORT: u8 = 0xA8;
const CMD_READ_CONFIG: u8 = 0x20;
const CMD_WRITE_CONFIG: u8 = 0x60;
const CMD_WRITE_TO_AUX: u8 = 0xD4;
const MOUSE_CMD_ENABLE_STREAMING: u8 = 0xF4;
const MOUSE_ACK: u8 = 0xFA;

static KEYBOARD: Mutex<KeyboardDecoder> = Mutex::new(KeyboardDecoder::new());
static MOUSE: Mutex<Option<MouseDecoder>> = Mutex::new(None);

fn wait_input_ready(io: &mut Io) {
    for _ in 0..0x10000u32 {
        if io.inb(STATUS_COMMAND_PORT) & 0x02 == 0 {
            return;
        }
    }
}

fn wait_output_ready(io: &mut Io) -> bool {
    for _ in 0..0x10000u32 {
        if io.inb(STATUS_COMMAND_PORT) & STATUS_OUTPUT_FULL != 0 {
            return true;
        }
    }
    false
}

/// Enables the auxiliary (mouse) port and streaming reports, then
/// installs both IRQ handlers. `screen_w`/`screen_h` seed the mouse
/// decoder's starting position and clamp bounds (spec.md 4.4).
///
/// # Safety
/// Must run after `arch::pic::init` so the IRQ1/IRQ12 lines are already
/// unmasked and remapped to 33/44.
pub unsafe fn init(screen_w: i32, screen_h: i32) {
    let mut io = Io::new();

    wait_input_ready(&mut io);
    io.outb(STATUS_COMMAND_PORT, CMD_ENABLE_AUX_PORT);

    wait_input_ready(&mut io);
    io.outb(STATUS_COMMAND_PORT, CMD_READ_CONFIG);
    wait_output_ready(&mut io);
    let mut config = io.inb(DATA_PORT);
    config |= 0b0000_0011; // enable both IRQ1 and IRQ12
    config &= !0b0010_0000; // clear the aux-port clock-disable bit
    wait_input_ready(&mut io);
    io.outb(STATUS_COMMAND_PORT, CMD_WRITE_CONFIG);
    wait_input_ready(&mut io);
    io.outb(DATA_PORT, config);

    wait_input_ready(&mut io);
    io.outb(STATUS_COMMAND_PORT, CMD_WRITE_TO_AUX);
    wait_input_ready(&mut io);
    io.outb(DATA_PORT, MOUSE_CMD_ENABLE_STREAMING);
    if wait_output_ready(&mut io) {
        let _ = io.inb(DATA_PORT); // ACK, discarded
        let _ = MOUSE_ACK;
    }

    *MOUSE.lock() = Some(MouseDecoder::new(screen_w, screen_h));

    crate::arch::interrupts::install_handler(
        crate::idt::irq_to_vector(1),
        keyboard_irq_handler,
    );
    crate::arch::interrupts::install_handler(
        crate::idt::irq_to_vector(12),
        mouse_irq_handler,
    );
}

fn keyboard_irq_handler(_vector: u8, _error_code: u32) {
    let mut io = Io::new();
    let scancode = io.inb(DATA_PORT);
    let event = KEYBOARD.lock().handle_scancode(scancode);
    crate::kernel_main::post_event(event);
}

fn mouse_irq_handler(_vector: u8, _error_code: u32) {
    let mut io = Io::new();
    let byte = io.inb(DATA_PORT);
    let mut guard = MOUSE.lock();
    let Some(mouse) = guard.as_mut() else { return };
    for event in mouse.handle_byte(byte) {
        crate::kernel_main::post_event(event);
    }
}
