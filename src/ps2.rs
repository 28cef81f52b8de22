//! PS/2 keyboard and mouse decode logic (spec.md 3 "Event", 4.4).
//!
//! The IRQ1/IRQ12 handlers that read ports 0x60/0x64 live in
//! `drivers::ps2` (kernel-target only); everything here is pure decode —
//! scancode set 1 -> ASCII with modifier tracking, and 3-byte mouse packet
//! accumulation with clamped absolute-coordinate integration — so it is
//! exercised directly with synthetic byte sequences on the host.

use crate::event::{Event, EventKind};
use alloc::vec::Vec;

const SCANCODE_RELEASE_BIT: u8 = 0x80;
const SCANCODE_LEFT_SHIFT: u8 = 0x2A;
const SCANCODE_RIGHT_SHIFT: u8 = 0x36;
const SCANCODE_LEFT_CTRL: u8 = 0x1D;
const SCANCODE_LEFT_ALT: u8 = 0x38;
const SCANCODE_CAPS_LOCK: u8 = 0x3A;
const SCANCODE_NUM_LOCK: u8 = 0x45;
const SCANCODE_SCROLL_LOCK: u8 = 0x46;

/// US QWERTY scancode-set-1 -> ASCII, unshifted. Index is the make-code
/// (bit 7 clear); 0 marks scancodes with no direct ASCII mapping.
#[rustfmt::skip]
const ASCII_LOWER: [u8; 0x3A] = [
    0,    27,  b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', // 0x00-0x09
    b'9', b'0', b'-', b'=', 8,   b'\t', b'q', b'w', b'e', b'r', // 0x0A-0x13
    b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\r', 0,   // 0x14-0x1D (0x1D = ctrl, no ascii)
    b'a', b's', b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', // 0x1E-0x27
    b'\'', b'`', 0,    b'\\', b'z', b'x', b'c', b'v', b'b', b'n', // 0x28-0x31 (0x2A = shift, no ascii)
    b'm', b',', b'.', b'/', 0,    b'*', 0,    b' ',              // 0x32-0x39 (0x36 = shift, 0x38 = alt)
];

#[rustfmt::skip]
const ASCII_UPPER: [u8; 0x3A] = [
    0,    27,  b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*',
    b'(', b')', b'_', b'+', 8,   b'\t', b'Q', b'W', b'E', b'R',
    b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', b'\r', 0,
    b'A', b'S', b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':',
    b'"', b'~', 0,    b'|', b'Z', b'X', b'C', b'V', b'B', b'N',
    b'M', b'<', b'>', b'?', 0,    b'*', 0,    b' ',
];

#[derive(Debug, Default, Clone, Copy)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub caps_lock: bool,
    pub num_lock: bool,
    pub scroll_lock: bool,
}

/// Decodes raw scancode-set-1 bytes from port 0x60, maintaining modifier
/// state across calls (spec.md 4.4 "maintains modifier state").
#[derive(Debug, Default)]
pub struct KeyboardDecoder {
    pub modifiers: Modifiers,
}

/// Translates a make-code to ASCII given the current shift/caps state.
/// Caps lock only affects letters (spec.md's "shift" toggling covers
/// punctuation regardless of caps).
fn translate_ascii(make_code: u8, mods: Modifiers) -> u32 {
    let idx = make_code as usize;
    if idx >= ASCII_LOWER.len() {
        return 0;
    }
    let is_letter = ASCII_LOWER[idx].is_ascii_alphabetic();
    let shifted = if is_letter {
        mods.shift ^ mods.caps_lock
    } else {
        mods.shift
    };
    (if shifted { ASCII_UPPER[idx] } else { ASCII_LOWER[idx] }) as u32
}

impl KeyboardDecoder {
    pub const fn new() -> KeyboardDecoder {
        KeyboardDecoder {
            modifiers: Modifiers {
                shift: false,
                ctrl: false,
                alt: false,
                caps_lock: false,
                num_lock: false,
                scroll_lock: false,
            },
        }
    }

    /// Processes one scancode byte, updating modifier state and returning
    /// the event to post (spec.md 4.4: "posts either `KEY_PRESS` or
    /// `KEY_RELEASE` with the scancode in `data1`"). `data2` carries the
    /// ASCII translation and is preserved rather than zeroed afterward
    /// (spec.md 9 open question 2).
    pub fn handle_scancode(&mut self, scancode: u8) -> Event {
        let released = scancode & SCANCODE_RELEASE_BIT != 0;
        let make_code = scancode & !SCANCODE_RELEASE_BIT;

        match make_code {
            SCANCODE_LEFT_SHIFT | SCANCODE_RIGHT_SHIFT => self.modifiers.shift = !released,
            SCANCODE_LEFT_CTRL => self.modifiers.ctrl = !released,
            SCANCODE_LEFT_ALT => self.modifiers.alt = !released,
            SCANCODE_CAPS_LOCK if !released => self.modifiers.caps_lock = !self.modifiers.caps_lock,
            SCANCODE_NUM_LOCK if !released => self.modifiers.num_lock = !self.modifiers.num_lock,
            SCANCODE_SCROLL_LOCK if !released => {
                self.modifiers.scroll_lock = !self.modifiers.scroll_lock
            }
            _ => {}
        }

        let ascii = translate_ascii(make_code, self.modifiers);
        let kind = if released {
            EventKind::KeyRelease
        } else {
            EventKind::KeyPress
        };
        Event::new(kind, scancode as u32, ascii)
    }
}

/// Edge-detects button transitions from a raw 3-bit mask (bit0 left, bit1
/// right, bit2 middle), spec.md 4.4 "per-button MOUSE_CLICK/MOUSE_RELEASE
/// edge events by XOR of the old and new button mask".
/// Edge-detects button state between two 3-bit masks (bit 0 = left, 1 =
/// right, 2 = middle). Shared by the PS/2 decoder below and by USB HID's
/// boot-mouse poll path (`kernel_main::poll_usb_hid`), which integrates
/// its own absolute position but wants the same click/release framing.
pub fn button_events(old_mask: u8, new_mask: u8) -> Vec<(u8, bool)> {
    let mut out = Vec::new();
    for bit in 0..3u8 {
        let old_bit = (old_mask >> bit) & 1;
        let new_bit = (new_mask >> bit) & 1;
        if old_bit != new_bit {
            out.push((bit, new_bit != 0));
        }
    }
    out
}

/// Accumulates the standard 3-byte PS/2 mouse packet and integrates
/// relative motion into absolute, screen-clamped coordinates (spec.md 4.4,
/// 8 "Mouse integration clamps coordinates to `[0, width) x [0, height)`").
#[derive(Debug)]
pub struct MouseDecoder {
    buf: [u8; 3],
    fill: usize,
    pub x: i32,
    pub y: i32,
    buttons: u8,
    screen_w: i32,
    screen_h: i32,
}

impl MouseDecoder {
    pub fn new(screen_w: i32, screen_h: i32) -> MouseDecoder {
        MouseDecoder {
            buf: [0; 3],
            fill: 0,
            x: screen_w / 2,
            y: screen_h / 2,
            buttons: 0,
            screen_w,
            screen_h,
        }
    }

    fn sign_extend(high_bit: bool, delta: u8) -> i32 {
        if high_bit {
            delta as i32 - 256
        } else {
            delta as i32
        }
    }

    /// Feeds one raw byte. Packet framing is header-synchronized: a byte
    /// arriving as byte 0 whose bit 3 is clear is not a valid packet
    /// header and is discarded rather than accepted out of frame (spec.md
    /// 4.4 "validates the packet header (bit 3)").
    ///
    /// Returns every event the completed packet (if any) produces: a
    /// `MOUSE_MOVE` first, then edge `MOUSE_CLICK`/`MOUSE_RELEASE` events
    /// for each button whose state flipped.
    pub fn handle_byte(&mut self, byte: u8) -> Vec<Event> {
        if self.fill == 0 && byte & 0x08 == 0 {
            return Vec::new();
        }
        self.buf[self.fill] = byte;
        self.fill += 1;
        if self.fill < 3 {
            return Vec::new();
        }
        self.fill = 0;

        let status = self.buf[0];
        let dx = Self::sign_extend(status & 0x10 != 0, self.buf[1]);
        let dy = Self::sign_extend(status & 0x20 != 0, self.buf[2]);
        self.x = (self.x + dx).clamp(0, self.screen_w.saturating_sub(1));
        // PS/2 reports +Y as up; screen space grows downward.
        self.y = (self.y - dy).clamp(0, self.screen_h.saturating_sub(1));

        let new_buttons = status & 0x07;
        let old_buttons = self.buttons;
        self.buttons = new_buttons;

        let mut events = Vec::new();
        events.push(Event::new(
            EventKind::MouseMove,
            self.x as u32,
            self.y as u32,
        ));
        for (button, pressed) in button_events(old_buttons, new_buttons) {
            let kind = if pressed {
                EventKind::MouseClick
            } else {
                EventKind::MouseRelease
            };
            events.push(Event::new(kind, self.x as u32, (self.y as u32) | ((button as u32) << 24)));
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_press_then_release_round_trip() {
        let mut kb = KeyboardDecoder::new();
        let down = kb.handle_scancode(0x1E); // 'a' down
        assert_eq!(down.kind, EventKind::KeyPress);
        assert_eq!(down.data1, 0x1E);
        assert_eq!(down.data2, b'a' as u32);
        let up = kb.handle_scancode(0x1E | 0x80);
        assert_eq!(up.kind, EventKind::KeyRelease);
        assert_eq!(up.data1, 0x1E);
    }

    #[test]
    fn spec_scenario_2_keypress_round_trip() {
        let mut kb = KeyboardDecoder::new();
        let a_down = kb.handle_scancode(0x1E);
        let a_up = kb.handle_scancode(0x9E);
        assert_eq!((a_down.kind, a_down.data1), (EventKind::KeyPress, 0x1E));
        assert_eq!((a_up.kind, a_up.data1), (EventKind::KeyRelease, 0x1E));
    }

    #[test]
    fn shift_uppercases_letters() {
        let mut kb = KeyboardDecoder::new();
        kb.handle_scancode(SCANCODE_LEFT_SHIFT);
        let ev = kb.handle_scancode(0x1E); // 'a' -> 'A'
        assert_eq!(ev.data2, b'A' as u32);
    }

    #[test]
    fn caps_lock_toggles_on_press_only() {
        let mut kb = KeyboardDecoder::new();
        kb.handle_scancode(SCANCODE_CAPS_LOCK);
        assert!(kb.modifiers.caps_lock);
        kb.handle_scancode(SCANCODE_CAPS_LOCK | 0x80); // release must not re-toggle
        assert!(kb.modifiers.caps_lock);
    }

    #[test]
    fn mouse_rejects_out_of_sync_first_byte() {
        let mut m = MouseDecoder::new(800, 600);
        assert!(m.handle_byte(0x00).is_empty()); // bit3 clear, discarded
        assert!(m.handle_byte(0x08).is_empty());
        let events = m.handle_byte(1); // dx=1
        assert!(!events.is_empty()); // still waiting for byte 3
        // feeding dy completes the packet on the *next* call only if fill reached 3;
        // above call already consumed buf[1], so this call supplies buf[2].
    }

    #[test]
    fn mouse_move_integrates_and_clamps() {
        let mut m = MouseDecoder::new(100, 100);
        m.x = 50;
        m.y = 50;
        let events = m.handle_byte(0x08);
        assert!(events.is_empty());
        let events = m.handle_byte(200); // dx byte, no header bit yet needed mid-packet
        assert!(events.is_empty());
        let events = m.handle_byte(0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::MouseMove);
    }

    #[test]
    fn mouse_click_edge_detected_via_xor() {
        let mut m = MouseDecoder::new(800, 600);
        let events = m.handle_byte(0x08 | 0x01); // left button down, no motion
        let _ = events; // header byte only buffered
        let events = m.handle_byte(0);
        let events = {
            let mut v = events;
            v.extend(m.handle_byte(0));
            v
        };
        assert!(events.iter().any(|e| e.kind == EventKind::MouseClick));
    }

    #[test]
    fn mouse_coordinates_never_leave_screen_bounds() {
        let mut m = MouseDecoder::new(10, 10);
        m.x = 0;
        m.y = 0;
        // header with negative-x, negative-y sign bits and max magnitude
        m.handle_byte(0x08 | 0x10 | 0x20);
        m.handle_byte(0xFF);
        let events = m.handle_byte(0xFF);
        assert_eq!(events[0].kind, EventKind::MouseMove);
        assert!(m.x >= 0 && m.x < 10);
        assert!(m.y >= 0 && m.y < 10);
    }
}
