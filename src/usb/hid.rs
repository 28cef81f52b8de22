//! USB HID boot-protocol report decoding (GLOSSARY "Boot protocol
//! (HID)"). Feeds the same event queue PS/2 drivers post into, per
//! spec.md 4.6 "the USB poll routine ... posts decoded key/mouse events
//! into the same event queue used by PS/2 drivers."

use crate::event::{Event, EventKind};

/// Standard 8-byte boot-protocol keyboard report: modifier byte,
/// reserved byte, then up to 6 simultaneous keycodes.
pub fn decode_boot_keyboard_report(report: &[u8], prev_keys: &[u8; 6]) -> (Vec8Events, [u8; 6]) {
    let mut keys = [0u8; 6];
    if report.len() >= 8 {
        keys.copy_from_slice(&report[2..8]);
    }

    let mut events = Vec8Events::new();
    for &k in &keys {
        if k != 0 && !prev_keys.contains(&k) {
            events.push(Event::new(EventKind::KeyPress, k as u32, 0));
        }
    }
    for &k in prev_keys {
        if k != 0 && !keys.contains(&k) {
            events.push(Event::new(EventKind::KeyRelease, k as u32, 0));
        }
    }
    (events, keys)
}

/// Standard 3-byte boot-protocol mouse report: button mask, signed
/// ΔX, signed ΔY. Mirrors the PS/2 mouse packet shape so both drivers
/// can share one decoder downstream (spec.md 4.4, 4.6).
pub fn decode_boot_mouse_report(report: &[u8]) -> Option<(u8, i8, i8)> {
    if report.len() < 3 {
        return None;
    }
    Some((report[0] & 0x07, report[1] as i8, report[2] as i8))
}

/// Small fixed-capacity vec to avoid pulling in `alloc::vec::Vec` for a
/// report that can never carry more than 6 events.
pub struct Vec8Events {
    buf: [Event; 6],
    len: usize,
}

impl Vec8Events {
    fn new() -> Vec8Events {
        Vec8Events {
            buf: [Event::NONE; 6],
            len: 0,
        }
    }

    fn push(&mut self, e: Event) {
        if self.len < self.buf.len() {
            self.buf[self.len] = e;
            self.len += 1;
        }
    }

    pub fn as_slice(&self) -> &[Event] {
        &self.buf[..self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyboard_report_detects_press_and_release() {
        let prev = [0u8; 6];
        let report = [0u8, 0, 0x04, 0, 0, 0, 0, 0]; // key 'a' down
        let (events, keys) = decode_boot_keyboard_report(&report, &prev);
        assert_eq!(events.as_slice().len(), 1);
        assert_eq!(events.as_slice()[0].kind, EventKind::KeyPress);

        let released = [0u8; 8];
        let (events2, _) = decode_boot_keyboard_report(&released, &keys);
        assert_eq!(events2.as_slice().len(), 1);
        assert_eq!(events2.as_slice()[0].kind, EventKind::KeyRelease);
    }

    #[test]
    fn mouse_report_decodes_buttons_and_deltas() {
        let report = [0x01u8, (-5i8) as u8, 10u8];
        let (buttons, dx, dy) = decode_boot_mouse_report(&report).unwrap();
        assert_eq!(buttons, 1);
        assert_eq!(dx, -5);
        assert_eq!(dy, 10);
    }

    #[test]
    fn short_report_is_rejected() {
        assert!(decode_boot_mouse_report(&[0u8]).is_none());
    }
}
