//! Modal shutdown state machine (spec.md 4.8 "Shutdown state machine", 8
//! scenario 6).
//!
//! Four states with an animated darken level `L in 0..200`: `Idle` (L=0),
//! `Dialog` (L ramps 0->100, modal, hides every other window), then
//! either `Canceling` (L ramps back to 0, hidden windows reappear) or
//! `Confirming` (L ramps 100->200, then the caller invokes the platform
//! power-off sequence).

use alloc::string::String;
use alloc::vec::Vec;

use super::manager::WindowManager;
use super::window::{WindowCaps, WindowId};
use crate::display::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Idle,
    Dialog,
    Canceling,
    Confirming,
}

/// Darken level the dialog state ramps toward, spec.md 4.8 "DIALOG (L
/// ramps 0->100)".
pub const DARKEN_DIALOG_TARGET: u8 = 100;
/// Darken level the confirm state ramps toward before invoking platform
/// power-off, spec.md 4.8 "CONFIRMING (L ramps 100->200 toward black)".
pub const DARKEN_MAX: u8 = 200;
/// Per-tick ramp step. At the 10 Hz logical tick rate `pit` posts
/// `EVENT_TIMER_TICK` at, this animates the 0->100 and 100->200 legs over
/// roughly half a second each.
const RAMP_STEP: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownEvent {
    None,
    /// The dialog was canceled and all previously-hidden windows have
    /// been restored; the WM is back to an `Idle` state equivalent to
    /// before the dialog opened (spec.md 8 scenario 6).
    Canceled,
    /// Darken has reached [`DARKEN_MAX`]; the caller should now invoke
    /// the platform shutdown sequence (spec.md 6 "Exit behavior").
    PowerOff,
}

pub struct ShutdownController {
    pub state: ShutdownState,
    pub darken: u8,
    hidden: Vec<WindowId>,
    dialog_window: Option<WindowId>,
}

impl ShutdownController {
    pub fn new() -> ShutdownController {
        ShutdownController {
            state: ShutdownState::Idle,
            darken: 0,
            hidden: Vec::new(),
            dialog_window: None,
        }
    }

    pub fn is_modal(&self) -> bool {
        self.state != ShutdownState::Idle
    }

    pub fn dialog_window(&self) -> Option<WindowId> {
        self.dialog_window
    }

    /// User selected "Shutdown": hides every currently-visible window
    /// and opens the modal Yes/No dialog (spec.md 4.8 "hides all other
    /// windows; modal dialog with Yes/No"). A no-op if already modal.
    pub fn open(&mut self, wm: &mut WindowManager, dialog_geometry: Rect) -> Option<WindowId> {
        if self.state != ShutdownState::Idle {
            return None;
        }
        self.hidden.clear();
        for w in wm.windows_back_to_front() {
            if w.visible {
                self.hidden.push(w.id);
            }
        }
        for id in self.hidden.clone() {
            wm.set_visible(id, false);
        }
        let dialog_id = wm.create_window(String::from("Shut Down"), dialog_geometry, WindowCaps::MODAL);
        self.dialog_window = dialog_id;
        self.state = ShutdownState::Dialog;
        self.darken = 0;
        dialog_id
    }

    /// "No": begins the cancel ramp back to `Idle`.
    pub fn answer_no(&mut self) {
        if self.state == ShutdownState::Dialog {
            self.state = ShutdownState::Canceling;
        }
    }

    /// "Yes": begins the confirm ramp toward power-off.
    pub fn answer_yes(&mut self) {
        if self.state == ShutdownState::Dialog {
            self.state = ShutdownState::Confirming;
        }
    }

    /// Advances the darken animation by one main-loop tick. Call once
    /// per tick regardless of state; it is a no-op in `Idle`.
    pub fn tick(&mut self, wm: &mut WindowManager) -> ShutdownEvent {
        match self.state {
            ShutdownState::Idle => ShutdownEvent::None,
            ShutdownState::Dialog => {
                self.darken = (self.darken + RAMP_STEP).min(DARKEN_DIALOG_TARGET);
                ShutdownEvent::None
            }
            ShutdownState::Canceling => {
                self.darken = self.darken.saturating_sub(RAMP_STEP);
                if self.darken == 0 {
                    self.restore_hidden(wm);
                    self.state = ShutdownState::Idle;
                    ShutdownEvent::Canceled
                } else {
                    ShutdownEvent::None
                }
            }
            ShutdownState::Confirming => {
                self.darken = (self.darken + RAMP_STEP).min(DARKEN_MAX);
                if self.darken >= DARKEN_MAX {
                    ShutdownEvent::PowerOff
                } else {
                    ShutdownEvent::None
                }
            }
        }
    }

    fn restore_hidden(&mut self, wm: &mut WindowManager) {
        if let Some(id) = self.dialog_window.take() {
            wm.close_window(id);
        }
        for id in self.hidden.drain(..) {
            wm.set_visible(id, true);
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        ShutdownController::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;

    fn wm_with_window() -> (WindowManager, WindowId) {
        let mut wm = WindowManager::new(1024, 768);
        let id = wm
            .create_window(String::from("Notes"), Rect::new(10, 10, 200, 200), WindowCaps::NORMAL)
            .unwrap();
        (wm, id)
    }

    #[test]
    fn cancel_ramps_down_and_restores_windows_verbatim() {
        let (mut wm, id) = wm_with_window();
        let before = wm.window(id).unwrap().geometry;
        let mut sd = ShutdownController::new();
        sd.open(&mut wm, Rect::new(300, 300, 300, 150));
        assert!(!wm.window(id).unwrap().visible);
        for _ in 0..20 {
            sd.tick(&mut wm);
        }
        assert_eq!(sd.state, ShutdownState::Dialog);
        assert_eq!(sd.darken, DARKEN_DIALOG_TARGET);

        sd.answer_no();
        assert_eq!(sd.state, ShutdownState::Canceling);
        let mut event = ShutdownEvent::None;
        for _ in 0..20 {
            event = sd.tick(&mut wm);
            if event != ShutdownEvent::None {
                break;
            }
        }
        assert_eq!(event, ShutdownEvent::Canceled);
        assert_eq!(sd.state, ShutdownState::Idle);
        assert!(wm.window(id).unwrap().visible);
        assert_eq!(wm.window(id).unwrap().geometry, before);
    }

    #[test]
    fn confirm_ramps_to_power_off() {
        let (mut wm, _id) = wm_with_window();
        let mut sd = ShutdownController::new();
        sd.open(&mut wm, Rect::new(300, 300, 300, 150));
        for _ in 0..20 {
            sd.tick(&mut wm);
        }
        sd.answer_yes();
        let mut event = ShutdownEvent::None;
        for _ in 0..40 {
            event = sd.tick(&mut wm);
            if event != ShutdownEvent::None {
                break;
            }
        }
        assert_eq!(event, ShutdownEvent::PowerOff);
        assert_eq!(sd.darken, DARKEN_MAX);
    }

    #[test]
    fn modal_flag_tracks_state() {
        let (mut wm, _id) = wm_with_window();
        let mut sd = ShutdownController::new();
        assert!(!sd.is_modal());
        sd.open(&mut wm, Rect::new(300, 300, 300, 150));
        assert!(sd.is_modal());
    }
}
