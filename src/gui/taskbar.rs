//! Taskbar strip: app buttons, scroll arrows, start button, and clock
//! (spec.md 4.8 "Taskbar"; `SPEC_FULL.md` "taskbar clock popup
//! double-click behavior and scroll arrows").

use crate::display::Rect;
use alloc::string::String;
use alloc::vec::Vec;

use super::window::WindowId;

pub const TASKBAR_HEIGHT: u32 = 40;
const START_BUTTON_WIDTH: u32 = 80;
const CLOCK_WIDTH: u32 = 90;
const SCROLL_ARROW_WIDTH: u32 = 16;
const APP_BUTTON_WIDTH: u32 = 140;

/// Clock refresh cadence, spec.md 4.8 "reads RTC once per ~0.5 s", at the
/// 100 Hz tick rate `pit` drives the main loop with.
const CLOCK_REFRESH_TICKS: u64 = 50;
/// Date popup refresh cadence while open, spec.md 4.8 "updates time at
/// 10 Hz while open".
const POPUP_REFRESH_TICKS: u64 = 10;

pub struct TaskbarButton {
    pub window_id: WindowId,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskbarHit {
    StartButton,
    Clock,
    ScrollLeft,
    ScrollRight,
    AppButton(WindowId),
}

pub struct Taskbar {
    screen_w: u32,
    buttons: Vec<TaskbarButton>,
    scroll_offset: usize,
    pub start_menu_open: bool,
    pub clock_popup_open: bool,
    last_clock_tick: u64,
    last_popup_tick: u64,
}

impl Taskbar {
    pub fn new(screen_w: u32) -> Taskbar {
        Taskbar {
            screen_w,
            buttons: Vec::new(),
            scroll_offset: 0,
            start_menu_open: false,
            clock_popup_open: false,
            last_clock_tick: 0,
            last_popup_tick: 0,
        }
    }

    pub fn resize(&mut self, screen_w: u32) {
        self.screen_w = screen_w;
    }

    /// Registers a button for a window with `WINDOW_IN_TASKBAR` set
    /// (spec.md 4.8 "Registers a button per window with `in_taskbar =
    /// true`").
    pub fn register(&mut self, window_id: WindowId, label: String) {
        self.buttons.push(TaskbarButton { window_id, label });
    }

    pub fn unregister(&mut self, window_id: WindowId) {
        self.buttons.retain(|b| b.window_id != window_id);
        let slots = self.visible_slots();
        if self.scroll_offset > 0 && self.scroll_offset + slots > self.buttons.len() {
            self.scroll_offset = self.buttons.len().saturating_sub(slots);
        }
    }

    pub fn rename(&mut self, window_id: WindowId, label: String) {
        if let Some(b) = self.buttons.iter_mut().find(|b| b.window_id == window_id) {
            b.label = label;
        }
    }

    fn visible_slots(&self) -> usize {
        let usable = self
            .screen_w
            .saturating_sub(START_BUTTON_WIDTH + CLOCK_WIDTH + 2 * SCROLL_ARROW_WIDTH);
        ((usable / APP_BUTTON_WIDTH).max(1)) as usize
    }

    /// spec.md 4.8 "Scroll left/right when buttons exceed visible slots."
    pub fn scroll_left(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(1);
    }

    pub fn scroll_right(&mut self) {
        if self.scroll_offset + self.visible_slots() < self.buttons.len() {
            self.scroll_offset += 1;
        }
    }

    pub fn can_scroll_left(&self) -> bool {
        self.scroll_offset > 0
    }

    pub fn can_scroll_right(&self) -> bool {
        self.scroll_offset + self.visible_slots() < self.buttons.len()
    }

    pub fn strip_rect(&self) -> Rect {
        Rect::new(0, 0, self.screen_w, TASKBAR_HEIGHT)
    }

    pub fn start_button_rect(&self) -> Rect {
        Rect::new(0, 0, START_BUTTON_WIDTH, TASKBAR_HEIGHT)
    }

    pub fn clock_rect(&self) -> Rect {
        Rect::new(self.screen_w as i32 - CLOCK_WIDTH as i32, 0, CLOCK_WIDTH, TASKBAR_HEIGHT)
    }

    fn scroll_left_rect(&self) -> Rect {
        Rect::new(self.clock_rect().x - 2 * SCROLL_ARROW_WIDTH as i32, 0, SCROLL_ARROW_WIDTH, TASKBAR_HEIGHT)
    }

    fn scroll_right_rect(&self) -> Rect {
        Rect::new(self.clock_rect().x - SCROLL_ARROW_WIDTH as i32, 0, SCROLL_ARROW_WIDTH, TASKBAR_HEIGHT)
    }

    /// Rect for the visible app-button `slot` (post-scroll-offset index).
    pub fn button_rect(&self, slot: usize) -> Rect {
        let x = START_BUTTON_WIDTH as i32 + slot as i32 * APP_BUTTON_WIDTH as i32;
        Rect::new(x, 0, APP_BUTTON_WIDTH, TASKBAR_HEIGHT)
    }

    pub fn visible_buttons(&self) -> impl Iterator<Item = (usize, &TaskbarButton)> {
        let slots = self.visible_slots();
        self.buttons
            .iter()
            .enumerate()
            .skip(self.scroll_offset)
            .take(slots)
    }

    /// spec.md 4.8 "Clicks in the taskbar strip route to the taskbar
    /// (start button, clock, scroll arrows, app buttons)".
    pub fn hit_test(&self, x: i32, y: i32) -> Option<TaskbarHit> {
        if !self.strip_rect().contains_point(x, y) {
            return None;
        }
        if self.start_button_rect().contains_point(x, y) {
            return Some(TaskbarHit::StartButton);
        }
        if self.clock_rect().contains_point(x, y) {
            return Some(TaskbarHit::Clock);
        }
        if self.can_scroll_left() && self.scroll_left_rect().contains_point(x, y) {
            return Some(TaskbarHit::ScrollLeft);
        }
        if self.can_scroll_right() && self.scroll_right_rect().contains_point(x, y) {
            return Some(TaskbarHit::ScrollRight);
        }
        for (slot, (_, button)) in self.visible_buttons().enumerate() {
            if self.button_rect(slot).contains_point(x, y) {
                return Some(TaskbarHit::AppButton(button.window_id));
            }
        }
        None
    }

    /// `true` once per ~0.5 s (spec.md 4.8); `tick` is the PIT's
    /// monotonic 100 Hz counter.
    pub fn clock_due(&mut self, tick: u64) -> bool {
        if tick.saturating_sub(self.last_clock_tick) >= CLOCK_REFRESH_TICKS {
            self.last_clock_tick = tick;
            true
        } else {
            false
        }
    }

    /// `true` at 10 Hz while the date popup is open, spec.md 4.8.
    pub fn popup_due(&mut self, tick: u64) -> bool {
        if !self.clock_popup_open {
            return false;
        }
        if tick.saturating_sub(self.last_popup_tick) >= POPUP_REFRESH_TICKS {
            self.last_popup_tick = tick;
            true
        } else {
            false
        }
    }

    /// Double-click on the clock toggles the date popup,
    /// `SPEC_FULL.md` "taskbar clock popup double-click behavior".
    pub fn toggle_clock_popup(&mut self) {
        self.clock_popup_open = !self.clock_popup_open;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_test_finds_start_button() {
        let tb = Taskbar::new(1024);
        assert_eq!(tb.hit_test(10, 10), Some(TaskbarHit::StartButton));
    }

    #[test]
    fn hit_test_finds_clock() {
        let tb = Taskbar::new(1024);
        let c = tb.clock_rect();
        assert_eq!(tb.hit_test(c.x + 5, 5), Some(TaskbarHit::Clock));
    }

    #[test]
    fn scroll_right_bounded_by_button_count() {
        let mut tb = Taskbar::new(400);
        for i in 0..10u32 {
            tb.register(i, String::from("app"));
        }
        assert!(tb.can_scroll_right());
        for _ in 0..20 {
            tb.scroll_right();
        }
        assert!(!tb.can_scroll_right());
    }

    #[test]
    fn clock_due_fires_at_half_second_cadence() {
        let mut tb = Taskbar::new(1024);
        assert!(!tb.clock_due(10));
        assert!(tb.clock_due(50));
        assert!(!tb.clock_due(60));
        assert!(tb.clock_due(100));
    }

    #[test]
    fn popup_due_only_while_open() {
        let mut tb = Taskbar::new(1024);
        assert!(!tb.popup_due(100));
        tb.toggle_clock_popup();
        assert!(tb.popup_due(100));
        assert!(!tb.popup_due(105));
        assert!(tb.popup_due(110));
    }

    #[test]
    fn unregister_removes_button_and_clamps_scroll() {
        let mut tb = Taskbar::new(1024);
        tb.register(1, String::from("a"));
        tb.register(2, String::from("b"));
        tb.unregister(1);
        assert_eq!(tb.visible_buttons().count(), 1);
    }
}
