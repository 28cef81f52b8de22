//! Event router: the single consumer that drains [`crate::event::Event`]
//! from the ISR/main-loop queue and dispatches into the window manager,
//! taskbar, and shutdown controller (spec.md 4.8 "Event routing").

use crate::event::{Event, EventKind};

use super::manager::WindowManager;
use super::shutdown::{ShutdownController, ShutdownEvent};
use super::taskbar::TaskbarHit;
use super::widget::{WidgetPayload, WidgetState};
use super::window::TitleButton;

// Scancode set 1 values for the keys spec.md 6 "CLI surface" names as
// shortcuts. `ps2` itself only tracks modifier state; the router
// inspects the raw `data1` scancode directly for these, the same as the
// original firmware's key-shortcut table.
const SCANCODE_ESC: u32 = 0x01;
const SCANCODE_F1: u32 = 0x3B;
const SCANCODE_F2: u32 = 0x3C;
const SCANCODE_F11: u32 = 0x57;
const SCANCODE_LEFT_WIN: u32 = 0x5B;

/// Mouse events carry `(x, y, button-index)` per spec.md 3 "Event": `x`
/// in `data1`, `y` in the low 24 bits of `data2`, button index in its top
/// byte (see `ps2::MouseState::handle_byte`, which is what actually
/// posts these).
fn decode_mouse(event: &Event) -> (i32, i32, u8) {
    (event.data1 as i32, (event.data2 & 0x00FF_FFFF) as i32, (event.data2 >> 24) as u8)
}

const MOUSE_BUTTON_LEFT: u8 = 0;

/// Commands surfaced for the caller to act on outside the router itself
/// (serial dump, shutdown power-off) -- everything else is handled
/// internally against `wm`/`shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterCommand {
    None,
    ToggleDebugOverlay,
    DumpState,
    PowerOff,
}

pub struct EventRouter {
    pub debug_overlay: bool,
}

impl EventRouter {
    pub fn new() -> EventRouter {
        EventRouter { debug_overlay: false }
    }

    /// Dispatches one event per spec.md 4.8 rules 1-7, in priority order.
    pub fn route(
        &mut self,
        event: Event,
        wm: &mut WindowManager,
        shutdown: &mut ShutdownController,
    ) -> RouterCommand {
        // Rule 1: while the shutdown dialog is modal, only it and its
        // widgets receive events; everything else is consumed silently.
        if shutdown.is_modal() {
            self.route_modal(event, wm, shutdown);
            return RouterCommand::None;
        }

        match event.kind {
            EventKind::KeyPress => return self.route_key_press(event, wm),
            EventKind::MouseMove => self.route_mouse_move(event, wm),
            EventKind::MouseClick => {
                let (_, _, button) = decode_mouse(&event);
                if button == MOUSE_BUTTON_LEFT {
                    self.route_mouse_click(event, wm);
                }
            }
            EventKind::MouseRelease => self.route_mouse_release(event, wm),
            _ => {}
        }
        RouterCommand::None
    }

    fn route_modal(&mut self, event: Event, wm: &mut WindowManager, shutdown: &mut ShutdownController) {
        let Some(dialog_id) = shutdown.dialog_window() else { return };
        match event.kind {
            EventKind::MouseClick => {
                let (x, y, button) = decode_mouse(&event);
                if button != MOUSE_BUTTON_LEFT {
                    return;
                }
                let Some(widget_id) = wm.window(dialog_id).and_then(|w| w.hit_widget(x, y)) else { return };
                let Some(label) = wm.window(dialog_id).and_then(|w| w.widget(widget_id)).map(|w| w.label.clone())
                else {
                    return;
                };
                // "Yes"/"No" are distinguished by label, the way a
                // minimal two-button modal dialog would be.
                if label == "Yes" {
                    shutdown.answer_yes();
                } else if label == "No" {
                    shutdown.answer_no();
                }
            }
            EventKind::MouseMove => {
                let (x, y) = (event.data1 as i32, event.data2 as i32);
                if let Some(window) = wm.window_mut(dialog_id) {
                    for widget in window.widgets.iter_mut() {
                        widget.set_hovered(widget.geometry.contains_point(x, y));
                    }
                }
            }
            _ => {}
        }
    }

    fn route_key_press(&mut self, event: Event, wm: &mut WindowManager) -> RouterCommand {
        match event.data1 {
            SCANCODE_F1 => {
                self.debug_overlay = !self.debug_overlay;
                RouterCommand::ToggleDebugOverlay
            }
            SCANCODE_F2 => RouterCommand::DumpState,
            SCANCODE_F11 => {
                if let Some(id) = wm.focused_id() {
                    if wm.window(id).is_some_and(|w| w.maximized) {
                        wm.restore(id);
                    } else {
                        wm.maximize(id);
                    }
                }
                RouterCommand::None
            }
            SCANCODE_ESC => {
                if let Some(id) = wm.focused_id() {
                    wm.close_window(id);
                }
                RouterCommand::None
            }
            SCANCODE_LEFT_WIN => {
                wm.taskbar.start_menu_open = !wm.taskbar.start_menu_open;
                RouterCommand::None
            }
            _ => RouterCommand::None,
        }
    }

    fn route_mouse_move(&mut self, event: Event, wm: &mut WindowManager) {
        let (x, y) = (event.data1 as i32, event.data2 as i32);

        // Rule 3: a pending drag takes priority.
        if let Some(id) = wm.dragging_window() {
            wm.drag_to(id, x, y);
            return;
        }

        // Rule 7: hover transitions and an active slider drag.
        if let Some(id) = wm.hit_test(x, y) {
            if let Some(window) = wm.window_mut(id) {
                for widget in window.widgets.iter_mut() {
                    let hovered = widget.geometry.contains_point(x, y);
                    widget.set_hovered(hovered);
                    if widget.state == WidgetState::Pressed && matches!(widget.payload, WidgetPayload::Slider { .. }) {
                        widget.set_slider_from_x(x);
                    }
                }
            }
        }
    }

    fn route_mouse_click(&mut self, event: Event, wm: &mut WindowManager) {
        let (x, y, _button) = decode_mouse(&event);

        // Rule 4: taskbar strip.
        if let Some(hit) = wm.taskbar.hit_test(x, y) {
            self.handle_taskbar_hit(hit, wm);
            return;
        }

        // Rule 5: an open start menu captures clicks within its bounds.
        // The menu's own geometry belongs to the rendering layer; here
        // we only track "open", so any click outside the taskbar while
        // it is open dismisses it without further routing, matching a
        // single-level popup's usual click-outside-to-dismiss behavior.
        if wm.taskbar.start_menu_open {
            wm.taskbar.start_menu_open = false;
            return;
        }

        // Rule 6: topmost window; widgets are hit-tested before
        // title-bar buttons, which are tested before initiating a drag.
        let Some(id) = wm.hit_test(x, y) else { return };
        wm.focus_window(id);

        if let Some(widget_id) = wm.window(id).and_then(|w| w.hit_widget(x, y)) {
            if let Some(window) = wm.window_mut(id) {
                if let Some(widget) = window.widget_mut(widget_id) {
                    widget.state = WidgetState::Pressed;
                    if matches!(widget.payload, WidgetPayload::Slider { .. }) {
                        widget.set_slider_from_x(x);
                    }
                    if let Some(cb) = widget.on_click {
                        cb(id, widget_id);
                    }
                }
            }
            return;
        }

        if let Some(button) = wm.window(id).and_then(|w| w.hit_title_button(x, y)) {
            match button {
                TitleButton::Close => {
                    wm.close_window(id);
                }
                TitleButton::Maximize => {
                    if wm.window(id).is_some_and(|w| w.maximized) {
                        wm.restore(id);
                    } else {
                        wm.maximize(id);
                    }
                }
                TitleButton::Minimize => {
                    wm.minimize(id);
                }
            }
            return;
        }

        let in_title_bar = wm.window(id).is_some_and(|w| w.title_bar_rect().contains_point(x, y));
        if in_title_bar {
            wm.begin_drag(id, x, y);
        }
    }

    fn route_mouse_release(&mut self, event: Event, wm: &mut WindowManager) {
        let (x, y, _button) = decode_mouse(&event);

        // Rule 3: releasing ends a pending drag before anything else
        // sees the event.
        if let Some(id) = wm.dragging_window() {
            wm.end_drag(id);
            return;
        }

        if let Some(id) = wm.hit_test(x, y) {
            if let Some(window) = wm.window_mut(id) {
                for widget in window.widgets.iter_mut() {
                    if widget.state == WidgetState::Pressed {
                        widget.state = WidgetState::Normal;
                    }
                }
            }
        }
    }

    fn handle_taskbar_hit(&mut self, hit: TaskbarHit, wm: &mut WindowManager) {
        match hit {
            TaskbarHit::StartButton => {
                wm.taskbar.start_menu_open = !wm.taskbar.start_menu_open;
            }
            TaskbarHit::Clock => {
                wm.taskbar.toggle_clock_popup();
            }
            TaskbarHit::ScrollLeft => wm.taskbar.scroll_left(),
            TaskbarHit::ScrollRight => wm.taskbar.scroll_right(),
            TaskbarHit::AppButton(id) => {
                if wm.window(id).is_some_and(|w| w.minimized) {
                    wm.restore(id);
                }
                wm.focus_window(id);
            }
        }
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        EventRouter::new()
    }
}

/// Maps a [`ShutdownEvent`] produced by [`ShutdownController::tick`] onto
/// the same command channel the router uses, so `kernel_main` has one
/// place to check for "invoke platform power-off".
pub fn shutdown_command(event: ShutdownEvent) -> RouterCommand {
    match event {
        ShutdownEvent::PowerOff => RouterCommand::PowerOff,
        ShutdownEvent::None | ShutdownEvent::Canceled => RouterCommand::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::Rect;
    use crate::gui::shutdown::ShutdownController;
    use crate::gui::widget::{Widget, WidgetKind};
    use crate::gui::window::WindowCaps;
    use alloc::string::String;

    fn wm() -> WindowManager {
        WindowManager::new(1024, 768)
    }

    fn mouse_event(kind: EventKind, x: i32, y: i32, button: u8) -> Event {
        Event::new(kind, x as u32, (y as u32 & 0x00FF_FFFF) | ((button as u32) << 24))
    }

    #[test]
    fn esc_closes_focused_window() {
        let mut m = wm();
        let a = m.create_window(String::from("A"), Rect::new(0, 0, 100, 100), WindowCaps::NORMAL).unwrap();
        let mut router = EventRouter::new();
        let mut shutdown = ShutdownController::new();
        router.route(Event::new(EventKind::KeyPress, SCANCODE_ESC, 0), &mut m, &mut shutdown);
        assert!(m.window(a).is_none());
    }

    #[test]
    fn f11_toggles_maximize_on_focused() {
        let mut m = wm();
        let a = m.create_window(String::from("A"), Rect::new(10, 10, 200, 200), WindowCaps::NORMAL).unwrap();
        let mut router = EventRouter::new();
        let mut shutdown = ShutdownController::new();
        router.route(Event::new(EventKind::KeyPress, SCANCODE_F11, 0), &mut m, &mut shutdown);
        assert!(m.window(a).unwrap().maximized);
        router.route(Event::new(EventKind::KeyPress, SCANCODE_F11, 0), &mut m, &mut shutdown);
        assert!(!m.window(a).unwrap().maximized);
    }

    #[test]
    fn f1_toggles_debug_overlay() {
        let mut m = wm();
        let mut router = EventRouter::new();
        let mut shutdown = ShutdownController::new();
        let cmd = router.route(Event::new(EventKind::KeyPress, SCANCODE_F1, 0), &mut m, &mut shutdown);
        assert_eq!(cmd, RouterCommand::ToggleDebugOverlay);
        assert!(router.debug_overlay);
    }

    #[test]
    fn click_on_title_bar_starts_drag_then_move_follows_cursor() {
        let mut m = wm();
        let a = m.create_window(String::from("A"), Rect::new(100, 100, 300, 200), WindowCaps::NORMAL).unwrap();
        let mut router = EventRouter::new();
        let mut shutdown = ShutdownController::new();
        router.route(mouse_event(EventKind::MouseClick, 110, 110, 0), &mut m, &mut shutdown);
        assert_eq!(m.dragging_window(), Some(a));
        router.route(Event::new(EventKind::MouseMove, 250, 220), &mut m, &mut shutdown);
        assert_ne!(m.window(a).unwrap().geometry.x, 100);
    }

    #[test]
    fn modal_shutdown_consumes_non_dialog_clicks() {
        let mut m = wm();
        let background =
            m.create_window(String::from("Bg"), Rect::new(0, 0, 200, 200), WindowCaps::NORMAL).unwrap();
        let mut shutdown = ShutdownController::new();
        let dialog_id = shutdown.open(&mut m, Rect::new(300, 300, 200, 100)).unwrap();
        if let Some(dialog) = m.window_mut(dialog_id) {
            dialog.add_widget(Widget::new(WidgetKind::Button, String::from("Yes"), Rect::new(310, 360, 60, 24)));
            dialog.add_widget(Widget::new(WidgetKind::Button, String::from("No"), Rect::new(420, 360, 60, 24)));
        }
        let mut router = EventRouter::new();

        router.route(mouse_event(EventKind::MouseClick, 10, 10, 0), &mut m, &mut shutdown);
        assert!(m.window(background).is_some());
        assert_eq!(shutdown.state, crate::gui::shutdown::ShutdownState::Dialog);

        router.route(mouse_event(EventKind::MouseClick, 320, 370, 0), &mut m, &mut shutdown);
        assert_eq!(shutdown.state, crate::gui::shutdown::ShutdownState::Confirming);
    }
}


