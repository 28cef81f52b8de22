//! Window identity, geometry, and lifecycle (spec.md 3 "Window", 4.8
//! "Window lifecycle").
//!
//! A window is modeled as an owned value inside [`super::manager`]'s
//! `Vec<Window>` rather than the source's intrusive doubly-linked list —
//! the list order itself *is* z-order (tail = topmost), which is exactly
//! what `SPEC_FULL.md`'s "global mutable state" note asks for: the same
//! invariant, expressed without raw next/prev pointers. The registry
//! (`super::registry`) is the only handle a caller is allowed to hold
//! across window-manager calls; this struct lives behind it.

use crate::display::Rect;
use alloc::string::String;
use alloc::vec::Vec;
use bitflags::bitflags;

use super::widget::Widget;

pub type WindowId = u32;

bitflags! {
    /// Capability bits, spec.md 3 "Window": "capability bits
    /// (closable/movable/resizable/minimizable/maximizable/has-title/in-taskbar)".
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WindowCaps: u8 {
        const CLOSABLE    = 1 << 0;
        const MOVABLE     = 1 << 1;
        const RESIZABLE   = 1 << 2;
        const MINIMIZABLE = 1 << 3;
        const MAXIMIZABLE = 1 << 4;
        const HAS_TITLE   = 1 << 5;
        const IN_TASKBAR  = 1 << 6;
    }
}

impl WindowCaps {
    /// Everything but the in-taskbar flag -- the common case for a plain
    /// movable/resizable/closable app window.
    pub const NORMAL: WindowCaps = WindowCaps::from_bits_truncate(
        WindowCaps::CLOSABLE.bits()
            | WindowCaps::MOVABLE.bits()
            | WindowCaps::RESIZABLE.bits()
            | WindowCaps::MINIMIZABLE.bits()
            | WindowCaps::MAXIMIZABLE.bits()
            | WindowCaps::HAS_TITLE.bits()
            | WindowCaps::IN_TASKBAR.bits(),
    );

    /// A modal dialog: has a title and can be closed, nothing else.
    pub const MODAL: WindowCaps =
        WindowCaps::from_bits_truncate(WindowCaps::CLOSABLE.bits() | WindowCaps::HAS_TITLE.bits());
}

pub const TITLE_BAR_HEIGHT: u32 = 24;
const TITLE_BUTTON_SIZE: u32 = 18;
const TITLE_BUTTON_MARGIN: i32 = 3;
const TITLE_BUTTON_GAP: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleButton {
    Close,
    Maximize,
    Minimize,
}

const TITLE_BUTTON_ORDER: [TitleButton; 3] =
    [TitleButton::Close, TitleButton::Maximize, TitleButton::Minimize];

/// Typed lifecycle callbacks, spec.md 3 "typed callbacks
/// (on_close/focus/minimize/maximize/restore/resize)". Plain function
/// pointers rather than closures: nothing here captures state, and a
/// `fn(WindowId)` costs nothing to store in a `#[no_std]` struct, unlike
/// a `dyn Fn` which would need heap-boxing just to be `Sized`.
#[derive(Clone, Copy)]
pub struct WindowCallbacks {
    pub on_close: Option<fn(WindowId)>,
    pub on_focus: Option<fn(WindowId)>,
    pub on_minimize: Option<fn(WindowId)>,
    pub on_maximize: Option<fn(WindowId)>,
    pub on_restore: Option<fn(WindowId)>,
    pub on_resize: Option<fn(WindowId)>,
}

impl Default for WindowCallbacks {
    fn default() -> Self {
        WindowCallbacks {
            on_close: None,
            on_focus: None,
            on_minimize: None,
            on_maximize: None,
            on_restore: None,
            on_resize: None,
        }
    }
}

pub struct Window {
    pub id: WindowId,
    pub title: String,
    pub geometry: Rect,
    pub z_index: u32,
    pub caps: WindowCaps,
    /// Capability bits as they were immediately before a maximize, so
    /// `restore` can put them back exactly (spec.md 8 "maximize . restore
    /// = identity ... on capability flags").
    saved_caps: WindowCaps,
    pub visible: bool,
    pub focused: bool,
    pub minimized: bool,
    pub maximized: bool,
    pub dragging: bool,
    pub needs_redraw: bool,
    pub drag_offset: (i32, i32),
    /// Geometry to return to on `restore`, spec.md 3 "saved 'normal'
    /// geometry for restore from max/min".
    pub saved_geometry: Rect,
    pub widgets: Vec<Widget>,
    pub callbacks: WindowCallbacks,
}

impl Window {
    pub fn new(id: WindowId, title: String, geometry: Rect, caps: WindowCaps, z_index: u32) -> Window {
        Window {
            id,
            title,
            geometry,
            z_index,
            caps,
            saved_caps: caps,
            visible: true,
            focused: false,
            minimized: false,
            maximized: false,
            dragging: false,
            needs_redraw: true,
            drag_offset: (0, 0),
            saved_geometry: geometry,
            widgets: Vec::new(),
            callbacks: WindowCallbacks::default(),
        }
    }

    pub fn add_widget(&mut self, widget: Widget) -> u32 {
        let id = self.widgets.len() as u32;
        self.widgets.push(widget);
        self.needs_redraw = true;
        id
    }

    pub fn widget(&self, id: u32) -> Option<&Widget> {
        self.widgets.get(id as usize)
    }

    pub fn widget_mut(&mut self, id: u32) -> Option<&mut Widget> {
        self.widgets.get_mut(id as usize)
    }

    pub fn title_bar_rect(&self) -> Rect {
        Rect::new(self.geometry.x, self.geometry.y, self.geometry.w, TITLE_BAR_HEIGHT)
    }

    fn title_button_enabled(&self, button: TitleButton) -> bool {
        match button {
            TitleButton::Close => self.caps.contains(WindowCaps::CLOSABLE),
            TitleButton::Maximize => self.caps.contains(WindowCaps::MAXIMIZABLE),
            TitleButton::Minimize => self.caps.contains(WindowCaps::MINIMIZABLE),
        }
    }

    /// Title-bar button rect, laid out right to left: close, maximize,
    /// minimize. Returns `None` when the window has no title bar at all.
    pub fn title_button_rect(&self, button: TitleButton) -> Option<Rect> {
        if !self.caps.contains(WindowCaps::HAS_TITLE) {
            return None;
        }
        let slot = TITLE_BUTTON_ORDER.iter().position(|b| *b == button)? as i32;
        let stride = TITLE_BUTTON_SIZE as i32 + TITLE_BUTTON_GAP;
        let right_edge = self.geometry.x + self.geometry.w as i32 - TITLE_BUTTON_MARGIN;
        let x = right_edge - (slot + 1) * stride + TITLE_BUTTON_GAP;
        Some(Rect::new(
            x,
            self.geometry.y + TITLE_BUTTON_MARGIN,
            TITLE_BUTTON_SIZE,
            TITLE_BUTTON_SIZE,
        ))
    }

    /// Title-bar buttons are tested before a drag is initiated (spec.md
    /// 4.8 rule 6); only enabled buttons (per capability bits) are hit.
    pub fn hit_title_button(&self, x: i32, y: i32) -> Option<TitleButton> {
        TITLE_BUTTON_ORDER.into_iter().find(|&b| {
            self.title_button_enabled(b)
                && self
                    .title_button_rect(b)
                    .is_some_and(|r| r.contains_point(x, y))
        })
    }

    /// Topmost (last-added) widget containing the point, spec.md 4.8
    /// rule 6 "widgets are hit-tested before the title-bar buttons".
    pub fn hit_widget(&self, x: i32, y: i32) -> Option<u32> {
        self.widgets
            .iter()
            .enumerate()
            .rev()
            .find(|(_, w)| w.enabled() && w.geometry.contains_point(x, y))
            .map(|(i, _)| i as u32)
    }

    /// spec.md 4.8: "maximize -> position=(0,0),
    /// size=(screen_w, screen_h - taskbar); movable/resizable cleared".
    pub fn maximize(&mut self, screen_w: u32, screen_h: u32, taskbar_height: u32) -> bool {
        if !self.caps.contains(WindowCaps::MAXIMIZABLE) || self.maximized {
            return false;
        }
        self.saved_geometry = self.geometry;
        self.saved_caps = self.caps;
        self.geometry = Rect::new(0, 0, screen_w, screen_h.saturating_sub(taskbar_height));
        self.maximized = true;
        self.caps.remove(WindowCaps::MOVABLE | WindowCaps::RESIZABLE);
        if let Some(cb) = self.callbacks.on_maximize {
            cb(self.id);
        }
        self.needs_redraw = true;
        true
    }

    /// spec.md 4.8: "minimize -> invisible, position and size preserved
    /// as 'saved'".
    pub fn minimize(&mut self) -> bool {
        if !self.caps.contains(WindowCaps::MINIMIZABLE) || self.minimized {
            return false;
        }
        self.saved_geometry = self.geometry;
        self.minimized = true;
        self.visible = false;
        self.focused = false;
        if let Some(cb) = self.callbacks.on_minimize {
            cb(self.id);
        }
        true
    }

    /// spec.md 4.8: "restore -> return to saved geometry; detected from
    /// saved fields whether prior state was max or normal"; spec.md 8
    /// round-trip laws `minimize . restore = identity`,
    /// `maximize . restore = identity`.
    pub fn restore(&mut self) -> bool {
        if !self.minimized && !self.maximized {
            return false;
        }
        let was_maximized = self.maximized;
        self.geometry = self.saved_geometry;
        self.minimized = false;
        self.maximized = false;
        self.visible = true;
        if was_maximized {
            self.caps = self.saved_caps;
        }
        if let Some(cb) = self.callbacks.on_restore {
            cb(self.id);
        }
        self.needs_redraw = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> Window {
        Window::new(1, String::from("Test"), Rect::new(200, 100, 400, 300), WindowCaps::NORMAL, 0)
    }

    #[test]
    fn maximize_then_restore_is_identity() {
        let mut w = window();
        let original_geometry = w.geometry;
        let original_caps = w.caps;
        assert!(w.maximize(1024, 768, 40));
        assert_eq!(w.geometry, Rect::new(0, 0, 1024, 728));
        assert!(!w.caps.contains(WindowCaps::MOVABLE));
        assert!(w.restore());
        assert_eq!(w.geometry, original_geometry);
        assert_eq!(w.caps, original_caps);
    }

    #[test]
    fn minimize_then_restore_is_identity() {
        let mut w = window();
        let original_geometry = w.geometry;
        let original_caps = w.caps;
        assert!(w.minimize());
        assert!(!w.visible);
        assert!(w.restore());
        assert!(w.visible);
        assert_eq!(w.geometry, original_geometry);
        assert_eq!(w.caps, original_caps);
    }

    #[test]
    fn title_buttons_ordered_right_to_left() {
        let w = window();
        let close = w.title_button_rect(TitleButton::Close).unwrap();
        let maximize = w.title_button_rect(TitleButton::Maximize).unwrap();
        let minimize = w.title_button_rect(TitleButton::Minimize).unwrap();
        assert!(close.x > maximize.x);
        assert!(maximize.x > minimize.x);
    }

    #[test]
    fn disabled_capability_is_not_hit() {
        let mut w = window();
        w.caps.remove(WindowCaps::CLOSABLE);
        let close_rect = w.title_button_rect(TitleButton::Close).unwrap();
        assert_eq!(w.hit_title_button(close_rect.x + 2, close_rect.y + 2), None);
    }

    #[test]
    fn hit_widget_prefers_topmost() {
        use super::super::widget::{Widget, WidgetKind};
        let mut w = window();
        w.add_widget(Widget::new(WidgetKind::Button, String::from("a"), Rect::new(0, 0, 400, 300)));
        w.add_widget(Widget::new(WidgetKind::Button, String::from("b"), Rect::new(10, 10, 50, 20)));
        assert_eq!(w.hit_widget(20, 20), Some(1));
    }
}
