//! Widget types and state (spec.md 3 "Widget").
//!
//! Geometry is stored absolute; an optional [`RelativeGeometry`] lets a
//! parent resize recompute it from fractions of the parent's client area
//! without floating point, which this `+soft-float` kernel target would
//! otherwise have to pull in `compiler-builtins`' float routines for --
//! a permille fixed-point fraction is the idiomatic no_std way to express
//! "40% across" and is exact integer math throughout.

use crate::display::Rect;
use alloc::string::String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    Button,
    Label,
    Checkbox,
    Slider,
    ProgressBar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetState {
    Normal,
    Hover,
    Pressed,
    Focused,
    Disabled,
}

/// Type-specific payload, spec.md 3 "slider stores `[min,max,value]`".
#[derive(Debug, Clone, Copy)]
pub enum WidgetPayload {
    None,
    Checkbox { checked: bool },
    Slider { min: i32, max: i32, value: i32 },
    ProgressBar { min: i32, max: i32, value: i32 },
}

/// Fractional geometry relative to the parent window's client area, in
/// permille (0..1000) so resizing the parent never needs float math.
#[derive(Debug, Clone, Copy)]
pub struct RelativeGeometry {
    pub x_permille: u32,
    pub y_permille: u32,
    pub w_permille: u32,
    pub h_permille: u32,
}

impl RelativeGeometry {
    /// Resolves against `parent`, the window's client rect.
    pub fn resolve(&self, parent: Rect) -> Rect {
        let scale = |dim: u32, permille: u32| -> u32 { ((dim as u64 * permille as u64) / 1000) as u32 };
        Rect::new(
            parent.x + scale(parent.w, self.x_permille) as i32,
            parent.y + scale(parent.h, self.y_permille) as i32,
            scale(parent.w, self.w_permille),
            scale(parent.h, self.h_permille),
        )
    }
}

pub struct Widget {
    pub kind: WidgetKind,
    pub label: String,
    pub geometry: Rect,
    pub relative: Option<RelativeGeometry>,
    pub state: WidgetState,
    pub payload: WidgetPayload,
    pub on_click: Option<fn(WindowId, u32)>,
    pub on_hover: Option<fn(WindowId, u32)>,
}

use super::window::WindowId;

impl Widget {
    pub fn new(kind: WidgetKind, label: String, geometry: Rect) -> Widget {
        let payload = match kind {
            WidgetKind::Checkbox => WidgetPayload::Checkbox { checked: false },
            WidgetKind::Slider => WidgetPayload::Slider { min: 0, max: 100, value: 0 },
            WidgetKind::ProgressBar => WidgetPayload::ProgressBar { min: 0, max: 100, value: 0 },
            WidgetKind::Button | WidgetKind::Label => WidgetPayload::None,
        };
        Widget {
            kind,
            label,
            geometry,
            relative: None,
            state: WidgetState::Normal,
            payload,
            on_click: None,
            on_hover: None,
        }
    }

    pub fn enabled(&self) -> bool {
        self.state != WidgetState::Disabled
    }

    /// Recomputes absolute geometry from `relative` against the parent's
    /// current client rect; a no-op for widgets placed with fixed
    /// coordinates.
    pub fn relayout(&mut self, parent: Rect) {
        if let Some(rel) = self.relative {
            self.geometry = rel.resolve(parent);
        }
    }

    /// Hover transition for `MOUSE_MOVE` (spec.md 4.8 rule 7): normal and
    /// hover toggle based on whether the cursor is over the widget;
    /// pressed/focused/disabled are left alone.
    pub fn set_hovered(&mut self, hovered: bool) {
        match (self.state, hovered) {
            (WidgetState::Normal, true) => self.state = WidgetState::Hover,
            (WidgetState::Hover, false) => self.state = WidgetState::Normal,
            _ => {}
        }
    }

    /// Maps cursor X onto `[min,max]` for an active slider drag (spec.md
    /// 4.8 rule 7). No-op for any other widget kind.
    pub fn set_slider_from_x(&mut self, cursor_x: i32) {
        if let WidgetPayload::Slider { min, max, value } = &mut self.payload {
            let span = (self.geometry.w as i32).max(1);
            let rel = (cursor_x - self.geometry.x).clamp(0, span);
            let range = (*max - *min).max(0);
            *value = *min + (rel * range) / span;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_geometry_resolves_without_float() {
        let rel = RelativeGeometry { x_permille: 500, y_permille: 0, w_permille: 500, h_permille: 1000 };
        let parent = Rect::new(0, 0, 400, 300);
        let resolved = rel.resolve(parent);
        assert_eq!(resolved, Rect::new(200, 0, 200, 300));
    }

    #[test]
    fn slider_maps_cursor_to_range() {
        let mut w = Widget::new(WidgetKind::Slider, String::from("vol"), Rect::new(100, 0, 200, 16));
        if let WidgetPayload::Slider { min, max, .. } = &mut w.payload {
            *min = 0;
            *max = 200;
        }
        w.set_slider_from_x(100);
        assert_eq!(w.payload_value(), Some(0));
        w.set_slider_from_x(300);
        assert_eq!(w.payload_value(), Some(200));
        w.set_slider_from_x(200);
        assert_eq!(w.payload_value(), Some(100));
    }

    #[test]
    fn hover_toggles_normal_and_hover_only() {
        let mut w = Widget::new(WidgetKind::Button, String::from("ok"), Rect::new(0, 0, 10, 10));
        w.set_hovered(true);
        assert_eq!(w.state, WidgetState::Hover);
        w.set_hovered(false);
        assert_eq!(w.state, WidgetState::Normal);
        w.state = WidgetState::Pressed;
        w.set_hovered(true);
        assert_eq!(w.state, WidgetState::Pressed);
    }
}

#[cfg(test)]
impl Widget {
    fn payload_value(&self) -> Option<i32> {
        match self.payload {
            WidgetPayload::Slider { value, .. } => Some(value),
            WidgetPayload::ProgressBar { value, .. } => Some(value),
            _ => None,
        }
    }
}


