//! Window manager: the z-ordered window list, focus, and drag/resize
//! geometry (spec.md 4.8 "Window manager and event router").

use crate::display::Rect;
use alloc::string::String;
use alloc::vec::Vec;

use super::registry::WindowRegistry;
use super::taskbar::{Taskbar, TASKBAR_HEIGHT};
use super::window::{Window, WindowCaps, WindowId, TITLE_BAR_HEIGHT};

pub struct WindowManager {
    windows: Vec<Window>,
    registry: WindowRegistry,
    focused: Option<WindowId>,
    next_id: u32,
    pub taskbar: Taskbar,
    screen_w: u32,
    screen_h: u32,
}

impl WindowManager {
    pub fn new(screen_w: u32, screen_h: u32) -> WindowManager {
        WindowManager {
            windows: Vec::new(),
            registry: WindowRegistry::new(),
            focused: None,
            next_id: 1,
            taskbar: Taskbar::new(screen_w),
            screen_w,
            screen_h,
        }
    }

    pub fn screen_size(&self) -> (u32, u32) {
        (self.screen_w, self.screen_h)
    }

    pub fn resize_screen(&mut self, screen_w: u32, screen_h: u32) {
        self.screen_w = screen_w;
        self.screen_h = screen_h;
        self.taskbar.resize(screen_w);
    }

    /// spec.md 3 "Window" + 8 "for all windows W: gui.registry[W.id % N]
    /// equals W iff W is live". Returns `None` if the registry is full.
    pub fn create_window(&mut self, title: String, geometry: Rect, caps: WindowCaps) -> Option<WindowId> {
        let id = self.next_id;
        if !self.registry.insert(id) {
            return None;
        }
        self.next_id = self.next_id.wrapping_add(1).max(1);
        let z_index = self.windows.len() as u32;
        let window = Window::new(id, title.clone(), geometry, caps, z_index);
        if caps.contains(WindowCaps::IN_TASKBAR) {
            self.taskbar.register(id, title);
        }
        self.windows.push(window);
        self.focus_window(id);
        Some(id)
    }

    fn index_of(&self, id: WindowId) -> Option<usize> {
        if !self.registry.contains(id) {
            return None;
        }
        self.windows.iter().position(|w| w.id == id)
    }

    pub fn window(&self, id: WindowId) -> Option<&Window> {
        self.index_of(id).map(|i| &self.windows[i])
    }

    pub fn window_mut(&mut self, id: WindowId) -> Option<&mut Window> {
        let idx = self.index_of(id)?;
        Some(&mut self.windows[idx])
    }

    /// spec.md 4.8 "close -> removed from list and registry; widgets
    /// destroyed; taskbar entry removed".
    pub fn close_window(&mut self, id: WindowId) -> bool {
        let Some(idx) = self.index_of(id) else { return false };
        if let Some(cb) = self.windows[idx].callbacks.on_close {
            cb(id);
        }
        self.windows.remove(idx);
        self.registry.remove(id);
        self.taskbar.unregister(id);
        if self.focused == Some(id) {
            self.focused = None;
        }
        self.renumber_z();
        true
    }

    /// spec.md 4.8 "Z-order": focusing brings the window to tail
    /// (topmost) and renumbers z-indices 0..N-1. Minimized windows
    /// cannot be focused directly; `restore` first.
    pub fn focus_window(&mut self, id: WindowId) -> bool {
        let Some(idx) = self.index_of(id) else { return false };
        if self.windows[idx].minimized {
            return false;
        }
        let mut window = self.windows.remove(idx);
        window.focused = true;
        for other in self.windows.iter_mut() {
            other.focused = false;
        }
        if let Some(cb) = window.callbacks.on_focus {
            cb(id);
        }
        self.windows.push(window);
        self.focused = Some(id);
        self.renumber_z();
        true
    }

    fn renumber_z(&mut self) {
        for (i, w) in self.windows.iter_mut().enumerate() {
            w.z_index = i as u32;
        }
    }

    pub fn focused_id(&self) -> Option<WindowId> {
        self.focused.filter(|id| self.registry.contains(*id))
    }

    /// Rendering order, spec.md 4.8 "Rendering sorts by z-index
    /// ascending" -- this is already the storage order.
    pub fn windows_back_to_front(&self) -> &[Window] {
        &self.windows
    }

    pub fn set_visible(&mut self, id: WindowId, visible: bool) -> bool {
        let Some(w) = self.window_mut(id) else { return false };
        w.visible = visible;
        w.needs_redraw = true;
        true
    }

    pub fn minimize(&mut self, id: WindowId) -> bool {
        let Some(w) = self.window_mut(id) else { return false };
        let ok = w.minimize();
        if ok && self.focused == Some(id) {
            self.focused = None;
        }
        ok
    }

    pub fn maximize(&mut self, id: WindowId) -> bool {
        let (screen_w, screen_h) = (self.screen_w, self.screen_h);
        let Some(w) = self.window_mut(id) else { return false };
        w.maximize(screen_w, screen_h, TASKBAR_HEIGHT)
    }

    pub fn restore(&mut self, id: WindowId) -> bool {
        let Some(w) = self.window_mut(id) else { return false };
        w.restore()
    }

    /// spec.md 4.8 rule 6: "topmost visible, non-minimized window
    /// containing the point".
    pub fn hit_test(&self, x: i32, y: i32) -> Option<WindowId> {
        self.windows
            .iter()
            .rev()
            .find(|w| w.visible && !w.minimized && w.geometry.contains_point(x, y))
            .map(|w| w.id)
    }

    /// Begins a drag: records the offset from the window's origin to the
    /// cursor so a later `drag_to` can reposition it without jumping.
    pub fn begin_drag(&mut self, id: WindowId, cursor_x: i32, cursor_y: i32) -> bool {
        let Some(w) = self.window_mut(id) else { return false };
        if !w.caps.contains(WindowCaps::MOVABLE) {
            return false;
        }
        w.dragging = true;
        w.drag_offset = (cursor_x - w.geometry.x, cursor_y - w.geometry.y);
        true
    }

    /// spec.md 4.8 rule 3: "the window is moved to `cursor -
    /// drag_offset`, clamped so the title bar stays reachable."
    pub fn drag_to(&mut self, id: WindowId, cursor_x: i32, cursor_y: i32) -> bool {
        let (screen_w, screen_h) = (self.screen_w, self.screen_h);
        let Some(w) = self.window_mut(id) else { return false };
        if !w.dragging {
            return false;
        }
        let (ox, oy) = w.drag_offset;
        let min_x = -(w.geometry.w as i32) + 1;
        let max_x = screen_w as i32 - 1;
        let min_y = 0;
        let max_y = screen_h as i32 - TITLE_BAR_HEIGHT as i32;
        w.geometry.x = (cursor_x - ox).clamp(min_x, max_x);
        w.geometry.y = (cursor_y - oy).clamp(min_y, max_y);
        w.needs_redraw = true;
        true
    }

    pub fn end_drag(&mut self, id: WindowId) -> bool {
        let Some(w) = self.window_mut(id) else { return false };
        let was_dragging = w.dragging;
        w.dragging = false;
        if let Some(cb) = w.callbacks.on_resize {
            if was_dragging {
                cb(id);
            }
        }
        was_dragging
    }

    /// The window currently mid-drag, if any -- spec.md 4.8 rule 3: "a
    /// pending drag takes priority for MOUSE_MOVE and MOUSE_RELEASE".
    pub fn dragging_window(&self) -> Option<WindowId> {
        self.windows.iter().find(|w| w.dragging).map(|w| w.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wm() -> WindowManager {
        WindowManager::new(1024, 768)
    }

    #[test]
    fn focus_brings_window_to_tail_and_renumbers() {
        let mut m = wm();
        let a = m.create_window(String::from("A"), Rect::new(0, 0, 100, 100), WindowCaps::NORMAL).unwrap();
        let b = m.create_window(String::from("B"), Rect::new(0, 0, 100, 100), WindowCaps::NORMAL).unwrap();
        assert_eq!(m.window(a).unwrap().z_index, 0);
        assert_eq!(m.window(b).unwrap().z_index, 1);
        m.focus_window(a);
        assert_eq!(m.window(a).unwrap().z_index, 1);
        assert_eq!(m.window(b).unwrap().z_index, 0);
        assert_eq!(m.focused_id(), Some(a));
    }

    #[test]
    fn close_removes_from_registry_and_taskbar() {
        let mut m = wm();
        let a = m.create_window(String::from("A"), Rect::new(0, 0, 100, 100), WindowCaps::NORMAL).unwrap();
        assert!(m.close_window(a));
        assert!(m.window(a).is_none());
        assert_eq!(m.taskbar.visible_buttons().count(), 0);
    }

    #[test]
    fn stale_handle_is_refused_after_close() {
        let mut m = wm();
        let a = m.create_window(String::from("A"), Rect::new(0, 0, 100, 100), WindowCaps::NORMAL).unwrap();
        m.close_window(a);
        assert!(!m.minimize(a));
        assert!(!m.focus_window(a));
    }

    #[test]
    fn hit_test_returns_topmost() {
        let mut m = wm();
        let a = m.create_window(String::from("A"), Rect::new(0, 0, 200, 200), WindowCaps::NORMAL).unwrap();
        let b = m.create_window(String::from("B"), Rect::new(0, 0, 200, 200), WindowCaps::NORMAL).unwrap();
        assert_eq!(m.hit_test(10, 10), Some(b));
        let _ = a;
    }

    #[test]
    fn minimized_window_is_not_hit() {
        let mut m = wm();
        let a = m.create_window(String::from("A"), Rect::new(0, 0, 200, 200), WindowCaps::NORMAL).unwrap();
        m.minimize(a);
        assert_eq!(m.hit_test(10, 10), None);
        assert_eq!(m.focused_id(), None);
    }

    #[test]
    fn drag_clamps_title_bar_reachable() {
        let mut m = wm();
        let a = m.create_window(String::from("A"), Rect::new(100, 100, 400, 300), WindowCaps::NORMAL).unwrap();
        m.begin_drag(a, 120, 110);
        m.drag_to(a, -1000, -1000);
        let w = m.window(a).unwrap();
        assert!(w.geometry.x > -(w.geometry.w as i32));
        assert!(w.geometry.y >= 0);
    }
}


