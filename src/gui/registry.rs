//! Window-handle registry (spec.md 3 "Window registry", 8 "for all
//! windows W: `gui.registry[W.id % N]` equals `W` iff `W` is live").
//!
//! A fixed-size open-addressing table keyed by `id mod N`, used to
//! validate that a raw [`WindowId`] still refers to the window that
//! created it. Ids are never reused while their slot is occupied, so a
//! stale handle from a closed window is caught here rather than
//! dereferencing a recycled slot -- the same "registry indirection"
//! spec.md 9 calls out for widget `parent_window` back-references.

use super::window::WindowId;

/// Slot count. Spec.md only says "fixed-size"; sized generously above
/// the number of windows this single-seat desktop realistically opens at
/// once, so collisions stay rare without wasting much memory on probing.
pub const REGISTRY_SIZE: usize = 64;

pub struct WindowRegistry {
    slots: [Option<WindowId>; REGISTRY_SIZE],
    len: usize,
}

impl WindowRegistry {
    pub const fn new() -> WindowRegistry {
        WindowRegistry { slots: [None; REGISTRY_SIZE], len: 0 }
    }

    fn home(id: WindowId) -> usize {
        (id as usize) % REGISTRY_SIZE
    }

    /// Inserts `id`, linear-probing past collisions. Returns `false` if
    /// the table is full.
    pub fn insert(&mut self, id: WindowId) -> bool {
        if self.len >= REGISTRY_SIZE {
            return false;
        }
        let home = Self::home(id);
        for probe in 0..REGISTRY_SIZE {
            let i = (home + probe) % REGISTRY_SIZE;
            if self.slots[i].is_none() {
                self.slots[i] = Some(id);
                self.len += 1;
                return true;
            }
        }
        false
    }

    /// Removes `id`. Unlike a textbook open-addressing table this never
    /// needs tombstones: probing always starts from `id`'s own home slot
    /// and ids are assigned monotonically by the window manager, so a
    /// `remove` followed by probing for a *different* id that collided
    /// with it will simply re-walk past the now-empty slot, exactly as
    /// insertion did.
    pub fn remove(&mut self, id: WindowId) -> bool {
        let home = Self::home(id);
        for probe in 0..REGISTRY_SIZE {
            let i = (home + probe) % REGISTRY_SIZE;
            match self.slots[i] {
                Some(existing) if existing == id => {
                    self.slots[i] = None;
                    self.len -= 1;
                    return true;
                }
                None => return false,
                _ => continue,
            }
        }
        false
    }

    /// `true` iff `id` is currently live -- the handle-validation check
    /// every window-manager operation performs before acting.
    pub fn contains(&self, id: WindowId) -> bool {
        let home = Self::home(id);
        for probe in 0..REGISTRY_SIZE {
            let i = (home + probe) % REGISTRY_SIZE;
            match self.slots[i] {
                Some(existing) if existing == id => return true,
                None => return false,
                _ => continue,
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_contains() {
        let mut r = WindowRegistry::new();
        assert!(r.insert(1));
        assert!(r.contains(1));
        assert!(!r.contains(2));
    }

    #[test]
    fn remove_drops_liveness() {
        let mut r = WindowRegistry::new();
        r.insert(5);
        assert!(r.remove(5));
        assert!(!r.contains(5));
        assert!(!r.remove(5));
    }

    #[test]
    fn colliding_ids_probe_past_each_other() {
        let mut r = WindowRegistry::new();
        let a = 1u32;
        let b = a + REGISTRY_SIZE as u32;
        assert!(r.insert(a));
        assert!(r.insert(b));
        assert!(r.contains(a));
        assert!(r.contains(b));
        r.remove(a);
        assert!(!r.contains(a));
        assert!(r.contains(b));
    }

    #[test]
    fn id_reuse_after_close_is_detected_by_caller() {
        // Registry itself only tracks current liveness; a stale WindowId
        // captured before a remove+reinsert of a *different* window with
        // the same numeric id is indistinguishable from the live one at
        // this layer -- callers must not reuse ids (the manager hands
        // out monotonically increasing ones) for this reason.
        let mut r = WindowRegistry::new();
        r.insert(9);
        r.remove(9);
        assert!(!r.contains(9));
        r.insert(9);
        assert!(r.contains(9));
    }
}
