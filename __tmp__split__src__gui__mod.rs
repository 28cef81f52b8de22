//! Window manager and GUI layer (spec.md 4.8 "Window manager and event
//! router", 3 "Window"/"Widget"/"Event").
//!
//! Pure logic only: geometry, z-order, hit-testing, widget state, and
//! event routing. Pixel output lives in `crate::drivers::vesa`, which
//! walks [`manager::WindowManager::windows_back_to_front`] and
//! [`crate::display::DirtyRects`] to decide what to blit.

pub mod manager;
pub mod registry;
pub mod router;
pub mod shutdown;
pub mod taskbar;
pub mod widget;
pub mod window;

pub use manager::WindowManager;
pub use router::{EventRouter, RouterCommand};
pub use shutdown::{ShutdownController, ShutdownEvent, ShutdownState};
pub use widget::{Widget, WidgetKind, WidgetPayload, WidgetState};
pub use window::{Window, WindowCaps, WindowId};


