//! Live VESA linear-framebuffer compositor (spec.md 4.7 "VESA display
//! pipeline"): owns the real framebuffer pointer, a heap-backed double
//! buffer, and the cursor save/restore stamp that `crate::display`'s pure
//! geometry is built to drive. Every pixel write here is a volatile store
//! through a raw pointer since paging is never enabled (spec.md 1
//! Non-goals) and the Multiboot framebuffer address is already the
//! physical address this kernel runs with.

use alloc::vec::Vec;
use core::ptr;

use crate::display::{cursor_rect, DirtyRects, Geometry, Rect, CURSOR_SIZE};
use crate::error::{KernelError, KernelResult};
use crate::font;
use crate::multiboot::FramebufferInfo;

/// 16x16 arrow cursor bitmap, 1 bit per pixel (MSB leftmost), the same
/// "tofu-free" minimal cursor every framebuffer-only toy OS draws since
/// there is no cursor-image source in the Multiboot contract.
#[rustfmt::skip]
const CURSOR_BITMAP: [u16; 16] = [
    0b1000000000000000,
    0b1100000000000000,
    0b1110000000000000,
    0b1111000000000000,
    0b1111100000000000,
    0b1111110000000000,
    0b1111111000000000,
    0b1111111100000000,
    0b1111111110000000,
    0b1111110000000000,
    0b1111110000000000,
    0b1100011000000000,
    0b1000011000000000,
    0b0000001100000000,
    0b0000001100000000,
    0b0000000000000000,
];

pub struct Vesa {
    geometry: Geometry,
    /// Raw pointer to the physical linear framebuffer (spec.md 3
    /// "Framebuffer info: linear base, width, height, bpp, pitch").
    front: *mut u8,
    /// Heap-allocated back buffer, identical layout to the front buffer
    /// (spec.md 3 "Back buffer has identical layout when double-buffering
    /// is enabled").
    back: Vec<u8>,
    cursor_saved: Vec<u8>,
    cursor_saved_rect: Option<Rect>,
    dirty: DirtyRects,
}

/// # Safety
/// `Vesa` holds a raw pointer to MMIO; it is only ever driven from the
/// single-threaded main loop (spec.md "Shared-resource policy"), never
/// from interrupt context, so handing it across the one `kernel_main`
/// owner is sound despite the raw pointer.
unsafe impl Send for Vesa {}

impl Vesa {
    /// # Safety
    /// `info.base` must be a valid, mapped linear framebuffer address of
    /// at least `pitch * height` bytes, as only a Multiboot-compliant
    /// loader that actually set the video mode can guarantee.
    pub unsafe fn init(info: &FramebufferInfo) -> KernelResult<Vesa> {
        if !info.valid || info.bpp < 15 {
            return Err(KernelError::NoFramebuffer);
        }
        let geometry = Geometry {
            width: info.width,
            height: info.height,
            pitch: info.pitch,
            bpp: info.bpp,
        };
        let buffer_len = geometry.pitch as usize * geometry.height as usize;
        Ok(Vesa {
            geometry,
            front: info.base as usize as *mut u8,
            back: alloc::vec![0u8; buffer_len],
            cursor_saved: alloc::vec![0u8; (CURSOR_SIZE * CURSOR_SIZE * 4) as usize],
            cursor_saved_rect: None,
            dirty: DirtyRects::new(geometry.width, geometry.height),
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// `put_pixel(x,y)` clips silently (spec.md 4.7, 8).
    pub fn put_pixel(&mut self, x: i32, y: i32, color: u32) {
        let Some(offset) = self.geometry.pixel_offset(x, y) else {
            return;
        };
        let bpp = self.geometry.bytes_per_pixel() as usize;
        let bytes = color.to_le_bytes();
        self.back[offset..offset + bpp].copy_from_slice(&bytes[..bpp]);
    }

    fn get_pixel(&self, x: i32, y: i32) -> u32 {
        let Some(offset) = self.geometry.pixel_offset(x, y) else {
            return 0;
        };
        let bpp = self.geometry.bytes_per_pixel() as usize;
        let mut bytes = [0u8; 4];
        bytes[..bpp].copy_from_slice(&self.back[offset..offset + bpp]);
        u32::from_le_bytes(bytes)
    }

    /// Fills `rect`, clipped per-pixel (spec.md 4.7 "`draw_rect` clips
    /// per-pixel"), and marks it dirty.
    pub fn fill_rect(&mut self, rect: Rect, color: u32) {
        let Some(clipped) = rect.clip_to_screen(self.geometry.width, self.geometry.height) else {
            return;
        };
        for y in clipped.y..clipped.bottom() {
            for x in clipped.x..clipped.right() {
                self.put_pixel(x, y, color);
            }
        }
        self.mark_dirty(clipped);
    }

    /// Axis-aligned line, Bresenham, clipped per-pixel.
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
        let (mut x0, mut y0) = (x0, y0);
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.put_pixel(x0, y0, color);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
        self.mark_dirty(Rect::new(
            x0.min(x1),
            y0.min(y1),
            (x1 - x0).unsigned_abs().max(1),
            (y1 - y0).unsigned_abs().max(1),
        ));
    }

    fn draw_glyph(&mut self, x: i32, y: i32, ch: u8, fg: u32, bg: Option<u32>) {
        let bitmap = font::glyph(ch);
        for (row, bits) in bitmap.iter().enumerate() {
            for col in 0..font::GLYPH_WIDTH {
                let set = bits & (0x80 >> col) != 0;
                if set {
                    self.put_pixel(x + col as i32, y + row as i32, fg);
                } else if let Some(bg) = bg {
                    self.put_pixel(x + col as i32, y + row as i32, bg);
                }
            }
        }
    }

    /// Draws `text` left to right starting at `(x, y)`, one
    /// [`font::GLYPH_WIDTH`]-pixel advance per byte (spec.md 4.7 "text
    /// uses a built-in 8x16 bitmap font").
    pub fn draw_text(&mut self, x: i32, y: i32, text: &str, fg: u32, bg: Option<u32>) {
        let mut cursor_x = x;
        for byte in text.bytes() {
            self.draw_glyph(cursor_x, y, byte, fg, bg);
            cursor_x += font::GLYPH_WIDTH as i32;
        }
        self.mark_dirty(Rect::new(
            x,
            y,
            (cursor_x - x).max(0) as u32,
            font::GLYPH_HEIGHT,
        ));
    }

    pub fn mark_dirty(&mut self, rect: Rect) {
        self.dirty.mark_dirty(rect);
    }

    /// Marks the whole screen dirty. A single full-screen rect already
    /// covers everything `present` needs to blit; forcing the `all_dirty`
    /// flag itself isn't necessary since [`DirtyRects::mark_dirty`] stores
    /// it as one coalesced entry.
    pub fn mark_all_dirty(&mut self) {
        self.dirty.mark_dirty(Rect::new(
            0,
            0,
            self.geometry.width,
            self.geometry.height,
        ));
    }

    /// Saves the pixels under the cursor's new position before drawing it
    /// (spec.md 4.7 "Cursor save/restore"), restoring whatever was saved
    /// from the previous frame first.
    pub fn restore_cursor_background(&mut self) {
        let Some(rect) = self.cursor_saved_rect.take() else {
            return;
        };
        let bpp = self.geometry.bytes_per_pixel() as usize;
        for row in 0..rect.h {
            let src_off = (row * rect.w * bpp as u32) as usize;
            for col in 0..rect.w {
                let pixel_off = src_off + (col * bpp as u32) as usize;
                let mut bytes = [0u8; 4];
                bytes[..bpp].copy_from_slice(&self.cursor_saved[pixel_off..pixel_off + bpp]);
                self.put_pixel(rect.x + col as i32, rect.y + row as i32, u32::from_le_bytes(bytes));
            }
        }
        self.mark_dirty(rect);
    }

    /// Saves the in-bounds portion of the cursor rect at `(x, y)` and
    /// draws the arrow bitmap over it (spec.md 4.7 "Cursor drawn partially
    /// off-screen saves only in-bounds pixels").
    pub fn draw_cursor(&mut self, x: i32, y: i32, color: u32) {
        let Some(rect) = cursor_rect(x, y, self.geometry.width, self.geometry.height) else {
            return;
        };
        let bpp = self.geometry.bytes_per_pixel() as usize;
        for row in 0..rect.h {
            for col in 0..rect.w {
                let pixel_off = (row * rect.w * bpp as u32 + col * bpp as u32) as usize;
                let bytes = self.get_pixel(rect.x + col as i32, rect.y + row as i32).to_le_bytes();
                self.cursor_saved[pixel_off..pixel_off + bpp].copy_from_slice(&bytes[..bpp]);
            }
        }
        self.cursor_saved_rect = Some(rect);

        for row in 0..(rect.h.min(CURSOR_SIZE)) {
            let bits = CURSOR_BITMAP[row as usize];
            for col in 0..(rect.w.min(CURSOR_SIZE)) {
                if bits & (0x8000 >> col) != 0 {
                    self.put_pixel(x + col as i32, y + row as i32, color);
                }
            }
        }
        self.mark_dirty(rect);
    }

    /// Copies every dirty region (or the whole buffer, on an "all dirty"
    /// promotion) from the back buffer to the real framebuffer, then
    /// clears the dirty set (spec.md 4.7 pipeline stage 5).
    pub fn present(&mut self) {
        if self.dirty.is_all_dirty() {
            self.blit_rect(Rect::new(0, 0, self.geometry.width, self.geometry.height));
        } else {
            let rects: alloc::vec::Vec<Rect> = self.dirty.rects().to_vec();
            for rect in rects {
                self.blit_rect(rect);
            }
        }
        self.dirty.clear();
    }

    fn blit_rect(&self, rect: Rect) {
        let bpp = self.geometry.bytes_per_pixel() as usize;
        let row_bytes = rect.w as usize * bpp;
        for row in 0..rect.h {
            let Some(offset) = self.geometry.pixel_offset(rect.x, rect.y + row as i32) else {
                continue;
            };
            // SAFETY: `front` covers `pitch * height` bytes (the init
            // contract), and `offset + row_bytes` stays within one row
            // of that buffer since `rect` was clipped to the screen.
            unsafe {
                let src = self.back.as_ptr().add(offset);
                let dst = self.front.add(offset);
                ptr::copy_nonoverlapping(src, dst, row_bytes);
            }
        }
    }
}


