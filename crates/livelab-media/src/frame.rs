//! RGBA frames and the few drawing primitives the compositor needs

use crate::error::{MediaError, Result};

const BYTES_PER_PIXEL: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const BLACK: Rgba = Rgba([0, 0, 0, 255]);
    pub const WHITE: Rgba = Rgba([255, 255, 255, 255]);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgba([r, g, b, 255])
    }
}

/// Axis-aligned rectangle in canvas pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }
}

/// Video frame in packed RGBA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl VideoFrame {
    pub fn filled(width: u32, height: u32, color: Rgba) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * BYTES_PER_PIXEL);
        for _ in 0..pixels {
            data.extend_from_slice(&color.0);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let frame = Self {
            width,
            height,
            data,
        };
        if frame.is_valid() {
            Ok(frame)
        } else {
            Err(MediaError::InvalidFrame {
                width,
                height,
                len: frame.data.len(),
            })
        }
    }

    /// Nonzero size and a buffer that matches it
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.offset(x, y);
        let mut px = [0u8; 4];
        px.copy_from_slice(self.data.get(i..i + BYTES_PER_PIXEL)?);
        Some(Rgba(px))
    }

    pub fn fill(&mut self, color: Rgba) {
        for px in self.data.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.copy_from_slice(&color.0);
        }
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Rgba) {
        let x_end = rect.right().min(self.width);
        let y_end = rect.bottom().min(self.height);
        for y in rect.y..y_end {
            for x in rect.x..x_end {
                let i = self.offset(x, y);
                self.data[i..i + BYTES_PER_PIXEL].copy_from_slice(&color.0);
            }
        }
    }

    /// Stroke a border of `thickness` pixels inside `rect`
    pub fn stroke_rect(&mut self, rect: Rect, thickness: u32, color: Rgba) {
        let t = thickness.min(rect.width / 2 + 1).min(rect.height / 2 + 1);
        if t == 0 {
            return;
        }
        self.fill_rect(Rect::new(rect.x, rect.y, rect.width, t), color);
        self.fill_rect(
            Rect::new(rect.x, rect.bottom().saturating_sub(t), rect.width, t),
            color,
        );
        self.fill_rect(Rect::new(rect.x, rect.y, t, rect.height), color);
        self.fill_rect(
            Rect::new(rect.right().saturating_sub(t), rect.y, t, rect.height),
            color,
        );
    }

    /// Draw `src` scaled (nearest neighbour) into `dest`, clipped to this frame
    pub fn blit_scaled(&mut self, src: &VideoFrame, dest: Rect) {
        if !src.is_valid() || dest.width == 0 || dest.height == 0 {
            return;
        }
        let x_end = dest.right().min(self.width);
        let y_end = dest.bottom().min(self.height);

        for y in dest.y..y_end {
            let sy = ((y - dest.y) as u64 * src.height as u64 / dest.height as u64) as u32;
            for x in dest.x..x_end {
                let sx = ((x - dest.x) as u64 * src.width as u64 / dest.width as u64) as u32;
                let s = src.offset(sx, sy);
                let d = self.offset(x, y);
                self.data[d..d + BYTES_PER_PIXEL]
                    .copy_from_slice(&src.data[s..s + BYTES_PER_PIXEL]);
            }
        }
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL
    }
}
