//! Raster buffers used by the compositing pipeline.
//!
//! [`RasterImage`] is the document's base image. It is shared through an `Arc`
//! and never mutated in place: every geometric transform produces a new one,
//! so history snapshots can hold on to old images cheaply.
//!
//! [`Surface`] is the mutable RGBA target layers draw onto.

use std::sync::Arc;

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Straight (non-premultiplied) 8-bit RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);
    pub const TRANSPARENT: Color = Color::rgba(255, 255, 255, 0);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, self.a])
    }

    /// Parse `#rrggbb` or `#rrggbbaa` (leading `#` optional).
    pub fn parse_hex(s: &str) -> Option<Self> {
        let hex = s.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            6 => Some(Self::rgba(byte(0)?, byte(2)?, byte(4)?, 255)),
            8 => Some(Self::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => None,
        }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

impl From<Rgba<u8>> for Color {
    fn from(p: Rgba<u8>) -> Self {
        Self::rgba(p[0], p[1], p[2], p[3])
    }
}

/// Immutable, cheaply clonable pixel buffer.
#[derive(Debug, Clone)]
pub struct RasterImage(Arc<RgbaImage>);

impl RasterImage {
    pub fn new(width: u32, height: u32, fill: Color) -> Self {
        Self(Arc::new(RgbaImage::from_pixel(width, height, fill.to_rgba())))
    }

    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self(Arc::new(pixels))
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.0
    }

    /// True when both handles point at the same buffer.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for RasterImage {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.0.dimensions() == other.0.dimensions() && self.0.as_raw() == other.0.as_raw())
    }
}

/// Source-over blend of `top` onto `base`, with `top`'s alpha scaled by
/// `coverage` (0..=1).
pub fn blend_over(base: Rgba<u8>, top: Rgba<u8>, coverage: f32) -> Rgba<u8> {
    // Fast path: nothing to blend
    if top[3] == 0 || coverage <= 0.0 {
        return base;
    }
    // Fast path: opaque top at full coverage overwrites
    if top[3] == 255 && coverage >= 1.0 {
        return top;
    }

    let top_a = (top[3] as f32 / 255.0) * coverage.min(1.0);
    let base_a = base[3] as f32 / 255.0;
    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mix = |t: u8, b: u8| -> u8 {
        let t = t as f32 / 255.0;
        let b = b as f32 / 255.0;
        let v = (t * top_a + b * base_a * (1.0 - top_a)) / out_a;
        (v * 255.0).round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        mix(top[0], base[0]),
        mix(top[1], base[1]),
        mix(top[2], base[2]),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

/// Mutable RGBA drawing surface.
#[derive(Debug, Clone)]
pub struct Surface {
    pixels: RgbaImage,
}

impl Surface {
    /// Fully transparent surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self { pixels: RgbaImage::new(width, height) }
    }

    pub fn from_image(image: &RgbaImage) -> Self {
        Self { pixels: image.clone() }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.pixels.get_pixel(x, y)
    }

    /// Replace the contents with `src`, resizing the surface to match.
    pub fn paint(&mut self, src: &RgbaImage) {
        if self.pixels.dimensions() == src.dimensions() {
            self.pixels.copy_from_slice(src.as_raw());
        } else {
            self.pixels = src.clone();
        }
    }

    /// Source-over blit of `img` with its top-left corner at (x, y), clipped
    /// to the surface bounds.
    pub fn draw_image(&mut self, img: &RgbaImage, x: i64, y: i64) {
        let sw = self.pixels.width() as i64;
        let sh = self.pixels.height() as i64;
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + img.width() as i64).min(sw);
        let y1 = (y + img.height() as i64).min(sh);
        if x0 >= x1 || y0 >= y1 {
            return;
        }
        for dy in y0..y1 {
            for dx in x0..x1 {
                let src = *img.get_pixel((dx - x) as u32, (dy - y) as u32);
                let dst = self.pixels.get_pixel_mut(dx as u32, dy as u32);
                *dst = blend_over(*dst, src, 1.0);
            }
        }
    }

    /// Blend a single pixel; out-of-bounds coordinates are ignored.
    #[inline]
    pub fn blend_pixel(&mut self, x: i64, y: i64, color: Color, coverage: f32) {
        if x < 0 || y < 0 || x >= self.pixels.width() as i64 || y >= self.pixels.height() as i64 {
            return;
        }
        let dst = self.pixels.get_pixel_mut(x as u32, y as u32);
        *dst = blend_over(*dst, color.to_rgba(), coverage);
    }

    /// Blend a flat colour over the pixel-aligned rect [x0, x1) × [y0, y1).
    pub fn fill_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: Color) {
        let x0 = x0.max(0);
        let y0 = y0.max(0);
        let x1 = x1.min(self.pixels.width() as i64);
        let y1 = y1.min(self.pixels.height() as i64);
        for y in y0..y1 {
            for x in x0..x1 {
                self.blend_pixel(x, y, color, 1.0);
            }
        }
    }

    /// Blend a row-major coverage mask positioned at (x0, y0).
    pub fn blend_mask(&mut self, mask: &[f32], mask_w: u32, x0: i64, y0: i64, color: Color) {
        if mask_w == 0 {
            return;
        }
        for (row, line) in mask.chunks(mask_w as usize).enumerate() {
            for (col, &cov) in line.iter().enumerate() {
                if cov > 0.0 {
                    self.blend_pixel(x0 + col as i64, y0 + row as i64, color, cov);
                }
            }
        }
    }
}
