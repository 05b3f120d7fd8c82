// ============================================================================
// TRANSFORM OPERATIONS: resize, rotate, flip, crop for whole images
// ============================================================================
//
// Every function returns a new buffer; callers replace the document image
// rather than mutating it.

use image::{Rgba, RgbaImage, imageops};
use rayon::prelude::*;

use crate::components::anchor::{Affine, Point};

/// Bilinear resize.
pub fn resize(img: &RgbaImage, w: u32, h: u32) -> RgbaImage {
    imageops::resize(img, w, h, imageops::FilterType::Triangle)
}

/// Sub-rectangle copy. Callers clip the rect to the image first.
pub fn crop(img: &RgbaImage, x: u32, y: u32, w: u32, h: u32) -> RgbaImage {
    imageops::crop_imm(img, x, y, w, h).to_image()
}

pub fn flip_horizontal(img: &RgbaImage) -> RgbaImage {
    imageops::flip_horizontal(img)
}

pub fn flip_vertical(img: &RgbaImage) -> RgbaImage {
    imageops::flip_vertical(img)
}

/// Angle folded into [0, 360).
pub fn normalize_angle(degrees: f32) -> f32 {
    let a = degrees.rem_euclid(360.0);
    if a >= 360.0 { 0.0 } else { a }
}

/// Whole quarter turns counter-clockwise for right angles, `None` otherwise.
pub fn quarter_turns(degrees: f32) -> Option<u32> {
    let a = normalize_angle(degrees);
    let turns = (a / 90.0).round();
    ((a - turns * 90.0).abs() < 1e-3).then_some(turns as u32 % 4)
}

/// Size of the canvas after rotating a `w`×`h` image by `degrees`, expanded
/// to hold every corner.
pub fn rotated_size(w: u32, h: u32, degrees: f32) -> (u32, u32) {
    match quarter_turns(degrees) {
        Some(0) | Some(2) => (w, h),
        Some(_) => (h, w),
        None => {
            let (sin, cos) = degrees.to_radians().sin_cos();
            let nw = (w as f32 * cos.abs() + h as f32 * sin.abs()).ceil() as u32;
            let nh = (w as f32 * sin.abs() + h as f32 * cos.abs()).ceil() as u32;
            (nw.max(1), nh.max(1))
        }
    }
}

/// Counter-clockwise rotation. Right angles are exact pixel permutations;
/// other angles expand the canvas and resample bilinearly, leaving uncovered
/// corners transparent.
pub fn rotate(img: &RgbaImage, degrees: f32) -> RgbaImage {
    match quarter_turns(degrees) {
        Some(0) => img.clone(),
        // imageops rotates clockwise
        Some(1) => imageops::rotate270(img),
        Some(2) => imageops::rotate180(img),
        Some(3) => imageops::rotate90(img),
        _ => rotate_any(img, degrees),
    }
}

fn rotate_any(img: &RgbaImage, degrees: f32) -> RgbaImage {
    let (w, h) = (img.width(), img.height());
    let (nw, nh) = rotated_size(w, h, degrees);
    // destination -> source
    let back = Affine::rotate(-degrees, nw as f32, nh as f32, w as f32, h as f32);
    let mut out = RgbaImage::new(nw, nh);
    let stride = nw as usize * 4;
    out.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        for x in 0..nw as usize {
            let src = back.apply(Point::new(x as f32 + 0.5, y as f32 + 0.5));
            let p = bilinear_sample(img, src.x - 0.5, src.y - 0.5);
            row[x * 4..x * 4 + 4].copy_from_slice(&p.0);
        }
    });
    out
}

/// Bilinear interpolation sampling from an RgbaImage; outside is transparent.
fn bilinear_sample(img: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let sample = |sx: i32, sy: i32| -> [f32; 4] {
        if sx < 0 || sy < 0 || sx >= img.width() as i32 || sy >= img.height() as i32 {
            [0.0; 4]
        } else {
            let p = img.get_pixel(sx as u32, sy as u32);
            [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
        }
    };

    let tl = sample(x0, y0);
    let tr = sample(x0 + 1, y0);
    let bl = sample(x0, y0 + 1);
    let br = sample(x0 + 1, y0 + 1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = lerp(tl[c], tr[c], fx);
        let bot = lerp(bl[c], br[c], fx);
        out[c] = lerp(top, bot, fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

/// Largest size with the aspect ratio of `w`×`h` fitting in `box_w`×`box_h`.
pub fn fit_within(w: u32, h: u32, box_w: f32, box_h: f32) -> (f32, f32) {
    if w == 0 || h == 0 {
        return (0.0, 0.0);
    }
    let scale = (box_w / w as f32).min(box_h / h as f32);
    (w as f32 * scale, h as f32 * scale)
}
