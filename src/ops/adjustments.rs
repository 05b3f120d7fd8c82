// ============================================================================
// ENHANCEMENTS: brightness, contrast, sharpness and colour on a patch
// ============================================================================
//
// Each enhancement blends the patch against a degenerate reference image:
//   out = reference + factor * (patch - reference)
// so a factor of 1.0 is the identity and 0.0 yields the reference itself.
// Alpha is preserved throughout.

use image::RgbaImage;
use rayon::prelude::*;

use crate::ops::filters;

/// Enhancement factors, applied in field order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Enhancement {
    pub brightness: f32,
    pub contrast: f32,
    pub sharpness: f32,
    pub color: f32,
}

impl Enhancement {
    pub const IDENTITY: Enhancement = Enhancement { brightness: 1.0, contrast: 1.0, sharpness: 1.0, color: 1.0 };
}

/// Apply every non-identity enhancement to `src`.
pub fn enhance(src: &RgbaImage, e: &Enhancement) -> RgbaImage {
    let mut img = src.clone();
    if e.brightness != 1.0 {
        img = brightness(&img, e.brightness);
    }
    if e.contrast != 1.0 {
        img = contrast(&img, e.contrast);
    }
    if e.sharpness != 1.0 {
        img = sharpness(&img, e.sharpness);
    }
    if e.color != 1.0 {
        img = color(&img, e.color);
    }
    img
}

/// Blend toward black.
pub fn brightness(src: &RgbaImage, factor: f32) -> RgbaImage {
    apply_pixel_transform(src, |r, g, b, a| (r * factor, g * factor, b * factor, a))
}

/// Blend toward the mean grey level of the patch.
pub fn contrast(src: &RgbaImage, factor: f32) -> RgbaImage {
    let count = (src.width() as u64 * src.height() as u64).max(1);
    let sum: f64 = src
        .as_raw()
        .par_chunks(4)
        .map(|p| luma(p[0] as f32, p[1] as f32, p[2] as f32) as f64)
        .sum();
    let mean = (sum / count as f64 + 0.5).floor() as f32;
    apply_pixel_transform(src, |r, g, b, a| {
        (
            mean + factor * (r - mean),
            mean + factor * (g - mean),
            mean + factor * (b - mean),
            a,
        )
    })
}

/// Blend toward a smoothed copy; factors above 1.0 sharpen.
pub fn sharpness(src: &RgbaImage, factor: f32) -> RgbaImage {
    let soft = filters::smooth(src);
    blend_with(&soft, src, factor)
}

/// Blend toward the greyscale version; 0.0 desaturates completely.
pub fn color(src: &RgbaImage, factor: f32) -> RgbaImage {
    apply_pixel_transform(src, |r, g, b, a| {
        let l = luma(r, g, b).round();
        (l + factor * (r - l), l + factor * (g - l), l + factor * (b - l), a)
    })
}

/// ITU-R 601-2 luma.
#[inline]
fn luma(r: f32, g: f32, b: f32) -> f32 {
    r * 0.299 + g * 0.587 + b * 0.114
}

/// `reference + factor * (image - reference)` per colour channel, alpha from
/// `image`.
fn blend_with(reference: &RgbaImage, image: &RgbaImage, factor: f32) -> RgbaImage {
    let mut out = image.clone();
    let stride = image.width() as usize * 4;
    if stride == 0 {
        return out;
    }
    let ref_raw = reference.as_raw();
    out.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let ref_row = &ref_raw[y * stride..(y + 1) * stride];
        for (px, rp) in row.chunks_mut(4).zip(ref_row.chunks(4)) {
            for c in 0..3 {
                let v = rp[c] as f32 + factor * (px[c] as f32 - rp[c] as f32);
                px[c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    });
    out
}

/// Apply a per-pixel transform to a copy of `src`.
/// `transform` receives (r, g, b, a) as f32 and returns (r, g, b, a) as f32.
fn apply_pixel_transform<F>(src: &RgbaImage, transform: F) -> RgbaImage
where
    F: Fn(f32, f32, f32, f32) -> (f32, f32, f32, f32) + Sync,
{
    let mut out = src.clone();
    let stride = src.width() as usize * 4;
    if stride == 0 {
        return out;
    }
    out.par_chunks_mut(stride).for_each(|row| {
        for px in row.chunks_mut(4) {
            let (nr, ng, nb, na) = transform(px[0] as f32, px[1] as f32, px[2] as f32, px[3] as f32);
            px[0] = nr.round().clamp(0.0, 255.0) as u8;
            px[1] = ng.round().clamp(0.0, 255.0) as u8;
            px[2] = nb.round().clamp(0.0, 255.0) as u8;
            px[3] = na.round().clamp(0.0, 255.0) as u8;
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient() -> RgbaImage {
        RgbaImage::from_fn(16, 4, |x, _| {
            let v = (x * 16) as u8;
            Rgba([v, 255 - v, 100, 200])
        })
    }

    #[test]
    fn identity_factors_leave_patch_untouched() {
        let img = gradient();
        assert_eq!(enhance(&img, &Enhancement::IDENTITY), img);
        assert_eq!(brightness(&img, 1.0), img);
        assert_eq!(contrast(&img, 1.0), img);
        assert_eq!(sharpness(&img, 1.0), img);
        assert_eq!(color(&img, 1.0), img);
    }

    #[test]
    fn brightness_scales_and_saturates() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([100, 200, 10, 77]));
        let out = brightness(&img, 1.5);
        assert_eq!(*out.get_pixel(0, 0), Rgba([150, 255, 15, 77]));
    }

    #[test]
    fn zero_contrast_is_flat_mean() {
        let img = gradient();
        let out = contrast(&img, 0.0);
        let first = *out.get_pixel(0, 0);
        assert!(out.pixels().all(|p| p == &first));
        assert_eq!(first[0], first[1]);
        assert_eq!(first[3], 200);
    }

    #[test]
    fn zero_color_is_greyscale() {
        let out = color(&gradient(), 0.0);
        assert!(out.pixels().all(|p| p[0] == p[1] && p[1] == p[2]));
    }
}
