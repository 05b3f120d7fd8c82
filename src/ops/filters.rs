// ============================================================================
// FILTERS: box / gaussian blur and the 3x3 smoothing kernel
// ============================================================================
//
// All filters take a patch and return a new one of the same size. Edges are
// clamped. Row passes are parallelized with rayon.

use image::RgbaImage;
use rayon::prelude::*;

/// Build a 1-D Gaussian kernel truncated at ceil(3*sigma).
fn build_gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    if radius == 0 {
        return vec![1.0];
    }
    let len = radius * 2 + 1;
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..len)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / s2).exp()
        })
        .collect();
    normalize(&mut kernel);
    kernel
}

/// Box kernel covering `radius` pixels either side; a fractional radius gives
/// the outermost taps partial weight.
fn build_box_kernel(radius: f32) -> Vec<f32> {
    let whole = radius.floor() as usize;
    let frac = radius - whole as f32;
    let reach = if frac > 0.0 { whole + 1 } else { whole };
    let len = reach * 2 + 1;
    let mut kernel: Vec<f32> = (0..len)
        .map(|i| {
            let d = (i as isize - reach as isize).unsigned_abs();
            if d <= whole { 1.0 } else { frac }
        })
        .collect();
    normalize(&mut kernel);
    kernel
}

fn normalize(kernel: &mut [f32]) {
    let sum: f32 = kernel.iter().sum();
    if sum > 0.0 {
        let inv = 1.0 / sum;
        kernel.iter_mut().for_each(|v| *v *= inv);
    }
}

/// Separable gaussian blur with `sigma` in pixels. `sigma <= 0` is identity.
pub fn gaussian_blur(src: &RgbaImage, sigma: f32) -> RgbaImage {
    if sigma <= 0.0 {
        return src.clone();
    }
    separable_blur(src, &build_gaussian_kernel(sigma))
}

/// Separable box blur. `radius <= 0` is identity.
pub fn box_blur(src: &RgbaImage, radius: f32) -> RgbaImage {
    if radius <= 0.0 {
        return src.clone();
    }
    separable_blur(src, &build_box_kernel(radius))
}

fn separable_blur(src: &RgbaImage, kernel: &[f32]) -> RgbaImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 {
        return src.clone();
    }
    let radius = kernel.len() / 2;
    let src_raw = src.as_raw();
    let stride = w * 4;

    // --- Horizontal pass (parallel by row) ---
    let mut buf_h = vec![0.0f32; w * h * 4];
    buf_h.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &src_raw[y * stride..(y + 1) * stride];
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = (x as isize + ki as isize - radius as isize).clamp(0, w as isize - 1) as usize;
                for c in 0..4 {
                    acc[c] += row_in[sx * 4 + c] as f32 * kv;
                }
            }
            row_out[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });

    // --- Vertical pass, straight into the output ---
    let mut out = RgbaImage::new(w as u32, h as u32);
    out.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = (y as isize + ki as isize - radius as isize).clamp(0, h as isize - 1) as usize;
                let idx = sy * stride + x * 4;
                for c in 0..4 {
                    acc[c] += buf_h[idx + c] * kv;
                }
            }
            for c in 0..4 {
                row_out[x * 4 + c] = acc[c].round().clamp(0.0, 255.0) as u8;
            }
        }
    });
    out
}

/// 3x3 smoothing (1 1 1 / 1 5 1 / 1 1 1, divided by 13), the reference
/// image the sharpness enhancement blends against.
pub fn smooth(src: &RgbaImage) -> RgbaImage {
    const K: [[f32; 3]; 3] = [[1.0, 1.0, 1.0], [1.0, 5.0, 1.0], [1.0, 1.0, 1.0]];
    let w = src.width() as usize;
    let h = src.height() as usize;
    let mut out = src.clone();
    if w < 3 || h < 3 {
        return out;
    }
    let stride = w * 4;
    let src_raw = src.as_raw();
    out.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        // border pixels are left as-is
        if y == 0 || y == h - 1 {
            return;
        }
        for x in 1..w - 1 {
            for c in 0..3 {
                let mut acc = 0.0f32;
                for (ky, krow) in K.iter().enumerate() {
                    for (kx, &kv) in krow.iter().enumerate() {
                        let idx = (y + ky - 1) * stride + (x + kx - 1) * 4 + c;
                        acc += src_raw[idx] as f32 * kv;
                    }
                }
                row_out[x * 4 + c] = (acc / 13.0).round().clamp(0.0, 255.0) as u8;
            }
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn checker(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 { Rgba([255, 255, 255, 255]) } else { Rgba([0, 0, 0, 255]) }
        })
    }

    #[test]
    fn kernels_are_normalized() {
        for k in [build_gaussian_kernel(2.5), build_box_kernel(1.5), build_box_kernel(3.0)] {
            let sum: f32 = k.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
        assert_eq!(build_box_kernel(2.0).len(), 5);
        assert_eq!(build_box_kernel(2.5).len(), 7);
    }

    #[test]
    fn zero_radius_is_identity() {
        let img = checker(8, 8);
        assert_eq!(gaussian_blur(&img, 0.0), img);
        assert_eq!(box_blur(&img, 0.0), img);
    }

    #[test]
    fn blur_flattens_checkerboard() {
        let img = checker(16, 16);
        let out = gaussian_blur(&img, 3.0);
        let p = out.get_pixel(8, 8);
        assert!((p[0] as i32 - 128).abs() < 20, "got {:?}", p);
        assert_eq!(p[3], 255);
    }

    #[test]
    fn uniform_image_is_unchanged_by_every_filter() {
        let img = RgbaImage::from_pixel(10, 10, Rgba([40, 80, 120, 255]));
        assert_eq!(gaussian_blur(&img, 2.0), img);
        assert_eq!(box_blur(&img, 1.5), img);
        assert_eq!(smooth(&img), img);
    }
}
