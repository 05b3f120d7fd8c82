// ============================================================================
// SHAPE RASTERIZATION: anti-aliased fills and strokes via signed distance
// ============================================================================
//
// Every primitive is expressed as an SDF evaluated at pixel centres over its
// bounding box. Coverage is `smoothstep(0.5, -0.5, d)`, so pixels whose centre
// lies half a pixel inside an edge are fully covered.

use rayon::prelude::*;

use crate::canvas::{Color, Surface};
use crate::components::anchor::{Point, Rect};

/// Horizontal/vertical dash pattern for helper chrome.
pub const DASH: (f32, f32) = (10.0, 10.0);

/// Bounds of an SDF evaluation, in document pixels.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    x0: i64,
    y0: i64,
    x1: i64,
    y1: i64,
}

impl Bounds {
    fn around(min_x: f32, min_y: f32, max_x: f32, max_y: f32, pad: f32, surface: &Surface) -> Option<Self> {
        let b = Self {
            x0: ((min_x - pad).floor() as i64).max(0),
            y0: ((min_y - pad).floor() as i64).max(0),
            x1: ((max_x + pad).ceil() as i64).min(surface.width() as i64),
            y1: ((max_y + pad).ceil() as i64).min(surface.height() as i64),
        };
        (b.x0 < b.x1 && b.y0 < b.y1).then_some(b)
    }

    fn width(&self) -> usize {
        (self.x1 - self.x0) as usize
    }
}

/// Evaluate `sdf` over `bounds` into a coverage mask (parallel per row).
fn coverage_mask(bounds: Bounds, sdf: impl Fn(f32, f32) -> f32 + Sync) -> Vec<f32> {
    let w = bounds.width();
    let h = (bounds.y1 - bounds.y0) as usize;
    let mut buf = vec![0.0f32; w * h];
    buf.par_chunks_mut(w).enumerate().for_each(|(row, row_buf)| {
        let py = (bounds.y0 + row as i64) as f32 + 0.5;
        for (col, cov) in row_buf.iter_mut().enumerate() {
            let px = (bounds.x0 + col as i64) as f32 + 0.5;
            *cov = smoothstep(0.5, -0.5, sdf(px, py));
        }
    });
    buf
}

fn rasterize(surface: &mut Surface, bounds: Option<Bounds>, color: Color, sdf: impl Fn(f32, f32) -> f32 + Sync) {
    if color.a == 0 {
        return;
    }
    let Some(bounds) = bounds else {
        return;
    };
    let mask = coverage_mask(bounds, sdf);
    surface.blend_mask(&mask, bounds.width() as u32, bounds.x0, bounds.y0, color);
}

pub fn fill_rect(surface: &mut Surface, r: Rect, color: Color) {
    let c = r.center();
    let (hx, hy) = (r.width() * 0.5, r.height() * 0.5);
    let bounds = Bounds::around(r.x0, r.y0, r.x1, r.y1, 1.0, surface);
    rasterize(surface, bounds, color, |px, py| sdf_box(px - c.x, py - c.y, hx, hy));
}

/// Stroke centred on the rectangle's edge.
pub fn stroke_rect(surface: &mut Surface, r: Rect, width: f32, color: Color) {
    if width <= 0.0 {
        return;
    }
    let c = r.center();
    let (hx, hy) = (r.width() * 0.5, r.height() * 0.5);
    let half = width * 0.5;
    let bounds = Bounds::around(r.x0, r.y0, r.x1, r.y1, half + 1.0, surface);
    rasterize(surface, bounds, color, |px, py| sdf_box(px - c.x, py - c.y, hx, hy).abs() - half);
}

pub fn fill_circle(surface: &mut Surface, c: Point, radius: f32, color: Color) {
    let bounds = Bounds::around(c.x - radius, c.y - radius, c.x + radius, c.y + radius, 1.0, surface);
    rasterize(surface, bounds, color, |px, py| Point::new(px, py).distance(c) - radius);
}

pub fn stroke_circle(surface: &mut Surface, c: Point, radius: f32, width: f32, color: Color) {
    if width <= 0.0 {
        return;
    }
    let half = width * 0.5;
    let bounds = Bounds::around(c.x - radius, c.y - radius, c.x + radius, c.y + radius, half + 1.0, surface);
    rasterize(surface, bounds, color, |px, py| (Point::new(px, py).distance(c) - radius).abs() - half);
}

pub fn fill_ellipse(surface: &mut Surface, r: Rect, color: Color) {
    let c = r.center();
    let (rx, ry) = (r.width() * 0.5, r.height() * 0.5);
    if rx <= 0.0 || ry <= 0.0 {
        return;
    }
    let bounds = Bounds::around(r.x0, r.y0, r.x1, r.y1, 1.0, surface);
    rasterize(surface, bounds, color, |px, py| sdf_ellipse(px - c.x, py - c.y, rx, ry));
}

pub fn stroke_ellipse(surface: &mut Surface, r: Rect, width: f32, color: Color) {
    let c = r.center();
    let (rx, ry) = (r.width() * 0.5, r.height() * 0.5);
    if rx <= 0.0 || ry <= 0.0 || width <= 0.0 {
        return;
    }
    let half = width * 0.5;
    let bounds = Bounds::around(r.x0, r.y0, r.x1, r.y1, half + 1.0, surface);
    rasterize(surface, bounds, color, |px, py| sdf_ellipse(px - c.x, py - c.y, rx, ry).abs() - half);
}

/// Round-capped line segment.
pub fn stroke_segment(surface: &mut Surface, a: Point, b: Point, width: f32, color: Color) {
    if width <= 0.0 {
        return;
    }
    let half = width * 0.5;
    let bounds = Bounds::around(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y), half + 1.0, surface);
    rasterize(surface, bounds, color, |px, py| sdf_line_segment(px, py, a.x, a.y, b.x, b.y) - half);
}

/// Connected round-joined polyline. Coverage of overlapping segments is
/// merged with `max` so joints are not blended twice.
pub fn stroke_polyline(surface: &mut Surface, points: &[Point], width: f32, color: Color) {
    if points.is_empty() || width <= 0.0 || color.a == 0 {
        return;
    }
    if points.len() == 1 {
        fill_circle(surface, points[0], width * 0.5, color);
        return;
    }
    let half = width * 0.5;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    let Some(bounds) = Bounds::around(min_x, min_y, max_x, max_y, half + 1.0, surface) else {
        return;
    };
    let w = bounds.width();
    let h = (bounds.y1 - bounds.y0) as usize;
    let mut mask = vec![0.0f32; w * h];
    for seg in points.windows(2) {
        let (a, b) = (seg[0], seg[1]);
        let Some(sb) = Bounds::around(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y), half + 1.0, surface) else {
            continue;
        };
        for y in sb.y0..sb.y1 {
            for x in sb.x0..sb.x1 {
                let d = sdf_line_segment(x as f32 + 0.5, y as f32 + 0.5, a.x, a.y, b.x, b.y) - half;
                let idx = (y - bounds.y0) as usize * w + (x - bounds.x0) as usize;
                mask[idx] = mask[idx].max(smoothstep(0.5, -0.5, d));
            }
        }
    }
    surface.blend_mask(&mask, w as u32, bounds.x0, bounds.y0, color);
}

/// Dashed segment with `(on, off)` lengths measured along the line.
pub fn dashed_segment(surface: &mut Surface, a: Point, b: Point, width: f32, dash: (f32, f32), color: Color) {
    let len = a.distance(b);
    if len <= 0.0 || dash.0 <= 0.0 {
        return;
    }
    let (ux, uy) = ((b.x - a.x) / len, (b.y - a.y) / len);
    let period = dash.0 + dash.1.max(0.0);
    let mut t = 0.0;
    while t < len {
        let end = (t + dash.0).min(len);
        let p = Point::new(a.x + ux * t, a.y + uy * t);
        let q = Point::new(a.x + ux * end, a.y + uy * end);
        stroke_butt_segment(surface, p, q, width, color);
        t += period;
    }
}

pub fn dashed_rect(surface: &mut Surface, r: Rect, width: f32, dash: (f32, f32), color: Color) {
    let tl = Point::new(r.x0, r.y0);
    let tr = Point::new(r.x1, r.y0);
    let br = Point::new(r.x1, r.y1);
    let bl = Point::new(r.x0, r.y1);
    for (a, b) in [(tl, tr), (tr, br), (br, bl), (bl, tl)] {
        dashed_segment(surface, a, b, width, dash, color);
    }
}

/// Soft drop shadow: stacked translucent rounded boxes growing outward.
pub fn drop_shadow(surface: &mut Surface, r: Rect, spread: f32, color: Color) {
    if spread <= 0.0 {
        return;
    }
    let c = r.center();
    let (hx, hy) = (r.width() * 0.5, r.height() * 0.5);
    let bounds = Bounds::around(r.x0, r.y0, r.x1, r.y1, spread + 1.0, surface);
    let alpha = color.a as f32 / 255.0;
    rasterize(surface, bounds, color.with_alpha(255), |px, py| {
        let d = sdf_box(px - c.x, py - c.y, hx, hy);
        // coverage eases from `alpha` at the edge to zero at `spread`
        let fade = (1.0 - (d / spread).clamp(0.0, 1.0)) * alpha;
        0.5 - fade
    });
}

/// Butt-capped segment (no overhang past the endpoints).
fn stroke_butt_segment(surface: &mut Surface, a: Point, b: Point, width: f32, color: Color) {
    let len = a.distance(b);
    if len <= 0.0 || width <= 0.0 {
        return;
    }
    let half = width * 0.5;
    let (ux, uy) = ((b.x - a.x) / len, (b.y - a.y) / len);
    let c = Point::new((a.x + b.x) * 0.5, (a.y + b.y) * 0.5);
    let bounds = Bounds::around(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y), half + 1.0, surface);
    rasterize(surface, bounds, color, |px, py| {
        // segment-local frame
        let dx = px - c.x;
        let dy = py - c.y;
        let along = dx * ux + dy * uy;
        let across = -dx * uy + dy * ux;
        sdf_box(along, across, len * 0.5, half)
    });
}

/// SDF for an axis-aligned box centred at the origin.
#[inline]
fn sdf_box(px: f32, py: f32, hx: f32, hy: f32) -> f32 {
    let dx = px.abs() - hx;
    let dy = py.abs() - hy;
    let outside = (dx.max(0.0) * dx.max(0.0) + dy.max(0.0) * dy.max(0.0)).sqrt();
    let inside = dx.max(dy).min(0.0);
    outside + inside
}

/// SDF for an ellipse (approximation).
#[inline]
fn sdf_ellipse(px: f32, py: f32, rx: f32, ry: f32) -> f32 {
    let nx = px / rx;
    let ny = py / ry;
    let len = (nx * nx + ny * ny).sqrt();
    if len < 1e-8 {
        return -rx.min(ry);
    }
    let scale = (rx * rx * ny * ny + ry * ry * nx * nx).sqrt() / (rx * ry * len);
    (len - 1.0) / scale
}

#[inline]
fn sdf_line_segment(px: f32, py: f32, ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let dx = bx - ax;
    let dy = by - ay;
    let len2 = dx * dx + dy * dy;
    let t = if len2 > 0.0 {
        (((px - ax) * dx + (py - ay) * dy) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let cx = ax + t * dx;
    let cy = ay + t * dy;
    ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt()
}

#[inline]
fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const RED: Color = Color::rgba(255, 0, 0, 255);

    fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> Rect {
        Rect::from_corners(Point::new(x0, y0), Point::new(x1, y1))
    }

    #[test]
    fn filled_rect_covers_interior_pixels_exactly() {
        let mut s = Surface::new(20, 20);
        fill_rect(&mut s, rect(5.0, 5.0, 10.0, 10.0), RED);
        for y in 0..20 {
            for x in 0..20 {
                let inside = (5..10).contains(&x) && (5..10).contains(&y);
                let expected = if inside { Rgba([255, 0, 0, 255]) } else { Rgba([0, 0, 0, 0]) };
                assert_eq!(s.pixel(x, y), expected, "pixel {x},{y}");
            }
        }
    }

    #[test]
    fn stroke_leaves_centre_untouched() {
        let mut s = Surface::new(40, 40);
        stroke_rect(&mut s, rect(5.0, 5.0, 35.0, 35.0), 2.0, RED);
        assert_eq!(s.pixel(20, 20)[3], 0);
        assert_eq!(s.pixel(5, 20), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn circle_coverage_is_radial() {
        let mut s = Surface::new(30, 30);
        fill_circle(&mut s, Point::new(15.0, 15.0), 5.0, RED);
        assert_eq!(s.pixel(15, 15), Rgba([255, 0, 0, 255]));
        assert_eq!(s.pixel(15, 25)[3], 0);
        assert_eq!(s.pixel(2, 2)[3], 0);
    }

    #[test]
    fn ellipse_respects_radii() {
        let mut s = Surface::new(40, 20);
        fill_ellipse(&mut s, rect(0.0, 5.0, 40.0, 15.0), RED);
        assert_eq!(s.pixel(35, 10)[3], 255);
        assert_eq!(s.pixel(20, 2)[3], 0);
    }

    #[test]
    fn dashes_leave_gaps() {
        let mut s = Surface::new(60, 5);
        dashed_segment(&mut s, Point::new(0.0, 2.5), Point::new(60.0, 2.5), 1.0, DASH, RED);
        assert_eq!(s.pixel(5, 2)[3], 255);
        assert_eq!(s.pixel(15, 2)[3], 0);
        assert_eq!(s.pixel(25, 2)[3], 255);
    }

    #[test]
    fn polyline_joins_are_not_double_blended() {
        let mut s = Surface::new(30, 30);
        let half_red = RED.with_alpha(128);
        let pts = [Point::new(5.0, 15.5), Point::new(15.0, 15.5), Point::new(15.0, 25.0)];
        stroke_polyline(&mut s, &pts, 3.0, half_red);
        assert_eq!(s.pixel(15, 15)[3], 128);
    }

    #[test]
    fn off_surface_shapes_are_skipped() {
        let mut s = Surface::new(10, 10);
        fill_rect(&mut s, rect(50.0, 50.0, 60.0, 60.0), RED);
        stroke_segment(&mut s, Point::new(-20.0, -20.0), Point::new(-10.0, -10.0), 3.0, RED);
        assert!(s.image().pixels().all(|p| p[3] == 0));
    }
}
