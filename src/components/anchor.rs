//! Draggable control points and the small geometry types they work with.

use crate::canvas::{Color, Surface};
use crate::ops::shapes;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn distance(self, other: Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned rectangle with `x0 <= x1` and `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    /// Rectangle spanned by two opposite corners in any order.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x0: a.x.min(b.x),
            y0: a.y.min(b.y),
            x1: a.x.max(b.x),
            y1: a.y.max(b.y),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn has_area(&self) -> bool {
        self.width() > 0.0 && self.height() > 0.0
    }

    pub fn center(&self) -> Point {
        Point::new((self.x0 + self.x1) * 0.5, (self.y0 + self.y1) * 0.5)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x0 && p.x <= self.x1 && p.y >= self.y0 && p.y <= self.y1
    }

    /// Pixel-aligned bounds clipped to a `w`×`h` image, or `None` when the
    /// clipped area is empty.
    pub fn pixel_bounds(&self, w: u32, h: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x0.round().clamp(0.0, w as f32) as u32;
        let y0 = self.y0.round().clamp(0.0, h as f32) as u32;
        let x1 = self.x1.round().clamp(0.0, w as f32) as u32;
        let y1 = self.y1.round().clamp(0.0, h as f32) as u32;
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }
}

/// 2×3 affine map used to carry layer coordinates through image transforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Affine {
    pub const IDENTITY: Affine = Affine { a: 1.0, b: 0.0, c: 0.0, d: 1.0, tx: 0.0, ty: 0.0 };

    /// `x -> width - x`
    pub fn flip_horizontal(width: f32) -> Self {
        Self { a: -1.0, tx: width, ..Self::IDENTITY }
    }

    /// `y -> height - y`
    pub fn flip_vertical(height: f32) -> Self {
        Self { d: -1.0, ty: height, ..Self::IDENTITY }
    }

    /// Counter-clockwise rotation by `degrees` (y axis pointing down) of a
    /// `w`×`h` image whose rotated result is `new_w`×`new_h`, centres aligned.
    pub fn rotate(degrees: f32, w: f32, h: f32, new_w: f32, new_h: f32) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let (cx, cy) = (w * 0.5, h * 0.5);
        let (ncx, ncy) = (new_w * 0.5, new_h * 0.5);
        // x' = ncx + (x - cx) cos + (y - cy) sin
        // y' = ncy - (x - cx) sin + (y - cy) cos
        Self {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            tx: ncx - cx * cos - cy * sin,
            ty: ncy + cx * sin - cy * cos,
        }
    }

    pub fn apply(&self, p: Point) -> Point {
        Point::new(
            self.a * p.x + self.b * p.y + self.tx,
            self.c * p.x + self.d * p.y + self.ty,
        )
    }

    /// Linear part only, for relative offsets.
    pub fn apply_vector(&self, v: Point) -> Point {
        Point::new(self.a * v.x + self.b * v.y, self.c * v.x + self.d * v.y)
    }
}

/// On-screen anchor size converted into document space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitTolerance {
    /// Radius in screen pixels.
    pub radius: f32,
    /// Document zoom in percent.
    pub scale: f32,
}

impl HitTolerance {
    pub fn new(radius: f32, scale: f32) -> Self {
        Self { radius, scale }
    }

    /// Hit distance in document pixels for an anchor with `extra` slack.
    pub fn reach(&self, extra: f32) -> f32 {
        (self.radius + extra) / (self.scale.max(1.0) / 100.0)
    }
}

impl Default for HitTolerance {
    fn default() -> Self {
        Self::new(8.0, 100.0)
    }
}

/// Identifier shared by anchors that move together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkGroup(u32);

#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pos: Option<Point>,
    pub visible: bool,
    group: Option<LinkGroup>,
    /// Offset from the grabbed anchor, frozen at grab time.
    frozen: Option<Point>,
}

impl Default for Anchor {
    fn default() -> Self {
        Self::new()
    }
}

impl Anchor {
    /// An unset, visible anchor.
    pub fn new() -> Self {
        Self { pos: None, visible: true, group: None, frozen: None }
    }

    pub fn at(x: f32, y: f32) -> Self {
        Self { pos: Some(Point::new(x, y)), ..Self::new() }
    }

    pub fn set_position(&mut self, x: f32, y: f32) {
        self.pos = Some(Point::new(x, y));
    }

    pub fn set(&mut self, pos: Option<Point>) {
        self.pos = pos;
    }

    pub fn clear(&mut self) {
        self.pos = None;
    }

    pub fn position(&self) -> Option<Point> {
        self.pos
    }

    pub fn valid(&self) -> bool {
        self.pos.is_some()
    }

    pub fn group(&self) -> Option<LinkGroup> {
        self.group
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        if let Some(p) = &mut self.pos {
            *p = p.offset(dx, dy);
        }
    }

    /// Euclidean hit test. Unset anchors never hit.
    pub fn hit_test(&self, px: f32, py: f32, extra_radius: f32, tol: HitTolerance) -> bool {
        match self.pos {
            Some(p) => p.distance(Point::new(px, py)) <= tol.reach(extra_radius),
            None => false,
        }
    }

    /// Filled dot, only when visible and set. `shift` is added to the stored
    /// position.
    pub fn draw(&self, surface: &mut Surface, tol: HitTolerance, shift: Point) {
        if !self.visible {
            return;
        }
        if let Some(p) = self.pos {
            let r = tol.reach(0.0) * 0.6;
            let c = p.offset(shift.x, shift.y);
            shapes::fill_circle(surface, c, r + 1.0, Color::BLACK.with_alpha(160));
            shapes::fill_circle(surface, c, r, Color::WHITE);
        }
    }
}

/// The anchors owned by one layer, with link-group bookkeeping and the
/// grab/drag/release interaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchorSet {
    anchors: Vec<Anchor>,
    grabbed: Option<usize>,
    next_group: u32,
}

impl AnchorSet {
    /// `count` unset anchors.
    pub fn new(count: usize) -> Self {
        Self { anchors: vec![Anchor::new(); count], grabbed: None, next_group: 0 }
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Anchor> {
        self.anchors.get(i)
    }

    pub fn get_mut(&mut self, i: usize) -> Option<&mut Anchor> {
        self.anchors.get_mut(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Anchor> {
        self.anchors.iter()
    }

    pub fn position(&self, i: usize) -> Option<Point> {
        self.anchors.get(i).and_then(Anchor::position)
    }

    pub fn set_position(&mut self, i: usize, x: f32, y: f32) {
        if let Some(a) = self.anchors.get_mut(i) {
            a.set_position(x, y);
        }
    }

    /// True when every anchor has a position.
    pub fn valid(&self) -> bool {
        self.anchors.iter().all(Anchor::valid)
    }

    pub fn positions(&self) -> Vec<Option<Point>> {
        self.anchors.iter().map(Anchor::position).collect()
    }

    /// Restore positions captured by [`positions`](Self::positions).
    pub fn restore(&mut self, positions: &[Option<Point>]) {
        for (a, p) in self.anchors.iter_mut().zip(positions) {
            a.set(*p);
        }
    }

    pub fn clear_positions(&mut self) {
        self.anchors.iter_mut().for_each(Anchor::clear);
        self.grabbed = None;
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.anchors.iter_mut().for_each(|a| a.translate(dx, dy));
    }

    pub fn map(&mut self, f: impl Fn(Point) -> Point) {
        for a in &mut self.anchors {
            if let Some(p) = a.position() {
                let q = f(p);
                a.set_position(q.x, q.y);
            }
        }
    }

    /// Put anchors `a` and `b` in the same link group, merging existing
    /// groups.
    pub fn link(&mut self, a: usize, b: usize) {
        if a == b || a >= self.anchors.len() || b >= self.anchors.len() {
            return;
        }
        let ga = self.anchors[a].group;
        let gb = self.anchors[b].group;
        let group = match (ga, gb) {
            (Some(g), _) | (None, Some(g)) => g,
            (None, None) => {
                let g = LinkGroup(self.next_group);
                self.next_group += 1;
                g
            }
        };
        if let Some(old) = gb.filter(|old| *old != group) {
            for anchor in &mut self.anchors {
                if anchor.group == Some(old) {
                    anchor.group = Some(group);
                }
            }
        }
        self.anchors[a].group = Some(group);
        self.anchors[b].group = Some(group);
    }

    /// Index of the closest anchor within reach of (px, py).
    pub fn hit(&self, px: f32, py: f32, extra: f32, tol: HitTolerance) -> Option<usize> {
        let p = Point::new(px, py);
        self.anchors
            .iter()
            .enumerate()
            .filter(|(_, a)| a.hit_test(px, py, extra, tol))
            .filter_map(|(i, a)| a.position().map(|q| (i, q.distance(p))))
            .min_by(|l, r| l.1.total_cmp(&r.1))
            .map(|(i, _)| i)
    }

    pub fn grabbed(&self) -> Option<usize> {
        self.grabbed
    }

    /// Grab the anchor under the pointer and freeze the offsets of its link
    /// group. While an anchor is held further grabs are no-ops that report it.
    pub fn grab(&mut self, px: f32, py: f32, tol: HitTolerance) -> Option<usize> {
        if self.grabbed.is_some() {
            return self.grabbed;
        }
        let i = self.hit(px, py, 0.0, tol)?;
        let origin = self.anchors[i].position()?;
        let group = self.anchors[i].group;
        for (j, anchor) in self.anchors.iter_mut().enumerate() {
            anchor.frozen = match (group, anchor.position()) {
                (Some(g), Some(p)) if j != i && anchor.group == Some(g) => {
                    Some(Point::new(p.x - origin.x, p.y - origin.y))
                }
                _ => None,
            };
        }
        self.grabbed = Some(i);
        Some(i)
    }

    /// Move the grabbed anchor to (px, py) and re-apply frozen offsets.
    pub fn drag(&mut self, px: f32, py: f32) -> bool {
        let Some(i) = self.grabbed else {
            return false;
        };
        self.anchors[i].set_position(px, py);
        for anchor in &mut self.anchors {
            if let Some(off) = anchor.frozen {
                anchor.set_position(px + off.x, py + off.y);
            }
        }
        true
    }

    pub fn release(&mut self, px: f32, py: f32) -> bool {
        if !self.drag(px, py) {
            return false;
        }
        self.grabbed = None;
        self.anchors.iter_mut().for_each(|a| a.frozen = None);
        true
    }

    pub fn draw(&self, surface: &mut Surface, tol: HitTolerance, shift: Point) {
        for a in &self.anchors {
            a.draw(surface, tol, shift);
        }
    }
}
