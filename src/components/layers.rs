use std::f32::consts::PI;
use std::fmt;
use std::path::PathBuf;

use image::RgbaImage;
use uuid::Uuid;

use crate::canvas::{Color, Surface};
use crate::components::anchor::{Affine, AnchorSet, HitTolerance, Point, Rect};
use crate::components::tools::ToolKind;
use crate::config::EngineConfig;
use crate::error::{ImagineError, Result};
use crate::ops::adjustments::{self, Enhancement};
use crate::ops::text::{self, Fonts, TextAlignment};
use crate::ops::transform;
use crate::ops::{filters, shapes};

// ============================================================================
// IDENTITY & KIND TAGS
// ============================================================================

/// Stable layer identity, independent of stack position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(Uuid);

impl LayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0.simple().to_string();
        f.write_str(&s[..8])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerType {
    Rectangle,
    Circle,
    Ellipse,
    Line,
    Text,
    Emoji,
    Path,
    Image,
    Lighting,
    Blur,
    Zoom,
    Clone,
    Crop,
}

impl LayerType {
    pub const ALL: [LayerType; 13] = [
        LayerType::Rectangle,
        LayerType::Circle,
        LayerType::Ellipse,
        LayerType::Line,
        LayerType::Text,
        LayerType::Emoji,
        LayerType::Path,
        LayerType::Image,
        LayerType::Lighting,
        LayerType::Blur,
        LayerType::Zoom,
        LayerType::Clone,
        LayerType::Crop,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LayerType::Rectangle => "Rectangle",
            LayerType::Circle => "Circle",
            LayerType::Ellipse => "Ellipse",
            LayerType::Line => "Line",
            LayerType::Text => "Text",
            LayerType::Emoji => "Emoji",
            LayerType::Path => "Path",
            LayerType::Image => "Image",
            LayerType::Lighting => "Lighting",
            LayerType::Blur => "Blur",
            LayerType::Zoom => "Zoom",
            LayerType::Clone => "Clone",
            LayerType::Crop => "Crop",
        }
    }

    pub fn shape(self) -> GeometryShape {
        match self {
            LayerType::Text | LayerType::Emoji => GeometryShape::Point,
            LayerType::Path => GeometryShape::Path,
            LayerType::Zoom | LayerType::Clone => GeometryShape::Callout,
            _ => GeometryShape::Rect,
        }
    }

    pub fn tool_kind(self) -> Option<ToolKind> {
        Some(match self.shape() {
            GeometryShape::Rect | GeometryShape::Callout => ToolKind::Rect,
            GeometryShape::Point => ToolKind::Point,
            GeometryShape::Path => ToolKind::Path,
        })
    }

    /// Kinds that read the composited render below them.
    pub fn samples_below(self) -> bool {
        matches!(self, LayerType::Lighting | LayerType::Blur | LayerType::Zoom | LayerType::Clone)
    }

    /// Kinds that show a crosshair through the pointer while being placed.
    pub fn shows_reticule(self) -> bool {
        self.samples_below() || self == LayerType::Crop
    }

    /// Crop layers are consumed on commit and never enter history.
    pub fn is_transient(self) -> bool {
        self == LayerType::Crop
    }

    /// Editable fields, in display order.
    pub fn fields(self) -> &'static [FieldDescriptor] {
        match self {
            LayerType::Rectangle | LayerType::Circle | LayerType::Ellipse => SHAPE_FIELDS,
            LayerType::Line => LINE_FIELDS,
            LayerType::Text => TEXT_FIELDS,
            LayerType::Emoji => EMOJI_FIELDS,
            LayerType::Path => PATH_FIELDS,
            LayerType::Image => IMAGE_FIELDS,
            LayerType::Lighting => LIGHTING_FIELDS,
            LayerType::Blur => BLUR_FIELDS,
            LayerType::Zoom => ZOOM_FIELDS,
            LayerType::Clone => CLONE_FIELDS,
            LayerType::Crop => &[],
        }
    }

    pub fn field(self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields().iter().find(|f| f.name == name)
    }
}

// ============================================================================
// FIELD DESCRIPTORS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Float,
    Bool,
    Color,
    Text,
    Path,
}

impl FieldType {
    pub fn name(self) -> &'static str {
        match self {
            FieldType::Float => "number",
            FieldType::Bool => "boolean",
            FieldType::Color => "colour",
            FieldType::Text => "text",
            FieldType::Path => "path",
        }
    }
}

/// Static description of one editable field, consumed by hosts to build
/// property editors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub label: &'static str,
    pub ty: FieldType,
    pub min: Option<f32>,
    pub max: Option<f32>,
    /// Display ordering hint, ascending.
    pub order: u8,
    /// Text fields that accept line breaks.
    pub multiline: bool,
}

const fn number(name: &'static str, label: &'static str, min: f32, max: f32, order: u8) -> FieldDescriptor {
    FieldDescriptor { name, label, ty: FieldType::Float, min: Some(min), max: Some(max), order, multiline: false }
}

const fn field(name: &'static str, label: &'static str, ty: FieldType, order: u8) -> FieldDescriptor {
    FieldDescriptor { name, label, ty, min: None, max: None, order, multiline: false }
}

static SHAPE_FIELDS: &[FieldDescriptor] = &[
    number("width", "Width", 0.0, 100.0, 0),
    field("stroke_color", "Stroke Color", FieldType::Color, 1),
    field("fill_color", "Fill Color", FieldType::Color, 2),
];

static LINE_FIELDS: &[FieldDescriptor] = &[
    number("width", "Width", 0.0, 100.0, 0),
    field("color", "Color", FieldType::Color, 1),
    field("arrow", "Arrow", FieldType::Bool, 2),
];

static TEXT_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor { multiline: true, ..field("text", "Text", FieldType::Text, 0) },
    field("font", "Font", FieldType::Text, 1),
    field("bold", "Bold", FieldType::Bool, 2),
    number("size", "Font Size", 1.0, 500.0, 3),
    field("color", "Color", FieldType::Color, 4),
    field("center_h", "Center Horizontally", FieldType::Bool, 5),
    field("center_v", "Center Vertically", FieldType::Bool, 6),
];

static EMOJI_FIELDS: &[FieldDescriptor] = &[
    field("emoji", "Emoji", FieldType::Text, 0),
    number("size", "Size", 1.0, 500.0, 1),
];

static PATH_FIELDS: &[FieldDescriptor] = &[
    number("width", "Width", 0.0, 100.0, 0),
    field("color", "Color", FieldType::Color, 1),
];

static IMAGE_FIELDS: &[FieldDescriptor] = &[
    field("path", "File", FieldType::Path, 0),
    field("keep_ratio", "Keep Aspect Ratio", FieldType::Bool, 1),
];

static LIGHTING_FIELDS: &[FieldDescriptor] = &[
    number("brightness", "Brightness", 0.0, 5.0, 0),
    number("contrast", "Contrast", 0.0, 5.0, 1),
    number("sharpness", "Sharpness", 0.0, 5.0, 2),
    number("color", "Color", 0.0, 5.0, 3),
];

static BLUR_FIELDS: &[FieldDescriptor] = &[
    number("box", "Box Blur", 0.0, 100.0, 0),
    number("gaussian", "Gaussian Blur", 0.0, 100.0, 1),
];

static ZOOM_FIELDS: &[FieldDescriptor] = &[
    number("factor", "Zoom Factor", 1.0, 10.0, 0),
    field("border_color", "Border Color", FieldType::Color, 1),
    number("border_width", "Border Width", 0.0, 20.0, 2),
    field("guides", "Guide Lines", FieldType::Bool, 3),
    field("shadow", "Drop Shadow", FieldType::Bool, 4),
];

static CLONE_FIELDS: &[FieldDescriptor] = &[field("live", "Live", FieldType::Bool, 0)];

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Float(f32),
    Bool(bool),
    Color(Color),
    Text(String),
    Path(PathBuf),
}

impl PropertyValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            PropertyValue::Float(_) => FieldType::Float,
            PropertyValue::Bool(_) => FieldType::Bool,
            PropertyValue::Color(_) => FieldType::Color,
            PropertyValue::Text(_) => FieldType::Text,
            PropertyValue::Path(_) => FieldType::Path,
        }
    }
}

impl FieldDescriptor {
    /// Type-check `value` (text is accepted for path fields) and clamp numbers
    /// into range.
    fn coerce(&self, value: PropertyValue) -> Result<PropertyValue> {
        let value = match (self.ty, value) {
            (FieldType::Float, PropertyValue::Float(v)) => {
                let lo = self.min.unwrap_or(f32::MIN);
                let hi = self.max.unwrap_or(f32::MAX);
                if v.is_nan() {
                    return Err(self.type_error());
                }
                PropertyValue::Float(v.clamp(lo, hi))
            }
            (FieldType::Path, PropertyValue::Text(s)) => PropertyValue::Path(PathBuf::from(s)),
            (ty, v) if v.field_type() == ty => v,
            _ => return Err(self.type_error()),
        };
        Ok(value)
    }

    fn type_error(&self) -> ImagineError {
        ImagineError::PropertyType { name: self.name.to_string(), expected: self.ty.name() }
    }
}

// ============================================================================
// GEOMETRY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryShape {
    /// Two opposite corners.
    Rect,
    /// Single anchor.
    Point,
    /// Anchor plus traced offsets.
    Path,
    /// Rect corners plus an independent target anchor.
    Callout,
}

/// Owned anchors plus shape-specific extras. Stored anchor positions exclude
/// the nudge `offset`; every `resolved`/`rect`/`target` accessor includes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    shape: GeometryShape,
    anchors: AnchorSet,
    path: Vec<Point>,
    offset: Point,
}

impl Geometry {
    pub fn new(shape: GeometryShape) -> Self {
        let count = match shape {
            GeometryShape::Rect => 2,
            GeometryShape::Point | GeometryShape::Path => 1,
            GeometryShape::Callout => 3,
        };
        Self { shape, anchors: AnchorSet::new(count), path: Vec::new(), offset: Point::default() }
    }

    pub fn shape(&self) -> GeometryShape {
        self.shape
    }

    pub fn anchors(&self) -> &AnchorSet {
        &self.anchors
    }

    pub fn anchors_mut(&mut self) -> &mut AnchorSet {
        &mut self.anchors
    }

    pub fn offset(&self) -> Point {
        self.offset
    }

    pub fn set_offset(&mut self, offset: Point) {
        self.offset = offset;
    }

    /// All anchors set; paths additionally need a traced point.
    pub fn valid(&self) -> bool {
        self.anchors.valid() && (self.shape != GeometryShape::Path || !self.path.is_empty())
    }

    /// Document-space pointer to stored (un-nudged) coordinates.
    pub fn local(&self, p: Point) -> Point {
        p.offset(-self.offset.x, -self.offset.y)
    }

    pub fn resolved(&self, i: usize) -> Option<Point> {
        self.anchors.position(i).map(|p| p.offset(self.offset.x, self.offset.y))
    }

    pub fn rect(&self) -> Option<Rect> {
        match self.shape {
            GeometryShape::Rect | GeometryShape::Callout => {
                Some(Rect::from_corners(self.resolved(0)?, self.resolved(1)?))
            }
            _ => None,
        }
    }

    pub fn target(&self) -> Option<Point> {
        match self.shape {
            GeometryShape::Callout => self.resolved(2),
            _ => None,
        }
    }

    pub fn path_offsets(&self) -> &[Point] {
        &self.path
    }

    pub fn path_points(&self) -> Vec<Point> {
        match self.resolved(0) {
            Some(o) => self.path.iter().map(|d| o.offset(d.x, d.y)).collect(),
            None => Vec::new(),
        }
    }

    /// Append a document-space point to the traced path.
    pub fn push_path_point(&mut self, p: Point) {
        let l = self.local(p);
        if let Some(o) = self.anchors.position(0) {
            let d = Point::new(l.x - o.x, l.y - o.y);
            if self.path.last() != Some(&d) {
                self.path.push(d);
            }
        }
    }

    /// Set an anchor from a document-space point.
    pub fn place(&mut self, i: usize, p: Point) {
        let l = self.local(p);
        self.anchors.set_position(i, l.x, l.y);
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.anchors.translate(dx, dy);
    }

    pub fn apply_affine(&mut self, m: &Affine) {
        self.anchors.map(|p| m.apply(p));
        for d in &mut self.path {
            *d = m.apply_vector(*d);
        }
        self.offset = m.apply_vector(self.offset);
    }

    /// Forget every coordinate so the shape can be defined from scratch.
    pub fn reset(&mut self) {
        self.anchors.clear_positions();
        self.path.clear();
        self.offset = Point::default();
    }

    pub fn hit_anchor(&self, x: f32, y: f32, tol: HitTolerance) -> Option<usize> {
        let l = self.local(Point::new(x, y));
        self.anchors.hit(l.x, l.y, 0.0, tol)
    }

    pub fn grab(&mut self, x: f32, y: f32, tol: HitTolerance) -> Option<usize> {
        let l = self.local(Point::new(x, y));
        self.anchors.grab(l.x, l.y, tol)
    }

    pub fn drag(&mut self, x: f32, y: f32) -> bool {
        let l = self.local(Point::new(x, y));
        self.anchors.drag(l.x, l.y)
    }

    pub fn release(&mut self, x: f32, y: f32) -> bool {
        let l = self.local(Point::new(x, y));
        self.anchors.release(l.x, l.y)
    }
}

// ============================================================================
// STYLES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeStyle {
    pub width: f32,
    pub stroke: Color,
    pub fill: Color,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineStyle {
    pub width: f32,
    pub color: Color,
    pub arrow: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub text: String,
    /// System family name; the config font file wins when set.
    pub font: String,
    pub bold: bool,
    pub size: f32,
    pub color: Color,
    pub center_h: bool,
    pub center_v: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmojiStyle {
    pub emoji: String,
    pub size: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathStyle {
    pub width: f32,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageStyle {
    pub path: PathBuf,
    pub keep_ratio: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightingStyle {
    pub brightness: f32,
    pub contrast: f32,
    pub sharpness: f32,
    pub color: f32,
}

impl LightingStyle {
    pub fn enhancement(&self) -> Enhancement {
        Enhancement {
            brightness: self.brightness,
            contrast: self.contrast,
            sharpness: self.sharpness,
            color: self.color,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlurStyle {
    pub box_radius: f32,
    pub gaussian: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoomStyle {
    pub factor: f32,
    pub border_color: Color,
    pub border_width: f32,
    pub guides: bool,
    pub shadow: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CloneStyle {
    /// Re-sample the source rect on every render instead of once.
    pub live: bool,
}

/// Kind-specific style data.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    Rectangle(ShapeStyle),
    Circle(ShapeStyle),
    Ellipse(ShapeStyle),
    Line(LineStyle),
    Text(TextStyle),
    Emoji(EmojiStyle),
    Path(PathStyle),
    Image(ImageStyle),
    Lighting(LightingStyle),
    Blur(BlurStyle),
    Zoom(ZoomStyle),
    Clone(CloneStyle),
    Crop,
}

impl LayerKind {
    pub fn defaults(t: LayerType, cfg: &EngineConfig) -> Self {
        let shape = ShapeStyle { width: cfg.default_width, stroke: cfg.default_stroke, fill: cfg.default_fill };
        match t {
            LayerType::Rectangle => LayerKind::Rectangle(shape),
            LayerType::Circle => LayerKind::Circle(shape),
            LayerType::Ellipse => LayerKind::Ellipse(shape),
            LayerType::Line => LayerKind::Line(LineStyle { width: cfg.default_width, color: cfg.default_stroke, arrow: false }),
            LayerType::Text => LayerKind::Text(TextStyle {
                text: "Text".to_string(),
                font: cfg.default_font.clone(),
                bold: true,
                size: cfg.default_font_size,
                color: cfg.default_stroke,
                center_h: false,
                center_v: false,
            }),
            LayerType::Emoji => LayerKind::Emoji(EmojiStyle { emoji: "\u{1F600}".to_string(), size: 48.0 }),
            LayerType::Path => LayerKind::Path(PathStyle { width: cfg.default_width, color: cfg.default_stroke }),
            LayerType::Image => LayerKind::Image(ImageStyle { path: PathBuf::new(), keep_ratio: true }),
            LayerType::Lighting => LayerKind::Lighting(LightingStyle { brightness: 1.5, contrast: 1.0, sharpness: 1.0, color: 1.0 }),
            LayerType::Blur => LayerKind::Blur(BlurStyle { box_radius: 0.0, gaussian: 10.0 }),
            LayerType::Zoom => LayerKind::Zoom(ZoomStyle {
                factor: 2.0,
                border_color: cfg.default_stroke,
                border_width: 2.0,
                guides: true,
                shadow: true,
            }),
            LayerType::Clone => LayerKind::Clone(CloneStyle { live: true }),
            LayerType::Crop => LayerKind::Crop,
        }
    }

    pub fn layer_type(&self) -> LayerType {
        match self {
            LayerKind::Rectangle(_) => LayerType::Rectangle,
            LayerKind::Circle(_) => LayerType::Circle,
            LayerKind::Ellipse(_) => LayerType::Ellipse,
            LayerKind::Line(_) => LayerType::Line,
            LayerKind::Text(_) => LayerType::Text,
            LayerKind::Emoji(_) => LayerType::Emoji,
            LayerKind::Path(_) => LayerType::Path,
            LayerKind::Image(_) => LayerType::Image,
            LayerKind::Lighting(_) => LayerType::Lighting,
            LayerKind::Blur(_) => LayerType::Blur,
            LayerKind::Zoom(_) => LayerType::Zoom,
            LayerKind::Clone(_) => LayerType::Clone,
            LayerKind::Crop => LayerType::Crop,
        }
    }

    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        use PropertyValue as V;
        Some(match (self, name) {
            (LayerKind::Rectangle(s) | LayerKind::Circle(s) | LayerKind::Ellipse(s), "width") => V::Float(s.width),
            (LayerKind::Rectangle(s) | LayerKind::Circle(s) | LayerKind::Ellipse(s), "stroke_color") => V::Color(s.stroke),
            (LayerKind::Rectangle(s) | LayerKind::Circle(s) | LayerKind::Ellipse(s), "fill_color") => V::Color(s.fill),
            (LayerKind::Line(s), "width") => V::Float(s.width),
            (LayerKind::Line(s), "color") => V::Color(s.color),
            (LayerKind::Line(s), "arrow") => V::Bool(s.arrow),
            (LayerKind::Text(s), "text") => V::Text(s.text.clone()),
            (LayerKind::Text(s), "font") => V::Text(s.font.clone()),
            (LayerKind::Text(s), "bold") => V::Bool(s.bold),
            (LayerKind::Text(s), "size") => V::Float(s.size),
            (LayerKind::Text(s), "color") => V::Color(s.color),
            (LayerKind::Text(s), "center_h") => V::Bool(s.center_h),
            (LayerKind::Text(s), "center_v") => V::Bool(s.center_v),
            (LayerKind::Emoji(s), "emoji") => V::Text(s.emoji.clone()),
            (LayerKind::Emoji(s), "size") => V::Float(s.size),
            (LayerKind::Path(s), "width") => V::Float(s.width),
            (LayerKind::Path(s), "color") => V::Color(s.color),
            (LayerKind::Image(s), "path") => V::Path(s.path.clone()),
            (LayerKind::Image(s), "keep_ratio") => V::Bool(s.keep_ratio),
            (LayerKind::Lighting(s), "brightness") => V::Float(s.brightness),
            (LayerKind::Lighting(s), "contrast") => V::Float(s.contrast),
            (LayerKind::Lighting(s), "sharpness") => V::Float(s.sharpness),
            (LayerKind::Lighting(s), "color") => V::Float(s.color),
            (LayerKind::Blur(s), "box") => V::Float(s.box_radius),
            (LayerKind::Blur(s), "gaussian") => V::Float(s.gaussian),
            (LayerKind::Zoom(s), "factor") => V::Float(s.factor),
            (LayerKind::Zoom(s), "border_color") => V::Color(s.border_color),
            (LayerKind::Zoom(s), "border_width") => V::Float(s.border_width),
            (LayerKind::Zoom(s), "guides") => V::Bool(s.guides),
            (LayerKind::Zoom(s), "shadow") => V::Bool(s.shadow),
            (LayerKind::Clone(s), "live") => V::Bool(s.live),
            _ => return None,
        })
    }

    /// Assign a field by name. The value must already be coerced by the
    /// field's descriptor.
    fn assign(&mut self, name: &str, value: PropertyValue) -> bool {
        use PropertyValue as V;
        match (self, name, value) {
            (LayerKind::Rectangle(s) | LayerKind::Circle(s) | LayerKind::Ellipse(s), "width", V::Float(v)) => s.width = v,
            (LayerKind::Rectangle(s) | LayerKind::Circle(s) | LayerKind::Ellipse(s), "stroke_color", V::Color(c)) => s.stroke = c,
            (LayerKind::Rectangle(s) | LayerKind::Circle(s) | LayerKind::Ellipse(s), "fill_color", V::Color(c)) => s.fill = c,
            (LayerKind::Line(s), "width", V::Float(v)) => s.width = v,
            (LayerKind::Line(s), "color", V::Color(c)) => s.color = c,
            (LayerKind::Line(s), "arrow", V::Bool(b)) => s.arrow = b,
            (LayerKind::Text(s), "text", V::Text(t)) => s.text = t,
            (LayerKind::Text(s), "font", V::Text(t)) => s.font = t,
            (LayerKind::Text(s), "bold", V::Bool(b)) => s.bold = b,
            (LayerKind::Text(s), "size", V::Float(v)) => s.size = v,
            (LayerKind::Text(s), "color", V::Color(c)) => s.color = c,
            (LayerKind::Text(s), "center_h", V::Bool(b)) => s.center_h = b,
            (LayerKind::Text(s), "center_v", V::Bool(b)) => s.center_v = b,
            (LayerKind::Emoji(s), "emoji", V::Text(t)) => s.emoji = t,
            (LayerKind::Emoji(s), "size", V::Float(v)) => s.size = v,
            (LayerKind::Path(s), "width", V::Float(v)) => s.width = v,
            (LayerKind::Path(s), "color", V::Color(c)) => s.color = c,
            (LayerKind::Image(s), "path", V::Path(p)) => s.path = p,
            (LayerKind::Image(s), "keep_ratio", V::Bool(b)) => s.keep_ratio = b,
            (LayerKind::Lighting(s), "brightness", V::Float(v)) => s.brightness = v,
            (LayerKind::Lighting(s), "contrast", V::Float(v)) => s.contrast = v,
            (LayerKind::Lighting(s), "sharpness", V::Float(v)) => s.sharpness = v,
            (LayerKind::Lighting(s), "color", V::Float(v)) => s.color = v,
            (LayerKind::Blur(s), "box", V::Float(v)) => s.box_radius = v,
            (LayerKind::Blur(s), "gaussian", V::Float(v)) => s.gaussian = v,
            (LayerKind::Zoom(s), "factor", V::Float(v)) => s.factor = v,
            (LayerKind::Zoom(s), "border_color", V::Color(c)) => s.border_color = c,
            (LayerKind::Zoom(s), "border_width", V::Float(v)) => s.border_width = v,
            (LayerKind::Zoom(s), "guides", V::Bool(b)) => s.guides = b,
            (LayerKind::Zoom(s), "shadow", V::Bool(b)) => s.shadow = b,
            (LayerKind::Clone(s), "live", V::Bool(b)) => s.live = b,
            _ => return false,
        }
        true
    }
}

// ============================================================================
// CACHES
// ============================================================================

/// What a cached patch was computed from. `below` fingerprints everything
/// rendered underneath the layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PatchKey {
    bounds: (u32, u32, u32, u32),
    below: u64,
}

#[derive(Debug, Clone, Default)]
struct PatchCache {
    key: Option<PatchKey>,
    patch: Option<RgbaImage>,
    /// Set by property changes; forces the next draw to recompute.
    recompute: bool,
}

impl PatchCache {
    fn get_or_update(&mut self, key: PatchKey, compute: impl FnOnce() -> RgbaImage) -> &RgbaImage {
        if self.recompute || self.key != Some(key) {
            self.patch = None;
        }
        self.key = Some(key);
        self.recompute = false;
        self.patch.get_or_insert_with(|| {
            log::debug!("recomputing {}x{} patch", key.bounds.2, key.bounds.3);
            compute()
        })
    }
}

#[derive(Debug, Clone, Default)]
enum Asset {
    #[default]
    Unloaded,
    Loaded(RgbaImage),
    Missing,
}

/// Inputs a layer may read while drawing.
pub struct RenderContext<'a> {
    /// Composite of the base image and every enabled layer below.
    pub previous: &'a RgbaImage,
    pub fonts: &'a Fonts,
    pub below: u64,
}

// ============================================================================
// LAYER
// ============================================================================

#[derive(Debug, Clone)]
pub struct Layer {
    id: LayerId,
    pub name: String,
    enabled: bool,
    position: usize,
    active: bool,
    placed: bool,
    geometry: Geometry,
    kind: LayerKind,
    revision: u64,
    cache: PatchCache,
    asset: Asset,
    /// Last drawn text bounds, relative to anchor 0.
    text_extent: Option<Rect>,
}

impl Layer {
    pub fn new(kind: LayerKind) -> Self {
        let t = kind.layer_type();
        Self {
            id: LayerId::new(),
            name: t.name().to_string(),
            enabled: true,
            position: 0,
            active: false,
            placed: false,
            geometry: Geometry::new(t.shape()),
            kind,
            revision: 0,
            cache: PatchCache::default(),
            asset: Asset::Unloaded,
            text_extent: None,
        }
    }

    pub fn with_type(t: LayerType, cfg: &EngineConfig) -> Self {
        Self::new(LayerKind::defaults(t, cfg))
    }

    /// A rect-shaped layer with both corners set.
    pub fn rect(kind: LayerKind, a: Point, b: Point) -> Self {
        let mut layer = Self::new(kind);
        layer.geometry.place(0, a);
        layer.geometry.place(1, b);
        layer
    }

    /// A point-shaped layer anchored at `p`.
    pub fn point(kind: LayerKind, p: Point) -> Self {
        let mut layer = Self::new(kind);
        layer.geometry.place(0, p);
        layer
    }

    /// A source rect with its target anchor, for zoom and clone.
    pub fn callout(kind: LayerKind, a: Point, b: Point, target: Point) -> Self {
        let mut layer = Self::rect(kind, a, b);
        layer.geometry.place(2, target);
        layer
    }

    /// A path through `points` (first point is the anchor).
    pub fn path(kind: LayerKind, points: &[Point]) -> Self {
        let mut layer = Self::new(kind);
        if let Some(first) = points.first() {
            layer.geometry.place(0, *first);
            for p in points {
                layer.geometry.push_path_point(*p);
            }
        }
        layer
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn layer_type(&self) -> LayerType {
        self.kind.layer_type()
    }

    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.touch();
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// True once the layer has been committed at least once.
    pub fn placed(&self) -> bool {
        self.placed
    }

    /// Returns `true` on the first call only.
    pub(crate) fn mark_placed(&mut self) -> bool {
        !std::mem::replace(&mut self.placed, true)
    }

    pub fn is_first(&self) -> bool {
        self.position == 0
    }

    pub fn is_last(&self, layer_count: usize) -> bool {
        self.position + 1 == layer_count
    }

    pub fn valid(&self) -> bool {
        self.geometry.valid()
    }

    pub fn tool_kind(&self) -> Option<ToolKind> {
        self.layer_type().tool_kind()
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn geometry_mut(&mut self) -> &mut Geometry {
        self.touch();
        &mut self.geometry
    }

    pub(crate) fn set_geometry(&mut self, geometry: Geometry) {
        self.touch();
        self.geometry = geometry;
    }

    /// Bumped by every change that can affect rendering.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn needs_recompute(&self) -> bool {
        self.cache.recompute
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    pub fn fields(&self) -> &'static [FieldDescriptor] {
        self.layer_type().fields()
    }

    pub fn property(&self, name: &str) -> Result<PropertyValue> {
        self.kind.property(name).ok_or_else(|| ImagineError::UnknownProperty {
            kind: self.layer_type().name(),
            name: name.to_string(),
        })
    }

    /// Set a field by name and flag cached patches for recompute. Returns
    /// the previous value.
    pub fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<PropertyValue> {
        let desc = self.layer_type().field(name).ok_or_else(|| ImagineError::UnknownProperty {
            kind: self.layer_type().name(),
            name: name.to_string(),
        })?;
        let value = desc.coerce(value)?;
        let old = self.property(name)?;
        if !self.kind.assign(desc.name, value) {
            return Err(desc.type_error());
        }
        if desc.name == "path" {
            self.asset = Asset::Unloaded;
        }
        self.cache.recompute = true;
        self.text_extent = None;
        self.touch();
        Ok(old)
    }

    /// Shift by the negated crop origin.
    pub fn crop(&mut self, x1: f32, y1: f32) {
        self.translate(-x1, -y1);
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.geometry_mut().translate(dx, dy);
    }

    pub fn transform(&mut self, m: &Affine) {
        self.geometry_mut().apply_affine(m);
    }

    /// Place the callout target beside the source rect when unset.
    pub(crate) fn place_default_target(&mut self) {
        if self.geometry.shape() != GeometryShape::Callout || self.geometry.anchors().position(2).is_some() {
            return;
        }
        let (Some(a), Some(b)) = (self.geometry.anchors().position(0), self.geometry.anchors().position(1)) else {
            return;
        };
        let r = Rect::from_corners(a, b);
        let factor = match &self.kind {
            LayerKind::Zoom(s) => s.factor,
            _ => 1.0,
        };
        let x = r.x1 + 20.0 + r.width() * factor * 0.5;
        let y = r.center().y;
        self.geometry.anchors_mut().set_position(2, x, y);
        self.touch();
    }

    /// Anchor hit, or a point inside the drawn shape.
    pub fn hit_test(&self, x: f32, y: f32, tol: HitTolerance) -> bool {
        self.geometry.hit_anchor(x, y, tol).is_some() || self.hit_inside(x, y)
    }

    pub fn hit_inside(&self, x: f32, y: f32) -> bool {
        if !self.valid() {
            return false;
        }
        let p = Point::new(x, y);
        let g = &self.geometry;
        match &self.kind {
            LayerKind::Circle(_) => match (g.resolved(0), g.resolved(1)) {
                (Some(c), Some(e)) => p.distance(c) <= c.distance(e),
                _ => false,
            },
            LayerKind::Line(s) => match (g.resolved(0), g.resolved(1)) {
                (Some(a), Some(b)) => distance_to_segment(p, a, b) <= s.width * 0.5 + 2.0,
                _ => false,
            },
            LayerKind::Path(s) => g
                .path_points()
                .windows(2)
                .any(|w| distance_to_segment(p, w[0], w[1]) <= s.width * 0.5 + 2.0),
            LayerKind::Text(s) => g.resolved(0).is_some_and(|a| self.hit_text(p, a, s.size)),
            LayerKind::Emoji(s) => g.resolved(0).is_some_and(|a| self.hit_text(p, a, s.size * 0.5)),
            _ => g.rect().is_some_and(|r| r.contains(p)),
        }
    }

    /// Inside the last drawn text bounds, or within `radius` of the anchor
    /// before the first draw.
    fn hit_text(&self, p: Point, anchor: Point, radius: f32) -> bool {
        match self.text_extent {
            Some(e) => Rect { x0: anchor.x + e.x0, y0: anchor.y + e.y0, x1: anchor.x + e.x1, y1: anchor.y + e.y1 }.contains(p),
            None => p.distance(anchor) <= radius,
        }
    }

    /// Draw onto `surface`. Invalid layers draw nothing.
    pub fn draw(&mut self, surface: &mut Surface, ctx: &RenderContext) {
        if !self.geometry.valid() {
            return;
        }
        let g = &self.geometry;
        match &self.kind {
            LayerKind::Rectangle(s) => {
                if let Some(r) = g.rect().filter(Rect::has_area) {
                    shapes::fill_rect(surface, r, s.fill);
                    shapes::stroke_rect(surface, r, s.width, s.stroke);
                }
            }
            LayerKind::Circle(s) => {
                if let (Some(c), Some(e)) = (g.resolved(0), g.resolved(1)) {
                    let radius = c.distance(e);
                    if radius > 0.0 {
                        shapes::fill_circle(surface, c, radius, s.fill);
                        shapes::stroke_circle(surface, c, radius, s.width, s.stroke);
                    }
                }
            }
            LayerKind::Ellipse(s) => {
                if let Some(r) = g.rect().filter(Rect::has_area) {
                    shapes::fill_ellipse(surface, r, s.fill);
                    shapes::stroke_ellipse(surface, r, s.width, s.stroke);
                }
            }
            LayerKind::Line(s) => {
                if let (Some(a), Some(b)) = (g.resolved(0), g.resolved(1)) {
                    draw_line(surface, a, b, s);
                }
            }
            LayerKind::Text(s) => {
                if let Some(a) = g.resolved(0) {
                    let block = TextBlock { text: &s.text, size: s.size, color: s.color, center_h: s.center_h, center_v: s.center_v };
                    let font = ctx.fonts.text_font(&s.font, s.bold);
                    self.text_extent = draw_text_block(surface, font.as_ref(), a, &block);
                }
            }
            LayerKind::Emoji(s) => {
                if let Some(a) = g.resolved(0) {
                    let block = TextBlock { text: &s.emoji, size: s.size, color: Color::WHITE, center_h: true, center_v: true };
                    self.text_extent = draw_text_block(surface, ctx.fonts.emoji_font().as_ref(), a, &block);
                }
            }
            LayerKind::Path(s) => {
                shapes::stroke_polyline(surface, &g.path_points(), s.width, s.color);
            }
            LayerKind::Image(s) => {
                if let Some(r) = g.rect().filter(Rect::has_area) {
                    draw_image_asset(surface, r, s, &mut self.asset, &mut self.cache);
                }
            }
            LayerKind::Lighting(s) => {
                if let Some(b) = g.rect().and_then(|r| sample_bounds(r, ctx.previous)) {
                    let key = PatchKey { bounds: b, below: ctx.below };
                    let e = s.enhancement();
                    let patch = self.cache.get_or_update(key, || {
                        adjustments::enhance(&transform::crop(ctx.previous, b.0, b.1, b.2, b.3), &e)
                    });
                    surface.draw_image(patch, b.0 as i64, b.1 as i64);
                }
            }
            LayerKind::Blur(s) => {
                if let Some(b) = g.rect().and_then(|r| sample_bounds(r, ctx.previous)) {
                    let key = PatchKey { bounds: b, below: ctx.below };
                    let (box_radius, sigma) = (s.box_radius, s.gaussian);
                    let patch = self.cache.get_or_update(key, || {
                        let src = transform::crop(ctx.previous, b.0, b.1, b.2, b.3);
                        filters::gaussian_blur(&filters::box_blur(&src, box_radius), sigma)
                    });
                    surface.draw_image(patch, b.0 as i64, b.1 as i64);
                }
            }
            LayerKind::Zoom(s) => {
                if let (Some(r), Some(t)) = (g.rect(), g.target()) {
                    draw_zoom(surface, r, t, s, ctx, &mut self.cache);
                }
            }
            LayerKind::Clone(s) => {
                if let (Some(r), Some(t)) = (g.rect(), g.target()) {
                    draw_clone(surface, r, t, s, ctx, &mut self.cache);
                }
            }
            // consumed by Document::crop on commit
            LayerKind::Crop => {}
        }
    }

    /// Editing chrome for the active layer: reticule while placing, crop
    /// shading, region outlines, anchors.
    pub fn draw_helpers(&self, surface: &mut Surface, tol: HitTolerance, mouse: Point) {
        let t = self.layer_type();
        let rect = self.geometry.rect();
        match rect {
            Some(r) if t == LayerType::Crop => shade_outside(surface, r),
            Some(r) if t.samples_below() && r.has_area() => {
                shapes::dashed_rect(surface, r, 1.0, shapes::DASH, Color::WHITE);
            }
            _ => {}
        }
        if !self.placed && t.shows_reticule() {
            draw_reticule(surface, mouse, tol);
        }
        self.geometry.anchors().draw(surface, tol, self.geometry.offset());
    }
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    if len2 <= 0.0 {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    p.distance(Point::new(a.x + t * dx, a.y + t * dy))
}

fn sample_bounds(r: Rect, previous: &RgbaImage) -> Option<(u32, u32, u32, u32)> {
    r.pixel_bounds(previous.width(), previous.height())
}

fn draw_line(surface: &mut Surface, a: Point, b: Point, s: &LineStyle) {
    if a == b {
        return;
    }
    shapes::stroke_segment(surface, a, b, s.width, s.color);
    if s.arrow {
        let angle = (b.y - a.y).atan2(b.x - a.x);
        let len = 7.0 * s.width;
        for side in [-1.0f32, 1.0] {
            let theta = angle + PI + side * PI / 6.0;
            let tip = Point::new(b.x + len * theta.cos(), b.y + len * theta.sin());
            shapes::stroke_segment(surface, b, tip, s.width, s.color);
        }
    }
}

struct TextBlock<'a> {
    text: &'a str,
    size: f32,
    color: Color,
    center_h: bool,
    center_v: bool,
}

/// Returns the drawn block's bounds relative to `anchor`.
fn draw_text_block(surface: &mut Surface, font: Option<&ab_glyph::FontArc>, anchor: Point, block: &TextBlock) -> Option<Rect> {
    let Some(font) = font else {
        log::debug!("no font available; skipping text");
        return None;
    };
    let alignment = if block.center_h { TextAlignment::Center } else { TextAlignment::Left };
    let layout = text::layout_text(font, block.text, block.size, alignment);
    let mut origin = anchor;
    if block.center_h {
        origin.x -= layout.width * 0.5;
    }
    if block.center_v {
        origin.y -= layout.height * 0.5;
    }
    text::draw_layout(surface, font, &layout, block.size, origin, block.color);
    let (dx, dy) = (origin.x - anchor.x, origin.y - anchor.y);
    Some(Rect { x0: dx, y0: dy, x1: dx + layout.width, y1: dy + layout.height })
}

fn draw_image_asset(surface: &mut Surface, r: Rect, style: &ImageStyle, asset: &mut Asset, cache: &mut PatchCache) {
    if matches!(asset, Asset::Unloaded) {
        *asset = match image::open(&style.path) {
            Ok(img) => Asset::Loaded(img.to_rgba8()),
            Err(e) => {
                log::warn!("image layer source {} unavailable: {}", style.path.display(), e);
                Asset::Missing
            }
        };
    }
    match asset {
        Asset::Loaded(img) => {
            let (w, h) = if style.keep_ratio {
                transform::fit_within(img.width(), img.height(), r.width(), r.height())
            } else {
                (r.width(), r.height())
            };
            let (tw, th) = (w.round().max(1.0) as u32, h.round().max(1.0) as u32);
            let x = r.x0 + (r.width() - w) * 0.5;
            let y = r.y0 + (r.height() - h) * 0.5;
            let key = PatchKey { bounds: (0, 0, tw, th), below: 0 };
            let patch = cache.get_or_update(key, || transform::resize(img, tw, th));
            surface.draw_image(patch, x.round() as i64, y.round() as i64);
        }
        _ => shapes::dashed_rect(surface, r, 2.0, shapes::DASH, Color::WHITE),
    }
}

fn draw_zoom(surface: &mut Surface, r: Rect, target: Point, s: &ZoomStyle, ctx: &RenderContext, cache: &mut PatchCache) {
    let Some(b) = sample_bounds(r, ctx.previous) else {
        return;
    };
    let tw = (b.2 as f32 * s.factor).round().max(1.0) as u32;
    let th = (b.3 as f32 * s.factor).round().max(1.0) as u32;
    let x0 = (target.x - tw as f32 * 0.5).round();
    let y0 = (target.y - th as f32 * 0.5).round();
    let dest = Rect { x0, y0, x1: x0 + tw as f32, y1: y0 + th as f32 };
    let src = Rect { x0: b.0 as f32, y0: b.1 as f32, x1: (b.0 + b.2) as f32, y1: (b.1 + b.3) as f32 };

    if s.guides {
        let corners = |q: &Rect| {
            [
                Point::new(q.x0, q.y0),
                Point::new(q.x1, q.y0),
                Point::new(q.x1, q.y1),
                Point::new(q.x0, q.y1),
            ]
        };
        for (a, z) in corners(&src).into_iter().zip(corners(&dest)) {
            shapes::stroke_segment(surface, a, z, 1.0, s.border_color);
        }
    }
    if s.shadow {
        let shadow = Rect { x0: dest.x0 + 4.0, y0: dest.y0 + 4.0, x1: dest.x1 + 4.0, y1: dest.y1 + 4.0 };
        shapes::drop_shadow(surface, shadow, 12.0, Color::BLACK.with_alpha(140));
    }

    let key = PatchKey { bounds: b, below: ctx.below };
    let patch = cache.get_or_update(key, || {
        let crop = transform::crop(ctx.previous, b.0, b.1, b.2, b.3);
        transform::resize(&crop, tw, th)
    });
    surface.draw_image(patch, x0 as i64, y0 as i64);
    shapes::stroke_rect(surface, dest, s.border_width, s.border_color);
    shapes::stroke_rect(surface, src, s.border_width, s.border_color);
}

fn draw_clone(surface: &mut Surface, r: Rect, target: Point, s: &CloneStyle, ctx: &RenderContext, cache: &mut PatchCache) {
    let Some(b) = sample_bounds(r, ctx.previous) else {
        return;
    };
    let x = (target.x - b.2 as f32 * 0.5).round() as i64;
    let y = (target.y - b.3 as f32 * 0.5).round() as i64;
    if s.live {
        let patch = transform::crop(ctx.previous, b.0, b.1, b.2, b.3);
        surface.draw_image(&patch, x, y);
    } else {
        let key = PatchKey { bounds: b, below: 0 };
        let patch = cache.get_or_update(key, || transform::crop(ctx.previous, b.0, b.1, b.2, b.3));
        surface.draw_image(patch, x, y);
    }
}

fn shade_outside(surface: &mut Surface, r: Rect) {
    let shade = Color::BLACK.with_alpha(128);
    let (w, h) = (surface.width() as i64, surface.height() as i64);
    let x0 = r.x0.round() as i64;
    let y0 = r.y0.round() as i64;
    let x1 = r.x1.round() as i64;
    let y1 = r.y1.round() as i64;
    surface.fill_rect(0, 0, w, y0, shade);
    surface.fill_rect(0, y1, w, h, shade);
    surface.fill_rect(0, y0, x0, y1, shade);
    surface.fill_rect(x1, y0, w, y1, shade);
}

fn draw_reticule(surface: &mut Surface, mouse: Point, tol: HitTolerance) {
    let (w, h) = (surface.width() as f32, surface.height() as f32);
    let width = tol.reach(0.0) / tol.radius.max(1.0);
    shapes::dashed_segment(surface, Point::new(mouse.x, 0.0), Point::new(mouse.x, h), width, shapes::DASH, Color::WHITE);
    shapes::dashed_segment(surface, Point::new(0.0, mouse.y), Point::new(w, mouse.y), width, shapes::DASH, Color::WHITE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn cfg() -> EngineConfig {
        EngineConfig::default()
    }

    fn ctx<'a>(previous: &'a RgbaImage, fonts: &'a Fonts) -> RenderContext<'a> {
        RenderContext { previous, fonts, below: 0 }
    }

    fn red_rect(a: Point, b: Point) -> Layer {
        Layer::rect(
            LayerKind::Rectangle(ShapeStyle { width: 0.0, stroke: Color::WHITE, fill: Color::rgba(255, 0, 0, 255) }),
            a,
            b,
        )
    }

    #[test]
    fn every_type_has_defaults_and_a_tool() {
        for t in LayerType::ALL {
            let layer = Layer::with_type(t, &cfg());
            assert_eq!(layer.layer_type(), t);
            assert_eq!(layer.name, t.name());
            assert!(layer.tool_kind().is_some());
            assert!(!layer.valid());
            for f in t.fields() {
                assert!(layer.property(f.name).is_ok(), "{} lacks {}", t.name(), f.name);
            }
        }
    }

    #[test]
    fn descriptor_tables_are_ordered() {
        for t in LayerType::ALL {
            let orders: Vec<u8> = t.fields().iter().map(|f| f.order).collect();
            let mut sorted = orders.clone();
            sorted.sort();
            assert_eq!(orders, sorted);
        }
    }

    #[test]
    fn invalid_layer_draws_nothing() {
        let base = RgbaImage::from_pixel(50, 50, Rgba([0, 0, 255, 255]));
        let fonts = Fonts::default();
        let mut surface = Surface::from_image(&base);
        let mut layer = Layer::with_type(LayerType::Rectangle, &cfg());
        layer.geometry_mut().place(0, Point::new(5.0, 5.0));
        layer.draw(&mut surface, &ctx(&base, &fonts));
        assert_eq!(surface.image(), &base);
    }

    #[test]
    fn crop_translates_by_negated_origin() {
        let mut layer = red_rect(Point::new(10.0, 10.0), Point::new(50.0, 50.0));
        layer.crop(5.0, 5.0);
        assert_eq!(layer.geometry().resolved(0), Some(Point::new(5.0, 5.0)));
        assert_eq!(layer.geometry().resolved(1), Some(Point::new(45.0, 45.0)));
    }

    #[test]
    fn nudge_offset_applies_to_drawing_and_hits() {
        let mut layer = red_rect(Point::new(0.0, 0.0), Point::new(10.0, 10.0));
        layer.geometry_mut().set_offset(Point::new(20.0, 0.0));
        assert!(layer.hit_inside(25.0, 5.0));
        assert!(!layer.hit_inside(5.0, 5.0));
        let base = RgbaImage::from_pixel(40, 20, Rgba([0, 0, 0, 255]));
        let fonts = Fonts::default();
        let mut surface = Surface::from_image(&base);
        layer.draw(&mut surface, &ctx(&base, &fonts));
        assert_eq!(surface.pixel(25, 5), Rgba([255, 0, 0, 255]));
        assert_eq!(surface.pixel(5, 5), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn property_set_flags_recompute_and_returns_old() {
        let mut layer = Layer::with_type(LayerType::Blur, &cfg());
        let rev = layer.revision();
        let old = layer.set_property("gaussian", PropertyValue::Float(3.0)).unwrap();
        assert_eq!(old, PropertyValue::Float(10.0));
        assert!(layer.needs_recompute());
        assert!(layer.revision() > rev);
        assert_eq!(layer.property("gaussian").unwrap(), PropertyValue::Float(3.0));
    }

    #[test]
    fn property_values_are_checked_and_clamped() {
        let mut layer = Layer::with_type(LayerType::Zoom, &cfg());
        layer.set_property("factor", PropertyValue::Float(50.0)).unwrap();
        assert_eq!(layer.property("factor").unwrap(), PropertyValue::Float(10.0));
        assert!(matches!(
            layer.set_property("factor", PropertyValue::Bool(true)),
            Err(ImagineError::PropertyType { .. })
        ));
        assert!(matches!(
            layer.set_property("nope", PropertyValue::Bool(true)),
            Err(ImagineError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn blur_patch_is_cached_until_a_property_changes() {
        let base = RgbaImage::from_fn(40, 40, |x, _| if x < 20 { Rgba([0, 0, 0, 255]) } else { Rgba([255, 255, 255, 255]) });
        let fonts = Fonts::default();
        let mut layer = Layer::rect(LayerKind::defaults(LayerType::Blur, &cfg()), Point::new(10.0, 10.0), Point::new(30.0, 30.0));
        let mut surface = Surface::from_image(&base);
        layer.draw(&mut surface, &ctx(&base, &fonts));
        let first = surface.pixel(20, 20);
        assert!(first[0] > 0 && first[0] < 255);

        layer.set_property("gaussian", PropertyValue::Float(0.0)).unwrap();
        let mut surface = Surface::from_image(&base);
        layer.draw(&mut surface, &ctx(&base, &fonts));
        assert!(!layer.needs_recompute());
        assert_eq!(surface.pixel(20, 20), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn lighting_brightens_sampled_region_only() {
        let base = RgbaImage::from_pixel(30, 30, Rgba([100, 100, 100, 255]));
        let fonts = Fonts::default();
        let mut layer = Layer::rect(LayerKind::defaults(LayerType::Lighting, &cfg()), Point::new(0.0, 0.0), Point::new(10.0, 10.0));
        let mut surface = Surface::from_image(&base);
        layer.draw(&mut surface, &ctx(&base, &fonts));
        assert_eq!(surface.pixel(5, 5), Rgba([150, 150, 150, 255]));
        assert_eq!(surface.pixel(20, 20), Rgba([100, 100, 100, 255]));
    }

    #[test]
    fn zoom_paints_scaled_patch_at_target() {
        let base = RgbaImage::from_fn(100, 100, |x, y| {
            if x < 10 && y < 10 { Rgba([255, 0, 0, 255]) } else { Rgba([0, 0, 0, 255]) }
        });
        let fonts = Fonts::default();
        let mut kind = LayerKind::defaults(LayerType::Zoom, &cfg());
        if let LayerKind::Zoom(s) = &mut kind {
            s.guides = false;
            s.shadow = false;
            s.border_width = 0.0;
        }
        let mut layer = Layer::callout(kind, Point::new(0.0, 0.0), Point::new(10.0, 10.0), Point::new(60.0, 60.0));
        let mut surface = Surface::from_image(&base);
        layer.draw(&mut surface, &ctx(&base, &fonts));
        // 20x20 red square centred on (60, 60)
        assert_eq!(surface.pixel(52, 52), Rgba([255, 0, 0, 255]));
        assert_eq!(surface.pixel(67, 67), Rgba([255, 0, 0, 255]));
        assert_eq!(surface.pixel(75, 75), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn static_clone_keeps_first_capture() {
        let red = RgbaImage::from_pixel(40, 20, Rgba([255, 0, 0, 255]));
        let green = RgbaImage::from_pixel(40, 20, Rgba([0, 255, 0, 255]));
        let fonts = Fonts::default();
        let mut layer = Layer::callout(
            LayerKind::Clone(CloneStyle { live: false }),
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(30.0, 10.0),
        );
        let mut surface = Surface::from_image(&red);
        layer.draw(&mut surface, &ctx(&red, &fonts));
        let mut surface = Surface::from_image(&green);
        layer.draw(&mut surface, &ctx(&green, &fonts));
        assert_eq!(surface.pixel(30, 10), Rgba([255, 0, 0, 255]));

        layer.set_property("live", PropertyValue::Bool(true)).unwrap();
        let mut surface = Surface::from_image(&green);
        layer.draw(&mut surface, &ctx(&green, &fonts));
        assert_eq!(surface.pixel(30, 10), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn missing_image_asset_draws_placeholder() {
        let base = RgbaImage::from_pixel(60, 60, Rgba([0, 0, 0, 255]));
        let fonts = Fonts::default();
        let mut kind = LayerKind::defaults(LayerType::Image, &cfg());
        if let LayerKind::Image(s) = &mut kind {
            s.path = PathBuf::from("/nonexistent/asset.png");
        }
        let mut layer = Layer::rect(kind, Point::new(10.0, 10.0), Point::new(50.0, 50.0));
        let mut surface = Surface::from_image(&base);
        layer.draw(&mut surface, &ctx(&base, &fonts));
        // dashed border starts with a dash at the top-left corner
        assert_eq!(surface.pixel(14, 10), Rgba([255, 255, 255, 255]));
        assert_eq!(surface.pixel(30, 30), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn arrow_adds_head_strokes() {
        let base = RgbaImage::from_pixel(100, 60, Rgba([0, 0, 0, 255]));
        let fonts = Fonts::default();
        let mut plain = Layer::rect(
            LayerKind::Line(LineStyle { width: 2.0, color: Color::WHITE, arrow: false }),
            Point::new(10.0, 30.0),
            Point::new(90.0, 30.0),
        );
        let mut arrow = plain.clone();
        arrow.set_property("arrow", PropertyValue::Bool(true)).unwrap();

        let mut a = Surface::from_image(&base);
        plain.draw(&mut a, &ctx(&base, &fonts));
        let mut b = Surface::from_image(&base);
        arrow.draw(&mut b, &ctx(&base, &fonts));
        // head strokes reach back ~12px above/below the shaft near the tip
        assert_eq!(a.pixel(80, 24)[0], 0);
        assert!(b.pixel(80, 24)[0] > 0);
    }

    #[test]
    fn path_needs_traced_points() {
        let mut layer = Layer::with_type(LayerType::Path, &cfg());
        layer.geometry_mut().place(0, Point::new(1.0, 1.0));
        assert!(!layer.valid());
        let layer = Layer::path(
            LayerKind::defaults(LayerType::Path, &cfg()),
            &[Point::new(1.0, 1.0), Point::new(5.0, 1.0), Point::new(5.0, 9.0)],
        );
        assert!(layer.valid());
        assert_eq!(layer.geometry().path_points().len(), 3);
        assert!(layer.hit_inside(5.0, 5.0));
    }

    #[test]
    fn callout_target_defaults_beside_source() {
        let mut layer = Layer::rect(LayerKind::defaults(LayerType::Zoom, &cfg()), Point::new(0.0, 0.0), Point::new(10.0, 10.0));
        assert!(!layer.valid());
        layer.place_default_target();
        assert!(layer.valid());
        assert_eq!(layer.geometry().target(), Some(Point::new(40.0, 5.0)));
    }

    #[test]
    fn affine_maps_anchors_paths_and_offset() {
        let mut layer = Layer::path(
            LayerKind::defaults(LayerType::Path, &cfg()),
            &[Point::new(10.0, 0.0), Point::new(20.0, 0.0)],
        );
        layer.geometry_mut().set_offset(Point::new(1.0, 0.0));
        layer.transform(&Affine::flip_horizontal(100.0));
        let pts = layer.geometry().path_points();
        assert_eq!(pts[0], Point::new(89.0, 0.0));
        assert_eq!(pts[1], Point::new(79.0, 0.0));
    }

    fn placed_text(text: &str, at: Point) -> Layer {
        let mut layer = Layer::with_type(LayerType::Text, &cfg());
        layer.set_property("text", PropertyValue::Text(text.to_string())).unwrap();
        layer.geometry_mut().place(0, at);
        layer
    }

    #[test]
    fn text_renders_with_system_font_by_default() {
        let fonts = Fonts::default();
        if fonts.text_font(&cfg().default_font, true).is_none() {
            eprintln!("no system fonts installed; skipping");
            return;
        }
        let base = RgbaImage::from_pixel(200, 100, Rgba([0, 0, 0, 255]));
        let mut surface = Surface::from_image(&base);
        let mut layer = placed_text("Text", Point::new(20.0, 20.0));
        layer.draw(&mut surface, &ctx(&base, &fonts));
        let changed = surface.image().pixels().zip(base.pixels()).filter(|(a, b)| a != b).count();
        assert!(changed > 0);
    }

    #[test]
    fn font_family_is_a_text_property() {
        let mut layer = Layer::with_type(LayerType::Text, &cfg());
        assert_eq!(layer.property("font").unwrap(), PropertyValue::Text("Noto Sans".to_string()));
        assert_eq!(layer.property("bold").unwrap(), PropertyValue::Bool(true));
        layer.set_property("font", PropertyValue::Text("DejaVu Sans".to_string())).unwrap();
        assert!(matches!(layer.kind(), LayerKind::Text(s) if s.font == "DejaVu Sans"));
    }

    #[test]
    fn text_hit_area_follows_drawn_extent() {
        let fonts = Fonts::default();
        let Some(font) = fonts.text_font(&cfg().default_font, true) else {
            eprintln!("no system fonts installed; skipping");
            return;
        };
        let at = Point::new(20.0, 20.0);
        let mut layer = placed_text("WWWWWWWWWW", at);
        let size = cfg().default_font_size;
        let layout = text::layout_text(&font, "WWWWWWWWWW", size, TextAlignment::Left);
        assert!(layout.width > size * 2.0);
        let far_right = (at.x + layout.width - 2.0, at.y + layout.height * 0.5);
        assert!(!layer.hit_inside(far_right.0, far_right.1));

        let base = RgbaImage::from_pixel(400, 100, Rgba([0, 0, 0, 255]));
        let mut surface = Surface::from_image(&base);
        layer.draw(&mut surface, &ctx(&base, &fonts));
        assert!(layer.hit_inside(far_right.0, far_right.1));
        assert!(!layer.hit_inside(at.x - 5.0, at.y + 5.0));
        assert!(!layer.hit_inside(at.x + 5.0, at.y + layout.height + 5.0));

        // moving keeps the extent attached to the anchor
        layer.translate(0.0, 30.0);
        assert!(layer.hit_inside(far_right.0, far_right.1 + 30.0));
    }

    #[test]
    fn layer_id_display_is_short() {
        assert_eq!(LayerId::new().to_string().len(), 8);
    }
}
