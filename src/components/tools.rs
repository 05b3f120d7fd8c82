use crate::components::anchor::Point;
use crate::components::history::InverseAction;
use crate::components::layers::{Geometry, GeometryShape, Layer, LayerId, LayerKind, LayerType, PropertyValue};
use crate::document::Document;
use crate::error::{ImagineError, Result};

// ============================================================================
// INPUT
// ============================================================================

/// Keyboard modifier state, captured by the host per event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputModifiers {
    pub control: bool,
    pub shift: bool,
    pub alt: bool,
}

impl InputModifiers {
    pub const NONE: InputModifiers = InputModifiers { control: false, shift: false, alt: false };
    pub const CONTROL: InputModifiers = InputModifiers { control: true, shift: false, alt: false };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerButton {
    Left,
    Middle,
    Right,
}

/// A pointer event in document coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    pub x: f32,
    pub y: f32,
    pub button: Option<PointerButton>,
    pub modifiers: InputModifiers,
}

impl PointerEvent {
    pub fn left(x: f32, y: f32) -> Self {
        Self { x, y, button: Some(PointerButton::Left), modifiers: InputModifiers::NONE }
    }

    pub fn right(x: f32, y: f32) -> Self {
        Self { x, y, button: Some(PointerButton::Right), modifiers: InputModifiers::NONE }
    }

    /// Motion with no button change.
    pub fn moved(x: f32, y: f32) -> Self {
        Self { x, y, button: None, modifiers: InputModifiers::NONE }
    }

    pub fn with_modifiers(self, modifiers: InputModifiers) -> Self {
        Self { modifiers, ..self }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

// ============================================================================
// TOOL
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// Two-corner drag (also drives callout layers).
    Rect,
    /// Single click, follows the pointer until release.
    Point,
    /// Freehand trace.
    Path,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolState {
    /// First anchor follows the pointer.
    Placing,
    /// Button held after the first anchor; the second follows the pointer.
    Sizing,
    /// Button held on a path layer; points are appended.
    Tracing,
    Placed,
    /// An anchor is grabbed.
    Dragging,
    /// Whole-layer left-drag.
    Moving,
    /// The bound layer was consumed (crop).
    Finished,
}

#[derive(Clone, Copy, Debug)]
struct Nudge {
    start: Point,
    base: Point,
}

/// Interaction controller bound to one layer of a [`Document`].
///
/// The tool refers to its layer by id; the document owns the layer.
#[derive(Debug, Clone)]
pub struct Tool {
    layer: LayerId,
    kind: ToolKind,
    state: ToolState,
    /// Pointer and geometry at the start of a whole-layer move.
    move_from: Option<(Point, Geometry)>,
    /// Geometry before the current drag, redefinition or nudge.
    before: Option<Geometry>,
    redefining: bool,
    nudge: Option<Nudge>,
}

impl Tool {
    /// Add a fresh layer of `t` with configured defaults and bind to it.
    pub fn create(doc: &mut Document, t: LayerType) -> Self {
        let kind = LayerKind::defaults(t, doc.config());
        Self::create_with(doc, kind)
    }

    pub fn create_with(doc: &mut Document, kind: LayerKind) -> Self {
        let layer = Layer::new(kind);
        Self::attach(doc, layer)
    }

    /// Create the layer named by a shortcut chord such as `"a,r"`.
    pub fn from_shortcut(doc: &mut Document, chord: &str) -> Option<Self> {
        let shortcut = shortcut_for(chord)?;
        let mut layer = Layer::with_type(shortcut.layer_type, doc.config());
        if shortcut.arrow {
            layer.set_property("arrow", PropertyValue::Bool(true)).ok()?;
            layer.name = "Arrow".to_string();
        }
        Some(Self::attach(doc, layer))
    }

    fn attach(doc: &mut Document, layer: Layer) -> Self {
        let t = layer.layer_type();
        let id = doc.add_layer(layer);
        if let Err(e) = doc.set_active(id) {
            log::warn!("could not select new {} layer: {}", t.name(), e);
        }
        log::debug!("tool bound to new {} layer {}", t.name(), id);
        Self {
            layer: id,
            kind: t.tool_kind().unwrap_or(ToolKind::Rect),
            state: ToolState::Placing,
            move_from: None,
            before: None,
            redefining: false,
            nudge: None,
        }
    }

    /// Bind to an existing layer. Valid layers start out `Placed`.
    pub fn bind(doc: &mut Document, id: LayerId) -> Result<Self> {
        let layer = doc.layer(id).ok_or(ImagineError::UnknownLayer)?;
        let kind = layer.tool_kind().ok_or(ImagineError::UnknownLayer)?;
        let state = if layer.valid() { ToolState::Placed } else { ToolState::Placing };
        doc.set_active(id)?;
        Ok(Self { layer: id, kind, state, move_from: None, before: None, redefining: false, nudge: None })
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn kind(&self) -> ToolKind {
        self.kind
    }

    pub fn state(&self) -> ToolState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == ToolState::Finished
    }

    /// Returns `true` when the event was consumed.
    pub fn pointer_down(&mut self, doc: &mut Document, ev: &PointerEvent) -> bool {
        let tol = doc.tolerance();
        let p = ev.point();
        let Some(layer) = doc.layer_mut(self.layer) else {
            return false;
        };
        match ev.button {
            Some(PointerButton::Right) => {
                if self.nudge.is_none() {
                    self.before.get_or_insert_with(|| layer.geometry().clone());
                    self.nudge = Some(Nudge { start: p, base: layer.geometry().offset() });
                }
                return true;
            }
            Some(PointerButton::Left) => {}
            _ => return false,
        }

        match self.state {
            ToolState::Placing => {
                self.begin_shape(layer, p);
                true
            }
            ToolState::Placed if ev.modifiers.control => {
                self.before = Some(layer.geometry().clone());
                self.redefining = true;
                layer.geometry_mut().reset();
                self.begin_shape(layer, p);
                true
            }
            ToolState::Placed => {
                let snapshot = layer.geometry().clone();
                if layer.geometry_mut().grab(p.x, p.y, tol).is_some() {
                    self.before = Some(snapshot);
                    self.state = ToolState::Dragging;
                    true
                } else if layer.hit_inside(p.x, p.y) {
                    self.move_from = Some((p, snapshot));
                    self.state = ToolState::Moving;
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    pub fn pointer_move(&mut self, doc: &mut Document, ev: &PointerEvent) -> bool {
        let p = ev.point();
        let Some(layer) = doc.layer_mut(self.layer) else {
            return false;
        };
        if let Some(n) = self.nudge {
            let offset = n.base.offset(p.x - n.start.x, p.y - n.start.y);
            layer.geometry_mut().set_offset(offset);
            return true;
        }
        match self.state {
            ToolState::Placing => {
                layer.geometry_mut().place(0, p);
                true
            }
            ToolState::Sizing => {
                let i = if self.kind == ToolKind::Point { 0 } else { 1 };
                layer.geometry_mut().place(i, p);
                true
            }
            ToolState::Tracing => {
                layer.geometry_mut().push_path_point(p);
                true
            }
            ToolState::Dragging => layer.geometry_mut().drag(p.x, p.y),
            ToolState::Moving => match &self.move_from {
                Some((start, origin)) => {
                    let mut g = origin.clone();
                    g.translate(p.x - start.x, p.y - start.y);
                    layer.set_geometry(g);
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    pub fn pointer_up(&mut self, doc: &mut Document, ev: &PointerEvent) -> bool {
        if ev.button == Some(PointerButton::Right) {
            return self.finish_nudge(doc, ev);
        }
        if ev.button != Some(PointerButton::Left) {
            return false;
        }
        let p = ev.point();
        match self.state {
            ToolState::Sizing | ToolState::Tracing => {
                self.pointer_move(doc, &PointerEvent::moved(p.x, p.y));
                self.commit(doc)
            }
            ToolState::Dragging => {
                let Some(layer) = doc.layer_mut(self.layer) else {
                    return false;
                };
                layer.geometry_mut().release(p.x, p.y);
                let name = layer.name.clone();
                let changed = self.before.as_ref().is_some_and(|b| b != layer.geometry());
                self.state = ToolState::Placed;
                if let Some(before) = self.before.take().filter(|_| changed) {
                    doc.record(format!("Edit {name}"), InverseAction::RestoreGeometry { layer: self.layer, geometry: before });
                }
                true
            }
            ToolState::Moving => {
                self.pointer_move(doc, &PointerEvent::moved(p.x, p.y));
                self.state = ToolState::Placed;
                let Some((start, _)) = self.move_from.take() else {
                    return false;
                };
                let (dx, dy) = (p.x - start.x, p.y - start.y);
                if dx != 0.0 || dy != 0.0 {
                    let name = doc.layer(self.layer).map(|l| l.name.clone()).unwrap_or_default();
                    doc.record(
                        format!("Move {name}"),
                        InverseAction::TranslateLayerAnchors { layer: self.layer, dx: -dx, dy: -dy },
                    );
                }
                true
            }
            _ => false,
        }
    }

    /// Abort the interaction in progress. Returns `true` when the layer was
    /// never placed, in which case the caller should delete it.
    pub fn cancel(&mut self, doc: &mut Document) -> bool {
        let Some(layer) = doc.layer_mut(self.layer) else {
            return false;
        };
        self.nudge = None;
        self.move_from = None;
        self.redefining = false;
        if let Some(before) = self.before.take() {
            layer.set_geometry(before);
        } else if !layer.placed() {
            layer.geometry_mut().reset();
        }
        if layer.placed() {
            self.state = ToolState::Placed;
            false
        } else {
            self.state = ToolState::Placing;
            true
        }
    }

    fn begin_shape(&mut self, layer: &mut Layer, p: Point) {
        let g = layer.geometry_mut();
        match g.shape() {
            GeometryShape::Rect | GeometryShape::Callout => {
                g.place(0, p);
                g.place(1, p);
                self.state = ToolState::Sizing;
            }
            GeometryShape::Point => {
                g.place(0, p);
                self.state = ToolState::Sizing;
            }
            GeometryShape::Path => {
                g.place(0, p);
                g.push_path_point(p);
                self.state = ToolState::Tracing;
            }
        }
    }

    fn commit(&mut self, doc: &mut Document) -> bool {
        let id = self.layer;
        let Some(layer) = doc.layer_mut(id) else {
            return false;
        };
        layer.place_default_target();
        let degenerate = match layer.geometry().shape() {
            GeometryShape::Rect | GeometryShape::Callout => {
                layer.geometry().rect().is_none_or(|r| r.width() <= 0.0 && r.height() <= 0.0)
            }
            _ => false,
        };
        if !layer.valid() || degenerate {
            // a click without a drag: start over
            match self.before.take().filter(|_| self.redefining) {
                Some(before) => {
                    layer.set_geometry(before);
                    self.state = ToolState::Placed;
                }
                None => {
                    layer.geometry_mut().reset();
                    self.state = ToolState::Placing;
                }
            }
            self.redefining = false;
            return true;
        }

        if layer.layer_type() == LayerType::Crop {
            let rect = layer.geometry().rect();
            doc.discard_layer(id);
            if let Some(r) = rect {
                doc.crop(r.x0, r.y0, r.x1, r.y1);
            }
            self.state = ToolState::Finished;
            return true;
        }

        let name = layer.name.clone();
        self.state = ToolState::Placed;
        if std::mem::take(&mut self.redefining) {
            if let Some(before) = self.before.take() {
                doc.record(format!("Edit {name}"), InverseAction::RestoreGeometry { layer: id, geometry: before });
            }
        } else {
            doc.mark_placed(id);
        }
        true
    }

    fn finish_nudge(&mut self, doc: &mut Document, ev: &PointerEvent) -> bool {
        if self.nudge.is_none() {
            return false;
        }
        self.pointer_move(doc, &PointerEvent::moved(ev.x, ev.y));
        self.nudge = None;
        let Some(layer) = doc.layer(self.layer) else {
            return false;
        };
        let placed = layer.placed();
        let name = layer.name.clone();
        let changed = self.before.as_ref().is_some_and(|b| b.offset() != layer.geometry().offset());
        // a nudge during a drag keeps the drag's snapshot
        if !matches!(self.state, ToolState::Dragging | ToolState::Sizing | ToolState::Tracing) {
            if let Some(before) = self.before.take().filter(|_| changed && placed) {
                doc.record(format!("Move {name}"), InverseAction::RestoreGeometry { layer: self.layer, geometry: before });
            }
        }
        true
    }
}

// ============================================================================
// SHORTCUTS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shortcut {
    pub chord: &'static str,
    pub layer_type: LayerType,
    /// Line layers created from this shortcut carry an arrowhead.
    pub arrow: bool,
}

const fn shortcut(chord: &'static str, layer_type: LayerType) -> Shortcut {
    Shortcut { chord, layer_type, arrow: false }
}

pub static SHORTCUTS: &[Shortcut] = &[
    shortcut("a,r", LayerType::Rectangle),
    shortcut("a,c", LayerType::Circle),
    shortcut("a,e", LayerType::Ellipse),
    shortcut("a,l", LayerType::Line),
    Shortcut { chord: "a,a", layer_type: LayerType::Line, arrow: true },
    shortcut("a,t", LayerType::Text),
    shortcut("a,j", LayerType::Emoji),
    shortcut("a,p", LayerType::Path),
    shortcut("a,i", LayerType::Image),
    shortcut("a,g", LayerType::Lighting),
    shortcut("a,b", LayerType::Blur),
    shortcut("a,z", LayerType::Zoom),
    shortcut("a,k", LayerType::Clone),
    shortcut("a,x", LayerType::Crop),
];

pub fn shortcut_for(chord: &str) -> Option<&'static Shortcut> {
    SHORTCUTS.iter().find(|s| s.chord == chord)
}
