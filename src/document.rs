// ============================================================================
// DOCUMENT: base image, layer stack, compositing and undo
// ============================================================================
//
// Layer storage order is significant: index 0 is the top-most layer and is
// rendered last. Every mutation keeps `layers[i].position() == i`.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use image::RgbaImage;

use crate::canvas::{RasterImage, Surface};
use crate::components::anchor::{Affine, HitTolerance, Point, Rect};
use crate::components::history::{History, InverseAction};
use crate::components::layers::{Layer, LayerId, PropertyValue, RenderContext};
use crate::config::EngineConfig;
use crate::error::{ImagineError, Result};
use crate::ops::text::Fonts;
use crate::ops::transform;

pub const MIN_SCALE: f32 = 10.0;
pub const MAX_SCALE: f32 = 1000.0;
pub const SCALE_STEP: f32 = 25.0;

/// Change notifications for hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentEvent {
    LayersChanged,
    DirtyChanged(bool),
    ThumbnailChanged,
    HistoryChanged,
}

pub type Listener = Box<dyn FnMut(&DocumentEvent)>;

pub struct Document {
    image: RasterImage,
    /// Bumped on every image replacement; feeds sampling-cache keys.
    image_generation: u64,
    layers: Vec<Layer>,
    scale: f32,
    dirty: bool,
    history: History,
    config: EngineConfig,
    fonts: Fonts,
    listeners: Vec<Listener>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("size", &(self.width(), self.height()))
            .field("layers", &self.layers.len())
            .field("scale", &self.scale)
            .field("dirty", &self.dirty)
            .field("history", &self.history.len())
            .finish()
    }
}

impl Document {
    pub fn new(image: RasterImage) -> Self {
        Self::with_config(image, EngineConfig::default())
    }

    pub fn with_config(image: RasterImage, config: EngineConfig) -> Self {
        Self {
            image,
            image_generation: 0,
            layers: Vec::new(),
            scale: 100.0,
            dirty: false,
            history: History::new(config.history_limit),
            config,
            fonts: Fonts::default(),
            listeners: Vec::new(),
        }
    }

    // --- accessors ---------------------------------------------------------

    pub fn image(&self) -> &RasterImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id() == id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id() == id)
    }

    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id() == id)
    }

    pub fn is_first(&self, id: LayerId) -> bool {
        self.index_of(id) == Some(0)
    }

    pub fn is_last(&self, id: LayerId) -> bool {
        self.index_of(id).is_some_and(|i| i + 1 == self.layers.len())
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.layers.iter().find(|l| l.active())
    }

    /// Make `id` the only active layer.
    pub fn set_active(&mut self, id: LayerId) -> Result<()> {
        if self.index_of(id).is_none() {
            return Err(ImagineError::UnknownLayer);
        }
        for layer in &mut self.layers {
            layer.set_active(layer.id() == id);
        }
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn fonts(&self) -> &Fonts {
        &self.fonts
    }

    pub fn set_fonts(&mut self, fonts: Fonts) {
        self.fonts = fonts;
        self.emit(DocumentEvent::ThumbnailChanged);
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    // --- zoom --------------------------------------------------------------

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale.clamp(MIN_SCALE, MAX_SCALE);
    }

    pub fn zoom_in(&mut self) {
        self.set_scale(self.scale + SCALE_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.set_scale(self.scale - SCALE_STEP);
    }

    /// Largest scale (percent, at most 100) showing the whole image in a
    /// viewport.
    pub fn best_fit_scale(&self, viewport_w: f32, viewport_h: f32) -> f32 {
        let fit = (viewport_w / self.width() as f32).min(viewport_h / self.height() as f32) * 100.0;
        fit.clamp(MIN_SCALE, 100.0)
    }

    /// Anchor hit tolerance at the current zoom.
    pub fn tolerance(&self) -> HitTolerance {
        HitTolerance::new(self.config.anchor_radius, self.scale)
    }

    // --- notifications -----------------------------------------------------

    pub fn subscribe(&mut self, listener: impl FnMut(&DocumentEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&mut self, event: DocumentEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }

    pub fn dirty(&self) -> bool {
        self.dirty
    }

    /// Called by hosts after a successful save.
    pub fn mark_clean(&mut self) {
        self.set_dirty(false);
    }

    fn set_dirty(&mut self, dirty: bool) {
        if self.dirty != dirty {
            self.dirty = dirty;
            self.emit(DocumentEvent::DirtyChanged(dirty));
        }
    }

    // --- history -----------------------------------------------------------

    /// Record an inverse action for an edit that just happened.
    pub(crate) fn record(&mut self, description: impl Into<String>, action: InverseAction) {
        if self.history.push(description, action) {
            self.emit(DocumentEvent::HistoryChanged);
        }
        self.set_dirty(true);
        self.emit(DocumentEvent::ThumbnailChanged);
    }

    /// Undo the most recent edit.
    pub fn undo(&mut self) -> bool {
        self.rollback(0) > 0
    }

    /// Undo every snapshot from the newest through `index`, newest first.
    /// Returns how many were undone.
    pub fn rollback(&mut self, index: usize) -> usize {
        let count = (index + 1).min(self.history.len());
        if count == 0 {
            return 0;
        }
        self.history.begin_rollback();
        for _ in 0..count {
            if let Some(snapshot) = self.history.pop_newest() {
                log::debug!("undo: {}", snapshot.description);
                self.apply_inverse(snapshot.action);
            }
        }
        self.history.end_rollback();
        log::info!("{} modifications cancelled", count);
        self.set_dirty(true);
        self.emit(DocumentEvent::HistoryChanged);
        self.emit(DocumentEvent::LayersChanged);
        self.emit(DocumentEvent::ThumbnailChanged);
        count
    }

    fn apply_inverse(&mut self, action: InverseAction) {
        match action {
            InverseAction::RestoreImage { image } => self.replace_image(image),
            InverseAction::RestoreImageAndTranslate { image, dx, dy } => {
                self.replace_image(image);
                self.layers.iter_mut().for_each(|l| l.translate(dx, dy));
            }
            InverseAction::RestoreImageAndMap { image, map } => {
                self.replace_image(image);
                self.layers.iter_mut().for_each(|l| l.transform(&map));
            }
            InverseAction::Rotate { degrees } => self.rotate(degrees),
            InverseAction::FlipHorizontal => self.flip_horizontal(),
            InverseAction::FlipVertical => self.flip_vertical(),
            InverseAction::DeleteLayer { layer } => {
                self.discard_layer(layer);
            }
            InverseAction::RestoreLayer { layer, index } => {
                let index = index.min(self.layers.len());
                self.layers.insert(index, *layer);
                self.renumber();
                self.emit(DocumentEvent::LayersChanged);
            }
            InverseAction::MoveLayer { layer, offset } => {
                if let Err(e) = self.move_layer(layer, offset) {
                    log::warn!("could not restore layer order: {}", e);
                }
            }
            InverseAction::TranslateLayerAnchors { layer, dx, dy } => {
                if let Some(l) = self.layer_mut(layer) {
                    l.translate(dx, dy);
                }
            }
            InverseAction::RestoreGeometry { layer, geometry } => {
                if let Some(l) = self.layer_mut(layer) {
                    l.set_geometry(geometry);
                }
            }
            InverseAction::SetProperty { layer, name, value } => {
                if let Some(Err(e)) = self.layer_mut(layer).map(|l| l.set_property(name, value)) {
                    log::warn!("could not restore {}: {}", name, e);
                }
            }
            InverseAction::SetEnabled { layer, enabled } => {
                if let Some(l) = self.layer_mut(layer) {
                    l.set_enabled(enabled);
                }
            }
            InverseAction::Rename { layer, name } => {
                if let Some(l) = self.layer_mut(layer) {
                    l.name = name;
                }
            }
        }
    }

    // --- layer stack -------------------------------------------------------

    fn renumber(&mut self) {
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.set_position(i);
        }
    }

    /// Insert on top of the stack. Layers that are already valid count as
    /// placed immediately.
    pub fn add_layer(&mut self, layer: Layer) -> LayerId {
        let id = layer.id();
        let place_now = layer.valid() && !layer.layer_type().is_transient();
        log::info!("added {} layer {}", layer.layer_type().name(), id);
        self.layers.insert(0, layer);
        self.renumber();
        self.set_dirty(true);
        self.emit(DocumentEvent::LayersChanged);
        if place_now {
            self.mark_placed(id);
        }
        id
    }

    /// First commit of a layer: records its removal as the inverse.
    pub(crate) fn mark_placed(&mut self, id: LayerId) {
        let Some(layer) = self.layer_mut(id) else {
            return;
        };
        if !layer.mark_placed() || layer.layer_type().is_transient() {
            return;
        }
        let name = layer.name.clone();
        self.record(format!("Add {name}"), InverseAction::DeleteLayer { layer: id });
    }

    /// Remove a layer. Placed layers can be restored by undo.
    pub fn delete_layer(&mut self, id: LayerId) -> Result<()> {
        let index = self.index_of(id).ok_or(ImagineError::UnknownLayer)?;
        let layer = self.layers.remove(index);
        self.renumber();
        log::info!("deleted layer {} ({})", layer.name, id);
        self.emit(DocumentEvent::LayersChanged);
        if layer.placed() {
            let name = layer.name.clone();
            self.record(format!("Delete {name}"), InverseAction::RestoreLayer { layer: Box::new(layer), index });
        } else {
            self.emit(DocumentEvent::ThumbnailChanged);
        }
        Ok(())
    }

    /// Remove without recording history (unplaced or consumed layers).
    pub fn discard_layer(&mut self, id: LayerId) -> Option<Layer> {
        let index = self.index_of(id)?;
        let layer = self.layers.remove(index);
        self.renumber();
        self.emit(DocumentEvent::LayersChanged);
        self.emit(DocumentEvent::ThumbnailChanged);
        Some(layer)
    }

    /// Reinsert at `(index + offset) mod count`. Negative offsets move the
    /// layer up (towards the top of the stack).
    pub fn move_layer(&mut self, id: LayerId, offset: isize) -> Result<()> {
        let index = self.index_of(id).ok_or(ImagineError::UnknownLayer)?;
        let count = self.layers.len() as isize;
        let target = (index as isize + offset).rem_euclid(count) as usize;
        if target == index {
            return Ok(());
        }
        let layer = self.layers.remove(index);
        let name = layer.name.clone();
        self.layers.insert(target, layer);
        self.renumber();
        self.emit(DocumentEvent::LayersChanged);
        let direction = if offset < 0 { "up" } else { "down" };
        self.record(format!("Move {name} {direction}"), InverseAction::MoveLayer { layer: id, offset: -offset });
        Ok(())
    }

    pub fn set_layer_enabled(&mut self, id: LayerId, enabled: bool) -> Result<()> {
        let layer = self.layer_mut(id).ok_or(ImagineError::UnknownLayer)?;
        if layer.enabled() == enabled {
            return Ok(());
        }
        layer.set_enabled(enabled);
        let name = layer.name.clone();
        let verb = if enabled { "Show" } else { "Hide" };
        self.emit(DocumentEvent::LayersChanged);
        self.record(format!("{verb} {name}"), InverseAction::SetEnabled { layer: id, enabled: !enabled });
        Ok(())
    }

    /// Set a layer field by name, recording the previous value.
    pub fn set_layer_property(&mut self, id: LayerId, name: &str, value: PropertyValue) -> Result<()> {
        let layer = self.layer_mut(id).ok_or(ImagineError::UnknownLayer)?;
        let old = layer.set_property(name, value)?;
        let Some(field) = layer.layer_type().field(name) else {
            return Ok(());
        };
        let label = format!("Change {} {}", layer.name, field.label.to_lowercase());
        self.record(label, InverseAction::SetProperty { layer: id, name: field.name, value: old });
        Ok(())
    }

    pub fn rename_layer(&mut self, id: LayerId, name: impl Into<String>) -> Result<()> {
        let layer = self.layer_mut(id).ok_or(ImagineError::UnknownLayer)?;
        let old = std::mem::replace(&mut layer.name, name.into());
        self.emit(DocumentEvent::LayersChanged);
        self.record(format!("Rename {old}"), InverseAction::Rename { layer: id, name: old });
        Ok(())
    }

    /// Enabled layers hit at a document point, top-most first.
    pub fn layers_at(&self, x: f32, y: f32) -> Vec<LayerId> {
        let tol = self.tolerance();
        self.layers
            .iter()
            .filter(|l| l.enabled() && l.hit_test(x, y, tol))
            .map(Layer::id)
            .collect()
    }

    // --- image transforms --------------------------------------------------

    fn replace_image(&mut self, image: RasterImage) {
        self.image = image;
        self.image_generation = self.image_generation.wrapping_add(1);
        self.emit(DocumentEvent::ThumbnailChanged);
    }

    /// Crop to the normalized rect clipped to the image. Zero-area rects are
    /// ignored. Layers shift by the negated crop origin.
    pub fn crop(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> bool {
        let rect = Rect::from_corners(Point::new(x1, y1), Point::new(x2, y2));
        let Some((x, y, w, h)) = rect.pixel_bounds(self.width(), self.height()) else {
            log::debug!("crop ignored: empty rect");
            return false;
        };
        let previous = self.image.clone();
        let cropped = transform::crop(previous.pixels(), x, y, w, h);
        self.replace_image(RasterImage::from_rgba(cropped));
        self.record("Crop", InverseAction::RestoreImageAndTranslate { image: previous, dx: x as f32, dy: y as f32 });
        for layer in &mut self.layers {
            layer.crop(x as f32, y as f32);
        }
        log::info!("cropped to {}x{} at ({}, {})", w, h, x, y);
        true
    }

    /// Resample the image. Layer geometry is left as is.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        let previous = self.image.clone();
        let resized = transform::resize(previous.pixels(), width, height);
        self.replace_image(RasterImage::from_rgba(resized));
        self.record("Resize", InverseAction::RestoreImage { image: previous });
        log::info!("resized to {}x{}", width, height);
        true
    }

    /// Counter-clockwise rotation. Layers follow the same mapping.
    pub fn rotate(&mut self, degrees: f32) {
        let turns = transform::quarter_turns(degrees);
        if turns == Some(0) {
            return;
        }
        let (w, h) = (self.width() as f32, self.height() as f32);
        let previous = self.image.clone();
        let rotated = transform::rotate(previous.pixels(), degrees);
        let (nw, nh) = (rotated.width() as f32, rotated.height() as f32);
        let forward = Affine::rotate(degrees, w, h, nw, nh);
        self.replace_image(RasterImage::from_rgba(rotated));
        for layer in &mut self.layers {
            layer.transform(&forward);
        }
        let action = match turns {
            Some(_) => InverseAction::Rotate { degrees: -degrees },
            None => InverseAction::RestoreImageAndMap { image: previous, map: Affine::rotate(-degrees, nw, nh, w, h) },
        };
        self.record(format!("Rotate {degrees}°"), action);
        log::info!("rotated by {} degrees", degrees);
    }

    pub fn flip_horizontal(&mut self) {
        let flipped = transform::flip_horizontal(self.image.pixels());
        let map = Affine::flip_horizontal(self.width() as f32);
        self.replace_image(RasterImage::from_rgba(flipped));
        self.layers.iter_mut().for_each(|l| l.transform(&map));
        self.record("Flip horizontally", InverseAction::FlipHorizontal);
        log::info!("flipped horizontally");
    }

    pub fn flip_vertical(&mut self) {
        let flipped = transform::flip_vertical(self.image.pixels());
        let map = Affine::flip_vertical(self.height() as f32);
        self.replace_image(RasterImage::from_rgba(flipped));
        self.layers.iter_mut().for_each(|l| l.transform(&map));
        self.record("Flip vertically", InverseAction::FlipVertical);
        log::info!("flipped vertically");
    }

    // --- rendering ---------------------------------------------------------

    /// Composite the base image and every enabled layer onto `surface`,
    /// bottom to top. Each layer draws onto a copy of everything below it,
    /// which is also what sampling layers read. Helpers for the active layer
    /// go on last and never reach the composite other layers see.
    pub fn render(&mut self, surface: &mut Surface, mouse: Point, helpers: bool) {
        let mut previous: RgbaImage = self.image.pixels().clone();
        let mut below = DefaultHasher::new();
        self.image_generation.hash(&mut below);

        for layer in self.layers.iter_mut().rev() {
            if !layer.enabled() {
                continue;
            }
            let mut intermediate = Surface::from_image(&previous);
            let ctx = RenderContext { previous: &previous, fonts: &self.fonts, below: below.finish() };
            layer.draw(&mut intermediate, &ctx);
            (layer.id(), layer.revision()).hash(&mut below);
            previous = intermediate.into_image();
        }
        surface.paint(&previous);

        if helpers {
            let tol = HitTolerance::new(self.config.anchor_radius, self.scale);
            if let Some(active) = self.layers.iter().find(|l| l.active()) {
                active.draw_helpers(surface, tol, mouse);
            }
        }
    }

    /// The final image without helpers.
    pub fn flatten(&mut self) -> RgbaImage {
        let mut surface = Surface::new(self.width(), self.height());
        self.render(&mut surface, Point::default(), false);
        surface.into_image()
    }

    /// Flattened image scaled down to fit `max_edge`, aspect preserved.
    pub fn thumbnail(&mut self, max_edge: u32) -> RgbaImage {
        let flat = self.flatten();
        let edge = max_edge.max(1);
        if flat.width() <= edge && flat.height() <= edge {
            return flat;
        }
        let edge = edge as f32;
        let (w, h) = transform::fit_within(flat.width(), flat.height(), edge, edge);
        let (w, h) = ((w.round() as u32).max(1), (h.round() as u32).max(1));
        if (w, h) == flat.dimensions() {
            return flat;
        }
        transform::resize(&flat, w, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Color;
    use crate::components::layers::{LayerKind, LayerType, ShapeStyle};
    use image::Rgba;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn doc(w: u32, h: u32) -> Document {
        Document::new(RasterImage::new(w, h, Color::BLACK))
    }

    fn rect(a: (f32, f32), b: (f32, f32), fill: Color) -> Layer {
        Layer::rect(
            LayerKind::Rectangle(ShapeStyle { width: 0.0, stroke: Color::WHITE, fill }),
            Point::new(a.0, a.1),
            Point::new(b.0, b.1),
        )
    }

    fn positions_match(doc: &Document) -> bool {
        doc.layers().iter().enumerate().all(|(i, l)| l.position() == i)
    }

    #[test]
    fn stack_positions_stay_consistent() {
        let mut d = doc(10, 10);
        let a = d.add_layer(rect((0.0, 0.0), (1.0, 1.0), Color::WHITE));
        let b = d.add_layer(rect((0.0, 0.0), (1.0, 1.0), Color::WHITE));
        let c = d.add_layer(rect((0.0, 0.0), (1.0, 1.0), Color::WHITE));
        assert!(positions_match(&d));
        assert!(d.is_first(c) && d.is_last(a));
        d.move_layer(c, 1).unwrap();
        assert_eq!(d.index_of(c), Some(1));
        assert!(positions_match(&d));
        d.move_layer(a, 1).unwrap();
        assert_eq!(d.index_of(a), Some(0));
        assert!(positions_match(&d));
        d.delete_layer(b).unwrap();
        assert!(positions_match(&d));
        assert!(d.delete_layer(b).is_err());
    }

    #[test]
    fn move_undo_restores_order() {
        let mut d = doc(10, 10);
        let a = d.add_layer(rect((0.0, 0.0), (1.0, 1.0), Color::WHITE));
        let b = d.add_layer(rect((0.0, 0.0), (1.0, 1.0), Color::WHITE));
        d.move_layer(b, 1).unwrap();
        assert_eq!(d.history().descriptions()[0], "Move Rectangle down");
        d.undo();
        assert_eq!(d.index_of(b), Some(0));
        assert_eq!(d.index_of(a), Some(1));
    }

    #[test]
    fn delete_undo_reinserts_at_index() {
        let mut d = doc(10, 10);
        let a = d.add_layer(rect((0.0, 0.0), (1.0, 1.0), Color::WHITE));
        d.add_layer(rect((0.0, 0.0), (1.0, 1.0), Color::WHITE));
        d.delete_layer(a).unwrap();
        assert_eq!(d.layers().len(), 1);
        d.undo();
        assert_eq!(d.index_of(a), Some(1));
        assert!(positions_match(&d));
    }

    #[test]
    fn undo_of_add_removes_layer() {
        let mut d = doc(10, 10);
        d.add_layer(rect((0.0, 0.0), (5.0, 5.0), Color::WHITE));
        assert_eq!(d.history().descriptions(), vec!["Add Rectangle".to_string()]);
        assert!(d.undo());
        assert!(d.layers().is_empty());
        assert!(d.history().is_empty());
        assert!(!d.undo());
    }

    #[test]
    fn rollback_replays_without_recording() {
        let mut d = doc(40, 20);
        d.flip_horizontal();
        d.rotate(90.0);
        d.flip_vertical();
        assert_eq!(d.history().len(), 3);
        assert_eq!(d.rollback(2), 3);
        assert!(d.history().is_empty());
        assert!(!d.history().is_rollbacking());
        assert_eq!((d.width(), d.height()), (40, 20));
    }

    #[test]
    fn crop_rect_is_normalized_and_clipped() {
        let mut d = doc(100, 100);
        let id = d.add_layer(rect((10.0, 10.0), (50.0, 50.0), Color::WHITE));
        assert!(d.crop(60.0, 60.0, 5.0, 5.0));
        assert_eq!((d.width(), d.height()), (55, 55));
        let g = d.layer(id).unwrap().geometry();
        assert_eq!(g.resolved(0), Some(Point::new(5.0, 5.0)));
        assert!(!d.crop(10.0, 10.0, 10.0, 40.0));
        assert!(!d.crop(200.0, 200.0, 300.0, 300.0));

        d.undo();
        assert_eq!((d.width(), d.height()), (100, 100));
        let g = d.layer(id).unwrap().geometry();
        assert_eq!(g.resolved(0), Some(Point::new(10.0, 10.0)));
    }

    #[test]
    fn resize_keeps_layer_geometry() {
        let mut d = doc(100, 100);
        let id = d.add_layer(rect((10.0, 10.0), (50.0, 50.0), Color::WHITE));
        assert!(d.resize(50, 50));
        assert_eq!((d.width(), d.height()), (50, 50));
        assert_eq!(d.layer(id).unwrap().geometry().resolved(1), Some(Point::new(50.0, 50.0)));
        d.undo();
        assert_eq!(d.width(), 100);
        assert!(!d.resize(0, 10));
    }

    #[test]
    fn rotation_maps_layers() {
        let mut d = doc(100, 50);
        let id = d.add_layer(rect((10.0, 10.0), (20.0, 20.0), Color::WHITE));
        d.rotate(90.0);
        assert_eq!((d.width(), d.height()), (50, 100));
        let g = d.layer(id).unwrap().geometry();
        let p = g.resolved(0).unwrap();
        assert!((p.x - 10.0).abs() < 1e-3 && (p.y - 90.0).abs() < 1e-3);
    }

    #[test]
    fn arbitrary_rotation_undo_restores_image() {
        let mut d = doc(30, 20);
        let before = d.image().clone();
        d.rotate(30.0);
        assert_ne!(d.width(), 30);
        d.undo();
        assert_eq!(d.image(), &before);
    }

    #[test]
    fn flips_are_self_inverse() {
        let mut d = Document::new(RasterImage::from_rgba(RgbaImage::from_fn(8, 4, |x, y| Rgba([x as u8, y as u8, 0, 255]))));
        let before = d.image().clone();
        let id = d.add_layer(rect((1.0, 1.0), (3.0, 2.0), Color::WHITE));
        d.flip_horizontal();
        assert_eq!(d.layer(id).unwrap().geometry().resolved(0), Some(Point::new(7.0, 1.0)));
        d.flip_vertical();
        d.undo();
        d.undo();
        assert_eq!(d.image(), &before);
        assert_eq!(d.layer(id).unwrap().geometry().resolved(0), Some(Point::new(1.0, 1.0)));
    }

    #[test]
    fn property_changes_are_undoable() {
        let mut d = doc(10, 10);
        let id = d.add_layer(Layer::with_type(LayerType::Blur, &EngineConfig::default()));
        d.set_layer_property(id, "gaussian", PropertyValue::Float(2.0)).unwrap();
        assert_eq!(d.history().descriptions()[0], "Change Blur gaussian blur");
        d.undo();
        assert_eq!(d.layer(id).unwrap().property("gaussian").unwrap(), PropertyValue::Float(10.0));
        assert!(d.set_layer_property(id, "bogus", PropertyValue::Float(1.0)).is_err());
    }

    #[test]
    fn rename_is_undoable() {
        let mut d = doc(10, 10);
        let id = d.add_layer(rect((0.0, 0.0), (5.0, 5.0), Color::WHITE));
        d.rename_layer(id, "Header").unwrap();
        assert_eq!(d.layer(id).unwrap().name, "Header");
        assert!(d.history().can_undo());
        d.undo();
        assert_eq!(d.layer(id).unwrap().name, "Rectangle");
    }

    #[test]
    fn disabled_layers_are_skipped() {
        let mut d = doc(20, 20);
        let id = d.add_layer(rect((0.0, 0.0), (20.0, 20.0), Color::WHITE));
        d.set_layer_enabled(id, false).unwrap();
        assert_eq!(*d.flatten().get_pixel(10, 10), Rgba([0, 0, 0, 255]));
        d.undo();
        assert_eq!(*d.flatten().get_pixel(10, 10), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn hit_listing_is_top_first() {
        let mut d = doc(100, 100);
        let low = d.add_layer(rect((0.0, 0.0), (50.0, 50.0), Color::WHITE));
        let high = d.add_layer(rect((25.0, 25.0), (75.0, 75.0), Color::WHITE));
        assert_eq!(d.layers_at(40.0, 40.0), vec![high, low]);
        assert_eq!(d.layers_at(10.0, 40.0), vec![low]);
        assert!(d.layers_at(95.0, 5.0).is_empty());
    }

    #[test]
    fn single_active_layer() {
        let mut d = doc(10, 10);
        let a = d.add_layer(rect((0.0, 0.0), (1.0, 1.0), Color::WHITE));
        let b = d.add_layer(rect((0.0, 0.0), (1.0, 1.0), Color::WHITE));
        d.set_active(a).unwrap();
        d.set_active(b).unwrap();
        assert_eq!(d.active_layer().map(Layer::id), Some(b));
        assert_eq!(d.layers().iter().filter(|l| l.active()).count(), 1);
    }

    #[test]
    fn scale_is_clamped() {
        let mut d = doc(400, 200);
        d.set_scale(5000.0);
        assert_eq!(d.scale(), MAX_SCALE);
        d.set_scale(100.0);
        d.zoom_in();
        assert_eq!(d.scale(), 125.0);
        d.zoom_out();
        d.zoom_out();
        assert_eq!(d.scale(), 75.0);
        assert_eq!(d.best_fit_scale(200.0, 200.0), 50.0);
        assert_eq!(d.best_fit_scale(4000.0, 4000.0), 100.0);
        assert_eq!(d.tolerance().reach(0.0), 8.0 / 0.75);
    }

    #[test]
    fn dirty_events_fire_on_transitions() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        let mut d = doc(10, 10);
        d.subscribe(move |e| sink.borrow_mut().push(*e));
        d.flip_horizontal();
        d.flip_vertical();
        d.mark_clean();
        let dirty: Vec<_> = events.borrow().iter().filter(|e| matches!(e, DocumentEvent::DirtyChanged(_))).copied().collect();
        assert_eq!(dirty, vec![DocumentEvent::DirtyChanged(true), DocumentEvent::DirtyChanged(false)]);
        assert!(events.borrow().contains(&DocumentEvent::ThumbnailChanged));
    }

    #[test]
    fn thumbnail_preserves_aspect() {
        let mut d = doc(400, 200);
        assert_eq!(d.thumbnail(100).dimensions(), (100, 50));
        assert_eq!(d.thumbnail(1000).dimensions(), (400, 200));
    }

    #[test]
    fn helpers_never_reach_the_flattened_image() {
        let mut d = doc(50, 50);
        let id = d.add_layer(rect((10.0, 10.0), (40.0, 40.0), Color::TRANSPARENT));
        d.set_active(id).unwrap();
        let mut with_helpers = Surface::new(50, 50);
        d.render(&mut with_helpers, Point::new(0.0, 0.0), true);
        assert_ne!(*with_helpers.image().get_pixel(10, 10), Rgba([0, 0, 0, 255]));
        assert_eq!(*d.flatten().get_pixel(10, 10), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn active_helpers_draw_above_upper_layers() {
        let mut d = doc(50, 50);
        let lower = d.add_layer(rect((10.0, 10.0), (40.0, 40.0), Color::TRANSPARENT));
        d.add_layer(rect((0.0, 0.0), (50.0, 50.0), Color::rgba(0, 0, 255, 255)));
        d.set_active(lower).unwrap();
        let mut with_helpers = Surface::new(50, 50);
        d.render(&mut with_helpers, Point::new(0.0, 0.0), true);
        assert_ne!(*with_helpers.image().get_pixel(10, 10), Rgba([0, 0, 255, 255]));
        assert_eq!(*d.flatten().get_pixel(10, 10), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn undo_of_a_vanished_move_is_skipped() {
        let mut d = doc(10, 10);
        d.add_layer(rect((0.0, 0.0), (5.0, 5.0), Color::WHITE));
        let b = d.add_layer(rect((0.0, 0.0), (5.0, 5.0), Color::WHITE));
        d.move_layer(b, 1).unwrap();
        let recorded = d.history().len();
        d.discard_layer(b);
        assert!(d.undo());
        assert_eq!(d.history().len(), recorded - 1);
        assert_eq!(d.layers().len(), 1);
        assert!(positions_match(&d));
    }
}
