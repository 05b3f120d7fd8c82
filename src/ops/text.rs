//! Glyph layout and rasterization for text and emoji layers.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ab_glyph::{point, Font, FontArc, FontVec, GlyphId, ScaleFont};

use crate::canvas::{Color, Surface};
use crate::components::anchor::Point;
use crate::error::{ImagineError, Result};

/// Outline emoji families, tried in order. Bitmap-only color fonts have no
/// outlines for the rasterizer, so they are not listed.
const EMOJI_FAMILIES: &[&str] = &["Noto Emoji", "Segoe UI Emoji", "Symbola", "DejaVu Sans"];

/// Text alignment options.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TextAlignment {
    #[default]
    Left,
    Center,
}

/// Fonts available to the renderer.
///
/// `text` and `emoji` are file overrides from the config. Without them each
/// layer's family is looked up among the system fonts, and every lookup
/// (hit or miss) is remembered for the lifetime of the value.
#[derive(Clone, Default)]
pub struct Fonts {
    pub text: Option<FontArc>,
    pub emoji: Option<FontArc>,
    system: Arc<Mutex<HashMap<(String, bool), Option<FontArc>>>>,
}

impl std::fmt::Debug for Fonts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fonts")
            .field("text", &self.text.is_some())
            .field("emoji", &self.emoji.is_some())
            .finish()
    }
}

impl Fonts {
    pub fn load(text: Option<&Path>, emoji: Option<&Path>) -> Result<Self> {
        Ok(Self {
            text: text.map(load_font).transpose()?,
            emoji: emoji.map(load_font).transpose()?,
            ..Self::default()
        })
    }

    /// Font for a text layer: the override, else `family` from the system,
    /// else the system sans-serif.
    pub fn text_font(&self, family: &str, bold: bool) -> Option<FontArc> {
        if let Some(font) = &self.text {
            return Some(font.clone());
        }
        self.system_font(family, bold).or_else(|| self.system_font("", bold))
    }

    /// Font for emoji layers, falling back to the text font.
    pub fn emoji_font(&self) -> Option<FontArc> {
        if let Some(font) = self.emoji.as_ref().or(self.text.as_ref()) {
            return Some(font.clone());
        }
        EMOJI_FAMILIES
            .iter()
            .find_map(|family| self.system_font(family, false))
            .or_else(|| self.system_font("", false))
    }

    /// Cached system lookup. An empty family means the generic sans-serif.
    fn system_font(&self, family: &str, bold: bool) -> Option<FontArc> {
        let key = (family.to_string(), bold);
        let mut cache = match self.system.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache
            .entry(key)
            .or_insert_with(|| {
                let font = load_system_font(family, bold);
                if font.is_none() {
                    log::debug!("no system font for family {:?}", family);
                }
                font
            })
            .clone()
    }
}

pub fn load_font(path: &Path) -> Result<FontArc> {
    let data = std::fs::read(path)?;
    FontArc::try_from_vec(data)
        .map_err(|e| ImagineError::Font(format!("{}: {}", path.display(), e)))
}

/// Load a font by family name from the system. Collections load the face
/// the match points at.
pub fn load_system_font(family: &str, bold: bool) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::handle::Handle;
    use font_kit::properties::{Properties, Weight};
    use font_kit::source::SystemSource;

    let mut props = Properties::new();
    props.weight = if bold { Weight::BOLD } else { Weight::NORMAL };
    let name = if family.is_empty() { FamilyName::SansSerif } else { FamilyName::Title(family.to_string()) };

    let handle = SystemSource::new().select_best_match(&[name], &props).ok()?;
    let (data, index) = match handle {
        Handle::Path { path, font_index } => (std::fs::read(path).ok()?, font_index),
        Handle::Memory { bytes, font_index } => ((*bytes).clone(), font_index),
    };
    FontVec::try_from_vec_and_index(data, index).ok().map(FontArc::new)
}

/// Positioned glyphs for a block of text, relative to its top-left corner.
#[derive(Debug, Clone, Default)]
pub struct TextLayout {
    pub glyphs: Vec<(GlyphId, f32, f32)>,
    pub width: f32,
    pub height: f32,
}

/// Lay out multi-line text (`\n` separated). Glyph y positions are baselines.
pub fn layout_text(font: &FontArc, text: &str, font_size: f32, alignment: TextAlignment) -> TextLayout {
    let scaled = font.as_scaled(font_size);
    let ascent = scaled.ascent();
    let line_height = scaled.height() + scaled.line_gap();

    let mut lines: Vec<(Vec<(GlyphId, f32, f32)>, f32)> = Vec::new();
    for (line_idx, line) in text.split('\n').enumerate() {
        let baseline = line_idx as f32 * line_height + ascent;
        let mut glyphs = Vec::new();
        let mut cursor_x = 0.0f32;
        let mut last_glyph: Option<GlyphId> = None;
        for ch in line.chars() {
            let glyph_id = font.glyph_id(ch);
            if let Some(prev) = last_glyph {
                cursor_x += scaled.kern(prev, glyph_id);
            }
            glyphs.push((glyph_id, cursor_x, baseline));
            cursor_x += scaled.h_advance(glyph_id);
            last_glyph = Some(glyph_id);
        }
        lines.push((glyphs, cursor_x));
    }

    let width = lines.iter().map(|(_, w)| *w).fold(0.0f32, f32::max);
    let height = lines.len() as f32 * line_height;
    let mut out = Vec::new();
    for (glyphs, line_w) in lines {
        let offset = match alignment {
            TextAlignment::Left => 0.0,
            TextAlignment::Center => (width - line_w) * 0.5,
        };
        out.extend(glyphs.into_iter().map(|(id, x, y)| (id, x + offset, y)));
    }
    TextLayout { glyphs: out, width, height }
}

/// Draw a laid-out block with its top-left at `origin`.
pub fn draw_layout(surface: &mut Surface, font: &FontArc, layout: &TextLayout, font_size: f32, origin: Point, color: Color) {
    if color.a == 0 || layout.glyphs.is_empty() {
        return;
    }
    let x0 = (origin.x - 2.0).floor() as i64;
    let y0 = (origin.y - 2.0).floor() as i64;
    let buf_w = (layout.width + 4.0 + font_size).ceil() as usize;
    let buf_h = (layout.height + 4.0 + font_size * 0.5).ceil() as usize;
    let mut coverage = vec![0.0f32; buf_w * buf_h];

    for &(id, gx, gy) in &layout.glyphs {
        let glyph = id.with_scale_and_position(font_size, point(origin.x + gx, origin.y + gy));
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let b = outlined.px_bounds();
        outlined.draw(|px, py, cov| {
            let cx = b.min.x as i64 + px as i64 - x0;
            let cy = b.min.y as i64 + py as i64 - y0;
            if cx < 0 || cy < 0 || cx as usize >= buf_w || cy as usize >= buf_h {
                return;
            }
            let idx = cy as usize * buf_w + cx as usize;
            coverage[idx] = coverage[idx].max(cov);
        });
    }
    surface.blend_mask(&coverage, buf_w as u32, x0, y0, color);
}
