use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::canvas::{Color, RasterImage};
use crate::config::EngineConfig;
use crate::document::Document;
use crate::error::{ImagineError, Result};
use crate::io;
use crate::ops::text::Fonts;

/// Single open document plus where it lives on disk.
#[derive(Debug)]
pub struct Project {
    pub id: Uuid,
    pub document: Document,
    /// `None` for untitled documents.
    pub path: Option<PathBuf>,
    /// Display name (derived from path or "Untitled-X")
    pub name: String,
}

impl Project {
    pub fn new_untitled(untitled_counter: usize, width: u32, height: u32, config: EngineConfig) -> Self {
        let image = RasterImage::new(width.max(1), height.max(1), Color::WHITE);
        Self {
            id: Uuid::new_v4(),
            document: document_with_fonts(image, config),
            path: None,
            name: format!("Untitled-{}", untitled_counter),
        }
    }

    pub fn open(path: PathBuf, config: EngineConfig) -> Result<Self> {
        let pixels = io::load_image(&path)?;
        let document = document_with_fonts(RasterImage::from_rgba(pixels), config);
        Ok(Self { id: Uuid::new_v4(), document, name: name_from_path(&path), path: Some(path) })
    }

    pub fn is_dirty(&self) -> bool {
        self.document.dirty()
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty() {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }

    /// Save to the current path.
    pub fn save(&mut self) -> Result<()> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| ImagineError::InvalidArgument("document has no file path yet".into()))?;
        self.save_as(path)
    }

    /// Flatten without helpers and write to `path`, which becomes the
    /// project's path on success.
    pub fn save_as(&mut self, path: PathBuf) -> Result<()> {
        let flat = self.document.flatten();
        let quality = self.document.config().jpeg_quality;
        io::save_image(&flat, &path, quality)?;
        self.name = name_from_path(&path);
        self.path = Some(path);
        self.document.mark_clean();
        Ok(())
    }
}

fn name_from_path(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

fn document_with_fonts(image: RasterImage, config: EngineConfig) -> Document {
    let fonts = match Fonts::load(config.font_path.as_deref(), config.emoji_font_path.as_deref()) {
        Ok(fonts) => fonts,
        Err(e) => {
            log::warn!("{}; using system fonts", e);
            Fonts::default()
        }
    };
    let mut document = Document::with_config(image, config);
    document.set_fonts(fonts);
    document
}
