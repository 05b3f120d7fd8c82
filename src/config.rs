//! Engine configuration, read from `config.toml`.
//!
//! Every field has a default so a partial (or missing) file is fine.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::canvas::Color;
use crate::error::{ImagineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Anchor hit/draw radius in on-screen pixels.
    pub anchor_radius: f32,
    /// Maximum number of undo snapshots kept; oldest are dropped first.
    pub history_limit: usize,
    pub default_width: f32,
    pub default_stroke: Color,
    pub default_fill: Color,
    pub default_font_size: f32,
    /// System font family for new text layers.
    pub default_font: String,
    /// Overrides system lookup for every text layer when set.
    pub font_path: Option<PathBuf>,
    pub emoji_font_path: Option<PathBuf>,
    pub jpeg_quality: u8,
    pub thumbnail_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            anchor_radius: 8.0,
            history_limit: 50,
            default_width: 5.0,
            default_stroke: Color::WHITE,
            default_fill: Color::TRANSPARENT,
            default_font_size: 30.0,
            default_font: "Noto Sans".to_string(),
            font_path: None,
            emoji_font_path: None,
            jpeg_quality: 90,
            thumbnail_size: 128,
        }
    }
}

impl EngineConfig {
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|source| ImagineError::Config {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text, path)
    }

    /// Load `path` (or the default location), falling back to defaults when
    /// the file is absent or unreadable.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_path() {
                Some(p) => p,
                None => return Self::default(),
            },
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            Err(e) => {
                log::warn!("{}; using defaults", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| ImagineError::InvalidArgument(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, text)?;
        Ok(())
    }
}

/// `$XDG_CONFIG_HOME/imagine/config.toml`, or `~/.config/imagine/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return Some(PathBuf::from(appdata).join("imagine").join("config.toml"));
        }
    }
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok()?;
    Some(base.join("imagine").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg = EngineConfig::from_toml(
            "history_limit = 5\ndefault_stroke = { r = 255, g = 0, b = 0, a = 255 }\n",
            Path::new("inline.toml"),
        )
        .unwrap();
        assert_eq!(cfg.history_limit, 5);
        assert_eq!(cfg.default_stroke, Color::rgba(255, 0, 0, 255));
        assert_eq!(cfg.anchor_radius, 8.0);
        assert_eq!(cfg.jpeg_quality, 90);
        assert_eq!(cfg.default_font, "Noto Sans");
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let err = EngineConfig::from_toml("history_limit = \"lots\"", Path::new("x.toml")).unwrap_err();
        assert!(matches!(err, ImagineError::Config { .. }));
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!("imagine-cfg-{}.toml", std::process::id()));
        let cfg = EngineConfig { thumbnail_size: 64, ..EngineConfig::default() };
        cfg.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), cfg);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_file_falls_back() {
        let cfg = EngineConfig::load_or_default(Some(Path::new("/nonexistent/imagine.toml")));
        assert_eq!(cfg, EngineConfig::default());
    }
}
