// ============================================================================
// FILE I/O: raster loading and flattened PNG / JPEG output
// ============================================================================

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, RgbaImage};

use crate::error::{ImagineError, Result};

/// Output formats for flattened documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveFormat {
    Png,
    Jpeg,
}

impl SaveFormat {
    /// Pick the format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "png" => Ok(SaveFormat::Png),
            "jpg" | "jpeg" => Ok(SaveFormat::Jpeg),
            _ => Err(ImagineError::UnsupportedFormat(ext)),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SaveFormat::Png => "PNG",
            SaveFormat::Jpeg => "JPEG",
        }
    }
}

/// Decode any raster the `image` crate understands into RGBA8.
pub fn load_image(path: &Path) -> Result<RgbaImage> {
    let img = image::open(path)?.to_rgba8();
    log::info!("loaded {} ({}x{})", path.display(), img.width(), img.height());
    Ok(img)
}

/// Save a flattened image; the format follows the extension of `path`.
/// Nothing is written for unsupported extensions.
pub fn save_image(image: &RgbaImage, path: &Path, jpeg_quality: u8) -> Result<()> {
    let format = SaveFormat::from_path(path)?;
    encode_and_write(image, path, format, jpeg_quality)?;
    log::info!("saved {} as {}", path.display(), format.label());
    Ok(())
}

pub fn encode_and_write(image: &RgbaImage, path: &Path, format: SaveFormat, quality: u8) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    match format {
        SaveFormat::Png => {
            let encoder = PngEncoder::new(&mut writer);
            #[allow(deprecated)]
            encoder.encode(image.as_raw(), image.width(), image.height(), image::ColorType::Rgba8)?;
        }
        SaveFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
            encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), image::ColorType::Rgb8)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::path::PathBuf;

    fn temp(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("imagine-io-{}-{}", std::process::id(), name))
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(SaveFormat::from_path(Path::new("a.PNG")).unwrap(), SaveFormat::Png);
        assert_eq!(SaveFormat::from_path(Path::new("a.jpeg")).unwrap(), SaveFormat::Jpeg);
        assert_eq!(SaveFormat::from_path(Path::new("a.jpg")).unwrap(), SaveFormat::Jpeg);
        assert!(matches!(
            SaveFormat::from_path(Path::new("a.gif")),
            Err(ImagineError::UnsupportedFormat(ext)) if ext == "gif"
        ));
        assert!(SaveFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn png_keeps_pixels_exactly() {
        let path = temp("exact.png");
        let img = RgbaImage::from_fn(7, 5, |x, y| Rgba([x as u8 * 30, y as u8 * 40, 9, 128]));
        save_image(&img, &path, 90).unwrap();
        assert_eq!(load_image(&path).unwrap(), img);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn jpeg_drops_alpha() {
        let path = temp("flat.jpg");
        let img = RgbaImage::from_pixel(16, 16, Rgba([200, 10, 10, 100]));
        save_image(&img, &path, 90).unwrap();
        let back = load_image(&path).unwrap();
        assert_eq!(back.dimensions(), (16, 16));
        assert_eq!(back.get_pixel(8, 8)[3], 255);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unsupported_target_writes_nothing() {
        let path = temp("nope.bmp");
        let img = RgbaImage::new(2, 2);
        assert!(save_image(&img, &path, 90).is_err());
        assert!(!path.exists());
    }
}
