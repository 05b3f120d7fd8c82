// ============================================================================
// imagine CLI: headless annotation of a single image
// ============================================================================
//
// Usage examples:
//   imagine -i shot.png -o out.png --rect 10,10,120,80 --arrow 200,40,130,60
//   imagine -i shot.png -o out.jpg --crop 0,0,800,600 --blur 40,40,300,90,6
//   imagine -i shot.png -o out.png --zoom 50,50,90,90,300,200,3 --text 20,20,Look
//
// Transforms run first (crop, resize, rotate, flips), then annotation layers
// are stacked in command-line order with later flags on top.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::error::ErrorKind;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};

use crate::canvas::Color;
use crate::components::anchor::Point;
use crate::components::layers::{Layer, LayerKind, LayerType};
use crate::config::EngineConfig;
use crate::error::{ImagineError, Result};
use crate::project::Project;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// imagine headless annotator.
#[derive(Parser, Debug)]
#[command(
    name = "imagine",
    about = "Annotate an image with shapes, highlights and callouts",
    long_about = "Load an image, apply optional crop/resize/rotate/flip, stack annotation\n\
                  layers in the order given and save the flattened result as PNG or JPEG.\n\n\
                  Example:\n  \
                  imagine -i shot.png -o out.png --rect 10,10,120,80 --blur 0,0,60,20"
)]
pub struct CliArgs {
    /// Source image.
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Output file; the format follows the extension (.png, .jpg, .jpeg).
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Engine config (TOML). Defaults to the per-user config location.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Crop to the rectangle between two corners.
    #[arg(long, value_name = "X1,Y1,X2,Y2", allow_hyphen_values = true)]
    pub crop: Option<String>,

    /// Resample to an exact size. Layers keep their coordinates.
    #[arg(long, value_name = "WxH")]
    pub resize: Option<String>,

    /// Rotate counter-clockwise, expanding the canvas.
    #[arg(long, value_name = "DEGREES", allow_hyphen_values = true)]
    pub rotate: Option<f32>,

    #[arg(long)]
    pub flip_h: bool,

    #[arg(long)]
    pub flip_v: bool,

    #[arg(long, value_name = "X1,Y1,X2,Y2", allow_hyphen_values = true)]
    pub rect: Vec<String>,

    #[arg(long, value_name = "X1,Y1,X2,Y2", allow_hyphen_values = true)]
    pub ellipse: Vec<String>,

    #[arg(long, value_name = "CX,CY,R", allow_hyphen_values = true)]
    pub circle: Vec<String>,

    #[arg(long, value_name = "X1,Y1,X2,Y2", allow_hyphen_values = true)]
    pub line: Vec<String>,

    /// Line with an arrowhead at the second point.
    #[arg(long, value_name = "X1,Y1,X2,Y2", allow_hyphen_values = true)]
    pub arrow: Vec<String>,

    /// Blur a region; the optional fifth value is the gaussian sigma.
    #[arg(long, value_name = "X1,Y1,X2,Y2[,SIGMA]", allow_hyphen_values = true)]
    pub blur: Vec<String>,

    /// Brighten (or darken) a region.
    #[arg(long, value_name = "X1,Y1,X2,Y2[,BRIGHTNESS]", allow_hyphen_values = true)]
    pub lighting: Vec<String>,

    /// Magnify a region and paint it centred on a target point.
    #[arg(long, value_name = "X1,Y1,X2,Y2,TX,TY[,FACTOR]", allow_hyphen_values = true)]
    pub zoom: Vec<String>,

    /// Text label; everything after the second comma is the text.
    #[arg(long, value_name = "X,Y,TEXT", allow_hyphen_values = true)]
    pub text: Vec<String>,

    /// Stroke colour for shapes and lines (#RRGGBB or #RRGGBBAA).
    #[arg(long, value_name = "HEX")]
    pub stroke: Option<String>,

    /// Fill colour for rectangles, ellipses and circles.
    #[arg(long, value_name = "HEX")]
    pub fill: Option<String>,

    /// Stroke width in pixels.
    #[arg(long, value_name = "PX")]
    pub width: Option<f32>,

    /// System font family for text labels.
    #[arg(long, value_name = "FAMILY")]
    pub font: Option<String>,

    /// Log at debug level.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Annotations
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    Rect { a: Point, b: Point },
    Ellipse { a: Point, b: Point },
    Circle { center: Point, radius: f32 },
    Line { a: Point, b: Point, arrow: bool },
    Blur { a: Point, b: Point, sigma: Option<f32> },
    Lighting { a: Point, b: Point, brightness: Option<f32> },
    Zoom { a: Point, b: Point, target: Point, factor: Option<f32> },
    Text { at: Point, text: String },
}

impl Annotation {
    /// Build the layer, with style defaults taken from `cfg`.
    pub fn to_layer(&self, cfg: &EngineConfig) -> Layer {
        match self {
            Annotation::Rect { a, b } => Layer::rect(LayerKind::defaults(LayerType::Rectangle, cfg), *a, *b),
            Annotation::Ellipse { a, b } => Layer::rect(LayerKind::defaults(LayerType::Ellipse, cfg), *a, *b),
            Annotation::Circle { center, radius } => Layer::rect(
                LayerKind::defaults(LayerType::Circle, cfg),
                *center,
                center.offset(*radius, 0.0),
            ),
            Annotation::Line { a, b, arrow } => {
                let mut kind = LayerKind::defaults(LayerType::Line, cfg);
                if let LayerKind::Line(style) = &mut kind {
                    style.arrow = *arrow;
                }
                let mut layer = Layer::rect(kind, *a, *b);
                if *arrow {
                    layer.name = "Arrow".to_string();
                }
                layer
            }
            Annotation::Blur { a, b, sigma } => {
                let mut kind = LayerKind::defaults(LayerType::Blur, cfg);
                if let (LayerKind::Blur(style), Some(sigma)) = (&mut kind, sigma) {
                    style.gaussian = sigma.clamp(0.0, 100.0);
                }
                Layer::rect(kind, *a, *b)
            }
            Annotation::Lighting { a, b, brightness } => {
                let mut kind = LayerKind::defaults(LayerType::Lighting, cfg);
                if let (LayerKind::Lighting(style), Some(v)) = (&mut kind, brightness) {
                    style.brightness = v.clamp(0.0, 5.0);
                }
                Layer::rect(kind, *a, *b)
            }
            Annotation::Zoom { a, b, target, factor } => {
                let mut kind = LayerKind::defaults(LayerType::Zoom, cfg);
                if let (LayerKind::Zoom(style), Some(f)) = (&mut kind, factor) {
                    style.factor = f.clamp(1.0, 10.0);
                }
                Layer::callout(kind, *a, *b, *target)
            }
            Annotation::Text { at, text } => {
                let mut kind = LayerKind::defaults(LayerType::Text, cfg);
                if let LayerKind::Text(style) = &mut kind {
                    style.text = text.clone();
                }
                Layer::point(kind, *at)
            }
        }
    }
}

fn numbers(flag: &str, value: &str, required: usize, optional: usize) -> Result<Vec<f32>> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() < required || parts.len() > required + optional {
        let expected = if optional == 0 {
            format!("{} numbers", required)
        } else {
            format!("{} to {} numbers", required, required + optional)
        };
        return Err(ImagineError::InvalidArgument(format!("--{} '{}': expected {}", flag, value, expected)));
    }
    parts
        .iter()
        .map(|p| {
            p.parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ImagineError::InvalidArgument(format!("--{} '{}': '{}' is not a number", flag, value, p)))
        })
        .collect()
}

pub fn parse_annotation(flag: &str, value: &str) -> Result<Annotation> {
    fn corners(n: &[f32]) -> (Point, Point) {
        (Point::new(n[0], n[1]), Point::new(n[2], n[3]))
    }
    Ok(match flag {
        "rect" => {
            let (a, b) = corners(&numbers(flag, value, 4, 0)?);
            Annotation::Rect { a, b }
        }
        "ellipse" => {
            let (a, b) = corners(&numbers(flag, value, 4, 0)?);
            Annotation::Ellipse { a, b }
        }
        "circle" => {
            let n = numbers(flag, value, 3, 0)?;
            Annotation::Circle { center: Point::new(n[0], n[1]), radius: n[2].abs() }
        }
        "line" | "arrow" => {
            let (a, b) = corners(&numbers(flag, value, 4, 0)?);
            Annotation::Line { a, b, arrow: flag == "arrow" }
        }
        "blur" => {
            let n = numbers(flag, value, 4, 1)?;
            let (a, b) = corners(&n);
            Annotation::Blur { a, b, sigma: n.get(4).copied() }
        }
        "lighting" => {
            let n = numbers(flag, value, 4, 1)?;
            let (a, b) = corners(&n);
            Annotation::Lighting { a, b, brightness: n.get(4).copied() }
        }
        "zoom" => {
            let n = numbers(flag, value, 6, 1)?;
            let (a, b) = corners(&n);
            Annotation::Zoom { a, b, target: Point::new(n[4], n[5]), factor: n.get(6).copied() }
        }
        "text" => {
            let mut parts = value.splitn(3, ',');
            let (Some(x), Some(y), Some(text)) = (parts.next(), parts.next(), parts.next()) else {
                return Err(ImagineError::InvalidArgument(format!("--text '{}': expected X,Y,TEXT", value)));
            };
            let n = numbers(flag, &format!("{},{}", x, y), 2, 0)?;
            Annotation::Text { at: Point::new(n[0], n[1]), text: text.to_string() }
        }
        other => return Err(ImagineError::InvalidArgument(format!("unknown annotation '--{}'", other))),
    })
}

/// Annotation flags, by clap argument id.
const ANNOTATION_FLAGS: &[&str] = &["rect", "ellipse", "circle", "line", "arrow", "blur", "lighting", "zoom", "text"];

/// Annotations across every flag, ordered by their position on the command line.
fn collect_annotations(matches: &ArgMatches) -> Result<Vec<Annotation>> {
    let mut found = Vec::new();
    for &flag in ANNOTATION_FLAGS {
        if let (Some(indices), Some(values)) = (matches.indices_of(flag), matches.get_many::<String>(flag)) {
            for (index, value) in indices.zip(values) {
                found.push((index, parse_annotation(flag, value)?));
            }
        }
    }
    found.sort_by_key(|(index, _)| *index);
    Ok(found.into_iter().map(|(_, a)| a).collect())
}

fn parse_crop(value: &str) -> Result<[f32; 4]> {
    let n = numbers("crop", value, 4, 0)?;
    Ok([n[0], n[1], n[2], n[3]])
}

fn parse_size(value: &str) -> Result<(u32, u32)> {
    let invalid = || ImagineError::InvalidArgument(format!("--resize '{}': expected WxH", value));
    let (w, h) = value.to_lowercase().split_once('x').map(|(w, h)| (w.trim().to_string(), h.trim().to_string())).ok_or_else(invalid)?;
    let w: u32 = w.parse().map_err(|_| invalid())?;
    let h: u32 = h.parse().map_err(|_| invalid())?;
    if w == 0 || h == 0 {
        return Err(invalid());
    }
    Ok((w, h))
}

fn parse_color(flag: &str, value: &str) -> Result<Color> {
    Color::parse_hex(value)
        .ok_or_else(|| ImagineError::InvalidArgument(format!("--{} '{}': expected #RRGGBB or #RRGGBBAA", flag, value)))
}

/// Parsed arguments plus annotations in command-line order.
#[derive(Debug)]
pub struct Invocation {
    pub args: CliArgs,
    pub annotations: Vec<Annotation>,
}

impl Invocation {
    pub fn parse() -> std::result::Result<Self, clap::Error> {
        Self::parse_from(std::env::args_os())
    }

    pub fn parse_from<I, T>(args: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = CliArgs::command().try_get_matches_from(args)?;
        let args = CliArgs::from_arg_matches(&matches)?;
        let annotations = collect_annotations(&matches)
            .map_err(|e| CliArgs::command().error(ErrorKind::ValueValidation, e.to_string()))?;
        Ok(Self { args, annotations })
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the invocation and return an OS exit code.
/// `0` = output written, `1` = any failure (message on stderr).
pub fn run(invocation: Invocation) -> ExitCode {
    let start = Instant::now();
    match run_one(&invocation) {
        Ok(()) => {
            log::info!("done in {:.0?}", start.elapsed());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_one(invocation: &Invocation) -> Result<()> {
    let args = &invocation.args;
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_or_default(None),
    };
    if let Some(hex) = &args.stroke {
        config.default_stroke = parse_color("stroke", hex)?;
    }
    if let Some(hex) = &args.fill {
        config.default_fill = parse_color("fill", hex)?;
    }
    if let Some(width) = args.width {
        if !(width.is_finite() && width >= 0.0) {
            return Err(ImagineError::InvalidArgument(format!("--width {}: must be a non-negative number", width)));
        }
        config.default_width = width;
    }
    if let Some(family) = &args.font {
        config.default_font = family.clone();
    }
    // parse everything before touching the input
    let crop = args.crop.as_deref().map(parse_crop).transpose()?;
    let size = args.resize.as_deref().map(parse_size).transpose()?;

    let mut project = Project::open(args.input.clone(), config.clone())?;
    let doc = &mut project.document;

    if let Some([x1, y1, x2, y2]) = crop
        && !doc.crop(x1, y1, x2, y2)
    {
        log::warn!("crop rectangle lies outside the image; skipped");
    }
    if let Some((w, h)) = size {
        doc.resize(w, h);
    }
    if let Some(degrees) = args.rotate {
        doc.rotate(degrees);
    }
    if args.flip_h {
        doc.flip_horizontal();
    }
    if args.flip_v {
        doc.flip_vertical();
    }

    let has_text = invocation.annotations.iter().any(|a| matches!(a, Annotation::Text { .. }));
    if has_text && doc.fonts().text_font(&config.default_font, true).is_none() {
        log::warn!("no usable font for {:?}; text annotations will be blank", config.default_font);
    }
    for annotation in &invocation.annotations {
        doc.add_layer(annotation.to_layer(&config));
    }

    project.save_as(args.output.clone())
}
