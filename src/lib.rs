//! Layered image annotation engine.
//!
//! A [`Document`] owns one raster image and a stack of annotation layers.
//! Rendering composites the stack bottom to top, with filter layers
//! (blur, lighting, zoom, clone) sampling the composite of everything below
//! them. Crop, rotate and flip replace the image and remap every layer.

pub mod canvas;
pub mod cli;
pub mod components;
pub mod config;
pub mod document;
pub mod error;
pub mod io;
pub mod logger;
pub mod ops;
pub mod project;

pub use canvas::{Color, RasterImage, Surface};
pub use components::anchor::{Point, Rect};
pub use components::layers::{Layer, LayerId, LayerKind, LayerType, PropertyValue};
pub use components::tools::{InputModifiers, PointerButton, PointerEvent, Tool, ToolState};
pub use config::EngineConfig;
pub use document::{Document, DocumentEvent};
pub use error::{ImagineError, Result};
pub use project::Project;
