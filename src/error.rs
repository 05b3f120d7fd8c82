use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImagineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Save target extension is neither PNG nor JPEG.
    #[error("unsupported output format '{0}' (expected .png, .jpg or .jpeg)")]
    UnsupportedFormat(String),

    #[error("invalid config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{kind} layers have no property '{name}'")]
    UnknownProperty { kind: &'static str, name: String },

    #[error("property '{name}' expects a {expected} value")]
    PropertyType { name: String, expected: &'static str },

    #[error("font error: {0}")]
    Font(String),

    #[error("no layer with that id in the document")]
    UnknownLayer,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, ImagineError>;
