// ============================================================================
// OPS: pixel kernels used by the layer renderers and image transforms
// ============================================================================
//
//   shapes.rs       anti-aliased strokes, fills, dashes and shadows
//   filters.rs      box / gaussian blur and 3x3 smoothing
//   adjustments.rs  brightness / contrast / sharpness / colour enhancement
//   transform.rs    crop, resample, rotate and flip
//   text.rs         font loading, glyph layout and rasterization
// ============================================================================

pub mod adjustments;
pub mod filters;
pub mod shapes;
pub mod text;
pub mod transform;
