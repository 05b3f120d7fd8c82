// ============================================================================
// COMPONENTS: document building blocks
// ============================================================================
//
//   anchor.rs   points, rects, affine maps, anchors and link groups
//   layers.rs   layer kinds, geometry, properties, drawing, hit-testing
//   tools.rs    pointer-driven placement/edit state machine, shortcuts
//   history.rs  undo snapshots and inverse actions
// ============================================================================

pub mod anchor;
pub mod history;
pub mod layers;
pub mod tools;
