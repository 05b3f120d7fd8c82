use std::collections::VecDeque;

use crate::canvas::RasterImage;
use crate::components::anchor::Affine;
use crate::components::layers::{Geometry, Layer, LayerId, PropertyValue};

// ============================================================================
// INVERSE ACTIONS
// ============================================================================

/// Value-capturing description of how to revert one edit. Replayed by
/// `Document::rollback`; layers are referenced by id, never by index.
#[derive(Debug, Clone)]
pub enum InverseAction {
    RestoreImage { image: RasterImage },
    /// Crop inverse: put the old image back and shift every layer by the
    /// crop origin.
    RestoreImageAndTranslate { image: RasterImage, dx: f32, dy: f32 },
    /// Inverse of a non right-angle rotation: restore the old image and map
    /// layer coordinates back.
    RestoreImageAndMap { image: RasterImage, map: Affine },
    Rotate { degrees: f32 },
    FlipHorizontal,
    FlipVertical,
    DeleteLayer { layer: LayerId },
    RestoreLayer { layer: Box<Layer>, index: usize },
    MoveLayer { layer: LayerId, offset: isize },
    TranslateLayerAnchors { layer: LayerId, dx: f32, dy: f32 },
    RestoreGeometry { layer: LayerId, geometry: Geometry },
    SetProperty { layer: LayerId, name: &'static str, value: PropertyValue },
    SetEnabled { layer: LayerId, enabled: bool },
    Rename { layer: LayerId, name: String },
}

// ============================================================================
// HISTORY
// ============================================================================

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub description: String,
    pub action: InverseAction,
}

/// Undo stack, newest first.
///
/// While a rollback is replaying snapshots the `rollbacking` guard is set and
/// [`push`](Self::push) refuses new entries, so inverse actions that reuse
/// regular document operations cannot re-record themselves.
#[derive(Debug, Clone)]
pub struct History {
    snapshots: VecDeque<Snapshot>,
    rollbacking: bool,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(50)
    }
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self { snapshots: VecDeque::new(), rollbacking: false, limit: limit.max(1) }
    }

    /// Record a snapshot. Returns `false` (and drops it) during rollback.
    pub fn push(&mut self, description: impl Into<String>, action: InverseAction) -> bool {
        if self.rollbacking {
            return false;
        }
        self.snapshots.push_front(Snapshot { description: description.into(), action });
        while self.snapshots.len() > self.limit {
            self.snapshots.pop_back();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        !self.snapshots.is_empty()
    }

    pub fn is_rollbacking(&self) -> bool {
        self.rollbacking
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn get(&self, index: usize) -> Option<&Snapshot> {
        self.snapshots.get(index)
    }

    /// All descriptions (most recent first).
    pub fn descriptions(&self) -> Vec<String> {
        self.snapshots.iter().map(|s| s.description.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub(crate) fn begin_rollback(&mut self) {
        self.rollbacking = true;
    }

    pub(crate) fn end_rollback(&mut self) {
        self.rollbacking = false;
    }

    pub(crate) fn pop_newest(&mut self) -> Option<Snapshot> {
        self.snapshots.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_first() {
        let mut h = History::new(10);
        h.push("Crop", InverseAction::FlipHorizontal);
        h.push("Rotate 90°", InverseAction::Rotate { degrees: -90.0 });
        assert_eq!(h.descriptions(), vec!["Rotate 90°".to_string(), "Crop".to_string()]);
        assert!(matches!(h.get(0).unwrap().action, InverseAction::Rotate { .. }));
    }

    #[test]
    fn guard_suppresses_recording() {
        let mut h = History::new(10);
        h.begin_rollback();
        assert!(!h.push("Flip", InverseAction::FlipVertical));
        assert!(h.is_empty());
        h.end_rollback();
        assert!(h.push("Flip", InverseAction::FlipVertical));
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn oldest_entries_fall_off() {
        let mut h = History::new(3);
        for i in 0..5 {
            h.push(format!("edit {i}"), InverseAction::FlipVertical);
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.descriptions()[0], "edit 4");
        assert_eq!(h.descriptions()[2], "edit 2");
    }
}
