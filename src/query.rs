//! Spatial query adapter: pointer interactions to activity ids.
//!
//! Stateless translation layer over the track registry. Hover and click
//! resolve through draw-order hit-testing and take the front-most match;
//! drag-box selection resolves whole tracks through the rotated-frame extent
//! query. What the resolved ids do to the selection set is the view
//! controller's business; this module only answers "which activity".

use crate::tracks::TrackRegistry;
use crate::{ActivityId, Extent, MapPoint};

/// Drag-box selection policy.
///
/// The default is `Replace`: each completed box replaces the selection,
/// matching a one-box-per-gesture interaction. `Additive` keeps prior
/// members and only adds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragSelectMode {
    #[default]
    Replace,
    Additive,
}

/// Configuration for interaction handling.
#[derive(Debug, Clone, Default)]
pub struct QueryConfig {
    pub drag_mode: DragSelectMode,
}

/// Translates map interactions into activity identifiers.
#[derive(Debug, Clone, Default)]
pub struct SpatialQuery {
    pub config: QueryConfig,
}

impl SpatialQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: QueryConfig) -> Self {
        Self { config }
    }

    /// All activities under the pointer, front-most last. Read-only with
    /// respect to any selection state.
    pub fn hits_at(&self, registry: &mut TrackRegistry, point: MapPoint) -> Vec<ActivityId> {
        registry.features_at(point)
    }

    /// Front-most activity under the pointer, for the transient mouse-info
    /// display.
    pub fn hover(&self, registry: &mut TrackRegistry, point: MapPoint) -> Option<ActivityId> {
        self.hits_at(registry, point).pop()
    }

    /// Front-most activity under a click. When tracks overlap, the one
    /// added later wins.
    pub fn click(&self, registry: &mut TrackRegistry, point: MapPoint) -> Option<ActivityId> {
        self.hits_at(registry, point).pop()
    }

    /// Whole-track candidates for a completed drag-box, in draw order.
    pub fn drag_candidates(
        &self,
        registry: &mut TrackRegistry,
        extent: Extent,
        view_rotation: f64,
    ) -> Vec<ActivityId> {
        registry.all_in_extent(extent, view_rotation)
    }
}
