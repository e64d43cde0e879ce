//! Track registry and loader.
//!
//! A [`Track`] wraps one activity's parsed geometry. Tracks are registered in
//! `Loading` state when the host discovers the activity's track file and
//! transition to `Ready` exactly once, when the host's parser delivers the
//! geometry (the parse itself is asynchronous and owned by the host's map
//! library). `Ready` is terminal; a track whose parse fails is reported and
//! stays `Loading` forever, invisible to every spatial query.
//!
//! Hit-testing resolves in draw order (attach order), front-most last, so a
//! click on overlapping tracks picks the one added later. Drag-box queries
//! account for a rotated view by rotating candidate geometry into the box's
//! unrotated frame before the axis-aligned intersection test.

use std::collections::{HashMap, HashSet};

use geo::{Coord, EuclideanDistance, Intersects, LineString, Point, Rotate};
use log::{debug, warn};
use rstar::{RTree, RTreeObject, AABB};

use crate::error::ActivityMapError;
use crate::{ActivityId, ActivityType, Extent, MapPoint, Result};

/// Configuration for spatial queries.
#[derive(Debug, Clone)]
pub struct TrackConfig {
    /// Hit-test tolerance in map units: a pointer position within this
    /// distance of a track's geometry counts as touching it. The host
    /// converts its pixel tolerance to map units at the current resolution.
    pub hit_tolerance: f64,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self { hit_tolerance: 10.0 }
    }
}

/// Load lifecycle of a track. `Ready` is terminal.
#[derive(Debug, Clone)]
pub enum TrackState {
    Loading,
    Ready { line: LineString<f64>, extent: Extent },
}

/// One activity's track: geometry plus the back-reference tags every spatial
/// query resolves through.
#[derive(Debug, Clone)]
pub struct Track {
    pub activity_id: ActivityId,
    /// Propagated from the record at attach time; never re-derived from
    /// display names.
    pub activity_type: ActivityType,
    pub visible: bool,
    pub state: TrackState,
}

impl Track {
    pub fn is_ready(&self) -> bool {
        matches!(self.state, TrackState::Ready { .. })
    }
}

/// Answer to a bounds query for a possibly still-loading track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundsQuery {
    Ready(Extent),
    /// Attached but not yet loaded; ask again after the track completes
    Pending,
    /// No track attached under this id
    Unknown,
}

/// Extent wrapper for R-tree spatial indexing of ready tracks.
#[derive(Debug, Clone)]
struct TrackEnvelope {
    activity_id: ActivityId,
    extent: Extent,
}

impl RTreeObject for TrackEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.extent.min_x, self.extent.min_y],
            [self.extent.max_x, self.extent.max_y],
        )
    }
}

/// Registry of all tracks, keyed by activity id, with draw order and a
/// coarse spatial index over ready-track extents.
#[derive(Debug, Default)]
pub struct TrackRegistry {
    tracks: HashMap<ActivityId, Track>,
    /// Attach order; later entries draw in front
    draw_order: Vec<ActivityId>,
    spatial_index: RTree<TrackEnvelope>,
    spatial_dirty: bool,
    config: TrackConfig,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::with_config(TrackConfig::default())
    }

    pub fn with_config(config: TrackConfig) -> Self {
        Self {
            tracks: HashMap::new(),
            draw_order: Vec::new(),
            spatial_index: RTree::new(),
            spatial_dirty: false,
            config,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Register a track in `Loading` state. Draw order is attach order.
    ///
    /// Re-attaching an existing id is a logged no-op.
    pub fn attach(&mut self, activity_id: &str, activity_type: ActivityType) {
        if self.tracks.contains_key(activity_id) {
            warn!("track '{}' already attached", activity_id);
            return;
        }

        self.tracks.insert(
            activity_id.to_string(),
            Track {
                activity_id: activity_id.to_string(),
                activity_type,
                visible: true,
                state: TrackState::Loading,
            },
        );
        self.draw_order.push(activity_id.to_string());
    }

    /// Complete a load: `Loading -> Ready`, tagging the geometry with the
    /// activity id and refreshing the spatial index.
    ///
    /// Fails for an unknown id, for geometry with fewer than two valid
    /// points (the track stays `Loading`), and for a track that is already
    /// `Ready` (the transition is terminal).
    pub fn complete(&mut self, activity_id: &str, points: &[MapPoint]) -> Result<Extent> {
        let track = self
            .tracks
            .get_mut(activity_id)
            .ok_or_else(|| ActivityMapError::UnknownActivityId {
                activity_id: activity_id.to_string(),
            })?;

        if track.is_ready() {
            return Err(ActivityMapError::TrackParseFailure {
                activity_id: activity_id.to_string(),
                message: "track already loaded".to_string(),
            });
        }

        let coords: Vec<Coord<f64>> = points
            .iter()
            .filter(|p| p.is_valid())
            .map(|p| Coord { x: p.x, y: p.y })
            .collect();

        if coords.len() < 2 {
            return Err(ActivityMapError::TrackParseFailure {
                activity_id: activity_id.to_string(),
                message: format!("{} valid points, 2 required", coords.len()),
            });
        }

        let extent = Extent::from_points(points).ok_or_else(|| {
            ActivityMapError::TrackParseFailure {
                activity_id: activity_id.to_string(),
                message: "no finite extent".to_string(),
            }
        })?;

        track.state = TrackState::Ready {
            line: LineString::new(coords),
            extent,
        };
        self.spatial_dirty = true;
        debug!("track '{}' ready", activity_id);
        Ok(extent)
    }

    /// Record a failed parse. The track stays `Loading` indefinitely and is
    /// never retried; this is a permanent soft failure.
    pub fn fail(&mut self, activity_id: &str, message: &str) {
        warn!(
            "{}",
            ActivityMapError::TrackParseFailure {
                activity_id: activity_id.to_string(),
                message: message.to_string(),
            }
        );
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn get(&self, activity_id: &str) -> Option<&Track> {
        self.tracks.get(activity_id)
    }

    pub fn contains(&self, activity_id: &str) -> bool {
        self.tracks.contains_key(activity_id)
    }

    /// All attached ids in draw order, back-most first.
    pub fn draw_order(&self) -> &[ActivityId] {
        &self.draw_order
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn ready_count(&self) -> usize {
        self.tracks.values().filter(|t| t.is_ready()).count()
    }

    /// Bounding extent once ready; `Pending` while still loading.
    pub fn bounds_of(&self, activity_id: &str) -> BoundsQuery {
        match self.tracks.get(activity_id) {
            Some(track) => match track.state {
                TrackState::Ready { extent, .. } => BoundsQuery::Ready(extent),
                TrackState::Loading => BoundsQuery::Pending,
            },
            None => BoundsQuery::Unknown,
        }
    }

    /// Show or hide a track. Returns the previous visibility, or `None` for
    /// an unknown id. Hidden tracks are never hit-tested.
    pub fn set_visible(&mut self, activity_id: &str, visible: bool) -> Option<bool> {
        let track = self.tracks.get_mut(activity_id)?;
        let was = track.visible;
        track.visible = visible;
        Some(was)
    }

    // ========================================================================
    // Spatial Queries
    // ========================================================================

    fn ensure_spatial_index(&mut self) {
        if !self.spatial_dirty {
            return;
        }

        let envelopes: Vec<TrackEnvelope> = self
            .tracks
            .values()
            .filter_map(|t| match t.state {
                TrackState::Ready { extent, .. } => Some(TrackEnvelope {
                    activity_id: t.activity_id.clone(),
                    extent,
                }),
                TrackState::Loading => None,
            })
            .collect();

        self.spatial_index = RTree::bulk_load(envelopes);
        self.spatial_dirty = false;
    }

    /// Hit-test all ready, visible tracks at a map-coordinate position.
    ///
    /// Returns activity ids in draw order, front-most last; this governs
    /// which activity a click resolves to when tracks overlap. Loading
    /// tracks simply find nothing.
    pub fn features_at(&mut self, point: MapPoint) -> Vec<ActivityId> {
        if !point.is_valid() {
            return Vec::new();
        }
        self.ensure_spatial_index();

        let tol = self.config.hit_tolerance;
        let search = AABB::from_corners([point.x - tol, point.y - tol], [point.x + tol, point.y + tol]);
        let candidates: HashSet<&str> = self
            .spatial_index
            .locate_in_envelope_intersecting(&search)
            .map(|e| e.activity_id.as_str())
            .collect();

        let p = Point::new(point.x, point.y);
        let mut hits = Vec::new();
        for id in &self.draw_order {
            if !candidates.contains(id.as_str()) {
                continue;
            }
            let track = &self.tracks[id];
            if !track.visible {
                continue;
            }
            if let TrackState::Ready { line, .. } = &track.state {
                if p.euclidean_distance(line) <= tol {
                    hits.push(id.clone());
                }
            }
        }
        hits
    }

    /// All tracks with any geometry intersecting a drag-box, in draw order.
    ///
    /// `view_rotation` is the view's rotation in radians (counter-clockwise).
    /// The box is axis-aligned in the rotated view frame, so candidate
    /// geometry is rotated by the same angle about the box center into that
    /// frame before the intersection test. Inclusion is per whole track:
    /// once any part hits, the track is in.
    pub fn all_in_extent(&mut self, extent: Extent, view_rotation: f64) -> Vec<ActivityId> {
        let rect = geo::Rect::new(
            Coord {
                x: extent.min_x,
                y: extent.min_y,
            },
            Coord {
                x: extent.max_x,
                y: extent.max_y,
            },
        );
        let box_poly = rect.to_polygon();
        let center = extent.center();
        let anchor = Point::new(center.x, center.y);
        let degrees = view_rotation.to_degrees();

        let mut hits = Vec::new();
        for id in &self.draw_order {
            let track = &self.tracks[id];
            if !track.visible {
                continue;
            }
            if let TrackState::Ready { line, .. } = &track.state {
                let hit = if view_rotation == 0.0 {
                    box_poly.intersects(line)
                } else {
                    let rotated = line.rotate_around_point(degrees, anchor);
                    box_poly.intersects(&rotated)
                };
                if hit {
                    hits.push(id.clone());
                }
            }
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_track(registry: &mut TrackRegistry, id: &str, points: &[(f64, f64)]) {
        registry.attach(id, ActivityType::Running);
        let pts: Vec<MapPoint> = points.iter().map(|&(x, y)| MapPoint::new(x, y)).collect();
        registry.complete(id, &pts).unwrap();
    }

    #[test]
    fn test_attach_then_complete() {
        let mut registry = TrackRegistry::new();
        registry.attach("a1", ActivityType::Running);
        assert_eq!(registry.bounds_of("a1"), BoundsQuery::Pending);
        assert!(!registry.get("a1").unwrap().is_ready());

        let extent = registry
            .complete("a1", &[MapPoint::new(0.0, 0.0), MapPoint::new(10.0, 5.0)])
            .unwrap();
        assert_eq!(registry.bounds_of("a1"), BoundsQuery::Ready(extent));
        assert_eq!(extent.max_x, 10.0);
        assert_eq!(registry.ready_count(), 1);
    }

    #[test]
    fn test_complete_unknown_id() {
        let mut registry = TrackRegistry::new();
        let err = registry
            .complete("nope", &[MapPoint::new(0.0, 0.0), MapPoint::new(1.0, 1.0)])
            .unwrap_err();
        assert!(matches!(err, ActivityMapError::UnknownActivityId { .. }));
    }

    #[test]
    fn test_ready_is_terminal() {
        let mut registry = TrackRegistry::new();
        ready_track(&mut registry, "a1", &[(0.0, 0.0), (1.0, 1.0)]);
        let err = registry
            .complete("a1", &[MapPoint::new(5.0, 5.0), MapPoint::new(6.0, 6.0)])
            .unwrap_err();
        assert!(matches!(err, ActivityMapError::TrackParseFailure { .. }));
    }

    #[test]
    fn test_failed_parse_stays_loading() {
        let mut registry = TrackRegistry::new();
        registry.attach("a1", ActivityType::Running);
        let err = registry.complete("a1", &[MapPoint::new(0.0, 0.0)]).unwrap_err();
        assert!(matches!(err, ActivityMapError::TrackParseFailure { .. }));
        assert_eq!(registry.bounds_of("a1"), BoundsQuery::Pending);

        // A loading track finds nothing
        assert!(registry.features_at(MapPoint::new(0.0, 0.0)).is_empty());
    }

    #[test]
    fn test_bounds_of_unknown() {
        let registry = TrackRegistry::new();
        assert_eq!(registry.bounds_of("nope"), BoundsQuery::Unknown);
    }

    #[test]
    fn test_features_at_hits_within_tolerance() {
        let mut registry = TrackRegistry::with_config(TrackConfig { hit_tolerance: 2.0 });
        ready_track(&mut registry, "a1", &[(0.0, 0.0), (100.0, 0.0)]);

        assert_eq!(registry.features_at(MapPoint::new(50.0, 1.5)), ["a1".to_string()]);
        assert!(registry.features_at(MapPoint::new(50.0, 3.0)).is_empty());
        assert!(registry.features_at(MapPoint::new(f64::NAN, 0.0)).is_empty());
    }

    #[test]
    fn test_features_at_overlap_order_front_most_last() {
        let mut registry = TrackRegistry::with_config(TrackConfig { hit_tolerance: 2.0 });
        ready_track(&mut registry, "older", &[(0.0, 0.0), (100.0, 0.0)]);
        ready_track(&mut registry, "newer", &[(0.0, 1.0), (100.0, 1.0)]);

        let hits = registry.features_at(MapPoint::new(50.0, 0.5));
        assert_eq!(hits, ["older".to_string(), "newer".to_string()]);
        // Later-added wins ties: the click resolves to the last element
        assert_eq!(hits.last().unwrap(), "newer");
    }

    #[test]
    fn test_hidden_tracks_are_not_hit() {
        let mut registry = TrackRegistry::with_config(TrackConfig { hit_tolerance: 2.0 });
        ready_track(&mut registry, "a1", &[(0.0, 0.0), (100.0, 0.0)]);

        assert_eq!(registry.set_visible("a1", false), Some(true));
        assert!(registry.features_at(MapPoint::new(50.0, 0.0)).is_empty());

        registry.set_visible("a1", true);
        assert_eq!(registry.features_at(MapPoint::new(50.0, 0.0)).len(), 1);

        assert_eq!(registry.set_visible("nope", false), None);
    }

    #[test]
    fn test_all_in_extent_whole_track_inclusion() {
        let mut registry = TrackRegistry::new();
        // Only one end pokes into the box; the whole track is still included
        ready_track(&mut registry, "a1", &[(-50.0, 0.0), (5.0, 0.0)]);
        ready_track(&mut registry, "a2", &[(100.0, 100.0), (200.0, 200.0)]);

        let extent = Extent {
            min_x: -10.0,
            min_y: -10.0,
            max_x: 10.0,
            max_y: 10.0,
        };
        assert_eq!(registry.all_in_extent(extent, 0.0), ["a1".to_string()]);
    }

    #[test]
    fn test_all_in_extent_rotated_view() {
        let mut registry = TrackRegistry::new();
        // A 45-degree diagonal entirely above the thin horizontal box
        ready_track(&mut registry, "diag", &[(2.0, 2.0), (8.0, 8.0)]);

        let thin_box = Extent {
            min_x: -10.0,
            min_y: -1.0,
            max_x: 10.0,
            max_y: 1.0,
        };

        // Unrotated view: no intersection
        assert!(registry.all_in_extent(thin_box, 0.0).is_empty());

        // View rotated -45 degrees: the diagonal maps onto the box's axis
        let rotation = -std::f64::consts::FRAC_PI_4;
        assert_eq!(registry.all_in_extent(thin_box, rotation), ["diag".to_string()]);
    }

    #[test]
    fn test_rotation_invariance() {
        // Rotating both the view and the geometry by the same angle gives
        // the same answer as the unrotated test
        let extent = Extent {
            min_x: -10.0,
            min_y: -1.0,
            max_x: 10.0,
            max_y: 1.0,
        };
        let rotation = std::f64::consts::FRAC_PI_4;
        let (sin, cos) = rotation.sin_cos();
        let center = extent.center();

        // Geometry in the unrotated frame, offset from the box center
        let flat = [(3.0, 0.0), (9.0, 0.0)];
        // The same geometry expressed in map coordinates of a view rotated
        // by -rotation (so the query must rotate it back by +rotation)
        let unrotated: Vec<(f64, f64)> = flat
            .iter()
            .map(|&(x, y)| {
                let (dx, dy) = (x - center.x, y - center.y);
                (
                    center.x + dx * cos + dy * sin,
                    center.y - dx * sin + dy * cos,
                )
            })
            .collect();

        let mut plain = TrackRegistry::new();
        ready_track(&mut plain, "t", &flat);

        let mut rotated = TrackRegistry::new();
        ready_track(&mut rotated, "t", &unrotated);

        assert_eq!(
            plain.all_in_extent(extent, 0.0),
            rotated.all_in_extent(extent, rotation)
        );
        assert_eq!(rotated.all_in_extent(extent, rotation), ["t".to_string()]);
        // Without compensation the rotated-frame geometry misses the box
        assert!(rotated.all_in_extent(extent, 0.0).is_empty());
    }
}
