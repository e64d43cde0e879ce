//! # Activity Map
//!
//! Correlation and selection engine for rendering personal fitness-activity
//! tracks (runs, walks, rides, hikes) on an interactive map.
//!
//! The host owns the actual map widget (tiles, projection, layer rendering)
//! and the DOM; this crate owns everything in between:
//! - Parsing the tabular activity feed into an ordered record store
//! - Correlating records with asynchronously parsed track geometries
//! - The bidirectional selection model between the activity list and the map
//! - Spatial queries (hover, click, drag-box) in map-coordinate space
//! - Summary text for the info panels
//!
//! The host drives a [`ViewController`] with pointer and load events and
//! applies the [`ViewCommand`]s it returns. No component mutates the UI
//! directly, and there is no global state.
//!
//! ## Features
//!
//! - **`http`** - Enable the reverse-geocoding batch job and its CLI
//!
//! ## Quick Start
//!
//! ```rust
//! use activity_map::{MapPoint, TrackFileIndex, ViewController};
//!
//! let feed = "\
//! Activity Id,Date,Type,Distance (mi),Duration,Average Pace,Notes,GPX File,City,State
//! a1,2019-03-09 09:45:23,Running,4.53,45:06,9:57,,2019-03-09-094523.gpx,,
//! ";
//! let mut index = TrackFileIndex::new();
//! index.insert("2019-03-09-094523".into(), "data/gpx/2019-03-09-094523.gpx".into());
//!
//! let mut view = ViewController::new();
//! let loaded = view.load_feed(feed.as_bytes(), &index);
//! assert_eq!(loaded, 1);
//!
//! // The host reports parsed geometry later; the first (most recent)
//! // activity frames the view when its track becomes ready.
//! let commands = view.track_ready("a1", &[MapPoint::new(0.0, 0.0), MapPoint::new(10.0, 5.0)]);
//! assert!(!commands.is_empty());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

// Unified error handling
pub mod error;
pub use error::{ActivityMapError, Result};

// Activity record store (CSV feed -> ordered records)
pub mod store;
pub use store::{ActivityRecord, ActivityStore, TrackFileIndex};

// Track registry: Loading -> Ready lifecycle, hit-testing, extent queries
pub mod tracks;
pub use tracks::{BoundsQuery, Track, TrackConfig, TrackRegistry, TrackState};

// Selection set with synchronous change events
pub mod selection;
pub use selection::{SelectionChange, SelectionEvent, SelectionSet};

// Pointer interaction -> activity id translation
pub mod query;
pub use query::{DragSelectMode, QueryConfig, SpatialQuery};

// Display text for the info panels
pub mod summary;
pub use summary::{detail, nice_date, summarize, EMPTY_SELECTION};

// Top-level view controller (explicit context object, owns the rest)
pub mod controller;
pub use controller::{ViewCommand, ViewController, ViewStats};

// Reverse-geocoding batch job
#[cfg(feature = "http")]
pub mod geocode;
#[cfg(feature = "http")]
pub use geocode::{GeocodeConfig, GeocodeJob, GeocodeReport};

// ============================================================================
// Core Types
// ============================================================================

/// Opaque activity identifier, unique within a store.
pub type ActivityId = String;

/// A point in map-projection coordinates.
///
/// The external map library owns projection math; the engine only assumes a
/// planar frame shared by geometry, extents and pointer events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    pub x: f64,
    pub y: f64,
}

impl MapPoint {
    /// Create a new map point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Check that both coordinates are finite.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned bounding box in map coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    /// Compute the extent of a set of points.
    ///
    /// Returns `None` for an empty input or when no point is valid.
    pub fn from_points(points: &[MapPoint]) -> Option<Self> {
        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;
        let mut any = false;

        for p in points.iter().filter(|p| p.is_valid()) {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
            any = true;
        }

        if !any {
            return None;
        }

        Some(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    /// Center point of the extent.
    pub fn center(&self) -> MapPoint {
        MapPoint::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Grow the extent by `pad` on every side.
    pub fn padded(&self, pad: f64) -> Self {
        Self {
            min_x: self.min_x - pad,
            min_y: self.min_y - pad,
            max_x: self.max_x + pad,
            max_y: self.max_y + pad,
        }
    }
}

/// Activity category from the feed's `Type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityType {
    Running,
    Walking,
    Cycling,
    Hiking,
    Rowing,
    Unknown,
}

impl ActivityType {
    /// Parse a feed value. Unrecognized values map to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "Running" => Self::Running,
            "Walking" => Self::Walking,
            "Cycling" => Self::Cycling,
            "Hiking" => Self::Hiking,
            "Rowing" => Self::Rowing,
            _ => Self::Unknown,
        }
    }

    /// Short label used in the activity list.
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Running => "Run",
            Self::Walking => "Walk",
            Self::Cycling => "Bike",
            Self::Hiking => "Hike",
            Self::Rowing => "Row",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "Running",
            Self::Walking => "Walking",
            Self::Cycling => "Cycling",
            Self::Hiking => "Hiking",
            Self::Rowing => "Rowing",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Elapsed time as hours/minutes/seconds components.
///
/// The feed stores durations as display strings (`"45:06"`, `"1:08:15"`);
/// totals are summed component-wise and renormalized base-60, so the
/// components are kept separate rather than collapsed to seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Hms {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl Hms {
    pub fn new(hours: u32, minutes: u32, seconds: u32) -> Self {
        Self {
            hours,
            minutes,
            seconds,
        }
    }

    /// Parse `"H:MM:SS"` or `"MM:SS"`.
    pub fn parse(s: &str) -> Option<Self> {
        let nums: Option<Vec<u32>> = s.split(':').map(|p| p.trim().parse::<u32>().ok()).collect();

        match nums?.as_slice() {
            [h, m, s] => Some(Self::new(*h, *m, *s)),
            [m, s] => Some(Self::new(0, *m, *s)),
            _ => None,
        }
    }

    /// Carry seconds into minutes and minutes into hours (base 60).
    pub fn normalized(&self) -> Self {
        let minutes = self.minutes + self.seconds / 60;
        Self {
            hours: self.hours + minutes / 60,
            minutes: minutes % 60,
            seconds: self.seconds % 60,
        }
    }
}

impl std::ops::Add for Hms {
    type Output = Hms;

    /// Component-wise sum, without carry. Call [`Hms::normalized`] after
    /// accumulating.
    fn add(self, other: Hms) -> Hms {
        Hms::new(
            self.hours + other.hours,
            self.minutes + other.minutes,
            self.seconds + other.seconds,
        )
    }
}

impl fmt::Display for Hms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hours > 0 {
            write!(f, "{}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
        } else {
            write!(f, "{:02}:{:02}", self.minutes, self.seconds)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_point_validation() {
        assert!(MapPoint::new(1.0, -2.0).is_valid());
        assert!(!MapPoint::new(f64::NAN, 0.0).is_valid());
        assert!(!MapPoint::new(0.0, f64::INFINITY).is_valid());
    }

    #[test]
    fn test_extent_from_points() {
        let points = vec![
            MapPoint::new(0.0, 5.0),
            MapPoint::new(10.0, -3.0),
            MapPoint::new(4.0, 2.0),
        ];
        let extent = Extent::from_points(&points).unwrap();
        assert_eq!(extent.min_x, 0.0);
        assert_eq!(extent.max_x, 10.0);
        assert_eq!(extent.min_y, -3.0);
        assert_eq!(extent.max_y, 5.0);
        assert_eq!(extent.center(), MapPoint::new(5.0, 1.0));
    }

    #[test]
    fn test_extent_skips_invalid_points() {
        let points = vec![MapPoint::new(f64::NAN, 0.0), MapPoint::new(1.0, 1.0)];
        let extent = Extent::from_points(&points).unwrap();
        assert_eq!(extent.min_x, 1.0);

        assert!(Extent::from_points(&[]).is_none());
        assert!(Extent::from_points(&[MapPoint::new(f64::NAN, 0.0)]).is_none());
    }

    #[test]
    fn test_activity_type_parse() {
        assert_eq!(ActivityType::parse("Running"), ActivityType::Running);
        assert_eq!(ActivityType::parse("Rowing"), ActivityType::Rowing);
        assert_eq!(ActivityType::parse("Yoga"), ActivityType::Unknown);
        assert_eq!(ActivityType::Cycling.short_name(), "Bike");
        assert_eq!(ActivityType::Running.to_string(), "Running");
    }

    #[test]
    fn test_hms_parse() {
        assert_eq!(Hms::parse("45:06"), Some(Hms::new(0, 45, 6)));
        assert_eq!(Hms::parse("1:08:15"), Some(Hms::new(1, 8, 15)));
        assert_eq!(Hms::parse("00:20:00"), Some(Hms::new(0, 20, 0)));
        assert_eq!(Hms::parse("bogus"), None);
        assert_eq!(Hms::parse("1:2:3:4"), None);
    }

    #[test]
    fn test_hms_sum_renormalizes() {
        let total = (Hms::new(0, 20, 0) + Hms::new(0, 40, 0)).normalized();
        assert_eq!(total, Hms::new(1, 0, 0));

        let total = (Hms::new(0, 45, 50) + Hms::new(0, 30, 20)).normalized();
        assert_eq!(total, Hms::new(1, 16, 10));
    }

    #[test]
    fn test_hms_display() {
        assert_eq!(Hms::new(0, 45, 6).to_string(), "45:06");
        assert_eq!(Hms::new(1, 8, 15).to_string(), "1:08:15");
    }
}
