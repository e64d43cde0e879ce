//! Activity record store.
//!
//! Parses the ordered tabular activity feed into typed records, skipping any
//! row without a resolvable track file. Insertion order equals feed row order
//! and determines the "most recent activity" anchor (first row = most recent,
//! used for initial map framing). Chronological-descending input order is a
//! caller obligation; the store does not verify it.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use log::{debug, info, warn};
use serde::Deserialize;

use crate::error::ActivityMapError;
use crate::{ActivityId, ActivityType, Hms};

/// Pre-indexed mapping from track-file key to track-file handle, built by the
/// host from its GPX directory.
pub type TrackFileIndex = HashMap<String, PathBuf>;

/// Derive the track-file lookup key from a feed `Date` value: the first
/// space becomes a hyphen and colons are removed
/// (`"2019-03-09 09:45:23"` -> `"2019-03-09-094523"`).
pub fn track_key(date: &str) -> String {
    date.replacen(' ', "-", 1).replace(':', "")
}

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One activity from the feed, with derived fields.
///
/// Track geometry is never owned by the record; the [`crate::TrackRegistry`]
/// keyed by `id` holds it.
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub id: ActivityId,
    pub activity_type: ActivityType,
    pub timestamp: NaiveDateTime,
    /// Distance in miles, non-negative
    pub distance: f64,
    pub duration: Hms,
    /// Display string, stored as-is from the feed
    pub average_pace: String,
    pub notes: String,
    /// Populated post-hoc by the geocoding job
    pub city: Option<String>,
    pub state: Option<String>,
    /// Key into the host's track-file index
    pub track_key: String,
}

/// Raw feed row, straight from the CSV columns.
#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "Activity Id")]
    activity_id: String,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Type")]
    activity_type: String,
    #[serde(rename = "Distance (mi)")]
    distance: String,
    #[serde(rename = "Duration")]
    duration: String,
    #[serde(rename = "Average Pace")]
    average_pace: String,
    #[serde(default, rename = "Notes")]
    notes: String,
    #[serde(default, rename = "GPX File")]
    gpx_file: String,
    #[serde(default, rename = "City")]
    city: String,
    #[serde(default, rename = "State")]
    state: String,
}

/// In-memory store of activity records, in feed order.
#[derive(Debug, Default)]
pub struct ActivityStore {
    records: HashMap<ActivityId, ActivityRecord>,
    order: Vec<ActivityId>,
}

impl ActivityStore {
    /// Load records from a CSV feed.
    ///
    /// Rows with an empty "GPX File" field are excluded entirely. Rows whose
    /// derived key misses `track_index`, or that fail field parsing, are
    /// skipped with a diagnostic; a single bad row never aborts the load.
    pub fn load<R: io::Read>(reader: R, track_index: &TrackFileIndex) -> Self {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut store = Self::default();
        let mut total_rows: u64 = 0;

        for (i, result) in rdr.deserialize::<RawRow>().enumerate() {
            // Row 1 is the header line
            let line = i as u64 + 2;
            total_rows += 1;

            let row = match result {
                Ok(row) => row,
                Err(e) => {
                    warn!(
                        "{}",
                        ActivityMapError::MalformedRow {
                            line,
                            message: e.to_string(),
                        }
                    );
                    continue;
                }
            };

            if row.gpx_file.is_empty() {
                debug!("row {}: no GPX file, activity '{}' excluded", line, row.activity_id);
                continue;
            }

            let key = track_key(&row.date);
            if !track_index.contains_key(&key) {
                warn!(
                    "{}",
                    ActivityMapError::MissingTrackFile {
                        activity_id: row.activity_id.clone(),
                        key,
                    }
                );
                continue;
            }

            match store.parse_row(row, key, line) {
                Ok(record) => {
                    store.order.push(record.id.clone());
                    store.records.insert(record.id.clone(), record);
                }
                Err(e) => warn!("{}", e),
            }
        }

        info!(
            "activity feed: {} rows, {} with resolvable tracks",
            total_rows,
            store.len()
        );
        store
    }

    fn parse_row(
        &self,
        row: RawRow,
        key: String,
        line: u64,
    ) -> Result<ActivityRecord, ActivityMapError> {
        let malformed = |message: String| ActivityMapError::MalformedRow { line, message };

        if row.activity_id.is_empty() {
            return Err(malformed("empty activity id".to_string()));
        }
        if self.records.contains_key(&row.activity_id) {
            return Err(malformed(format!("duplicate activity id '{}'", row.activity_id)));
        }

        let timestamp = NaiveDateTime::parse_from_str(&row.date, DATE_FORMAT)
            .map_err(|e| malformed(format!("bad date '{}': {}", row.date, e)))?;

        let distance: f64 = row
            .distance
            .parse()
            .map_err(|_| malformed(format!("bad distance '{}'", row.distance)))?;
        if !distance.is_finite() {
            return Err(malformed(format!("invalid distance '{}'", row.distance)));
        }
        if distance < 0.0 {
            return Err(malformed(format!("negative distance '{}'", row.distance)));
        }

        let duration = Hms::parse(&row.duration)
            .ok_or_else(|| malformed(format!("bad duration '{}'", row.duration)))?;

        let none_if_empty = |s: String| if s.is_empty() { None } else { Some(s) };

        Ok(ActivityRecord {
            id: row.activity_id,
            activity_type: ActivityType::parse(&row.activity_type),
            timestamp,
            distance,
            duration,
            average_pace: row.average_pace,
            notes: row.notes,
            city: none_if_empty(row.city),
            state: none_if_empty(row.state),
            track_key: key,
        })
    }

    /// Look up a record by id.
    pub fn get(&self, id: &str) -> Option<&ActivityRecord> {
        self.records.get(id)
    }

    /// Id of the earliest-inserted record (the feed's first retained row),
    /// used as the most-recent-activity anchor for initial framing.
    pub fn first(&self) -> Option<&ActivityId> {
        self.order.first()
    }

    /// All ids in insertion (feed) order.
    pub fn ids(&self) -> &[ActivityId] {
        &self.order
    }

    /// Records in insertion order.
    pub fn records_in_order(&self) -> impl Iterator<Item = &ActivityRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "Activity Id,Date,Type,Distance (mi),Duration,Average Pace,Notes,GPX File,City,State\n";

    fn index_for(dates: &[&str]) -> TrackFileIndex {
        dates
            .iter()
            .map(|d| (track_key(d), PathBuf::from(format!("{}.gpx", track_key(d)))))
            .collect()
    }

    #[test]
    fn test_track_key() {
        assert_eq!(track_key("2019-03-09 09:45:23"), "2019-03-09-094523");
        // Only the first space becomes a hyphen
        assert_eq!(track_key("a b c:d"), "a-b cd");
    }

    #[test]
    fn test_load_in_feed_order() {
        let feed = format!(
            "{}a1,2019-03-09 09:45:23,Running,4.53,45:06,9:57,,a1.gpx,Portland,Oregon\n\
             a2,2019-03-02 08:30:00,Cycling,12.10,1:08:15,5:38,windy,a2.gpx,,\n",
            HEADER
        );
        let index = index_for(&["2019-03-09 09:45:23", "2019-03-02 08:30:00"]);
        let store = ActivityStore::load(feed.as_bytes(), &index);

        assert_eq!(store.len(), 2);
        assert_eq!(store.ids(), ["a1".to_string(), "a2".to_string()]);
        assert_eq!(store.first(), Some(&"a1".to_string()));

        let a1 = store.get("a1").unwrap();
        assert_eq!(a1.activity_type, ActivityType::Running);
        assert_eq!(a1.distance, 4.53);
        assert_eq!(a1.duration, Hms::new(0, 45, 6));
        assert_eq!(a1.city.as_deref(), Some("Portland"));
        assert_eq!(a1.track_key, "2019-03-09-094523");

        let a2 = store.get("a2").unwrap();
        assert_eq!(a2.city, None);
        assert_eq!(a2.notes, "windy");
    }

    #[test]
    fn test_rows_without_gpx_file_are_excluded() {
        let feed = format!(
            "{}a1,2019-03-09 09:45:23,Running,4.53,45:06,9:57,,a1.gpx,,\n\
             a2,2019-03-02 08:30:00,Rowing,2.00,20:00,10:00,,,,\n\
             a3,2019-02-20 07:00:00,Walking,1.50,30:00,20:00,,a3.gpx,,\n",
            HEADER
        );
        let index = index_for(&[
            "2019-03-09 09:45:23",
            "2019-03-02 08:30:00",
            "2019-02-20 07:00:00",
        ]);
        let store = ActivityStore::load(feed.as_bytes(), &index);

        assert_eq!(store.len(), 2);
        assert!(!store.contains("a2"));
        assert_eq!(store.ids(), ["a1".to_string(), "a3".to_string()]);
    }

    #[test]
    fn test_missing_track_file_is_skipped() {
        let feed = format!(
            "{}a1,2019-03-09 09:45:23,Running,4.53,45:06,9:57,,a1.gpx,,\n",
            HEADER
        );
        let store = ActivityStore::load(feed.as_bytes(), &TrackFileIndex::new());
        assert!(store.is_empty());
        assert_eq!(store.first(), None);
    }

    #[test]
    fn test_malformed_rows_do_not_abort_load() {
        let feed = format!(
            "{}a1,not a date,Running,4.53,45:06,9:57,,a1.gpx,,\n\
             a2,2019-03-02 08:30:00,Cycling,twelve,1:08:15,5:38,,a2.gpx,,\n\
             a3,2019-02-20 07:00:00,Walking,1.50,junk,20:00,,a3.gpx,,\n\
             a4,2019-02-18 07:00:00,Walking,1.50,30:00,20:00,,a4.gpx,,\n",
            HEADER
        );
        let index = index_for(&[
            "not a date",
            "2019-03-02 08:30:00",
            "2019-02-20 07:00:00",
            "2019-02-18 07:00:00",
        ]);
        let store = ActivityStore::load(feed.as_bytes(), &index);

        assert_eq!(store.len(), 1);
        assert_eq!(store.first(), Some(&"a4".to_string()));
    }

    #[test]
    fn test_distance_validation_messages() {
        let store = ActivityStore::default();
        let row = |distance: &str| RawRow {
            activity_id: "a1".to_string(),
            date: "2019-03-09 09:45:23".to_string(),
            activity_type: "Running".to_string(),
            distance: distance.to_string(),
            duration: "20:00".to_string(),
            average_pace: "10:00".to_string(),
            notes: String::new(),
            gpx_file: "a1.gpx".to_string(),
            city: String::new(),
            state: String::new(),
        };
        let key = "2019-03-09-094523".to_string();

        // "NaN" and "inf" parse as floats; the diagnostic must name the
        // actual problem rather than calling them negative
        let err = store.parse_row(row("NaN"), key.clone(), 2).unwrap_err();
        assert!(err.to_string().contains("invalid distance"));
        let err = store.parse_row(row("inf"), key.clone(), 2).unwrap_err();
        assert!(err.to_string().contains("invalid distance"));

        let err = store.parse_row(row("-1.0"), key.clone(), 2).unwrap_err();
        assert!(err.to_string().contains("negative distance"));

        assert!(store.parse_row(row("2.0"), key, 2).is_ok());
    }

    #[test]
    fn test_duplicate_id_keeps_first() {
        let feed = format!(
            "{}a1,2019-03-09 09:45:23,Running,4.53,45:06,9:57,,a1.gpx,,\n\
             a1,2019-03-02 08:30:00,Cycling,12.10,1:08:15,5:38,,a2.gpx,,\n",
            HEADER
        );
        let index = index_for(&["2019-03-09 09:45:23", "2019-03-02 08:30:00"]);
        let store = ActivityStore::load(feed.as_bytes(), &index);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a1").unwrap().activity_type, ActivityType::Running);
    }

    #[test]
    fn test_unknown_type_maps_to_unknown() {
        let feed = format!(
            "{}a1,2019-03-09 09:45:23,Elliptical,1.00,10:00,10:00,,a1.gpx,,\n",
            HEADER
        );
        let index = index_for(&["2019-03-09 09:45:23"]);
        let store = ActivityStore::load(feed.as_bytes(), &index);
        assert_eq!(store.get("a1").unwrap().activity_type, ActivityType::Unknown);
    }
}
