//! Unified error handling for the activity-map engine.
//!
//! Every error in the rendering core is non-fatal: the affected row or
//! activity is skipped and a diagnostic is logged, never aborting the whole
//! view for one bad record.

use std::fmt;

/// Unified error type for activity-map operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityMapError {
    /// A feed row references a track file that is not in the index
    MissingTrackFile { activity_id: String, key: String },
    /// A feed row could not be parsed into an activity record
    MalformedRow { line: u64, message: String },
    /// A track's geometry failed to parse; the track stays `Loading`
    TrackParseFailure {
        activity_id: String,
        message: String,
    },
    /// An operation referenced an id not present in the store or registry
    UnknownActivityId { activity_id: String },
    /// Reverse-geocode lookup failed (network, response shape, missing field)
    GeocodeFailure {
        activity_id: String,
        message: String,
    },
    /// Reading or writing the feed CSV failed (batch tooling only)
    Io { context: String, message: String },
}

impl fmt::Display for ActivityMapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityMapError::MissingTrackFile { activity_id, key } => {
                write!(
                    f,
                    "Activity '{}' references missing track file '{}'",
                    activity_id, key
                )
            }
            ActivityMapError::MalformedRow { line, message } => {
                write!(f, "Malformed feed row {}: {}", line, message)
            }
            ActivityMapError::TrackParseFailure {
                activity_id,
                message,
            } => {
                write!(f, "Track for activity '{}' failed to parse: {}", activity_id, message)
            }
            ActivityMapError::UnknownActivityId { activity_id } => {
                write!(f, "Unknown activity id '{}'", activity_id)
            }
            ActivityMapError::GeocodeFailure {
                activity_id,
                message,
            } => {
                write!(f, "Geocode lookup for '{}' failed: {}", activity_id, message)
            }
            ActivityMapError::Io { context, message } => {
                write!(f, "I/O error ({}): {}", context, message)
            }
        }
    }
}

impl std::error::Error for ActivityMapError {}

/// Result type alias for activity-map operations.
pub type Result<T> = std::result::Result<T, ActivityMapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ActivityMapError::MissingTrackFile {
            activity_id: "a1".to_string(),
            key: "2019-03-09-094523".to_string(),
        };
        assert!(err.to_string().contains("a1"));
        assert!(err.to_string().contains("2019-03-09-094523"));

        let err = ActivityMapError::UnknownActivityId {
            activity_id: "nope".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown activity id 'nope'");
    }
}
