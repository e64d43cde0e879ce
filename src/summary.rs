//! Summary text for the info panels.
//!
//! Renders one line per activity in the order given, plus a totals line for
//! multi-selections: activity count, distance sum at two decimals, and the
//! durations summed component-wise then renormalized base-60 (seconds into
//! minutes into hours). The host decides where the text goes; these
//! functions only build it.

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::store::ActivityRecord;
use crate::Hms;

/// Placeholder for an empty selection.
pub const EMPTY_SELECTION: &str = "(no activities selected)";

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const DAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Fancy date formatting: `"2019 Mar 9 9:45 am"`, optionally with the
/// weekday: `"2019 Mar 9 (Sat) 9:45 am"`.
pub fn nice_date(t: NaiveDateTime, show_dow: bool) -> String {
    let hour = t.hour();
    let clock_hour = if hour > 12 { hour - 12 } else { hour };
    let suffix = if hour > 11 { "pm" } else { "am" };
    let dow = if show_dow {
        format!(" ({}) ", DAYS[t.weekday().num_days_from_sunday() as usize])
    } else {
        " ".to_string()
    };

    format!(
        "{} {} {}{}{}:{:02} {}",
        t.year(),
        MONTHS[t.month0() as usize],
        t.day(),
        dow,
        clock_hour,
        t.minute(),
        suffix
    )
}

fn activity_line(record: &ActivityRecord, show_dow: bool) -> String {
    format!(
        "{} {} {:.2} mi Dur: {} Pace: {}",
        nice_date(record.timestamp, show_dow),
        record.activity_type,
        record.distance,
        record.duration,
        record.average_pace
    )
}

/// Render selected activities, in the given order, one line each.
///
/// More than one record appends a totals line; a single record never does.
/// Empty input yields [`EMPTY_SELECTION`].
pub fn summarize(records: &[&ActivityRecord], include_day_of_week: bool) -> String {
    if records.is_empty() {
        return EMPTY_SELECTION.to_string();
    }

    let mut lines: Vec<String> = records
        .iter()
        .map(|r| activity_line(r, include_day_of_week))
        .collect();

    if records.len() > 1 {
        let miles: f64 = records.iter().map(|r| r.distance).sum();
        let total: Hms = records
            .iter()
            .fold(Hms::default(), |acc, r| acc + r.duration)
            .normalized();
        lines.push(format!(
            "{} activities, {:.2} miles, {} hours {} minutes {} seconds",
            records.len(),
            miles,
            total.hours,
            total.minutes,
            total.seconds
        ));
    }

    lines.join("\n")
}

/// Multi-line detail block for a single activity (list-click panel).
pub fn detail(record: &ActivityRecord) -> String {
    format!(
        "{}\n{}\nDistance {:.2} mi\nDuration: {}\nAverage Pace: {}\nNotes: {}",
        nice_date(record.timestamp, true),
        record.activity_type,
        record.distance,
        record.duration,
        record.average_pace,
        record.notes
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ActivityType, Hms};
    use chrono::NaiveDate;

    fn record(id: &str, distance: f64, duration: Hms) -> ActivityRecord {
        ActivityRecord {
            id: id.to_string(),
            activity_type: ActivityType::Running,
            timestamp: NaiveDate::from_ymd_opt(2019, 3, 9)
                .unwrap()
                .and_hms_opt(9, 45, 23)
                .unwrap(),
            distance,
            duration,
            average_pace: "9:57".to_string(),
            notes: "easy loop".to_string(),
            city: None,
            state: None,
            track_key: "2019-03-09-094523".to_string(),
        }
    }

    #[test]
    fn test_nice_date() {
        let t = NaiveDate::from_ymd_opt(2019, 3, 9)
            .unwrap()
            .and_hms_opt(9, 45, 23)
            .unwrap();
        assert_eq!(nice_date(t, false), "2019 Mar 9 9:45 am");
        assert_eq!(nice_date(t, true), "2019 Mar 9 (Sat) 9:45 am");

        let afternoon = NaiveDate::from_ymd_opt(2020, 11, 1)
            .unwrap()
            .and_hms_opt(13, 5, 0)
            .unwrap();
        assert_eq!(nice_date(afternoon, false), "2020 Nov 1 1:05 pm");

        // Noon stays 12, midnight stays 0
        let noon = NaiveDate::from_ymd_opt(2020, 11, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        assert_eq!(nice_date(noon, false), "2020 Nov 1 12:30 pm");
    }

    #[test]
    fn test_empty_selection_placeholder() {
        assert_eq!(summarize(&[], false), EMPTY_SELECTION);
    }

    #[test]
    fn test_single_record_has_no_totals_line() {
        let a = record("a", 2.0, Hms::new(0, 20, 0));
        let text = summarize(&[&a], false);
        assert_eq!(
            text,
            "2019 Mar 9 9:45 am Running 2.00 mi Dur: 20:00 Pace: 9:57"
        );
        assert!(!text.contains("activities"));
    }

    #[test]
    fn test_totals_line_renormalizes_base_60() {
        let a = record("a", 2.0, Hms::new(0, 20, 0));
        let b = record("b", 3.5, Hms::new(0, 40, 0));
        let text = summarize(&[&a, &b], false);

        let totals = text.lines().last().unwrap();
        assert_eq!(totals, "2 activities, 5.50 miles, 1 hours 0 minutes 0 seconds");
    }

    #[test]
    fn test_lines_follow_given_order() {
        let a = record("a", 2.0, Hms::new(0, 20, 0));
        let b = record("b", 3.5, Hms::new(0, 40, 0));

        let forward = summarize(&[&a, &b], true);
        let reverse = summarize(&[&b, &a], true);
        assert_ne!(forward, reverse);
        assert!(forward.starts_with("2019 Mar 9 (Sat)"));
        // Weekday shows up on every activity line
        assert_eq!(forward.matches("(Sat)").count(), 2);
    }

    #[test]
    fn test_detail_block() {
        let a = record("a", 4.53, Hms::new(0, 45, 6));
        let text = detail(&a);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "2019 Mar 9 (Sat) 9:45 am");
        assert_eq!(lines[1], "Running");
        assert_eq!(lines[2], "Distance 4.53 mi");
        assert_eq!(lines[3], "Duration: 45:06");
        assert_eq!(lines[4], "Average Pace: 9:57");
        assert_eq!(lines[5], "Notes: easy loop");
    }
}
