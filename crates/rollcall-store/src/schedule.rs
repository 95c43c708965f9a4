//! Schedule resolution — which class window, if any, covers a given time.

use chrono::NaiveTime;
use rusqlite::types::Value;

use crate::records::ClassWindow;

/// Resolve the window active at `time`.
///
/// The [start, end] interval is inclusive on both ends. Overlapping windows
/// should not happen under correct data but are tolerated: the one with the
/// latest start time wins.
pub fn resolve_active(windows: &[ClassWindow], time: NaiveTime) -> Option<&ClassWindow> {
    windows
        .iter()
        .filter(|w| w.start_time <= time && time <= w.end_time)
        .max_by_key(|w| w.start_time)
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum TimeParseError {
    #[error("unparseable time text {text:?}")]
    BadText { text: String },
    #[error("seconds-since-midnight out of range: {0}")]
    OutOfRange(i64),
    #[error("unsupported time column type")]
    UnsupportedType,
}

/// Normalize a stored time cell into a time of day.
///
/// Rows may carry either `"HH:MM[:SS]"` text or an integer
/// duration-since-midnight in seconds; both compare as [`NaiveTime`].
pub(crate) fn normalize_time(value: &Value) -> Result<NaiveTime, TimeParseError> {
    match value {
        Value::Text(text) => NaiveTime::parse_from_str(text, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
            .map_err(|_| TimeParseError::BadText { text: text.clone() }),
        Value::Integer(secs) => u32::try_from(*secs)
            .ok()
            .and_then(|s| NaiveTime::from_num_seconds_from_midnight_opt(s, 0))
            .ok_or(TimeParseError::OutOfRange(*secs)),
        _ => Err(TimeParseError::UnsupportedType),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn window(id: i64, start: (u32, u32), end: (u32, u32)) -> ClassWindow {
        ClassWindow {
            id,
            name: format!("class-{id}"),
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
        }
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn window_is_inclusive_at_both_ends() {
        let windows = vec![window(1, (10, 0), (11, 0))];
        assert!(resolve_active(&windows, at(10, 0, 0)).is_some());
        assert!(resolve_active(&windows, at(11, 0, 0)).is_some());
        assert!(resolve_active(&windows, at(10, 59, 59)).is_some());
    }

    #[test]
    fn window_is_inactive_outside_bounds() {
        let windows = vec![window(1, (10, 0), (11, 0))];
        assert!(resolve_active(&windows, at(9, 59, 59)).is_none());
        assert!(resolve_active(&windows, at(11, 0, 1)).is_none());
    }

    #[test]
    fn overlap_resolves_to_latest_start() {
        let windows = vec![window(1, (10, 0), (12, 0)), window(2, (10, 30), (11, 30))];
        let active = resolve_active(&windows, at(11, 0, 0)).unwrap();
        assert_eq!(active.id, 2);
    }

    #[test]
    fn no_windows_resolves_to_none() {
        assert!(resolve_active(&[], at(10, 0, 0)).is_none());
    }

    #[test]
    fn normalizes_text_with_seconds() {
        let t = normalize_time(&Value::Text("10:15:30".into())).unwrap();
        assert_eq!(t, at(10, 15, 30));
    }

    #[test]
    fn normalizes_text_without_seconds() {
        let t = normalize_time(&Value::Text("10:15".into())).unwrap();
        assert_eq!(t, at(10, 15, 0));
    }

    #[test]
    fn normalizes_integer_seconds_since_midnight() {
        let t = normalize_time(&Value::Integer(10 * 3600 + 15 * 60)).unwrap();
        assert_eq!(t, at(10, 15, 0));
    }

    #[test]
    fn rejects_garbage_text() {
        assert!(normalize_time(&Value::Text("soon".into())).is_err());
    }

    #[test]
    fn rejects_out_of_range_seconds() {
        assert!(normalize_time(&Value::Integer(-5)).is_err());
        assert!(normalize_time(&Value::Integer(90_000)).is_err());
    }

    #[test]
    fn rejects_unsupported_column_type() {
        assert!(normalize_time(&Value::Null).is_err());
        assert!(normalize_time(&Value::Real(10.5)).is_err());
    }
}
