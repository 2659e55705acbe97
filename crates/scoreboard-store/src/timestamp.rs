//! Text encoding for persisted timestamps.
//!
//! Every `*_updated_at` column holds `YYYY-MM-DD HH:MM:SS` followed by an
//! offset designator: `Z` for UTC or a numeric `+HH:MM` / `-HH:MM`. Values
//! are always written in UTC with `Z`, which keeps SQL `MAX()` over the
//! text column in chronological order. Parsing accepts either designator
//! and rejects everything else.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{StoreError, StoreResult};

/// Date and time portion of the layout.
const DATE_TIME_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";

/// Full layout with a numeric UTC offset.
const OFFSET_LAYOUT: &str = "%Y-%m-%d %H:%M:%S%:z";

/// Render `ts` in the persisted layout.
pub fn format(ts: DateTime<Utc>) -> String {
    format!("{}Z", ts.format(DATE_TIME_LAYOUT))
}

/// Current time in the persisted layout, truncated to whole seconds.
pub fn now() -> String {
    format(Utc::now())
}

/// Parse a stored value, failing on anything outside the fixed layout.
pub fn parse(value: &str) -> StoreResult<DateTime<Utc>> {
    let malformed = |message: String| StoreError::Timestamp {
        value: value.to_string(),
        message,
    };

    if !has_layout_shape(value.as_bytes()) {
        return Err(malformed("expected YYYY-MM-DD HH:MM:SS followed by Z or ±HH:MM".into()));
    }

    if let Some(naive) = value.strip_suffix('Z') {
        return NaiveDateTime::parse_from_str(naive, DATE_TIME_LAYOUT)
            .map(|dt| dt.and_utc())
            .map_err(|e| malformed(e.to_string()));
    }

    DateTime::parse_from_str(value, OFFSET_LAYOUT)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| malformed(e.to_string()))
}

/// Byte-level check of the layout; chrono alone tolerates unpadded fields
/// and extra whitespace.
fn has_layout_shape(bytes: &[u8]) -> bool {
    let offset_ok = match bytes.len() {
        20 => bytes[19] == b'Z',
        25 => matches!(bytes[19], b'+' | b'-') && bytes[22] == b':',
        _ => return false,
    };
    offset_ok
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            10 => *b == b' ',
            13 | 16 => *b == b':',
            19 | 22 => true,
            _ => b.is_ascii_digit(),
        })
}

/// Parse an optional column value; `None` stays `None`.
pub fn parse_opt(value: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    value.as_deref().map(parse).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn format_uses_zulu_suffix() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(format(ts), "2024-03-09 07:05:01Z");
    }

    #[test]
    fn parse_zulu() {
        let ts = parse("2024-03-09 07:05:01Z").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap());
    }

    #[test]
    fn parse_numeric_offset_normalizes_to_utc() {
        let ts = parse("2024-03-09 10:05:01+03:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap());
    }

    #[test]
    fn parse_negative_offset() {
        let ts = parse("2024-03-09 02:05:01-05:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap());
    }

    #[test]
    fn now_round_trips_at_second_precision() {
        let ts = parse(&now()).unwrap();
        assert_eq!(ts.nanosecond(), 0);
    }

    #[test]
    fn parse_rejects_other_layouts() {
        for bad in [
            "2024-03-09T07:05:01Z",
            "2024-03-09 07:05:01",
            "2024-03-09 07:05:01.123Z",
            "2024-03-09 07:05:01.5+03:00",
            "yesterday",
            "",
            "2024-3-9 7:5:1Z",
            "2024-03-09  07:05:01Z",
            "2024-03-09 07:05:01+0300",
            "2024-03-0907:05:01Z",
            " 2024-03-09 07:05:01Z",
            "2024-03-09 07:05:01z",
            "2024-03-09 07:05:01Z ",
        ] {
            let err = parse(bad).unwrap_err();
            assert!(
                matches!(err, StoreError::Timestamp { .. }),
                "expected timestamp error for {bad:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn parse_opt_passes_through_none() {
        assert!(parse_opt(None).unwrap().is_none());
        assert!(parse_opt(Some("2024-03-09 07:05:01Z".into())).unwrap().is_some());
    }
}
