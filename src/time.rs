use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Storage format for every timestamp column (always UTC).
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_ts(dt: &NaiveDateTime) -> String {
    dt.format(TS_FORMAT).to_string()
}

/// Accepts the storage format, a bare `T`-separated datetime, or RFC 3339 with
/// an offset (converted to UTC).
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, TS_FORMAT) {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M") {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z")
        .ok()
        .map(|dt| dt.naive_utc())
}

pub fn parse_wall_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s.trim(), "%H:%M:%S"))
        .ok()
}

/// `dt` moved by `minutes`, or `None` outside chrono's representable range.
pub fn checked_shift(dt: NaiveDateTime, minutes: i64) -> Option<NaiveDateTime> {
    Duration::try_minutes(minutes).and_then(|d| dt.checked_add_signed(d))
}

/// Like [`checked_shift`] but clamps to `NaiveDateTime::MIN`/`MAX`.
pub fn saturating_shift(dt: NaiveDateTime, minutes: i64) -> NaiveDateTime {
    checked_shift(dt, minutes).unwrap_or(if minutes < 0 {
        NaiveDateTime::MIN
    } else {
        NaiveDateTime::MAX
    })
}

pub fn to_local(utc: NaiveDateTime, utc_offset_minutes: i32) -> NaiveDateTime {
    saturating_shift(utc, i64::from(utc_offset_minutes))
}

pub fn to_utc(local: NaiveDateTime, utc_offset_minutes: i32) -> NaiveDateTime {
    saturating_shift(local, -i64::from(utc_offset_minutes))
}

/// UTC bounds `[start, end)` of a local calendar day.
pub fn local_day_bounds(date: NaiveDate, utc_offset_minutes: i32) -> (NaiveDateTime, NaiveDateTime) {
    let start = to_utc(date.and_time(NaiveTime::MIN), utc_offset_minutes);
    (start, saturating_shift(start, 24 * 60))
}

/// Serde adapter for wall-clock `HH:MM` fields.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_wall_time(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid time: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDateTime::parse_from_str("2025-06-16 10:00:00", TS_FORMAT).unwrap();
        assert_eq!(parse_timestamp("2025-06-16 10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-06-16T10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-06-16T12:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-06-16T10:00:00+0000"), Some(expected));
        assert_eq!(parse_timestamp("next tuesday"), None);
    }

    #[test]
    fn test_local_day_bounds_with_offset() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();
        let (start, end) = local_day_bounds(date, -300);
        assert_eq!(format_ts(&start), "2025-06-16 05:00:00");
        assert_eq!(format_ts(&end), "2025-06-17 05:00:00");
    }

    #[test]
    fn test_shift_past_range_saturates() {
        let dt = parse_timestamp("2025-06-16 10:00:00").unwrap();
        assert_eq!(checked_shift(dt, 1_000_000_000_000), None);
        assert_eq!(saturating_shift(dt, 1_000_000_000_000), NaiveDateTime::MAX);
        assert_eq!(saturating_shift(dt, -1_000_000_000_000), NaiveDateTime::MIN);
        assert_eq!(saturating_shift(dt, i64::MAX), NaiveDateTime::MAX);
        assert_eq!(format_ts(&saturating_shift(dt, 90)), "2025-06-16 11:30:00");
    }

    #[test]
    fn test_parse_wall_time() {
        assert_eq!(parse_wall_time("09:30"), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(parse_wall_time("17:00:00"), NaiveTime::from_hms_opt(17, 0, 0));
        assert_eq!(parse_wall_time("25:00"), None);
    }
}
