use std::collections::HashMap;

use chrono::{Days, NaiveDate, NaiveTime};
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Appointment, BusinessHours};
use crate::services::slots::{self, hours_for};
use crate::time::{local_day_bounds, saturating_shift, to_local};

/// Dates in `[start, start + days)` on which the business opens and is under
/// its daily cap. A missing cap never excludes a date.
pub fn eligible_dates(
    start: NaiveDate,
    days: u32,
    hours: &[BusinessHours],
    max_per_day: Option<i64>,
    booked_per_day: &HashMap<NaiveDate, i64>,
) -> Vec<NaiveDate> {
    (0..u64::from(days))
        .map_while(|offset| start.checked_add_days(Days::new(offset)))
        .filter(|date| hours_for(*date, hours).is_some())
        .filter(|date| {
            let booked = booked_per_day.get(date).copied().unwrap_or(0);
            max_per_day.map_or(true, |cap| booked < cap)
        })
        .collect()
}

/// Buckets BOOKED/CONFIRMED appointments by the local date they start on.
pub fn count_by_local_date(
    appointments: &[Appointment],
    utc_offset_minutes: i32,
) -> HashMap<NaiveDate, i64> {
    let mut counts = HashMap::new();
    for appt in appointments.iter().filter(|a| a.status.blocks_time()) {
        let date = to_local(appt.start_time, utc_offset_minutes).date();
        *counts.entry(date).or_insert(0) += 1;
    }
    counts
}

pub fn available_dates(
    conn: &Connection,
    business_id: &str,
    start: NaiveDate,
    days: u32,
) -> Result<Vec<NaiveDate>, AppError> {
    let hours = queries::get_business_hours(conn, business_id)?;
    let settings = queries::get_settings(conn, business_id)?;

    let (range_start, _) = local_day_bounds(start, settings.utc_offset_minutes);
    let range_end = saturating_shift(range_start, i64::from(days) * 24 * 60);
    let booked =
        queries::get_blocking_appointments_in_range(conn, business_id, &range_start, &range_end)?;
    let counts = count_by_local_date(&booked, settings.utc_offset_minutes);

    Ok(eligible_dates(
        start,
        days,
        &hours,
        settings.max_appointments_per_day,
        &counts,
    ))
}

/// Open slots for one local date, optionally sized to a named service.
pub fn slots_for_date(
    conn: &Connection,
    business_id: &str,
    date: NaiveDate,
    service_name: Option<&str>,
) -> Result<Vec<NaiveTime>, AppError> {
    let hours = queries::get_business_hours(conn, business_id)?;
    let settings = queries::get_settings(conn, business_id)?;

    let service = match service_name.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => Some(
            queries::get_active_service(conn, business_id, name)?
                .ok_or_else(|| AppError::Validation(format!("unknown service: {name}")))?,
        ),
        None => None,
    };

    let (day_start, day_end) = local_day_bounds(date, settings.utc_offset_minutes);
    let blocked = queries::get_blocked_slots_in_range(conn, business_id, &day_start, &day_end)?;
    // Widen the fetch so bookings just outside the day still apply their buffer.
    let pad = settings.buffer_minutes();
    let appointments = queries::get_blocking_appointments_in_range(
        conn,
        business_id,
        &saturating_shift(day_start, -pad),
        &saturating_shift(day_end, pad),
    )?;

    Ok(slots::generate_slots(
        date,
        &hours,
        service.as_ref(),
        &settings,
        &blocked,
        &appointments,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn weekday_hours() -> Vec<BusinessHours> {
        (1..=5)
            .map(|weekday| BusinessHours {
                weekday,
                is_enabled: true,
                open_time: t("09:00"),
                close_time: t("17:00"),
            })
            .collect()
    }

    #[test]
    fn test_skips_closed_weekdays() {
        // 2025-06-15 is a Sunday
        let start = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        let dates = eligible_dates(start, 7, &weekday_hours(), None, &HashMap::new());
        assert_eq!(dates.len(), 5);
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2025, 6, 16).unwrap());
        assert_eq!(dates[4], NaiveDate::from_ymd_opt(2025, 6, 20).unwrap());
    }

    #[test]
    fn test_full_days_excluded_strictly_at_cap() {
        let monday = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2025, 6, 17).unwrap();
        let mut counts = HashMap::new();
        counts.insert(monday, 2);
        counts.insert(tuesday, 1);

        let dates = eligible_dates(monday, 2, &weekday_hours(), Some(2), &counts);
        assert_eq!(dates, vec![tuesday]);
    }

    #[test]
    fn test_zero_days_is_empty() {
        let monday = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();
        assert!(eligible_dates(monday, 0, &weekday_hours(), None, &HashMap::new()).is_empty());
    }
}
