use chrono::{Datelike, NaiveDate, NaiveTime};

use crate::models::{Appointment, BlockedSlot, BusinessHours, BusinessService, BusinessSettings};
use crate::services::overlap::TimeRange;
use crate::time::{checked_shift, to_local};

/// Hours entry for the weekday of `date`, if the business opens that day.
pub fn hours_for(date: NaiveDate, hours: &[BusinessHours]) -> Option<&BusinessHours> {
    let weekday = date.weekday().num_days_from_sunday() as u8;
    hours
        .iter()
        .find(|h| h.weekday == weekday)
        .filter(|h| h.is_enabled && h.open_time < h.close_time)
}

/// Minutes a booking occupies: the service's duration when one is selected,
/// otherwise the grid interval.
pub fn slot_duration(service: Option<&BusinessService>, settings: &BusinessSettings) -> i64 {
    service
        .map(|s| s.duration_minutes)
        .filter(|d| *d > 0)
        .unwrap_or(settings.appointment_interval_minutes)
}

/// Bookable start times on `date`, in local wall-clock time, ascending.
///
/// Candidates sit on a grid of `appointment_interval_minutes` from opening time.
/// A candidate survives if `[t, t + duration)` ends by closing time, misses
/// every blocked range, and misses every BOOKED/CONFIRMED appointment widened
/// by the buffer on both sides. Stored ranges are UTC and shifted by the
/// business offset before comparison.
pub fn generate_slots(
    date: NaiveDate,
    hours: &[BusinessHours],
    service: Option<&BusinessService>,
    settings: &BusinessSettings,
    blocked: &[BlockedSlot],
    appointments: &[Appointment],
) -> Vec<NaiveTime> {
    let Some(day) = hours_for(date, hours) else {
        return vec![];
    };

    let step = settings.appointment_interval_minutes;
    let duration = slot_duration(service, settings);
    if step <= 0 || duration <= 0 {
        tracing::warn!(step, duration, "non-positive slot interval, no slots generated");
        return vec![];
    }

    let offset = settings.utc_offset_minutes;
    let blocked: Vec<TimeRange> = blocked
        .iter()
        .map(|b| TimeRange::new(to_local(b.start_time, offset), to_local(b.end_time, offset)))
        .collect();
    let busy: Vec<TimeRange> = appointments
        .iter()
        .filter(|a| a.status.blocks_time())
        .map(|a| {
            TimeRange::new(to_local(a.start_time, offset), to_local(a.end_time, offset))
                .padded(settings.buffer_minutes())
        })
        .collect();

    let close = date.and_time(day.close_time);
    let mut t = date.and_time(day.open_time);
    let mut slots = vec![];

    while t < close {
        let Some(end) = checked_shift(t, duration) else {
            break;
        };
        let candidate = TimeRange::new(t, end);
        let fits = candidate.end <= close;
        let free = fits
            && !blocked.iter().any(|b| b.overlaps(&candidate))
            && !busy.iter().any(|b| b.overlaps(&candidate));
        if free {
            slots.push(t.time());
        }
        match checked_shift(t, step) {
            Some(next) => t = next,
            None => break,
        }
    }

    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentSource, AppointmentStatus};
    use chrono::{Duration, NaiveDateTime};

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    // 2025-06-16 is a Monday
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 16).unwrap()
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

    fn appt(start: &str, end: &str, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: 1,
            external_id: "ext-1".to_string(),
            business_id: "shop".to_string(),
            customer_name: "Dana".to_string(),
            customer_email: None,
            customer_phone: None,
            service_name: "Oil change".to_string(),
            start_time: dt(start),
            end_time: dt(end),
            location: None,
            customer_notes: None,
            vehicle_make_model: None,
            web_meeting_url: None,
            status,
            previous_external_id: None,
            cancellation_type: None,
            was_edited: false,
            if_edited: false,
            edited_by: None,
            source: AppointmentSource::Manual,
            raw_payload: None,
            created_at: dt(start),
            updated_at: dt(start),
        }
    }

    fn as_strings(slots: &[NaiveTime]) -> Vec<String> {
        slots.iter().map(|s| s.format("%H:%M").to_string()).collect()
    }

    #[test]
    fn test_open_day_yields_full_grid() {
        let slots = generate_slots(
            monday(),
            &weekday_hours(),
            None,
            &BusinessSettings::default(),
            &[],
            &[],
        );
        assert_eq!(slots.len(), 16);
        assert_eq!(slots.first(), Some(&t("09:00")));
        assert_eq!(slots.last(), Some(&t("16:30")));
    }

    #[test]
    fn test_disabled_or_missing_day_is_empty() {
        let sunday = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        let settings = BusinessSettings::default();
        assert!(generate_slots(sunday, &weekday_hours(), None, &settings, &[], &[]).is_empty());

        let mut hours = weekday_hours();
        hours[0].is_enabled = false;
        assert!(generate_slots(monday(), &hours, None, &settings, &[], &[]).is_empty());
    }

    #[test]
    fn test_booked_appointment_removes_overlapping_slots() {
        let booked = appt("2025-06-16 10:00", "2025-06-16 11:00", AppointmentStatus::Booked);
        let slots = generate_slots(
            monday(),
            &weekday_hours(),
            None,
            &BusinessSettings::default(),
            &[],
            &[booked],
        );
        let slots = as_strings(&slots);
        assert!(slots.contains(&"09:00".to_string()));
        assert!(slots.contains(&"09:30".to_string()));
        assert!(!slots.contains(&"10:00".to_string()));
        assert!(!slots.contains(&"10:30".to_string()));
        assert!(slots.contains(&"11:00".to_string()));
        assert_eq!(slots.len(), 14);
    }

    #[test]
    fn test_cancelled_and_completed_never_block() {
        let cancelled = appt("2025-06-16 10:00", "2025-06-16 11:00", AppointmentStatus::Cancelled);
        let completed = appt("2025-06-16 12:00", "2025-06-16 13:00", AppointmentStatus::Completed);
        let slots = generate_slots(
            monday(),
            &weekday_hours(),
            None,
            &BusinessSettings::default(),
            &[],
            &[cancelled, completed],
        );
        assert_eq!(slots.len(), 16);
    }

    #[test]
    fn test_service_duration_limits_late_slots() {
        let service = BusinessService {
            name: "Brake job".to_string(),
            duration_minutes: 90,
            price: None,
            is_active: true,
        };
        let slots = generate_slots(
            monday(),
            &weekday_hours(),
            Some(&service),
            &BusinessSettings::default(),
            &[],
            &[],
        );
        // Grid still 30 minutes apart; last start that ends by 17:00 is 15:30.
        assert_eq!(slots.last(), Some(&t("15:30")));
        assert_eq!(slots.len(), 14);
        for start in &slots {
            assert!(*start + Duration::minutes(90) <= t("17:00"));
        }
    }

    #[test]
    fn test_blocked_range_excluded() {
        let blocked = BlockedSlot {
            id: 1,
            business_id: "shop".to_string(),
            start_time: dt("2025-06-16 12:00"),
            end_time: dt("2025-06-16 13:00"),
            reason: Some("Lunch".to_string()),
        };
        let slots = as_strings(&generate_slots(
            monday(),
            &weekday_hours(),
            None,
            &BusinessSettings::default(),
            &[blocked],
            &[],
        ));
        assert!(slots.contains(&"11:30".to_string()));
        assert!(!slots.contains(&"12:00".to_string()));
        assert!(!slots.contains(&"12:30".to_string()));
        assert!(slots.contains(&"13:00".to_string()));
    }

    #[test]
    fn test_buffer_widens_existing_booking_on_both_sides() {
        let settings = BusinessSettings {
            buffer_time_minutes: 15,
            ..Default::default()
        };
        let booked = appt("2025-06-16 10:00", "2025-06-16 11:00", AppointmentStatus::Confirmed);
        let slots = as_strings(&generate_slots(
            monday(),
            &weekday_hours(),
            None,
            &settings,
            &[],
            &[booked],
        ));
        // Busy window becomes 09:45-11:15.
        assert!(slots.contains(&"09:00".to_string()));
        assert!(!slots.contains(&"09:30".to_string()));
        assert!(!slots.contains(&"11:00".to_string()));
        assert!(slots.contains(&"11:30".to_string()));
    }

    #[test]
    fn test_utc_offset_shifts_stored_appointments() {
        let settings = BusinessSettings {
            utc_offset_minutes: -240,
            ..Default::default()
        };
        // 14:00 UTC is 10:00 local at UTC-4.
        let booked = appt("2025-06-16 14:00", "2025-06-16 15:00", AppointmentStatus::Booked);
        let slots = as_strings(&generate_slots(
            monday(),
            &weekday_hours(),
            None,
            &settings,
            &[],
            &[booked],
        ));
        assert!(!slots.contains(&"10:00".to_string()));
        assert!(slots.contains(&"14:00".to_string()));
    }

    #[test]
    fn test_no_slot_overlaps_any_booking() {
        let bookings = vec![
            appt("2025-06-16 09:15", "2025-06-16 09:50", AppointmentStatus::Booked),
            appt("2025-06-16 13:00", "2025-06-16 14:40", AppointmentStatus::Booked),
        ];
        let settings = BusinessSettings {
            appointment_interval_minutes: 15,
            ..Default::default()
        };
        let slots = generate_slots(monday(), &weekday_hours(), None, &settings, &[], &bookings);
        for start in slots {
            let slot = TimeRange::new(
                monday().and_time(start),
                monday().and_time(start) + Duration::minutes(15),
            );
            for b in &bookings {
                assert!(!slot.overlaps(&TimeRange::new(b.start_time, b.end_time)));
            }
        }
    }

    #[test]
    fn test_oversized_settings_yield_no_slots_without_panicking() {
        let settings = BusinessSettings {
            appointment_interval_minutes: i64::MAX,
            buffer_time_minutes: 1_000_000_000_000,
            ..Default::default()
        };
        let booked = appt("2025-06-16 10:00", "2025-06-16 11:00", AppointmentStatus::Booked);
        let slots = generate_slots(monday(), &weekday_hours(), None, &settings, &[], &[booked]);
        assert!(slots.is_empty());
    }
}
