use chrono::NaiveDateTime;
use rusqlite::{Connection, Transaction};
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    Appointment, AppointmentSource, AppointmentStatus, CancellationType, EventAction,
    HistoryAction, HistorySource, InfoFields, StaffMember,
};
use crate::services::history;
use crate::services::overlap::TimeRange;
use crate::services::reconciliation::Transition;
use crate::services::slots::slot_duration;
use crate::time::{checked_shift, local_day_bounds, parse_timestamp, saturating_shift, to_local};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SchedulingError {
    #[error("That time overlaps another appointment. Please pick a different time.")]
    Overlap,
    #[error("That time is blocked off ({0}). Please pick a different time.")]
    Blocked(String),
    #[error("This day is fully booked ({0} appointments). Please pick another date.")]
    DailyCapReached(i64),
}

impl From<SchedulingError> for AppError {
    fn from(err: SchedulingError) -> Self {
        AppError::Conflict(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct NewAppointmentRequest {
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub service_name: String,
    pub start_time: String,
    /// Derived from the service duration (or grid interval) when omitted.
    pub end_time: Option<String>,
    pub location: Option<String>,
    pub customer_notes: Option<String>,
    pub vehicle_make_model: Option<String>,
    pub web_meeting_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentPatch {
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub service_name: Option<String>,
    pub location: Option<String>,
    pub customer_notes: Option<String>,
    pub vehicle_make_model: Option<String>,
    pub web_meeting_url: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub cancellation_type: Option<CancellationType>,
    pub reason: Option<String>,
}

fn parse_time(raw: &str, field: &str) -> Result<NaiveDateTime, AppError> {
    parse_timestamp(raw).ok_or_else(|| AppError::Validation(format!("invalid {field}: {raw}")))
}

fn non_blank(value: &str, field: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Re-checks a proposed range against live data right before a write.
///
/// Existing BOOKED/CONFIRMED appointments are widened by the buffer, blocked
/// ranges are not. `exclude_external_id` keeps an appointment from colliding
/// with itself when it is being moved.
pub fn validate_slot(
    conn: &Connection,
    business_id: &str,
    range: TimeRange,
    exclude_external_id: Option<&str>,
) -> Result<(), AppError> {
    let settings = queries::get_settings(conn, business_id)?;
    let pad = settings.buffer_minutes();

    let nearby = queries::get_blocking_appointments_in_range(
        conn,
        business_id,
        &saturating_shift(range.start, -pad),
        &saturating_shift(range.end, pad),
    )?;
    let collides = nearby
        .iter()
        .filter(|a| Some(a.external_id.as_str()) != exclude_external_id)
        .any(|a| {
            TimeRange::new(a.start_time, a.end_time)
                .padded(pad)
                .overlaps(&range)
        });
    if collides {
        return Err(SchedulingError::Overlap.into());
    }

    let blocked = queries::get_blocked_slots_in_range(conn, business_id, &range.start, &range.end)?;
    if let Some(slot) = blocked.first() {
        let reason = slot.reason.clone().unwrap_or_else(|| "unavailable".to_string());
        return Err(SchedulingError::Blocked(reason).into());
    }

    if let Some(cap) = settings.max_appointments_per_day {
        let local_date = to_local(range.start, settings.utc_offset_minutes).date();
        let (day_start, day_end) = local_day_bounds(local_date, settings.utc_offset_minutes);
        let booked = queries::get_blocking_appointments_in_range(conn, business_id, &day_start, &day_end)?
            .into_iter()
            .filter(|a| Some(a.external_id.as_str()) != exclude_external_id)
            .filter(|a| to_local(a.start_time, settings.utc_offset_minutes).date() == local_date)
            .count() as i64;
        if booked >= cap {
            return Err(SchedulingError::DailyCapReached(cap).into());
        }
    }

    Ok(())
}

fn find(tx: &Transaction, business_id: &str, external_id: &str) -> Result<Appointment, AppError> {
    queries::get_appointment(tx, business_id, external_id)?
        .ok_or_else(|| AppError::NotFound(format!("appointment {external_id} not found")))
}

pub fn create_manual(
    conn: &mut Connection,
    staff: &StaffMember,
    business_id: &str,
    req: NewAppointmentRequest,
    now: NaiveDateTime,
) -> Result<Transition, AppError> {
    let customer_name = non_blank(&req.customer_name, "customer_name")?;
    let service_name = non_blank(&req.service_name, "service_name")?;
    let start_time = parse_time(&req.start_time, "start_time")?;

    let tx = conn.transaction()?;

    let end_time = match req.end_time.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_time(raw, "end_time")?,
        None => {
            let settings = queries::get_settings(&tx, business_id)?;
            let service = queries::get_active_service(&tx, business_id, &service_name)?;
            checked_shift(start_time, slot_duration(service.as_ref(), &settings)).ok_or_else(|| {
                AppError::Validation("service duration pushes end_time out of range".to_string())
            })?
        }
    };
    if end_time <= start_time {
        return Err(AppError::Validation("end_time must be after start_time".to_string()));
    }

    validate_slot(&tx, business_id, TimeRange::new(start_time, end_time), None)?;

    let mut appt = Appointment {
        id: 0,
        external_id: format!("manual-{}", uuid::Uuid::new_v4()),
        business_id: business_id.to_string(),
        customer_name,
        customer_email: None,
        customer_phone: None,
        service_name,
        start_time,
        end_time,
        location: None,
        customer_notes: None,
        vehicle_make_model: None,
        web_meeting_url: None,
        status: AppointmentStatus::Booked,
        previous_external_id: None,
        cancellation_type: None,
        was_edited: false,
        if_edited: false,
        edited_by: None,
        source: AppointmentSource::Manual,
        raw_payload: None,
        created_at: now,
        updated_at: now,
    };
    appt.apply_info(&InfoFields {
        customer_name: None,
        customer_email: req.customer_email,
        customer_phone: req.customer_phone,
        service_name: None,
        location: req.location,
        customer_notes: req.customer_notes,
        vehicle_make_model: req.vehicle_make_model,
        web_meeting_url: req.web_meeting_url,
    });
    appt.id = queries::upsert_appointment(&tx, &appt)?;

    let mut record = history::entry(&appt, HistoryAction::Create, HistorySource::User, None);
    record.changed_by = Some(staff.name.clone());
    let history_id = history::append(&tx, &record, &now)?;

    tx.commit()?;

    tracing::info!(
        business_id,
        external_id = %appt.external_id,
        staff_id = %staff.id,
        "manual appointment created"
    );

    Ok(Transition {
        action: EventAction::Booked,
        appointment: appt,
        changed_fields: vec![],
        history_ids: vec![history_id],
    })
}

/// Staff edit. Info changes append EDIT; time or status changes alone append
/// UPDATE. A patch that changes nothing writes nothing.
pub fn update_appointment(
    conn: &mut Connection,
    staff: &StaffMember,
    business_id: &str,
    external_id: &str,
    patch: AppointmentPatch,
    now: NaiveDateTime,
) -> Result<Transition, AppError> {
    if let Some(status) = patch.status {
        if !matches!(
            status,
            AppointmentStatus::Booked | AppointmentStatus::Confirmed | AppointmentStatus::Completed
        ) {
            return Err(AppError::Validation(format!(
                "status {} cannot be set directly",
                status.as_str()
            )));
        }
    }

    let tx = conn.transaction()?;
    let current = find(&tx, business_id, external_id)?;
    if current.status == AppointmentStatus::Cancelled {
        return Err(AppError::Conflict(
            "Cancelled appointments cannot be edited.".to_string(),
        ));
    }

    let before = current.info();
    let mut incoming = before.clone();
    let overrides = [
        (&mut incoming.customer_name, patch.customer_name),
        (&mut incoming.customer_email, patch.customer_email),
        (&mut incoming.customer_phone, patch.customer_phone),
        (&mut incoming.service_name, patch.service_name),
        (&mut incoming.location, patch.location),
        (&mut incoming.customer_notes, patch.customer_notes),
        (&mut incoming.vehicle_make_model, patch.vehicle_make_model),
        (&mut incoming.web_meeting_url, patch.web_meeting_url),
    ];
    for (slot, value) in overrides {
        if value.is_some() {
            *slot = value;
        }
    }
    let changed_fields = before.diff(&incoming);

    let start_time = match patch.start_time.as_deref() {
        Some(raw) => parse_time(raw, "start_time")?,
        None => current.start_time,
    };
    let end_time = match patch.end_time.as_deref() {
        Some(raw) => parse_time(raw, "end_time")?,
        None => start_time
            .checked_add_signed(current.end_time - current.start_time)
            .ok_or_else(|| AppError::Validation("start_time out of range".to_string()))?,
    };
    if end_time <= start_time {
        return Err(AppError::Validation("end_time must be after start_time".to_string()));
    }
    let times_changed = start_time != current.start_time || end_time != current.end_time;
    let status = patch.status.unwrap_or(current.status);
    let status_changed = status != current.status;

    if changed_fields.is_empty() && !times_changed && !status_changed {
        return Ok(Transition::unchanged(EventAction::Edited, current));
    }

    // Moving a booking, or putting a finished one back on the calendar,
    // claims time that must still be free.
    if status.blocks_time() && (times_changed || !current.status.blocks_time()) {
        validate_slot(&tx, business_id, TimeRange::new(start_time, end_time), Some(external_id))?;
    }

    let snapshot = current.snapshot();
    let mut appt = current;
    appt.apply_info(&incoming);
    appt.start_time = start_time;
    appt.end_time = end_time;
    appt.status = status;
    appt.source = AppointmentSource::User;
    appt.updated_at = now;

    let history_action = if changed_fields.is_empty() {
        HistoryAction::Update
    } else {
        appt.was_edited = true;
        appt.if_edited = true;
        appt.edited_by = Some(staff.name.clone());
        HistoryAction::Edit
    };

    queries::upsert_appointment(&tx, &appt)?;

    let mut record = history::entry(&appt, history_action, HistorySource::User, Some(snapshot));
    record.changed_by = Some(staff.name.clone());
    let history_id = history::append(&tx, &record, &now)?;

    tx.commit()?;

    tracing::info!(
        business_id,
        external_id,
        staff_id = %staff.id,
        history_action = history_action.as_str(),
        "appointment updated by staff"
    );

    Ok(Transition {
        action: EventAction::Edited,
        appointment: appt,
        changed_fields,
        history_ids: vec![history_id],
    })
}

pub fn cancel_appointment(
    conn: &mut Connection,
    staff: &StaffMember,
    business_id: &str,
    external_id: &str,
    req: CancelRequest,
    now: NaiveDateTime,
) -> Result<Transition, AppError> {
    let tx = conn.transaction()?;
    let current = find(&tx, business_id, external_id)?;
    if current.status == AppointmentStatus::Cancelled {
        return Ok(Transition::unchanged(EventAction::Canceled, current));
    }

    let snapshot = current.snapshot();
    let mut appt = current;
    appt.status = AppointmentStatus::Cancelled;
    appt.cancellation_type = Some(req.cancellation_type.unwrap_or(CancellationType::Final));
    appt.source = AppointmentSource::User;
    appt.updated_at = now;
    queries::upsert_appointment(&tx, &appt)?;

    let mut record = history::entry(&appt, HistoryAction::Cancel, HistorySource::User, Some(snapshot));
    record.changed_by = Some(staff.name.clone());
    record.notes = req.reason.filter(|r| !r.trim().is_empty());
    let history_id = history::append(&tx, &record, &now)?;

    tx.commit()?;

    tracing::info!(business_id, external_id, staff_id = %staff.id, "appointment cancelled by staff");

    Ok(Transition {
        action: EventAction::Canceled,
        appointment: appt,
        changed_fields: vec![],
        history_ids: vec![history_id],
    })
}
