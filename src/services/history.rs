use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    Appointment, AppointmentSnapshot, HistoryAction, HistoryRecord, HistorySource, NewHistoryRecord,
};

/// Builds a ledger entry for `appointment` with before/after images.
pub fn entry(
    appointment: &Appointment,
    action: HistoryAction,
    source: HistorySource,
    previous_data: Option<AppointmentSnapshot>,
) -> NewHistoryRecord {
    NewHistoryRecord {
        business_id: appointment.business_id.clone(),
        appointment_external_id: appointment.external_id.clone(),
        action,
        source,
        previous_data,
        new_data: Some(appointment.snapshot()),
        changed_by: None,
        notes: None,
    }
}

/// Appends one record. Ledger rows are never updated or deleted.
pub fn append(
    conn: &Connection,
    record: &NewHistoryRecord,
    now: &NaiveDateTime,
) -> Result<i64, AppError> {
    let id = queries::insert_history(conn, record, now)?;
    tracing::debug!(
        business_id = %record.business_id,
        external_id = %record.appointment_external_id,
        action = record.action.as_str(),
        history_id = id,
        "history appended"
    );
    Ok(id)
}

/// Full trail for one appointment, oldest first.
pub fn trail(
    conn: &Connection,
    business_id: &str,
    external_id: &str,
) -> Result<Vec<HistoryRecord>, AppError> {
    Ok(queries::get_history(conn, business_id, external_id)?)
}
