use std::collections::HashMap;

use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    Appointment, AppointmentStatus, AppointmentView, CancellationType, DisplayStatus,
    HistoryAction, HistoryRecord, PreviousAppointment,
};

/// True when some EDIT record actually changed an info field.
pub fn has_info_edit(history: &[HistoryRecord]) -> bool {
    history.iter().any(|r| {
        r.action == HistoryAction::Edit
            && match (&r.previous_data, &r.new_data) {
                (Some(before), Some(after)) => !before.info.diff(&after.info).is_empty(),
                _ => false,
            }
    })
}

/// Computes the read-time view of one appointment. Pure: nothing is written.
///
/// `history` may contain rows for other appointments; only this one's are used.
/// RESCHEDULED wins over EDITED when both apply.
pub fn project(
    appointment: &Appointment,
    history: &[HistoryRecord],
    predecessor: Option<&Appointment>,
    successor_external_id: Option<&str>,
) -> AppointmentView {
    let own: Vec<HistoryRecord> = history
        .iter()
        .filter(|r| {
            r.appointment_external_id == appointment.external_id
                && r.business_id == appointment.business_id
        })
        .cloned()
        .collect();

    let booked = appointment.status == AppointmentStatus::Booked;
    let rescheduled = booked && appointment.previous_external_id.is_some();
    let edited = booked && has_info_edit(&own);

    let display_status = if rescheduled {
        Some(DisplayStatus::Rescheduled)
    } else if edited {
        Some(DisplayStatus::Edited)
    } else {
        None
    };

    let previous_appointment = if rescheduled {
        predecessor
            .filter(|p| appointment.previous_external_id.as_deref() == Some(p.external_id.as_str()))
            .map(|p| PreviousAppointment {
                external_id: p.external_id.clone(),
                start_time: p.start_time,
                end_time: p.end_time,
                location: p.location.clone(),
                service_name: p.service_name.clone(),
                cancellation_type: if p.status == AppointmentStatus::Cancelled {
                    Some(CancellationType::Reschedule)
                } else {
                    p.cancellation_type
                },
            })
    } else {
        None
    };

    let effective_cancellation_type = if appointment.status == AppointmentStatus::Cancelled {
        if successor_external_id.is_some() {
            Some(CancellationType::Reschedule)
        } else {
            Some(appointment.cancellation_type.unwrap_or(CancellationType::Final))
        }
    } else {
        None
    };

    AppointmentView {
        appointment: appointment.clone(),
        display_status,
        previous_appointment,
        next_external_id: successor_external_id.map(str::to_string),
        effective_cancellation_type,
    }
}

/// Projects a fetched page in one pass: history, predecessors and successors
/// are loaded with a query each rather than per row.
pub fn project_all(
    conn: &Connection,
    business_id: &str,
    appointments: &[Appointment],
) -> Result<Vec<AppointmentView>, AppError> {
    let ids: Vec<String> = appointments.iter().map(|a| a.external_id.clone()).collect();
    let previous_ids: Vec<String> = appointments
        .iter()
        .filter_map(|a| a.previous_external_id.clone())
        .collect();

    let history = queries::get_history_for_appointments(conn, business_id, &ids)?;
    let mut history_by_id: HashMap<String, Vec<HistoryRecord>> = HashMap::new();
    for record in history {
        history_by_id
            .entry(record.appointment_external_id.clone())
            .or_default()
            .push(record);
    }

    let predecessors: HashMap<String, Appointment> =
        queries::get_appointments_by_external_ids(conn, business_id, &previous_ids)?
            .into_iter()
            .map(|a| (a.external_id.clone(), a))
            .collect();
    let successors = queries::get_successor_ids(conn, business_id, &ids)?;

    Ok(appointments
        .iter()
        .map(|appt| {
            let history = history_by_id
                .get(&appt.external_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let predecessor = appt
                .previous_external_id
                .as_ref()
                .and_then(|id| predecessors.get(id));
            let successor = successors.get(&appt.external_id).map(String::as_str);
            project(appt, history, predecessor, successor)
        })
        .collect())
}

pub fn project_one(
    conn: &Connection,
    appointment: &Appointment,
) -> Result<AppointmentView, AppError> {
    let mut views = project_all(conn, &appointment.business_id, std::slice::from_ref(appointment))?;
    views
        .pop()
        .ok_or_else(|| AppError::Internal("projection returned no rows".to_string()))
}
