use std::collections::HashMap;

use chrono::{NaiveDateTime, NaiveTime};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::models::{
    Appointment, AppointmentSnapshot, AppointmentSource, AppointmentStatus, BlockedSlot, Business,
    BusinessHours, BusinessService, BusinessSettings, CancellationType, HistoryAction,
    HistoryRecord, HistorySource, NewHistoryRecord, StaffMember,
};
use crate::time::{format_ts, parse_timestamp, parse_wall_time};

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn ts_at(row: &Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| conversion_error(idx, format!("invalid timestamp: {raw}")))
}

fn wall_time_at(row: &Row, idx: usize) -> rusqlite::Result<NaiveTime> {
    let raw: String = row.get(idx)?;
    parse_wall_time(&raw).ok_or_else(|| conversion_error(idx, format!("invalid time: {raw}")))
}

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Businesses & Staff ──

pub fn create_business(conn: &Connection, business: &Business) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO businesses (id, name, webhook_token, site_url) VALUES (?1, ?2, ?3, ?4)",
        params![business.id, business.name, business.webhook_token, business.site_url],
    )?;
    Ok(())
}

fn parse_business_row(row: &Row) -> rusqlite::Result<Business> {
    Ok(Business {
        id: row.get(0)?,
        name: row.get(1)?,
        webhook_token: row.get(2)?,
        site_url: row.get(3)?,
    })
}

pub fn get_business(conn: &Connection, id: &str) -> rusqlite::Result<Option<Business>> {
    conn.query_row(
        "SELECT id, name, webhook_token, site_url FROM businesses WHERE id = ?1",
        params![id],
        parse_business_row,
    )
    .optional()
}

pub fn find_business_by_token(conn: &Connection, token: &str) -> rusqlite::Result<Option<Business>> {
    conn.query_row(
        "SELECT id, name, webhook_token, site_url FROM businesses WHERE webhook_token = ?1",
        params![token],
        parse_business_row,
    )
    .optional()
}

pub fn list_businesses_with_site_url(conn: &Connection) -> rusqlite::Result<Vec<Business>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, webhook_token, site_url FROM businesses WHERE site_url IS NOT NULL ORDER BY id",
    )?;
    let rows = stmt.query_map([], parse_business_row)?;
    rows.collect()
}

pub fn create_staff_member(
    conn: &Connection,
    staff: &StaffMember,
    api_token: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO staff_members (id, name, api_token) VALUES (?1, ?2, ?3)",
        params![staff.id, staff.name, api_token],
    )?;
    Ok(())
}

pub fn add_business_member(
    conn: &Connection,
    business_id: &str,
    staff_id: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO business_members (business_id, staff_id) VALUES (?1, ?2)",
        params![business_id, staff_id],
    )?;
    Ok(())
}

pub fn get_staff_by_token(conn: &Connection, token: &str) -> rusqlite::Result<Option<StaffMember>> {
    conn.query_row(
        "SELECT id, name FROM staff_members WHERE api_token = ?1",
        params![token],
        |row| {
            Ok(StaffMember {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        },
    )
    .optional()
}

pub fn is_business_member(
    conn: &Connection,
    business_id: &str,
    staff_id: &str,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM business_members WHERE business_id = ?1 AND staff_id = ?2",
        params![business_id, staff_id],
        |row| row.get(0),
    )
}

// ── Business Hours ──

pub fn get_business_hours(conn: &Connection, business_id: &str) -> rusqlite::Result<Vec<BusinessHours>> {
    let mut stmt = conn.prepare(
        "SELECT weekday, is_enabled, open_time, close_time
         FROM business_hours WHERE business_id = ?1 ORDER BY weekday ASC",
    )?;
    let rows = stmt.query_map(params![business_id], |row| {
        Ok(BusinessHours {
            weekday: row.get(0)?,
            is_enabled: row.get::<_, i32>(1)? != 0,
            open_time: wall_time_at(row, 2)?,
            close_time: wall_time_at(row, 3)?,
        })
    })?;
    rows.collect()
}

pub fn replace_business_hours(
    conn: &Connection,
    business_id: &str,
    hours: &[BusinessHours],
) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM business_hours WHERE business_id = ?1", params![business_id])?;
    for h in hours {
        tx.execute(
            "INSERT INTO business_hours (business_id, weekday, is_enabled, open_time, close_time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                business_id,
                h.weekday,
                h.is_enabled as i32,
                h.open_time.format("%H:%M").to_string(),
                h.close_time.format("%H:%M").to_string(),
            ],
        )?;
    }
    tx.commit()
}

// ── Services ──

fn parse_service_row(row: &Row) -> rusqlite::Result<BusinessService> {
    Ok(BusinessService {
        name: row.get(0)?,
        duration_minutes: row.get(1)?,
        price: row.get(2)?,
        is_active: row.get::<_, i32>(3)? != 0,
    })
}

pub fn get_services(conn: &Connection, business_id: &str) -> rusqlite::Result<Vec<BusinessService>> {
    let mut stmt = conn.prepare(
        "SELECT name, duration_minutes, price, is_active
         FROM business_services WHERE business_id = ?1 ORDER BY name ASC",
    )?;
    let rows = stmt.query_map(params![business_id], parse_service_row)?;
    rows.collect()
}

pub fn get_active_service(
    conn: &Connection,
    business_id: &str,
    name: &str,
) -> rusqlite::Result<Option<BusinessService>> {
    conn.query_row(
        "SELECT name, duration_minutes, price, is_active
         FROM business_services WHERE business_id = ?1 AND name = ?2 AND is_active = 1",
        params![business_id, name],
        parse_service_row,
    )
    .optional()
}

pub fn replace_services(
    conn: &Connection,
    business_id: &str,
    services: &[BusinessService],
) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM business_services WHERE business_id = ?1", params![business_id])?;
    for s in services {
        tx.execute(
            "INSERT INTO business_services (business_id, name, duration_minutes, price, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![business_id, s.name, s.duration_minutes, s.price, s.is_active as i32],
        )?;
    }
    tx.commit()
}

// ── Settings ──

pub fn get_settings(conn: &Connection, business_id: &str) -> rusqlite::Result<BusinessSettings> {
    let settings = conn
        .query_row(
            "SELECT appointment_interval_minutes, buffer_time_minutes, max_appointments_per_day, utc_offset_minutes
             FROM business_settings WHERE business_id = ?1",
            params![business_id],
            |row| {
                Ok(BusinessSettings {
                    appointment_interval_minutes: row.get(0)?,
                    buffer_time_minutes: row.get(1)?,
                    max_appointments_per_day: row.get(2)?,
                    utc_offset_minutes: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(settings.unwrap_or_default())
}

pub fn save_settings(
    conn: &Connection,
    business_id: &str,
    settings: &BusinessSettings,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO business_settings (business_id, appointment_interval_minutes, buffer_time_minutes, max_appointments_per_day, utc_offset_minutes)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(business_id) DO UPDATE SET
           appointment_interval_minutes = excluded.appointment_interval_minutes,
           buffer_time_minutes = excluded.buffer_time_minutes,
           max_appointments_per_day = excluded.max_appointments_per_day,
           utc_offset_minutes = excluded.utc_offset_minutes",
        params![
            business_id,
            settings.appointment_interval_minutes,
            settings.buffer_time_minutes,
            settings.max_appointments_per_day,
            settings.utc_offset_minutes,
        ],
    )?;
    Ok(())
}

// ── Blocked Slots ──

pub fn add_blocked_slot(
    conn: &Connection,
    business_id: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
    reason: Option<&str>,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO blocked_slots (business_id, start_time, end_time, reason) VALUES (?1, ?2, ?3, ?4)",
        params![business_id, format_ts(start), format_ts(end), reason],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Blocked ranges intersecting `[start, end)`.
pub fn get_blocked_slots_in_range(
    conn: &Connection,
    business_id: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> rusqlite::Result<Vec<BlockedSlot>> {
    let mut stmt = conn.prepare(
        "SELECT id, business_id, start_time, end_time, reason FROM blocked_slots
         WHERE business_id = ?1 AND start_time < ?3 AND end_time > ?2
         ORDER BY start_time ASC",
    )?;
    let rows = stmt.query_map(params![business_id, format_ts(start), format_ts(end)], |row| {
        Ok(BlockedSlot {
            id: row.get(0)?,
            business_id: row.get(1)?,
            start_time: ts_at(row, 2)?,
            end_time: ts_at(row, 3)?,
            reason: row.get(4)?,
        })
    })?;
    rows.collect()
}

// ── Appointments ──

const APPOINTMENT_COLUMNS: &str = "id, external_id, business_id, customer_name, customer_email, customer_phone, \
     service_name, start_time, end_time, location, customer_notes, vehicle_make_model, web_meeting_url, \
     status, previous_external_id, cancellation_type, was_edited, if_edited, edited_by, source, raw_payload, \
     created_at, updated_at";

fn parse_appointment_row(row: &Row) -> rusqlite::Result<Appointment> {
    let status_str: String = row.get(13)?;
    let status = AppointmentStatus::parse(&status_str)
        .ok_or_else(|| conversion_error(13, format!("unknown status: {status_str}")))?;
    let cancellation_type: Option<String> = row.get(15)?;
    let source: String = row.get(19)?;
    let raw_payload: Option<String> = row.get(20)?;

    Ok(Appointment {
        id: row.get(0)?,
        external_id: row.get(1)?,
        business_id: row.get(2)?,
        customer_name: row.get(3)?,
        customer_email: row.get(4)?,
        customer_phone: row.get(5)?,
        service_name: row.get(6)?,
        start_time: ts_at(row, 7)?,
        end_time: ts_at(row, 8)?,
        location: row.get(9)?,
        customer_notes: row.get(10)?,
        vehicle_make_model: row.get(11)?,
        web_meeting_url: row.get(12)?,
        status,
        previous_external_id: row.get(14)?,
        cancellation_type: cancellation_type.as_deref().and_then(CancellationType::parse),
        was_edited: row.get::<_, i32>(16)? != 0,
        if_edited: row.get::<_, i32>(17)? != 0,
        edited_by: row.get(18)?,
        source: AppointmentSource::parse(&source)
            .ok_or_else(|| conversion_error(19, format!("unknown source: {source}")))?,
        raw_payload: raw_payload.and_then(|raw| serde_json::from_str(&raw).ok()),
        created_at: ts_at(row, 21)?,
        updated_at: ts_at(row, 22)?,
    })
}

/// Insert-or-overwrite keyed on `(business_id, external_id)`. Returns the row id.
pub fn upsert_appointment(conn: &Connection, appt: &Appointment) -> rusqlite::Result<i64> {
    let raw_payload = appt
        .raw_payload
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

    conn.query_row(
        "INSERT INTO appointments (external_id, business_id, customer_name, customer_email, customer_phone,
            service_name, start_time, end_time, location, customer_notes, vehicle_make_model, web_meeting_url,
            status, previous_external_id, cancellation_type, was_edited, if_edited, edited_by, source, raw_payload,
            created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)
         ON CONFLICT(business_id, external_id) DO UPDATE SET
           customer_name = excluded.customer_name,
           customer_email = excluded.customer_email,
           customer_phone = excluded.customer_phone,
           service_name = excluded.service_name,
           start_time = excluded.start_time,
           end_time = excluded.end_time,
           location = excluded.location,
           customer_notes = excluded.customer_notes,
           vehicle_make_model = excluded.vehicle_make_model,
           web_meeting_url = excluded.web_meeting_url,
           status = excluded.status,
           previous_external_id = excluded.previous_external_id,
           cancellation_type = excluded.cancellation_type,
           was_edited = excluded.was_edited,
           if_edited = excluded.if_edited,
           edited_by = excluded.edited_by,
           source = excluded.source,
           raw_payload = excluded.raw_payload,
           updated_at = excluded.updated_at
         RETURNING id",
        params![
            appt.external_id,
            appt.business_id,
            appt.customer_name,
            appt.customer_email,
            appt.customer_phone,
            appt.service_name,
            format_ts(&appt.start_time),
            format_ts(&appt.end_time),
            appt.location,
            appt.customer_notes,
            appt.vehicle_make_model,
            appt.web_meeting_url,
            appt.status.as_str(),
            appt.previous_external_id,
            appt.cancellation_type.map(|c| c.as_str()),
            appt.was_edited as i32,
            appt.if_edited as i32,
            appt.edited_by,
            appt.source.as_str(),
            raw_payload,
            format_ts(&appt.created_at),
            format_ts(&appt.updated_at),
        ],
        |row| row.get(0),
    )
}

pub fn get_appointment(
    conn: &Connection,
    business_id: &str,
    external_id: &str,
) -> rusqlite::Result<Option<Appointment>> {
    conn.query_row(
        &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE business_id = ?1 AND external_id = ?2"),
        params![business_id, external_id],
        parse_appointment_row,
    )
    .optional()
}

pub fn list_appointments(
    conn: &Connection,
    business_id: &str,
    status: Option<AppointmentStatus>,
    limit: i64,
) -> rusqlite::Result<Vec<Appointment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE business_id = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY start_time DESC, id DESC LIMIT ?3"
    ))?;
    let rows = stmt.query_map(
        params![business_id, status.map(|s| s.as_str()), limit],
        parse_appointment_row,
    )?;
    rows.collect()
}

/// BOOKED/CONFIRMED appointments intersecting `[start, end)`.
pub fn get_blocking_appointments_in_range(
    conn: &Connection,
    business_id: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> rusqlite::Result<Vec<Appointment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE business_id = ?1 AND status IN ('BOOKED', 'CONFIRMED')
           AND start_time < ?3 AND end_time > ?2
         ORDER BY start_time ASC"
    ))?;
    let rows = stmt.query_map(
        params![business_id, format_ts(start), format_ts(end)],
        parse_appointment_row,
    )?;
    rows.collect()
}

/// Most recent cancellation for this customer, updated at or after `since`,
/// that no other appointment already names as its predecessor.
pub fn find_reschedule_predecessor(
    conn: &Connection,
    business_id: &str,
    customer_email: &str,
    exclude_external_id: &str,
    since: &NaiveDateTime,
) -> rusqlite::Result<Option<Appointment>> {
    conn.query_row(
        &format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments a
             WHERE a.business_id = ?1
               AND a.status = 'CANCELLED'
               AND lower(a.customer_email) = lower(?2)
               AND a.external_id != ?3
               AND a.updated_at >= ?4
               AND NOT EXISTS (
                   SELECT 1 FROM appointments s
                   WHERE s.business_id = a.business_id AND s.previous_external_id = a.external_id
               )
             ORDER BY a.updated_at DESC, a.id DESC
             LIMIT 1"
        ),
        params![business_id, customer_email.trim(), exclude_external_id, format_ts(since)],
        parse_appointment_row,
    )
    .optional()
}

pub fn get_appointments_by_external_ids(
    conn: &Connection,
    business_id: &str,
    external_ids: &[String],
) -> rusqlite::Result<Vec<Appointment>> {
    if external_ids.is_empty() {
        return Ok(vec![]);
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE business_id = ?1 AND external_id IN ({})",
        placeholders(2, external_ids.len())
    ))?;
    let args = std::iter::once(business_id).chain(external_ids.iter().map(String::as_str));
    let rows = stmt.query_map(params_from_iter(args), parse_appointment_row)?;
    rows.collect()
}

/// Maps each given external id to the appointment that names it as predecessor.
pub fn get_successor_ids(
    conn: &Connection,
    business_id: &str,
    external_ids: &[String],
) -> rusqlite::Result<HashMap<String, String>> {
    if external_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT previous_external_id, external_id FROM appointments
         WHERE business_id = ?1 AND previous_external_id IN ({})
         ORDER BY id ASC",
        placeholders(2, external_ids.len())
    ))?;
    let args = std::iter::once(business_id).chain(external_ids.iter().map(String::as_str));
    let rows = stmt.query_map(params_from_iter(args), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut successors = HashMap::new();
    for row in rows {
        let (previous, next) = row?;
        successors.entry(previous).or_insert(next);
    }
    Ok(successors)
}

// ── History ──
//
// Append and read only. The table's triggers reject UPDATE and DELETE.

const HISTORY_COLUMNS: &str = "id, business_id, appointment_external_id, action, source, previous_data, new_data, \
     changed_by, notes, created_at";

fn snapshot_at(row: &Row, idx: usize) -> rusqlite::Result<Option<AppointmentSnapshot>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|json| serde_json::from_str(&json).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn parse_history_row(row: &Row) -> rusqlite::Result<HistoryRecord> {
    let action: String = row.get(3)?;
    let source: String = row.get(4)?;
    Ok(HistoryRecord {
        id: row.get(0)?,
        business_id: row.get(1)?,
        appointment_external_id: row.get(2)?,
        action: HistoryAction::parse(&action)
            .ok_or_else(|| conversion_error(3, format!("unknown history action: {action}")))?,
        source: HistorySource::parse(&source)
            .ok_or_else(|| conversion_error(4, format!("unknown history source: {source}")))?,
        previous_data: snapshot_at(row, 5)?,
        new_data: snapshot_at(row, 6)?,
        changed_by: row.get(7)?,
        notes: row.get(8)?,
        created_at: ts_at(row, 9)?,
    })
}

pub fn insert_history(
    conn: &Connection,
    record: &NewHistoryRecord,
    created_at: &NaiveDateTime,
) -> rusqlite::Result<i64> {
    let to_json = |snapshot: &Option<AppointmentSnapshot>| {
        snapshot
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
    };
    let previous_data = to_json(&record.previous_data)?;
    let new_data = to_json(&record.new_data)?;

    conn.execute(
        "INSERT INTO appointment_history
            (business_id, appointment_external_id, action, source, previous_data, new_data, changed_by, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.business_id,
            record.appointment_external_id,
            record.action.as_str(),
            record.source.as_str(),
            previous_data,
            new_data,
            record.changed_by,
            record.notes,
            format_ts(created_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_history(
    conn: &Connection,
    business_id: &str,
    external_id: &str,
) -> rusqlite::Result<Vec<HistoryRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {HISTORY_COLUMNS} FROM appointment_history
         WHERE business_id = ?1 AND appointment_external_id = ?2
         ORDER BY created_at ASC, id ASC"
    ))?;
    let rows = stmt.query_map(params![business_id, external_id], parse_history_row)?;
    rows.collect()
}

pub fn get_history_for_appointments(
    conn: &Connection,
    business_id: &str,
    external_ids: &[String],
) -> rusqlite::Result<Vec<HistoryRecord>> {
    if external_ids.is_empty() {
        return Ok(vec![]);
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT {HISTORY_COLUMNS} FROM appointment_history
         WHERE business_id = ?1 AND appointment_external_id IN ({})
         ORDER BY created_at ASC, id ASC",
        placeholders(2, external_ids.len())
    ))?;
    let args = std::iter::once(business_id).chain(external_ids.iter().map(String::as_str));
    let rows = stmt.query_map(params_from_iter(args), parse_history_row)?;
    rows.collect()
}
