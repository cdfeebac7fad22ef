use chrono::{Duration, NaiveDateTime};
use rusqlite::{Connection, Transaction};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::webhook::id_to_string;
use crate::models::{
    Appointment, AppointmentNotification, AppointmentSource, AppointmentStatus, CancellationType,
    EventAction, HistoryAction, HistorySource, InfoField, InfoFields, SsaWebhookPayload,
};
use crate::services::history;
use crate::time::parse_timestamp;

/// A webhook event after validation, scoped to a resolved business.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub action: EventAction,
    pub business_id: String,
    pub external_id: String,
    pub info: InfoFields,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub public_edit_url: Option<String>,
    pub team_member: Option<String>,
    pub has_team_members: bool,
    pub previous_external_id: Option<String>,
    pub raw_payload: serde_json::Value,
}

fn required(value: Option<&str>, field: &str) -> Result<String, AppError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation(format!("missing required field: {field}")))
}

fn optional(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn member_name(member: &serde_json::Value) -> Option<String> {
    ["name", "display_name"]
        .iter()
        .find_map(|key| member.get(*key).and_then(|v| v.as_str()))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

impl InboundEvent {
    pub fn from_payload(
        business_id: &str,
        payload: &SsaWebhookPayload,
        raw_payload: serde_json::Value,
    ) -> Result<Self, AppError> {
        let verb = required(payload.action_verb.as_deref(), "action_verb")?;
        let action = EventAction::parse(&verb)
            .ok_or_else(|| AppError::Validation(format!("unknown action_verb: {verb}")))?;

        let appt = payload
            .appointment
            .as_ref()
            .ok_or_else(|| AppError::Validation("missing required field: appointment".to_string()))?;

        let external_id = appt
            .id
            .as_ref()
            .and_then(id_to_string)
            .ok_or_else(|| AppError::Validation("missing required field: appointment.id".to_string()))?;

        let start_raw = required(appt.start_date.as_deref(), "appointment.start_date")?;
        let end_raw = required(appt.end_date.as_deref(), "appointment.end_date")?;
        let start_time = parse_timestamp(&start_raw)
            .ok_or_else(|| AppError::Validation(format!("invalid start_date: {start_raw}")))?;
        let end_time = parse_timestamp(&end_raw)
            .ok_or_else(|| AppError::Validation(format!("invalid end_date: {end_raw}")))?;
        if end_time <= start_time {
            return Err(AppError::Validation(
                "appointment end_date must be after start_date".to_string(),
            ));
        }

        let customer = &appt.customer_information;
        let info = InfoFields {
            customer_name: Some(required(customer.name.as_deref(), "customer_information.Name")?),
            customer_email: optional(customer.email.as_ref()),
            customer_phone: optional(customer.phone.as_ref()),
            service_name: Some(required(
                appt.appointment_type_title.as_deref(),
                "appointment_type_title",
            )?),
            location: optional(appt.location.as_ref()),
            customer_notes: optional(customer.note.as_ref()),
            vehicle_make_model: optional(customer.vehicle_make_model.as_ref()),
            web_meeting_url: optional(appt.web_meeting_url.as_ref()),
        };

        Ok(Self {
            action,
            business_id: business_id.to_string(),
            external_id,
            info,
            start_time,
            end_time,
            public_edit_url: optional(appt.public_edit_url.as_ref()),
            team_member: appt.team_members.iter().find_map(member_name),
            has_team_members: !appt.team_members.is_empty(),
            previous_external_id: appt
                .rescheduled_from_appointment_id
                .as_ref()
                .and_then(id_to_string),
            raw_payload,
        })
    }

    /// Self-serve edits carry the public edit link and no staff markers;
    /// anything else came through the scheduler's admin side.
    pub fn edit_source(&self) -> AppointmentSource {
        if self.public_edit_url.is_some() && !self.has_team_members {
            AppointmentSource::CustomerEdited
        } else {
            AppointmentSource::WebhookEdited
        }
    }

    fn editor(&self) -> String {
        match self.edit_source() {
            AppointmentSource::CustomerEdited => "customer".to_string(),
            _ => self.team_member.clone().unwrap_or_else(|| "staff".to_string()),
        }
    }
}

/// What one mutation did. `history_ids` is empty when nothing changed.
#[derive(Debug, Clone)]
pub struct Transition {
    pub action: EventAction,
    pub appointment: Appointment,
    pub changed_fields: Vec<InfoField>,
    pub history_ids: Vec<i64>,
}

impl Transition {
    pub fn changed(&self) -> bool {
        !self.history_ids.is_empty()
    }

    pub fn unchanged(action: EventAction, appointment: Appointment) -> Self {
        Self {
            action,
            appointment,
            changed_fields: vec![],
            history_ids: vec![],
        }
    }

    pub fn notification(&self) -> AppointmentNotification {
        AppointmentNotification {
            action: self.action,
            appointment: self.appointment.clone(),
            business_id: self.appointment.business_id.clone(),
            changed_fields: self.changed_fields.clone(),
        }
    }
}

/// Applies one inbound event. The appointment write and its history record
/// commit in a single transaction; a storage error leaves neither behind.
/// Callers serialize events per connection, which serializes them per key.
pub fn reconcile(
    conn: &mut Connection,
    event: &InboundEvent,
    now: NaiveDateTime,
    reschedule_window: Duration,
) -> Result<Transition, AppError> {
    let tx = conn.transaction()?;
    let existing = queries::get_appointment(&tx, &event.business_id, &event.external_id)?;

    let transition = match (event.action, existing) {
        (EventAction::Canceled, Some(current)) => cancel_existing(&tx, event, current, now)?,
        (EventAction::Canceled, None) => insert_cancelled(&tx, event, now)?,
        (EventAction::Edited, None) => insert_first_seen_edit(&tx, event, now)?,
        (EventAction::Booked | EventAction::Rescheduled, None) => {
            insert_booking(&tx, event, now, reschedule_window)?
        }
        (_, Some(current)) => apply_changes(&tx, event, current, now)?,
    };

    tx.commit()?;

    tracing::info!(
        business_id = %event.business_id,
        external_id = %event.external_id,
        received = event.action.as_str(),
        resolved = transition.action.as_str(),
        changed = transition.changed(),
        "webhook reconciled"
    );

    Ok(transition)
}

fn new_appointment(event: &InboundEvent, source: AppointmentSource, now: NaiveDateTime) -> Appointment {
    let mut appt = Appointment {
        id: 0,
        external_id: event.external_id.clone(),
        business_id: event.business_id.clone(),
        customer_name: String::new(),
        customer_email: None,
        customer_phone: None,
        service_name: String::new(),
        start_time: event.start_time,
        end_time: event.end_time,
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
        source,
        raw_payload: Some(event.raw_payload.clone()),
        created_at: now,
        updated_at: now,
    };
    appt.apply_info(&event.info);
    appt
}

/// The event's own `rescheduled_from` id, if it names another appointment of
/// this business that no other appointment already succeeds.
fn supplied_predecessor(tx: &Transaction, event: &InboundEvent) -> Result<Option<String>, AppError> {
    let Some(previous) = event.previous_external_id.as_deref() else {
        return Ok(None);
    };
    if previous == event.external_id
        || queries::get_appointment(tx, &event.business_id, previous)?.is_none()
    {
        tracing::warn!(
            business_id = %event.business_id,
            external_id = %event.external_id,
            previous,
            "ignoring unknown rescheduled_from id"
        );
        return Ok(None);
    }
    let successors = queries::get_successor_ids(tx, &event.business_id, &[previous.to_string()])?;
    match successors.get(previous) {
        Some(next) if *next != event.external_id => {
            tracing::warn!(
                business_id = %event.business_id,
                external_id = %event.external_id,
                previous,
                successor = %next,
                "rescheduled_from id already has a successor"
            );
            Ok(None)
        }
        _ => Ok(Some(previous.to_string())),
    }
}

fn find_predecessor(
    tx: &Transaction,
    event: &InboundEvent,
    now: NaiveDateTime,
    reschedule_window: Duration,
) -> Result<Option<String>, AppError> {
    if let Some(previous) = supplied_predecessor(tx, event)? {
        return Ok(Some(previous));
    }
    let Some(email) = event.info.get(InfoField::CustomerEmail) else {
        return Ok(None);
    };
    let since = now - reschedule_window;
    let predecessor = queries::find_reschedule_predecessor(
        tx,
        &event.business_id,
        email,
        &event.external_id,
        &since,
    )?;
    Ok(predecessor.map(|p| p.external_id))
}

fn insert_booking(
    tx: &Transaction,
    event: &InboundEvent,
    now: NaiveDateTime,
    reschedule_window: Duration,
) -> Result<Transition, AppError> {
    let predecessor = find_predecessor(tx, event, now, reschedule_window)?;

    let rescheduled = predecessor.is_some() || event.action == EventAction::Rescheduled;
    let (action, source, history_action) = if rescheduled {
        (
            EventAction::Rescheduled,
            AppointmentSource::WebhookRescheduled,
            HistoryAction::Reschedule,
        )
    } else {
        (EventAction::Booked, AppointmentSource::WebhookBooked, HistoryAction::Booked)
    };

    let mut appt = new_appointment(event, source, now);
    appt.previous_external_id = predecessor.clone();
    appt.id = queries::upsert_appointment(tx, &appt)?;

    let mut record = history::entry(&appt, history_action, HistorySource::Webhook, None);
    record.notes = predecessor.map(|prev| format!("Rescheduled from appointment {prev}"));
    let history_id = history::append(tx, &record, &now)?;

    Ok(Transition {
        action,
        appointment: appt,
        changed_fields: vec![],
        history_ids: vec![history_id],
    })
}

fn insert_first_seen_edit(
    tx: &Transaction,
    event: &InboundEvent,
    now: NaiveDateTime,
) -> Result<Transition, AppError> {
    let source = event.edit_source();
    let mut appt = new_appointment(event, source, now);
    appt.id = queries::upsert_appointment(tx, &appt)?;

    let mut record = history::entry(&appt, HistoryAction::Create, source.into(), None);
    record.notes = Some("First seen through an edited event".to_string());
    let history_id = history::append(tx, &record, &now)?;

    Ok(Transition {
        action: EventAction::Edited,
        appointment: appt,
        changed_fields: vec![],
        history_ids: vec![history_id],
    })
}

fn insert_cancelled(
    tx: &Transaction,
    event: &InboundEvent,
    now: NaiveDateTime,
) -> Result<Transition, AppError> {
    let mut appt = new_appointment(event, AppointmentSource::WebhookCanceled, now);
    appt.status = AppointmentStatus::Cancelled;
    appt.cancellation_type = Some(CancellationType::Final);
    appt.id = queries::upsert_appointment(tx, &appt)?;

    let record = history::entry(&appt, HistoryAction::Cancelled, HistorySource::Webhook, None);
    let history_id = history::append(tx, &record, &now)?;

    Ok(Transition {
        action: EventAction::Canceled,
        appointment: appt,
        changed_fields: vec![],
        history_ids: vec![history_id],
    })
}

fn cancel_existing(
    tx: &Transaction,
    event: &InboundEvent,
    current: Appointment,
    now: NaiveDateTime,
) -> Result<Transition, AppError> {
    if current.status == AppointmentStatus::Cancelled {
        return Ok(Transition::unchanged(EventAction::Canceled, current));
    }

    let before = current.snapshot();
    let mut appt = current;
    appt.status = AppointmentStatus::Cancelled;
    appt.cancellation_type = Some(CancellationType::Final);
    appt.source = AppointmentSource::WebhookCanceled;
    appt.raw_payload = Some(event.raw_payload.clone());
    appt.updated_at = now;
    queries::upsert_appointment(tx, &appt)?;

    let record = history::entry(&appt, HistoryAction::Cancel, HistorySource::Webhook, Some(before));
    let history_id = history::append(tx, &record, &now)?;

    Ok(Transition {
        action: EventAction::Canceled,
        appointment: appt,
        changed_fields: vec![],
        history_ids: vec![history_id],
    })
}

/// Edit detection for an appointment already on file. Re-delivered `booked`
/// and `rescheduled` events land here too. Status is never touched.
fn apply_changes(
    tx: &Transaction,
    event: &InboundEvent,
    current: Appointment,
    now: NaiveDateTime,
) -> Result<Transition, AppError> {
    let changed_fields = current.info().diff(&event.info);
    let times_changed = current.start_time != event.start_time || current.end_time != event.end_time;
    let predecessor = if event.action == EventAction::Rescheduled && current.previous_external_id.is_none() {
        supplied_predecessor(tx, event)?
    } else {
        None
    };
    let links_predecessor = predecessor.is_some();

    if changed_fields.is_empty() && !times_changed && !links_predecessor {
        return Ok(Transition::unchanged(event.action, current));
    }

    let before = current.snapshot();
    let mut appt = current;
    appt.apply_info(&event.info);
    appt.start_time = event.start_time;
    appt.end_time = event.end_time;
    appt.raw_payload = Some(event.raw_payload.clone());
    appt.updated_at = now;

    let (action, history_action) = if !changed_fields.is_empty() {
        appt.was_edited = true;
        appt.if_edited = true;
        appt.edited_by = Some(event.editor());
        appt.source = event.edit_source();
        (EventAction::Edited, HistoryAction::Edit)
    } else if links_predecessor {
        appt.source = AppointmentSource::WebhookRescheduled;
        (EventAction::Rescheduled, HistoryAction::Reschedule)
    } else {
        appt.source = match event.action {
            EventAction::Edited => event.edit_source(),
            EventAction::Rescheduled => AppointmentSource::WebhookRescheduled,
            _ => appt.source,
        };
        (event.action, HistoryAction::Update)
    };
    if links_predecessor {
        appt.previous_external_id = predecessor;
    }

    queries::upsert_appointment(tx, &appt)?;

    let mut record = history::entry(&appt, history_action, appt.source.into(), Some(before));
    record.changed_by = appt.edited_by.clone().filter(|_| history_action == HistoryAction::Edit);
    let history_id = history::append(tx, &record, &now)?;

    Ok(Transition {
        action,
        appointment: appt,
        changed_fields,
        history_ids: vec![history_id],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::Business;
    use crate::services::display;

    fn setup_db() -> Connection {
        let conn = db::init_db(":memory:").unwrap();
        queries::create_business(
            &conn,
            &Business {
                id: "shop".to_string(),
                name: "Shop".to_string(),
                webhook_token: Some("tok".to_string()),
                site_url: None,
            },
        )
        .unwrap();
        conn
    }

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    fn payload(verb: &str, id: &str, email: &str, phone: &str) -> serde_json::Value {
        serde_json::json!({
            "action_verb": verb,
            "appointment": {
                "id": id,
                "start_date": "2025-06-16 14:00:00",
                "end_date": "2025-06-16 15:00:00",
                "status": "booked",
                "appointment_type_title": "Oil change",
                "customer_information": {
                    "Name": "Dana Reyes",
                    "Email": email,
                    "Phone": phone,
                    "Vehicle Make & Model": "Honda Civic"
                }
            }
        })
    }

    fn event(raw: serde_json::Value) -> InboundEvent {
        let parsed: SsaWebhookPayload = serde_json::from_value(raw.clone()).unwrap();
        InboundEvent::from_payload("shop", &parsed, raw).unwrap()
    }

    fn run(conn: &mut Connection, raw: serde_json::Value, now: &str) -> Transition {
        reconcile(conn, &event(raw), ts(now), Duration::hours(24)).unwrap()
    }

    fn history_count(conn: &Connection, external_id: &str, action: HistoryAction) -> usize {
        queries::get_history(conn, "shop", external_id)
            .unwrap()
            .into_iter()
            .filter(|r| r.action == action)
            .count()
    }

    #[test]
    fn test_booked_inserts_with_history() {
        let mut conn = setup_db();
        let t = run(&mut conn, payload("booked", "123", "dana@example.com", "555-0100"), "2025-06-10 09:00:00");

        assert_eq!(t.action, EventAction::Booked);
        assert!(t.changed());
        let stored = queries::get_appointment(&conn, "shop", "123").unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Booked);
        assert_eq!(stored.source, AppointmentSource::WebhookBooked);
        assert_eq!(stored.vehicle_make_model.as_deref(), Some("Honda Civic"));
        assert!(stored.raw_payload.is_some());
        assert_eq!(history_count(&conn, "123", HistoryAction::Booked), 1);
    }

    #[test]
    fn test_edit_then_replay_writes_one_edit_record() {
        let mut conn = setup_db();
        run(&mut conn, payload("booked", "123", "dana@example.com", "555-0100"), "2025-06-10 09:00:00");

        let first = run(&mut conn, payload("edited", "123", "dana@example.com", "555-0199"), "2025-06-10 10:00:00");
        assert_eq!(first.action, EventAction::Edited);
        assert_eq!(first.changed_fields, vec![InfoField::CustomerPhone]);

        let replay = run(&mut conn, payload("edited", "123", "dana@example.com", "555-0199"), "2025-06-10 10:05:00");
        assert!(!replay.changed());

        assert_eq!(history_count(&conn, "123", HistoryAction::Edit), 1);
        let stored = queries::get_appointment(&conn, "shop", "123").unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Booked);
        assert!(stored.was_edited && stored.if_edited);
        assert_eq!(stored.customer_phone.as_deref(), Some("555-0199"));

        let view = display::project_one(&conn, &stored).unwrap();
        assert_eq!(view.display_status, Some(crate::models::DisplayStatus::Edited));
    }

    #[test]
    fn test_booked_redelivery_is_a_no_op() {
        let mut conn = setup_db();
        run(&mut conn, payload("booked", "123", "dana@example.com", "555-0100"), "2025-06-10 09:00:00");
        let again = run(&mut conn, payload("booked", "123", "dana@example.com", "555-0100"), "2025-06-10 09:01:00");

        assert!(!again.changed());
        assert_eq!(queries::get_history(&conn, "shop", "123").unwrap().len(), 1);
    }

    #[test]
    fn test_booked_redelivery_with_new_info_is_an_edit() {
        let mut conn = setup_db();
        run(&mut conn, payload("booked", "123", "dana@example.com", "555-0100"), "2025-06-10 09:00:00");
        let again = run(&mut conn, payload("booked", "123", "dana@example.com", "555-0177"), "2025-06-10 09:30:00");

        assert_eq!(again.action, EventAction::Edited);
        assert_eq!(again.changed_fields, vec![InfoField::CustomerPhone]);
        assert_eq!(history_count(&conn, "123", HistoryAction::Booked), 1);
        assert_eq!(history_count(&conn, "123", HistoryAction::Edit), 1);
        let stored = queries::get_appointment(&conn, "shop", "123").unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Booked);
        assert_eq!(stored.customer_phone.as_deref(), Some("555-0177"));
        assert!(stored.was_edited);
    }

    #[test]
    fn test_customer_edit_source_detection() {
        let mut conn = setup_db();
        run(&mut conn, payload("booked", "123", "dana@example.com", "555-0100"), "2025-06-10 09:00:00");

        let mut raw = payload("edited", "123", "dana@example.com", "555-0111");
        raw["appointment"]["public_edit_url"] = serde_json::json!("https://shop.example/edit/abc");
        let t = run(&mut conn, raw, "2025-06-10 10:00:00");
        assert_eq!(t.appointment.source, AppointmentSource::CustomerEdited);
        assert_eq!(t.appointment.edited_by.as_deref(), Some("customer"));

        let mut raw = payload("edited", "123", "dana@example.com", "555-0122");
        raw["appointment"]["public_edit_url"] = serde_json::json!("https://shop.example/edit/abc");
        raw["appointment"]["team_members"] = serde_json::json!([{ "name": "Sam" }]);
        let t = run(&mut conn, raw, "2025-06-10 11:00:00");
        assert_eq!(t.appointment.source, AppointmentSource::WebhookEdited);
        assert_eq!(t.appointment.edited_by.as_deref(), Some("Sam"));

        let trail = queries::get_history(&conn, "shop", "123").unwrap();
        assert_eq!(trail[1].source, HistorySource::Customer);
        assert_eq!(trail[2].source, HistorySource::Webhook);
    }

    #[test]
    fn test_time_only_change_is_an_update_not_an_edit() {
        let mut conn = setup_db();
        run(&mut conn, payload("booked", "123", "dana@example.com", "555-0100"), "2025-06-10 09:00:00");

        let mut raw = payload("edited", "123", "dana@example.com", "555-0100");
        raw["appointment"]["start_date"] = serde_json::json!("2025-06-16 15:00:00");
        raw["appointment"]["end_date"] = serde_json::json!("2025-06-16 16:00:00");
        let t = run(&mut conn, raw, "2025-06-10 10:00:00");

        assert!(t.changed());
        assert!(t.changed_fields.is_empty());
        assert_eq!(history_count(&conn, "123", HistoryAction::Update), 1);
        assert_eq!(history_count(&conn, "123", HistoryAction::Edit), 0);
        let stored = queries::get_appointment(&conn, "shop", "123").unwrap().unwrap();
        assert_eq!(stored.start_time, ts("2025-06-16 15:00:00"));
        assert!(!stored.was_edited);
    }

    #[test]
    fn test_cancel_then_rebook_links_lineage() {
        let mut conn = setup_db();
        run(&mut conn, payload("booked", "123", "dana@example.com", "555-0100"), "2025-06-10 09:00:00");
        let cancelled = run(&mut conn, payload("canceled", "123", "dana@example.com", "555-0100"), "2025-06-11 09:00:00");
        assert_eq!(cancelled.appointment.status, AppointmentStatus::Cancelled);
        assert_eq!(cancelled.appointment.cancellation_type, Some(CancellationType::Final));

        let rebooked = run(&mut conn, payload("booked", "456", "DANA@example.com", "555-0100"), "2025-06-11 09:05:00");
        assert_eq!(rebooked.action, EventAction::Rescheduled);
        assert_eq!(rebooked.appointment.previous_external_id.as_deref(), Some("123"));
        assert_eq!(rebooked.appointment.source, AppointmentSource::WebhookRescheduled);

        let trail = queries::get_history(&conn, "shop", "456").unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, HistoryAction::Reschedule);
        assert_eq!(trail[0].notes.as_deref(), Some("Rescheduled from appointment 123"));

        // The cancelled row is not rewritten; it reads as a reschedule.
        let old = queries::get_appointment(&conn, "shop", "123").unwrap().unwrap();
        assert_eq!(old.cancellation_type, Some(CancellationType::Final));
        let old_view = display::project_one(&conn, &old).unwrap();
        assert_eq!(old_view.effective_cancellation_type, Some(CancellationType::Reschedule));
        assert_eq!(old_view.next_external_id.as_deref(), Some("456"));

        let new = queries::get_appointment(&conn, "shop", "456").unwrap().unwrap();
        let view = display::project_one(&conn, &new).unwrap();
        assert_eq!(view.display_status, Some(crate::models::DisplayStatus::Rescheduled));
        assert_eq!(view.previous_appointment.unwrap().external_id, "123");
    }

    #[test]
    fn test_cancellation_links_only_once() {
        let mut conn = setup_db();
        run(&mut conn, payload("booked", "123", "dana@example.com", "555-0100"), "2025-06-10 09:00:00");
        run(&mut conn, payload("canceled", "123", "dana@example.com", "555-0100"), "2025-06-11 09:00:00");
        run(&mut conn, payload("booked", "456", "dana@example.com", "555-0100"), "2025-06-11 09:05:00");

        let third = run(&mut conn, payload("booked", "789", "dana@example.com", "555-0100"), "2025-06-11 09:10:00");
        assert_eq!(third.action, EventAction::Booked);
        assert_eq!(third.appointment.previous_external_id, None);
    }

    #[test]
    fn test_stale_cancellation_outside_window_is_not_linked() {
        let mut conn = setup_db();
        run(&mut conn, payload("booked", "123", "dana@example.com", "555-0100"), "2025-06-01 09:00:00");
        run(&mut conn, payload("canceled", "123", "dana@example.com", "555-0100"), "2025-06-01 10:00:00");

        let later = run(&mut conn, payload("booked", "456", "dana@example.com", "555-0100"), "2025-06-05 10:00:00");
        assert_eq!(later.action, EventAction::Booked);
        assert_eq!(later.appointment.previous_external_id, None);
    }

    #[test]
    fn test_other_customers_cancellation_is_not_linked() {
        let mut conn = setup_db();
        run(&mut conn, payload("booked", "123", "dana@example.com", "555-0100"), "2025-06-10 09:00:00");
        run(&mut conn, payload("canceled", "123", "dana@example.com", "555-0100"), "2025-06-11 09:00:00");

        let other = run(&mut conn, payload("booked", "456", "lee@example.com", "555-0200"), "2025-06-11 09:05:00");
        assert_eq!(other.action, EventAction::Booked);
    }

    fn rescheduled_from(id: &str, previous: Option<&str>) -> serde_json::Value {
        let mut raw = payload("rescheduled", id, "dana@example.com", "555-0100");
        if let Some(previous) = previous {
            raw["appointment"]["rescheduled_from_appointment_id"] = serde_json::json!(previous);
        }
        raw
    }

    #[test]
    fn test_explicit_rescheduled_uses_supplied_predecessor() {
        let mut conn = setup_db();
        // Different email, so only the supplied id can link these.
        run(&mut conn, payload("booked", "123", "lee@example.com", "555-0200"), "2025-06-10 09:00:00");
        run(&mut conn, payload("canceled", "123", "lee@example.com", "555-0200"), "2025-06-11 09:00:00");

        let t = run(&mut conn, rescheduled_from("456", Some("123")), "2025-06-11 09:05:00");
        assert_eq!(t.action, EventAction::Rescheduled);
        assert_eq!(t.appointment.previous_external_id.as_deref(), Some("123"));
    }

    #[test]
    fn test_explicit_rescheduled_without_id_searches_for_predecessor() {
        let mut conn = setup_db();
        run(&mut conn, payload("booked", "123", "dana@example.com", "555-0100"), "2025-06-10 09:00:00");
        run(&mut conn, payload("canceled", "123", "dana@example.com", "555-0100"), "2025-06-11 09:00:00");

        let t = run(&mut conn, rescheduled_from("456", None), "2025-06-11 09:05:00");
        assert_eq!(t.action, EventAction::Rescheduled);
        assert_eq!(t.appointment.source, AppointmentSource::WebhookRescheduled);
        assert_eq!(t.appointment.previous_external_id.as_deref(), Some("123"));
        assert_eq!(history_count(&conn, "456", HistoryAction::Reschedule), 1);

        // Nothing to link: still a reschedule, just without lineage.
        let orphan = run(&mut conn, rescheduled_from("789", None), "2025-06-11 09:10:00");
        assert_eq!(orphan.action, EventAction::Rescheduled);
        assert_eq!(orphan.appointment.previous_external_id, None);
    }

    #[test]
    fn test_unknown_supplied_predecessor_falls_back_to_search() {
        let mut conn = setup_db();
        run(&mut conn, payload("booked", "123", "dana@example.com", "555-0100"), "2025-06-10 09:00:00");
        run(&mut conn, payload("canceled", "123", "dana@example.com", "555-0100"), "2025-06-11 09:00:00");

        let t = run(&mut conn, rescheduled_from("456", Some("999")), "2025-06-11 09:05:00");
        assert_eq!(t.appointment.previous_external_id.as_deref(), Some("123"));
    }

    #[test]
    fn test_supplied_predecessor_with_successor_is_not_linked_twice() {
        let mut conn = setup_db();
        run(&mut conn, payload("booked", "123", "dana@example.com", "555-0100"), "2025-06-10 09:00:00");
        run(&mut conn, payload("canceled", "123", "dana@example.com", "555-0100"), "2025-06-11 09:00:00");
        run(&mut conn, rescheduled_from("456", Some("123")), "2025-06-11 09:05:00");

        let second = run(&mut conn, rescheduled_from("789", Some("123")), "2025-06-11 09:10:00");
        assert_eq!(second.action, EventAction::Rescheduled);
        assert_eq!(second.appointment.previous_external_id, None);

        let successors = queries::get_successor_ids(&conn, "shop", &["123".to_string()]).unwrap();
        assert_eq!(successors.get("123").map(String::as_str), Some("456"));

        // Re-delivering the first successor is still a no-op.
        let replay = run(&mut conn, rescheduled_from("456", Some("123")), "2025-06-11 09:15:00");
        assert!(!replay.changed());
    }

    #[test]
    fn test_repeated_cancel_is_a_no_op() {
        let mut conn = setup_db();
        run(&mut conn, payload("booked", "123", "dana@example.com", "555-0100"), "2025-06-10 09:00:00");
        run(&mut conn, payload("canceled", "123", "dana@example.com", "555-0100"), "2025-06-11 09:00:00");
        let again = run(&mut conn, payload("canceled", "123", "dana@example.com", "555-0100"), "2025-06-11 09:01:00");

        assert!(!again.changed());
        assert_eq!(history_count(&conn, "123", HistoryAction::Cancel), 1);
    }

    #[test]
    fn test_cancel_for_unknown_id_records_cancelled_row() {
        let mut conn = setup_db();
        let t = run(&mut conn, payload("canceled", "777", "dana@example.com", "555-0100"), "2025-06-11 09:00:00");
        assert_eq!(t.appointment.status, AppointmentStatus::Cancelled);
        assert_eq!(history_count(&conn, "777", HistoryAction::Cancelled), 1);
    }

    #[test]
    fn test_malformed_events_are_rejected() {
        let cases = [
            serde_json::json!({ "appointment": { "id": 1 } }),
            serde_json::json!({ "action_verb": "exploded", "appointment": { "id": 1 } }),
            serde_json::json!({ "action_verb": "booked" }),
            serde_json::json!({
                "action_verb": "booked",
                "appointment": { "id": 1, "start_date": "2025-06-16 14:00:00", "end_date": "2025-06-16 13:00:00",
                                 "appointment_type_title": "Oil change", "customer_information": { "Name": "Dana" } }
            }),
            serde_json::json!({
                "action_verb": "booked",
                "appointment": { "id": 1, "start_date": "2025-06-16 14:00:00", "end_date": "2025-06-16 15:00:00",
                                 "appointment_type_title": "Oil change", "customer_information": {} }
            }),
        ];
        for raw in cases {
            let parsed: SsaWebhookPayload = serde_json::from_value(raw.clone()).unwrap();
            let result = InboundEvent::from_payload("shop", &parsed, raw);
            assert!(matches!(result, Err(AppError::Validation(_))));
        }
    }

    #[test]
    fn test_failed_history_write_rolls_back_appointment() {
        let mut conn = setup_db();
        conn.execute_batch(
            "CREATE TRIGGER fail_history BEFORE INSERT ON appointment_history
             BEGIN SELECT RAISE(ABORT, 'history unavailable'); END;",
        )
        .unwrap();

        let result = reconcile(
            &mut conn,
            &event(payload("booked", "123", "dana@example.com", "555-0100")),
            ts("2025-06-10 09:00:00"),
            Duration::hours(24),
        );
        assert!(result.is_err());
        assert!(queries::get_appointment(&conn, "shop", "123").unwrap().is_none());
    }
}
