use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Booked,
    Confirmed,
    Completed,
    Cancelled,
    Rescheduled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Booked => "BOOKED",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
            AppointmentStatus::Rescheduled => "RESCHEDULED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BOOKED" => Some(AppointmentStatus::Booked),
            "CONFIRMED" => Some(AppointmentStatus::Confirmed),
            "COMPLETED" => Some(AppointmentStatus::Completed),
            "CANCELLED" | "CANCELED" => Some(AppointmentStatus::Cancelled),
            "RESCHEDULED" => Some(AppointmentStatus::Rescheduled),
            _ => None,
        }
    }

    /// Only these occupy time on the calendar.
    pub fn blocks_time(&self) -> bool {
        matches!(self, AppointmentStatus::Booked | AppointmentStatus::Confirmed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CancellationType {
    Reschedule,
    Final,
}

impl CancellationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationType::Reschedule => "reschedule",
            CancellationType::Final => "final",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reschedule" => Some(CancellationType::Reschedule),
            "final" => Some(CancellationType::Final),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentSource {
    WebhookBooked,
    WebhookEdited,
    WebhookCanceled,
    WebhookRescheduled,
    CustomerEdited,
    Manual,
    User,
}

impl AppointmentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentSource::WebhookBooked => "webhook_booked",
            AppointmentSource::WebhookEdited => "webhook_edited",
            AppointmentSource::WebhookCanceled => "webhook_canceled",
            AppointmentSource::WebhookRescheduled => "webhook_rescheduled",
            AppointmentSource::CustomerEdited => "customer_edited",
            AppointmentSource::Manual => "manual",
            AppointmentSource::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "webhook_booked" => Some(AppointmentSource::WebhookBooked),
            "webhook_edited" => Some(AppointmentSource::WebhookEdited),
            "webhook_canceled" => Some(AppointmentSource::WebhookCanceled),
            "webhook_rescheduled" => Some(AppointmentSource::WebhookRescheduled),
            "customer_edited" => Some(AppointmentSource::CustomerEdited),
            "manual" => Some(AppointmentSource::Manual),
            "user" => Some(AppointmentSource::User),
            _ => None,
        }
    }
}

/// The fields subject to edit detection. Anything not listed here (times,
/// status, lineage) never makes an appointment read as EDITED.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InfoField {
    CustomerName,
    CustomerEmail,
    CustomerPhone,
    ServiceName,
    Location,
    CustomerNotes,
    VehicleMakeModel,
    WebMeetingUrl,
}

impl InfoField {
    pub const ALL: [InfoField; 8] = [
        InfoField::CustomerName,
        InfoField::CustomerEmail,
        InfoField::CustomerPhone,
        InfoField::ServiceName,
        InfoField::Location,
        InfoField::CustomerNotes,
        InfoField::VehicleMakeModel,
        InfoField::WebMeetingUrl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InfoField::CustomerName => "customer_name",
            InfoField::CustomerEmail => "customer_email",
            InfoField::CustomerPhone => "customer_phone",
            InfoField::ServiceName => "service_name",
            InfoField::Location => "location",
            InfoField::CustomerNotes => "customer_notes",
            InfoField::VehicleMakeModel => "vehicle_make_model",
            InfoField::WebMeetingUrl => "web_meeting_url",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InfoFields {
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub service_name: Option<String>,
    pub location: Option<String>,
    pub customer_notes: Option<String>,
    pub vehicle_make_model: Option<String>,
    pub web_meeting_url: Option<String>,
}

impl InfoFields {
    pub fn get(&self, field: InfoField) -> Option<&str> {
        let value = match field {
            InfoField::CustomerName => &self.customer_name,
            InfoField::CustomerEmail => &self.customer_email,
            InfoField::CustomerPhone => &self.customer_phone,
            InfoField::ServiceName => &self.service_name,
            InfoField::Location => &self.location,
            InfoField::CustomerNotes => &self.customer_notes,
            InfoField::VehicleMakeModel => &self.vehicle_make_model,
            InfoField::WebMeetingUrl => &self.web_meeting_url,
        };
        normalized(value.as_deref())
    }

    /// Fields whose values differ. Blank strings compare equal to missing ones.
    pub fn diff(&self, other: &InfoFields) -> Vec<InfoField> {
        InfoField::ALL
            .into_iter()
            .filter(|f| self.get(*f) != other.get(*f))
            .collect()
    }
}

fn normalized(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: i64,
    pub external_id: String,
    pub business_id: String,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub service_name: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub location: Option<String>,
    pub customer_notes: Option<String>,
    pub vehicle_make_model: Option<String>,
    pub web_meeting_url: Option<String>,
    pub status: AppointmentStatus,
    pub previous_external_id: Option<String>,
    pub cancellation_type: Option<CancellationType>,
    pub was_edited: bool,
    pub if_edited: bool,
    pub edited_by: Option<String>,
    pub source: AppointmentSource,
    pub raw_payload: Option<serde_json::Value>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Appointment {
    pub fn info(&self) -> InfoFields {
        InfoFields {
            customer_name: Some(self.customer_name.clone()),
            customer_email: self.customer_email.clone(),
            customer_phone: self.customer_phone.clone(),
            service_name: Some(self.service_name.clone()),
            location: self.location.clone(),
            customer_notes: self.customer_notes.clone(),
            vehicle_make_model: self.vehicle_make_model.clone(),
            web_meeting_url: self.web_meeting_url.clone(),
        }
    }

    /// Overwrites info fields with `info`. The two required names are only
    /// replaced when the incoming value is non-blank.
    pub fn apply_info(&mut self, info: &InfoFields) {
        if let Some(name) = info.get(InfoField::CustomerName) {
            self.customer_name = name.to_string();
        }
        if let Some(service) = info.get(InfoField::ServiceName) {
            self.service_name = service.to_string();
        }
        self.customer_email = info.customer_email.clone();
        self.customer_phone = info.customer_phone.clone();
        self.location = info.location.clone();
        self.customer_notes = info.customer_notes.clone();
        self.vehicle_make_model = info.vehicle_make_model.clone();
        self.web_meeting_url = info.web_meeting_url.clone();
    }

    pub fn snapshot(&self) -> AppointmentSnapshot {
        AppointmentSnapshot {
            info: self.info(),
            start_time: self.start_time,
            end_time: self.end_time,
            status: self.status,
            cancellation_type: self.cancellation_type,
            previous_external_id: self.previous_external_id.clone(),
        }
    }
}

/// Field image stored in history rows as `previous_data` / `new_data`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentSnapshot {
    #[serde(flatten)]
    pub info: InfoFields,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub status: AppointmentStatus,
    pub cancellation_type: Option<CancellationType>,
    pub previous_external_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisplayStatus {
    Edited,
    Rescheduled,
}

/// The slice of a predecessor shown next to a rescheduled appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreviousAppointment {
    pub external_id: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub location: Option<String>,
    pub service_name: String,
    pub cancellation_type: Option<CancellationType>,
}

/// An appointment as handed to the dashboard: the stored row plus read-time
/// annotations that are never persisted.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub display_status: Option<DisplayStatus>,
    pub previous_appointment: Option<PreviousAppointment>,
    pub next_external_id: Option<String>,
    pub effective_cancellation_type: Option<CancellationType>,
}
