use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::appointment::{AppointmentSnapshot, AppointmentSource};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryAction {
    Create,
    Booked,
    Edit,
    Cancel,
    Cancelled,
    Reschedule,
    Update,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Create => "CREATE",
            HistoryAction::Booked => "BOOKED",
            HistoryAction::Edit => "EDIT",
            HistoryAction::Cancel => "CANCEL",
            HistoryAction::Cancelled => "CANCELLED",
            HistoryAction::Reschedule => "RESCHEDULE",
            HistoryAction::Update => "UPDATE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATE" => Some(HistoryAction::Create),
            "BOOKED" => Some(HistoryAction::Booked),
            "EDIT" => Some(HistoryAction::Edit),
            "CANCEL" => Some(HistoryAction::Cancel),
            "CANCELLED" => Some(HistoryAction::Cancelled),
            "RESCHEDULE" => Some(HistoryAction::Reschedule),
            "UPDATE" => Some(HistoryAction::Update),
            _ => None,
        }
    }
}

/// The coarse origin recorded on ledger rows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistorySource {
    Webhook,
    Customer,
    User,
}

impl HistorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistorySource::Webhook => "webhook",
            HistorySource::Customer => "customer",
            HistorySource::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "webhook" => Some(HistorySource::Webhook),
            "customer" => Some(HistorySource::Customer),
            "user" => Some(HistorySource::User),
            _ => None,
        }
    }
}

impl From<AppointmentSource> for HistorySource {
    fn from(source: AppointmentSource) -> Self {
        match source {
            AppointmentSource::WebhookBooked
            | AppointmentSource::WebhookEdited
            | AppointmentSource::WebhookCanceled
            | AppointmentSource::WebhookRescheduled => HistorySource::Webhook,
            AppointmentSource::CustomerEdited => HistorySource::Customer,
            AppointmentSource::Manual | AppointmentSource::User => HistorySource::User,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    pub id: i64,
    pub business_id: String,
    pub appointment_external_id: String,
    pub action: HistoryAction,
    pub source: HistorySource,
    pub previous_data: Option<AppointmentSnapshot>,
    pub new_data: Option<AppointmentSnapshot>,
    pub changed_by: Option<String>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

/// A ledger row before it has been stored.
#[derive(Debug, Clone)]
pub struct NewHistoryRecord {
    pub business_id: String,
    pub appointment_external_id: String,
    pub action: HistoryAction,
    pub source: HistorySource,
    pub previous_data: Option<AppointmentSnapshot>,
    pub new_data: Option<AppointmentSnapshot>,
    pub changed_by: Option<String>,
    pub notes: Option<String>,
}
