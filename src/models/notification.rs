use serde::{Deserialize, Serialize};

use super::appointment::{Appointment, InfoField};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Booked,
    Edited,
    Canceled,
    Rescheduled,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Booked => "booked",
            EventAction::Edited => "edited",
            EventAction::Canceled => "canceled",
            EventAction::Rescheduled => "rescheduled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "booked" => Some(EventAction::Booked),
            "edited" => Some(EventAction::Edited),
            "canceled" | "cancelled" => Some(EventAction::Canceled),
            "rescheduled" => Some(EventAction::Rescheduled),
            _ => None,
        }
    }
}

/// Emitted once per successful state transition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentNotification {
    pub action: EventAction,
    pub appointment: Appointment,
    pub business_id: String,
    pub changed_fields: Vec<InfoField>,
}
