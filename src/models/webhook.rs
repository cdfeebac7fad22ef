use serde::{Deserialize, Serialize};

/// The subset of the external scheduler's webhook body that reconciliation reads.
#[derive(Debug, Clone, Deserialize)]
pub struct SsaWebhookPayload {
    pub action_verb: Option<String>,
    pub appointment: Option<SsaAppointment>,
    #[serde(default)]
    pub signature: Option<SsaSignature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SsaAppointment {
    /// Sent as a number by some plugin versions and a string by others.
    pub id: Option<serde_json::Value>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub customer_information: SsaCustomerInformation,
    pub appointment_type_title: Option<String>,
    pub public_edit_url: Option<String>,
    #[serde(default)]
    pub team_members: Vec<serde_json::Value>,
    pub location: Option<String>,
    pub web_meeting_url: Option<String>,
    pub rescheduled_from_appointment_id: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SsaCustomerInformation {
    #[serde(rename = "Name", alias = "name")]
    pub name: Option<String>,
    #[serde(rename = "Email", alias = "email")]
    pub email: Option<String>,
    #[serde(rename = "Phone", alias = "phone")]
    pub phone: Option<String>,
    #[serde(rename = "Vehicle Make & Model", alias = "vehicle_make_model")]
    pub vehicle_make_model: Option<String>,
    #[serde(rename = "Note", alias = "notes")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SsaSignature {
    pub webhook_token: Option<String>,
    pub site_url: Option<String>,
}

/// Response body the scheduler uses to confirm delivery.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    pub action: String,
    pub status: String,
    pub external_id: String,
    pub changed: bool,
}

/// Renders an id that may arrive as a JSON number or string.
pub fn id_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
