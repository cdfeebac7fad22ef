use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Business {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub webhook_token: Option<String>,
    pub site_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: String,
    pub name: String,
}

/// Opening hours for one weekday, 0 = Sunday through 6 = Saturday.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusinessHours {
    pub weekday: u8,
    pub is_enabled: bool,
    #[serde(with = "crate::time::hhmm")]
    pub open_time: NaiveTime,
    #[serde(with = "crate::time::hhmm")]
    pub close_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedSlot {
    pub id: i64,
    pub business_id: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessService {
    pub name: String,
    pub duration_minutes: i64,
    pub price: Option<f64>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Upper bound for every minute-valued setting and service duration.
pub const MAX_SETTING_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusinessSettings {
    pub appointment_interval_minutes: i64,
    pub buffer_time_minutes: i64,
    /// `None` means no daily cap.
    pub max_appointments_per_day: Option<i64>,
    /// Offset of the business's wall clock from UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for BusinessSettings {
    fn default() -> Self {
        Self {
            appointment_interval_minutes: 30,
            buffer_time_minutes: 0,
            max_appointments_per_day: None,
            utc_offset_minutes: 0,
        }
    }
}

impl BusinessSettings {
    /// Buffer applied around BOOKED/CONFIRMED appointments, clamped to
    /// `0..=MAX_SETTING_MINUTES` so rows written before validation stay usable.
    pub fn buffer_minutes(&self) -> i64 {
        self.buffer_time_minutes.clamp(0, MAX_SETTING_MINUTES)
    }
}
