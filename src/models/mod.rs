pub mod appointment;
pub mod business;
pub mod history;
pub mod notification;
pub mod webhook;

pub use appointment::{
    Appointment, AppointmentSnapshot, AppointmentSource, AppointmentStatus, AppointmentView,
    CancellationType, DisplayStatus, InfoField, InfoFields, PreviousAppointment,
};
pub use business::{
    BlockedSlot, Business, BusinessHours, BusinessService, BusinessSettings, StaffMember,
    MAX_SETTING_MINUTES,
};
pub use history::{HistoryAction, HistoryRecord, HistorySource, NewHistoryRecord};
pub use notification::{AppointmentNotification, EventAction};
pub use webhook::{SsaWebhookPayload, WebhookAck};
