use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    /// Where appointment notifications are POSTed. Empty means log-only.
    pub notify_webhook_url: String,
    /// How far back a cancellation may sit and still be linked to a new booking.
    pub reschedule_window_hours: i64,
    pub availability_lookahead_days: u32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "shopbook.db".to_string()),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").unwrap_or_default(),
            reschedule_window_hours: env::var("RESCHEDULE_WINDOW_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24),
            availability_lookahead_days: env::var("AVAILABILITY_LOOKAHEAD_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(90),
        }
    }
}
