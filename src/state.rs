use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::AppointmentNotification;
use crate::services::notify::Notifier;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub notifier: Box<dyn Notifier>,
    pub events_tx: broadcast::Sender<AppointmentNotification>,
}

impl AppState {
    pub fn new(conn: Connection, config: AppConfig, notifier: Box<dyn Notifier>) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            db: Arc::new(Mutex::new(conn)),
            config,
            notifier,
            events_tx,
        }
    }

    /// Every write goes through this one connection, so holding the guard
    /// serializes reconciliation for all appointments.
    pub fn db(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.db
            .lock()
            .map_err(|_| AppError::Internal("database lock poisoned".to_string()))
    }
}
