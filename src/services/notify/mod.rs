pub mod http;

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::AppointmentNotification;
use crate::services::reconciliation::Transition;
use crate::state::AppState;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &AppointmentNotification) -> anyhow::Result<()>;
}

/// Fans a committed transition out to dashboard subscribers and the external
/// notifier. Failures are logged and never reach the caller.
pub async fn dispatch(state: &Arc<AppState>, transition: &Transition) {
    if !transition.changed() {
        return;
    }
    let notification = transition.notification();

    // No receivers is fine.
    let _ = state.events_tx.send(notification.clone());

    match state.notifier.notify(&notification).await {
        Ok(()) => tracing::debug!(
            business_id = %notification.business_id,
            external_id = %notification.appointment.external_id,
            action = notification.action.as_str(),
            "notification sent"
        ),
        Err(e) => tracing::error!(
            business_id = %notification.business_id,
            external_id = %notification.appointment.external_id,
            action = notification.action.as_str(),
            error = %e,
            "notification failed"
        ),
    }
}
