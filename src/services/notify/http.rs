use anyhow::Context;
use async_trait::async_trait;

use super::Notifier;
use crate::models::AppointmentNotification;

/// POSTs each notification as JSON. With no URL configured it only logs.
pub struct HttpNotifier {
    url: String,
    client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, notification: &AppointmentNotification) -> anyhow::Result<()> {
        if self.url.is_empty() {
            tracing::info!(
                business_id = %notification.business_id,
                external_id = %notification.appointment.external_id,
                action = notification.action.as_str(),
                "notification (no endpoint configured)"
            );
            return Ok(());
        }

        self.client
            .post(&self.url)
            .timeout(std::time::Duration::from_secs(10))
            .json(notification)
            .send()
            .await
            .context("failed to send appointment notification")?
            .error_for_status()
            .context("notification endpoint returned error")?;

        Ok(())
    }
}
