use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{Duration, Utc};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{SsaWebhookPayload, WebhookAck};
use crate::services::reconciliation::{self, InboundEvent};
use crate::services::{business, notify};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WebhookQuery {
    pub token: Option<String>,
}

// POST /webhook/ssa
pub async fn ssa_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<WebhookQuery>,
    Json(raw): Json<serde_json::Value>,
) -> Result<Json<WebhookAck>, AppError> {
    let payload: SsaWebhookPayload = serde_json::from_value(raw.clone())
        .map_err(|e| AppError::Validation(format!("malformed webhook payload: {e}")))?;

    let header_business_id = headers.get("x-business-id").and_then(|v| v.to_str().ok());
    let signature = payload.signature.clone().unwrap_or_default();
    let token = signature
        .webhook_token
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .or(query.token.as_deref());

    tracing::info!(
        action_verb = payload.action_verb.as_deref().unwrap_or(""),
        "incoming scheduler webhook"
    );

    let transition = {
        let mut db = state.db()?;
        let business = business::resolve_business(
            &db,
            header_business_id,
            token,
            signature.site_url.as_deref(),
        )?;
        let event = InboundEvent::from_payload(&business.id, &payload, raw)?;
        let window = Duration::hours(state.config.reschedule_window_hours);
        reconciliation::reconcile(&mut db, &event, Utc::now().naive_utc(), window)?
    };

    notify::dispatch(&state, &transition).await;

    Ok(Json(WebhookAck {
        success: true,
        action: transition.action.as_str().to_string(),
        status: transition.appointment.status.as_str().to_string(),
        external_id: transition.appointment.external_id.clone(),
        changed: transition.changed(),
    }))
}
