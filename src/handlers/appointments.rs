use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use super::authorize;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{AppointmentStatus, AppointmentView, HistoryRecord};
use crate::services::appointments::{self, AppointmentPatch, CancelRequest, NewAppointmentRequest};
use crate::services::reconciliation::Transition;
use crate::services::{display, history, notify};
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 500;

#[derive(Deserialize)]
pub struct AppointmentsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

// GET /api/businesses/:id/appointments
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
    Query(query): Query<AppointmentsQuery>,
) -> Result<Json<Vec<AppointmentView>>, AppError> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            AppointmentStatus::parse(raw)
                .ok_or_else(|| AppError::Validation(format!("unknown status: {raw}")))?,
        ),
        None => None,
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let db = state.db()?;
    authorize(&db, &headers, &business_id)?;
    let rows = queries::list_appointments(&db, &business_id, status, limit)?;
    Ok(Json(display::project_all(&db, &business_id, &rows)?))
}

/// Projects the committed row, then fans the transition out.
async fn respond(
    state: &Arc<AppState>,
    transition: Transition,
) -> Result<Json<AppointmentView>, AppError> {
    let view = {
        let db = state.db()?;
        display::project_one(&db, &transition.appointment)?
    };
    notify::dispatch(state, &transition).await;
    Ok(Json(view))
}

// POST /api/businesses/:id/appointments
pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
    Json(body): Json<NewAppointmentRequest>,
) -> Result<(StatusCode, Json<AppointmentView>), AppError> {
    let transition = {
        let mut db = state.db()?;
        let staff = authorize(&db, &headers, &business_id)?;
        appointments::create_manual(&mut db, &staff, &business_id, body, Utc::now().naive_utc())?
    };
    let view = respond(&state, transition).await?;
    Ok((StatusCode::CREATED, view))
}

// PATCH /api/businesses/:id/appointments/:external_id
pub async fn update_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((business_id, external_id)): Path<(String, String)>,
    Json(patch): Json<AppointmentPatch>,
) -> Result<Json<AppointmentView>, AppError> {
    let transition = {
        let mut db = state.db()?;
        let staff = authorize(&db, &headers, &business_id)?;
        appointments::update_appointment(
            &mut db,
            &staff,
            &business_id,
            &external_id,
            patch,
            Utc::now().naive_utc(),
        )?
    };
    respond(&state, transition).await
}

// POST /api/businesses/:id/appointments/:external_id/cancel
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((business_id, external_id)): Path<(String, String)>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<AppointmentView>, AppError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let transition = {
        let mut db = state.db()?;
        let staff = authorize(&db, &headers, &business_id)?;
        appointments::cancel_appointment(
            &mut db,
            &staff,
            &business_id,
            &external_id,
            req,
            Utc::now().naive_utc(),
        )?
    };
    respond(&state, transition).await
}

// GET /api/businesses/:id/appointments/:external_id/history
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((business_id, external_id)): Path<(String, String)>,
) -> Result<Json<Vec<HistoryRecord>>, AppError> {
    let db = state.db()?;
    authorize(&db, &headers, &business_id)?;
    if queries::get_appointment(&db, &business_id, &external_id)?.is_none() {
        return Err(AppError::NotFound(format!("appointment {external_id} not found")));
    }
    Ok(Json(history::trail(&db, &business_id, &external_id)?))
}
