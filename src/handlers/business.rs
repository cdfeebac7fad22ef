use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use super::authorize;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{BlockedSlot, BusinessHours, BusinessService, BusinessSettings, MAX_SETTING_MINUTES};
use crate::state::AppState;
use crate::time::{parse_timestamp, saturating_shift};

const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

// GET /api/businesses/:id/hours
pub async fn get_hours(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
) -> Result<Json<Vec<BusinessHours>>, AppError> {
    let db = state.db()?;
    authorize(&db, &headers, &business_id)?;
    Ok(Json(queries::get_business_hours(&db, &business_id)?))
}

// PUT /api/businesses/:id/hours
pub async fn put_hours(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
    Json(hours): Json<Vec<BusinessHours>>,
) -> Result<Json<Vec<BusinessHours>>, AppError> {
    for h in &hours {
        if h.weekday > 6 {
            return Err(AppError::Validation(format!(
                "weekday must be 0 (Sunday) to 6 (Saturday), got {}",
                h.weekday
            )));
        }
        if h.is_enabled && h.open_time >= h.close_time {
            return Err(AppError::Validation(format!(
                "weekday {}: open_time must be before close_time",
                h.weekday
            )));
        }
    }
    let mut weekdays: Vec<u8> = hours.iter().map(|h| h.weekday).collect();
    weekdays.sort_unstable();
    weekdays.dedup();
    if weekdays.len() != hours.len() {
        return Err(AppError::Validation("duplicate weekday entries".to_string()));
    }

    let db = state.db()?;
    authorize(&db, &headers, &business_id)?;
    queries::replace_business_hours(&db, &business_id, &hours)?;
    tracing::info!(business_id = %business_id, days = hours.len(), "business hours replaced");
    Ok(Json(queries::get_business_hours(&db, &business_id)?))
}

// GET /api/businesses/:id/services
pub async fn get_services(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
) -> Result<Json<Vec<BusinessService>>, AppError> {
    let db = state.db()?;
    authorize(&db, &headers, &business_id)?;
    Ok(Json(queries::get_services(&db, &business_id)?))
}

// PUT /api/businesses/:id/services
pub async fn put_services(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
    Json(services): Json<Vec<BusinessService>>,
) -> Result<Json<Vec<BusinessService>>, AppError> {
    for s in &services {
        if s.name.trim().is_empty() {
            return Err(AppError::Validation("service name is required".to_string()));
        }
        if !(1..=MAX_SETTING_MINUTES).contains(&s.duration_minutes) {
            return Err(AppError::Validation(format!(
                "service {}: duration_minutes must be between 1 and {MAX_SETTING_MINUTES}",
                s.name
            )));
        }
    }

    let db = state.db()?;
    authorize(&db, &headers, &business_id)?;
    queries::replace_services(&db, &business_id, &services)?;
    tracing::info!(business_id = %business_id, count = services.len(), "services replaced");
    Ok(Json(queries::get_services(&db, &business_id)?))
}

// GET /api/businesses/:id/settings
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
) -> Result<Json<BusinessSettings>, AppError> {
    let db = state.db()?;
    authorize(&db, &headers, &business_id)?;
    Ok(Json(queries::get_settings(&db, &business_id)?))
}

// PUT /api/businesses/:id/settings
pub async fn put_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
    Json(settings): Json<BusinessSettings>,
) -> Result<Json<BusinessSettings>, AppError> {
    if !(1..=MAX_SETTING_MINUTES).contains(&settings.appointment_interval_minutes) {
        return Err(AppError::Validation(format!(
            "appointment_interval_minutes must be between 1 and {MAX_SETTING_MINUTES}"
        )));
    }
    if !(0..=MAX_SETTING_MINUTES).contains(&settings.buffer_time_minutes) {
        return Err(AppError::Validation(format!(
            "buffer_time_minutes must be between 0 and {MAX_SETTING_MINUTES}"
        )));
    }
    if settings.max_appointments_per_day.is_some_and(|cap| cap < 1) {
        return Err(AppError::Validation(
            "max_appointments_per_day must be at least 1 (omit it for no cap)".to_string(),
        ));
    }
    if settings.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
        return Err(AppError::Validation("utc_offset_minutes out of range".to_string()));
    }

    let db = state.db()?;
    authorize(&db, &headers, &business_id)?;
    queries::save_settings(&db, &business_id, &settings)?;
    Ok(Json(queries::get_settings(&db, &business_id)?))
}

#[derive(Deserialize)]
pub struct BlockedQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

// GET /api/businesses/:id/blocked-slots
pub async fn get_blocked_slots(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
    Query(query): Query<BlockedQuery>,
) -> Result<Json<Vec<BlockedSlot>>, AppError> {
    let from = match query.from.as_deref() {
        Some(raw) => parse_timestamp(raw)
            .ok_or_else(|| AppError::Validation(format!("invalid from: {raw}")))?,
        None => Utc::now().naive_utc(),
    };
    let to = match query.to.as_deref() {
        Some(raw) => parse_timestamp(raw)
            .ok_or_else(|| AppError::Validation(format!("invalid to: {raw}")))?,
        None => saturating_shift(from, i64::from(state.config.availability_lookahead_days) * 24 * 60),
    };

    let db = state.db()?;
    authorize(&db, &headers, &business_id)?;
    Ok(Json(queries::get_blocked_slots_in_range(&db, &business_id, &from, &to)?))
}

#[derive(Deserialize)]
pub struct NewBlockedSlot {
    pub start_time: String,
    pub end_time: String,
    pub reason: Option<String>,
}

// POST /api/businesses/:id/blocked-slots
pub async fn create_blocked_slot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
    Json(body): Json<NewBlockedSlot>,
) -> Result<(StatusCode, Json<BlockedSlot>), AppError> {
    let start = parse_timestamp(&body.start_time)
        .ok_or_else(|| AppError::Validation(format!("invalid start_time: {}", body.start_time)))?;
    let end = parse_timestamp(&body.end_time)
        .ok_or_else(|| AppError::Validation(format!("invalid end_time: {}", body.end_time)))?;
    if end <= start {
        return Err(AppError::Validation("end_time must be after start_time".to_string()));
    }

    let db = state.db()?;
    authorize(&db, &headers, &business_id)?;
    let reason = body.reason.filter(|r| !r.trim().is_empty());
    let id = queries::add_blocked_slot(&db, &business_id, &start, &end, reason.as_deref())?;

    Ok((
        StatusCode::CREATED,
        Json(BlockedSlot {
            id,
            business_id,
            start_time: start,
            end_time: end,
            reason,
        }),
    ))
}
