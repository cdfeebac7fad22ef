use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::authorize;
use crate::db::queries;
use crate::errors::AppError;
use crate::services::availability;
use crate::state::AppState;
use crate::time::to_local;

const MAX_LOOKAHEAD_DAYS: u32 = 366;

fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("invalid date: {raw}")))
}

#[derive(Deserialize)]
pub struct SlotsQuery {
    pub date: String,
    pub service: Option<String>,
}

#[derive(Serialize)]
pub struct SlotsResponse {
    pub date: NaiveDate,
    pub service: Option<String>,
    /// Local wall-clock start times, `HH:MM`.
    pub slots: Vec<String>,
}

// GET /api/businesses/:id/slots?date=YYYY-MM-DD&service=
pub async fn get_slots(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<SlotsResponse>, AppError> {
    let date = parse_date(&query.date)?;

    let db = state.db()?;
    authorize(&db, &headers, &business_id)?;
    let slots = availability::slots_for_date(&db, &business_id, date, query.service.as_deref())?;

    Ok(Json(SlotsResponse {
        date,
        service: query.service.filter(|s| !s.trim().is_empty()),
        slots: slots.iter().map(|t| t.format("%H:%M").to_string()).collect(),
    }))
}

#[derive(Deserialize)]
pub struct AvailableDatesQuery {
    pub days: Option<u32>,
    pub start: Option<String>,
}

#[derive(Serialize)]
pub struct AvailableDatesResponse {
    pub start: NaiveDate,
    pub days: u32,
    pub dates: Vec<NaiveDate>,
}

// GET /api/businesses/:id/available-dates?days=
pub async fn get_available_dates(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(business_id): Path<String>,
    Query(query): Query<AvailableDatesQuery>,
) -> Result<Json<AvailableDatesResponse>, AppError> {
    let days = query
        .days
        .unwrap_or(state.config.availability_lookahead_days)
        .clamp(1, MAX_LOOKAHEAD_DAYS);

    let db = state.db()?;
    authorize(&db, &headers, &business_id)?;

    let start = match query.start.as_deref() {
        Some(raw) => parse_date(raw)?,
        None => {
            let settings = queries::get_settings(&db, &business_id)?;
            to_local(Utc::now().naive_utc(), settings.utc_offset_minutes).date()
        }
    };
    let dates = availability::available_dates(&db, &business_id, start, days)?;

    Ok(Json(AvailableDatesResponse { start, days, dates }))
}
