pub mod appointments;
pub mod availability;
pub mod business;
pub mod events;
pub mod health;
pub mod webhook;

use axum::http::HeaderMap;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::StaffMember;

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves the staff member behind `token` and checks they belong to
/// `business_id`. Runs before any read or write on the business.
pub fn authorize_token(
    conn: &Connection,
    token: Option<&str>,
    business_id: &str,
) -> Result<StaffMember, AppError> {
    let token = token.ok_or(AppError::Unauthorized)?;
    let staff = queries::get_staff_by_token(conn, token)?.ok_or(AppError::Unauthorized)?;
    if !queries::is_business_member(conn, business_id, &staff.id)? {
        tracing::warn!(staff_id = %staff.id, business_id, "staff not a member of business");
        return Err(AppError::Forbidden(format!(
            "not a member of business {business_id}"
        )));
    }
    Ok(staff)
}

pub fn authorize(
    conn: &Connection,
    headers: &HeaderMap,
    business_id: &str,
) -> Result<StaffMember, AppError> {
    authorize_token(conn, bearer_token(headers), business_id)
}
