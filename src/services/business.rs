use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::Business;

/// `https://Shop.example.com/` and `shop.example.com` name the same site.
pub fn normalize_site_url(url: &str) -> String {
    let trimmed = url.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    without_scheme.trim_end_matches('/').to_ascii_lowercase()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Resolves the business a webhook belongs to.
///
/// Precedence: explicit business id header, then webhook token, then site URL.
/// The first credential present decides; a weaker one is never consulted as a
/// fallback for a stronger one that failed to match.
pub fn resolve_business(
    conn: &Connection,
    header_business_id: Option<&str>,
    webhook_token: Option<&str>,
    site_url: Option<&str>,
) -> Result<Business, AppError> {
    if let Some(id) = non_empty(header_business_id) {
        return queries::get_business(conn, id)?.ok_or(AppError::Unauthorized);
    }

    if let Some(token) = non_empty(webhook_token) {
        return queries::find_business_by_token(conn, token)?.ok_or(AppError::Unauthorized);
    }

    if let Some(url) = non_empty(site_url) {
        let wanted = normalize_site_url(url);
        return queries::list_businesses_with_site_url(conn)?
            .into_iter()
            .find(|b| b.site_url.as_deref().map(normalize_site_url).as_deref() == Some(wanted.as_str()))
            .ok_or(AppError::Unauthorized);
    }

    Err(AppError::Validation(
        "missing business credential: X-Business-Id header, webhook token or site_url".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn setup_db() -> Connection {
        let conn = db::init_db(":memory:").unwrap();
        for (id, token, site) in [
            ("shop", "tok-shop", "https://shop.example.com/"),
            ("garage", "tok-garage", "http://garage.example.com"),
        ] {
            queries::create_business(
                &conn,
                &Business {
                    id: id.to_string(),
                    name: id.to_string(),
                    webhook_token: Some(token.to_string()),
                    site_url: Some(site.to_string()),
                },
            )
            .unwrap();
        }
        conn
    }

    #[test]
    fn test_normalize_site_url() {
        assert_eq!(normalize_site_url("https://Shop.example.com/"), "shop.example.com");
        assert_eq!(normalize_site_url("shop.example.com"), "shop.example.com");
        assert_eq!(normalize_site_url(" http://shop.example.com/wp// "), "shop.example.com/wp");
    }

    #[test]
    fn test_header_beats_token_and_site() {
        let conn = setup_db();
        let b = resolve_business(&conn, Some("garage"), Some("tok-shop"), Some("shop.example.com")).unwrap();
        assert_eq!(b.id, "garage");
    }

    #[test]
    fn test_token_beats_site() {
        let conn = setup_db();
        let b = resolve_business(&conn, None, Some("tok-garage"), Some("shop.example.com")).unwrap();
        assert_eq!(b.id, "garage");
    }

    #[test]
    fn test_site_url_fallback() {
        let conn = setup_db();
        let b = resolve_business(&conn, None, None, Some("http://shop.example.com")).unwrap();
        assert_eq!(b.id, "shop");
    }

    #[test]
    fn test_unmatched_credential_is_unauthorized() {
        let conn = setup_db();
        assert!(matches!(
            resolve_business(&conn, None, Some("wrong"), Some("shop.example.com")),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            resolve_business(&conn, Some("nobody"), None, None),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_missing_credential_is_a_validation_error() {
        let conn = setup_db();
        assert!(matches!(
            resolve_business(&conn, None, Some("  "), None),
            Err(AppError::Validation(_))
        ));
    }
}
