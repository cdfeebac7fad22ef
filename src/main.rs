use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use shopbook::config::AppConfig;
use shopbook::db;
use shopbook::services::notify::http::HttpNotifier;
use shopbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    if config.notify_webhook_url.is_empty() {
        tracing::info!("NOTIFY_WEBHOOK_URL not set, notifications will only be logged");
    } else {
        tracing::info!(url = %config.notify_webhook_url, "posting notifications to webhook");
    }
    let notifier = HttpNotifier::new(config.notify_webhook_url.clone());

    let state = Arc::new(AppState::new(conn, config.clone(), Box::new(notifier)));
    let app = shopbook::app(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
