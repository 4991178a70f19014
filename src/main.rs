//! Folio server entry point

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use folio::{api, api::AppState, cache::create_cache, config::Config, db};

const RETENTION_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "folio=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Folio {}", api::admin::APP_VERSION);

    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!(applied, "Database migrations completed");

    let cache = create_cache(&config.cache).await?;
    tracing::info!("Cache initialized");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let sweep_interval = Duration::from_secs(config.security.sweep_interval_seconds.max(1));
    let state = AppState::new(config, pool, cache)?;

    spawn_sweeper(state.clone(), sweep_interval);
    spawn_retention(state.clone());

    let app = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Drop expired limiter windows, CSRF tokens and sessions
fn spawn_sweeper(state: AppState, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let windows = state.api_limiter.sweep().await
                + state.contact_limiter.sweep().await
                + state.user_service.login_limiter().sweep().await;
            let tokens = state.csrf.sweep().await;
            match state.user_service.cleanup_expired_sessions().await {
                Ok(sessions) => {
                    tracing::debug!(windows, tokens, sessions, "Swept expired state")
                }
                Err(e) => tracing::warn!("Failed to clean up expired sessions: {}", e),
            }
        }
    });
}

fn spawn_retention(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RETENTION_INTERVAL);
        loop {
            interval.tick().await;
            match state.analytics_service.apply_retention().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Pruned old analytics events"),
                Err(e) => tracing::warn!("Analytics retention failed: {}", e),
            }
        }
    });
}
