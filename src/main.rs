//! Usergate - user service

use anyhow::Result;
use std::path::Path;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use usergate::{
    api::{self, AppState},
    config::Config,
    db::{self, repositories::SqlxSessionRepository},
    services::spawn_session_sweeper,
    shutdown::shutdown_signal,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "usergate=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting user service...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool_with_retry(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!(applied, "Database migrations completed");

    // Start the expired-session sweeper
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = spawn_session_sweeper(
        SqlxSessionRepository::boxed(pool.clone()),
        config.session.sweep_interval(),
        shutdown_rx,
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(pool.clone(), config)?;
    let app = api::build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop background work before the pool goes away
    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        tracing::warn!("Session sweeper ended abnormally: {}", e);
    }
    pool.close().await;

    tracing::info!("User service stopped");
    Ok(())
}
