//! qrhunt - campaign and QR-code scavenger hunt administration

use anyhow::Result;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qrhunt::{
    config::Config,
    db::{self, repositories::SqlxSessionRepository},
    services::{CleanupSchedule, CleanupScheduler, SessionPolicy, SessionService},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qrhunt=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting qrhunt...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let session_repo = SqlxSessionRepository::boxed(pool.clone());

    // Lifecycle API for the authentication layer
    let session_service = SessionService::with_policy(
        session_repo.clone(),
        SessionPolicy::from_config(&config.session)?,
    );
    let policy = session_service.policy();
    tracing::info!(
        "Session lifetimes: {}h standard, {}d remember-me",
        policy.standard.num_hours(),
        policy.remember_me.num_days()
    );

    // Start expired-session cleanup
    let cleanup = CleanupScheduler::new(
        session_repo,
        CleanupSchedule::from_config(&config.session.cleanup),
    )
    .spawn();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    cleanup.stop().await;
    pool.close().await;

    tracing::info!("qrhunt stopped");
    Ok(())
}
