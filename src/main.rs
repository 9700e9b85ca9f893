use secrecy::ExposeSecret;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chapel::api::middleware::session::{create_session_layer, AppState};
use chapel::config::Config;
use chapel::models::Admin;
use chapel::services::password;
use chapel::{db, jobs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chapel=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Chapel server...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    bootstrap_admin(&pool, &config).await?;

    // Uploaded media lives here and is served under /uploads
    tokio::fs::create_dir_all(&config.upload_dir).await?;
    tracing::info!(upload_dir = %config.upload_dir.display(), "Upload directory ready");

    // Create session layer
    let session_layer =
        create_session_layer(pool.clone(), &config.session_secret, &config.base_url).await?;
    tracing::info!("Session layer initialized");

    // Keep the scheduler alive for the lifetime of the server
    let mut scheduler = jobs::start_scheduler(pool.clone(), &config).await?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    // Build application state and router
    let state = AppState::new(pool, config);
    let app = chapel::api::app(state, session_layer);

    tracing::info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!(error = ?e, "Job scheduler did not shut down cleanly");
    }

    Ok(())
}

/// Creates or updates the dashboard account named in the configuration
async fn bootstrap_admin(pool: &sqlx::PgPool, config: &Config) -> anyhow::Result<()> {
    let (Some(username), Some(secret)) = (&config.admin_username, &config.admin_password) else {
        tracing::info!("No admin credentials configured, skipping admin bootstrap");
        return Ok(());
    };

    let hash = password::hash(secret.expose_secret())?;
    let admin = Admin::upsert(pool, username, &hash).await?;
    tracing::info!(admin_id = %admin.id, username = %admin.username, "Admin account ready");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        // Without a signal handler the server runs until killed
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, cleaning up...");
}
