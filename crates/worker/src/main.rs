use quire_core::config::WikiConfig;
use quire_db::PgWikiStore;
use quire_worker::lock_sweep;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quire_worker=debug,quire_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WikiConfig::from_env().expect("Invalid wiki configuration");
    let interval = lock_sweep::interval_from_env();
    tracing::info!(
        edit_session_window_mins = config.edit_session_window.num_minutes(),
        lock_timeout_mins = config.lock_timeout.num_minutes(),
        "Loaded wiki configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = quire_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    quire_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    quire_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Lock sweep ---
    let store = PgWikiStore::new(pool);
    let cancel = CancellationToken::new();
    let sweep_handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { lock_sweep::run(&store, config, interval, cancel).await }
    });

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl-C handler");
    tracing::info!("Received SIGINT (Ctrl-C), shutting down");

    cancel.cancel();
    if let Err(e) = sweep_handle.await {
        tracing::error!(error = %e, "Lock sweep task failed");
    }
    tracing::info!("Worker stopped");
}
