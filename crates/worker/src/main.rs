use std::sync::Arc;
use std::time::Duration;

use conductor_db::PgExecutionStore;
use conductor_engine::ExecutionEngine;
use conductor_events::EventBus;
use conductor_remote::HttpDispatcher;
use conductor_worker::WorkerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env().expect("Invalid worker configuration");

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "conductor_worker=debug,conductor_engine=debug".into());
    if config.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        remote = %config.remote.base_url,
        max_concurrent = config.engine.max_concurrent,
        poll_interval_ms = config.engine.poll_interval.as_millis() as u64,
        "Loaded worker configuration"
    );

    // --- Database ---
    let pool = conductor_db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    conductor_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    conductor_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Remote engine ---
    let dispatcher =
        HttpDispatcher::new(&config.remote).expect("Failed to build remote engine client");

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let logger_handle = tokio::spawn(conductor_worker::events::log_events(event_bus.subscribe()));

    // --- Engine ---
    let engine = ExecutionEngine::builder(
        Arc::new(PgExecutionStore::new(pool.clone())),
        Arc::new(dispatcher),
    )
    .config(config.engine.clone())
    .event_bus(Arc::clone(&event_bus))
    .build();

    match engine.recover().await {
        Ok(resumed) => tracing::info!(resumed, "Recovery complete"),
        Err(e) => tracing::error!(error = %e, "Recovery failed, continuing with new executions only"),
    }

    engine.start_sweeper();
    tracing::info!("Execution engine running");

    shutdown_signal().await;

    // --- Shutdown ---
    tracing::info!("Shutdown signal received");
    engine.shutdown().await;

    drop(engine);
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), logger_handle).await;

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
