//! Covenant Gateway - Main entry point
//!
//! Serves the access-controlled API over Postgres and Redis.

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;

use covenant_core::{
    api::{self, AppState, DependencyProbe},
    cache::RedisCounterStore,
    config::Config,
    db::Database,
    middleware::auth::Authenticator,
    observability,
    rbac::{AccessControlGuard, GuardStores},
};

#[derive(Debug, Parser)]
#[command(name = "covenant-gateway", version, about = "Covenant access-control gateway")]
struct Args {
    /// Configuration file; environment variables override its values
    #[arg(short, long, env = "COVENANT_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Load configuration
    let config = match args.config.as_deref() {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    // Initialize observability
    observability::init(&config.observability)?;
    let metrics = observability::install_metrics()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Covenant Gateway"
    );

    // Connect to database
    let db = Database::connect(&config.database).await?;
    if config.database.run_migrations {
        db.migrate().await?;
    }
    tracing::info!("Connected to database");

    // Connect to Redis
    let counters = RedisCounterStore::connect(&config.redis).await?;

    let directory = Arc::new(db.directory());
    let audit_log = Arc::new(db.audit_log());
    let stores = GuardStores::new(
        directory.clone(),
        directory,
        Arc::new(counters.clone()),
        audit_log.clone(),
    );
    let guard = AccessControlGuard::new(stores, config.guard.clone());
    tracing::info!(
        requests_per_window = config.guard.rate_limit.requests_per_window,
        window_secs = config.guard.rate_limit.window_secs,
        undeclared = ?config.guard.undeclared,
        audit_failure = ?config.guard.audit_failure,
        "Access guard initialized"
    );

    let probes: Vec<Arc<dyn DependencyProbe>> = vec![Arc::new(db.clone()), Arc::new(counters)];

    // Create app state
    let app_state = AppState {
        guard,
        authenticator: Arc::new(Authenticator::new(&config.auth)?),
        audit_reader: audit_log,
        probes,
        metrics: Some(metrics),
        cors_origins: config.server.cors_origins.clone(),
    };

    // Build router
    let app = api::build_router(app_state);

    // Start server
    let addr: SocketAddr = config.bind_address().parse()?;
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Cleanup
    observability::shutdown();
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
