//! xavyo certificate authority server
//!
//! Loads the engine configuration, bootstraps issuers over PostgreSQL or the
//! in-memory store, schedules CRL publication and serves the CA API.

mod config;
mod logging;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use xavyo_api_ca::{ca_router, CaState};
use xavyo_ca::{CaConfig, CaService};
use xavyo_ca_db::{run_migrations, CaDb, MemoryCaDb, PgCaDb, SnowflakeIdGenerator};

use config::AppConfig;

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        std::process::exit(1);
    });

    logging::init_logging(&config.log_filter);

    let ca_config = CaConfig::from_file(&config.ca_config_path).unwrap_or_else(|e| {
        error!(path = %config.ca_config_path, error = %e, "Failed to load CA configuration");
        std::process::exit(1);
    });

    info!(
        cluster = %ca_config.cluster_name,
        issuers = ca_config.issuers.len(),
        profiles = ca_config.profiles.len(),
        node_id = config.node_id,
        "Starting certificate authority"
    );

    let db = open_store(&config).await;
    let service = CaService::builder(ca_config)
        .db(db)
        .ids(Arc::new(SnowflakeIdGenerator::new(config.node_id)))
        .build();

    if let Err(e) = service.bootstrap().await {
        error!(error = %e, "Failed to bootstrap issuers");
        std::process::exit(1);
    }
    let service = Arc::new(service);

    let shutdown = CancellationToken::new();
    let schedulers = service.schedule_crl_publishing(&shutdown);
    info!(count = schedulers.len(), "CRL publication scheduled");

    let app = Router::new()
        .merge(ca_router(CaState::new(Arc::clone(&service))))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = match config.bind_addr().parse() {
        Ok(a) => a,
        Err(e) => {
            error!("Invalid bind address '{}': {e}", config.bind_addr());
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to address {addr}: {e}");
            std::process::exit(1);
        }
    };

    info!(%addr, "Server listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
    {
        error!("Server error: {e}");
        shutdown.cancel();
    }

    for handle in schedulers {
        if let Err(e) = handle.await {
            warn!(error = %e, "CRL scheduler ended abnormally");
        }
    }
    service.flush_crl_queue().await;
    info!("Server shutdown complete");
}

/// PostgreSQL when `DATABASE_URL` is set, otherwise the in-memory store.
async fn open_store(config: &AppConfig) -> Arc<dyn CaDb> {
    let Some(url) = config.database_url.as_deref() else {
        warn!("DATABASE_URL not set, certificates are kept in memory only");
        return Arc::new(MemoryCaDb::new());
    };

    let db = PgCaDb::connect(url, config.database_max_connections)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, "Database connection error");
            std::process::exit(1);
        });
    if let Err(e) = run_migrations(db.pool()).await {
        error!(error = %e, "Failed to run migrations");
        std::process::exit(1);
    }
    Arc::new(db)
}

/// Resolve on Ctrl+C or SIGTERM and cancel background work.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        () = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }

    shutdown.cancel();
}
