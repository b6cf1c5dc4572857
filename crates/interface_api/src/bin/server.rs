//! Settlement Engine - API Server Binary
//!
//! # Usage
//!
//! ```bash
//! API_PORT=8080 API_DATABASE_URL=postgres://... cargo run --bin harvest-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` - Server host (default: 0.0.0.0)
//! * `API_PORT` - Server port (default: 8080)
//! * `API_DATABASE_URL` - PostgreSQL connection string
//! * `API_DB_MAX_CONNECTIONS` - Pool size (default: 10)
//! * `API_LOCK_TIMEOUT_MS` - Row lock wait before a retryable conflict (default: 5000)
//! * `API_LOG_LEVEL` - Log level when `RUST_LOG` is unset (default: info)
//! * `API_JSON_LOGS` - Emit JSON log lines (default: false)
//! * `API_DEFAULT_DEDUCTION_CAP_PERCENT` - Advance deduction cap (default: 20)
//! * `API_DEFAULT_RANGE_DAYS` - Default settlement window (default: 15)
//! * `API_DISPATCH_TIMEOUT_MS` - Per-step dispatch timeout (default: 10000)
//! * `API_CONFLICT_RETRY_ATTEMPTS` - Attempts on a lost lock race (default: 3)
//! * `API_STATEMENT_DIR` - Directory statements are written to
//! * `API_STATEMENT_URL_PREFIX` - URL prefix statements are served under
//! * `API_CURRENCY` - Currency code for statements and SMS (default: INR)

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domain_settlement::{Dispatcher, FileStatementRenderer, LogNotifier, SettlementService};
use infra_db::{run_migrations, PostgresSettlementStore};
use interface_api::{config::ApiConfig, create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env().context("loading API configuration")?;
    init_tracing(&config.log_level, config.json_logs);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        "Starting settlement API server"
    );

    let settlement_config = config.settlement_config()?;

    let store = PostgresSettlementStore::connect(&config.database_config()).await?;
    run_migrations(store.pool()).await?;

    let dispatcher = Dispatcher::new(
        Arc::new(FileStatementRenderer::new(&config.statement_dir, &config.statement_url_prefix)),
        Arc::new(LogNotifier),
        settlement_config.dispatch_timeout,
    );
    let service = SettlementService::new(Arc::new(store), settlement_config).with_dispatcher(dispatcher);

    let app = create_router(Arc::new(service));
    let addr: SocketAddr = config.server_addr().parse()?;

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber; `RUST_LOG` wins over `log_level`
fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Waits for Ctrl+C or SIGTERM so in-flight requests can finish
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
