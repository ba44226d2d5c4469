//! API server entry point.

use std::sync::Arc;
use std::time::Duration;

use api::config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use settlement::{HttpInventoryAuthority, HttpPaymentAuthority};
use store::{InMemoryStore, PostgresStore, Store};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Builds the application on `store`, serves it and stops the sweeper on
/// shutdown.
async fn serve<S: Store>(config: Config, store: S, metrics_handle: PrometheusHandle) {
    let resolver = Arc::new(config.resolver());
    let settlement = config.settlement();
    let payments = HttpPaymentAuthority::new(resolver.clone(), settlement.remote_timeout)
        .expect("failed to build payment client");
    let inventory = HttpInventoryAuthority::new(resolver, settlement.remote_timeout)
        .expect("failed to build inventory client");

    let (state, sweeper) = api::create_state(store, payments, inventory, settlement);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper_task = sweeper.spawn(shutdown_rx);

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(Duration::from_secs(10), sweeper_task)
        .await
        .is_err()
    {
        tracing::warn!("pending sweeper did not stop in time");
    }

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    api::routes::metrics::describe();

    // 3. Choose the store and serve
    match config.database_url.clone() {
        Some(url) => {
            let store = PostgresStore::connect(&url, config.database_max_connections)
                .await
                .expect("failed to connect to database");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL store");
            serve(config, store, metrics_handle).await;
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory store");
            serve(config, InMemoryStore::new(), metrics_handle).await;
        }
    }
}
