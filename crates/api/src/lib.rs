//! HTTP API server for order placement and payment settlement.
//!
//! Provides REST endpoints for placing orders, retrying settlement and
//! querying orders, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use settlement::{
    InventoryAuthority, PaymentAuthority, PaymentGatewayClient, PendingSweeper,
    SettlementConfig, SettlementOrchestrator,
};
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, P, I>(state: Arc<AppState<S, P, I>>, metrics_handle: PrometheusHandle) -> Router
where
    S: Store,
    P: PaymentAuthority + 'static,
    I: InventoryAuthority + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S, P, I>))
        .route("/orders/place", post(routes::orders::place::<S, P, I>))
        .route("/orders/all", get(routes::orders::list_all::<S, P, I>))
        .route(
            "/orders/user/{buyer_id}",
            get(routes::orders::list_by_buyer::<S, P, I>),
        )
        .route(
            "/orders/{order_id}/details",
            get(routes::orders::details::<S, P, I>),
        )
        .route(
            "/orders/{order_id}/retry-payment",
            post(routes::orders::retry_payment::<S, P, I>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state and the pending sweeper.
///
/// Both share one payment gateway, so placement and the sweeper see the
/// same circuit breaker state.
pub fn create_state<S, P, I>(
    store: S,
    payments: P,
    inventory: I,
    config: SettlementConfig,
) -> (Arc<AppState<S, P, I>>, Arc<PendingSweeper<S, P, I>>)
where
    S: Store,
    P: PaymentAuthority,
    I: InventoryAuthority,
{
    let gateway = Arc::new(PaymentGatewayClient::new(
        store.clone(),
        payments,
        inventory,
        &config,
    ));
    let sweeper = Arc::new(PendingSweeper::new(
        store.clone(),
        gateway.clone(),
        config.sweep_interval,
    ));
    let orchestrator = SettlementOrchestrator::new(store, gateway, config);

    (Arc::new(AppState { orchestrator }), sweeper)
}
