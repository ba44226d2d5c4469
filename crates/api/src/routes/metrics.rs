//! Prometheus metrics endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics::Unit;
use metrics_exporter_prometheus::PrometheusHandle;

/// Registers help texts for the settlement metrics.
///
/// Call once after the recorder is installed.
pub fn describe() {
    metrics::describe_counter!("settlement_place_total", "Orders placed, by settlement status");
    metrics::describe_histogram!(
        "settlement_place_duration_seconds",
        Unit::Seconds,
        "Time spent placing and confirming an order"
    );
    metrics::describe_counter!(
        "settlement_fallback_total",
        "Settle attempts that failed or were short-circuited"
    );
    metrics::describe_counter!("inventory_sync_total", "Successful stock adjustments");
    metrics::describe_counter!("inventory_sync_failed_total", "Failed stock adjustments");
    metrics::describe_counter!("ledger_upserts_total", "Payment ledger upserts, by kind");
    metrics::describe_counter!("sweep_runs_total", "Pending reconciliation passes");
    metrics::describe_histogram!(
        "sweep_duration_seconds",
        Unit::Seconds,
        "Duration of a reconciliation pass"
    );
    metrics::describe_counter!(
        "sweep_reconciled_total",
        "Pending payments settled by the sweeper"
    );
    metrics::describe_counter!(
        "circuit_breaker_opened_total",
        "Circuit breaker transitions to open"
    );
    metrics::describe_counter!(
        "circuit_breaker_rejected_total",
        "Calls rejected by an open circuit breaker"
    );
    metrics::describe_gauge!(
        "circuit_breaker_state",
        "Circuit breaker state (0 closed, 1 open, 2 half-open)"
    );
}

/// GET /metrics: returns Prometheus-formatted metrics.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}
