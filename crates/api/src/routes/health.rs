//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use settlement::{CircuitBreaker, InventoryAuthority, PaymentAuthority};
use store::Store;

use super::orders::AppState;

#[derive(Serialize)]
pub struct BreakerHealth {
    pub name: &'static str,
    pub state: &'static str,
}

impl From<&CircuitBreaker> for BreakerHealth {
    fn from(breaker: &CircuitBreaker) -> Self {
        Self {
            name: breaker.name(),
            state: breaker.state().as_str(),
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub breakers: Vec<BreakerHealth>,
}

/// GET /health: process health and payment breaker states.
///
/// An open breaker does not make the service unhealthy: placement keeps
/// working and degrades to PENDING.
pub async fn check<S, P, I>(State(state): State<Arc<AppState<S, P, I>>>) -> Json<HealthResponse>
where
    S: Store,
    P: PaymentAuthority + 'static,
    I: InventoryAuthority + 'static,
{
    let gateway = state.orchestrator.gateway();
    Json(HealthResponse {
        status: "ok",
        breakers: vec![
            BreakerHealth::from(gateway.settle_breaker()),
            BreakerHealth::from(gateway.status_breaker()),
        ],
    })
}
