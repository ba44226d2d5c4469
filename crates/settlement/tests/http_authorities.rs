//! Tests for the HTTP authority clients against a local server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use domain::{Money, NewOrder, OrderId, PaymentStatus, ProductId};
use settlement::services::StatusResponse;
use settlement::{
    HttpInventoryAuthority, HttpPaymentAuthority, INVENTORY_SERVICE, InMemoryInventoryAuthority,
    InMemoryPaymentAuthority, InventoryAuthority, PAYMENT_SERVICE, PaymentAuthority,
    PaymentGatewayClient, RemotePaymentRecord, SettleBehavior, SettleRequest, SettleResponse,
    SettlementConfig, SettlementError, SettlementOrchestrator, StaticEndpointResolver,
    StockAdjustment,
};
use store::InMemoryStore;

#[derive(Clone, Default)]
struct Authorities {
    payments: InMemoryPaymentAuthority,
    inventory: InMemoryInventoryAuthority,
}

async fn settle(
    State(state): State<Authorities>,
    Json(request): Json<SettleRequest>,
) -> Result<Json<SettleResponse>, StatusCode> {
    state
        .payments
        .settle(request)
        .await
        .map(Json)
        .map_err(|e| match e {
            SettlementError::Rejected { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        })
}

async fn status(
    State(state): State<Authorities>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<StatusResponse>, StatusCode> {
    match state.payments.status(order_id).await {
        Ok(Some(status)) => Ok(Json(StatusResponse { status })),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

async fn record(
    State(state): State<Authorities>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<RemotePaymentRecord>, StatusCode> {
    match state.payments.record(order_id).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

async fn adjust_stock(
    State(state): State<Authorities>,
    Json(adjustment): Json<StockAdjustment>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .inventory
        .adjust_stock(adjustment)
        .await
        .map(|()| StatusCode::OK)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

async fn serve(authorities: Authorities) -> SocketAddr {
    let app = Router::new()
        .route("/payments/settle", post(settle))
        .route("/payments/status/{order_id}", get(status))
        .route("/payments/order/{order_id}", get(record))
        .route("/products/adjust-stock", post(adjust_stock))
        .with_state(authorities);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn resolver(addr: SocketAddr) -> Arc<StaticEndpointResolver> {
    let base = format!("http://{addr}/");
    Arc::new(
        StaticEndpointResolver::new()
            .with_endpoint(PAYMENT_SERVICE, base.clone())
            .with_endpoint(INVENTORY_SERVICE, base),
    )
}

fn request(order: i64) -> SettleRequest {
    SettleRequest {
        order_id: OrderId::new(order),
        amount: Money::from_cents(4000),
    }
}

#[tokio::test]
async fn settle_status_and_record_over_http() {
    let authorities = Authorities::default();
    let addr = serve(authorities.clone()).await;
    let client = HttpPaymentAuthority::new(resolver(addr), Duration::from_secs(5)).unwrap();

    let response = client.settle(request(7)).await.unwrap();
    assert_eq!(response.status, PaymentStatus::Success);
    assert!(response.transaction_ref.is_some());

    assert_eq!(
        client.status(OrderId::new(7)).await.unwrap(),
        Some(PaymentStatus::Success)
    );
    let record = client.record(OrderId::new(7)).await.unwrap().unwrap();
    assert_eq!(record.transaction_ref, response.transaction_ref);
    assert_eq!(authorities.payments.settle_calls(), 1);
}

#[tokio::test]
async fn unknown_order_maps_to_none() {
    let addr = serve(Authorities::default()).await;
    let client = HttpPaymentAuthority::new(resolver(addr), Duration::from_secs(5)).unwrap();

    assert_eq!(client.status(OrderId::new(404)).await.unwrap(), None);
    assert!(client.record(OrderId::new(404)).await.unwrap().is_none());
}

#[tokio::test]
async fn server_error_is_remote_unavailable() {
    let authorities = Authorities::default();
    authorities.payments.set_behavior(SettleBehavior::Fail);
    let addr = serve(authorities).await;
    let client = HttpPaymentAuthority::new(resolver(addr), Duration::from_secs(5)).unwrap();

    let err = client.settle(request(1)).await.unwrap_err();
    assert!(matches!(err, SettlementError::RemoteUnavailable { .. }));
    assert!(err.is_remote());
}

#[tokio::test]
async fn client_error_is_rejection() {
    let addr = serve(Authorities::default()).await;
    let client = HttpPaymentAuthority::new(resolver(addr), Duration::from_secs(5)).unwrap();

    let err = client
        .settle(SettleRequest {
            order_id: OrderId::new(1),
            amount: Money::zero(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Rejected { .. }));
    assert!(!err.is_remote());
    assert!(err.is_degradable());
}

#[tokio::test]
async fn missing_endpoint_is_unresolved() {
    let client = HttpPaymentAuthority::new(
        Arc::new(StaticEndpointResolver::new()),
        Duration::from_secs(5),
    )
    .unwrap();

    let err = client.settle(request(1)).await.unwrap_err();
    assert!(matches!(err, SettlementError::EndpointUnresolved(_)));
}

#[tokio::test]
async fn adjust_stock_over_http() {
    let authorities = Authorities::default();
    authorities.inventory.set_stock(ProductId::new(10), 3);
    let addr = serve(authorities.clone()).await;
    let client = HttpInventoryAuthority::new(resolver(addr), Duration::from_secs(5)).unwrap();

    let adjustment = StockAdjustment {
        product_id: ProductId::new(10),
        quantity: 2,
    };
    client.adjust_stock(adjustment.clone()).await.unwrap();
    assert_eq!(authorities.inventory.stock_of(ProductId::new(10)), Some(1));

    let err = client.adjust_stock(adjustment).await.unwrap_err();
    assert!(matches!(err, SettlementError::Rejected { .. }));
    assert!(err.to_string().contains("insufficient stock"));
}

#[tokio::test]
async fn placement_over_http_settles_and_syncs_inventory() {
    let authorities = Authorities::default();
    let addr = serve(authorities.clone()).await;
    let resolver = resolver(addr);

    let config = SettlementConfig {
        poll_delay: Duration::from_millis(10),
        ..SettlementConfig::default()
    };
    let store = InMemoryStore::new();
    let gateway = Arc::new(PaymentGatewayClient::new(
        store.clone(),
        HttpPaymentAuthority::new(resolver.clone(), config.remote_timeout).unwrap(),
        HttpInventoryAuthority::new(resolver, config.remote_timeout).unwrap(),
        &config,
    ));
    let orchestrator = SettlementOrchestrator::new(store, gateway, config);

    let placement = orchestrator
        .place(NewOrder::new(1, 10, 2, Money::from_cents(4000)))
        .await
        .unwrap();

    assert_eq!(placement.settlement_status, PaymentStatus::Success);
    assert_eq!(authorities.inventory.adjustment_count(), 1);
}
