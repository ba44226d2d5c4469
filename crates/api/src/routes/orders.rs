//! Order placement, settlement retry and order query endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use domain::{BuyerId, Money, NewOrder, Order, OrderId, PaymentRecord, ValidationError};
use serde::{Deserialize, Serialize};
use settlement::{
    InventoryAuthority, OrderSettlementView, PaymentAuthority, Placement, RemotePaymentRecord,
    SettlementOrchestrator,
};
use store::Store;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S, P, I>
where
    S: Store,
    P: PaymentAuthority,
    I: InventoryAuthority,
{
    pub orchestrator: SettlementOrchestrator<S, P, I>,
}

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub buyer_id: Option<i64>,
    pub product_id: Option<i64>,
    pub quantity: Option<i64>,
    pub total_price_cents: Option<i64>,
}

impl PlaceOrderRequest {
    fn into_new_order(self) -> Result<NewOrder, ApiError> {
        let buyer_id = self.buyer_id.ok_or(ValidationError::MissingField("buyer_id"))?;
        let product_id = self
            .product_id
            .ok_or(ValidationError::MissingField("product_id"))?;
        let quantity = self.quantity.ok_or(ValidationError::MissingField("quantity"))?;
        let total_price_cents = self
            .total_price_cents
            .ok_or(ValidationError::MissingField("total_price_cents"))?;

        if quantity <= 0 {
            return Err(ValidationError::InvalidQuantity { quantity }.into());
        }
        let quantity = u32::try_from(quantity)
            .map_err(|_| ApiError::BadRequest(format!("quantity {quantity} is too large")))?;

        Ok(NewOrder::new(
            buyer_id,
            product_id,
            quantity,
            Money::from_cents(total_price_cents),
        ))
    }
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: i64,
    pub buyer_id: i64,
    pub product_id: i64,
    pub quantity: u32,
    pub total_price_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.get(),
            buyer_id: order.buyer_id.get(),
            product_id: order.product_id.get(),
            quantity: order.quantity,
            total_price_cents: order.total_price.cents(),
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlacementResponse {
    pub order: OrderResponse,
    pub settlement_status: String,
}

impl From<Placement> for PlacementResponse {
    fn from(placement: Placement) -> Self {
        Self {
            order: OrderResponse::from(&placement.order),
            settlement_status: placement.settlement_status.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub status: String,
    pub transaction_ref: Option<String>,
    pub amount_cents: i64,
    pub settled_at: DateTime<Utc>,
}

impl From<RemotePaymentRecord> for PaymentResponse {
    fn from(record: RemotePaymentRecord) -> Self {
        Self {
            status: record.status.to_string(),
            transaction_ref: record.transaction_ref,
            amount_cents: record.amount.cents(),
            settled_at: record.settled_at,
        }
    }
}

impl From<PaymentRecord> for PaymentResponse {
    fn from(record: PaymentRecord) -> Self {
        Self {
            status: record.status.to_string(),
            transaction_ref: record.transaction_ref,
            amount_cents: record.amount.cents(),
            settled_at: record.settled_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderDetailsResponse {
    pub order: OrderResponse,
    /// Payment as reported by the payment authority.
    pub payment: Option<PaymentResponse>,
    /// Payment as recorded in the local ledger.
    pub ledger: Option<PaymentResponse>,
}

impl From<OrderSettlementView> for OrderDetailsResponse {
    fn from(view: OrderSettlementView) -> Self {
        Self {
            order: OrderResponse::from(&view.order),
            payment: view.payment.map(PaymentResponse::from),
            ledger: view.ledger.map(PaymentResponse::from),
        }
    }
}

// -- Handlers --

/// POST /orders/place: store an order and attempt settlement.
#[tracing::instrument(skip(state, req))]
pub async fn place<S, P, I>(
    State(state): State<Arc<AppState<S, P, I>>>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<PlacementResponse>), ApiError>
where
    S: Store,
    P: PaymentAuthority + 'static,
    I: InventoryAuthority + 'static,
{
    let new_order = req.into_new_order()?;
    let placement = state.orchestrator.place(new_order).await?;
    Ok((StatusCode::CREATED, Json(placement.into())))
}

/// GET /orders/all: list every order.
pub async fn list_all<S, P, I>(
    State(state): State<Arc<AppState<S, P, I>>>,
) -> Result<Json<Vec<OrderResponse>>, ApiError>
where
    S: Store,
    P: PaymentAuthority + 'static,
    I: InventoryAuthority + 'static,
{
    let orders = state.orchestrator.list_all().await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /orders/user/{buyer_id}: list the orders of one buyer.
pub async fn list_by_buyer<S, P, I>(
    State(state): State<Arc<AppState<S, P, I>>>,
    Path(buyer_id): Path<i64>,
) -> Result<Json<Vec<OrderResponse>>, ApiError>
where
    S: Store,
    P: PaymentAuthority + 'static,
    I: InventoryAuthority + 'static,
{
    let orders = state
        .orchestrator
        .list_by_buyer(BuyerId::new(buyer_id))
        .await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /orders/{order_id}/details: order with payment details.
pub async fn details<S, P, I>(
    State(state): State<Arc<AppState<S, P, I>>>,
    Path(order_id): Path<i64>,
) -> Result<Json<OrderDetailsResponse>, ApiError>
where
    S: Store,
    P: PaymentAuthority + 'static,
    I: InventoryAuthority + 'static,
{
    let view = state
        .orchestrator
        .order_with_settlement(OrderId::new(order_id))
        .await?;
    Ok(Json(view.into()))
}

/// POST /orders/{order_id}/retry-payment: retry settlement of a pending order.
#[tracing::instrument(skip(state))]
pub async fn retry_payment<S, P, I>(
    State(state): State<Arc<AppState<S, P, I>>>,
    Path(order_id): Path<i64>,
) -> Result<Json<PlacementResponse>, ApiError>
where
    S: Store,
    P: PaymentAuthority + 'static,
    I: InventoryAuthority + 'static,
{
    let placement = state.orchestrator.retry(OrderId::new(order_id)).await?;
    Ok(Json(placement.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(quantity: Option<i64>) -> PlaceOrderRequest {
        PlaceOrderRequest {
            buyer_id: Some(1),
            product_id: Some(10),
            quantity,
            total_price_cents: Some(4000),
        }
    }

    #[test]
    fn test_complete_request_converts() {
        let order = request(Some(2)).into_new_order().unwrap();
        assert_eq!(order.quantity, 2);
        assert_eq!(order.total_price, Money::from_cents(4000));
    }

    #[test]
    fn test_missing_field_is_reported() {
        let err = request(None).into_new_order().unwrap_err();
        assert!(matches!(
            err,
            ApiError::Settlement(settlement::SettlementError::Validation(
                ValidationError::MissingField("quantity")
            ))
        ));
    }

    #[test]
    fn test_non_positive_quantity_rejected() {
        let err = request(Some(-1)).into_new_order().unwrap_err();
        assert!(matches!(
            err,
            ApiError::Settlement(settlement::SettlementError::Validation(
                ValidationError::InvalidQuantity { quantity: -1 }
            ))
        ));
    }

    #[test]
    fn test_oversized_quantity_rejected() {
        let err = request(Some(i64::MAX)).into_new_order().unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
