//! HTTP implementations of the remote authorities.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{OrderId, PaymentStatus};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::inventory::{InventoryAuthority, StockAdjustment};
use super::payment::{PaymentAuthority, RemotePaymentRecord, SettleRequest, SettleResponse};
use crate::error::{Result, SettlementError};
use crate::resolver::{EndpointResolver, INVENTORY_SERVICE, PAYMENT_SERVICE};

/// Body of `GET /payments/status/{order_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: PaymentStatus,
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SettlementError::remote("http-client", e))
}

/// Maps a non-success status to an error. A 4xx means the authority
/// refused the request; anything else means it is unavailable.
fn status_error(service: &'static str, status: StatusCode, body: &str) -> SettlementError {
    let reason = if body.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), body)
    };
    if status.is_client_error() {
        SettlementError::rejected(service, reason)
    } else {
        SettlementError::remote(service, reason)
    }
}

async fn decode<T: DeserializeOwned>(service: &'static str, response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(service, status, &body));
    }
    response
        .json()
        .await
        .map_err(|e| SettlementError::remote(service, format!("invalid response body: {e}")))
}

/// Payment authority reached over HTTP.
#[derive(Clone)]
pub struct HttpPaymentAuthority {
    http: Client,
    resolver: Arc<dyn EndpointResolver>,
}

impl HttpPaymentAuthority {
    /// Creates a client whose requests are bounded by `timeout`.
    pub fn new(resolver: Arc<dyn EndpointResolver>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            resolver,
        })
    }

    fn url(&self, path: &str) -> Result<String> {
        Ok(format!("{}{}", self.resolver.resolve(PAYMENT_SERVICE)?, path))
    }

    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let response = self
            .http
            .get(self.url(path)?)
            .send()
            .await
            .map_err(|e| SettlementError::remote(PAYMENT_SERVICE, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(PAYMENT_SERVICE, response).await.map(Some)
    }
}

#[async_trait]
impl PaymentAuthority for HttpPaymentAuthority {
    async fn settle(&self, request: SettleRequest) -> Result<SettleResponse> {
        let response = self
            .http
            .post(self.url("/payments/settle")?)
            .json(&request)
            .send()
            .await
            .map_err(|e| SettlementError::remote(PAYMENT_SERVICE, e))?;

        decode(PAYMENT_SERVICE, response).await
    }

    async fn status(&self, order_id: OrderId) -> Result<Option<PaymentStatus>> {
        let body: Option<StatusResponse> = self
            .get_optional(&format!("/payments/status/{order_id}"))
            .await?;
        Ok(body.map(|b| b.status))
    }

    async fn record(&self, order_id: OrderId) -> Result<Option<RemotePaymentRecord>> {
        self.get_optional(&format!("/payments/order/{order_id}"))
            .await
    }
}

/// Inventory authority reached over HTTP.
#[derive(Clone)]
pub struct HttpInventoryAuthority {
    http: Client,
    resolver: Arc<dyn EndpointResolver>,
}

impl HttpInventoryAuthority {
    /// Creates a client whose requests are bounded by `timeout`.
    pub fn new(resolver: Arc<dyn EndpointResolver>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            resolver,
        })
    }
}

#[async_trait]
impl InventoryAuthority for HttpInventoryAuthority {
    async fn adjust_stock(&self, adjustment: StockAdjustment) -> Result<()> {
        let url = format!(
            "{}/products/adjust-stock",
            self.resolver.resolve(INVENTORY_SERVICE)?
        );
        let response = self
            .http
            .post(url)
            .json(&adjustment)
            .send()
            .await
            .map_err(|e| SettlementError::remote(INVENTORY_SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(INVENTORY_SERVICE, status, &body));
        }
        Ok(())
    }
}
