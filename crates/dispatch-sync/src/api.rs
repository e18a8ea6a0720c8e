//! REST client for the dispatch backend.
//!
//! | Call | Endpoint |
//! |------|----------|
//! | [`RestClient::active_orders`] | `GET /active-orders` |
//! | [`RestClient::register_driver`] | `POST /driver` |
//! | [`RestClient::update_status`] | `PUT /status` |
//! | [`RestClient::submit_order`] | `POST /order-data` |
//! | [`RestClient::send_web_data`] | `POST /web-data` |

use crate::model::{LatLng, Money, OrderPatch, PresenceStatus, SessionIdentity, Snapshot};
use crate::poller::OrderFeed;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("http status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response decode failed: {0}")]
    Decode(String),
}

impl ApiError {
    /// Passes 2xx responses through and turns anything else into [`ApiError::Status`].
    pub(crate) async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }

    pub(crate) fn decode(e: reqwest::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverRegistration {
    #[serde(flatten)]
    pub identity: SessionIdentity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LatLng>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub user_id: i64,
    pub status: PresenceStatus,
}

/// A confirmed ride request from the passenger form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSubmission {
    #[serde(flatten)]
    pub identity: SessionIdentity,
    pub phone: String,
    pub pickup: String,
    pub dropoff: String,
    pub pickup_coords: LatLng,
    pub dropoff_coords: LatLng,
    pub tariff: String,
    pub distance_km: f64,
    pub price: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebData {
    #[serde(flatten)]
    pub identity: SessionIdentity,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    #[instrument(skip(self))]
    pub async fn active_orders(&self) -> Result<Snapshot, ApiError> {
        let fetched_at = Utc::now();
        let resp = self.http.get(self.url("active-orders")).send().await?;
        let records: Vec<OrderPatch> = ApiError::check(resp)
            .await?
            .json()
            .await
            .map_err(ApiError::decode)?;
        debug!(entries = records.len(), "Active orders fetched");
        Ok(Snapshot::new(records, fetched_at))
    }

    #[instrument(skip(self))]
    pub async fn register_driver(&self, registration: &DriverRegistration) -> Result<(), ApiError> {
        let resp = self
            .http
            .post(self.url("driver"))
            .json(registration)
            .send()
            .await?;
        ApiError::check(resp).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn update_status(&self, update: &StatusUpdate) -> Result<(), ApiError> {
        let resp = self.http.put(self.url("status")).json(update).send().await?;
        ApiError::check(resp).await?;
        Ok(())
    }

    #[instrument(skip(self, order), fields(tariff = %order.tariff, price = %order.price))]
    pub async fn submit_order(&self, order: &OrderSubmission) -> Result<(), ApiError> {
        let resp = self
            .http
            .post(self.url("order-data"))
            .json(order)
            .send()
            .await?;
        ApiError::check(resp).await?;
        Ok(())
    }

    #[instrument(skip(self, payload))]
    pub async fn send_web_data(&self, payload: &WebData) -> Result<(), ApiError> {
        let resp = self
            .http
            .post(self.url("web-data"))
            .json(payload)
            .send()
            .await?;
        ApiError::check(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl OrderFeed for RestClient {
    async fn fetch(&self) -> Result<Snapshot, ApiError> {
        self.active_orders().await
    }
}
