//! Polymarket CLOB order client.
//!
//! Posts EIP-712 signed orders, polls and cancels them, with L2 (HMAC)
//! request authentication.

use crate::config::PolymarketConfig;
use crate::signing::SignedOrder;
use crate::types::OrderStatus;
use crate::{Error, Result};
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, KeyInit, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

/// API credentials for authenticated CLOB requests.
#[derive(Clone)]
pub struct ApiCredentials {
    /// API key (derived from wallet).
    pub api_key: String,
    /// API secret for HMAC signing.
    pub api_secret: String,
    /// Passphrase for additional security.
    pub api_passphrase: String,
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .field("api_passphrase", &"[REDACTED]")
            .finish()
    }
}

impl ApiCredentials {
    pub fn new(api_key: String, api_secret: String, api_passphrase: String) -> Self {
        Self {
            api_key,
            api_secret,
            api_passphrase,
        }
    }

    /// Take credentials from the polymarket config section.
    #[allow(clippy::result_large_err)]
    pub fn from_config(config: &PolymarketConfig) -> Result<Self> {
        let missing = |name: &str| Error::Config {
            message: format!("{} not configured", name),
        };
        Ok(Self {
            api_key: config.api_key.clone().ok_or_else(|| missing("api_key"))?,
            api_secret: config.api_secret.clone().ok_or_else(|| missing("api_secret"))?,
            api_passphrase: config
                .api_passphrase
                .clone()
                .ok_or_else(|| missing("api_passphrase"))?,
        })
    }
}

/// Time in force for submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Good-till-cancelled limit order.
    Gtc,
    /// Good-till-date limit order.
    #[default]
    Gtd,
    /// Fill-or-kill: match in full immediately or not at all.
    Fok,
}

impl OrderType {
    /// Only GTD orders carry an expiration; the rest must send zero.
    pub fn uses_expiration(self) -> bool {
        self == OrderType::Gtd
    }
}

/// Request body for posting an order.
#[derive(Debug, Clone, Serialize)]
pub struct PostOrderRequest {
    pub order: SignedOrder,
    #[serde(rename = "orderType")]
    pub order_type: OrderType,
    /// API key of the order owner.
    pub owner: String,
}

/// Response from posting an order.
#[derive(Debug, Clone, Deserialize)]
pub struct PostOrderResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(rename = "errorMsg", default)]
    pub error_msg: Option<String>,
    /// Order ID assigned by the CLOB.
    #[serde(rename = "orderID", default)]
    pub order_id: String,
    /// e.g. "live", "matched", "delayed", "unmatched".
    #[serde(default)]
    pub status: String,
}

impl PostOrderResponse {
    /// Whether the venue refused the order outright.
    pub fn is_rejected(&self) -> bool {
        self.success == Some(false)
            || self.order_id.is_empty()
            || self.error_msg.as_deref().is_some_and(|m| !m.is_empty())
    }
}

/// Order state as returned by `GET /data/order/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderStatusResponse {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub original_size: String,
    #[serde(default)]
    pub size_matched: String,
    #[serde(default)]
    pub price: String,
    /// Volume-weighted price of matched shares, when reported.
    #[serde(default)]
    pub associate_price: Option<String>,
}

impl OrderStatusResponse {
    pub fn size_matched(&self) -> Decimal {
        self.size_matched.parse().unwrap_or(Decimal::ZERO)
    }

    /// Average fill price, falling back to the limit price.
    pub fn avg_price(&self) -> Option<Decimal> {
        self.associate_price
            .as_deref()
            .and_then(|p| p.parse().ok())
            .or_else(|| self.price.parse().ok())
    }

    /// Map the venue status string into the local order state machine.
    pub fn order_status(&self) -> OrderStatus {
        let matched = self.size_matched() > Decimal::ZERO;
        match self.status.to_lowercase().as_str() {
            "matched" | "filled" => OrderStatus::Filled,
            "canceled" | "cancelled" | "canceled_market_resolved" => OrderStatus::Cancelled,
            "expired" => OrderStatus::Expired,
            _ if matched => OrderStatus::PartiallyFilled,
            _ => OrderStatus::Pending,
        }
    }
}

/// Authenticated client for CLOB order management.
pub struct ClobOrderClient {
    base_url: String,
    address: String,
    credentials: ApiCredentials,
    http_client: reqwest::Client,
}

impl ClobOrderClient {
    /// Default CLOB API base URL.
    pub const DEFAULT_BASE_URL: &'static str = "https://clob.polymarket.com";

    #[allow(clippy::result_large_err)]
    pub fn new(base_url: Option<String>, address: String, credentials: ApiCredentials) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(10))
            .connect_timeout(StdDuration::from_secs(5))
            .build()?;
        Ok(Self {
            base_url: base_url.unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
            address,
            credentials,
            http_client,
        })
    }

    #[allow(clippy::result_large_err)]
    pub fn from_config(config: &PolymarketConfig) -> Result<Self> {
        let address = config.address.clone().ok_or_else(|| Error::Config {
            message: "address not configured".to_string(),
        })?;
        Self::new(
            config.clob_url.clone(),
            address,
            ApiCredentials::from_config(config)?,
        )
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn authed(
        &self,
        builder: reqwest::RequestBuilder,
        method: &str,
        path: &str,
        body: Option<&str>,
    ) -> Result<reqwest::RequestBuilder> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign_l2_request(&self.credentials, method, path, &timestamp, body)?;
        Ok(builder
            .header("POLY_ADDRESS", &self.address)
            .header("POLY_SIGNATURE", signature)
            .header("POLY_TIMESTAMP", timestamp)
            .header("POLY_API_KEY", &self.credentials.api_key)
            .header("POLY_PASSPHRASE", &self.credentials.api_passphrase))
    }

    async fn error_from(response: reqwest::Response, action: &str) -> Error {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        Error::Api {
            message: format!("Failed to {}: {} - {}", action, status, text),
            status: Some(status),
        }
    }

    /// Post a signed order. Never retried: a resubmission could double exposure.
    pub async fn post_order(&self, order: SignedOrder, order_type: OrderType) -> Result<PostOrderResponse> {
        let path = "/order";
        let url = format!("{}{}", self.base_url, path);
        let request = PostOrderRequest {
            order,
            order_type,
            owner: self.credentials.api_key.clone(),
        };
        let body = serde_json::to_string(&request)?;

        debug!(payload = %body, "POST /order request body");

        let response = self
            .authed(self.http_client.post(&url), "POST", path, Some(&body))?
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, "post order").await);
        }

        let result: PostOrderResponse = response.json().await?;
        if result.is_rejected() {
            warn!(
                order_id = %result.order_id,
                error = ?result.error_msg,
                "Order rejected by CLOB"
            );
        } else {
            info!(order_id = %result.order_id, status = %result.status, "Order posted");
        }
        Ok(result)
    }

    /// Fetch the current state of an order.
    pub async fn get_order(&self, order_id: &str) -> Result<OrderStatusResponse> {
        let path = format!("/data/order/{}", order_id);
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .authed(self.http_client.get(&url), "GET", &path, None)?
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, "get order").await);
        }

        Ok(response.json().await?)
    }

    /// Cancel an order by ID.
    pub async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let path = "/order";
        let url = format!("{}{}", self.base_url, path);
        let body = serde_json::json!({ "orderID": order_id }).to_string();

        let response = self
            .authed(self.http_client.delete(&url), "DELETE", path, Some(&body))?
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, "cancel order").await);
        }

        info!(order_id = %order_id, "Order cancelled");
        Ok(())
    }
}

impl std::fmt::Debug for ClobOrderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClobOrderClient")
            .field("base_url", &self.base_url)
            .field("address", &self.address)
            .finish()
    }
}

/// Sign a request with HMAC-SHA256 for L2 authentication.
#[allow(clippy::result_large_err)]
fn sign_l2_request(
    credentials: &ApiCredentials,
    method: &str,
    path: &str,
    timestamp: &str,
    body: Option<&str>,
) -> Result<String> {
    // timestamp + method + path + body
    let message = match body {
        Some(b) => format!("{}{}{}{}", timestamp, method, path, b),
        None => format!("{}{}{}", timestamp, method, path),
    };

    // Secrets are URL-safe base64; accept unpadded and standard encodings too.
    let secret_bytes = base64::engine::general_purpose::URL_SAFE
        .decode(&credentials.api_secret)
        .or_else(|_| {
            base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(&credentials.api_secret)
        })
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(&credentials.api_secret))
        .map_err(|e| Error::Signing {
            message: format!("Invalid API secret encoding: {}", e),
        })?;

    let mut mac = Hmac::<Sha256>::new_from_slice(&secret_bytes).map_err(|e| Error::Signing {
        message: format!("Failed to create HMAC: {}", e),
    })?;

    mac.update(message.as_bytes());
    let result = mac.finalize();

    Ok(base64::engine::general_purpose::URL_SAFE.encode(result.into_bytes()))
}
