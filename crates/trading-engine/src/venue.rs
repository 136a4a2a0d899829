//! Order venues the live gateway trades against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use polymarket_core::api::{ClobOrderClient, OrderType};
use polymarket_core::signing::{OrderData, OrderSigner, SignedOrder};
use polymarket_core::types::{ExecutionErrorCode, OrderSide, OrderStatus};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

/// Venue-side failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VenueError {
    #[error("venue unreachable: {0}")]
    Unreachable(String),

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("order not found: {0}")]
    NotFound(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl VenueError {
    pub fn code(&self) -> ExecutionErrorCode {
        match self {
            VenueError::Unreachable(_) => ExecutionErrorCode::VenueUnreachable,
            VenueError::Rejected(_) => ExecutionErrorCode::OrderRejected,
            VenueError::Auth(_) => ExecutionErrorCode::AuthFailure,
            VenueError::NotFound(_) | VenueError::Protocol(_) => ExecutionErrorCode::InvalidRequest,
        }
    }
}

impl From<polymarket_core::Error> for VenueError {
    fn from(err: polymarket_core::Error) -> Self {
        use polymarket_core::Error;
        match err {
            Error::Http(e) => VenueError::Unreachable(e.to_string()),
            Error::Api { message, status } => match status {
                Some(401) | Some(403) => VenueError::Auth(message),
                Some(404) => VenueError::NotFound(message),
                Some(s) if (400..500).contains(&s) => VenueError::Rejected(message),
                _ => VenueError::Unreachable(message),
            },
            Error::Signing { message } | Error::Auth { message } => VenueError::Auth(message),
            other => VenueError::Protocol(other.to_string()),
        }
    }
}

/// Order to place on a venue.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceOrder {
    pub token_id: String,
    pub side: OrderSide,
    pub price: Decimal,
    /// Shares.
    pub size: Decimal,
    pub expiration: DateTime<Utc>,
    pub order_type: OrderType,
}

/// Cumulative order state reported by a venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VenueOrderStatus {
    pub status: OrderStatus,
    /// Cumulative shares matched.
    pub filled_size: Decimal,
    /// Average price of matched shares.
    pub avg_fill_price: Option<Decimal>,
}

/// A place where limit orders rest and fill.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Venue: Send + Sync {
    /// Place an order and return the venue order id.
    async fn place_order(&self, order: &PlaceOrder) -> Result<String, VenueError>;

    async fn order_status(&self, order_id: &str) -> Result<VenueOrderStatus, VenueError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError>;
}

/// Venue backed by the Polymarket CLOB.
pub struct ClobVenue {
    client: ClobOrderClient,
    signer: OrderSigner,
}

impl ClobVenue {
    pub fn new(client: ClobOrderClient, signer: OrderSigner) -> Self {
        Self { client, signer }
    }

    /// Build and sign the exchange order for `order`.
    pub async fn sign(&self, order: &PlaceOrder) -> Result<SignedOrder, VenueError> {
        let expiration = if order.order_type.uses_expiration() {
            order.expiration.timestamp().max(0) as u64
        } else {
            0
        };
        let data = OrderData::limit(
            self.signer.address(),
            &order.token_id,
            order.side,
            order.price,
            order.size,
            expiration,
        )?;
        Ok(self.signer.sign_order(&data).await?)
    }
}

#[async_trait]
impl Venue for ClobVenue {
    async fn place_order(&self, order: &PlaceOrder) -> Result<String, VenueError> {
        let signed = self.sign(order).await?;
        let response = self.client.post_order(signed, order.order_type).await?;
        if response.is_rejected() {
            return Err(VenueError::Rejected(
                response
                    .error_msg
                    .unwrap_or_else(|| format!("status {}", response.status)),
            ));
        }
        Ok(response.order_id)
    }

    async fn order_status(&self, order_id: &str) -> Result<VenueOrderStatus, VenueError> {
        let response = self.client.get_order(order_id).await?;
        Ok(VenueOrderStatus {
            status: response.order_status(),
            filled_size: response.size_matched(),
            avg_fill_price: response.avg_price(),
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError> {
        self.client.cancel_order(order_id).await?;
        Ok(())
    }
}

/// Scripted fill behaviour for [`SimulatedVenue`].
#[derive(Debug, Clone)]
pub struct SimulatedFill {
    /// Fraction of the order that eventually matches.
    pub fill_ratio: Decimal,
    /// Time after placement at which the match happens.
    pub fill_after: Duration,
    /// Price worsening versus the limit.
    pub price_offset: Decimal,
    /// Reject every placement.
    pub reject: bool,
    /// Exchange-side expiry for unmatched orders.
    pub expire_after: Option<Duration>,
}

impl Default for SimulatedFill {
    fn default() -> Self {
        Self {
            fill_ratio: Decimal::ONE,
            fill_after: Duration::from_millis(200),
            price_offset: Decimal::ZERO,
            reject: false,
            expire_after: None,
        }
    }
}

impl SimulatedFill {
    pub fn never() -> Self {
        Self {
            fill_ratio: Decimal::ZERO,
            ..Default::default()
        }
    }

    pub fn partial(fill_ratio: Decimal) -> Self {
        Self {
            fill_ratio,
            ..Default::default()
        }
    }

    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }
}

/// Settled simulated orders are forgotten after this long.
const SIM_ORDER_RETENTION: Duration = Duration::from_secs(600);

struct SimOrder {
    order: PlaceOrder,
    behaviour: SimulatedFill,
    placed_at: Instant,
    /// Status frozen at cancellation or fill-or-kill resolution.
    frozen: Option<VenueOrderStatus>,
}

impl SimOrder {
    fn fill_price(&self) -> Decimal {
        match self.order.side {
            OrderSide::Buy => self.order.price + self.behaviour.price_offset,
            OrderSide::Sell => self.order.price - self.behaviour.price_offset,
        }
    }

    /// A fill-or-kill order matches in full at once or is killed.
    fn resolve_fill_or_kill(&self) -> VenueOrderStatus {
        if self.behaviour.fill_ratio >= Decimal::ONE {
            VenueOrderStatus {
                status: OrderStatus::Filled,
                filled_size: self.order.size,
                avg_fill_price: Some(self.fill_price()),
            }
        } else {
            VenueOrderStatus {
                status: OrderStatus::Cancelled,
                filled_size: Decimal::ZERO,
                avg_fill_price: None,
            }
        }
    }

    fn is_stale(&self) -> bool {
        self.status_now().status.is_terminal() && self.placed_at.elapsed() >= SIM_ORDER_RETENTION
    }

    fn status_now(&self) -> VenueOrderStatus {
        if let Some(frozen) = self.frozen {
            return frozen;
        }

        let elapsed = self.placed_at.elapsed();
        let matched = elapsed >= self.behaviour.fill_after && self.behaviour.fill_ratio > Decimal::ZERO;

        if !matched {
            let expired = self
                .behaviour
                .expire_after
                .is_some_and(|after| elapsed >= after);
            return VenueOrderStatus {
                status: if expired {
                    OrderStatus::Expired
                } else {
                    OrderStatus::Pending
                },
                filled_size: Decimal::ZERO,
                avg_fill_price: None,
            };
        }

        let ratio = self.behaviour.fill_ratio.min(Decimal::ONE);
        let price = self.fill_price();
        VenueOrderStatus {
            status: if ratio >= Decimal::ONE {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            },
            filled_size: self.order.size * ratio,
            avg_fill_price: Some(price),
        }
    }
}

/// In-process venue with scriptable fills, for mock mode and tests.
pub struct SimulatedVenue {
    behaviour: RwLock<SimulatedFill>,
    orders: DashMap<String, SimOrder>,
    placements: AtomicU64,
    cancels: AtomicU64,
}

impl SimulatedVenue {
    pub fn new(behaviour: SimulatedFill) -> Self {
        Self {
            behaviour: RwLock::new(behaviour),
            orders: DashMap::new(),
            placements: AtomicU64::new(0),
            cancels: AtomicU64::new(0),
        }
    }

    /// Change behaviour for subsequently placed orders.
    pub fn set_behaviour(&self, behaviour: SimulatedFill) {
        *self.behaviour.write().unwrap_or_else(|e| e.into_inner()) = behaviour;
    }

    pub fn placements(&self) -> u64 {
        self.placements.load(Ordering::Relaxed)
    }

    pub fn cancels(&self) -> u64 {
        self.cancels.load(Ordering::Relaxed)
    }

    /// Orders the venue still remembers.
    pub fn tracked_orders(&self) -> usize {
        self.orders.len()
    }
}

impl Default for SimulatedVenue {
    fn default() -> Self {
        Self::new(SimulatedFill::default())
    }
}

#[async_trait]
impl Venue for SimulatedVenue {
    async fn place_order(&self, order: &PlaceOrder) -> Result<String, VenueError> {
        self.placements.fetch_add(1, Ordering::Relaxed);
        let behaviour = self
            .behaviour
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if behaviour.reject {
            return Err(VenueError::Rejected("simulated rejection".to_string()));
        }

        self.orders.retain(|_, o| !o.is_stale());

        let order_id = format!("sim-{}", uuid::Uuid::new_v4());
        debug!(
            order_id = %order_id,
            side = ?order.side,
            price = %order.price,
            size = %order.size,
            order_type = ?order.order_type,
            "[MOCK] Order accepted"
        );
        let mut sim = SimOrder {
            order: order.clone(),
            behaviour,
            placed_at: Instant::now(),
            frozen: None,
        };
        if order.order_type == OrderType::Fok {
            sim.frozen = Some(sim.resolve_fill_or_kill());
        }
        self.orders.insert(order_id.clone(), sim);
        Ok(order_id)
    }

    async fn order_status(&self, order_id: &str) -> Result<VenueOrderStatus, VenueError> {
        self.orders
            .get(order_id)
            .map(|o| o.status_now())
            .ok_or_else(|| VenueError::NotFound(order_id.to_string()))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError> {
        let mut entry = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| VenueError::NotFound(order_id.to_string()))?;
        self.cancels.fetch_add(1, Ordering::Relaxed);

        let current = entry.status_now();
        if !current.status.is_terminal() {
            entry.frozen = Some(VenueOrderStatus {
                status: OrderStatus::Cancelled,
                ..current
            });
            info!(order_id = %order_id, filled = %current.filled_size, "[MOCK] Order cancelled");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> PlaceOrder {
        PlaceOrder {
            token_id: "tok".to_string(),
            side: OrderSide::Buy,
            price: Decimal::new(50, 2),
            size: Decimal::new(100, 0),
            expiration: Utc::now(),
            order_type: OrderType::Gtd,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_partial_fill_then_cancel() {
        let venue = SimulatedVenue::new(SimulatedFill {
            fill_ratio: Decimal::new(92, 2),
            fill_after: Duration::from_millis(300),
            price_offset: Decimal::new(1, 2),
            ..Default::default()
        });
        let id = venue.place_order(&order()).await.unwrap();
        assert_eq!(venue.order_status(&id).await.unwrap().status, OrderStatus::Pending);

        tokio::time::advance(Duration::from_millis(300)).await;
        let status = venue.order_status(&id).await.unwrap();
        assert_eq!(status.status, OrderStatus::PartiallyFilled);
        assert_eq!(status.filled_size, Decimal::new(92, 0));
        assert_eq!(status.avg_fill_price, Some(Decimal::new(51, 2)));

        venue.cancel_order(&id).await.unwrap();
        let status = venue.order_status(&id).await.unwrap();
        assert_eq!(status.status, OrderStatus::Cancelled);
        assert_eq!(status.filled_size, Decimal::new(92, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_expiry() {
        let venue = SimulatedVenue::new(SimulatedFill {
            expire_after: Some(Duration::from_secs(1)),
            ..SimulatedFill::never()
        });
        let id = venue.place_order(&order()).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(venue.order_status(&id).await.unwrap().status, OrderStatus::Expired);
    }

    #[tokio::test]
    async fn test_simulated_fill_or_kill() {
        let venue = SimulatedVenue::default();
        let fok = PlaceOrder {
            order_type: OrderType::Fok,
            ..order()
        };
        let id = venue.place_order(&fok).await.unwrap();
        let status = venue.order_status(&id).await.unwrap();
        assert_eq!(status.status, OrderStatus::Filled);
        assert_eq!(status.filled_size, fok.size);

        venue.set_behaviour(SimulatedFill::partial(Decimal::new(5, 1)));
        let id = venue.place_order(&fok).await.unwrap();
        let status = venue.order_status(&id).await.unwrap();
        assert_eq!(status.status, OrderStatus::Cancelled);
        assert_eq!(status.filled_size, Decimal::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_orders_are_forgotten() {
        let venue = SimulatedVenue::new(SimulatedFill::never());
        let cancelled = venue.place_order(&order()).await.unwrap();
        venue.cancel_order(&cancelled).await.unwrap();
        let resting = venue.place_order(&order()).await.unwrap();
        assert_eq!(venue.tracked_orders(), 2);

        tokio::time::advance(SIM_ORDER_RETENTION).await;
        venue.place_order(&order()).await.unwrap();
        assert_eq!(venue.tracked_orders(), 2);
        assert!(venue.order_status(&resting).await.is_ok());
        assert!(matches!(venue.order_status(&cancelled).await, Err(VenueError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_simulated_rejection_and_unknown_order() {
        let venue = SimulatedVenue::new(SimulatedFill::rejecting());
        assert!(matches!(venue.place_order(&order()).await, Err(VenueError::Rejected(_))));
        assert_eq!(venue.placements(), 1);
        assert!(matches!(venue.order_status("nope").await, Err(VenueError::NotFound(_))));
    }

    #[test]
    fn test_core_error_mapping() {
        let auth: VenueError = polymarket_core::Error::Api {
            message: "bad key".to_string(),
            status: Some(401),
        }
        .into();
        assert_eq!(auth.code(), ExecutionErrorCode::AuthFailure);

        let rejected: VenueError = polymarket_core::Error::Api {
            message: "invalid price".to_string(),
            status: Some(400),
        }
        .into();
        assert_eq!(rejected.code(), ExecutionErrorCode::OrderRejected);

        let down: VenueError = polymarket_core::Error::Api {
            message: "gateway".to_string(),
            status: Some(502),
        }
        .into();
        assert_eq!(down.code(), ExecutionErrorCode::VenueUnreachable);
    }

    fn clob_venue() -> ClobVenue {
        use polymarket_core::api::ApiCredentials;
        use polymarket_core::signing::Eip712Domain;

        let signer = OrderSigner::from_private_key(
            "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
            Eip712Domain::ctf_exchange(),
        )
        .unwrap();
        let credentials = ApiCredentials::new("key".to_string(), "c2VjcmV0".to_string(), "pass".to_string());
        let client = ClobOrderClient::new(None, signer.address().to_string(), credentials).unwrap();
        ClobVenue::new(client, signer)
    }

    #[tokio::test]
    async fn test_clob_orders_are_signed() {
        let venue = clob_venue();
        let gtd = PlaceOrder {
            token_id: "123".to_string(),
            ..order()
        };
        let signed = venue.sign(&gtd).await.unwrap();
        assert_eq!(signed.maker, "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        assert_eq!(signed.side, "BUY");
        assert_eq!(signed.expiration, gtd.expiration.timestamp().to_string());
        // 100 shares at 0.50
        assert_eq!(signed.maker_amount, "50000000");
        assert_eq!(signed.taker_amount, "100000000");
        assert_eq!(signed.signature.len(), 132);

        let fok = PlaceOrder {
            order_type: OrderType::Fok,
            ..gtd
        };
        assert_eq!(venue.sign(&fok).await.unwrap().expiration, "0");
    }

    #[tokio::test]
    async fn test_unsignable_order_is_not_sent() {
        let venue = clob_venue();
        // "tok" is not a numeric token id.
        let err = venue.place_order(&order()).await.unwrap_err();
        assert!(matches!(err, VenueError::Protocol(_)));
    }
}
