//! Abstract venue gateway for connecting the engine to a trading venue.
//!
//! Wire protocols, authentication and reconnection live inside the venue
//! implementation; the engine only requires the three capabilities below:
//! a market message stream, an order-entry call and an account snapshot feed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::constant::{Direction, LiquidityFlag};
use crate::error::EngineError;
use crate::object::{OrderData, PositionReport};

/// Venue-native message handed to the event normalizer. Venue adapters
/// convert their wire format into this enum before pushing it inward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RawVenueMessage {
    Tick {
        symbol: String,
        last_price: f64,
        bid_price: f64,
        ask_price: f64,
        timestamp: DateTime<Utc>,
    },
    BookDelta {
        symbol: String,
        direction: Direction,
        price: f64,
        quantity: f64,
        timestamp: DateTime<Utc>,
    },
    Trade {
        symbol: String,
        price: f64,
        quantity: f64,
        timestamp: DateTime<Utc>,
    },
    OrderAcknowledged {
        client_order_id: String,
        venue_order_id: String,
        timestamp: DateTime<Utc>,
    },
    OrderRejected {
        client_order_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    OrderCancelled {
        client_order_id: Option<String>,
        venue_order_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    Fill {
        fill_id: String,
        client_order_id: Option<String>,
        venue_order_id: Option<String>,
        symbol: String,
        direction: Direction,
        quantity: f64,
        price: f64,
        liquidity: LiquidityFlag,
        timestamp: DateTime<Utc>,
    },
    Account {
        balance: f64,
        positions: Vec<PositionReport>,
        timestamp: DateTime<Utc>,
    },
}

/// Sender handed to a venue implementation for pushing messages into the
/// dispatcher. Market messages and private order/account messages travel on
/// separate channels so the dispatcher can merge them with the right
/// source priority.
#[derive(Clone)]
pub struct VenueFeedSender {
    venue_name: String,
    market_tx: mpsc::UnboundedSender<RawVenueMessage>,
    order_tx: mpsc::UnboundedSender<RawVenueMessage>,
}

impl VenueFeedSender {
    pub fn new(
        venue_name: impl Into<String>,
        market_tx: mpsc::UnboundedSender<RawVenueMessage>,
        order_tx: mpsc::UnboundedSender<RawVenueMessage>,
    ) -> Self {
        Self {
            venue_name: venue_name.into(),
            market_tx,
            order_tx,
        }
    }

    pub fn venue_name(&self) -> &str {
        &self.venue_name
    }

    /// Push a market data message.
    pub fn on_market(&self, message: RawVenueMessage) {
        let _ = self.market_tx.send(message);
    }

    /// Push an order update or account message.
    pub fn on_order(&self, message: RawVenueMessage) {
        let _ = self.order_tx.send(message);
    }

    /// Push an account snapshot.
    pub fn on_account(&self, balance: f64, positions: Vec<PositionReport>) {
        self.on_order(RawVenueMessage::Account {
            balance,
            positions,
            timestamp: Utc::now(),
        });
    }
}

/// Abstract venue trait.
///
/// Implementations must be thread-safe and non-blocking; all responses flow
/// back asynchronously through the `VenueFeedSender` passed to `connect`.
#[async_trait]
pub trait VenueGateway: Send + Sync {
    /// Venue name used in logs and notices.
    fn venue_name(&self) -> &str;

    /// Establish the connection and start pushing messages through `feed`.
    async fn connect(&self, feed: VenueFeedSender) -> Result<(), EngineError>;

    /// Subscribe to market data for one instrument.
    async fn subscribe(&self, symbol: &str) -> Result<(), EngineError>;

    /// Forward a new order. The order is already risk-approved and recorded
    /// locally in `Submitted` state; acknowledgement or rejection must come
    /// back through the order feed.
    async fn send_order(&self, order: &OrderData) -> Result<(), EngineError>;

    /// Request cancellation of a working order.
    async fn cancel_order(
        &self,
        client_order_id: &str,
        venue_order_id: Option<&str>,
    ) -> Result<(), EngineError>;

    /// Request a fresh account snapshot, answered through the order feed.
    async fn query_account(&self) -> Result<(), EngineError>;

    /// Close the connection.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_sender_routes_channels() {
        let (market_tx, mut market_rx) = mpsc::unbounded_channel();
        let (order_tx, mut order_rx) = mpsc::unbounded_channel();
        let feed = VenueFeedSender::new("mock", market_tx, order_tx);

        feed.on_market(RawVenueMessage::Trade {
            symbol: "BTC-PERP".to_string(),
            price: 100.0,
            quantity: 1.0,
            timestamp: Utc::now(),
        });
        feed.on_account(1000.0, vec![]);

        assert!(matches!(
            market_rx.try_recv().unwrap(),
            RawVenueMessage::Trade { .. }
        ));
        assert!(matches!(
            order_rx.try_recv().unwrap(),
            RawVenueMessage::Account { .. }
        ));
    }
}
