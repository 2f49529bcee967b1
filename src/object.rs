//! Basic data structures used throughout the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constant::{Direction, LiquidityFlag, OrderType, SourceKind, Status};
use crate::utility::{round_to, EPSILON};

/// Static description of a tradable instrument. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub tick_size: f64,
    pub lot_size: f64,
    pub contract_size: f64,
    /// Fraction of notional required as initial margin
    pub margin_ratio: f64,
    /// Fraction of notional required as maintenance margin
    pub maintenance_ratio: f64,
    pub min_volume: f64,
}

impl Instrument {
    /// Create an instrument with sane defaults for lot and margin parameters.
    pub fn new(symbol: impl Into<String>, tick_size: f64, contract_size: f64) -> Self {
        Self {
            symbol: symbol.into(),
            tick_size,
            lot_size: tick_size,
            contract_size,
            margin_ratio: 1.0,
            maintenance_ratio: 0.5,
            min_volume: 0.0,
        }
    }

    /// Round a price to the instrument's tick size.
    pub fn round_price(&self, price: f64) -> f64 {
        round_to(price, self.tick_size)
    }

    /// Round a quantity to the instrument's lot size.
    pub fn round_quantity(&self, quantity: f64) -> f64 {
        round_to(quantity, self.lot_size)
    }
}

/// Payload variants of a market event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MarketPayload {
    /// Top-of-book and last-trade snapshot
    Tick {
        last_price: f64,
        bid_price: f64,
        ask_price: f64,
    },
    /// Single order-book level change
    BookDelta {
        direction: Direction,
        price: f64,
        quantity: f64,
    },
    /// Public trade print
    Trade { price: f64, quantity: f64 },
}

impl MarketPayload {
    /// Price usable as a mark price, if the payload carries one.
    pub fn mark_price(&self) -> Option<f64> {
        match self {
            MarketPayload::Tick { last_price, .. } => Some(*last_price),
            MarketPayload::Trade { price, .. } => Some(*price),
            MarketPayload::BookDelta { .. } => None,
        }
    }
}

/// Canonical market event, ordered by per-instrument sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketEvent {
    pub symbol: String,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: MarketPayload,
}

/// Confirmation that all or part of an order executed. Applied exactly once
/// to the ledger, deduplicated by `fill_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillData {
    pub fill_id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub quantity: f64,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub liquidity: LiquidityFlag,
}

/// Order data tracking the latest status of a single order.
///
/// Owned exclusively by the order manager; everything else sees clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderData {
    pub client_order_id: String,
    pub venue_order_id: Option<String>,
    pub symbol: String,
    pub direction: Direction,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: Option<f64>,
    pub traded: f64,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderData {
    /// Create a new order in `Created` state.
    pub fn new(
        client_order_id: String,
        symbol: String,
        direction: Direction,
        order_type: OrderType,
        quantity: f64,
        price: Option<f64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            client_order_id,
            venue_order_id: None,
            symbol,
            direction,
            order_type,
            quantity,
            price,
            traded: 0.0,
            status: Status::Created,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the order is still working at the venue.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Quantity not yet filled.
    pub fn remaining(&self) -> f64 {
        (self.quantity - self.traded).max(0.0)
    }

    /// Whether the order is completely filled within float tolerance.
    pub fn is_fully_traded(&self) -> bool {
        self.remaining() <= EPSILON
    }
}

/// Signed position in a single instrument. Mutated only by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionData {
    pub symbol: String,
    /// Signed quantity: positive long, negative short
    pub quantity: f64,
    pub avg_entry_price: f64,
    pub realized_pnl: f64,
}

impl PositionData {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            quantity: 0.0,
            avg_entry_price: 0.0,
            realized_pnl: 0.0,
        }
    }

    /// Whether the position is flat within float tolerance.
    pub fn is_flat(&self) -> bool {
        self.quantity.abs() <= EPSILON
    }
}

/// Margin usage derived from the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MarginState {
    pub balance: f64,
    pub unrealized_pnl: f64,
    pub used_margin: f64,
    pub available_margin: f64,
    pub maintenance_margin: f64,
}

impl MarginState {
    /// Account equity: balance plus unrealized PnL.
    pub fn equity(&self) -> f64 {
        self.balance + self.unrealized_pnl
    }
}

/// Venue-reported position inside an account snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionReport {
    pub symbol: String,
    pub quantity: f64,
    pub avg_entry_price: f64,
}

/// Venue-reported account truth used for ledger reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub timestamp: DateTime<Utc>,
    pub balance: f64,
    pub positions: Vec<PositionReport>,
}

/// Divergence between local and venue-reported position state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub symbol: String,
    pub local_quantity: f64,
    pub reported_quantity: f64,
}

impl DriftReport {
    pub fn magnitude(&self) -> f64 {
        (self.local_quantity - self.reported_quantity).abs()
    }
}

/// Strategy request to open a new order, prior to risk evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitIntent {
    pub client_order_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: Option<f64>,
}

impl SubmitIntent {
    pub fn new(
        symbol: impl Into<String>,
        direction: Direction,
        order_type: OrderType,
        quantity: f64,
        price: Option<f64>,
    ) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            direction,
            order_type,
            quantity,
            price,
        }
    }
}

/// Strategy-produced order intent collected by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderIntent {
    Submit(SubmitIntent),
    Cancel { client_order_id: String },
}

/// Local notice reported to the strategy alongside normal events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionNotice {
    /// Order blocked by the risk gate before reaching the venue, distinct
    /// from a venue rejection
    OrderRejectedLocally {
        client_order_id: String,
        reason: String,
    },
    /// Risk gate reduced an intent's quantity
    OrderClamped {
        client_order_id: String,
        requested: f64,
        adjusted: f64,
    },
    /// Order update that matched no known order
    OrphanUpdate { description: String },
    /// Ledger and venue disagree beyond the configured tolerance
    Drift(DriftReport),
    /// No acknowledgement arrived within the order timeout
    Timeout { client_order_id: String },
    /// Cancel requested on an already terminal order
    AlreadyTerminal {
        client_order_id: String,
        status: Status,
    },
    /// An input source disconnected
    SourceLost { source: SourceKind },
}
