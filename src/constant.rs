//! General constant enums used across the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of an order, trade or position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Buy / long
    Long,
    /// Sell / short
    Short,
}

impl Direction {
    /// Sign applied to quantities held in this direction.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    /// Opposite direction.
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderType {
    /// Limit order at a fixed price
    #[default]
    Limit,
    /// Market order, price assigned by the venue
    Market,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Market => write!(f, "MARKET"),
        }
    }
}

/// Order lifecycle status.
///
/// Transitions are monotonic: an order can only move to a status with a
/// higher rank, and terminal statuses are immutable endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Status {
    /// Created locally, not yet forwarded to the venue
    #[default]
    Created,
    /// Forwarded to the venue, acknowledgement pending
    Submitted,
    /// Acknowledged by the venue
    Acknowledged,
    /// Partially filled
    PartiallyFilled,
    /// Completely filled (terminal)
    Filled,
    /// Cancelled (terminal)
    Cancelled,
    /// Rejected by the venue (terminal)
    Rejected,
    /// No acknowledgement within the order timeout (terminal)
    Expired,
}

impl Status {
    /// Monotonic rank used to forbid state-machine regression.
    pub fn rank(&self) -> u8 {
        match self {
            Status::Created => 0,
            Status::Submitted => 1,
            Status::Acknowledged => 2,
            Status::PartiallyFilled => 3,
            Status::Filled => 4,
            Status::Cancelled => 4,
            Status::Rejected => 4,
            Status::Expired => 4,
        }
    }

    /// Whether this status is a terminal endpoint.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Filled | Status::Cancelled | Status::Rejected | Status::Expired
        )
    }

    /// Whether an order in this status is still working at the venue.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Status::Submitted | Status::Acknowledged | Status::PartiallyFilled
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Created => write!(f, "CREATED"),
            Status::Submitted => write!(f, "SUBMITTED"),
            Status::Acknowledged => write!(f, "ACKNOWLEDGED"),
            Status::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            Status::Filled => write!(f, "FILLED"),
            Status::Cancelled => write!(f, "CANCELLED"),
            Status::Rejected => write!(f, "REJECTED"),
            Status::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// Liquidity flag of a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiquidityFlag {
    /// Fill added liquidity to the book
    Maker,
    /// Fill removed liquidity from the book
    Taker,
}

impl fmt::Display for LiquidityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiquidityFlag::Maker => write!(f, "MAKER"),
            LiquidityFlag::Taker => write!(f, "TAKER"),
        }
    }
}

/// Input source feeding the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Private order-update and account feed
    OrderFeed,
    /// Public market data feed
    MarketFeed,
    /// Internal periodic timer
    Timer,
}

impl SourceKind {
    /// Merge priority at equal timestamps: order updates are delivered before
    /// market data, market data before timer ticks, so a strategy never acts
    /// on stale position state.
    pub fn priority(&self) -> u8 {
        match self {
            SourceKind::OrderFeed => 0,
            SourceKind::MarketFeed => 1,
            SourceKind::Timer => 2,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::OrderFeed => write!(f, "ORDER_FEED"),
            SourceKind::MarketFeed => write!(f, "MARKET_FEED"),
            SourceKind::Timer => write!(f, "TIMER"),
        }
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "IDLE"),
            SessionState::Running => write!(f, "RUNNING"),
            SessionState::ShuttingDown => write!(f, "SHUTTING_DOWN"),
            SessionState::Stopped => write!(f, "STOPPED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_rank_monotonic() {
        assert!(Status::Created.rank() < Status::Submitted.rank());
        assert!(Status::Submitted.rank() < Status::Acknowledged.rank());
        assert!(Status::Acknowledged.rank() < Status::PartiallyFilled.rank());
        assert!(Status::PartiallyFilled.rank() < Status::Filled.rank());
    }

    #[test]
    fn test_status_terminal() {
        assert!(Status::Filled.is_terminal());
        assert!(Status::Expired.is_terminal());
        assert!(!Status::PartiallyFilled.is_terminal());
        assert!(!Status::Created.is_terminal());
    }

    #[test]
    fn test_source_priority() {
        assert!(SourceKind::OrderFeed.priority() < SourceKind::MarketFeed.priority());
        assert!(SourceKind::MarketFeed.priority() < SourceKind::Timer.priority());
    }

    #[test]
    fn test_direction_sign() {
        assert_eq!(Direction::Long.sign(), 1.0);
        assert_eq!(Direction::Short.sign(), -1.0);
        assert_eq!(Direction::Long.opposite(), Direction::Short);
    }
}
