//! Canonical event types delivered to the strategy host, and the merge key
//! that totally orders them across input sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::constant::SourceKind;
use crate::object::{AccountSnapshot, FillData, MarketEvent};

/// Kind of an order update coming back from the venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderUpdateKind {
    /// Venue accepted the order and assigned a venue order id
    Acknowledged { venue_order_id: String },
    /// Venue rejected the order
    Rejected { reason: String },
    /// Venue confirmed cancellation
    Cancelled,
    /// All or part of the order executed
    Fill(FillData),
}

/// Normalized order update. Matched to a local order by client order id
/// first, venue order id thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub client_order_id: Option<String>,
    pub venue_order_id: Option<String>,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: OrderUpdateKind,
}

/// Canonical internal event produced by the normalizer and merged by the
/// dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    Market(MarketEvent),
    Order(OrderUpdate),
    Account {
        sequence: u64,
        snapshot: AccountSnapshot,
    },
    Timer(DateTime<Utc>),
    SourceLost(SourceKind),
    Shutdown,
}

impl EngineEvent {
    /// Event timestamp used as the primary merge key.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            EngineEvent::Market(event) => event.timestamp,
            EngineEvent::Order(update) => update.timestamp,
            EngineEvent::Account { snapshot, .. } => snapshot.timestamp,
            EngineEvent::Timer(at) => *at,
            // Control events sort with order-feed priority at the time they
            // are observed; the dispatcher emits them directly.
            EngineEvent::SourceLost(_) | EngineEvent::Shutdown => Utc::now(),
        }
    }

    /// Source feeding this event into the dispatcher.
    pub fn source(&self) -> SourceKind {
        match self {
            EngineEvent::Market(_) => SourceKind::MarketFeed,
            EngineEvent::Order(_) | EngineEvent::Account { .. } => SourceKind::OrderFeed,
            EngineEvent::Timer(_) => SourceKind::Timer,
            EngineEvent::SourceLost(_) | EngineEvent::Shutdown => SourceKind::OrderFeed,
        }
    }

    /// Sequence number within the event's stream.
    pub fn sequence(&self) -> u64 {
        match self {
            EngineEvent::Market(event) => event.sequence,
            EngineEvent::Order(update) => update.sequence,
            EngineEvent::Account { sequence, .. } => *sequence,
            _ => 0,
        }
    }
}

/// An event wrapped with its stable merge key.
///
/// Total order: `(timestamp, source priority, sequence, arrival)`. The
/// arrival counter is assigned by the dispatcher at enqueue time and breaks
/// any remaining ties, which keeps the merge stable.
#[derive(Debug, Clone)]
pub struct SequencedEvent {
    pub timestamp: DateTime<Utc>,
    pub source: SourceKind,
    pub sequence: u64,
    pub arrival: u64,
    pub event: EngineEvent,
}

impl SequencedEvent {
    pub fn new(event: EngineEvent, arrival: u64) -> Self {
        Self {
            timestamp: event.timestamp(),
            source: event.source(),
            sequence: event.sequence(),
            arrival,
            event,
        }
    }

    fn key(&self) -> (DateTime<Utc>, u8, u64, u64) {
        (
            self.timestamp,
            self.source.priority(),
            self.sequence,
            self.arrival,
        )
    }
}

impl PartialEq for SequencedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for SequencedEvent {}

impl PartialOrd for SequencedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SequencedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}
