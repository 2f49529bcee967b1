//! Event normalizer: converts raw venue messages into canonical engine
//! events with monotonic sequence numbers.
//!
//! Malformed input yields `EngineError::MalformedEvent` without advancing
//! any sequence counter; the dispatcher logs and skips it. No reordering is
//! performed here.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::EngineError;
use crate::event::{EngineEvent, OrderUpdate, OrderUpdateKind};
use crate::object::{AccountSnapshot, FillData, Instrument, MarketEvent, MarketPayload};
use crate::venue::RawVenueMessage;

/// Stateful normalizer holding per-instrument sequence counters for market
/// events and a session counter for order and account events.
pub struct EventNormalizer {
    instruments: Arc<HashMap<String, Instrument>>,
    market_sequences: HashMap<String, u64>,
    session_sequence: u64,
}

impl EventNormalizer {
    pub fn new(instruments: Arc<HashMap<String, Instrument>>) -> Self {
        Self {
            instruments,
            market_sequences: HashMap::new(),
            session_sequence: 0,
        }
    }

    /// Current market sequence for an instrument, zero if none assigned yet.
    pub fn market_sequence(&self, symbol: &str) -> u64 {
        self.market_sequences.get(symbol).copied().unwrap_or(0)
    }

    /// Normalize one raw venue message into a canonical event.
    pub fn normalize(&mut self, raw: RawVenueMessage) -> Result<EngineEvent, EngineError> {
        match raw {
            RawVenueMessage::Tick {
                symbol,
                last_price,
                bid_price,
                ask_price,
                timestamp,
            } => {
                self.check_instrument(&symbol)?;
                check_price("last_price", last_price)?;
                check_price("bid_price", bid_price)?;
                check_price("ask_price", ask_price)?;

                let sequence = self.next_market_sequence(&symbol);
                Ok(EngineEvent::Market(MarketEvent {
                    symbol,
                    sequence,
                    timestamp,
                    payload: MarketPayload::Tick {
                        last_price,
                        bid_price,
                        ask_price,
                    },
                }))
            }
            RawVenueMessage::BookDelta {
                symbol,
                direction,
                price,
                quantity,
                timestamp,
            } => {
                self.check_instrument(&symbol)?;
                check_price("price", price)?;
                if !quantity.is_finite() || quantity < 0.0 {
                    return Err(malformed(format!("book delta quantity {}", quantity)));
                }

                let sequence = self.next_market_sequence(&symbol);
                Ok(EngineEvent::Market(MarketEvent {
                    symbol,
                    sequence,
                    timestamp,
                    payload: MarketPayload::BookDelta {
                        direction,
                        price,
                        quantity,
                    },
                }))
            }
            RawVenueMessage::Trade {
                symbol,
                price,
                quantity,
                timestamp,
            } => {
                self.check_instrument(&symbol)?;
                check_price("price", price)?;
                check_quantity(quantity)?;

                let sequence = self.next_market_sequence(&symbol);
                Ok(EngineEvent::Market(MarketEvent {
                    symbol,
                    sequence,
                    timestamp,
                    payload: MarketPayload::Trade { price, quantity },
                }))
            }
            RawVenueMessage::OrderAcknowledged {
                client_order_id,
                venue_order_id,
                timestamp,
            } => {
                if client_order_id.is_empty() {
                    return Err(malformed("acknowledgement without client order id"));
                }
                Ok(EngineEvent::Order(OrderUpdate {
                    client_order_id: Some(client_order_id),
                    venue_order_id: Some(venue_order_id.clone()),
                    sequence: self.next_session_sequence(),
                    timestamp,
                    kind: OrderUpdateKind::Acknowledged { venue_order_id },
                }))
            }
            RawVenueMessage::OrderRejected {
                client_order_id,
                reason,
                timestamp,
            } => {
                if client_order_id.is_empty() {
                    return Err(malformed("rejection without client order id"));
                }
                Ok(EngineEvent::Order(OrderUpdate {
                    client_order_id: Some(client_order_id),
                    venue_order_id: None,
                    sequence: self.next_session_sequence(),
                    timestamp,
                    kind: OrderUpdateKind::Rejected { reason },
                }))
            }
            RawVenueMessage::OrderCancelled {
                client_order_id,
                venue_order_id,
                timestamp,
            } => {
                if client_order_id.is_none() && venue_order_id.is_none() {
                    return Err(malformed("cancellation without any order id"));
                }
                Ok(EngineEvent::Order(OrderUpdate {
                    client_order_id,
                    venue_order_id,
                    sequence: self.next_session_sequence(),
                    timestamp,
                    kind: OrderUpdateKind::Cancelled,
                }))
            }
            RawVenueMessage::Fill {
                fill_id,
                client_order_id,
                venue_order_id,
                symbol,
                direction,
                quantity,
                price,
                liquidity,
                timestamp,
            } => {
                self.check_instrument(&symbol)?;
                check_price("price", price)?;
                check_quantity(quantity)?;
                if fill_id.is_empty() {
                    return Err(malformed("fill without fill id"));
                }
                if client_order_id.is_none() && venue_order_id.is_none() {
                    return Err(malformed(format!("fill {} without any order id", fill_id)));
                }

                let fill = FillData {
                    fill_id,
                    client_order_id: client_order_id.clone().unwrap_or_default(),
                    symbol,
                    direction,
                    quantity,
                    price,
                    timestamp,
                    liquidity,
                };
                Ok(EngineEvent::Order(OrderUpdate {
                    client_order_id,
                    venue_order_id,
                    sequence: self.next_session_sequence(),
                    timestamp,
                    kind: OrderUpdateKind::Fill(fill),
                }))
            }
            RawVenueMessage::Account {
                balance,
                positions,
                timestamp,
            } => {
                if !balance.is_finite() {
                    return Err(malformed(format!("account balance {}", balance)));
                }
                for report in &positions {
                    if !report.quantity.is_finite() {
                        return Err(malformed(format!(
                            "snapshot quantity {} for {}",
                            report.quantity, report.symbol
                        )));
                    }
                }
                Ok(EngineEvent::Account {
                    sequence: self.next_session_sequence(),
                    snapshot: AccountSnapshot {
                        timestamp,
                        balance,
                        positions,
                    },
                })
            }
        }
    }

    fn check_instrument(&self, symbol: &str) -> Result<(), EngineError> {
        if self.instruments.contains_key(symbol) {
            Ok(())
        } else {
            Err(EngineError::UnknownInstrument {
                symbol: symbol.to_string(),
            })
        }
    }

    fn next_market_sequence(&mut self, symbol: &str) -> u64 {
        let counter = self.market_sequences.entry(symbol.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    fn next_session_sequence(&mut self) -> u64 {
        self.session_sequence += 1;
        self.session_sequence
    }
}

fn malformed(reason: impl Into<String>) -> EngineError {
    EngineError::MalformedEvent {
        reason: reason.into(),
    }
}

fn check_price(field: &str, value: f64) -> Result<(), EngineError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(malformed(format!("{} {}", field, value)))
    }
}

fn check_quantity(value: f64) -> Result<(), EngineError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(malformed(format!("quantity {}", value)))
    }
}
