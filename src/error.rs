//! Error taxonomy of the engine.
//!
//! No error in the normal trading path is fatal to the session: malformed
//! events are skipped, orphan updates and drift are reported, timeouts expire
//! the affected order. Only the loss of all input sources forces shutdown.

use thiserror::Error;

use crate::constant::Status;

/// Errors raised by engine components.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Raw venue input failed validation; the event is logged and skipped
    /// without advancing any sequence counter.
    #[error("malformed event: {reason}")]
    MalformedEvent { reason: String },

    /// Order update matched neither a client order id nor a venue order id.
    #[error("orphan update: {description}")]
    OrphanUpdate { description: String },

    /// Cancel requested on an order already in a terminal state.
    #[error("order {client_order_id} already terminal ({status})")]
    AlreadyTerminal {
        client_order_id: String,
        status: Status,
    },

    /// Update would move an order backward in its state machine.
    #[error("order {client_order_id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        client_order_id: String,
        from: Status,
        to: Status,
    },

    /// Fill id already applied; the fill is ignored.
    #[error("duplicate fill {fill_id} for order {client_order_id}")]
    DuplicateFill {
        fill_id: String,
        client_order_id: String,
    },

    /// Fill would push traded quantity beyond the requested quantity.
    #[error("overfill on order {client_order_id}: traded {traded} + fill {fill_quantity} > quantity {quantity}")]
    OverFill {
        client_order_id: String,
        traded: f64,
        fill_quantity: f64,
        quantity: f64,
    },

    /// Intent referenced an instrument not present in the instrument table.
    #[error("unknown instrument: {symbol}")]
    UnknownInstrument { symbol: String },

    /// Failure reported by the venue collaborator.
    #[error("venue error: {0}")]
    Venue(String),
}

/// Error raised by a strategy handler, caught at the host boundary.
#[derive(Debug, Error)]
#[error("strategy error: {message}")]
pub struct StrategyError {
    pub message: String,
}

impl StrategyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for StrategyError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for StrategyError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_is_std_error() {
        // Field names must not trip thiserror's implicit #[source] handling.
        let err: Box<dyn std::error::Error> = Box::new(EngineError::UnknownInstrument {
            symbol: "BTC-PERP".to_string(),
        });
        assert!(err.source().is_none());
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::MalformedEvent {
            reason: "negative quantity".to_string(),
        };
        assert_eq!(err.to_string(), "malformed event: negative quantity");

        let err = EngineError::AlreadyTerminal {
            client_order_id: "c1".to_string(),
            status: Status::Filled,
        };
        assert!(err.to_string().contains("already terminal"));
    }
}
