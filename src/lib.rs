//! Margin Engine - a strategy-execution runtime for margin trading venues
//!
//! This crate provides the runtime a trading strategy plugs into:
//!
//! - Event normalization over raw venue feeds
//! - Deterministic multi-source event merging
//! - Order lifecycle management with timeout expiry
//! - Position and margin ledger with drift reconciliation
//! - Pre-trade risk gating (position, notional, rate, margin buffer)
//! - Fault-isolated strategy hosting
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use margin_engine::{
//!     EngineConfig, Instrument, SessionEngine, Strategy, VenueGateway,
//! };
//!
//! struct Passive;
//!
//! impl Strategy for Passive {
//!     fn name(&self) -> &str {
//!         "passive"
//!     }
//! }
//!
//! async fn start(venue: Arc<dyn VenueGateway>) {
//!     let config = EngineConfig::load();
//!     let mut instruments = HashMap::new();
//!     instruments.insert(
//!         "BTC-PERP".to_string(),
//!         Instrument::new("BTC-PERP", 0.5, 0.001),
//!     );
//!
//!     let mut session = SessionEngine::new(config, instruments, venue, Box::new(Passive));
//!     session.run().await.unwrap();
//! }
//! ```

pub mod constant;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod host;
pub mod ledger;
pub mod logger;
pub mod normalizer;
pub mod object;
pub mod orders;
pub mod risk;
pub mod session;
pub mod setting;
pub mod strategy;
pub mod utility;
pub mod venue;

// Re-export commonly used types
pub use constant::{
    Direction, LiquidityFlag, OrderType, SessionState, SourceKind, Status,
};
pub use dispatcher::{EventDispatcher, ShutdownHandle};
pub use error::{EngineError, StrategyError};
pub use event::{EngineEvent, OrderUpdate, OrderUpdateKind, SequencedEvent};
pub use host::{CallbackResult, StrategyHost};
pub use ledger::{LedgerSnapshot, MarginLedger};
pub use logger::init_logger;
pub use normalizer::EventNormalizer;
pub use object::{
    AccountSnapshot, DriftReport, FillData, Instrument, MarginState, MarketEvent,
    MarketPayload, OrderData, OrderIntent, PositionData, PositionReport, SessionNotice,
    SubmitIntent,
};
pub use orders::{AppliedUpdate, OrderManager};
pub use risk::{RiskGate, Verdict};
pub use session::SessionEngine;
pub use setting::{EngineConfig, LogConfig};
pub use strategy::{Strategy, StrategyContext};
pub use venue::{RawVenueMessage, VenueFeedSender, VenueGateway};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
