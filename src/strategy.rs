//! Strategy trait and the capability context handed to strategy callbacks.
//!
//! Strategies never touch the venue or the ledger directly: reads go through
//! the snapshot captured before the callback, writes are collected as order
//! intents and routed through the risk gate after the callback returns.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use crate::constant::{Direction, OrderType};
use crate::error::StrategyError;
use crate::ledger::LedgerSnapshot;
use crate::object::{
    MarketEvent, OrderData, OrderIntent, PositionData, SessionNotice, SubmitIntent,
};
use crate::event::OrderUpdate;

/// Capability set exposed to a strategy for the duration of one callback.
///
/// All reads come from the ledger snapshot taken before the callback began,
/// so a strategy observes one consistent state per event.
pub struct StrategyContext<'a> {
    strategy_name: &'a str,
    snapshot: &'a LedgerSnapshot,
    open_orders: &'a [OrderData],
    now: DateTime<Utc>,
    intents: Vec<OrderIntent>,
}

impl<'a> StrategyContext<'a> {
    pub fn new(
        strategy_name: &'a str,
        snapshot: &'a LedgerSnapshot,
        open_orders: &'a [OrderData],
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            strategy_name,
            snapshot,
            open_orders,
            now,
            intents: Vec::new(),
        }
    }

    /// Engine time of the event being handled.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Position for a symbol, flat when none exists.
    pub fn position(&self, symbol: &str) -> PositionData {
        self.snapshot.position(symbol)
    }

    /// Last mark price seen for a symbol.
    pub fn mark(&self, symbol: &str) -> Option<f64> {
        self.snapshot.mark(symbol)
    }

    /// Ledger snapshot the callback is running against.
    pub fn ledger(&self) -> &LedgerSnapshot {
        self.snapshot
    }

    /// Orders still working at the venue.
    pub fn open_orders(&self) -> &[OrderData] {
        self.open_orders
    }

    /// Request a buy order. Returns the client order id the engine will use
    /// if the intent passes the risk gate.
    pub fn buy(
        &mut self,
        symbol: &str,
        order_type: OrderType,
        quantity: f64,
        price: Option<f64>,
    ) -> String {
        self.submit(symbol, Direction::Long, order_type, quantity, price)
    }

    /// Request a sell order.
    pub fn sell(
        &mut self,
        symbol: &str,
        order_type: OrderType,
        quantity: f64,
        price: Option<f64>,
    ) -> String {
        self.submit(symbol, Direction::Short, order_type, quantity, price)
    }

    fn submit(
        &mut self,
        symbol: &str,
        direction: Direction,
        order_type: OrderType,
        quantity: f64,
        price: Option<f64>,
    ) -> String {
        let intent = SubmitIntent::new(symbol, direction, order_type, quantity, price);
        let client_order_id = intent.client_order_id.clone();
        self.intents.push(OrderIntent::Submit(intent));
        client_order_id
    }

    /// Request cancellation of a working order.
    pub fn cancel(&mut self, client_order_id: &str) {
        self.intents.push(OrderIntent::Cancel {
            client_order_id: client_order_id.to_string(),
        });
    }

    /// Write a line to the session log under the strategy's name.
    pub fn write_log(&self, message: &str) {
        info!(strategy = self.strategy_name, "{}", message);
    }

    /// Intents collected during the callback, in request order.
    pub fn into_intents(self) -> Vec<OrderIntent> {
        self.intents
    }
}

/// User strategy plugged into the session engine.
///
/// Every handler has a no-op default, so a strategy implements only the
/// callbacks it cares about. Handlers run on the engine's event loop and
/// must not block.
pub trait Strategy: Send {
    /// Name used in logs and notices.
    fn name(&self) -> &str;

    /// Called once before the first event.
    fn on_start(&mut self, _context: &mut StrategyContext) -> Result<(), StrategyError> {
        Ok(())
    }

    /// Called for every normalized market event.
    fn on_market_event(
        &mut self,
        _event: &MarketEvent,
        _context: &mut StrategyContext,
    ) -> Result<(), StrategyError> {
        Ok(())
    }

    /// Called for every update applied to one of the strategy's orders.
    fn on_order_update(
        &mut self,
        _update: &OrderUpdate,
        _order: &OrderData,
        _context: &mut StrategyContext,
    ) -> Result<(), StrategyError> {
        Ok(())
    }

    /// Called on each timer tick.
    fn on_timer(
        &mut self,
        _at: DateTime<Utc>,
        _context: &mut StrategyContext,
    ) -> Result<(), StrategyError> {
        Ok(())
    }

    /// Called for local session notices such as drift or timeouts.
    fn on_notice(
        &mut self,
        _notice: &SessionNotice,
        _context: &mut StrategyContext,
    ) -> Result<(), StrategyError> {
        Ok(())
    }

    /// Called once during orderly shutdown, after active orders have been
    /// cancelled.
    fn on_shutdown(&mut self, _context: &mut StrategyContext) -> Result<(), StrategyError> {
        Ok(())
    }

    /// Serialize strategy variables for persistence across sessions.
    fn save_state(&self) -> Value {
        Value::Null
    }

    /// Restore variables saved by a previous session.
    fn restore_state(&mut self, _state: &Value) {}
}
