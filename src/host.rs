//! Strategy host: runs strategy callbacks behind a fault-isolation boundary.
//!
//! A panicking or erroring handler never takes the session down. The failure
//! is logged with the triggering event, the callback's intents are discarded
//! and the engine keeps processing. Callbacks run on the engine's single
//! event loop, so there is no handler reentrancy.

use chrono::{DateTime, Utc};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, info};

use crate::error::StrategyError;
use crate::event::OrderUpdate;
use crate::ledger::LedgerSnapshot;
use crate::object::{MarketEvent, OrderData, OrderIntent, SessionNotice};
use crate::strategy::{Strategy, StrategyContext};

/// Outcome of one hosted callback.
pub struct CallbackResult {
    pub intents: Vec<OrderIntent>,
    pub failed: bool,
}

/// Wraps a strategy and isolates its faults from the engine.
pub struct StrategyHost {
    strategy: Box<dyn Strategy>,
    fault_count: u64,
}

impl StrategyHost {
    pub fn new(strategy: Box<dyn Strategy>) -> Self {
        Self {
            strategy,
            fault_count: 0,
        }
    }

    pub fn strategy_name(&self) -> String {
        self.strategy.name().to_string()
    }

    /// Number of callbacks that panicked or returned an error so far.
    pub fn fault_count(&self) -> u64 {
        self.fault_count
    }

    pub fn on_start(
        &mut self,
        snapshot: &LedgerSnapshot,
        open_orders: &[OrderData],
        now: DateTime<Utc>,
    ) -> CallbackResult {
        info!(strategy = self.strategy.name(), "strategy starting");
        self.run("on_start", snapshot, open_orders, now, |strategy, context| {
            strategy.on_start(context)
        })
    }

    pub fn on_market_event(
        &mut self,
        event: &MarketEvent,
        snapshot: &LedgerSnapshot,
        open_orders: &[OrderData],
        now: DateTime<Utc>,
    ) -> CallbackResult {
        self.run(
            &format!("on_market_event {} seq {}", event.symbol, event.sequence),
            snapshot,
            open_orders,
            now,
            |strategy, context| strategy.on_market_event(event, context),
        )
    }

    pub fn on_order_update(
        &mut self,
        update: &OrderUpdate,
        order: &OrderData,
        snapshot: &LedgerSnapshot,
        open_orders: &[OrderData],
        now: DateTime<Utc>,
    ) -> CallbackResult {
        self.run(
            &format!("on_order_update {}", order.client_order_id),
            snapshot,
            open_orders,
            now,
            |strategy, context| strategy.on_order_update(update, order, context),
        )
    }

    pub fn on_timer(
        &mut self,
        at: DateTime<Utc>,
        snapshot: &LedgerSnapshot,
        open_orders: &[OrderData],
    ) -> CallbackResult {
        self.run("on_timer", snapshot, open_orders, at, |strategy, context| {
            strategy.on_timer(at, context)
        })
    }

    pub fn on_notice(
        &mut self,
        notice: &SessionNotice,
        snapshot: &LedgerSnapshot,
        open_orders: &[OrderData],
        now: DateTime<Utc>,
    ) -> CallbackResult {
        self.run("on_notice", snapshot, open_orders, now, |strategy, context| {
            strategy.on_notice(notice, context)
        })
    }

    pub fn on_shutdown(
        &mut self,
        snapshot: &LedgerSnapshot,
        open_orders: &[OrderData],
        now: DateTime<Utc>,
    ) -> CallbackResult {
        info!(strategy = self.strategy.name(), "strategy shutting down");
        self.run("on_shutdown", snapshot, open_orders, now, |strategy, context| {
            strategy.on_shutdown(context)
        })
    }

    pub fn save_state(&self) -> serde_json::Value {
        self.strategy.save_state()
    }

    pub fn restore_state(&mut self, state: &serde_json::Value) {
        self.strategy.restore_state(state);
    }

    fn run<F>(
        &mut self,
        callback: &str,
        snapshot: &LedgerSnapshot,
        open_orders: &[OrderData],
        now: DateTime<Utc>,
        handler: F,
    ) -> CallbackResult
    where
        F: FnOnce(&mut dyn Strategy, &mut StrategyContext) -> Result<(), StrategyError>,
    {
        let name = self.strategy.name().to_string();
        let mut context = StrategyContext::new(&name, snapshot, open_orders, now);

        let strategy = &mut self.strategy;
        let outcome = catch_unwind(AssertUnwindSafe(|| handler(strategy.as_mut(), &mut context)));

        match outcome {
            Ok(Ok(())) => {
                let intents = context.into_intents();
                if !intents.is_empty() {
                    debug!(
                        strategy = name.as_str(),
                        callback,
                        count = intents.len(),
                        "collected order intents"
                    );
                }
                CallbackResult {
                    intents,
                    failed: false,
                }
            }
            Ok(Err(fault)) => {
                self.fault_count += 1;
                error!(
                    strategy = name.as_str(),
                    callback,
                    error = %fault,
                    "strategy handler failed, intents discarded"
                );
                CallbackResult {
                    intents: Vec::new(),
                    failed: true,
                }
            }
            Err(payload) => {
                self.fault_count += 1;
                let message = panic_message(&payload);
                error!(
                    strategy = name.as_str(),
                    callback,
                    panic = message.as_str(),
                    "strategy handler panicked, intents discarded"
                );
                CallbackResult {
                    intents: Vec::new(),
                    failed: true,
                }
            }
        }
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
