//! Position and margin ledger: the single source of truth for per-instrument
//! positions, PnL and margin usage.
//!
//! The ledger is mutated only by confirmed fills and account snapshots, and
//! only from the session's single logical thread of control. Readers get
//! `LedgerSnapshot` clones, so they always observe a fully-applied state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::object::{
    AccountSnapshot, DriftReport, FillData, Instrument, MarginState, PositionData,
};
use crate::utility::EPSILON;

/// Immutable read view over the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub timestamp: DateTime<Utc>,
    pub positions: HashMap<String, PositionData>,
    pub marks: HashMap<String, f64>,
    pub margin: MarginState,
}

impl LedgerSnapshot {
    /// Position for a symbol; flat when absent.
    pub fn position(&self, symbol: &str) -> PositionData {
        self.positions
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| PositionData::new(symbol))
    }

    /// Last mark price observed for a symbol.
    pub fn mark(&self, symbol: &str) -> Option<f64> {
        self.marks.get(symbol).copied()
    }
}

/// Position and margin ledger.
pub struct MarginLedger {
    instruments: Arc<HashMap<String, Instrument>>,
    positions: HashMap<String, PositionData>,
    marks: HashMap<String, f64>,
    balance: f64,
    drift_tolerance: f64,
}

impl MarginLedger {
    pub fn new(
        instruments: Arc<HashMap<String, Instrument>>,
        starting_balance: f64,
        drift_tolerance: f64,
    ) -> Self {
        Self {
            instruments,
            positions: HashMap::new(),
            marks: HashMap::new(),
            balance: starting_balance,
            drift_tolerance,
        }
    }

    /// Record the latest mark price for an instrument.
    pub fn update_mark(&mut self, symbol: &str, price: f64) {
        self.marks.insert(symbol.to_string(), price);
    }

    /// Apply one confirmed fill to its position.
    ///
    /// Signed-quantity arithmetic: same-direction fills recompute the
    /// weighted-average entry price, opposite-direction fills book realized
    /// PnL for the closed quantity, and a reversal opens the remainder at
    /// the fill price.
    pub fn apply_fill(&mut self, fill: &FillData) {
        let contract_size = self
            .instruments
            .get(&fill.symbol)
            .map(|instrument| instrument.contract_size)
            .unwrap_or(1.0);

        let position = self
            .positions
            .entry(fill.symbol.clone())
            .or_insert_with(|| PositionData::new(&fill.symbol));

        let signed = fill.quantity * fill.direction.sign();
        let old_quantity = position.quantity;
        let new_quantity = old_quantity + signed;

        if old_quantity.abs() <= EPSILON || old_quantity.signum() == signed.signum() {
            // Opening or increasing: weighted-average entry price.
            let total = old_quantity.abs() + fill.quantity;
            if total > EPSILON {
                position.avg_entry_price = (position.avg_entry_price * old_quantity.abs()
                    + fill.price * fill.quantity)
                    / total;
            }
        } else {
            // Reducing or reversing: realize PnL on the closed quantity.
            let closed = fill.quantity.min(old_quantity.abs());
            let realized =
                (fill.price - position.avg_entry_price) * closed * old_quantity.signum() * contract_size;
            position.realized_pnl += realized;
            self.balance += realized;

            if new_quantity.abs() <= EPSILON {
                position.avg_entry_price = 0.0;
            } else if new_quantity.signum() != old_quantity.signum() {
                // Reversal: remainder opens at the fill price.
                position.avg_entry_price = fill.price;
            }
        }

        position.quantity = if new_quantity.abs() <= EPSILON {
            0.0
        } else {
            new_quantity
        };

        self.marks.insert(fill.symbol.clone(), fill.price);
    }

    /// Reconcile the ledger against venue-reported truth.
    ///
    /// Positions disagreeing beyond the drift tolerance are reported; the
    /// venue state then overwrites local state in every case. Drift never
    /// halts the session.
    pub fn apply_snapshot(&mut self, snapshot: &AccountSnapshot) -> Vec<DriftReport> {
        let mut reports = Vec::new();
        let mut reported: HashMap<&str, f64> = HashMap::new();

        for report in &snapshot.positions {
            reported.insert(report.symbol.as_str(), report.quantity);
            let local = self
                .positions
                .get(&report.symbol)
                .map(|position| position.quantity)
                .unwrap_or(0.0);

            if (local - report.quantity).abs() > self.drift_tolerance {
                reports.push(DriftReport {
                    symbol: report.symbol.clone(),
                    local_quantity: local,
                    reported_quantity: report.quantity,
                });
            }

            let position = self
                .positions
                .entry(report.symbol.clone())
                .or_insert_with(|| PositionData::new(&report.symbol));
            position.quantity = report.quantity;
            position.avg_entry_price = report.avg_entry_price;
        }

        // Local positions the venue no longer reports are drift as well.
        for (symbol, position) in &mut self.positions {
            if reported.contains_key(symbol.as_str()) {
                continue;
            }
            if position.quantity.abs() > self.drift_tolerance {
                reports.push(DriftReport {
                    symbol: symbol.clone(),
                    local_quantity: position.quantity,
                    reported_quantity: 0.0,
                });
                position.quantity = 0.0;
                position.avg_entry_price = 0.0;
            }
        }

        self.balance = snapshot.balance;
        reports
    }

    /// Compute the current margin state from positions and mark prices.
    pub fn margin_state(&self) -> MarginState {
        let mut unrealized = 0.0;
        let mut used = 0.0;
        let mut maintenance = 0.0;

        for (symbol, position) in &self.positions {
            if position.is_flat() {
                continue;
            }
            let instrument = match self.instruments.get(symbol) {
                Some(instrument) => instrument,
                None => continue,
            };
            let mark = self
                .marks
                .get(symbol)
                .copied()
                .unwrap_or(position.avg_entry_price);

            let notional = position.quantity.abs() * mark * instrument.contract_size;
            unrealized += (mark - position.avg_entry_price)
                * position.quantity
                * instrument.contract_size;
            used += notional * instrument.margin_ratio;
            maintenance += notional * instrument.maintenance_ratio;
        }

        let equity = self.balance + unrealized;
        MarginState {
            balance: self.balance,
            unrealized_pnl: unrealized,
            used_margin: used,
            available_margin: equity - used,
            maintenance_margin: maintenance,
        }
    }

    /// Snapshot-consistent read view for the strategy host and risk gate.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            timestamp: Utc::now(),
            positions: self.positions.clone(),
            marks: self.marks.clone(),
            margin: self.margin_state(),
        }
    }

    /// Position for a symbol; flat when absent.
    pub fn position(&self, symbol: &str) -> PositionData {
        self.positions
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| PositionData::new(symbol))
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::{Direction, LiquidityFlag};

    fn instruments() -> Arc<HashMap<String, Instrument>> {
        let mut map = HashMap::new();
        let mut instrument = Instrument::new("BTC-PERP", 0.5, 1.0);
        instrument.margin_ratio = 0.1;
        instrument.maintenance_ratio = 0.05;
        map.insert("BTC-PERP".to_string(), instrument);
        Arc::new(map)
    }

    fn fill(direction: Direction, quantity: f64, price: f64) -> FillData {
        FillData {
            fill_id: uuid::Uuid::new_v4().to_string(),
            client_order_id: "c1".to_string(),
            symbol: "BTC-PERP".to_string(),
            direction,
            quantity,
            price,
            timestamp: Utc::now(),
            liquidity: LiquidityFlag::Taker,
        }
    }

    #[test]
    fn test_round_trip_pnl() {
        let mut ledger = MarginLedger::new(instruments(), 10_000.0, 1e-6);

        ledger.apply_fill(&fill(Direction::Long, 10.0, 100.0));
        let position = ledger.position("BTC-PERP");
        assert_eq!(position.quantity, 10.0);
        assert_eq!(position.avg_entry_price, 100.0);
        assert_eq!(position.realized_pnl, 0.0);

        ledger.apply_fill(&fill(Direction::Short, 10.0, 110.0));
        let position = ledger.position("BTC-PERP");
        assert!(position.is_flat());
        assert_eq!(position.realized_pnl, 100.0);
        assert_eq!(ledger.balance(), 10_100.0);
    }

    #[test]
    fn test_weighted_average_entry() {
        let mut ledger = MarginLedger::new(instruments(), 10_000.0, 1e-6);

        ledger.apply_fill(&fill(Direction::Long, 10.0, 100.0));
        ledger.apply_fill(&fill(Direction::Long, 10.0, 110.0));

        let position = ledger.position("BTC-PERP");
        assert_eq!(position.quantity, 20.0);
        assert!((position.avg_entry_price - 105.0).abs() < 1e-9);
    }

    #[test]
    fn test_reversal_opens_at_fill_price() {
        let mut ledger = MarginLedger::new(instruments(), 10_000.0, 1e-6);

        ledger.apply_fill(&fill(Direction::Long, 10.0, 100.0));
        ledger.apply_fill(&fill(Direction::Short, 15.0, 120.0));

        let position = ledger.position("BTC-PERP");
        assert_eq!(position.quantity, -5.0);
        assert_eq!(position.avg_entry_price, 120.0);
        // Realized on the 10 closed at +20 each.
        assert_eq!(position.realized_pnl, 200.0);
    }

    #[test]
    fn test_margin_state() {
        let mut ledger = MarginLedger::new(instruments(), 10_000.0, 1e-6);

        ledger.apply_fill(&fill(Direction::Long, 10.0, 100.0));
        ledger.update_mark("BTC-PERP", 110.0);

        let margin = ledger.margin_state();
        assert_eq!(margin.unrealized_pnl, 100.0);
        assert_eq!(margin.used_margin, 110.0); // 10 * 110 * 0.1
        assert_eq!(margin.maintenance_margin, 55.0);
        assert_eq!(margin.available_margin, 10_100.0 - 110.0);
    }

    #[test]
    fn test_snapshot_drift_detection() {
        let mut ledger = MarginLedger::new(instruments(), 10_000.0, 0.5);

        ledger.apply_fill(&fill(Direction::Long, 10.0, 100.0));

        let snapshot = AccountSnapshot {
            timestamp: Utc::now(),
            balance: 9_900.0,
            positions: vec![crate::object::PositionReport {
                symbol: "BTC-PERP".to_string(),
                quantity: 8.0,
                avg_entry_price: 100.0,
            }],
        };
        let reports = ledger.apply_snapshot(&snapshot);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].local_quantity, 10.0);
        assert_eq!(reports[0].reported_quantity, 8.0);

        // Venue truth overwrites local state.
        assert_eq!(ledger.position("BTC-PERP").quantity, 8.0);
        assert_eq!(ledger.balance(), 9_900.0);
    }

    #[test]
    fn test_snapshot_within_tolerance_is_silent() {
        let mut ledger = MarginLedger::new(instruments(), 10_000.0, 0.5);

        ledger.apply_fill(&fill(Direction::Long, 10.0, 100.0));

        let snapshot = AccountSnapshot {
            timestamp: Utc::now(),
            balance: 10_000.0,
            positions: vec![crate::object::PositionReport {
                symbol: "BTC-PERP".to_string(),
                quantity: 10.2,
                avg_entry_price: 100.0,
            }],
        };
        assert!(ledger.apply_snapshot(&snapshot).is_empty());
    }
}
