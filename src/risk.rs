//! Risk gate: validates order intents against margin, position-limit and
//! rate-limit policies before they reach the venue.
//!
//! Evaluation is pure and deterministic: the same (intent, snapshot, recent
//! submissions, config) always yields the same verdict. The session owns the
//! sliding submission window and passes it in, so the gate holds no mutable
//! state.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::constant::Direction;
use crate::ledger::LedgerSnapshot;
use crate::object::{Instrument, SubmitIntent};
use crate::setting::EngineConfig;
use crate::utility::{floor_to, EPSILON};

/// Risk gate verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Forward the intent unchanged
    Approve(SubmitIntent),
    /// Forward with a reduced quantity
    Clamp {
        requested: f64,
        intent: SubmitIntent,
    },
    /// Block the intent locally
    Reject { reason: String },
}

/// Stateless policy evaluator.
pub struct RiskGate {
    config: EngineConfig,
    instruments: Arc<HashMap<String, Instrument>>,
}

impl RiskGate {
    pub fn new(config: EngineConfig, instruments: Arc<HashMap<String, Instrument>>) -> Self {
        Self {
            config,
            instruments,
        }
    }

    /// Evaluate one submit intent against the current ledger snapshot.
    ///
    /// Policy order: basic validity, order rate, position cap (clamp),
    /// notional cap (clamp), margin buffer. The first rejecting policy wins.
    pub fn evaluate(
        &self,
        intent: &SubmitIntent,
        snapshot: &LedgerSnapshot,
        recent_submissions: &[DateTime<Utc>],
        now: DateTime<Utc>,
    ) -> Verdict {
        let instrument = match self.instruments.get(&intent.symbol) {
            Some(instrument) => instrument,
            None => {
                return Verdict::Reject {
                    reason: format!("unknown instrument {}", intent.symbol),
                }
            }
        };

        if !intent.quantity.is_finite() || intent.quantity <= 0.0 {
            return Verdict::Reject {
                reason: format!("invalid quantity {}", intent.quantity),
            };
        }
        if let Some(price) = intent.price {
            if !price.is_finite() || price <= 0.0 {
                return Verdict::Reject {
                    reason: format!("invalid price {}", price),
                };
            }
        }

        // Order rate within the configured window.
        let window_start = now - self.config.rate_window();
        let recent = recent_submissions
            .iter()
            .filter(|at| **at > window_start)
            .count();
        if recent >= self.config.max_order_rate as usize {
            return Verdict::Reject {
                reason: format!(
                    "order rate limit: {} submissions in the last {}s",
                    recent, self.config.max_order_rate_window_secs
                ),
            };
        }

        let mut quantity = intent.quantity;

        // Position cap per instrument: clamp to the room left in the
        // intent's direction.
        if let Some(cap) = self.config.max_position_per_instrument {
            let position = snapshot.position(&intent.symbol).quantity;
            let projected = position + quantity * intent.direction.sign();
            if projected.abs() > cap + EPSILON {
                let room = match intent.direction {
                    Direction::Long => cap - position,
                    Direction::Short => cap + position,
                };
                quantity = floor_to(room.max(0.0), instrument.lot_size);
                if quantity <= EPSILON {
                    return Verdict::Reject {
                        reason: format!(
                            "position cap {} reached for {}",
                            cap, intent.symbol
                        ),
                    };
                }
            }
        }

        // Reference price for notional and margin checks: the limit price,
        // else the last mark. Without either, those checks are skipped.
        let reference_price = intent.price.or_else(|| snapshot.mark(&intent.symbol));

        if let (Some(max_notional), Some(price)) =
            (self.config.max_order_notional, reference_price)
        {
            let notional = quantity * price * instrument.contract_size;
            if notional > max_notional + EPSILON {
                let allowed = max_notional / (price * instrument.contract_size);
                quantity = floor_to(allowed, instrument.lot_size);
                if quantity <= EPSILON {
                    return Verdict::Reject {
                        reason: format!("order notional above cap {}", max_notional),
                    };
                }
            }
        }

        if quantity < instrument.min_volume - EPSILON {
            return Verdict::Reject {
                reason: format!(
                    "quantity {} below instrument minimum {}",
                    quantity, instrument.min_volume
                ),
            };
        }

        // Margin buffer after the hypothetical fill. A zero ratio disables
        // the policy and leaves margin rejects to the venue.
        if let (true, Some(price)) = (self.config.margin_buffer_ratio > 0.0, reference_price) {
            let added_margin = quantity * price * instrument.contract_size * instrument.margin_ratio;
            let equity = snapshot.margin.equity();
            let available_after = snapshot.margin.available_margin - added_margin;
            if available_after < equity * self.config.margin_buffer_ratio - EPSILON {
                return Verdict::Reject {
                    reason: format!(
                        "insufficient margin: {:.2} available after fill, buffer requires {:.2}",
                        available_after,
                        equity * self.config.margin_buffer_ratio
                    ),
                };
            }
        }

        if (quantity - intent.quantity).abs() <= EPSILON {
            Verdict::Approve(intent.clone())
        } else {
            let mut adjusted = intent.clone();
            adjusted.quantity = quantity;
            Verdict::Clamp {
                requested: intent.quantity,
                intent: adjusted,
            }
        }
    }
}
