//! Order manager: tracks the lifecycle of every order the strategy submits.
//!
//! All mutation happens on the session's single logical thread of control;
//! the rest of the engine only ever sees cloned `OrderData`.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};

use crate::constant::Status;
use crate::error::EngineError;
use crate::event::{OrderUpdate, OrderUpdateKind};
use crate::object::{FillData, OrderData, SubmitIntent};
use crate::utility::EPSILON;

/// Result of applying an order update: the refreshed order, plus the fill
/// that should flow into the ledger when the update carried one.
#[derive(Debug, Clone)]
pub struct AppliedUpdate {
    pub order: OrderData,
    pub fill: Option<FillData>,
}

/// Order management system.
pub struct OrderManager {
    orders: HashMap<String, OrderData>,
    /// venue order id -> client order id, for matching updates that only
    /// carry the venue id
    venue_index: HashMap<String, String>,
    applied_fills: HashSet<String>,
    order_timeout: Duration,
    /// Submitted orders awaiting acknowledgement, with their deadlines
    ack_deadlines: HashMap<String, DateTime<Utc>>,
}

impl OrderManager {
    pub fn new(order_timeout: Duration) -> Self {
        Self {
            orders: HashMap::new(),
            venue_index: HashMap::new(),
            applied_fills: HashSet::new(),
            order_timeout,
            ack_deadlines: HashMap::new(),
        }
    }

    /// Create a local order record from a risk-approved intent.
    ///
    /// Submission is idempotent: an intent reusing a known client order id is
    /// a no-op returning the existing record.
    pub fn submit(&mut self, intent: &SubmitIntent, now: DateTime<Utc>) -> OrderData {
        if let Some(existing) = self.orders.get(&intent.client_order_id) {
            tracing::debug!(
                client_order_id = %intent.client_order_id,
                "duplicate submission ignored"
            );
            return existing.clone();
        }

        let order = OrderData::new(
            intent.client_order_id.clone(),
            intent.symbol.clone(),
            intent.direction,
            intent.order_type,
            intent.quantity,
            intent.price,
            now,
        );
        self.orders
            .insert(intent.client_order_id.clone(), order.clone());
        order
    }

    /// Mark an order as forwarded to the venue and start its ack deadline.
    pub fn mark_submitted(
        &mut self,
        client_order_id: &str,
        now: DateTime<Utc>,
    ) -> Result<OrderData, EngineError> {
        let deadline = now + self.order_timeout;
        let order = self.transition(client_order_id, Status::Submitted, now)?;
        self.ack_deadlines
            .insert(client_order_id.to_string(), deadline);
        Ok(order)
    }

    /// Request cancellation of a working order. Terminal orders yield a
    /// non-fatal `AlreadyTerminal` error.
    pub fn request_cancel(&self, client_order_id: &str) -> Result<OrderData, EngineError> {
        let order = self
            .orders
            .get(client_order_id)
            .ok_or_else(|| EngineError::OrphanUpdate {
                description: format!("cancel for unknown order {}", client_order_id),
            })?;

        if order.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal {
                client_order_id: client_order_id.to_string(),
                status: order.status,
            });
        }
        Ok(order.clone())
    }

    /// Apply a venue order update, matching by client order id first and
    /// venue order id thereafter. Unmatched updates are `OrphanUpdate`s and
    /// mutate nothing.
    pub fn apply_update(
        &mut self,
        update: &OrderUpdate,
        now: DateTime<Utc>,
    ) -> Result<AppliedUpdate, EngineError> {
        let client_order_id = self.resolve(update)?;

        match &update.kind {
            OrderUpdateKind::Acknowledged { venue_order_id } => {
                self.transition(&client_order_id, Status::Acknowledged, now)?;
                self.ack_deadlines.remove(&client_order_id);
                self.venue_index
                    .insert(venue_order_id.clone(), client_order_id.clone());
                let record = self
                    .orders
                    .get_mut(&client_order_id)
                    .expect("order exists after transition");
                record.venue_order_id = Some(venue_order_id.clone());
                Ok(AppliedUpdate {
                    order: record.clone(),
                    fill: None,
                })
            }
            OrderUpdateKind::Rejected { reason } => {
                let order = self.transition(&client_order_id, Status::Rejected, now)?;
                self.ack_deadlines.remove(&client_order_id);
                tracing::info!(client_order_id = %client_order_id, reason = %reason, "order rejected by venue");
                Ok(AppliedUpdate { order, fill: None })
            }
            OrderUpdateKind::Cancelled => {
                let order = self.transition(&client_order_id, Status::Cancelled, now)?;
                self.ack_deadlines.remove(&client_order_id);
                Ok(AppliedUpdate { order, fill: None })
            }
            OrderUpdateKind::Fill(fill) => self.apply_fill(&client_order_id, fill, now),
        }
    }

    /// Apply a fill to its order, deduplicating by fill id and guarding the
    /// requested quantity.
    fn apply_fill(
        &mut self,
        client_order_id: &str,
        fill: &FillData,
        now: DateTime<Utc>,
    ) -> Result<AppliedUpdate, EngineError> {
        if self.applied_fills.contains(&fill.fill_id) {
            return Err(EngineError::DuplicateFill {
                fill_id: fill.fill_id.clone(),
                client_order_id: client_order_id.to_string(),
            });
        }

        let order = self
            .orders
            .get(client_order_id)
            .expect("resolved order exists");

        if order.status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                client_order_id: client_order_id.to_string(),
                from: order.status,
                to: Status::PartiallyFilled,
            });
        }
        if order.traded + fill.quantity > order.quantity + EPSILON {
            return Err(EngineError::OverFill {
                client_order_id: client_order_id.to_string(),
                traded: order.traded,
                fill_quantity: fill.quantity,
                quantity: order.quantity,
            });
        }

        let target = if order.traded + fill.quantity >= order.quantity - EPSILON {
            Status::Filled
        } else {
            Status::PartiallyFilled
        };
        self.transition(client_order_id, target, now)?;

        let record = self
            .orders
            .get_mut(client_order_id)
            .expect("order exists after transition");
        record.traded += fill.quantity;
        self.applied_fills.insert(fill.fill_id.clone());
        self.ack_deadlines.remove(client_order_id);

        // The fill carries the resolved client order id onward to the ledger.
        let mut fill = fill.clone();
        fill.client_order_id = client_order_id.to_string();

        Ok(AppliedUpdate {
            order: record.clone(),
            fill: Some(fill),
        })
    }

    /// Expire submitted orders whose acknowledgement deadline has passed.
    /// Returns the expired orders; the session reports one timeout notice
    /// per order.
    pub fn expire_stale(&mut self, now: DateTime<Utc>) -> Vec<OrderData> {
        let stale: Vec<String> = self
            .ack_deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();

        let mut expired = Vec::new();
        for client_order_id in stale {
            self.ack_deadlines.remove(&client_order_id);
            match self.transition(&client_order_id, Status::Expired, now) {
                Ok(order) => {
                    tracing::warn!(client_order_id = %client_order_id, "order expired without acknowledgement");
                    expired.push(order);
                }
                Err(err) => {
                    tracing::debug!(error = %err, "stale order already advanced");
                }
            }
        }
        expired
    }

    /// Get a read-only copy of one order.
    pub fn get_order(&self, client_order_id: &str) -> Option<OrderData> {
        self.orders.get(client_order_id).cloned()
    }

    /// Get copies of all orders still working at the venue.
    pub fn active_orders(&self) -> Vec<OrderData> {
        self.orders
            .values()
            .filter(|order| order.is_active())
            .cloned()
            .collect()
    }

    /// Get copies of all known orders.
    pub fn all_orders(&self) -> Vec<OrderData> {
        self.orders.values().cloned().collect()
    }

    /// Resolve an update to a client order id, client id first, venue id
    /// thereafter.
    fn resolve(&self, update: &OrderUpdate) -> Result<String, EngineError> {
        if let Some(client_order_id) = &update.client_order_id {
            if self.orders.contains_key(client_order_id) {
                return Ok(client_order_id.clone());
            }
        }
        if let Some(venue_order_id) = &update.venue_order_id {
            if let Some(client_order_id) = self.venue_index.get(venue_order_id) {
                return Ok(client_order_id.clone());
            }
        }
        Err(EngineError::OrphanUpdate {
            description: format!(
                "update for client={:?} venue={:?} matches no order",
                update.client_order_id, update.venue_order_id
            ),
        })
    }

    /// Perform a monotonic state transition, rejecting regression.
    fn transition(
        &mut self,
        client_order_id: &str,
        to: Status,
        now: DateTime<Utc>,
    ) -> Result<OrderData, EngineError> {
        let order = self
            .orders
            .get_mut(client_order_id)
            .ok_or_else(|| EngineError::OrphanUpdate {
                description: format!("transition for unknown order {}", client_order_id),
            })?;

        let from = order.status;
        if from.is_terminal() || to.rank() < from.rank() {
            return Err(EngineError::InvalidTransition {
                client_order_id: client_order_id.to_string(),
                from,
                to,
            });
        }

        order.status = to;
        order.updated_at = now;
        Ok(order.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::{Direction, LiquidityFlag, OrderType};

    fn manager() -> OrderManager {
        OrderManager::new(Duration::seconds(10))
    }

    fn intent(quantity: f64) -> SubmitIntent {
        SubmitIntent::new("BTC-PERP", Direction::Long, OrderType::Limit, quantity, Some(100.0))
    }

    fn ack(client_order_id: &str, venue_order_id: &str) -> OrderUpdate {
        OrderUpdate {
            client_order_id: Some(client_order_id.to_string()),
            venue_order_id: Some(venue_order_id.to_string()),
            sequence: 1,
            timestamp: Utc::now(),
            kind: OrderUpdateKind::Acknowledged {
                venue_order_id: venue_order_id.to_string(),
            },
        }
    }

    fn fill(client_order_id: &str, fill_id: &str, quantity: f64) -> OrderUpdate {
        let now = Utc::now();
        OrderUpdate {
            client_order_id: Some(client_order_id.to_string()),
            venue_order_id: None,
            sequence: 2,
            timestamp: now,
            kind: OrderUpdateKind::Fill(FillData {
                fill_id: fill_id.to_string(),
                client_order_id: client_order_id.to_string(),
                symbol: "BTC-PERP".to_string(),
                direction: Direction::Long,
                quantity,
                price: 100.0,
                timestamp: now,
                liquidity: LiquidityFlag::Taker,
            }),
        }
    }

    #[test]
    fn test_idempotent_submission() {
        let mut manager = manager();
        let intent = intent(10.0);
        let now = Utc::now();

        let first = manager.submit(&intent, now);
        let second = manager.submit(&intent, now);
        assert_eq!(first.client_order_id, second.client_order_id);
        assert_eq!(manager.all_orders().len(), 1);
    }

    #[test]
    fn test_lifecycle_to_filled() {
        let mut manager = manager();
        let intent = intent(10.0);
        let now = Utc::now();

        manager.submit(&intent, now);
        manager.mark_submitted(&intent.client_order_id, now).unwrap();

        let applied = manager
            .apply_update(&ack(&intent.client_order_id, "v1"), now)
            .unwrap();
        assert_eq!(applied.order.status, Status::Acknowledged);
        assert_eq!(applied.order.venue_order_id.as_deref(), Some("v1"));

        let applied = manager
            .apply_update(&fill(&intent.client_order_id, "f1", 4.0), now)
            .unwrap();
        assert_eq!(applied.order.status, Status::PartiallyFilled);
        assert_eq!(applied.order.traded, 4.0);

        let applied = manager
            .apply_update(&fill(&intent.client_order_id, "f2", 6.0), now)
            .unwrap();
        assert_eq!(applied.order.status, Status::Filled);
        assert!(applied.order.is_fully_traded());
    }

    #[test]
    fn test_duplicate_fill_rejected() {
        let mut manager = manager();
        let intent = intent(10.0);
        let now = Utc::now();

        manager.submit(&intent, now);
        manager.mark_submitted(&intent.client_order_id, now).unwrap();
        manager
            .apply_update(&fill(&intent.client_order_id, "f1", 4.0), now)
            .unwrap();

        let result = manager.apply_update(&fill(&intent.client_order_id, "f1", 4.0), now);
        assert!(matches!(result, Err(EngineError::DuplicateFill { .. })));

        let order = manager.get_order(&intent.client_order_id).unwrap();
        assert_eq!(order.traded, 4.0);
    }

    #[test]
    fn test_overfill_rejected() {
        let mut manager = manager();
        let intent = intent(10.0);
        let now = Utc::now();

        manager.submit(&intent, now);
        manager.mark_submitted(&intent.client_order_id, now).unwrap();

        let result = manager.apply_update(&fill(&intent.client_order_id, "f1", 11.0), now);
        assert!(matches!(result, Err(EngineError::OverFill { .. })));
    }

    #[test]
    fn test_orphan_update() {
        let mut manager = manager();
        let result = manager.apply_update(&ack("ghost", "v9"), Utc::now());
        assert!(matches!(result, Err(EngineError::OrphanUpdate { .. })));
    }

    #[test]
    fn test_match_by_venue_id() {
        let mut manager = manager();
        let intent = intent(10.0);
        let now = Utc::now();

        manager.submit(&intent, now);
        manager.mark_submitted(&intent.client_order_id, now).unwrap();
        manager
            .apply_update(&ack(&intent.client_order_id, "v1"), now)
            .unwrap();

        // Update carrying only the venue id still resolves.
        let update = OrderUpdate {
            client_order_id: None,
            venue_order_id: Some("v1".to_string()),
            sequence: 3,
            timestamp: now,
            kind: OrderUpdateKind::Cancelled,
        };
        let applied = manager.apply_update(&update, now).unwrap();
        assert_eq!(applied.order.status, Status::Cancelled);
    }

    #[test]
    fn test_cancel_terminal_order() {
        let mut manager = manager();
        let intent = intent(10.0);
        let now = Utc::now();

        manager.submit(&intent, now);
        manager.mark_submitted(&intent.client_order_id, now).unwrap();
        manager
            .apply_update(&fill(&intent.client_order_id, "f1", 10.0), now)
            .unwrap();

        let result = manager.request_cancel(&intent.client_order_id);
        assert!(matches!(result, Err(EngineError::AlreadyTerminal { .. })));
    }

    #[test]
    fn test_expire_stale() {
        let mut manager = OrderManager::new(Duration::seconds(2));
        let intent = intent(10.0);
        let now = Utc::now();

        manager.submit(&intent, now);
        manager.mark_submitted(&intent.client_order_id, now).unwrap();

        // Before the deadline nothing expires.
        assert!(manager.expire_stale(now + Duration::seconds(1)).is_empty());

        let expired = manager.expire_stale(now + Duration::seconds(3));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].status, Status::Expired);

        // A second sweep reports nothing further.
        assert!(manager.expire_stale(now + Duration::seconds(4)).is_empty());
    }

    #[test]
    fn test_ack_after_fill_is_regression() {
        let mut manager = manager();
        let intent = intent(10.0);
        let now = Utc::now();

        manager.submit(&intent, now);
        manager.mark_submitted(&intent.client_order_id, now).unwrap();
        manager
            .apply_update(&fill(&intent.client_order_id, "f1", 10.0), now)
            .unwrap();

        let result = manager.apply_update(&ack(&intent.client_order_id, "v1"), now);
        assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));
    }
}
