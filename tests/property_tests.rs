//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Fill accounting — traded quantity never exceeds the requested quantity
//! 2. Status monotonicity — order state never regresses, terminal is final
//! 3. Idempotent submission — resubmitting an intent creates nothing new
//! 4. Risk determinism — identical inputs always produce the same verdict
//! 5. Merge stability — event ordering is independent of arrival permutation
//! 6. Ledger round trip — opening and fully closing leaves a flat position

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use margin_engine::{
    Direction, EngineConfig, EngineEvent, EventNormalizer, FillData, Instrument,
    LiquidityFlag, MarginLedger, MarketEvent, MarketPayload, OrderManager, OrderType,
    OrderUpdate, OrderUpdateKind, RawVenueMessage, RiskGate, SequencedEvent, Status,
    SubmitIntent, Verdict,
};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_quantity() -> impl Strategy<Value = f64> {
    (1.0..1000.0_f64).prop_map(|q| q.round())
}

fn arb_price() -> impl Strategy<Value = f64> {
    (10.0..500.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Long), Just(Direction::Short)]
}

fn instruments() -> Arc<HashMap<String, Instrument>> {
    let mut map = HashMap::new();
    let mut instrument = Instrument::new("BTC-PERP", 0.5, 1.0);
    instrument.margin_ratio = 0.1;
    map.insert("BTC-PERP".to_string(), instrument);
    Arc::new(map)
}

fn intent(quantity: f64, price: f64) -> SubmitIntent {
    SubmitIntent::new(
        "BTC-PERP",
        Direction::Long,
        OrderType::Limit,
        quantity,
        Some(price),
    )
}

fn fill_update(client_order_id: &str, fill_id: &str, quantity: f64, price: f64) -> OrderUpdate {
    let now = Utc::now();
    OrderUpdate {
        client_order_id: Some(client_order_id.to_string()),
        venue_order_id: None,
        sequence: 1,
        timestamp: now,
        kind: OrderUpdateKind::Fill(FillData {
            fill_id: fill_id.to_string(),
            client_order_id: client_order_id.to_string(),
            symbol: "BTC-PERP".to_string(),
            direction: Direction::Long,
            quantity,
            price,
            timestamp: now,
            liquidity: LiquidityFlag::Taker,
        }),
    }
}

// ── 1. Fill Accounting ───────────────────────────────────────────────

proptest! {
    /// However fills are sliced, the traded quantity never exceeds the
    /// requested quantity, and excess fills are rejected without mutation.
    #[test]
    fn traded_never_exceeds_quantity(
        quantity in arb_quantity(),
        slices in prop::collection::vec(1.0..200.0_f64, 1..12),
    ) {
        let mut manager = OrderManager::new(Duration::seconds(10));
        let now = Utc::now();
        let intent = intent(quantity, 100.0);

        manager.submit(&intent, now);
        manager.mark_submitted(&intent.client_order_id, now).unwrap();

        for (index, slice) in slices.iter().enumerate() {
            let slice = slice.round().max(1.0);
            let update = fill_update(
                &intent.client_order_id,
                &format!("f{}", index),
                slice,
                100.0,
            );
            let _ = manager.apply_update(&update, now);

            let order = manager.get_order(&intent.client_order_id).unwrap();
            prop_assert!(order.traded <= order.quantity + 1e-9);
        }
    }

    /// Replaying the same fill id changes nothing.
    #[test]
    fn duplicate_fill_is_inert(quantity in arb_quantity()) {
        let mut manager = OrderManager::new(Duration::seconds(10));
        let now = Utc::now();
        let intent = intent(quantity, 100.0);

        manager.submit(&intent, now);
        manager.mark_submitted(&intent.client_order_id, now).unwrap();

        let update = fill_update(&intent.client_order_id, "f1", quantity, 100.0);
        manager.apply_update(&update, now).unwrap();
        let before = manager.get_order(&intent.client_order_id).unwrap();

        prop_assert!(manager.apply_update(&update, now).is_err());
        let after = manager.get_order(&intent.client_order_id).unwrap();
        prop_assert_eq!(before.traded, after.traded);
        prop_assert_eq!(before.status, after.status);
    }
}

// ── 2. Status Monotonicity ───────────────────────────────────────────

proptest! {
    /// Whatever update sequence arrives, the order's status rank never
    /// decreases and a terminal order never changes again.
    #[test]
    fn status_never_regresses(
        quantity in arb_quantity(),
        kinds in prop::collection::vec(0..4usize, 1..15),
    ) {
        let mut manager = OrderManager::new(Duration::seconds(10));
        let now = Utc::now();
        let intent = intent(quantity, 100.0);

        manager.submit(&intent, now);
        manager.mark_submitted(&intent.client_order_id, now).unwrap();
        let mut last_rank = Status::Submitted.rank();
        let mut was_terminal = false;
        let mut last_status = Status::Submitted;

        for (index, kind) in kinds.into_iter().enumerate() {
            let kind = match kind {
                0 => OrderUpdateKind::Acknowledged {
                    venue_order_id: "v1".to_string(),
                },
                1 => OrderUpdateKind::Rejected {
                    reason: "venue says no".to_string(),
                },
                2 => OrderUpdateKind::Cancelled,
                _ => {
                    let update = fill_update(
                        &intent.client_order_id,
                        &format!("f{}", index),
                        (quantity / 2.0).max(1.0).round(),
                        100.0,
                    );
                    let _ = manager.apply_update(&update, now);
                    let order = manager.get_order(&intent.client_order_id).unwrap();
                    prop_assert!(order.status.rank() >= last_rank);
                    if was_terminal {
                        prop_assert_eq!(order.status, last_status);
                    }
                    last_rank = order.status.rank();
                    last_status = order.status;
                    was_terminal = order.status.is_terminal();
                    continue;
                }
            };
            let update = OrderUpdate {
                client_order_id: Some(intent.client_order_id.clone()),
                venue_order_id: Some("v1".to_string()),
                sequence: index as u64,
                timestamp: now,
                kind,
            };
            let _ = manager.apply_update(&update, now);

            let order = manager.get_order(&intent.client_order_id).unwrap();
            prop_assert!(order.status.rank() >= last_rank);
            if was_terminal {
                prop_assert_eq!(order.status, last_status);
            }
            last_rank = order.status.rank();
            last_status = order.status;
            was_terminal = order.status.is_terminal();
        }
    }
}

// ── 3. Idempotent Submission ─────────────────────────────────────────

proptest! {
    #[test]
    fn resubmission_creates_nothing(
        quantity in arb_quantity(),
        price in arb_price(),
        repeats in 1..10usize,
    ) {
        let mut manager = OrderManager::new(Duration::seconds(10));
        let now = Utc::now();
        let intent = intent(quantity, price);

        let first = manager.submit(&intent, now);
        for _ in 0..repeats {
            let again = manager.submit(&intent, now + Duration::seconds(1));
            prop_assert_eq!(&again.client_order_id, &first.client_order_id);
            prop_assert_eq!(again.created_at, first.created_at);
        }
        prop_assert_eq!(manager.all_orders().len(), 1);
    }
}

// ── 4. Risk Determinism ──────────────────────────────────────────────

proptest! {
    /// The same inputs always yield the same verdict, and a clamp never
    /// lets the projected position exceed the cap.
    #[test]
    fn risk_verdict_deterministic_and_capped(
        quantity in arb_quantity(),
        price in arb_price(),
        cap in 1.0..500.0_f64,
        held in 0.0..100.0_f64,
    ) {
        let cap = cap.round();
        let held = held.round().min(cap);

        let mut config = EngineConfig::default();
        config.max_position_per_instrument = Some(cap);
        let gate = RiskGate::new(config, instruments());

        let mut ledger = MarginLedger::new(instruments(), 1_000_000.0, 1e-6);
        if held > 0.0 {
            ledger.apply_fill(&FillData {
                fill_id: "seed".to_string(),
                client_order_id: "seed".to_string(),
                symbol: "BTC-PERP".to_string(),
                direction: Direction::Long,
                quantity: held,
                price,
                timestamp: Utc::now(),
                liquidity: LiquidityFlag::Taker,
            });
        }
        let snapshot = ledger.snapshot();
        let intent = intent(quantity, price);
        let now = Utc::now();

        let first = gate.evaluate(&intent, &snapshot, &[], now);
        let second = gate.evaluate(&intent, &snapshot, &[], now);
        prop_assert_eq!(&first, &second);

        let forwarded = match first {
            Verdict::Approve(intent) => Some(intent.quantity),
            Verdict::Clamp { intent, .. } => Some(intent.quantity),
            Verdict::Reject { .. } => None,
        };
        if let Some(forwarded) = forwarded {
            prop_assert!(held + forwarded <= cap + 1e-9);
            prop_assert!(forwarded > 0.0);
        }
    }
}

// ── 5. Merge Stability ───────────────────────────────────────────────

proptest! {
    /// Sorting a batch of events is invariant under arrival permutation of
    /// distinct merge keys.
    #[test]
    fn merge_order_is_permutation_invariant(
        offsets in prop::collection::vec(0..60i64, 2..20),
    ) {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut events: Vec<SequencedEvent> = offsets
            .iter()
            .enumerate()
            .map(|(index, offset)| {
                SequencedEvent::new(
                    EngineEvent::Market(MarketEvent {
                        symbol: "BTC-PERP".to_string(),
                        sequence: index as u64,
                        timestamp: base + Duration::seconds(*offset),
                        payload: MarketPayload::Trade {
                            price: 100.0,
                            quantity: 1.0,
                        },
                    }),
                    index as u64,
                )
            })
            .collect();

        let mut sorted = events.clone();
        sorted.sort();
        events.reverse();
        events.sort();

        for (a, b) in sorted.iter().zip(events.iter()) {
            prop_assert_eq!(a.timestamp, b.timestamp);
            prop_assert_eq!(a.sequence, b.sequence);
            prop_assert_eq!(a.arrival, b.arrival);
        }
        for pair in sorted.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
    }
}

// ── 6. Ledger Round Trip ─────────────────────────────────────────────

proptest! {
    /// Opening and fully closing a position leaves it flat, with realized
    /// PnL equal to the price move times quantity.
    #[test]
    fn open_close_round_trip(
        direction in arb_direction(),
        quantity in arb_quantity(),
        entry in arb_price(),
        exit in arb_price(),
    ) {
        let mut ledger = MarginLedger::new(instruments(), 10_000.0, 1e-6);

        let fill = |leg: &str, direction: Direction, price: f64| FillData {
            fill_id: leg.to_string(),
            client_order_id: "c1".to_string(),
            symbol: "BTC-PERP".to_string(),
            direction,
            quantity,
            price,
            timestamp: Utc::now(),
            liquidity: LiquidityFlag::Taker,
        };

        ledger.apply_fill(&fill("open", direction, entry));
        ledger.apply_fill(&fill("close", direction.opposite(), exit));

        let position = ledger.position("BTC-PERP");
        prop_assert!(position.is_flat());

        let expected = (exit - entry) * quantity * direction.sign();
        prop_assert!((position.realized_pnl - expected).abs() < 1e-6);
        prop_assert!((ledger.balance() - (10_000.0 + expected)).abs() < 1e-6);
    }
}

// ── Normalizer sequencing ────────────────────────────────────────────

proptest! {
    /// Market sequence numbers are strictly increasing per instrument and
    /// rejected messages never consume one.
    #[test]
    fn market_sequences_are_gapless(valid in prop::collection::vec(any::<bool>(), 1..30)) {
        let mut normalizer = EventNormalizer::new(instruments());
        let mut expected = 0u64;

        for ok in valid {
            let price = if ok { 100.0 } else { f64::NAN };
            let result = normalizer.normalize(RawVenueMessage::Trade {
                symbol: "BTC-PERP".to_string(),
                price,
                quantity: 1.0,
                timestamp: Utc::now(),
            });
            if ok {
                expected += 1;
                match result.unwrap() {
                    EngineEvent::Market(market) => {
                        prop_assert_eq!(market.sequence, expected)
                    }
                    other => prop_assert!(false, "unexpected event: {:?}", other),
                }
            } else {
                prop_assert!(result.is_err());
            }
        }
        prop_assert_eq!(normalizer.market_sequence("BTC-PERP"), expected);
    }
}
