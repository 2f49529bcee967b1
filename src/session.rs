//! Session engine: owns the dispatcher, order manager, ledger, risk gate and
//! strategy host for one trading session against one venue.
//!
//! All state mutation happens on the single `run` loop, so event handling is
//! free of locks and a strategy always observes a consistent snapshot.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::constant::{SessionState, Status};
use crate::dispatcher::{EventDispatcher, ShutdownHandle};
use crate::error::EngineError;
use crate::event::{EngineEvent, OrderUpdate, OrderUpdateKind};
use crate::host::StrategyHost;
use crate::ledger::MarginLedger;
use crate::normalizer::EventNormalizer;
use crate::object::{Instrument, OrderIntent, SessionNotice, SubmitIntent};
use crate::orders::OrderManager;
use crate::risk::{RiskGate, Verdict};
use crate::setting::EngineConfig;
use crate::strategy::Strategy;
use crate::utility::{load_json, save_json};
use crate::venue::{VenueFeedSender, VenueGateway};

const STATE_FILE: &str = "strategy_states.json";

/// Bound on notice-handler feedback rounds within one event, so a strategy
/// reacting to its own rejections cannot wedge the loop.
const MAX_INTENT_ROUNDS: usize = 8;

/// One trading session wiring a strategy to a venue.
pub struct SessionEngine {
    config: EngineConfig,
    instruments: Arc<HashMap<String, Instrument>>,
    venue: Arc<dyn VenueGateway>,
    host: StrategyHost,
    orders: OrderManager,
    ledger: MarginLedger,
    risk: RiskGate,
    recent_submissions: VecDeque<DateTime<Utc>>,
    shutdown: ShutdownHandle,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
    state: SessionState,
    persist_state: bool,
}

impl SessionEngine {
    pub fn new(
        config: EngineConfig,
        instruments: HashMap<String, Instrument>,
        venue: Arc<dyn VenueGateway>,
        strategy: Box<dyn Strategy>,
    ) -> Self {
        let instruments = Arc::new(instruments);
        let (shutdown, shutdown_rx) = ShutdownHandle::new();
        Self {
            orders: OrderManager::new(config.order_timeout()),
            ledger: MarginLedger::new(instruments.clone(), 0.0, config.drift_tolerance),
            risk: RiskGate::new(config.clone(), instruments.clone()),
            host: StrategyHost::new(strategy),
            config,
            instruments,
            venue,
            recent_submissions: VecDeque::new(),
            shutdown,
            shutdown_rx,
            state: SessionState::Idle,
            persist_state: true,
        }
    }

    /// Disable strategy state persistence, for tests and dry runs.
    pub fn without_persistence(mut self) -> Self {
        self.persist_state = false;
        self
    }

    /// Handle for requesting an orderly shutdown from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Snapshot of the ledger, usable while the loop is idle or after it
    /// has stopped.
    pub fn ledger_snapshot(&self) -> crate::ledger::LedgerSnapshot {
        self.ledger.snapshot()
    }

    /// Copy of one order by client order id.
    pub fn order(&self, client_order_id: &str) -> Option<crate::object::OrderData> {
        self.orders.get_order(client_order_id)
    }

    /// Copies of every order known to the session.
    pub fn orders(&self) -> Vec<crate::object::OrderData> {
        self.orders.all_orders()
    }

    /// Number of strategy callbacks that faulted so far.
    pub fn strategy_faults(&self) -> u64 {
        self.host.fault_count()
    }

    /// Connect, subscribe and process events until shutdown.
    pub async fn run(&mut self) -> Result<(), EngineError> {
        let (market_tx, market_rx) = mpsc::unbounded_channel();
        let (order_tx, order_rx) = mpsc::unbounded_channel();
        let feed = VenueFeedSender::new(self.venue.venue_name(), market_tx, order_tx);

        self.venue.connect(feed).await?;
        for symbol in self.instruments.keys() {
            self.venue.subscribe(symbol).await?;
        }
        self.venue.query_account().await?;

        let mut dispatcher = EventDispatcher::new(
            EventNormalizer::new(self.instruments.clone()),
            market_rx,
            order_rx,
            StdDuration::from_secs(self.config.timer_interval_secs),
            self.shutdown_rx.clone(),
        );

        self.state = SessionState::Running;
        info!(
            venue = self.venue.venue_name(),
            strategy = %self.host.strategy_name(),
            "session started"
        );

        if self.persist_state {
            self.restore_strategy_state();
        }

        let snapshot = self.ledger.snapshot();
        let open = self.orders.active_orders();
        let result = self.host.on_start(&snapshot, &open, Utc::now());
        self.dispatch_intents(result.intents).await;

        while let Some(sequenced) = dispatcher.next().await {
            self.handle(sequenced.event).await;
        }

        if self.persist_state {
            self.save_strategy_state();
        }
        self.state = SessionState::Stopped;
        info!("session stopped");
        Ok(())
    }

    async fn handle(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Market(market) => {
                if let Some(price) = market.payload.mark_price() {
                    self.ledger.update_mark(&market.symbol, price);
                }
                let snapshot = self.ledger.snapshot();
                let open = self.orders.active_orders();
                let result =
                    self.host
                        .on_market_event(&market, &snapshot, &open, Utc::now());
                self.dispatch_intents(result.intents).await;
            }
            EngineEvent::Order(update) => self.handle_order_update(update).await,
            EngineEvent::Account { snapshot, .. } => {
                let reports = self.ledger.apply_snapshot(&snapshot);
                for report in reports {
                    warn!(
                        symbol = %report.symbol,
                        local = report.local_quantity,
                        reported = report.reported_quantity,
                        "position drift, venue state adopted"
                    );
                    self.emit_notice(SessionNotice::Drift(report)).await;
                }
            }
            EngineEvent::Timer(at) => {
                let expired = self.orders.expire_stale(at);
                for order in expired {
                    self.emit_notice(SessionNotice::Timeout {
                        client_order_id: order.client_order_id,
                    })
                    .await;
                }
                let snapshot = self.ledger.snapshot();
                let open = self.orders.active_orders();
                let result = self.host.on_timer(at, &snapshot, &open);
                self.dispatch_intents(result.intents).await;
            }
            EngineEvent::SourceLost(source) => {
                self.emit_notice(SessionNotice::SourceLost { source }).await;
            }
            EngineEvent::Shutdown => self.handle_shutdown().await,
        }
    }

    async fn handle_order_update(&mut self, update: OrderUpdate) {
        let now = update.timestamp;
        match self.orders.apply_update(&update, now) {
            Ok(applied) => {
                if let Some(fill) = &applied.fill {
                    self.ledger.apply_fill(fill);
                }
                let snapshot = self.ledger.snapshot();
                let open = self.orders.active_orders();
                let result = self.host.on_order_update(
                    &update,
                    &applied.order,
                    &snapshot,
                    &open,
                    Utc::now(),
                );
                self.dispatch_intents(result.intents).await;
            }
            Err(EngineError::OrphanUpdate { description }) => {
                warn!(%description, "orphan order update");
                self.emit_notice(SessionNotice::OrphanUpdate { description })
                    .await;
            }
            Err(EngineError::DuplicateFill {
                fill_id,
                client_order_id,
            }) => {
                // Retransmitted fills are expected after reconnects.
                debug!(%fill_id, %client_order_id, "duplicate fill ignored");
            }
            Err(error) => {
                warn!(%error, "order update dropped");
            }
        }
    }

    async fn handle_shutdown(&mut self) {
        self.state = SessionState::ShuttingDown;
        info!("shutting down, cancelling active orders");

        let now = Utc::now();
        for order in self.orders.active_orders() {
            if let Err(error) = self
                .venue
                .cancel_order(&order.client_order_id, order.venue_order_id.as_deref())
                .await
            {
                warn!(
                    client_order_id = %order.client_order_id,
                    %error,
                    "cancel on shutdown failed"
                );
                continue;
            }
            // The event stream has ended, so the venue's confirmation will
            // never be observed; record the cancellation locally without a
            // strategy callback.
            let cancelled = OrderUpdate {
                client_order_id: Some(order.client_order_id.clone()),
                venue_order_id: order.venue_order_id.clone(),
                sequence: 0,
                timestamp: now,
                kind: OrderUpdateKind::Cancelled,
            };
            if let Err(error) = self.orders.apply_update(&cancelled, now) {
                warn!(%error, "could not record shutdown cancellation");
            }
        }

        let snapshot = self.ledger.snapshot();
        let open = self.orders.active_orders();
        let result = self.host.on_shutdown(&snapshot, &open, Utc::now());
        // New order flow is not accepted during shutdown.
        if !result.intents.is_empty() {
            warn!(
                count = result.intents.len(),
                "intents from on_shutdown discarded"
            );
        }

        self.venue.close().await;
    }

    /// Run collected intents through the risk gate and forward the survivors
    /// to the venue. Notices raised along the way go back to the strategy,
    /// whose reactions are processed in further bounded rounds.
    async fn dispatch_intents(&mut self, mut intents: Vec<OrderIntent>) {
        for round in 0.. {
            if intents.is_empty() {
                return;
            }
            if round == MAX_INTENT_ROUNDS {
                warn!("intent feedback limit reached, discarding remainder");
                return;
            }

            let mut notices = Vec::new();
            for intent in intents.drain(..) {
                match intent {
                    OrderIntent::Submit(submit) => {
                        notices.extend(self.handle_submit(submit).await);
                    }
                    OrderIntent::Cancel { client_order_id } => {
                        notices.extend(self.handle_cancel(&client_order_id).await);
                    }
                }
            }

            for notice in notices {
                let snapshot = self.ledger.snapshot();
                let open = self.orders.active_orders();
                let result = self
                    .host
                    .on_notice(&notice, &snapshot, &open, Utc::now());
                intents.extend(result.intents);
            }
        }
    }

    async fn handle_submit(&mut self, intent: SubmitIntent) -> Vec<SessionNotice> {
        if self.state != SessionState::Running {
            warn!(
                client_order_id = %intent.client_order_id,
                "submit outside running state dropped"
            );
            return Vec::new();
        }

        let now = Utc::now();
        self.prune_submissions(now);
        let snapshot = self.ledger.snapshot();
        let recent: Vec<DateTime<Utc>> = self.recent_submissions.iter().copied().collect();

        match self.risk.evaluate(&intent, &snapshot, &recent, now) {
            Verdict::Approve(approved) => self.forward_order(approved, now).await,
            Verdict::Clamp { requested, intent } => {
                info!(
                    client_order_id = %intent.client_order_id,
                    requested,
                    adjusted = intent.quantity,
                    "order quantity clamped"
                );
                let notice = SessionNotice::OrderClamped {
                    client_order_id: intent.client_order_id.clone(),
                    requested,
                    adjusted: intent.quantity,
                };
                let mut notices = self.forward_order(intent, now).await;
                notices.insert(0, notice);
                notices
            }
            Verdict::Reject { reason } => {
                info!(
                    client_order_id = %intent.client_order_id,
                    %reason,
                    "order rejected locally"
                );
                vec![SessionNotice::OrderRejectedLocally {
                    client_order_id: intent.client_order_id,
                    reason,
                }]
            }
        }
    }

    async fn forward_order(
        &mut self,
        intent: SubmitIntent,
        now: DateTime<Utc>,
    ) -> Vec<SessionNotice> {
        let order = self.orders.submit(&intent, now);
        if order.status != Status::Created {
            // Duplicate client order id, already forwarded.
            return Vec::new();
        }

        let order = match self.orders.mark_submitted(&intent.client_order_id, now) {
            Ok(order) => order,
            Err(error) => {
                warn!(%error, "could not mark order submitted");
                return Vec::new();
            }
        };
        self.recent_submissions.push_back(now);

        if let Err(error) = self.venue.send_order(&order).await {
            error!(
                client_order_id = %order.client_order_id,
                %error,
                "venue transport failure on submit"
            );
            let reason = format!("venue transport failure: {}", error);
            let synthetic = OrderUpdate {
                client_order_id: Some(order.client_order_id.clone()),
                venue_order_id: None,
                sequence: 0,
                timestamp: now,
                kind: OrderUpdateKind::Rejected {
                    reason: reason.clone(),
                },
            };
            if let Err(error) = self.orders.apply_update(&synthetic, now) {
                warn!(%error, "could not record transport rejection");
            }
            return vec![SessionNotice::OrderRejectedLocally {
                client_order_id: order.client_order_id,
                reason,
            }];
        }
        Vec::new()
    }

    async fn handle_cancel(&mut self, client_order_id: &str) -> Vec<SessionNotice> {
        match self.orders.request_cancel(client_order_id) {
            Ok(order) => {
                if let Err(error) = self
                    .venue
                    .cancel_order(&order.client_order_id, order.venue_order_id.as_deref())
                    .await
                {
                    warn!(
                        client_order_id = %order.client_order_id,
                        %error,
                        "venue transport failure on cancel"
                    );
                }
                Vec::new()
            }
            Err(EngineError::AlreadyTerminal {
                client_order_id,
                status,
            }) => {
                debug!(%client_order_id, %status, "cancel on terminal order");
                vec![SessionNotice::AlreadyTerminal {
                    client_order_id,
                    status,
                }]
            }
            Err(error) => {
                warn!(%error, "cancel request dropped");
                vec![SessionNotice::OrphanUpdate {
                    description: error.to_string(),
                }]
            }
        }
    }

    async fn emit_notice(&mut self, notice: SessionNotice) {
        let snapshot = self.ledger.snapshot();
        let open = self.orders.active_orders();
        let result = self.host.on_notice(&notice, &snapshot, &open, Utc::now());
        self.dispatch_intents(result.intents).await;
    }

    fn prune_submissions(&mut self, now: DateTime<Utc>) {
        let window_start = now - self.config.rate_window();
        while let Some(front) = self.recent_submissions.front() {
            if *front <= window_start {
                self.recent_submissions.pop_front();
            } else {
                break;
            }
        }
    }

    fn restore_strategy_state(&mut self) {
        let states = load_json(STATE_FILE);
        if let Some(state) = states.get(&self.host.strategy_name()) {
            self.host.restore_state(state);
            info!(
                strategy = %self.host.strategy_name(),
                "strategy state restored"
            );
        }
    }

    fn save_strategy_state(&self) {
        let state = self.host.save_state();
        if state.is_null() {
            return;
        }
        let mut states = load_json(STATE_FILE);
        states.insert(self.host.strategy_name(), state);
        save_json(STATE_FILE, &states);
    }
}
