//! Event dispatcher: merges the market feed, the order feed and the internal
//! timer into one totally ordered event stream.
//!
//! Everything queued at the moment of a poll is delivered in merge-key order
//! `(timestamp, source priority, sequence, arrival)`. When nothing is queued
//! the dispatcher parks on its channels. Raw venue messages are normalized
//! on the way in; malformed ones are logged and dropped without advancing
//! sequence counters.

use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use crate::constant::SourceKind;
use crate::event::{EngineEvent, SequencedEvent};
use crate::normalizer::EventNormalizer;
use crate::venue::RawVenueMessage;

/// Handle used to request an orderly shutdown of a running dispatcher.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Create a handle and the receiver a dispatcher watches.
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

pub struct EventDispatcher {
    normalizer: EventNormalizer,
    market_rx: mpsc::UnboundedReceiver<RawVenueMessage>,
    order_rx: mpsc::UnboundedReceiver<RawVenueMessage>,
    timer_rx: mpsc::UnboundedReceiver<DateTime<Utc>>,
    shutdown_rx: watch::Receiver<bool>,
    heap: BinaryHeap<Reverse<SequencedEvent>>,
    control: VecDeque<EngineEvent>,
    arrival: u64,
    market_lost: bool,
    order_lost: bool,
    timer_lost: bool,
    shutdown_emitted: bool,
    timer_task: JoinHandle<()>,
}

impl EventDispatcher {
    /// Build a dispatcher over the two venue channels and spawn its timer
    /// task. Must be called inside a tokio runtime.
    pub fn new(
        normalizer: EventNormalizer,
        market_rx: mpsc::UnboundedReceiver<RawVenueMessage>,
        order_rx: mpsc::UnboundedReceiver<RawVenueMessage>,
        timer_interval: Duration,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        let timer_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(timer_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick of an interval completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if timer_tx.send(Utc::now()).is_err() {
                    break;
                }
            }
        });

        Self {
            normalizer,
            market_rx,
            order_rx,
            timer_rx,
            shutdown_rx,
            heap: BinaryHeap::new(),
            control: VecDeque::new(),
            arrival: 0,
            market_lost: false,
            order_lost: false,
            timer_lost: false,
            shutdown_emitted: false,
            timer_task,
        }
    }

    /// Next event in merge order, or `None` once the terminal `Shutdown`
    /// event has been delivered.
    ///
    /// Shutdown is orderly: queued events are flushed before the terminal
    /// event. Losing both venue feeds also ends the stream.
    pub async fn next(&mut self) -> Option<SequencedEvent> {
        loop {
            // The terminal event ends the stream; anything arriving after it
            // is never delivered.
            if self.shutdown_emitted {
                return None;
            }

            self.drain();

            // Control events bypass the heap so the session learns about a
            // lost source promptly.
            if let Some(event) = self.control.pop_front() {
                return Some(self.sequenced(event));
            }
            if let Some(Reverse(event)) = self.heap.pop() {
                return Some(event);
            }
            if *self.shutdown_rx.borrow() || (self.market_lost && self.order_lost) {
                self.shutdown_emitted = true;
                return Some(self.sequenced(EngineEvent::Shutdown));
            }

            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    let _ = changed;
                }
                maybe = self.market_rx.recv(), if !self.market_lost => {
                    match maybe {
                        Some(raw) => self.push_raw(raw),
                        None => self.lose(SourceKind::MarketFeed),
                    }
                }
                maybe = self.order_rx.recv(), if !self.order_lost => {
                    match maybe {
                        Some(raw) => self.push_raw(raw),
                        None => self.lose(SourceKind::OrderFeed),
                    }
                }
                maybe = self.timer_rx.recv(), if !self.timer_lost => {
                    match maybe {
                        Some(at) => self.push_event(EngineEvent::Timer(at)),
                        None => self.timer_lost = true,
                    }
                }
            }
        }
    }

    /// Move everything currently queued on the channels into the heap.
    fn drain(&mut self) {
        loop {
            match self.market_rx.try_recv() {
                Ok(raw) => self.push_raw(raw),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.lose(SourceKind::MarketFeed);
                    break;
                }
            }
        }
        loop {
            match self.order_rx.try_recv() {
                Ok(raw) => self.push_raw(raw),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.lose(SourceKind::OrderFeed);
                    break;
                }
            }
        }
        while let Ok(at) = self.timer_rx.try_recv() {
            self.push_event(EngineEvent::Timer(at));
        }
    }

    fn push_raw(&mut self, raw: RawVenueMessage) {
        match self.normalizer.normalize(raw) {
            Ok(event) => self.push_event(event),
            Err(error) => warn!(%error, "dropping venue message"),
        }
    }

    fn push_event(&mut self, event: EngineEvent) {
        let sequenced = self.sequenced(event);
        self.heap.push(Reverse(sequenced));
    }

    fn lose(&mut self, source: SourceKind) {
        let lost = match source {
            SourceKind::MarketFeed => &mut self.market_lost,
            SourceKind::OrderFeed => &mut self.order_lost,
            SourceKind::Timer => &mut self.timer_lost,
        };
        if *lost {
            return;
        }
        *lost = true;
        warn!(%source, "input source disconnected");
        self.control.push_back(EngineEvent::SourceLost(source));
    }

    fn sequenced(&mut self, event: EngineEvent) -> SequencedEvent {
        self.arrival += 1;
        SequencedEvent::new(event, self.arrival)
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.timer_task.abort();
    }
}
