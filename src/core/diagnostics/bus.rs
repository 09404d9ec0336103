//! Typed broadcast channel with a bounded replay history.
//!
//! Every subscriber owns a bounded queue of `replay + overflow` slots. A new
//! subscriber is primed with the replay history, then receives live events
//! in publish order. Publishing never blocks: a subscriber whose queue is
//! full misses the event (the newest one) and the bus drop counter grows,
//! while the replay history itself always evicts its oldest entry.
//!
//! Buses built with [`EventBus::ordered`] also keep event timestamps
//! non-decreasing in publish order: an event detected before the last
//! published one is stamped with that event's time.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures_util::Stream;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Replay and overflow sizes of one bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusCapacity {
    pub replay: usize,
    pub overflow: usize,
}

impl BusCapacity {
    pub const CRASH: BusCapacity = BusCapacity::new(10, 50);
    pub const DATABASE: BusCapacity = BusCapacity::new(20, 100);
    pub const NETWORK: BusCapacity = BusCapacity::new(20, 100);
    pub const PERFORMANCE: BusCapacity = BusCapacity::new(20, 100);
    // Log lines arrive in bursts
    pub const LOG: BusCapacity = BusCapacity::new(50, 500);
    pub const ENGINE: BusCapacity = BusCapacity::new(100, 1000);

    pub const fn new(replay: usize, overflow: usize) -> Self {
        Self { replay, overflow }
    }

    /// Queue size of a single subscriber
    pub fn subscriber_queue(&self) -> usize {
        (self.replay + self.overflow).max(1)
    }
}

/// Events carrying the time they were detected
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;

    fn set_timestamp(&mut self, timestamp: DateTime<Utc>);
}

type OrderFn<T> = fn(&mut T, &mut Option<DateTime<Utc>>);

fn keep_monotonic<T: Timestamped>(event: &mut T, last: &mut Option<DateTime<Utc>>) {
    if let Some(last) = *last {
        if event.timestamp() < last {
            event.set_timestamp(last);
        }
    }
    *last = Some(event.timestamp());
}

struct ChannelState<T> {
    replay: VecDeque<T>,
    subscribers: Vec<mpsc::Sender<T>>,
    last_timestamp: Option<DateTime<Utc>>,
}

struct Shared<T> {
    name: &'static str,
    capacity: BusCapacity,
    order: Option<OrderFn<T>>,
    state: Mutex<ChannelState<T>>,
    published: AtomicU64,
    dropped: AtomicU64,
}

/// Broadcast channel for one diagnostics domain
pub struct EventBus<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub fn new(name: &'static str, capacity: BusCapacity) -> Self {
        Self::with_order(name, capacity, None)
    }

    fn with_order(name: &'static str, capacity: BusCapacity, order: Option<OrderFn<T>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                name,
                capacity,
                order,
                state: Mutex::new(ChannelState {
                    replay: VecDeque::with_capacity(capacity.replay),
                    subscribers: Vec::new(),
                    last_timestamp: None,
                }),
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Publish an event to the replay history and every live subscriber.
    pub fn publish(&self, mut event: T) {
        let shared = &self.shared;
        let mut state = shared.state.lock();

        if let Some(order) = shared.order {
            order(&mut event, &mut state.last_timestamp);
        }

        state.subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                shared.dropped.fetch_add(1, Ordering::Relaxed);
                log::trace!("{} bus: subscriber queue full, event dropped", shared.name);
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });

        let replay_capacity = shared.capacity.replay;
        if replay_capacity > 0 {
            if state.replay.len() >= replay_capacity {
                state.replay.pop_front();
            }
            state.replay.push_back(event);
        }

        shared.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Attach a new subscriber, primed with the replay history.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::channel(self.shared.capacity.subscriber_queue());
        let mut state = self.shared.state.lock();

        for event in state.replay.iter() {
            // The queue is at least as large as the replay history
            let _ = tx.try_send(event.clone());
        }
        state.subscribers.push(tx);

        Subscription { rx }
    }

    /// Read-only handle for external consumers
    pub fn stream(&self) -> EventStream<T> {
        EventStream { bus: self.clone() }
    }

    /// Snapshot of the replay history, oldest first
    pub fn replay(&self) -> Vec<T> {
        self.shared.state.lock().replay.iter().cloned().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.shared.state.lock();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }
}

impl<T: Timestamped + Clone + Send + 'static> EventBus<T> {
    /// Bus whose published timestamps never go backwards
    pub fn ordered(name: &'static str, capacity: BusCapacity) -> Self {
        Self::with_order(name, capacity, Some(keep_monotonic::<T>))
    }
}

impl<T> EventBus<T> {
    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    pub fn capacity(&self) -> BusCapacity {
        self.shared.capacity
    }

    /// Number of subscriber deliveries lost to full queues
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn published_count(&self) -> u64 {
        self.shared.published.load(Ordering::Relaxed)
    }
}

/// Subscription side of an [`EventBus`]
pub struct EventStream<T> {
    bus: EventBus<T>,
}

impl<T> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> EventStream<T> {
    pub fn subscribe(&self) -> Subscription<T> {
        self.bus.subscribe()
    }

    pub fn replay(&self) -> Vec<T> {
        self.bus.replay()
    }

    pub fn dropped_count(&self) -> u64 {
        self.bus.dropped_count()
    }
}

/// Ordered feed of events for one subscriber
pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> Subscription<T> {
    /// Wait for the next event. Returns `None` once the bus is gone and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Drain everything currently queued
    pub fn drain(&mut self) -> Vec<T> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}
