//! The broker: topic registry, pull queues, and streaming fan-out behind a
//! single private lock.
//!
//! Every topic carries two independent delivery streams. The bounded FIFO
//! queue feeds request/response pulls; the listener set feeds streaming
//! subscribers. Publishing writes to both, but neither drains the other: a
//! subscriber that misses a message to backpressure cannot recover it via
//! pull, and pulling never consumes from subscriber channels.
//!
//! No broker operation returns an error. Payload-size enforcement and input
//! validation live at the HTTP surface; backpressure is resolved by
//! dropping, never by waiting.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, info};

use crate::config::BusOptions;
use crate::core::message::Message;
use crate::core::topics::{Topic, TopicRegistry};
use crate::metrics::{Counter, Gauge, Metrics, MetricsSnapshot, Summary};

/// The broker's named metric set, registered on one [`Metrics`] collection.
///
/// Handles are pre-resolved so hot paths touch an atomic, not the registry.
#[derive(Debug)]
pub struct BusMetrics {
    collection: Arc<Metrics>,
    pub requests: Arc<Counter>,
    pub messages: Arc<Counter>,
    pub topics: Arc<Counter>,
    pub subscribers: Arc<Gauge>,
    pub fetched: Arc<Counter>,
    pub delivered: Arc<Counter>,
    pub dropped: Arc<Counter>,
    pub client_errors: Arc<Counter>,
    pub latency: Arc<Summary>,
}

impl BusMetrics {
    fn new() -> Self {
        let collection = Arc::new(Metrics::new());
        let started = Instant::now();
        collection.counter_fn("server.uptime", move || started.elapsed().as_nanos() as u64);

        BusMetrics {
            requests: collection.counter("server.requests"),
            messages: collection.counter("bus.messages"),
            topics: collection.counter("bus.topics"),
            subscribers: collection.gauge("bus.subscribers"),
            fetched: collection.counter("bus.fetched"),
            delivered: collection.counter("bus.delivered"),
            dropped: collection.counter("bus.dropped"),
            client_errors: collection.counter("client.errors"),
            latency: collection.summary("client.latency_seconds"),
            collection,
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.collection.snapshot()
    }
}

/// In-memory publish/subscribe message bus.
///
/// One mutex guards the registry, every queue, and every listener set.
/// Fan-out happens under it but uses non-blocking sends, so lock hold time
/// stays proportional to the subscriber count with constant per-subscriber
/// work even when subscribers are slow.
#[derive(Debug)]
pub struct Broker {
    options: BusOptions,
    registry: Mutex<TopicRegistry>,
    metrics: Option<BusMetrics>,
}

impl Broker {
    pub fn new(options: BusOptions) -> Self {
        let registry = TopicRegistry::new(
            options.default_ttl,
            options.max_queue_size,
            options.buffer_length,
        );
        let metrics = options.with_metrics.then(BusMetrics::new);
        Broker {
            options,
            registry: Mutex::new(registry),
            metrics,
        }
    }

    pub fn options(&self) -> &BusOptions {
        &self.options
    }

    /// The named metric set, present when the broker was built with metrics.
    pub fn metrics(&self) -> Option<&BusMetrics> {
        self.metrics.as_ref()
    }

    pub fn metrics_snapshot(&self) -> Option<MetricsSnapshot> {
        self.metrics.as_ref().map(BusMetrics::snapshot)
    }

    /// Idempotent create-or-get; returns the topic's current metadata.
    pub fn new_topic(&self, name: &str) -> Topic {
        let mut registry = self.lock_registry();
        let (state, created) = registry.ensure_topic(name);
        if created {
            self.count_topic_created();
        }
        state.meta.clone()
    }

    /// Assigns the next sequence id for `name` and stamps a new message.
    ///
    /// The topic counter is incremented exactly once whether or not the
    /// message is subsequently published.
    pub fn new_message(&self, name: &str, payload: impl Into<Bytes>) -> Message {
        let mut registry = self.lock_registry();
        let (state, created) = registry.ensure_topic(name);
        if created {
            self.count_topic_created();
        }
        let id = state.meta.next_seq();
        let message = Message::new(id, state.meta.clone(), payload);
        if let Some(m) = &self.metrics {
            m.messages.inc();
        }
        debug!(topic = %name, id, "assigned message");
        message
    }

    /// Appends to the topic's pull queue and fans out to subscribers.
    ///
    /// Queue overflow drops the queue head; a full subscriber channel drops
    /// the message for that subscriber only. Both losses count against the
    /// dropped metric and neither delays the publisher.
    pub fn publish(&self, message: &Message) {
        let name = message.topic.name.as_str();
        let mut registry = self.lock_registry();
        let (state, created) = registry.ensure_topic(name);
        if created {
            self.count_topic_created();
        }

        if let Some(evicted) = state.queue.push(message.clone()) {
            debug!(topic = %name, id = evicted.id, "queue full, dropped head");
            if let Some(m) = &self.metrics {
                m.dropped.inc();
            }
        }

        let fanout = state.listeners.notify_all(message);
        debug!(
            topic = %name,
            id = message.id,
            delivered = fanout.delivered,
            dropped = fanout.dropped,
            "publish"
        );
        if fanout.dropped > 0 {
            if let Some(m) = &self.metrics {
                m.dropped.add(fanout.dropped as u64);
            }
        }
    }

    /// Removes and returns the head of the topic's pull queue.
    ///
    /// Pulling is independent of streaming delivery: it never touches
    /// subscriber channels, and subscribers never drain the queue.
    pub fn pull(&self, name: &str) -> Option<Message> {
        let mut registry = self.lock_registry();
        let (state, created) = registry.ensure_topic(name);
        if created {
            self.count_topic_created();
        }
        let message = state.queue.pop();
        if let Some(msg) = &message {
            debug!(topic = %name, id = msg.id, "pull");
            if let Some(m) = &self.metrics {
                m.fetched.inc();
            }
        }
        message
    }

    /// Joins `id` to the topic's listener set and returns its channel.
    ///
    /// Subscribing twice with the same id returns the existing channel; the
    /// channel is closed exactly once, by [`Broker::unsubscribe`] or
    /// [`Broker::close`].
    pub fn subscribe(&self, id: &str, name: &str) -> flume::Receiver<Message> {
        let mut registry = self.lock_registry();
        let (state, created) = registry.ensure_topic(name);
        if created {
            self.count_topic_created();
        }

        if let Some(existing) = state.listeners.get(id) {
            return existing;
        }

        debug!(subscriber = %id, topic = %name, "subscribe");
        let rx = state.listeners.add(id);
        if let Some(m) = &self.metrics {
            m.subscribers.inc();
        }
        rx
    }

    /// Closes and removes `id`'s channel; a silent no-op when not subscribed.
    pub fn unsubscribe(&self, id: &str, name: &str) {
        let mut registry = self.lock_registry();
        let Some(state) = registry.get_mut(name) else {
            return;
        };
        if state.listeners.remove(id) {
            debug!(subscriber = %id, topic = %name, "unsubscribe");
            if let Some(m) = &self.metrics {
                m.subscribers.dec();
            }
        }
    }

    /// Topic listing for the operator endpoint.
    pub fn snapshot(&self) -> BTreeMap<String, Topic> {
        self.lock_registry().snapshot()
    }

    /// Closes every subscriber channel. Topics and queued messages remain.
    pub fn close(&self) {
        info!("closing broker, disconnecting all subscribers");
        let mut registry = self.lock_registry();
        for state in registry.states_mut() {
            let disconnected = state.listeners.len() as i64;
            state.listeners.clear();
            if let Some(m) = &self.metrics {
                m.subscribers.add(-disconnected);
            }
        }
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, TopicRegistry> {
        self.registry.lock().expect("broker lock poisoned")
    }

    fn count_topic_created(&self) {
        if let Some(m) = &self.metrics {
            m.topics.inc();
        }
    }
}
