//! Per-topic subscriber set and the non-blocking fan-out primitive.

use std::collections::HashMap;

use tracing::debug;

use super::message::Message;

/// Outcome of one fan-out pass over a listener set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    pub dropped: usize,
}

/// One subscriber's outbound channel.
///
/// Both halves are kept: the receiver clone lets a repeated subscribe with
/// the same id hand back the live channel, and dropping the entry drops the
/// only sender, which closes the channel exactly once for every receiver.
#[derive(Debug)]
struct Channel {
    tx: flume::Sender<Message>,
    rx: flume::Receiver<Message>,
}

/// Maps subscriber ids (peer address strings) to bounded outbound channels.
///
/// Sends never block: a subscriber whose channel is full loses that message
/// and every other subscriber still receives it. Membership changes and
/// fan-out are serialized by the broker's lock.
#[derive(Debug)]
pub struct ListenerSet {
    channels: HashMap<String, Channel>,
    buffer_length: usize,
}

impl ListenerSet {
    pub fn new(buffer_length: usize) -> Self {
        Self {
            channels: HashMap::new(),
            buffer_length,
        }
    }

    /// Registers `id` and returns its receiving half.
    ///
    /// Callers check `get` first; adding an id twice replaces the channel.
    pub fn add(&mut self, id: &str) -> flume::Receiver<Message> {
        let (tx, rx) = flume::bounded(self.buffer_length);
        self.channels.insert(id.to_string(), Channel { tx, rx: rx.clone() });
        rx
    }

    /// Drops `id`'s channel, closing it for all receiver clones.
    pub fn remove(&mut self, id: &str) -> bool {
        self.channels.remove(id).is_some()
    }

    pub fn exists(&self, id: &str) -> bool {
        self.channels.contains_key(id)
    }

    /// Returns the existing channel for `id`, if subscribed.
    pub fn get(&self, id: &str) -> Option<flume::Receiver<Message>> {
        self.channels.get(id).map(|ch| ch.rx.clone())
    }

    /// Attempts a non-blocking send of `message` to every subscriber.
    ///
    /// A full channel drops the message for that subscriber only.
    pub fn notify_all(&self, message: &Message) -> FanOut {
        let mut result = FanOut::default();
        for (id, ch) in &self.channels {
            match ch.tx.try_send(message.clone()) {
                Ok(()) => result.delivered += 1,
                Err(_) => {
                    debug!(
                        subscriber = %id,
                        topic = %message.topic.name,
                        id = message.id,
                        "subscriber channel full, dropping message"
                    );
                    result.dropped += 1;
                }
            }
        }
        result
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Drops every channel. Used on broker shutdown.
    pub fn clear(&mut self) {
        self.channels.clear();
    }
}
