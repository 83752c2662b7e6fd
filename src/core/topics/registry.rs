use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tracing::debug;

use crate::core::listeners::ListenerSet;
use crate::core::queue::MessageQueue;
use crate::core::topics::topic::{Topic, TopicName};

/// Everything the broker tracks for one topic: its metadata, the bounded
/// pull queue, and the set of streaming subscribers.
#[derive(Debug)]
pub struct TopicState {
    pub meta: Topic,
    pub queue: MessageQueue,
    pub listeners: ListenerSet,
}

/// Name → topic store with lazy creation.
///
/// Unlike a shared map, the registry is a plain structure: the broker owns it
/// behind a single private mutex, so all mutation here is already serialized
/// and per-operation locking would be redundant.
#[derive(Debug)]
pub struct TopicRegistry {
    topics: HashMap<TopicName, TopicState>,
    default_ttl: Duration,
    max_queue_size: usize,
    buffer_length: usize,
}

impl TopicRegistry {
    pub fn new(default_ttl: Duration, max_queue_size: usize, buffer_length: usize) -> Self {
        Self {
            topics: HashMap::new(),
            default_ttl,
            max_queue_size,
            buffer_length,
        }
    }

    /// Returns the existing topic or creates one with sequence 0, the
    /// default TTL, and a creation timestamp of now.
    ///
    /// The boolean is true when the call created the topic.
    pub fn ensure_topic(&mut self, name: &str) -> (&mut TopicState, bool) {
        let created = !self.topics.contains_key(name);
        if created {
            debug!(topic = %name, "creating topic");
            self.topics.insert(
                name.to_string(),
                TopicState {
                    meta: Topic::new(name, self.default_ttl),
                    queue: MessageQueue::new(self.max_queue_size),
                    listeners: ListenerSet::new(self.buffer_length),
                },
            );
        }
        let state = self
            .topics
            .get_mut(name)
            .expect("topic inserted by ensure_topic");
        (state, created)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut TopicState> {
        self.topics.get_mut(name)
    }

    /// Consistent view of all topic metadata for the listing endpoint.
    pub fn snapshot(&self) -> BTreeMap<TopicName, Topic> {
        self.topics
            .iter()
            .map(|(name, state)| (name.clone(), state.meta.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Iterates over all topic states, e.g. to close channels on shutdown.
    pub fn states_mut(&mut self) -> impl Iterator<Item = &mut TopicState> {
        self.topics.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TopicRegistry {
        TopicRegistry::new(Duration::from_secs(60), 8, 4)
    }

    #[test]
    fn ensure_topic_is_create_or_get() {
        let mut reg = registry();
        let (state, created) = reg.ensure_topic("events");
        assert!(created);
        assert_eq!(state.meta.seq, 0);
        let created_at = state.meta.created;

        let (state, created) = reg.ensure_topic("events");
        assert!(!created);
        assert_eq!(state.meta.created, created_at);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn snapshot_lists_metadata() {
        let mut reg = registry();
        reg.ensure_topic("a");
        reg.ensure_topic("b").0.meta.seq = 3;

        let snap = reg.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap["b"].seq, 3);
        assert_eq!(snap["a"].ttl, Duration::from_secs(60));
    }
}
