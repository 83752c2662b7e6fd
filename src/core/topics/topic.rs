use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type TopicName = String;

/// Topic metadata as served by the listing endpoint and embedded in every
/// message.
///
/// `seq` is the monotonic sequence counter: it holds the id the next message
/// will be assigned, so it also counts the messages published so far. `ttl`
/// is advisory; it is stamped at creation and never enforced by eviction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub name: TopicName,
    #[serde(with = "duration_nanos")]
    pub ttl: Duration,
    pub seq: u64,
    pub created: DateTime<Utc>,
}

impl Topic {
    pub fn new(name: impl Into<TopicName>, ttl: Duration) -> Self {
        Topic {
            name: name.into(),
            ttl,
            seq: 0,
            created: Utc::now(),
        }
    }

    /// Assigns the next sequence id, incrementing the counter exactly once.
    pub fn next_seq(&mut self) -> u64 {
        let id = self.seq;
        self.seq += 1;
        id
    }
}

/// Serde adapter encoding a `Duration` as i64 nanoseconds, the TTL wire
/// representation.
mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(d.as_nanos() as i64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let nanos = i64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos.max(0) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_ids_are_contiguous_from_zero() {
        let mut topic = Topic::new("seq", Duration::from_secs(1));
        assert_eq!(topic.next_seq(), 0);
        assert_eq!(topic.next_seq(), 1);
        assert_eq!(topic.next_seq(), 2);
        assert_eq!(topic.seq, 3);
    }
}
