//! The immutable message record carried by queues and subscriber channels.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::topics::Topic;

/// A single published message.
///
/// `id` equals the owning topic's sequence counter at the moment of
/// assignment; ids are contiguous from 0 within a topic. The embedded
/// topic metadata is a snapshot taken at assignment time. On the wire the
/// payload is base64 text and timestamps are RFC 3339, matching the JSON
/// schema served by the pull and streaming endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub topic: Topic,
    #[serde(with = "base64_bytes")]
    pub payload: Bytes,
    pub created: DateTime<Utc>,
}

impl Message {
    pub fn new(id: u64, topic: Topic, payload: impl Into<Bytes>) -> Self {
        Message {
            id,
            topic,
            payload: payload.into(),
            created: Utc::now(),
        }
    }
}

/// Current wall-clock time as nanoseconds since the Unix epoch.
///
/// Ping and pong frames carry this value as decimal text so either side can
/// compute round-trip latency.
pub fn now_nanos() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System time is before Unix epoch")
        .as_nanos() as i64
}

/// Serde adapter encoding `Bytes` as standard base64 text.
mod base64_bytes {
    use base64::{engine::general_purpose, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
