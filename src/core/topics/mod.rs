//! Topic metadata and the name → topic registry.

pub mod registry;
pub mod topic;

pub use registry::{TopicRegistry, TopicState};
pub use topic::{Topic, TopicName};
