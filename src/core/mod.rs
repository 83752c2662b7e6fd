pub mod error;
pub mod listeners;
pub mod message;
pub mod queue;
pub mod topics;
