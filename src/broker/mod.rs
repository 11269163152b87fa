//! In-process message broker.
//!
//! Named queues with per-queue message TTL, a single actor task that owns all
//! broker state, and cheap `Channel` handles that talk to it. Queues are
//! non-durable: they live as long as the connection that declared them.

pub mod consumer;
pub mod engine;
pub mod message;
pub mod queue;
pub mod topology;

pub use consumer::{AckMode, Consumer, Delivery};
pub use engine::{Broker, Channel, Connection};
pub use message::Message;
pub use queue::{QueueDescriptor, QueueOptions};
pub use topology::{DEFAULT_MESSAGE_TTL, Topology};

#[cfg(test)]
mod tests;
