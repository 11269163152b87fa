//! Queue topology for the relay.
//!
//! Every relay queue is declared the same way: non-durable, shared, never
//! auto-deleted, with a fixed per-message TTL. Declaration is idempotent, so
//! publishers re-declare their target queue before each publish.

use std::time::Duration;

use crate::broker::engine::Channel;
use crate::broker::queue::{QueueDescriptor, QueueOptions};
use crate::utils::error::BrokerError;

/// Unconsumed relay messages are dropped after three minutes.
pub const DEFAULT_MESSAGE_TTL: Duration = Duration::from_millis(180_000);

#[derive(Debug, Clone)]
pub struct Topology {
    channel: Channel,
    message_ttl: Duration,
}

impl Topology {
    pub fn new(channel: Channel, message_ttl: Duration) -> Self {
        Self {
            channel,
            message_ttl,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn options(&self) -> QueueOptions {
        QueueOptions::relay(self.message_ttl)
    }

    /// Declare `name` with the relay's queue options, or confirm it already
    /// exists with them. A `RedeclarationConflict` means some other party
    /// declared the queue differently; treat it as fatal.
    pub async fn ensure_queue(&self, name: &str) -> Result<QueueDescriptor, BrokerError> {
        self.channel.queue_declare(name, self.options()).await
    }
}
