//! Consumer handles.
//!
//! A `Consumer` is returned by `Channel::consume` and yields `Delivery`
//! values as a `Stream`. Dropping it cancels the subscription; any delivery
//! it still held unacknowledged goes back to the head of the queue.
//!
//! Each consumer holds at most one delivery the stream has not yielded yet.
//! A delivery whose message outlived its queue's TTL while waiting is
//! discarded instead of yielded.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use tracing::debug;

use crate::broker::engine::Command;
use crate::broker::message::Message;

/// How the broker treats a message once it is handed to a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Consumed once the stream yields it. A consumer that dies
    /// mid-processing loses the message.
    Auto,
    /// Held until acknowledged, with at most one unacknowledged delivery per
    /// consumer. Unacked deliveries are requeued when the consumer goes away.
    Manual,
}

#[derive(Debug)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub message: Message,
    expires_at: Instant,
    acker: Option<Acker>,
}

#[derive(Debug)]
struct Acker {
    consumer_tag: String,
    commands: UnboundedSender<Command>,
}

impl Delivery {
    pub(crate) fn auto(
        delivery_tag: u64,
        redelivered: bool,
        message: Message,
        expires_at: Instant,
    ) -> Self {
        Self {
            delivery_tag,
            redelivered,
            message,
            expires_at,
            acker: None,
        }
    }

    pub(crate) fn manual(
        delivery_tag: u64,
        redelivered: bool,
        message: Message,
        expires_at: Instant,
        consumer_tag: String,
        commands: UnboundedSender<Command>,
    ) -> Self {
        Self {
            delivery_tag,
            redelivered,
            message,
            expires_at,
            acker: Some(Acker {
                consumer_tag,
                commands,
            }),
        }
    }

    /// Acknowledge this delivery. A no-op for auto-ack consumers, and for a
    /// broker that has already shut down.
    pub fn ack(&self) {
        if let Some(acker) = &self.acker {
            let _ = acker.commands.send(Command::Ack {
                consumer_tag: acker.consumer_tag.clone(),
                delivery_tag: self.delivery_tag,
            });
        }
    }

    pub fn requires_ack(&self) -> bool {
        self.acker.is_some()
    }
}

#[derive(Debug)]
pub struct Consumer {
    tag: String,
    queue: String,
    ack_mode: AckMode,
    deliveries: UnboundedReceiver<Delivery>,
    commands: UnboundedSender<Command>,
}

impl Consumer {
    pub(crate) fn new(
        tag: String,
        queue: String,
        ack_mode: AckMode,
        deliveries: UnboundedReceiver<Delivery>,
        commands: UnboundedSender<Command>,
    ) -> Self {
        Self {
            tag,
            queue,
            ack_mode,
            deliveries,
            commands,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

impl Stream for Consumer {
    type Item = Delivery;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Delivery>> {
        loop {
            let delivery = match self.deliveries.poll_recv(cx) {
                Poll::Ready(Some(delivery)) => delivery,
                other => return other,
            };

            // Auto-ack consumers ask for the next message only once this one
            // leaves the buffer; manual ones get it from the ack.
            if self.ack_mode == AckMode::Auto {
                let _ = self.commands.send(Command::Release {
                    consumer_tag: self.tag.clone(),
                });
            }

            if Instant::now() >= delivery.expires_at {
                debug!(
                    queue = %self.queue,
                    delivery_tag = delivery.delivery_tag,
                    "message expired before it was consumed"
                );
                delivery.ack();
                continue;
            }
            return Poll::Ready(Some(delivery));
        }
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Cancel {
            consumer_tag: self.tag.clone(),
        });
    }
}
