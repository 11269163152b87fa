//! Queue management
//!
//! A `Queue` holds ready messages in FIFO order together with the tags of the
//! consumers attached to it. Messages carry the instant they were enqueued;
//! anything older than the queue's TTL is purged before it can be handed out.
//!
//! Concurrency note: queues are only ever touched by the broker actor.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::broker::message::Message;

pub type ConsumerTag = String;

/// Properties a queue is declared with. Two declarations of the same name
/// must agree on all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
    pub message_ttl: Duration,
}

impl QueueOptions {
    /// Non-durable, shared, never auto-deleted, with the given message TTL.
    pub fn relay(message_ttl: Duration) -> Self {
        Self {
            durable: false,
            exclusive: false,
            auto_delete: false,
            message_ttl,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDescriptor {
    pub name: String,
    pub options: QueueOptions,
}

impl QueueDescriptor {
    pub fn ttl_millis(&self) -> u128 {
        self.options.message_ttl.as_millis()
    }
}

/// A message sitting in a queue or held by a consumer awaiting its ack.
#[derive(Debug, Clone)]
pub struct Enqueued {
    pub message: Message,
    pub enqueued_at: Instant,
    pub redelivered: bool,
}

impl Enqueued {
    pub fn expires_at(&self, ttl: Duration) -> Instant {
        self.enqueued_at + ttl
    }
}

#[derive(Debug)]
pub struct Queue {
    pub descriptor: QueueDescriptor,
    pub consumers: Vec<ConsumerTag>,
    ready: VecDeque<Enqueued>,
    cursor: usize,
}

impl Queue {
    pub fn new(descriptor: QueueDescriptor) -> Self {
        Self {
            descriptor,
            consumers: Vec::new(),
            ready: VecDeque::new(),
            cursor: 0,
        }
    }

    pub fn push(&mut self, message: Message, now: Instant) {
        self.ready.push_back(Enqueued {
            message,
            enqueued_at: now,
            redelivered: false,
        });
    }

    /// Put a message back at the head of the queue. Its original enqueue
    /// instant is kept, so requeueing never extends a message's lifetime.
    pub fn requeue_front(&mut self, enqueued: Enqueued) {
        self.ready.push_front(enqueued);
    }

    /// Drop every expired message. Returns how many were dropped.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let ttl = self.descriptor.options.message_ttl;
        let before = self.ready.len();
        self.ready.retain(|e| now < e.expires_at(ttl));
        before - self.ready.len()
    }

    pub fn pop_front(&mut self) -> Option<Enqueued> {
        self.ready.pop_front()
    }

    /// Take back the most recently pushed message.
    pub fn pop_back(&mut self) -> Option<Enqueued> {
        self.ready.pop_back()
    }

    pub fn len(&self) -> usize {
        self.ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }

    pub fn attach(&mut self, tag: ConsumerTag) {
        self.consumers.push(tag);
    }

    pub fn detach(&mut self, tag: &str) {
        self.consumers.retain(|t| t != tag);
        if self.cursor >= self.consumers.len() {
            self.cursor = 0;
        }
    }

    /// Consumer tags in round-robin order, starting after the consumer that
    /// received the previous delivery.
    pub fn rotation(&self) -> Vec<ConsumerTag> {
        let n = self.consumers.len();
        (0..n)
            .map(|i| self.consumers[(self.cursor + i) % n].clone())
            .collect()
    }

    pub fn advance_past(&mut self, tag: &str) {
        if let Some(pos) = self.consumers.iter().position(|t| t == tag) {
            self.cursor = (pos + 1) % self.consumers.len();
        }
    }
}
