//! Broker engine
//!
//! This module contains the in-process broker responsible for:
//! - declaring named queues and rejecting conflicting redeclarations
//! - enqueueing published messages and purging them once their TTL elapses
//! - dispatching ready messages round-robin to attached consumers
//! - tracking unacknowledged deliveries and requeueing them when a consumer
//!   goes away
//!
//! Concurrency and usage notes:
//! - All state is owned by one actor task spawned in `Broker::connect`.
//!   `Connection` and `Channel` are handles that send it commands, so any
//!   number of tasks may publish concurrently without ever sharing the state.
//! - A publish carries its deadline. The actor refuses a publish whose
//!   deadline has passed, and withdraws a message whose publisher stopped
//!   waiting before the confirmation reached it, so a timed-out publish never
//!   leaves a message behind.
//! - Every consumer holds at most one delivery it has not finished with:
//!   manual-ack consumers until the ack, auto-ack consumers until their
//!   stream yields it. Everything else waits in the queue, where the TTL
//!   applies.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::consumer::{AckMode, Consumer, Delivery};
use crate::broker::message::Message;
use crate::broker::queue::{ConsumerTag, Enqueued, Queue, QueueDescriptor, QueueOptions};
use crate::utils::error::BrokerError;

/// URL scheme accepted by `Broker::connect`.
pub const MEMORY_SCHEME: &str = "memory://";

type Reply<T> = oneshot::Sender<Result<T, BrokerError>>;

#[derive(Debug)]
pub(crate) enum Command {
    Declare {
        name: String,
        options: QueueOptions,
        reply: Reply<QueueDescriptor>,
    },
    Publish {
        queue: String,
        message: Message,
        deadline: Instant,
        reply: Reply<()>,
    },
    Consume {
        queue: String,
        ack_mode: AckMode,
        reply: Reply<Consumer>,
    },
    Ack {
        consumer_tag: ConsumerTag,
        delivery_tag: u64,
    },
    /// An auto-ack consumer's stream yielded its delivery.
    Release {
        consumer_tag: ConsumerTag,
    },
    Cancel {
        consumer_tag: ConsumerTag,
    },
    MessageCount {
        queue: String,
        reply: Reply<usize>,
    },
    Close,
    #[cfg(test)]
    Stall { release: oneshot::Receiver<()> },
}

#[derive(Debug)]
struct ConsumerState {
    queue: String,
    ack_mode: AckMode,
    sender: UnboundedSender<Delivery>,
    unacked: BTreeMap<u64, Enqueued>,
    in_flight: bool,
}

impl ConsumerState {
    fn can_take(&self) -> bool {
        match self.ack_mode {
            AckMode::Auto => !self.in_flight,
            AckMode::Manual => self.unacked.is_empty(),
        }
    }
}

#[derive(Debug)]
pub struct Broker {
    queues: HashMap<String, Queue>,
    consumers: HashMap<ConsumerTag, ConsumerState>,
    next_delivery_tag: u64,
    commands: WeakUnboundedSender<Command>,
}

impl Broker {
    /// Start a broker and return a connection to it. Must be called from
    /// within a tokio runtime.
    pub fn connect(url: &str) -> Result<Connection, BrokerError> {
        if !url.starts_with(MEMORY_SCHEME) {
            return Err(BrokerError::UnsupportedUrl(url.to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let broker = Broker {
            queues: HashMap::new(),
            consumers: HashMap::new(),
            next_delivery_tag: 1,
            commands: tx.downgrade(),
        };
        tokio::spawn(broker.run(rx));
        info!(url, "broker started");

        Ok(Connection { commands: tx })
    }

    async fn run(mut self, mut commands: UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Declare {
                    name,
                    options,
                    reply,
                } => {
                    let _ = reply.send(self.declare(name, options));
                }
                Command::Publish {
                    queue,
                    message,
                    deadline,
                    reply,
                } => self.publish(&queue, message, deadline, reply),
                Command::Consume {
                    queue,
                    ack_mode,
                    reply,
                } => {
                    let result = self.attach_consumer(&queue, ack_mode);
                    let attached = result.is_ok();
                    // A caller that gave up drops the consumer, which cancels it.
                    let _ = reply.send(result);
                    if attached {
                        self.dispatch(&queue);
                    }
                }
                Command::Ack {
                    consumer_tag,
                    delivery_tag,
                } => self.ack(&consumer_tag, delivery_tag),
                Command::Release { consumer_tag } => self.release(&consumer_tag),
                Command::Cancel { consumer_tag } => self.cancel(&consumer_tag),
                Command::MessageCount { queue, reply } => {
                    let _ = reply.send(self.message_count(&queue));
                }
                Command::Close => {
                    info!("broker shutting down");
                    break;
                }
                #[cfg(test)]
                Command::Stall { release } => {
                    let _ = release.await;
                }
            }
        }
        // Dropping the consumer senders ends every consumer stream.
    }

    fn declare(
        &mut self,
        name: String,
        options: QueueOptions,
    ) -> Result<QueueDescriptor, BrokerError> {
        if let Some(existing) = self.queues.get(&name) {
            if existing.descriptor.options == options {
                return Ok(existing.descriptor.clone());
            }
            warn!(queue = %name, "queue redeclared with different properties");
            return Err(BrokerError::RedeclarationConflict { name });
        }

        let descriptor = QueueDescriptor {
            name: name.clone(),
            options,
        };
        info!(queue = %name, ttl_ms = descriptor.ttl_millis(), "queue declared");
        self.queues.insert(name, Queue::new(descriptor.clone()));
        Ok(descriptor)
    }

    /// Enqueue unless the deadline has passed. The message only becomes
    /// visible to consumers once the publisher has received the confirmation.
    fn publish(&mut self, queue: &str, mut message: Message, deadline: Instant, reply: Reply<()>) {
        let now = Instant::now();
        if now >= deadline {
            debug!(queue, "publish rejected past its deadline");
            let _ = reply.send(Err(BrokerError::DeadlineExceeded));
            return;
        }
        let Some(q) = self.queues.get_mut(queue) else {
            let _ = reply.send(Err(BrokerError::QueueNotFound(queue.to_string())));
            return;
        };

        message.timestamp = chrono::Utc::now().timestamp_millis();
        q.push(message, now);
        if reply.send(Ok(())).is_err() {
            q.pop_back();
            debug!(queue, "publisher gave up before confirmation, message withdrawn");
            return;
        }
        self.dispatch(queue);
    }

    fn attach_consumer(&mut self, queue: &str, ack_mode: AckMode) -> Result<Consumer, BrokerError> {
        let commands = self
            .commands
            .upgrade()
            .ok_or(BrokerError::ConnectionClosed)?;
        let q = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;

        let tag = format!("ctag-{}", Uuid::new_v4());
        let (tx, rx) = mpsc::unbounded_channel();
        q.attach(tag.clone());
        self.consumers.insert(
            tag.clone(),
            ConsumerState {
                queue: queue.to_string(),
                ack_mode,
                sender: tx,
                unacked: BTreeMap::new(),
                in_flight: false,
            },
        );
        info!(queue, consumer = %tag, ?ack_mode, "consumer registered");

        Ok(Consumer::new(tag, queue.to_string(), ack_mode, rx, commands))
    }

    fn ack(&mut self, consumer_tag: &str, delivery_tag: u64) {
        let Some(state) = self.consumers.get_mut(consumer_tag) else {
            return;
        };
        if state.unacked.remove(&delivery_tag).is_none() {
            warn!(consumer = consumer_tag, delivery_tag, "ack for unknown delivery tag");
            return;
        }
        let queue = state.queue.clone();
        self.dispatch(&queue);
    }

    fn release(&mut self, consumer_tag: &str) {
        let Some(state) = self.consumers.get_mut(consumer_tag) else {
            return;
        };
        state.in_flight = false;
        let queue = state.queue.clone();
        self.dispatch(&queue);
    }

    fn cancel(&mut self, consumer_tag: &str) {
        let Some(state) = self.consumers.remove(consumer_tag) else {
            return;
        };
        let queue_name = state.queue.clone();
        if let Some(queue) = self.queues.get_mut(&queue_name) {
            queue.detach(consumer_tag);
            requeue_unacked(queue, state);
        }
        debug!(consumer = consumer_tag, queue = %queue_name, "consumer cancelled");
        self.dispatch(&queue_name);
    }

    fn message_count(&mut self, queue: &str) -> Result<usize, BrokerError> {
        let q = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
        q.purge_expired(Instant::now());
        Ok(q.len())
    }

    /// Hand ready messages to consumers that can take them, until either
    /// side runs out.
    fn dispatch(&mut self, queue_name: &str) {
        let now = Instant::now();
        let Self {
            queues,
            consumers,
            next_delivery_tag,
            commands,
        } = self;
        let Some(queue) = queues.get_mut(queue_name) else {
            return;
        };

        let ttl = queue.descriptor.options.message_ttl;
        let expired = queue.purge_expired(now);
        if expired > 0 {
            debug!(queue = queue_name, expired, "expired messages dropped");
        }

        while !queue.is_empty() {
            let Some(tag) = queue
                .rotation()
                .into_iter()
                .find(|t| consumers.get(t).is_some_and(ConsumerState::can_take))
            else {
                break;
            };
            let (Some(state), Some(enqueued)) = (consumers.get_mut(&tag), queue.pop_front()) else {
                break;
            };

            let delivery_tag = *next_delivery_tag;
            *next_delivery_tag += 1;

            let expires_at = enqueued.expires_at(ttl);
            let delivery = match state.ack_mode {
                AckMode::Auto => Delivery::auto(
                    delivery_tag,
                    enqueued.redelivered,
                    enqueued.message.clone(),
                    expires_at,
                ),
                AckMode::Manual => {
                    let Some(commands) = commands.upgrade() else {
                        queue.requeue_front(enqueued);
                        break;
                    };
                    Delivery::manual(
                        delivery_tag,
                        enqueued.redelivered,
                        enqueued.message.clone(),
                        expires_at,
                        tag.clone(),
                        commands,
                    )
                }
            };

            if state.sender.send(delivery).is_err() {
                // The consumer is gone and its cancel has not arrived yet.
                queue.requeue_front(enqueued);
                queue.detach(&tag);
                if let Some(state) = consumers.remove(&tag) {
                    requeue_unacked(queue, state);
                }
                continue;
            }

            match state.ack_mode {
                AckMode::Auto => state.in_flight = true,
                AckMode::Manual => {
                    state.unacked.insert(delivery_tag, enqueued);
                }
            }
            queue.advance_past(&tag);
        }
    }
}

fn requeue_unacked(queue: &mut Queue, state: ConsumerState) {
    for (_, mut enqueued) in state.unacked.into_iter().rev() {
        enqueued.redelivered = true;
        queue.requeue_front(enqueued);
    }
}

/// Handle to a running broker. Owned by the process for its whole run.
#[derive(Debug)]
pub struct Connection {
    commands: UnboundedSender<Command>,
}

impl Connection {
    pub fn open_channel(&self) -> Result<Channel, BrokerError> {
        if self.commands.is_closed() {
            return Err(BrokerError::ConnectionClosed);
        }
        debug!("channel opened");
        Ok(Channel {
            commands: self.commands.clone(),
        })
    }

    /// Stop the broker. Consumer streams end and every later call on any
    /// channel fails with `ConnectionClosed`.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }
}

/// A cheap, cloneable handle for issuing broker operations. Every call is
/// serialized through the broker actor.
#[derive(Debug, Clone)]
pub struct Channel {
    commands: UnboundedSender<Command>,
}

impl Channel {
    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, BrokerError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| BrokerError::ConnectionClosed)?;
        response.await.map_err(|_| BrokerError::ConnectionClosed)?
    }

    pub async fn queue_declare(
        &self,
        name: &str,
        options: QueueOptions,
    ) -> Result<QueueDescriptor, BrokerError> {
        self.request(|reply| Command::Declare {
            name: name.to_string(),
            options,
            reply,
        })
        .await
    }

    /// Enqueue `message` on `queue`. The broker refuses the message if it
    /// only gets to it after `deadline`.
    pub async fn publish(
        &self,
        queue: &str,
        message: Message,
        deadline: Instant,
    ) -> Result<(), BrokerError> {
        self.request(|reply| Command::Publish {
            queue: queue.to_string(),
            message,
            deadline,
            reply,
        })
        .await
    }

    pub async fn consume(&self, queue: &str, ack_mode: AckMode) -> Result<Consumer, BrokerError> {
        self.request(|reply| Command::Consume {
            queue: queue.to_string(),
            ack_mode,
            reply,
        })
        .await
    }

    /// Number of ready messages, after dropping expired ones.
    pub async fn message_count(&self, queue: &str) -> Result<usize, BrokerError> {
        self.request(|reply| Command::MessageCount {
            queue: queue.to_string(),
            reply,
        })
        .await
    }

    /// Block the broker actor until the returned sender fires or is dropped.
    #[cfg(test)]
    pub(crate) fn stall(&self) -> oneshot::Sender<()> {
        let (release, rx) = oneshot::channel();
        let _ = self.commands.send(Command::Stall { release: rx });
        release
    }
}
