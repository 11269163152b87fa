//! Response-queue listener.
//!
//! Logs every response the worker publishes and hands it to whoever is
//! waiting on its correlation id. Waiters register before their request is
//! published and deregister when they stop waiting, so a reply that arrives
//! after its waiter timed out is only logged.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::auth::{AuthOutcome, OUTCOME_HEADER};
use crate::broker::{Consumer, Message};

#[derive(Debug, Default)]
pub struct ReplyRouter {
    waiters: Mutex<HashMap<String, oneshot::Sender<AuthOutcome>>>,
}

impl ReplyRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Start waiting for the reply to `correlation_id`.
    pub fn register(self: &Arc<Self>, correlation_id: impl Into<String>) -> PendingReply {
        let correlation_id = correlation_id.into();
        let (tx, rx) = oneshot::channel();
        self.lock().insert(correlation_id.clone(), tx);
        PendingReply {
            correlation_id,
            receiver: rx,
            router: Arc::clone(self),
        }
    }

    /// Complete the waiter for `correlation_id`. Returns false when nobody
    /// is waiting for it.
    pub fn resolve(&self, correlation_id: &str, outcome: AuthOutcome) -> bool {
        match self.lock().remove(correlation_id) {
            Some(waiter) => waiter.send(outcome).is_ok(),
            None => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Consume the response queue until the broker goes away.
    pub async fn run(self: Arc<Self>, mut consumer: Consumer) {
        info!(queue = consumer.queue(), "listening for auth results");
        while let Some(delivery) = consumer.next().await {
            self.handle(&delivery.message);
        }
        info!(queue = consumer.queue(), "response consumer closed");
    }

    pub fn handle(&self, message: &Message) {
        let body = message.body_text();
        let outcome = AuthOutcome::from_response(message.header(OUTCOME_HEADER), &body);
        let correlation_id = message.correlation_id.as_deref();
        info!(
            correlation_id = correlation_id.unwrap_or("-"),
            outcome = outcome.tag(),
            "Received an auth result"
        );

        if let Some(id) = correlation_id {
            if !self.resolve(id, outcome) {
                debug!(correlation_id = id, "no caller waiting for this result");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<AuthOutcome>>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A registered waiter. Dropping it removes the registration.
#[derive(Debug)]
pub struct PendingReply {
    correlation_id: String,
    receiver: oneshot::Receiver<AuthOutcome>,
    router: Arc<ReplyRouter>,
}

impl PendingReply {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Wait up to `timeout` for the reply.
    pub async fn wait(mut self, timeout: Duration) -> Option<AuthOutcome> {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(outcome)) => Some(outcome),
            _ => None,
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.router.lock().remove(&self.correlation_id);
    }
}
