//! Deadline-bounded publishing.
//!
//! `Publisher` re-declares its target queue and enqueues one message, all
//! within a fixed deadline measured from the start of the call. It never
//! retries: a timeout or broker error is returned to the caller, who logs it
//! and moves on. `RequestPublisher` and `ResponsePublisher` add the relay's
//! message encoding on top.

use std::time::Duration;

use tokio::time::{Instant, timeout_at};
use tracing::{debug, info};

use crate::auth::{AuthOutcome, LoginRequest, OUTCOME_HEADER};
use crate::broker::{Message, Topology};
use crate::utils::error::PublishError;

/// Default publish deadline.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Publisher {
    topology: Topology,
    queue: String,
    timeout: Duration,
}

impl Publisher {
    pub fn new(topology: Topology, queue: impl Into<String>, timeout: Duration) -> Self {
        Self {
            topology,
            queue: queue.into(),
            timeout,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Publish exactly one message or fail. Returns no later than the
    /// deadline, and a message that misses the deadline is never enqueued.
    pub async fn publish(&self, message: Message) -> Result<(), PublishError> {
        let deadline = Instant::now() + self.timeout;
        let attempt = async {
            let descriptor = self.topology.ensure_queue(&self.queue).await?;
            self.topology
                .channel()
                .publish(&descriptor.name, message, deadline)
                .await
        };

        match timeout_at(deadline, attempt).await {
            Ok(result) => result.map_err(PublishError::from),
            Err(_) => {
                debug!(queue = %self.queue, "publish deadline elapsed");
                Err(PublishError::Timeout {
                    queue: self.queue.clone(),
                    timeout: self.timeout,
                })
            }
        }
    }
}

/// Publishes login requests as JSON to the request queue.
#[derive(Debug, Clone)]
pub struct RequestPublisher {
    inner: Publisher,
}

impl RequestPublisher {
    pub fn new(inner: Publisher) -> Self {
        Self { inner }
    }

    pub fn queue(&self) -> &str {
        self.inner.queue()
    }

    pub async fn publish_login(
        &self,
        request: &LoginRequest,
        correlation_id: &str,
    ) -> Result<(), PublishError> {
        let body = request.encode()?;
        self.inner
            .publish(Message::text(body).with_correlation_id(correlation_id))
            .await?;
        info!(
            queue = %self.inner.queue(),
            correlation_id,
            account = %request.account,
            " [x] Sent login request"
        );
        Ok(())
    }
}

/// Publishes validation results to the response queue: the token (or the
/// empty string) as body, the outcome tag as a header, and the request's
/// correlation id echoed back.
#[derive(Debug, Clone)]
pub struct ResponsePublisher {
    inner: Publisher,
}

impl ResponsePublisher {
    pub fn new(inner: Publisher) -> Self {
        Self { inner }
    }

    pub fn queue(&self) -> &str {
        self.inner.queue()
    }

    pub async fn publish_outcome(
        &self,
        outcome: &AuthOutcome,
        correlation_id: Option<&str>,
    ) -> Result<(), PublishError> {
        let mut message = Message::text(outcome.token()).with_header(OUTCOME_HEADER, outcome.tag());
        if let Some(id) = correlation_id {
            message = message.with_correlation_id(id);
        }
        self.inner.publish(message).await?;

        let mark = if outcome.is_success() { "o" } else { "x" };
        info!(
            queue = %self.inner.queue(),
            correlation_id = correlation_id.unwrap_or("-"),
            outcome = outcome.tag(),
            " [{mark}] Sent auth result"
        );
        Ok(())
    }
}
