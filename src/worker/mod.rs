//! Request consumer.
//!
//! Drains the request queue one message at a time, in delivery order:
//!
//! ```text
//! received -> decode --fail--> dropped (no response)
//!               |
//!               ok -> validate -> token | empty sentinel -> publish response
//! ```
//!
//! Nothing in here terminates the loop. Decode, validation and publish
//! failures are logged and the worker moves on to the next delivery.

use futures_util::StreamExt;
use tracing::{debug, error, info, warn};

use crate::auth::{AuthOutcome, CredentialValidator, LoginRequest};
use crate::broker::{AckMode, Channel, Consumer, Message};
use crate::config::AckPolicy;
use crate::publisher::ResponsePublisher;
use crate::utils::error::BrokerError;

/// Terminal state of one request message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    /// The body did not decode; no response was sent.
    Dropped,
    Published(AuthOutcome),
    /// A response was due but could not be published.
    PublishFailed(AuthOutcome),
}

#[derive(Debug)]
pub struct Worker<V> {
    validator: V,
    responses: ResponsePublisher,
    ack_policy: AckPolicy,
}

impl<V: CredentialValidator> Worker<V> {
    pub fn new(validator: V, responses: ResponsePublisher, ack_policy: AckPolicy) -> Self {
        Self {
            validator,
            responses,
            ack_policy,
        }
    }

    pub fn ack_mode(&self) -> AckMode {
        match self.ack_policy {
            AckPolicy::OnReceipt => AckMode::Auto,
            AckPolicy::AfterProcessing => AckMode::Manual,
        }
    }

    /// Register the worker's consumer on `queue`. A failure here is fatal.
    pub async fn subscribe(&self, channel: &Channel, queue: &str) -> Result<Consumer, BrokerError> {
        channel.consume(queue, self.ack_mode()).await
    }

    /// Process deliveries until the broker goes away.
    pub async fn run(&self, mut consumer: Consumer) {
        info!(
            queue = consumer.queue(),
            consumer = consumer.tag(),
            ack_mode = ?self.ack_policy,
            " [*] Waiting for messages"
        );

        while let Some(delivery) = consumer.next().await {
            let processed = self.process(&delivery.message).await;
            debug!(
                delivery_tag = delivery.delivery_tag,
                redelivered = delivery.redelivered,
                ?processed,
                "request processed"
            );
            // No-op under on_receipt: the broker already forgot the message.
            delivery.ack();
        }

        info!(queue = consumer.queue(), "request consumer closed");
    }

    /// Run one message through decode, validate and publish.
    pub async fn process(&self, message: &Message) -> Processed {
        let correlation_id = message.correlation_id.as_deref();

        let request = match LoginRequest::decode(&message.body) {
            Ok(request) => request,
            Err(e) => {
                warn!(
                    correlation_id,
                    error = %e,
                    bytes = message.body.len(),
                    "Error decoding JSON, dropping message"
                );
                return Processed::Dropped;
            }
        };
        info!(account = %request.account, correlation_id, "Received a login request");

        let result = self.validator.validate(&request).await;
        if let Err(e) = &result {
            warn!(account = %request.account, correlation_id, error = %e, "Failed to login");
        }
        let outcome = AuthOutcome::from_validation(result);

        match self.responses.publish_outcome(&outcome, correlation_id).await {
            Ok(()) => Processed::Published(outcome),
            Err(e) => {
                error!(
                    correlation_id,
                    outcome = outcome.tag(),
                    error = %e,
                    "Failed to publish auth result"
                );
                Processed::PublishFailed(outcome)
            }
        }
    }
}
