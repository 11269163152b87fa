//! Wires the relay together: broker, queues, worker, reply router, ingress.
//!
//! Every step of `Relay::start` is a startup step whose failure is fatal;
//! the caller is expected to log the error and exit.

use std::sync::Arc;

use axum::Router;
use tokio::task::JoinHandle;
use tracing::info;

use crate::auth::Validator;
use crate::broker::{AckMode, Broker, Connection, Topology};
use crate::config::Settings;
use crate::publisher::{Publisher, RequestPublisher, ResponsePublisher};
use crate::transport::http::{self, IngressState};
use crate::transport::replies::ReplyRouter;
use crate::utils::error::RelayError;
use crate::worker::Worker;

pub struct Relay {
    connection: Connection,
    ingress: Router,
    replies: Arc<ReplyRouter>,
    worker_task: JoinHandle<()>,
    replies_task: JoinHandle<()>,
}

impl Relay {
    pub async fn start(settings: &Settings) -> Result<Self, RelayError> {
        let broker = &settings.broker;

        let connection = Broker::connect(&broker.url)?;
        let ingress_channel = connection.open_channel()?;
        let worker_channel = connection.open_channel()?;

        let ingress_topology = Topology::new(ingress_channel.clone(), broker.message_ttl());
        let worker_topology = Topology::new(worker_channel.clone(), broker.message_ttl());
        ingress_topology.ensure_queue(&broker.request_queue).await?;
        ingress_topology.ensure_queue(&broker.response_queue).await?;

        let validator = Validator::from_settings(&settings.auth)?;
        info!(backend = ?validator.backend(), "credential validator ready");

        let responses = ResponsePublisher::new(Publisher::new(
            worker_topology,
            broker.response_queue.clone(),
            broker.publish_timeout(),
        ));
        let worker = Worker::new(validator, responses, settings.worker.ack_mode);
        let consumer = worker
            .subscribe(&worker_channel, &broker.request_queue)
            .await?;
        let worker_task = tokio::spawn(async move { worker.run(consumer).await });

        let replies = ReplyRouter::new();
        let reply_consumer = ingress_channel
            .consume(&broker.response_queue, AckMode::Auto)
            .await?;
        let replies_task = tokio::spawn(replies.clone().run(reply_consumer));

        let requests = RequestPublisher::new(Publisher::new(
            ingress_topology,
            broker.request_queue.clone(),
            broker.publish_timeout(),
        ));
        let ingress = http::router(IngressState::new(
            requests,
            replies.clone(),
            settings.ingress.reply_timeout(),
        ));

        Ok(Self {
            connection,
            ingress,
            replies,
            worker_task,
            replies_task,
        })
    }

    /// The HTTP ingress, ready to be served.
    pub fn ingress(&self) -> Router {
        self.ingress.clone()
    }

    pub fn replies(&self) -> &Arc<ReplyRouter> {
        &self.replies
    }

    /// Stop the broker and wait for the consumers to wind down.
    pub async fn shutdown(self) {
        self.connection.close();
        let _ = self.worker_task.await;
        let _ = self.replies_task.await;
        info!("relay stopped");
    }
}
