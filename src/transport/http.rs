//! HTTP ingress.
//!
//! `POST /login` publishes the request and answers right away, whether or
//! not the publish worked: the caller never learns the validation result.
//! `POST /login/sync` publishes the same way and then waits for the
//! correlated response.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};
use uuid::Uuid;

use crate::auth::{AuthOutcome, LoginRequest};
use crate::publisher::RequestPublisher;
use crate::transport::replies::ReplyRouter;
use crate::utils::error::PublishError;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

pub const LOGIN_ACCEPTED: &str = "Login request sent";

#[derive(Debug, Clone)]
pub struct IngressState {
    requests: RequestPublisher,
    replies: Arc<ReplyRouter>,
    reply_timeout: Duration,
}

impl IngressState {
    pub fn new(requests: RequestPublisher, replies: Arc<ReplyRouter>, reply_timeout: Duration) -> Self {
        Self {
            requests,
            replies,
            reply_timeout,
        }
    }
}

#[derive(Debug, Error)]
pub enum IngressError {
    #[error("Invalid request payload")]
    InvalidPayload,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Identity provider unavailable")]
    ProviderUnavailable,

    #[error("Login request could not be queued")]
    Publish(#[from] PublishError),

    #[error("Timed out waiting for the auth result")]
    ReplyTimeout,
}

impl IntoResponse for IngressError {
    fn into_response(self) -> Response {
        let status = match &self {
            IngressError::InvalidPayload => StatusCode::BAD_REQUEST,
            IngressError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            IngressError::ProviderUnavailable | IngressError::Publish(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            IngressError::ReplyTimeout => StatusCode::GATEWAY_TIMEOUT,
        };
        (status, self.to_string()).into_response()
    }
}

pub fn router(state: IngressState) -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/login/sync", post(login_sync))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn parse(body: &Bytes) -> Result<LoginRequest, IngressError> {
    LoginRequest::decode(body).map_err(|e| {
        warn!(error = %e, "rejecting login payload");
        IngressError::InvalidPayload
    })
}

async fn login(State(state): State<IngressState>, body: Bytes) -> Result<Response, IngressError> {
    let request = parse(&body)?;
    let correlation_id = Uuid::new_v4().to_string();

    match state.requests.publish_login(&request, &correlation_id).await {
        Ok(()) => Ok(([(CORRELATION_HEADER, correlation_id)], LOGIN_ACCEPTED).into_response()),
        Err(e) => {
            // Fire-and-forget: the caller is not told.
            error!(correlation_id, error = %e, "Failed to publish login request");
            Ok(LOGIN_ACCEPTED.into_response())
        }
    }
}

async fn login_sync(
    State(state): State<IngressState>,
    body: Bytes,
) -> Result<Response, IngressError> {
    let request = parse(&body)?;
    let correlation_id = Uuid::new_v4().to_string();

    let pending = state.replies.register(correlation_id.clone());
    if let Err(e) = state.requests.publish_login(&request, &correlation_id).await {
        error!(correlation_id, error = %e, "Failed to publish login request");
        return Err(e.into());
    }

    match pending.wait(state.reply_timeout).await {
        Some(AuthOutcome::Success(token)) => {
            Ok(([(CORRELATION_HEADER, correlation_id)], token).into_response())
        }
        Some(AuthOutcome::InvalidCredentials) => Err(IngressError::InvalidCredentials),
        Some(AuthOutcome::ProviderUnavailable | AuthOutcome::DecodeFailure) => {
            Err(IngressError::ProviderUnavailable)
        }
        None => {
            warn!(correlation_id, timeout = ?state.reply_timeout, "no auth result in time");
            Err(IngressError::ReplyTimeout)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
