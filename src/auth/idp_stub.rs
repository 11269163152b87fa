//! A stand-in identity provider.
//!
//! Accepts one account/password pair on `POST /api/v1/auth/login` and answers
//! with a fixed token, `401 Invalid credentials` otherwise. Backs the
//! `mock-idp` subcommand and the remote-validator tests.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use tokio::net::TcpListener;
use tracing::info;

use crate::auth::LoginRequest;

pub const LOGIN_PATH: &str = "/api/v1/auth/login";

#[derive(Debug, Clone)]
pub struct StubIdentityProvider {
    pub account: String,
    pub password: String,
    pub token: String,
}

impl Default for StubIdentityProvider {
    fn default() -> Self {
        Self {
            account: "your_account".to_string(),
            password: "your_password".to_string(),
            token: "generate_a_token_for_user".to_string(),
        }
    }
}

pub fn router(stub: StubIdentityProvider) -> Router {
    Router::new()
        .route(LOGIN_PATH, post(login))
        .with_state(Arc::new(stub))
}

async fn login(State(stub): State<Arc<StubIdentityProvider>>, body: Bytes) -> Response {
    let Ok(request) = serde_json::from_slice::<LoginRequest>(&body) else {
        return (StatusCode::BAD_REQUEST, "Invalid request payload").into_response();
    };

    if request.account == stub.account && request.password == stub.password {
        (StatusCode::OK, stub.token.clone()).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, "Invalid credentials").into_response()
    }
}

pub async fn serve(listener: TcpListener, stub: StubIdentityProvider) -> std::io::Result<()> {
    info!(addr = ?listener.local_addr()?, "mock identity provider listening");
    axum::serve(listener, router(stub)).await
}
