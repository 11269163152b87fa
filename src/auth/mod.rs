//! Credential validation.
//!
//! The worker hands every decoded `LoginRequest` to a `CredentialValidator`
//! and turns the result into an `AuthOutcome`. Which validator runs is a
//! configuration choice (`auth.backend`), not a separate program.

pub mod idp_stub;
pub mod remote;
pub mod static_store;

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::config::{AuthBackend, AuthSettings};
use crate::utils::error::{RelayError, ValidationError};

pub use remote::RemoteIdentityProvider;
pub use static_store::StaticCredentials;

/// Message header carrying the outcome tag on response messages.
pub const OUTCOME_HEADER: &str = "x-auth-outcome";

/// A login attempt as it travels through the request queue.
///
/// Missing fields decode as empty strings, and a JSON `null` body as an
/// empty request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LoginRequest {
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub password: String,
}

impl LoginRequest {
    pub fn new(account: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            password: password.into(),
        }
    }

    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice::<Option<Self>>(body).map(Option::unwrap_or_default)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

// Keeps passwords out of logs.
impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("account", &self.account)
            .field("password", &"***")
            .finish()
    }
}

/// What happened to a login request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Success(String),
    InvalidCredentials,
    ProviderUnavailable,
    /// The request body could not be decoded. No response is sent for these.
    DecodeFailure,
}

impl AuthOutcome {
    pub fn from_validation(result: Result<String, ValidationError>) -> Self {
        match result {
            Ok(token) => AuthOutcome::Success(token),
            Err(ValidationError::InvalidCredentials) => AuthOutcome::InvalidCredentials,
            Err(ValidationError::ProviderUnavailable(_)) => AuthOutcome::ProviderUnavailable,
        }
    }

    /// The response body: the token, or the empty string for every failure.
    pub fn token(&self) -> &str {
        match self {
            AuthOutcome::Success(token) => token,
            _ => "",
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            AuthOutcome::Success(_) => "success",
            AuthOutcome::InvalidCredentials => "invalid_credentials",
            AuthOutcome::ProviderUnavailable => "provider_unavailable",
            AuthOutcome::DecodeFailure => "decode_failure",
        }
    }

    /// Rebuild an outcome from a response message. Without a tag, an empty
    /// body can only be read as a failure of unknown cause, which is reported
    /// as invalid credentials.
    pub fn from_response(tag: Option<&str>, body: &str) -> Self {
        match tag {
            Some("success") => AuthOutcome::Success(body.to_string()),
            Some("invalid_credentials") => AuthOutcome::InvalidCredentials,
            Some("provider_unavailable") => AuthOutcome::ProviderUnavailable,
            Some("decode_failure") => AuthOutcome::DecodeFailure,
            _ if body.is_empty() => AuthOutcome::InvalidCredentials,
            _ => AuthOutcome::Success(body.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Success(_))
    }
}

/// Checks a login request and yields an opaque token on success.
pub trait CredentialValidator: Send + Sync {
    fn validate(
        &self,
        request: &LoginRequest,
    ) -> impl Future<Output = Result<String, ValidationError>> + Send;
}

/// The validator selected by configuration.
#[derive(Debug, Clone)]
pub enum Validator {
    Static(StaticCredentials),
    Remote(RemoteIdentityProvider),
}

impl Validator {
    pub fn from_settings(settings: &AuthSettings) -> Result<Self, RelayError> {
        Ok(match settings.backend {
            AuthBackend::Static => Validator::Static(StaticCredentials::new(
                settings.account.clone(),
                settings.password.clone(),
                settings.token.clone(),
            )),
            AuthBackend::Remote => Validator::Remote(RemoteIdentityProvider::new(
                settings.provider_url.clone(),
                settings.provider_timeout(),
            )?),
        })
    }

    pub fn backend(&self) -> AuthBackend {
        match self {
            Validator::Static(_) => AuthBackend::Static,
            Validator::Remote(_) => AuthBackend::Remote,
        }
    }
}

impl CredentialValidator for Validator {
    async fn validate(&self, request: &LoginRequest) -> Result<String, ValidationError> {
        match self {
            Validator::Static(v) => v.validate(request).await,
            Validator::Remote(v) => v.validate(request).await,
        }
    }
}
