//! Identity-provider backed validation.
//!
//! POSTs the login request as JSON and reads the raw token from a 200
//! response. 401 and 403 mean the credentials were rejected; every other
//! failure (status, transport, timeout, unreadable body) means the provider
//! could not answer.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

use crate::auth::{CredentialValidator, LoginRequest};
use crate::utils::error::ValidationError;

#[derive(Debug, Clone)]
pub struct RemoteIdentityProvider {
    url: String,
    client: reqwest::Client,
}

impl RemoteIdentityProvider {
    /// `timeout` bounds the whole exchange, connect included.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<String, ValidationError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| ValidationError::ProviderUnavailable(format!("error sending POST request: {e}")))?;

        let status = response.status();
        debug!(url = %self.url, %status, "identity provider responded");
        match status {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ValidationError::InvalidCredentials);
            }
            other => {
                return Err(ValidationError::ProviderUnavailable(format!(
                    "unexpected response status: {other}"
                )));
            }
        }

        let body = response.bytes().await.map_err(|e| {
            ValidationError::ProviderUnavailable(format!("error reading response data: {e}"))
        })?;
        String::from_utf8(body.to_vec()).map_err(|_| {
            ValidationError::ProviderUnavailable("response body is not valid UTF-8".to_string())
        })
    }
}

impl CredentialValidator for RemoteIdentityProvider {
    async fn validate(&self, request: &LoginRequest) -> Result<String, ValidationError> {
        self.login(request).await
    }
}
