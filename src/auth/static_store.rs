use crate::auth::{CredentialValidator, LoginRequest};
use crate::utils::error::ValidationError;

/// A single fixed account/password pair. Meant for local runs and tests.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    account: String,
    password: String,
    token: String,
}

impl StaticCredentials {
    pub fn new(
        account: impl Into<String>,
        password: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            password: password.into(),
            token: token.into(),
        }
    }

    pub fn check(&self, request: &LoginRequest) -> Result<String, ValidationError> {
        if request.account != self.account || request.password != self.password {
            return Err(ValidationError::InvalidCredentials);
        }
        Ok(self.token.clone())
    }
}

impl CredentialValidator for StaticCredentials {
    async fn validate(&self, request: &LoginRequest) -> Result<String, ValidationError> {
        self.check(request)
    }
}
