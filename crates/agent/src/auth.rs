//! Identity tokens attached to outbound authority calls.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deploydesk_core::config::{AuthConfig, AuthMode};
use secrecy::SecretString;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("identity token request failed: {0}")]
    Request(String),
    #[error("identity token endpoint returned status {0}")]
    Status(u16),
    #[error("identity token endpoint returned an empty token")]
    Empty,
    #[error("static auth mode requires a token")]
    MissingStaticToken,
}

/// Supplies the bearer token for a call to `audience`. `Ok(None)` means the
/// call is sent unauthenticated.
#[async_trait]
pub trait IdentityTokenProvider: Send + Sync {
    async fn identity_token(&self, audience: &str) -> Result<Option<SecretString>, TokenError>;
}

#[derive(Clone, Debug, Default)]
pub struct NoIdentityToken;

#[async_trait]
impl IdentityTokenProvider for NoIdentityToken {
    async fn identity_token(&self, _audience: &str) -> Result<Option<SecretString>, TokenError> {
        Ok(None)
    }
}

#[derive(Clone, Debug)]
pub struct StaticIdentityToken {
    token: SecretString,
}

impl StaticIdentityToken {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl IdentityTokenProvider for StaticIdentityToken {
    async fn identity_token(&self, _audience: &str) -> Result<Option<SecretString>, TokenError> {
        Ok(Some(self.token.clone()))
    }
}

/// Fetches a fresh audience-bound identity token from the instance metadata
/// server for every call.
#[derive(Clone, Debug)]
pub struct MetadataIdentityToken {
    client: reqwest::Client,
    metadata_url: String,
}

impl MetadataIdentityToken {
    pub fn new(metadata_url: impl Into<String>, timeout: Duration) -> Result<Self, TokenError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| TokenError::Request(error.to_string()))?;
        Ok(Self { client, metadata_url: metadata_url.into() })
    }
}

#[async_trait]
impl IdentityTokenProvider for MetadataIdentityToken {
    async fn identity_token(&self, audience: &str) -> Result<Option<SecretString>, TokenError> {
        debug!(event_name = "auth.metadata_token.request", audience, "requesting identity token");

        let response = self
            .client
            .get(&self.metadata_url)
            .query(&[("audience", audience), ("format", "full")])
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|error| TokenError::Request(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TokenError::Status(status.as_u16()));
        }

        let token =
            response.text().await.map_err(|error| TokenError::Request(error.to_string()))?;
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Empty);
        }
        Ok(Some(SecretString::from(token.to_string())))
    }
}

pub fn token_provider_from_config(
    auth: &AuthConfig,
    timeout: Duration,
) -> Result<Arc<dyn IdentityTokenProvider>, TokenError> {
    match auth.mode {
        AuthMode::Metadata => {
            Ok(Arc::new(MetadataIdentityToken::new(auth.metadata_url.clone(), timeout)?))
        }
        AuthMode::Static => {
            let token = auth.static_token.clone().ok_or(TokenError::MissingStaticToken)?;
            Ok(Arc::new(StaticIdentityToken::new(token)))
        }
        AuthMode::None => Ok(Arc::new(NoIdentityToken)),
    }
}
