//! HTTP client for the workstation and deployment authorities.
//!
//! Each call is a single JSON POST with no retry. Every failure is folded into
//! a [`GatewayOutcome`] and logged here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deploydesk_core::config::AppConfig;
use deploydesk_core::gateway::{
    DeploymentRequest, GatewayOutcome, ValidationGateway, WorkstationRequest,
};
use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::auth::{token_provider_from_config, IdentityTokenProvider, TokenError};

#[derive(Debug, Error)]
pub enum GatewayBuildError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error(transparent)]
    Token(#[from] TokenError),
}

#[derive(Clone, Debug)]
pub struct HttpGatewaySettings {
    pub validate_computer_url: Option<String>,
    pub deploy_software_url: Option<String>,
    pub timeout: Duration,
}

impl HttpGatewaySettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            validate_computer_url: config.gateway.validate_computer_url.clone(),
            deploy_software_url: config.gateway.deploy_software_url.clone(),
            timeout: Duration::from_secs(config.gateway.timeout_secs),
        }
    }
}

pub struct HttpValidationGateway {
    client: reqwest::Client,
    settings: HttpGatewaySettings,
    tokens: Arc<dyn IdentityTokenProvider>,
}

impl HttpValidationGateway {
    pub fn new(
        settings: HttpGatewaySettings,
        tokens: Arc<dyn IdentityTokenProvider>,
    ) -> Result<Self, GatewayBuildError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|error| GatewayBuildError::Client(error.to_string()))?;
        Ok(Self { client, settings, tokens })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, GatewayBuildError> {
        let settings = HttpGatewaySettings::from_config(config);
        let tokens = token_provider_from_config(&config.auth, settings.timeout)?;
        Self::new(settings, tokens)
    }

    async fn post<T>(&self, operation: &'static str, url: Option<&str>, payload: &T) -> GatewayOutcome
    where
        T: Serialize + Sync,
    {
        let Some(url) = url else {
            error!(event_name = "gateway.call.unconfigured", operation, "authority URL is not set");
            return GatewayOutcome::TechnicalError;
        };

        let token = match self.tokens.identity_token(url).await {
            Ok(token) => token,
            Err(token_error) => {
                error!(
                    event_name = "gateway.call.auth_failed",
                    operation,
                    error = %token_error,
                    "could not obtain identity token"
                );
                return GatewayOutcome::TechnicalError;
            }
        };

        let mut request = self.client.post(url).json(payload);
        if let Some(token) = token.as_ref() {
            request = request.bearer_auth(token.expose_secret());
        }

        debug!(event_name = "gateway.call.sent", operation, url, "calling authority");
        let response = match request.send().await {
            Ok(response) => response,
            Err(send_error) if send_error.is_timeout() => {
                warn!(
                    event_name = "gateway.call.timeout",
                    operation,
                    timeout_secs = self.settings.timeout.as_secs_f64(),
                    "authority did not answer in time"
                );
                return GatewayOutcome::Inconclusive;
            }
            Err(send_error) => {
                error!(
                    event_name = "gateway.call.transport_failed",
                    operation,
                    error = %send_error,
                    "authority call failed"
                );
                return GatewayOutcome::TechnicalError;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                event_name = "gateway.call.bad_status",
                operation,
                status = status.as_u16(),
                body = %body,
                "authority returned an error status"
            );
            return GatewayOutcome::TechnicalError;
        }

        match response.text().await {
            Ok(body) => {
                debug!(
                    event_name = "gateway.call.completed",
                    operation,
                    status = status.as_u16(),
                    "authority replied"
                );
                GatewayOutcome::Success(body)
            }
            Err(read_error) if read_error.is_timeout() => {
                warn!(event_name = "gateway.call.timeout", operation, "timed out reading reply");
                GatewayOutcome::Inconclusive
            }
            Err(read_error) => {
                error!(
                    event_name = "gateway.call.read_failed",
                    operation,
                    error = %read_error,
                    "could not read authority reply"
                );
                GatewayOutcome::TechnicalError
            }
        }
    }
}

#[async_trait]
impl ValidationGateway for HttpValidationGateway {
    async fn validate_workstation(&self, request: &WorkstationRequest) -> GatewayOutcome {
        self.post("validate_workstation", self.settings.validate_computer_url.as_deref(), request)
            .await
    }

    async fn deploy_software(&self, request: &DeploymentRequest) -> GatewayOutcome {
        self.post("deploy_software", self.settings.deploy_software_url.as_deref(), request).await
    }
}
