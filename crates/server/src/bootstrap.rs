use std::sync::Arc;

use deploydesk_agent::http::{GatewayBuildError, HttpValidationGateway};
use deploydesk_agent::{DialogueRuntime, SessionRegistry, TracingAuditSink};
use deploydesk_core::config::{AppConfig, ConfigError, LoadOptions};
use deploydesk_core::flows::DialogueEngine;
use deploydesk_core::gateway::ValidationGateway;
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub sessions: Arc<SessionRegistry>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("validation gateway setup failed: {0}")]
    Gateway(#[from] GatewayBuildError),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        auth_mode = ?config.auth.mode,
        timeout_secs = config.gateway.timeout_secs,
        "starting application bootstrap"
    );
    if config.gateway.validate_computer_url.is_none() || config.gateway.deploy_software_url.is_none()
    {
        warn!(
            event_name = "system.bootstrap.gateway_incomplete",
            correlation_id = "bootstrap",
            validate_configured = config.gateway.validate_computer_url.is_some(),
            deploy_configured = config.gateway.deploy_software_url.is_some(),
            "authority URLs are missing; affected calls will fail as technical errors"
        );
    }

    let gateway = HttpValidationGateway::from_config(&config)?;
    Ok(assemble(config, Arc::new(gateway)))
}

/// Wires the engine, runtime and session registry around a gateway.
pub fn assemble(config: AppConfig, gateway: Arc<dyn ValidationGateway>) -> Application {
    let engine = DialogueEngine::new(config.software_registry(), config.response_markers());
    let runtime = DialogueRuntime::new(engine, gateway, Arc::new(TracingAuditSink));
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        approved_software = config.software.approved.len(),
        "dialogue runtime assembled"
    );

    Application { config, sessions: Arc::new(SessionRegistry::new(Arc::new(runtime))) }
}
