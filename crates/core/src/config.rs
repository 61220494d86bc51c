use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::software::{SoftwareRegistry, DEFAULT_APPROVED_SOFTWARE};
use crate::gateway::{ResponseMarkers, DEFAULT_FAILURE_MARKER, DEFAULT_SUCCESS_MARKER};

pub const DEFAULT_METADATA_IDENTITY_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/identity";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
    pub software: SoftwareConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub validate_computer_url: Option<String>,
    pub deploy_software_url: Option<String>,
    pub timeout_secs: u64,
    pub success_marker: String,
    pub failure_marker: String,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub static_token: Option<SecretString>,
    pub metadata_url: String,
}

#[derive(Clone, Debug)]
pub struct SoftwareConfig {
    pub approved: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    Metadata,
    Static,
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub validate_computer_url: Option<String>,
    pub deploy_software_url: Option<String>,
    pub gateway_timeout_secs: Option<u64>,
    pub auth_mode: Option<AuthMode>,
    pub auth_static_token: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig {
                validate_computer_url: None,
                deploy_software_url: None,
                timeout_secs: 60,
                success_marker: DEFAULT_SUCCESS_MARKER.to_string(),
                failure_marker: DEFAULT_FAILURE_MARKER.to_string(),
            },
            auth: AuthConfig {
                mode: AuthMode::Metadata,
                static_token: None,
                metadata_url: DEFAULT_METADATA_IDENTITY_URL.to_string(),
            },
            software: SoftwareConfig {
                approved: DEFAULT_APPROVED_SOFTWARE.iter().map(|name| name.to_string()).collect(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for AuthMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "metadata" => Ok(Self::Metadata),
            "static" => Ok(Self::Static),
            "none" => Ok(Self::None),
            other => Err(ConfigError::Validation(format!(
                "unsupported auth mode `{other}` (expected metadata|static|none)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("deploydesk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn software_registry(&self) -> SoftwareRegistry {
        SoftwareRegistry::new(self.software.approved.iter().cloned())
    }

    pub fn response_markers(&self) -> ResponseMarkers {
        ResponseMarkers::new(&self.gateway.success_marker, &self.gateway.failure_marker)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(gateway) = patch.gateway {
            if let Some(url) = gateway.validate_computer_url {
                self.gateway.validate_computer_url = Some(url);
            }
            if let Some(url) = gateway.deploy_software_url {
                self.gateway.deploy_software_url = Some(url);
            }
            if let Some(timeout_secs) = gateway.timeout_secs {
                self.gateway.timeout_secs = timeout_secs;
            }
            if let Some(marker) = gateway.success_marker {
                self.gateway.success_marker = marker;
            }
            if let Some(marker) = gateway.failure_marker {
                self.gateway.failure_marker = marker;
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(mode) = auth.mode {
                self.auth.mode = mode;
            }
            if let Some(static_token_value) = auth.static_token {
                self.auth.static_token = Some(secret_value(static_token_value));
            }
            if let Some(metadata_url) = auth.metadata_url {
                self.auth.metadata_url = metadata_url;
            }
        }

        if let Some(software) = patch.software {
            if let Some(approved) = software.approved {
                self.software.approved = approved;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let validate_url = read_env("DEPLOYDESK_GATEWAY_VALIDATE_COMPUTER_URL")
            .or_else(|| read_env("VALIDATE_COMPUTER_URL"));
        if let Some(value) = validate_url {
            self.gateway.validate_computer_url = Some(value);
        }
        let deploy_url = read_env("DEPLOYDESK_GATEWAY_DEPLOY_SOFTWARE_URL")
            .or_else(|| read_env("DEPLOY_SOFTWARE_URL"));
        if let Some(value) = deploy_url {
            self.gateway.deploy_software_url = Some(value);
        }
        if let Some(value) = read_env("DEPLOYDESK_GATEWAY_TIMEOUT_SECS") {
            self.gateway.timeout_secs = parse_u64("DEPLOYDESK_GATEWAY_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("DEPLOYDESK_GATEWAY_SUCCESS_MARKER") {
            self.gateway.success_marker = value;
        }
        if let Some(value) = read_env("DEPLOYDESK_GATEWAY_FAILURE_MARKER") {
            self.gateway.failure_marker = value;
        }

        if let Some(value) = read_env("DEPLOYDESK_AUTH_MODE") {
            self.auth.mode = value.parse()?;
        }
        if let Some(value) = read_env("DEPLOYDESK_AUTH_STATIC_TOKEN") {
            self.auth.static_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("DEPLOYDESK_AUTH_METADATA_URL") {
            self.auth.metadata_url = value;
        }

        if let Some(value) = read_env("DEPLOYDESK_SOFTWARE_APPROVED") {
            self.software.approved = parse_list(&value);
        }

        if let Some(value) = read_env("DEPLOYDESK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("DEPLOYDESK_SERVER_PORT") {
            self.server.port = parse_u16("DEPLOYDESK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("DEPLOYDESK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("DEPLOYDESK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("DEPLOYDESK_LOGGING_LEVEL").or_else(|| read_env("DEPLOYDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DEPLOYDESK_LOGGING_FORMAT").or_else(|| read_env("DEPLOYDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.validate_computer_url {
            self.gateway.validate_computer_url = Some(url);
        }
        if let Some(url) = overrides.deploy_software_url {
            self.gateway.deploy_software_url = Some(url);
        }
        if let Some(timeout_secs) = overrides.gateway_timeout_secs {
            self.gateway.timeout_secs = timeout_secs;
        }
        if let Some(mode) = overrides.auth_mode {
            self.auth.mode = mode;
        }
        if let Some(static_token) = overrides.auth_static_token {
            self.auth.static_token = Some(secret_value(static_token));
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_gateway(&self.gateway)?;
        validate_auth(&self.auth)?;
        validate_software(&self.software)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("deploydesk.toml"), PathBuf::from("config/deploydesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

/// Path of the config file `load` would read, if any.
pub fn detect_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    resolve_config_path(explicit_path)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    for (key, url) in [
        ("gateway.validate_computer_url", &gateway.validate_computer_url),
        ("gateway.deploy_software_url", &gateway.deploy_software_url),
    ] {
        if let Some(url) = url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "{key} must start with http:// or https://"
                )));
            }
        }
    }

    if gateway.timeout_secs == 0 || gateway.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "gateway.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if gateway.success_marker.trim().is_empty() || gateway.failure_marker.trim().is_empty() {
        return Err(ConfigError::Validation(
            "gateway.success_marker and gateway.failure_marker must not be empty".to_string(),
        ));
    }

    if gateway.success_marker == gateway.failure_marker {
        return Err(ConfigError::Validation(
            "gateway.success_marker and gateway.failure_marker must differ".to_string(),
        ));
    }

    Ok(())
}

fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    match auth.mode {
        AuthMode::Static => {
            let missing = auth
                .static_token
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "auth.static_token is required when auth.mode is `static`".to_string(),
                ));
            }
        }
        AuthMode::Metadata => {
            let url = auth.metadata_url.trim();
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Validation(
                    "auth.metadata_url must start with http:// or https://".to_string(),
                ));
            }
        }
        AuthMode::None => {}
    }

    Ok(())
}

fn validate_software(software: &SoftwareConfig) -> Result<(), ConfigError> {
    if software.approved.iter().all(|name| name.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "software.approved must list at least one software name".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty()).map(str::to_string).collect()
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    gateway: Option<GatewayPatch>,
    auth: Option<AuthPatch>,
    software: Option<SoftwarePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    validate_computer_url: Option<String>,
    deploy_software_url: Option<String>,
    timeout_secs: Option<u64>,
    success_marker: Option<String>,
    failure_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    mode: Option<AuthMode>,
    static_token: Option<String>,
    metadata_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SoftwarePatch {
    approved: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
