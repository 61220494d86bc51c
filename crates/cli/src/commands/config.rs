use std::env;
use std::fs;
use std::path::Path;

use deploydesk_core::config::{detect_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use serde::Serialize;
use toml::Value;

use crate::commands::{CommandResult, ErrorClass};

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

#[derive(Debug, Serialize)]
struct ConfigReport {
    command: &'static str,
    status: &'static str,
    config_file: Option<String>,
    entries: Vec<ConfigEntry>,
}

pub fn run(json_output: bool) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) if json_output => {
            return CommandResult::failure(
                "config",
                ErrorClass::ConfigValidation,
                error.to_string(),
            );
        }
        Err(error) => {
            return CommandResult {
                exit_code: 2,
                output: format!("config validation failed: {error}"),
            };
        }
    };

    let config_file_path = detect_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let sources = Sources { doc: config_file_doc.as_ref(), path: config_file_path.as_deref() };
    let entries = collect_entries(&config, &sources);

    if json_output {
        let report = ConfigReport {
            command: "config",
            status: "ok",
            config_file: config_file_path.map(|path| path.display().to_string()),
            entries,
        };
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            CommandResult::failure("config", ErrorClass::Serialization, error.to_string()).output
        });
        return CommandResult { exit_code: 0, output };
    }

    let mut lines =
        vec!["effective config (source precedence: override > env > file > default):".to_string()];
    lines.extend(entries.iter().map(render_line));
    CommandResult { exit_code: 0, output: lines.join("\n") }
}

struct Sources<'a> {
    doc: Option<&'a Value>,
    path: Option<&'a Path>,
}

fn collect_entries(config: &AppConfig, sources: &Sources<'_>) -> Vec<ConfigEntry> {
    let unset = || "<unset>".to_string();
    let static_token = match config.auth.static_token.as_ref() {
        Some(token) => redact_token(token.expose_secret()),
        None => unset(),
    };

    vec![
        entry(
            "gateway.validate_computer_url",
            config.gateway.validate_computer_url.clone().unwrap_or_else(unset),
            &["DEPLOYDESK_GATEWAY_VALIDATE_COMPUTER_URL", "VALIDATE_COMPUTER_URL"],
            sources,
        ),
        entry(
            "gateway.deploy_software_url",
            config.gateway.deploy_software_url.clone().unwrap_or_else(unset),
            &["DEPLOYDESK_GATEWAY_DEPLOY_SOFTWARE_URL", "DEPLOY_SOFTWARE_URL"],
            sources,
        ),
        entry(
            "gateway.timeout_secs",
            config.gateway.timeout_secs.to_string(),
            &["DEPLOYDESK_GATEWAY_TIMEOUT_SECS"],
            sources,
        ),
        entry(
            "gateway.success_marker",
            config.gateway.success_marker.clone(),
            &["DEPLOYDESK_GATEWAY_SUCCESS_MARKER"],
            sources,
        ),
        entry(
            "gateway.failure_marker",
            config.gateway.failure_marker.clone(),
            &["DEPLOYDESK_GATEWAY_FAILURE_MARKER"],
            sources,
        ),
        entry("auth.mode", format!("{:?}", config.auth.mode), &["DEPLOYDESK_AUTH_MODE"], sources),
        entry("auth.static_token", static_token, &["DEPLOYDESK_AUTH_STATIC_TOKEN"], sources),
        entry(
            "auth.metadata_url",
            config.auth.metadata_url.clone(),
            &["DEPLOYDESK_AUTH_METADATA_URL"],
            sources,
        ),
        entry(
            "software.approved",
            config.software.approved.join(", "),
            &["DEPLOYDESK_SOFTWARE_APPROVED"],
            sources,
        ),
        entry(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["DEPLOYDESK_SERVER_BIND_ADDRESS"],
            sources,
        ),
        entry("server.port", config.server.port.to_string(), &["DEPLOYDESK_SERVER_PORT"], sources),
        entry(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["DEPLOYDESK_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            sources,
        ),
        entry(
            "logging.level",
            config.logging.level.clone(),
            &["DEPLOYDESK_LOGGING_LEVEL", "DEPLOYDESK_LOG_LEVEL"],
            sources,
        ),
        entry(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["DEPLOYDESK_LOGGING_FORMAT", "DEPLOYDESK_LOG_FORMAT"],
            sources,
        ),
    ]
}

fn entry(
    key: &'static str,
    value: String,
    env_keys: &[&str],
    sources: &Sources<'_>,
) -> ConfigEntry {
    ConfigEntry { key, value, source: field_source(key, env_keys, sources) }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(key_path: &str, env_keys: &[&str], sources: &Sources<'_>) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = sources.doc {
        if contains_path(doc, key_path) {
            let file_path = sources
                .path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(entry: &ConfigEntry) -> String {
    format!("- {} = {} (source: {})", entry.key, entry.value, entry.source)
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
