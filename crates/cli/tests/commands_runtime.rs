use std::env;
use std::io::Cursor;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use deploydesk_cli::commands::{chat, config, doctor, software};
use deploydesk_core::config::AppConfig;
use deploydesk_core::flows::DialogueState;
use deploydesk_core::gateway::{
    DeploymentRequest, GatewayOutcome, ValidationGateway, WorkstationRequest,
};
use serde_json::Value;

#[test]
fn config_json_attributes_sources_and_redacts_tokens() {
    with_env(
        &[
            ("DEPLOYDESK_GATEWAY_TIMEOUT_SECS", "45"),
            ("VALIDATE_COMPUTER_URL", "https://validate.example.run.app"),
            ("DEPLOYDESK_AUTH_MODE", "static"),
            ("DEPLOYDESK_AUTH_STATIC_TOKEN", "dd-very-secret-value"),
        ],
        || {
            let result = config::run(true);
            assert_eq!(result.exit_code, 0, "expected config to load");
            assert!(!result.output.contains("very-secret-value"), "token must be redacted");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "config");
            assert_eq!(payload["status"], "ok");

            let timeout = entry(&payload, "gateway.timeout_secs");
            assert_eq!(timeout["value"], "45");
            assert_eq!(timeout["source"], "env (DEPLOYDESK_GATEWAY_TIMEOUT_SECS)");

            let validate = entry(&payload, "gateway.validate_computer_url");
            assert_eq!(validate["value"], "https://validate.example.run.app");
            assert_eq!(validate["source"], "env (VALIDATE_COMPUTER_URL)");

            assert_eq!(entry(&payload, "auth.static_token")["value"], "dd-***");
            assert_eq!(entry(&payload, "logging.level")["source"], "default");
        },
    );
}

#[test]
fn config_json_returns_failure_payload_for_invalid_env() {
    with_env(&[("DEPLOYDESK_GATEWAY_TIMEOUT_SECS", "sixty")], || {
        let result = config::run(true);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "config");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn config_human_output_lists_every_key() {
    with_env(&[], || {
        let result = config::run(false);
        assert_eq!(result.exit_code, 0);
        assert!(result.output.starts_with("effective config"));
        assert!(result.output.contains("- gateway.deploy_software_url = <unset> (source: default)"));
        assert!(result.output.contains("- gateway.timeout_secs = 60 (source: default)"));
    });
}

#[test]
fn software_lists_the_configured_catalog_in_order() {
    with_env(&[("DEPLOYDESK_SOFTWARE_APPROVED", "Zoom, Slack ,Notepad++")], || {
        let result = software::run(true);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "software");
        assert_eq!(payload["approved"], serde_json::json!(["Zoom", "Slack", "Notepad++"]));
    });
}

#[test]
fn software_human_output_counts_entries() {
    with_env(&[("DEPLOYDESK_SOFTWARE_APPROVED", "Zoom,Slack")], || {
        let result = software::run(false);
        assert_eq!(result.output, "approved software (2):\n- Zoom\n- Slack");
    });
}

#[test]
fn doctor_flags_missing_authority_urls() {
    with_env(&[("DEPLOYDESK_AUTH_MODE", "none")], || {
        let payload = parse_payload(&doctor::run(true));
        assert_eq!(payload["overall_status"], "fail");

        let checks = payload["checks"].as_array().expect("checks array");
        let urls = checks
            .iter()
            .find(|check| check["name"] == "authority_urls")
            .expect("authority_urls check");
        assert_eq!(urls["status"], "fail");
        assert!(urls["details"].as_str().unwrap_or_default().contains("gateway.deploy_software_url"));
    });
}

#[test]
fn doctor_passes_with_urls_and_no_auth() {
    with_env(
        &[
            ("DEPLOYDESK_AUTH_MODE", "none"),
            ("VALIDATE_COMPUTER_URL", "https://validate.example.run.app"),
            ("DEPLOY_SOFTWARE_URL", "https://deploy.example.run.app"),
        ],
        || {
            let output = doctor::run(false);
            assert!(output.starts_with("doctor: all readiness checks passed"), "{output}");
        },
    );
}

#[test]
fn chat_runs_a_full_conversation_over_text() {
    let authority = Arc::new(FakeAuthority::default());
    let input = Cursor::new("Slack\nWKS-1001\njdoe\nyes\nignored after done\n");
    let mut output = Vec::new();

    let state =
        chat::converse(&AppConfig::default(), authority.clone(), input, &mut output).expect("chat");

    assert_eq!(state, DialogueState::Done);
    let transcript = String::from_utf8(output).expect("utf8 transcript");
    assert!(transcript.contains("Is that correct?"));
    assert!(transcript.trim_end().ends_with("Deployment of Slack to WKS-1001 scheduled"));
    assert_eq!(authority.deployments.lock().expect("lock").len(), 1);
}

#[test]
fn chat_stops_when_input_runs_out() {
    let authority = Arc::new(FakeAuthority::default());
    let input = Cursor::new("Zoom\n");
    let mut output = Vec::new();

    let state = chat::converse(&AppConfig::default(), authority.clone(), input, &mut output)
        .expect("chat");

    assert_eq!(state, DialogueState::CollectingComputer);
    assert!(authority.deployments.lock().expect("lock").is_empty());
}

#[test]
fn chat_cancel_never_deploys() {
    let authority = Arc::new(FakeAuthority::default());
    let input = Cursor::new("Zoom\nWKS-1001\njdoe\ncancel\nyes\n");
    let mut output = Vec::new();

    let state = chat::converse(&AppConfig::default(), authority.clone(), input, &mut output)
        .expect("chat");

    assert_eq!(state, DialogueState::Aborted);
    assert!(authority.deployments.lock().expect("lock").is_empty());
}

#[derive(Default)]
struct FakeAuthority {
    deployments: Mutex<Vec<DeploymentRequest>>,
}

#[async_trait]
impl ValidationGateway for FakeAuthority {
    async fn validate_workstation(&self, request: &WorkstationRequest) -> GatewayOutcome {
        GatewayOutcome::Success(format!("Success: {} found", request.computer_name))
    }

    async fn deploy_software(&self, request: &DeploymentRequest) -> GatewayOutcome {
        self.deployments.lock().expect("lock").push(request.clone());
        GatewayOutcome::Success(format!(
            "Deployment of {} to {} scheduled",
            request.software_name, request.computer_name
        ))
    }
}

fn entry<'a>(payload: &'a Value, key: &str) -> &'a Value {
    payload["entries"]
        .as_array()
        .and_then(|entries| entries.iter().find(|entry| entry["key"] == key))
        .unwrap_or_else(|| panic!("missing config entry {key}"))
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "DEPLOYDESK_GATEWAY_VALIDATE_COMPUTER_URL",
        "DEPLOYDESK_GATEWAY_DEPLOY_SOFTWARE_URL",
        "DEPLOYDESK_GATEWAY_TIMEOUT_SECS",
        "DEPLOYDESK_GATEWAY_SUCCESS_MARKER",
        "DEPLOYDESK_GATEWAY_FAILURE_MARKER",
        "DEPLOYDESK_AUTH_MODE",
        "DEPLOYDESK_AUTH_STATIC_TOKEN",
        "DEPLOYDESK_AUTH_METADATA_URL",
        "DEPLOYDESK_SOFTWARE_APPROVED",
        "DEPLOYDESK_SERVER_BIND_ADDRESS",
        "DEPLOYDESK_SERVER_PORT",
        "DEPLOYDESK_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "DEPLOYDESK_LOGGING_LEVEL",
        "DEPLOYDESK_LOGGING_FORMAT",
        "DEPLOYDESK_LOG_LEVEL",
        "DEPLOYDESK_LOG_FORMAT",
        "VALIDATE_COMPUTER_URL",
        "DEPLOY_SOFTWARE_URL",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(test_fn));

    for (key, value) in previous_values {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }

    if let Err(panic) = outcome {
        std::panic::resume_unwind(panic);
    }
}
