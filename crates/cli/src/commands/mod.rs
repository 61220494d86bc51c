pub mod chat;
pub mod config;
pub mod doctor;
pub mod software;

use serde::Serialize;

/// What went wrong, as reported in `--json` failure payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Configuration failed to load or validate.
    ConfigValidation,
    /// The HTTP gateway could not be built from a valid configuration.
    GatewaySetup,
    /// The conversation itself failed (I/O or a rejected turn).
    Runtime,
    Serialization,
}

impl ErrorClass {
    /// Operator-fixable setup problems exit with 2, everything else with 1.
    pub fn exit_code(self) -> u8 {
        match self {
            Self::ConfigValidation | Self::GatewaySetup => 2,
            Self::Runtime | Self::Serialization => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a> {
    command: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<ErrorClass>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload =
            CommandOutcome { command, status: "ok", error_class: None, message: message.into() };
        Self { exit_code: 0, output: serialize_payload(&payload) }
    }

    pub fn failure(command: &str, error_class: ErrorClass, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command,
            status: "error",
            error_class: Some(error_class),
            message: message.into(),
        };
        Self { exit_code: error_class.exit_code(), output: serialize_payload(&payload) }
    }
}

fn serialize_payload(payload: &CommandOutcome<'_>) -> String {
    serde_json::to_string(payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"{}\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            escape_json(payload.command),
            escape_json(&error.to_string())
        )
    })
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
