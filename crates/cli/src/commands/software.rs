use deploydesk_core::config::{AppConfig, LoadOptions};
use serde::Serialize;

use crate::commands::{CommandResult, ErrorClass};

#[derive(Debug, Serialize)]
struct SoftwareReport {
    command: &'static str,
    status: &'static str,
    approved: Vec<String>,
}

/// Prints the approved catalog in the order the dialogue lists it.
pub fn run(json_output: bool) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "software",
                ErrorClass::ConfigValidation,
                error.to_string(),
            );
        }
    };
    let registry = config.software_registry();

    if json_output {
        let report = SoftwareReport {
            command: "software",
            status: "ok",
            approved: registry.list_approved().to_vec(),
        };
        return match serde_json::to_string(&report) {
            Ok(output) => CommandResult { exit_code: 0, output },
            Err(error) => {
                CommandResult::failure("software", ErrorClass::Serialization, error.to_string())
            }
        };
    }

    let mut lines = vec![format!("approved software ({}):", registry.list_approved().len())];
    lines.extend(registry.list_approved().iter().map(|name| format!("- {name}")));
    CommandResult { exit_code: 0, output: lines.join("\n") }
}
