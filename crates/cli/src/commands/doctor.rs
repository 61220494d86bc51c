use std::time::Duration;

use deploydesk_agent::auth::token_provider_from_config;
use deploydesk_core::config::{AppConfig, AuthMode, LoadOptions};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_authority_urls(&config));
            checks.push(check_identity_token(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["authority_urls", "identity_token"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_authority_urls(config: &AppConfig) -> DoctorCheck {
    let missing: Vec<&str> = [
        ("gateway.validate_computer_url", &config.gateway.validate_computer_url),
        ("gateway.deploy_software_url", &config.gateway.deploy_software_url),
    ]
    .into_iter()
    .filter(|(_, url)| url.is_none())
    .map(|(key, _)| key)
    .collect();

    if missing.is_empty() {
        DoctorCheck {
            name: "authority_urls",
            status: CheckStatus::Pass,
            details: "both authority URLs are configured".to_string(),
        }
    } else {
        DoctorCheck {
            name: "authority_urls",
            status: CheckStatus::Fail,
            details: format!("missing: {}", missing.join(", ")),
        }
    }
}

fn check_identity_token(config: &AppConfig) -> DoctorCheck {
    match config.auth.mode {
        AuthMode::None => {
            return DoctorCheck {
                name: "identity_token",
                status: CheckStatus::Pass,
                details: "auth mode `none`: calls are sent without a bearer token".to_string(),
            };
        }
        AuthMode::Static => {
            return DoctorCheck {
                name: "identity_token",
                status: CheckStatus::Pass,
                details: "auth mode `static`: token present (validated by config contract)"
                    .to_string(),
            };
        }
        AuthMode::Metadata => {}
    }

    let Some(audience) = config.gateway.validate_computer_url.clone() else {
        return DoctorCheck {
            name: "identity_token",
            status: CheckStatus::Skipped,
            details: "no authority URL to request an audience-bound token for".to_string(),
        };
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "identity_token",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let timeout = Duration::from_secs(config.gateway.timeout_secs.min(10));
    let result = runtime.block_on(async {
        let provider = token_provider_from_config(&config.auth, timeout)?;
        provider.identity_token(&audience).await
    });

    match result {
        Ok(Some(_)) => DoctorCheck {
            name: "identity_token",
            status: CheckStatus::Pass,
            details: format!("metadata server issued a token for `{audience}`"),
        },
        Ok(None) => DoctorCheck {
            name: "identity_token",
            status: CheckStatus::Fail,
            details: "metadata server returned no token".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "identity_token",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
