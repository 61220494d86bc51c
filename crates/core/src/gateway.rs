//! Contract for the two remote authorities the dialogue depends on.
//!
//! Implementations make at most one attempt per invocation and convert every
//! transport fault into a [`GatewayOutcome`] before returning, so the dialogue
//! engine never sees raw errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::session::{Field, SessionState};

pub const DEFAULT_SUCCESS_MARKER: &str = "Success";
pub const DEFAULT_FAILURE_MARKER: &str = "Fail";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkstationRequest {
    #[serde(rename = "ComputerName")]
    pub computer_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    #[serde(rename = "SoftwareSelection")]
    pub software_name: String,
    #[serde(rename = "ComputerName")]
    pub computer_name: String,
    #[serde(rename = "UID")]
    pub username: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("missing input for remote call: {fields:?}")]
    MissingInput { fields: Vec<Field> },
}

impl WorkstationRequest {
    pub fn from_session(session: &SessionState) -> Result<Self, GatewayError> {
        let computer_name = required(session, &[Field::Computer])?;
        Ok(Self { computer_name: computer_name[0].clone() })
    }
}

impl DeploymentRequest {
    pub fn from_session(session: &SessionState) -> Result<Self, GatewayError> {
        let values = required(session, &Field::ALL)?;
        Ok(Self {
            software_name: values[0].clone(),
            computer_name: values[1].clone(),
            username: values[2].clone(),
        })
    }
}

fn required(session: &SessionState, fields: &[Field]) -> Result<Vec<String>, GatewayError> {
    let mut values = Vec::with_capacity(fields.len());
    let mut missing = Vec::new();
    for field in fields {
        match session.get(*field).map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => values.push(value.to_string()),
            None => missing.push(*field),
        }
    }

    if missing.is_empty() {
        Ok(values)
    } else {
        Err(GatewayError::MissingInput { fields: missing })
    }
}

/// Tri-state result of a remote call plus the local technical failure case.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayOutcome {
    /// Non-error reply; the body is opaque text to relay or classify.
    Success(String),
    /// Structured refusal of the submitted input.
    Rejected(String),
    /// The wait bound elapsed; the remote operation may still be running.
    Inconclusive,
    /// Transport, auth or unexpected-status failure.
    TechnicalError,
}

impl GatewayOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Rejected(_) => "rejected",
            Self::Inconclusive => "inconclusive",
            Self::TechnicalError => "technical_error",
        }
    }
}

#[async_trait]
pub trait ValidationGateway: Send + Sync {
    async fn validate_workstation(&self, request: &WorkstationRequest) -> GatewayOutcome;
    async fn deploy_software(&self, request: &DeploymentRequest) -> GatewayOutcome;
}

/// How a workstation validation reply reads once classified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkstationReading {
    Valid(String),
    Invalid(String),
    Unrecognized(String),
}

/// Classifies free-text replies from the workstation authority.
///
/// A JSON body with a string `status` field is read first. Otherwise the
/// marker substrings decide, and the failure marker takes precedence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseMarkers {
    pub success: String,
    pub failure: String,
}

impl Default for ResponseMarkers {
    fn default() -> Self {
        Self {
            success: DEFAULT_SUCCESS_MARKER.to_string(),
            failure: DEFAULT_FAILURE_MARKER.to_string(),
        }
    }
}

impl ResponseMarkers {
    pub fn new(success: impl Into<String>, failure: impl Into<String>) -> Self {
        Self { success: success.into(), failure: failure.into() }
    }

    pub fn read(&self, body: &str) -> WorkstationReading {
        if let Some(reading) = read_structured_status(body) {
            return reading;
        }

        if !self.failure.is_empty() && body.contains(&self.failure) {
            WorkstationReading::Invalid(body.to_string())
        } else if !self.success.is_empty() && body.contains(&self.success) {
            WorkstationReading::Valid(body.to_string())
        } else {
            WorkstationReading::Unrecognized(body.to_string())
        }
    }
}

fn read_structured_status(body: &str) -> Option<WorkstationReading> {
    let value = serde_json::from_str::<serde_json::Value>(body.trim()).ok()?;
    let status = value.get("status")?.as_str()?.trim().to_ascii_lowercase();
    match status.as_str() {
        "success" | "valid" | "validated" | "ok" => Some(WorkstationReading::Valid(body.to_string())),
        "fail" | "failed" | "failure" | "invalid" | "rejected" => {
            Some(WorkstationReading::Invalid(body.to_string()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DeploymentRequest, GatewayError, ResponseMarkers, WorkstationReading, WorkstationRequest,
    };
    use crate::domain::session::{Field, SessionId, SessionState};

    #[test]
    fn marker_substrings_classify_free_text() {
        let markers = ResponseMarkers::default();

        assert!(matches!(
            markers.read("Success: WKS-1001 found in SCCM"),
            WorkstationReading::Valid(_)
        ));
        assert!(matches!(markers.read("Fail: no such device"), WorkstationReading::Invalid(_)));
        assert!(matches!(markers.read("device lookup queued"), WorkstationReading::Unrecognized(_)));
    }

    #[test]
    fn failure_marker_wins_over_success_marker() {
        let markers = ResponseMarkers::default();
        assert!(matches!(
            markers.read("Success contacting SCCM. Fail: device unknown"),
            WorkstationReading::Invalid(_)
        ));
    }

    #[test]
    fn structured_status_field_takes_precedence() {
        let markers = ResponseMarkers::default();

        assert!(matches!(
            markers.read(r#"{"status":"invalid","detail":"Success marker inside"}"#),
            WorkstationReading::Invalid(_)
        ));
        assert!(matches!(
            markers.read(r#"{"status":"Validated"}"#),
            WorkstationReading::Valid(_)
        ));
    }

    #[test]
    fn reading_keeps_the_literal_body() {
        let body = "Success: computer WKS-1001 exists";
        assert_eq!(ResponseMarkers::default().read(body), WorkstationReading::Valid(body.to_string()));
    }

    #[test]
    fn custom_markers_are_honoured() {
        let markers = ResponseMarkers::new("FOUND", "MISSING");
        assert!(matches!(markers.read("FOUND"), WorkstationReading::Valid(_)));
        assert!(matches!(markers.read("Success"), WorkstationReading::Unrecognized(_)));
    }

    #[test]
    fn requests_refuse_missing_fields() {
        let mut session = SessionState::new(SessionId("S-GW".to_string()));
        assert_eq!(
            WorkstationRequest::from_session(&session),
            Err(GatewayError::MissingInput { fields: vec![Field::Computer] })
        );

        session.set(Field::Computer, "WKS-1001").expect("computer stored");
        assert_eq!(
            DeploymentRequest::from_session(&session),
            Err(GatewayError::MissingInput { fields: vec![Field::Software, Field::Username] })
        );
    }

    #[test]
    fn deployment_request_uses_wire_names() {
        let request = DeploymentRequest {
            software_name: "Zoom".to_string(),
            computer_name: "WKS-1001".to_string(),
            username: "jdoe".to_string(),
        };
        let payload = serde_json::to_value(&request).expect("serializable");

        assert_eq!(payload["SoftwareSelection"], "Zoom");
        assert_eq!(payload["ComputerName"], "WKS-1001");
        assert_eq!(payload["UID"], "jdoe");
    }
}
