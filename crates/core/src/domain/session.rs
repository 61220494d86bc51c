use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One of the three facts collected from the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Software,
    Computer,
    Username,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Software, Field::Computer, Field::Username];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Software => "software",
            Self::Computer => "computer name",
            Self::Username => "username",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoftwareStatus {
    #[default]
    Unset,
    PendingValidation,
    Approved,
    Rejected,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputerStatus {
    #[default]
    Unset,
    PendingValidation,
    Validated,
    Invalid,
    Inconclusive,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStatus {
    #[default]
    NotStarted,
    Confirmed,
    Started,
    Completed,
    FailedTechnical,
    TimedOutUnknown,
}

impl DeploymentStatus {
    /// Facts can no longer change once the deploy call has been dispatched.
    pub fn locks_facts(&self) -> bool {
        matches!(self, Self::Started | Self::Completed | Self::TimedOutUnknown)
    }
}

/// Result of a workstation validation as recorded against the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputerVerdict {
    Validated,
    Invalid,
    Inconclusive,
}

/// Conversation-scoped record of the collected facts and their validation status.
///
/// Statuses only ever describe the value currently stored: every write to a fact
/// resets its status and drops the confirmation gate in the same call, and
/// verdicts computed for a value that has since been replaced are discarded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: SessionId,
    software_name: Option<String>,
    computer_name: Option<String>,
    username: Option<String>,
    software_status: SoftwareStatus,
    computer_status: ComputerStatus,
    deployment_status: DeploymentStatus,
    confirmed: bool,
    pub created_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            software_name: None,
            computer_name: None,
            username: None,
            software_status: SoftwareStatus::Unset,
            computer_status: ComputerStatus::Unset,
            deployment_status: DeploymentStatus::NotStarted,
            confirmed: false,
            created_at: Utc::now(),
        }
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::Software => self.software_name.as_deref(),
            Field::Computer => self.computer_name.as_deref(),
            Field::Username => self.username.as_deref(),
        }
    }

    pub fn software_status(&self) -> SoftwareStatus {
        self.software_status
    }

    pub fn computer_status(&self) -> ComputerStatus {
        self.computer_status
    }

    pub fn deployment_status(&self) -> DeploymentStatus {
        self.deployment_status
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// Stores a fact, resetting its status to `PendingValidation` and clearing the
    /// confirmation gate as one effect.
    pub fn set(&mut self, field: Field, value: impl Into<String>) -> Result<(), DomainError> {
        if self.deployment_status.locks_facts() {
            return Err(DomainError::FactsLocked { field });
        }

        let value = value.into().trim().to_string();
        if value.is_empty() {
            return Err(DomainError::InvariantViolation(format!("{field} must not be blank")));
        }

        match field {
            Field::Software => {
                self.software_name = Some(value);
                self.software_status = SoftwareStatus::PendingValidation;
            }
            Field::Computer => {
                self.computer_name = Some(value);
                self.computer_status = ComputerStatus::PendingValidation;
            }
            Field::Username => {
                self.username = Some(value);
            }
        }
        self.clear_confirmation();
        Ok(())
    }

    /// Drops a fact entirely so it is collected again.
    pub fn clear(&mut self, field: Field) -> Result<(), DomainError> {
        if self.deployment_status.locks_facts() {
            return Err(DomainError::FactsLocked { field });
        }

        match field {
            Field::Software => {
                self.software_name = None;
                self.software_status = SoftwareStatus::Unset;
            }
            Field::Computer => {
                self.computer_name = None;
                self.computer_status = ComputerStatus::Unset;
            }
            Field::Username => self.username = None,
        }
        self.clear_confirmation();
        Ok(())
    }

    /// Records the registry verdict for `checked`. Returns `false` and leaves the
    /// status untouched when `checked` is no longer the stored value.
    pub fn record_software_verdict(&mut self, checked: &str, approved: bool) -> bool {
        if self.software_name.as_deref() != Some(checked) {
            return false;
        }
        self.software_status =
            if approved { SoftwareStatus::Approved } else { SoftwareStatus::Rejected };
        true
    }

    /// Records a workstation verdict for `checked`, with the same staleness rule as
    /// [`SessionState::record_software_verdict`].
    pub fn record_computer_verdict(&mut self, checked: &str, verdict: ComputerVerdict) -> bool {
        if self.computer_name.as_deref() != Some(checked) {
            return false;
        }
        self.computer_status = match verdict {
            ComputerVerdict::Validated => ComputerStatus::Validated,
            ComputerVerdict::Invalid => ComputerStatus::Invalid,
            ComputerVerdict::Inconclusive => ComputerStatus::Inconclusive,
        };
        true
    }

    pub fn field_satisfied(&self, field: Field) -> bool {
        match field {
            Field::Software => self.software_status == SoftwareStatus::Approved,
            Field::Computer => self.computer_status == ComputerStatus::Validated,
            Field::Username => self.username.as_deref().is_some_and(|name| !name.is_empty()),
        }
    }

    /// First field, in collection order, whose requirement is not yet met.
    pub fn first_unsatisfied(&self) -> Option<Field> {
        Field::ALL.into_iter().find(|field| !self.field_satisfied(*field))
    }

    /// All stored facts hold the statuses a deployment needs.
    pub fn requirements_met(&self) -> bool {
        self.first_unsatisfied().is_none()
    }

    /// Sets the one-shot confirmation gate. Only possible when every requirement
    /// holds and nothing has been dispatched yet.
    pub fn confirm(&mut self) -> Result<(), DomainError> {
        if let Some(field) = self.first_unsatisfied() {
            return Err(DomainError::RequirementUnmet { field });
        }
        if self.deployment_status.locks_facts() {
            return Err(DomainError::InvariantViolation(
                "deployment has already been dispatched".to_string(),
            ));
        }
        self.confirmed = true;
        self.deployment_status = DeploymentStatus::Confirmed;
        Ok(())
    }

    /// Consumes the confirmation gate and marks the deployment started.
    pub fn start_deployment(&mut self) -> Result<(), DomainError> {
        if !self.confirmed {
            return Err(DomainError::InvariantViolation(
                "deployment requires explicit confirmation".to_string(),
            ));
        }
        if let Some(field) = self.first_unsatisfied() {
            self.clear_confirmation();
            return Err(DomainError::RequirementUnmet { field });
        }
        self.confirmed = false;
        self.deployment_status = DeploymentStatus::Started;
        Ok(())
    }

    /// Records how a dispatched deployment ended. A technical failure unlocks
    /// the facts again so the user may retry.
    pub fn finish_deployment(&mut self, status: DeploymentStatus) -> Result<(), DomainError> {
        if self.deployment_status != DeploymentStatus::Started {
            return Err(DomainError::InvariantViolation(format!(
                "cannot finish a deployment in status {:?}",
                self.deployment_status
            )));
        }
        match status {
            DeploymentStatus::Completed
            | DeploymentStatus::FailedTechnical
            | DeploymentStatus::TimedOutUnknown => {
                self.deployment_status = status;
                Ok(())
            }
            other => Err(DomainError::InvariantViolation(format!(
                "{other:?} is not a terminal deployment status"
            ))),
        }
    }

    /// Drops the gate. A deployment that was only confirmed falls back to
    /// `NotStarted`.
    pub fn clear_confirmation(&mut self) {
        self.confirmed = false;
        if matches!(
            self.deployment_status,
            DeploymentStatus::Confirmed | DeploymentStatus::FailedTechnical
        ) {
            self.deployment_status = DeploymentStatus::NotStarted;
        }
    }
}
