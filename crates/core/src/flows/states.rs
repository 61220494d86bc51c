use serde::{Deserialize, Serialize};

use crate::domain::session::{Field, SessionState};
use crate::gateway::{DeploymentRequest, WorkstationRequest};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueState {
    CollectingSoftware,
    CollectingComputer,
    CollectingUsername,
    AwaitingConfirmation,
    Deploying,
    Done,
    Aborted,
}

impl DialogueState {
    pub fn collecting(field: Field) -> Self {
        match field {
            Field::Software => Self::CollectingSoftware,
            Field::Computer => Self::CollectingComputer,
            Field::Username => Self::CollectingUsername,
        }
    }

    pub fn collected_field(&self) -> Option<Field> {
        match self {
            Self::CollectingSoftware => Some(Field::Software),
            Self::CollectingComputer => Some(Field::Computer),
            Self::CollectingUsername => Some(Field::Username),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    Yes,
    No,
}

/// Structured input for one user turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    FactProvided { field: Field, value: String },
    ConfirmationProvided { answer: Confirmation },
    CorrectionRequested { field: Field },
    ListRequested,
    CancelRequested,
}

impl TurnEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FactProvided { .. } => "fact_provided",
            Self::ConfirmationProvided { .. } => "confirmation_provided",
            Self::CorrectionRequested { .. } => "correction_requested",
            Self::ListRequested => "list_requested",
            Self::CancelRequested => "cancel_requested",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Prompt,
    ApprovalNotice,
    RejectionNotice,
    ConfirmationRequest,
    DeploymentResult,
    ErrorNotice,
}

/// User-facing error classes. None of them carries internal detail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingInput,
    RejectedByAuthority,
    Inconclusive,
    TechnicalError,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    WorkstationValidation,
    Deployment,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactSummary {
    pub software: String,
    pub computer: String,
    pub username: String,
}

impl FactSummary {
    pub fn from_session(session: &SessionState) -> Self {
        let value = |field: Field| session.get(field).unwrap_or_default().to_string();
        Self {
            software: value(Field::Software),
            computer: value(Field::Computer),
            username: value(Field::Username),
        }
    }
}

/// What happened during a turn, before any wording is chosen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum Notice {
    Welcome,
    FactRecorded { field: Field, value: String },
    SoftwareApproved { software: String },
    ComputerValidated { computer: String, reply: String },
    SoftwareRejected { reply: String },
    ComputerRejected { computer: String, reply: String },
    ComputerInconclusive { computer: String },
    MissingInput { fields: Vec<Field> },
    TechnicalFailure { operation: Operation },
    CorrectionWanted,
    FieldCleared { field: Field },
    SoftwareCatalog { listing: String },
    NothingToConfirm,
    DeploymentStarted { reply: String },
    DeploymentPending,
    DeploymentRefused { reply: String },
    DeploymentFailed,
    ConversationFinished,
    Cancelled,
}

/// The question that closes a reply, derived from the state the turn ends in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "follow_up", rename_all = "snake_case")]
pub enum FollowUp {
    AskFor { field: Field },
    Confirm { summary: FactSummary },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub from: DialogueState,
    pub to: DialogueState,
    pub kind: MessageKind,
    pub notice: Notice,
    pub follow_up: Option<FollowUp>,
    pub error: Option<ErrorKind>,
}

/// The single remote call a turn is waiting on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingCall {
    Workstation(WorkstationRequest),
    Deployment(DeploymentRequest),
}

impl PendingCall {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Workstation(_) => Operation::WorkstationValidation,
            Self::Deployment(_) => Operation::Deployment,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnStep {
    Reply(TurnOutcome),
    Call(PendingCall),
}
