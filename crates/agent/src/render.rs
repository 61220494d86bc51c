//! Wording for dialogue outcomes.
//!
//! Authority replies (software rejections, deployment results) are relayed
//! verbatim. Everything else is phrased here so the engine stays free of text.

use deploydesk_core::domain::session::{Field, SessionId};
use deploydesk_core::flows::{
    DialogueState, ErrorKind, FactSummary, FollowUp, MessageKind, Notice, Operation, TurnOutcome,
};
use serde::{Deserialize, Serialize};

/// What a caller receives after each turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnReply {
    pub session_id: SessionId,
    pub next_state: DialogueState,
    pub message_kind: MessageKind,
    pub message_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

#[derive(Clone, Debug, Default)]
pub struct ResponseRenderer;

impl ResponseRenderer {
    pub fn new() -> Self {
        Self
    }

    pub fn reply(&self, session_id: &SessionId, outcome: &TurnOutcome) -> TurnReply {
        TurnReply {
            session_id: session_id.clone(),
            next_state: outcome.to,
            message_kind: outcome.kind,
            message_text: self.render(outcome),
            error: outcome.error,
        }
    }

    /// Plain prompt used when free text could not be turned into an event.
    pub fn clarification(
        &self,
        session_id: &SessionId,
        state: DialogueState,
        prompt: impl Into<String>,
    ) -> TurnReply {
        TurnReply {
            session_id: session_id.clone(),
            next_state: state,
            message_kind: MessageKind::Prompt,
            message_text: prompt.into(),
            error: None,
        }
    }

    pub fn render(&self, outcome: &TurnOutcome) -> String {
        let notice = notice_text(&outcome.notice);
        match outcome.follow_up.as_ref().map(follow_up_text) {
            Some(question) if notice.is_empty() => question,
            Some(question) => format!("{notice}\n\n{question}"),
            None => notice,
        }
    }
}

fn notice_text(notice: &Notice) -> String {
    match notice {
        Notice::Welcome => {
            "Hello! I can help you deploy approved software to a workstation.".to_string()
        }
        Notice::FactRecorded { field, value } => format!("Thanks, I've noted the {field} '{value}'."),
        Notice::SoftwareApproved { software } => {
            format!("Great! '{software}' is an approved software.")
        }
        Notice::ComputerValidated { computer, .. } => {
            format!("Perfect, the computer name '{computer}' is valid.")
        }
        Notice::SoftwareRejected { reply } => reply.clone(),
        Notice::ComputerRejected { computer, reply } => {
            // The authority's reply stands alone so it can be read back verbatim.
            format!("The computer name '{computer}' could not be validated.\n\n{reply}")
        }
        Notice::ComputerInconclusive { computer } => format!(
            "I couldn't confirm the computer name '{computer}' in time. The check may still be \
             running, so please send the computer name again in a moment."
        ),
        Notice::MissingInput { fields } => format!("I still need the {}.", field_list(fields)),
        Notice::TechnicalFailure { operation: Operation::WorkstationValidation } => {
            "A technical error occurred while validating the computer name. Please try again."
                .to_string()
        }
        Notice::TechnicalFailure { operation: Operation::Deployment } | Notice::DeploymentFailed => {
            "A technical error occurred while trying to start the deployment.".to_string()
        }
        Notice::CorrectionWanted => "No problem. Which detail should I change: the software, \
                                     the computer name or the username?"
            .to_string(),
        Notice::FieldCleared { field } => format!("Okay, let's update the {field}."),
        Notice::SoftwareCatalog { listing } => {
            format!("Here is the software I can install for you: {listing}.")
        }
        Notice::NothingToConfirm => "There is nothing to confirm yet.".to_string(),
        Notice::DeploymentStarted { reply } => reply.clone(),
        Notice::DeploymentPending => "The deployment has been started, but the connection timed \
                                      out while waiting for a final status. Please check the \
                                      system for progress."
            .to_string(),
        Notice::DeploymentRefused { reply } => reply.clone(),
        Notice::ConversationFinished => "This deployment request is complete. Start a new \
                                         conversation to request another deployment."
            .to_string(),
        Notice::Cancelled => "The deployment request has been cancelled.".to_string(),
    }
}

fn follow_up_text(follow_up: &FollowUp) -> String {
    match follow_up {
        FollowUp::AskFor { field: Field::Software } => {
            "What software would you like to install?".to_string()
        }
        FollowUp::AskFor { field: Field::Computer } => {
            "What is the computer name (hostname) of the machine you want to deploy to?"
                .to_string()
        }
        FollowUp::AskFor { field: Field::Username } => "What is your username?".to_string(),
        FollowUp::Confirm { summary } => confirmation_question(summary),
    }
}

fn confirmation_question(summary: &FactSummary) -> String {
    format!(
        "Let's double-check everything. You want to install '{}' on the computer '{}' for the \
         user '{}'. Is that correct?",
        summary.software, summary.computer, summary.username
    )
}

fn field_list(fields: &[Field]) -> String {
    let labels: Vec<&str> = fields.iter().map(|field| field.label()).collect();
    match labels.as_slice() {
        [] => "details".to_string(),
        [single] => (*single).to_string(),
        [head @ .., last] => format!("{} and {last}", head.join(", ")),
    }
}
