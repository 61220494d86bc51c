use thiserror::Error;

use crate::domain::session::{
    ComputerVerdict, DeploymentStatus, Field, SessionId, SessionState,
};
use crate::domain::software::{SoftwareRegistry, SoftwareVerdict};
use crate::errors::DomainError;
use crate::flows::states::{
    Confirmation, DialogueState, ErrorKind, FactSummary, FollowUp, MessageKind, Notice,
    Operation, PendingCall, TurnEvent, TurnOutcome, TurnStep,
};
use crate::gateway::{
    DeploymentRequest, GatewayError, GatewayOutcome, ResponseMarkers, WorkstationReading,
    WorkstationRequest,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("a remote call is still pending for this turn")]
    TurnInFlight,
    #[error("no remote call is pending")]
    NothingPending,
    #[error("the pending call was already dispatched")]
    AlreadyDispatched,
    #[error("invalid transition from {state:?} using event {event}")]
    InvalidTransition { state: DialogueState, event: &'static str },
}

/// One conversation: the session record, the dialogue position, and the call
/// the current turn is waiting on, if any.
#[derive(Clone, Debug)]
pub struct Conversation {
    session: SessionState,
    state: DialogueState,
    pending: Option<PendingCall>,
    dispatched: bool,
}

impl Conversation {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session: SessionState::new(session_id),
            state: DialogueState::CollectingSoftware,
            pending: None,
            dispatched: false,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn state(&self) -> DialogueState {
        self.state
    }

    pub fn pending(&self) -> Option<&PendingCall> {
        self.pending.as_ref()
    }
}

/// Transition rules for the deployment dialogue.
///
/// A turn is `begin`; if that yields [`TurnStep::Call`] the caller must
/// `dispatch`, perform exactly that call, and hand its outcome to `resolve`
/// (or `cancel_pending` instead of dispatching). Storing a fact and asking for
/// its validation happen inside the same `begin`, and no other turn can start
/// until the call is resolved.
#[derive(Clone, Debug, Default)]
pub struct DialogueEngine {
    registry: SoftwareRegistry,
    markers: ResponseMarkers,
}

impl DialogueEngine {
    pub fn new(registry: SoftwareRegistry, markers: ResponseMarkers) -> Self {
        Self { registry, markers }
    }

    pub fn registry(&self) -> &SoftwareRegistry {
        &self.registry
    }

    pub fn opening(&self, conversation: &Conversation) -> TurnOutcome {
        let state = conversation.state;
        outcome(state, state, Notice::Welcome, follow_up_for(state, &conversation.session), None)
    }

    pub fn begin(
        &self,
        conversation: &mut Conversation,
        event: &TurnEvent,
    ) -> Result<TurnStep, DomainError> {
        if conversation.pending.is_some() {
            return Err(FlowTransitionError::TurnInFlight.into());
        }

        let from = conversation.state;
        match from {
            DialogueState::Aborted => {
                return Ok(TurnStep::Reply(outcome(from, from, Notice::Cancelled, None, None)));
            }
            DialogueState::Done => {
                return Ok(TurnStep::Reply(outcome(
                    from,
                    from,
                    Notice::ConversationFinished,
                    None,
                    None,
                )));
            }
            DialogueState::Deploying => {
                return Err(FlowTransitionError::InvalidTransition {
                    state: from,
                    event: event.name(),
                }
                .into());
            }
            _ => {}
        }

        match event {
            TurnEvent::CancelRequested => {
                conversation.session.clear_confirmation();
                conversation.state = DialogueState::Aborted;
                Ok(TurnStep::Reply(outcome(from, DialogueState::Aborted, Notice::Cancelled, None, None)))
            }
            TurnEvent::ListRequested => Ok(TurnStep::Reply(outcome(
                from,
                from,
                Notice::SoftwareCatalog { listing: self.registry.listing() },
                follow_up_for(from, &conversation.session),
                None,
            ))),
            TurnEvent::FactProvided { field, value } => {
                self.store_fact(conversation, *field, value)
            }
            TurnEvent::ConfirmationProvided { answer } => self.confirmation(conversation, *answer),
            TurnEvent::CorrectionRequested { field } => {
                conversation.session.clear(*field)?;
                let to = next_state(&conversation.session);
                conversation.state = to;
                Ok(TurnStep::Reply(outcome(
                    from,
                    to,
                    Notice::FieldCleared { field: *field },
                    follow_up_for(to, &conversation.session),
                    None,
                )))
            }
        }
    }

    /// Marks the pending call as being sent. For a deployment this consumes
    /// the confirmation gate and moves the session to `Started`.
    pub fn dispatch(&self, conversation: &mut Conversation) -> Result<PendingCall, DomainError> {
        let pending = conversation.pending.clone().ok_or(FlowTransitionError::NothingPending)?;
        if conversation.dispatched {
            return Err(FlowTransitionError::AlreadyDispatched.into());
        }

        if let PendingCall::Deployment(_) = pending {
            if let Err(error) = conversation.session.start_deployment() {
                conversation.pending = None;
                conversation.state = next_state(&conversation.session);
                return Err(error);
            }
            conversation.state = DialogueState::Deploying;
        }
        conversation.dispatched = true;
        Ok(pending)
    }

    /// Drops a call that was never dispatched and aborts the conversation.
    pub fn cancel_pending(
        &self,
        conversation: &mut Conversation,
    ) -> Result<TurnOutcome, DomainError> {
        if conversation.pending.is_none() {
            return Err(FlowTransitionError::NothingPending.into());
        }
        if conversation.dispatched {
            return Err(FlowTransitionError::AlreadyDispatched.into());
        }

        let from = conversation.state;
        conversation.pending = None;
        conversation.session.clear_confirmation();
        conversation.state = DialogueState::Aborted;
        Ok(outcome(from, DialogueState::Aborted, Notice::Cancelled, None, None))
    }

    pub fn resolve(
        &self,
        conversation: &mut Conversation,
        result: GatewayOutcome,
    ) -> Result<TurnOutcome, DomainError> {
        if !conversation.dispatched {
            return Err(FlowTransitionError::NothingPending.into());
        }
        let pending = conversation.pending.take().ok_or(FlowTransitionError::NothingPending)?;
        conversation.dispatched = false;

        match pending {
            PendingCall::Workstation(request) => {
                Ok(self.resolve_workstation(conversation, &request, result))
            }
            PendingCall::Deployment(_) => self.resolve_deployment(conversation, result),
        }
    }

    /// Closes the conversation after a turn that was cancelled mid-call. The
    /// resolved notice is kept so a deployment result is still reported.
    pub fn abort_after(&self, conversation: &mut Conversation, resolved: TurnOutcome) -> TurnOutcome {
        conversation.session.clear_confirmation();
        conversation.state = DialogueState::Aborted;
        TurnOutcome { to: DialogueState::Aborted, follow_up: None, ..resolved }
    }

    fn store_fact(
        &self,
        conversation: &mut Conversation,
        field: Field,
        value: &str,
    ) -> Result<TurnStep, DomainError> {
        let from = conversation.state;
        let value = value.trim();
        if value.is_empty() {
            return Ok(TurnStep::Reply(outcome(
                from,
                from,
                Notice::MissingInput { fields: vec![field] },
                follow_up_for(from, &conversation.session),
                Some(ErrorKind::MissingInput),
            )));
        }

        conversation.session.set(field, value)?;

        match field {
            Field::Software => {
                let (notice, error) = match self.registry.verify(value) {
                    SoftwareVerdict::Approved { canonical, .. } => {
                        conversation.session.record_software_verdict(value, true);
                        (Notice::SoftwareApproved { software: canonical }, None)
                    }
                    SoftwareVerdict::Rejected { message } => {
                        conversation.session.record_software_verdict(value, false);
                        (
                            Notice::SoftwareRejected { reply: message },
                            Some(ErrorKind::RejectedByAuthority),
                        )
                    }
                };
                let to = next_state(&conversation.session);
                conversation.state = to;
                let follow_up = match error {
                    None => follow_up_for(to, &conversation.session),
                    Some(_) => None,
                };
                Ok(TurnStep::Reply(outcome(from, to, notice, follow_up, error)))
            }
            Field::Computer => match WorkstationRequest::from_session(&conversation.session) {
                Ok(request) => {
                    conversation.pending = Some(PendingCall::Workstation(request.clone()));
                    conversation.dispatched = false;
                    Ok(TurnStep::Call(PendingCall::Workstation(request)))
                }
                Err(GatewayError::MissingInput { fields }) => {
                    Ok(TurnStep::Reply(missing_input(conversation, from, fields)))
                }
            },
            Field::Username => {
                let to = next_state(&conversation.session);
                conversation.state = to;
                Ok(TurnStep::Reply(outcome(
                    from,
                    to,
                    Notice::FactRecorded { field, value: value.to_string() },
                    follow_up_for(to, &conversation.session),
                    None,
                )))
            }
        }
    }

    fn confirmation(
        &self,
        conversation: &mut Conversation,
        answer: Confirmation,
    ) -> Result<TurnStep, DomainError> {
        let from = conversation.state;
        if from != DialogueState::AwaitingConfirmation {
            return Ok(TurnStep::Reply(outcome(
                from,
                from,
                Notice::NothingToConfirm,
                follow_up_for(from, &conversation.session),
                None,
            )));
        }

        match answer {
            Confirmation::No => {
                conversation.session.clear_confirmation();
                Ok(TurnStep::Reply(outcome(from, from, Notice::CorrectionWanted, None, None)))
            }
            Confirmation::Yes => {
                if let Err(DomainError::RequirementUnmet { field }) =
                    conversation.session.confirm()
                {
                    let to = DialogueState::collecting(field);
                    conversation.state = to;
                    return Ok(TurnStep::Reply(outcome(
                        from,
                        to,
                        Notice::MissingInput { fields: vec![field] },
                        follow_up_for(to, &conversation.session),
                        Some(ErrorKind::MissingInput),
                    )));
                }

                match DeploymentRequest::from_session(&conversation.session) {
                    Ok(request) => {
                        conversation.pending = Some(PendingCall::Deployment(request.clone()));
                        conversation.dispatched = false;
                        Ok(TurnStep::Call(PendingCall::Deployment(request)))
                    }
                    Err(GatewayError::MissingInput { fields }) => {
                        conversation.session.clear_confirmation();
                        Ok(TurnStep::Reply(missing_input(conversation, from, fields)))
                    }
                }
            }
        }
    }

    fn resolve_workstation(
        &self,
        conversation: &mut Conversation,
        request: &WorkstationRequest,
        result: GatewayOutcome,
    ) -> TurnOutcome {
        let from = conversation.state;
        let computer = request.computer_name.clone();
        let reading = match result {
            GatewayOutcome::Success(body) => Some(self.markers.read(&body)),
            GatewayOutcome::Rejected(body) => Some(WorkstationReading::Invalid(body)),
            GatewayOutcome::Inconclusive => None,
            GatewayOutcome::TechnicalError => {
                let to = next_state(&conversation.session);
                conversation.state = to;
                return outcome(
                    from,
                    to,
                    Notice::TechnicalFailure { operation: Operation::WorkstationValidation },
                    None,
                    Some(ErrorKind::TechnicalError),
                );
            }
        };

        let (verdict, notice, error) = match reading {
            Some(WorkstationReading::Valid(reply)) => (
                ComputerVerdict::Validated,
                Notice::ComputerValidated { computer: computer.clone(), reply },
                None,
            ),
            Some(WorkstationReading::Invalid(reply)) => (
                ComputerVerdict::Invalid,
                Notice::ComputerRejected { computer: computer.clone(), reply },
                Some(ErrorKind::RejectedByAuthority),
            ),
            Some(WorkstationReading::Unrecognized(_)) | None => (
                ComputerVerdict::Inconclusive,
                Notice::ComputerInconclusive { computer: computer.clone() },
                Some(ErrorKind::Inconclusive),
            ),
        };
        conversation.session.record_computer_verdict(&computer, verdict);

        let to = next_state(&conversation.session);
        conversation.state = to;
        let follow_up = match error {
            None => follow_up_for(to, &conversation.session),
            Some(ErrorKind::RejectedByAuthority) => Some(FollowUp::AskFor { field: Field::Computer }),
            Some(_) => None,
        };
        outcome(from, to, notice, follow_up, error)
    }

    fn resolve_deployment(
        &self,
        conversation: &mut Conversation,
        result: GatewayOutcome,
    ) -> Result<TurnOutcome, DomainError> {
        let from = conversation.state;
        let (status, to, notice, error) = match result {
            GatewayOutcome::Success(reply) => (
                DeploymentStatus::Completed,
                DialogueState::Done,
                Notice::DeploymentStarted { reply },
                None,
            ),
            GatewayOutcome::Inconclusive => (
                DeploymentStatus::TimedOutUnknown,
                DialogueState::Done,
                Notice::DeploymentPending,
                Some(ErrorKind::Inconclusive),
            ),
            GatewayOutcome::Rejected(reply) => (
                DeploymentStatus::FailedTechnical,
                DialogueState::AwaitingConfirmation,
                Notice::DeploymentRefused { reply },
                Some(ErrorKind::RejectedByAuthority),
            ),
            GatewayOutcome::TechnicalError => (
                DeploymentStatus::FailedTechnical,
                DialogueState::AwaitingConfirmation,
                Notice::DeploymentFailed,
                Some(ErrorKind::TechnicalError),
            ),
        };

        conversation.session.finish_deployment(status)?;
        conversation.state = to;
        let follow_up = follow_up_for(to, &conversation.session);
        Ok(outcome(from, to, notice, follow_up, error))
    }
}

fn missing_input(
    conversation: &mut Conversation,
    from: DialogueState,
    fields: Vec<Field>,
) -> TurnOutcome {
    let to = match fields.first() {
        Some(field) => DialogueState::collecting(*field),
        None => from,
    };
    conversation.state = to;
    outcome(
        from,
        to,
        Notice::MissingInput { fields },
        follow_up_for(to, &conversation.session),
        Some(ErrorKind::MissingInput),
    )
}

/// Collection order is a scaffold: the dialogue sits on the first field whose
/// requirement is unmet, whatever order the facts arrived in.
pub fn next_state(session: &SessionState) -> DialogueState {
    match session.first_unsatisfied() {
        Some(field) => DialogueState::collecting(field),
        None => DialogueState::AwaitingConfirmation,
    }
}

fn follow_up_for(state: DialogueState, session: &SessionState) -> Option<FollowUp> {
    match state {
        DialogueState::AwaitingConfirmation => {
            Some(FollowUp::Confirm { summary: FactSummary::from_session(session) })
        }
        other => other.collected_field().map(|field| FollowUp::AskFor { field }),
    }
}

fn outcome(
    from: DialogueState,
    to: DialogueState,
    notice: Notice,
    follow_up: Option<FollowUp>,
    error: Option<ErrorKind>,
) -> TurnOutcome {
    let kind = message_kind(&notice, follow_up.as_ref());
    TurnOutcome { from, to, kind, notice, follow_up, error }
}

fn message_kind(notice: &Notice, follow_up: Option<&FollowUp>) -> MessageKind {
    let confirming = matches!(follow_up, Some(FollowUp::Confirm { .. }));
    match notice {
        Notice::SoftwareRejected { .. }
        | Notice::ComputerRejected { .. }
        | Notice::DeploymentRefused { .. } => MessageKind::RejectionNotice,
        Notice::ComputerInconclusive { .. }
        | Notice::TechnicalFailure { .. }
        | Notice::DeploymentFailed => MessageKind::ErrorNotice,
        Notice::DeploymentStarted { .. } | Notice::DeploymentPending => {
            MessageKind::DeploymentResult
        }
        _ if confirming => MessageKind::ConfirmationRequest,
        Notice::SoftwareApproved { .. } | Notice::ComputerValidated { .. } => {
            MessageKind::ApprovalNotice
        }
        _ => MessageKind::Prompt,
    }
}
