use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use deploydesk_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use deploydesk_core::errors::DomainError;
use deploydesk_core::flows::{
    Conversation, DialogueEngine, Operation, PendingCall, TurnEvent, TurnOutcome, TurnStep,
};
use deploydesk_core::gateway::{GatewayOutcome, ValidationGateway};
use tracing::{info, warn};

use crate::render::{ResponseRenderer, TurnReply};

/// Abort signal shared between a session and whoever may cancel it.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives one conversation turn: engine step, at most one authority call,
/// then the resolved outcome rendered for the user.
pub struct DialogueRuntime {
    engine: DialogueEngine,
    gateway: Arc<dyn ValidationGateway>,
    audit: Arc<dyn AuditSink>,
    renderer: ResponseRenderer,
}

impl DialogueRuntime {
    pub fn new(
        engine: DialogueEngine,
        gateway: Arc<dyn ValidationGateway>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { engine, gateway, audit, renderer: ResponseRenderer::new() }
    }

    pub fn engine(&self) -> &DialogueEngine {
        &self.engine
    }

    pub fn renderer(&self) -> &ResponseRenderer {
        &self.renderer
    }

    pub fn open(&self, conversation: &Conversation) -> TurnReply {
        let outcome = self.engine.opening(conversation);
        self.renderer.reply(&conversation.session().session_id, &outcome)
    }

    pub async fn handle_turn(
        &self,
        conversation: &mut Conversation,
        event: TurnEvent,
        cancel: &CancelFlag,
        correlation_id: &str,
    ) -> Result<TurnReply, DomainError> {
        let context = AuditContext::new(
            Some(conversation.session().session_id.clone()),
            correlation_id,
            "dialogue",
        );
        // A raised flag wins over whatever the user sent afterwards.
        let event = if cancel.is_raised() { TurnEvent::CancelRequested } else { event };
        let event_name = event.name();

        let outcome = match self.engine.begin(conversation, &event)? {
            TurnStep::Reply(outcome) => outcome,
            TurnStep::Call(_) if cancel.is_raised() => self.engine.cancel_pending(conversation)?,
            TurnStep::Call(_) => {
                let call = self.engine.dispatch(conversation)?;
                if let PendingCall::Deployment(request) = &call {
                    self.audit.emit(
                        AuditEvent::new(
                            &context,
                            "deployment.dispatched",
                            AuditCategory::Deployment,
                            AuditOutcome::Success,
                        )
                        .with_metadata("software", request.software_name.as_str())
                        .with_metadata("computer", request.computer_name.as_str()),
                    );
                }
                let result = self.call_authority(&call, &context).await;
                let resolved = self.engine.resolve(conversation, result)?;
                if cancel.is_raised() && !resolved.to.is_terminal() {
                    warn!(
                        event_name = "dialogue.turn.cancelled_in_flight",
                        correlation_id,
                        session_id = %conversation.session().session_id,
                        "abort requested while the authority call was running"
                    );
                    self.engine.abort_after(conversation, resolved)
                } else {
                    resolved
                }
            }
        };

        if let TurnEvent::FactProvided { field, .. } = &event {
            self.audit.emit(
                AuditEvent::new(
                    &context,
                    "dialogue.fact_stored",
                    AuditCategory::Ingress,
                    audit_outcome(&outcome),
                )
                .with_metadata("field", field.label()),
            );
        }
        self.audit.emit(
            AuditEvent::new(&context, "dialogue.turn", AuditCategory::Dialogue, audit_outcome(&outcome))
                .with_metadata("event", event_name)
                .with_metadata("from", format!("{:?}", outcome.from))
                .with_metadata("to", format!("{:?}", outcome.to)),
        );
        info!(
            event_name = "dialogue.turn.completed",
            correlation_id,
            session_id = %conversation.session().session_id,
            turn_event = event_name,
            from = ?outcome.from,
            to = ?outcome.to,
            message_kind = ?outcome.kind,
            "turn completed"
        );

        Ok(self.renderer.reply(&conversation.session().session_id, &outcome))
    }

    async fn call_authority(&self, call: &PendingCall, context: &AuditContext) -> GatewayOutcome {
        let result = match call {
            PendingCall::Workstation(request) => self.gateway.validate_workstation(request).await,
            PendingCall::Deployment(request) => self.gateway.deploy_software(request).await,
        };

        let (event_type, category) = match call.operation() {
            Operation::WorkstationValidation => {
                ("gateway.workstation_validation", AuditCategory::Validation)
            }
            Operation::Deployment => ("gateway.deployment", AuditCategory::Deployment),
        };
        let outcome = match &result {
            GatewayOutcome::Success(_) => AuditOutcome::Success,
            GatewayOutcome::Rejected(_) => AuditOutcome::Rejected,
            GatewayOutcome::Inconclusive => AuditOutcome::Inconclusive,
            GatewayOutcome::TechnicalError => AuditOutcome::Failed,
        };
        self.audit.emit(
            AuditEvent::new(context, event_type, category, outcome)
                .with_metadata("result", result.kind()),
        );

        result
    }
}

fn audit_outcome(outcome: &TurnOutcome) -> AuditOutcome {
    use deploydesk_core::flows::ErrorKind;

    match outcome.error {
        None => AuditOutcome::Success,
        Some(ErrorKind::RejectedByAuthority) => AuditOutcome::Rejected,
        Some(ErrorKind::Inconclusive) => AuditOutcome::Inconclusive,
        Some(ErrorKind::MissingInput | ErrorKind::TechnicalError) => AuditOutcome::Failed,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use deploydesk_core::audit::InMemoryAuditSink;
    use deploydesk_core::domain::session::{DeploymentStatus, Field, SessionId};
    use deploydesk_core::flows::{
        Confirmation, Conversation, DialogueEngine, DialogueState, MessageKind, TurnEvent,
    };
    use deploydesk_core::gateway::{
        DeploymentRequest, GatewayOutcome, ValidationGateway, WorkstationRequest,
    };

    use super::{CancelFlag, DialogueRuntime};

    #[derive(Default)]
    struct ScriptedGateway {
        workstation: Mutex<VecDeque<GatewayOutcome>>,
        deployment: Mutex<VecDeque<GatewayOutcome>>,
        deployments: Mutex<Vec<DeploymentRequest>>,
        raise_on_call: Option<CancelFlag>,
    }

    impl ScriptedGateway {
        fn with(workstation: Vec<GatewayOutcome>, deployment: Vec<GatewayOutcome>) -> Self {
            Self {
                workstation: Mutex::new(workstation.into()),
                deployment: Mutex::new(deployment.into()),
                ..Self::default()
            }
        }

        fn deployments(&self) -> Vec<DeploymentRequest> {
            self.deployments.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl ValidationGateway for ScriptedGateway {
        async fn validate_workstation(&self, _request: &WorkstationRequest) -> GatewayOutcome {
            if let Some(flag) = &self.raise_on_call {
                flag.raise();
            }
            self.workstation.lock().expect("lock").pop_front().unwrap_or(GatewayOutcome::TechnicalError)
        }

        async fn deploy_software(&self, request: &DeploymentRequest) -> GatewayOutcome {
            if let Some(flag) = &self.raise_on_call {
                flag.raise();
            }
            self.deployments.lock().expect("lock").push(request.clone());
            self.deployment.lock().expect("lock").pop_front().unwrap_or(GatewayOutcome::TechnicalError)
        }
    }

    fn fact(field: Field, value: &str) -> TurnEvent {
        TurnEvent::FactProvided { field, value: value.to_string() }
    }

    fn runtime(gateway: Arc<ScriptedGateway>, audit: InMemoryAuditSink) -> DialogueRuntime {
        DialogueRuntime::new(DialogueEngine::default(), gateway, Arc::new(audit))
    }

    async fn collect_all(runtime: &DialogueRuntime, conversation: &mut Conversation, flag: &CancelFlag) {
        for event in [
            fact(Field::Software, "Zoom"),
            fact(Field::Computer, "WKS-1001"),
            fact(Field::Username, "jdoe"),
        ] {
            runtime.handle_turn(conversation, event, flag, "req-test").await.expect("turn");
        }
    }

    #[tokio::test]
    async fn happy_path_relays_the_deployment_reply() {
        let gateway = Arc::new(ScriptedGateway::with(
            vec![GatewayOutcome::Success("Success: WKS-1001 found".to_string())],
            vec![GatewayOutcome::Success("Deployment job 77 queued".to_string())],
        ));
        let audit = InMemoryAuditSink::default();
        let runtime = runtime(gateway.clone(), audit.clone());
        let mut conversation = Conversation::new(SessionId("S-RT-1".to_string()));
        let flag = CancelFlag::default();

        let opening = runtime.open(&conversation);
        assert_eq!(opening.next_state, DialogueState::CollectingSoftware);

        collect_all(&runtime, &mut conversation, &flag).await;
        assert_eq!(conversation.state(), DialogueState::AwaitingConfirmation);

        let reply = runtime
            .handle_turn(
                &mut conversation,
                TurnEvent::ConfirmationProvided { answer: Confirmation::Yes },
                &flag,
                "req-test",
            )
            .await
            .expect("deploy turn");

        assert_eq!(reply.next_state, DialogueState::Done);
        assert_eq!(reply.message_kind, MessageKind::DeploymentResult);
        assert_eq!(reply.message_text, "Deployment job 77 queued");
        assert_eq!(conversation.session().deployment_status(), DeploymentStatus::Completed);
        assert_eq!(gateway.deployments().len(), 1);
        assert_eq!(gateway.deployments()[0].username, "jdoe");
        let event_types = audit.event_types();
        assert!(event_types.contains(&"dialogue.fact_stored".to_string()));
        assert!(event_types.contains(&"deployment.dispatched".to_string()));
        assert!(event_types.contains(&"gateway.deployment".to_string()));
    }

    #[tokio::test]
    async fn raised_flag_turns_any_event_into_a_cancel() {
        let gateway = Arc::new(ScriptedGateway::with(
            vec![GatewayOutcome::Success("Success".to_string())],
            vec![GatewayOutcome::Success("queued".to_string())],
        ));
        let runtime = runtime(gateway.clone(), InMemoryAuditSink::default());
        let mut conversation = Conversation::new(SessionId("S-RT-2".to_string()));
        let flag = CancelFlag::default();
        collect_all(&runtime, &mut conversation, &flag).await;

        flag.raise();
        let reply = runtime
            .handle_turn(
                &mut conversation,
                TurnEvent::ConfirmationProvided { answer: Confirmation::Yes },
                &flag,
                "req-test",
            )
            .await
            .expect("cancel turn");

        assert_eq!(reply.next_state, DialogueState::Aborted);
        assert!(gateway.deployments().is_empty());
    }

    #[tokio::test]
    async fn cancel_during_validation_aborts_after_the_call() {
        let flag = CancelFlag::default();
        let gateway = Arc::new(ScriptedGateway {
            raise_on_call: Some(flag.clone()),
            ..ScriptedGateway::with(vec![GatewayOutcome::Success("Success".to_string())], vec![])
        });
        let runtime = runtime(gateway, InMemoryAuditSink::default());
        let mut conversation = Conversation::new(SessionId("S-RT-3".to_string()));

        runtime
            .handle_turn(&mut conversation, fact(Field::Software, "Zoom"), &flag, "req-test")
            .await
            .expect("software");
        let reply = runtime
            .handle_turn(&mut conversation, fact(Field::Computer, "WKS-1001"), &flag, "req-test")
            .await
            .expect("computer");

        assert_eq!(reply.next_state, DialogueState::Aborted);
        assert!(conversation.pending().is_none());
    }

    #[tokio::test]
    async fn cancel_during_successful_deployment_still_reports_the_result() {
        let flag = CancelFlag::default();
        let gateway = Arc::new(ScriptedGateway::with(
            vec![GatewayOutcome::Success("Success".to_string())],
            vec![GatewayOutcome::Success("Deployment job 78 queued".to_string())],
        ));
        let runtime = runtime(gateway.clone(), InMemoryAuditSink::default());
        let mut conversation = Conversation::new(SessionId("S-RT-4".to_string()));
        collect_all(&runtime, &mut conversation, &flag).await;

        let cancelling = DialogueRuntime::new(
            DialogueEngine::default(),
            Arc::new(ScriptedGateway {
                raise_on_call: Some(flag.clone()),
                ..ScriptedGateway::with(
                    vec![],
                    vec![GatewayOutcome::Success("Deployment job 78 queued".to_string())],
                )
            }),
            Arc::new(InMemoryAuditSink::default()),
        );
        let reply = cancelling
            .handle_turn(
                &mut conversation,
                TurnEvent::ConfirmationProvided { answer: Confirmation::Yes },
                &flag,
                "req-test",
            )
            .await
            .expect("deploy turn");

        assert_eq!(reply.next_state, DialogueState::Done);
        assert_eq!(reply.message_text, "Deployment job 78 queued");
    }

    #[tokio::test]
    async fn technical_failure_keeps_the_facts_for_a_retry() {
        let gateway = Arc::new(ScriptedGateway::with(
            vec![GatewayOutcome::Success("Success".to_string())],
            vec![GatewayOutcome::TechnicalError],
        ));
        let runtime = runtime(gateway.clone(), InMemoryAuditSink::default());
        let mut conversation = Conversation::new(SessionId("S-RT-5".to_string()));
        let flag = CancelFlag::default();
        collect_all(&runtime, &mut conversation, &flag).await;

        let reply = runtime
            .handle_turn(
                &mut conversation,
                TurnEvent::ConfirmationProvided { answer: Confirmation::Yes },
                &flag,
                "req-test",
            )
            .await
            .expect("deploy turn");

        assert_eq!(reply.next_state, DialogueState::AwaitingConfirmation);
        assert_eq!(reply.message_kind, MessageKind::ErrorNotice);
        assert!(reply.message_text.starts_with("A technical error occurred"));
        assert_eq!(conversation.session().get(Field::Software), Some("Zoom"));
        assert_eq!(conversation.session().deployment_status(), DeploymentStatus::FailedTechnical);
    }
}
