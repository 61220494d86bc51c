//! Conversation endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, post},
    Json, Router,
};
use deploydesk_agent::{SessionRegistry, TurnReply};
use deploydesk_core::domain::session::SessionId;
use deploydesk_core::errors::{ApplicationError, InterfaceError};
use deploydesk_core::flows::TurnEvent;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct SessionsState {
    sessions: Arc<SessionRegistry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpenedSession {
    pub session_id: SessionId,
    pub reply: TurnReply,
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClosedSession {
    pub session_id: SessionId,
    pub closed: bool,
}

pub fn router(sessions: Arc<SessionRegistry>) -> Router {
    Router::new()
        .route("/sessions", post(open_session))
        .route("/sessions/{id}", delete(close_session))
        .route("/sessions/{id}/turns", post(submit_turn))
        .route("/sessions/{id}/messages", post(submit_message))
        .route("/sessions/{id}/cancel", post(cancel_session))
        .with_state(SessionsState { sessions })
}

async fn open_session(State(state): State<SessionsState>, headers: HeaderMap) -> Response {
    let correlation_id = correlation_id(&headers);
    let reply = state.sessions.open(&correlation_id).await;
    let body = OpenedSession { session_id: reply.session_id.clone(), reply };
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn submit_turn(
    State(state): State<SessionsState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(event): Json<TurnEvent>,
) -> Response {
    let correlation_id = correlation_id(&headers);
    let result = state.sessions.submit(&SessionId(id), event, &correlation_id).await;
    respond(result, correlation_id)
}

async fn submit_message(
    State(state): State<SessionsState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<MessageBody>,
) -> Response {
    let correlation_id = correlation_id(&headers);
    let result = state.sessions.submit_text(&SessionId(id), &body.text, &correlation_id).await;
    respond(result, correlation_id)
}

async fn cancel_session(
    State(state): State<SessionsState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let correlation_id = correlation_id(&headers);
    let result = state.sessions.cancel(&SessionId(id), &correlation_id).await;
    respond(result, correlation_id)
}

async fn close_session(
    State(state): State<SessionsState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let session_id = SessionId(id);
    if state.sessions.close(&session_id).await {
        (StatusCode::OK, Json(ClosedSession { session_id, closed: true })).into_response()
    } else {
        let correlation_id = correlation_id(&headers);
        error_response(
            ApplicationError::SessionNotFound(session_id.to_string()).into_interface(correlation_id),
        )
    }
}

fn respond(result: Result<TurnReply, ApplicationError>, correlation_id: String) -> Response {
    match result {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(error) => error_response(error.into_interface(correlation_id)),
    }
}

fn error_response(error: InterfaceError) -> Response {
    let status = match &error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(
        event_name = "interface.sessions.error",
        correlation_id = %error.correlation_id(),
        status = status.as_u16(),
        error = %error,
        "session request failed"
    );

    let body = ErrorBody {
        error: error.user_message().to_string(),
        correlation_id: error.correlation_id().to_string(),
    };
    (status, Json(body)).into_response()
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("req-{}", Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
        Router,
    };
    use deploydesk_agent::TurnReply;
    use deploydesk_core::config::AppConfig;
    use deploydesk_core::flows::{DialogueState, MessageKind};
    use deploydesk_core::gateway::{
        DeploymentRequest, GatewayOutcome, ValidationGateway, WorkstationRequest,
    };
    use serde::de::DeserializeOwned;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{router, ErrorBody, OpenedSession};
    use crate::bootstrap::assemble;

    #[derive(Default)]
    struct FakeAuthority {
        deployments: Mutex<Vec<DeploymentRequest>>,
    }

    #[async_trait]
    impl ValidationGateway for FakeAuthority {
        async fn validate_workstation(&self, request: &WorkstationRequest) -> GatewayOutcome {
            if request.computer_name.starts_with("WKS-") {
                GatewayOutcome::Success(format!("Success: {} found", request.computer_name))
            } else {
                GatewayOutcome::Success(format!("Fail: {} unknown", request.computer_name))
            }
        }

        async fn deploy_software(&self, request: &DeploymentRequest) -> GatewayOutcome {
            if let Ok(mut deployments) = self.deployments.lock() {
                deployments.push(request.clone());
            }
            GatewayOutcome::Success(format!("Deployment of {} scheduled", request.software_name))
        }
    }

    fn app() -> (Router, Arc<FakeAuthority>) {
        let authority = Arc::new(FakeAuthority::default());
        let application = assemble(AppConfig::default(), authority.clone());
        (router(application.sessions), authority)
    }

    async fn call<T: DeserializeOwned>(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, T) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                request = request.header("content-type", "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };
        let response =
            app.clone().oneshot(request.body(body).expect("request")).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    async fn open(app: &Router) -> String {
        let (status, opened): (_, OpenedSession) =
            call(app, Method::POST, "/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(opened.reply.next_state, DialogueState::CollectingSoftware);
        opened.session_id.0
    }

    #[tokio::test]
    async fn structured_turns_run_a_deployment() {
        let (app, authority) = app();
        let id = open(&app).await;
        let turns = format!("/sessions/{id}/turns");

        for (field, value) in [("software", "Zoom"), ("computer", "WKS-1001"), ("username", "jdoe")]
        {
            let (status, _): (_, TurnReply) = call(
                &app,
                Method::POST,
                &turns,
                Some(json!({"type": "fact_provided", "field": field, "value": value})),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, reply): (_, TurnReply) = call(
            &app,
            Method::POST,
            &turns,
            Some(json!({"type": "confirmation_provided", "answer": "yes"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply.next_state, DialogueState::Done);
        assert_eq!(reply.message_kind, MessageKind::DeploymentResult);
        assert_eq!(reply.message_text, "Deployment of Zoom scheduled");
        assert_eq!(authority.deployments.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn free_text_messages_reach_confirmation() {
        let (app, _) = app();
        let id = open(&app).await;
        let messages = format!("/sessions/{id}/messages");

        let (_, rejected): (_, TurnReply) =
            call(&app, Method::POST, &messages, Some(json!({"text": "Photoshop"}))).await;
        assert_eq!(rejected.message_kind, MessageKind::RejectionNotice);
        assert!(rejected.message_text.starts_with("Software 'Photoshop' is not an approved software"));

        let mut last = rejected;
        for text in ["Slack", "computer name is WKS-7", "jdoe"] {
            let (_, reply): (_, TurnReply) =
                call(&app, Method::POST, &messages, Some(json!({ "text": text }))).await;
            last = reply;
        }

        assert_eq!(last.next_state, DialogueState::AwaitingConfirmation);
        assert_eq!(last.message_kind, MessageKind::ConfirmationRequest);
        assert!(last.message_text.contains("'WKS-7'"));
    }

    #[tokio::test]
    async fn cancel_aborts_and_later_turns_stay_aborted() {
        let (app, authority) = app();
        let id = open(&app).await;

        let (status, cancelled): (_, TurnReply) =
            call(&app, Method::POST, &format!("/sessions/{id}/cancel"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cancelled.next_state, DialogueState::Aborted);

        let (_, after): (_, TurnReply) = call(
            &app,
            Method::POST,
            &format!("/sessions/{id}/turns"),
            Some(json!({"type": "confirmation_provided", "answer": "yes"})),
        )
        .await;
        assert_eq!(after.next_state, DialogueState::Aborted);
        assert!(authority.deployments.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn unknown_session_is_not_found_with_a_safe_message() {
        let (app, _) = app();

        let (status, body): (_, ErrorBody) = call(
            &app,
            Method::POST,
            "/sessions/does-not-exist/turns",
            Some(json!({"type": "list_requested"})),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "That conversation does not exist or has already ended.");
        assert!(body.correlation_id.starts_with("req-"));
    }

    #[tokio::test]
    async fn delete_discards_the_session() {
        let (app, _) = app();
        let id = open(&app).await;

        let (status, _): (_, Value) =
            call(&app, Method::DELETE, &format!("/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _): (_, ErrorBody) =
            call(&app, Method::DELETE, &format!("/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
