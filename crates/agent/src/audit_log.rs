use deploydesk_core::audit::{AuditEvent, AuditOutcome, AuditSink};
use tracing::{info, warn};

/// Writes audit events to the structured log.
#[derive(Clone, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let session_id = event.session_id.as_ref().map(|id| id.0.as_str()).unwrap_or("none");
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();

        match event.outcome {
            AuditOutcome::Failed => warn!(
                event_name = %event.event_type,
                event_id = %event.event_id,
                correlation_id = %event.correlation_id,
                session_id,
                category = ?event.category,
                actor = %event.actor,
                outcome = ?event.outcome,
                metadata = %metadata,
                "audit event"
            ),
            _ => info!(
                event_name = %event.event_type,
                event_id = %event.event_id,
                correlation_id = %event.correlation_id,
                session_id,
                category = ?event.category,
                actor = %event.actor,
                outcome = ?event.outcome,
                metadata = %metadata,
                "audit event"
            ),
        }
    }
}
