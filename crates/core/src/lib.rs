pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod gateway;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use domain::session::{
    ComputerStatus, DeploymentStatus, Field, SessionId, SessionState, SoftwareStatus,
};
pub use domain::software::{SoftwareRegistry, SoftwareVerdict};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{
    Confirmation, Conversation, DialogueEngine, DialogueState, ErrorKind, MessageKind, Notice,
    TurnEvent, TurnOutcome, TurnStep,
};
pub use gateway::{
    DeploymentRequest, GatewayOutcome, ResponseMarkers, ValidationGateway, WorkstationRequest,
};
