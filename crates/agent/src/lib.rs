//! Dialogue runtime - drives deployment conversations against live authorities
//!
//! This crate wires the deterministic engine from `deploydesk-core` to the
//! outside world:
//! - Reads free-text chat messages into structured turn events (`conversation`)
//! - Calls the workstation and deployment authorities over HTTP (`http`, `auth`)
//! - Runs each turn, honouring cancellation around the remote call (`runtime`)
//! - Keeps live conversations and serialises their turns (`sessions`)
//! - Words every outcome for the user (`render`)
//!
//! # Safety Principle
//!
//! The text reader is strictly a translator. It NEVER decides whether software
//! is approved, whether a computer exists, or whether a deployment runs. Those
//! decisions belong to the engine and the remote authorities.

pub mod audit_log;
pub mod auth;
pub mod conversation;
pub mod http;
pub mod render;
pub mod runtime;
pub mod sessions;

pub use audit_log::TracingAuditSink;
pub use conversation::{ParsedTurn, TurnParser};
pub use http::{HttpGatewaySettings, HttpValidationGateway};
pub use render::{ResponseRenderer, TurnReply};
pub use runtime::{CancelFlag, DialogueRuntime};
pub use sessions::SessionRegistry;
