pub mod engine;
pub mod states;

pub use engine::{next_state, Conversation, DialogueEngine, FlowTransitionError};
pub use states::{
    Confirmation, DialogueState, ErrorKind, FactSummary, FollowUp, MessageKind, Notice, Operation,
    PendingCall, TurnEvent, TurnOutcome, TurnStep,
};
