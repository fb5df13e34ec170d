pub mod approval;
pub mod persona;
mod role_agent;
pub mod scheduler;
pub mod selection;

pub use approval::{
    is_approved, is_ready_for_approval, is_rejection, ApprovalDecision, ApprovalMatch,
    ApprovalPrompt,
};
pub use persona::Persona;
pub use role_agent::RoleAgent;
pub use scheduler::{
    ConversationEvent, ConversationOutcome, Phase, RetryPolicy, SchedulerOptions, StepOutcome,
    TurnScheduler,
};
pub use selection::{RoundRobin, SelectionStrategy};
