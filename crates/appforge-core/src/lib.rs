pub mod agent;
pub mod artifact;
pub mod config;
pub mod constants;
pub mod error;
pub mod llm;
pub mod publish;
pub mod transcript;
pub mod workflow;

// Re-export key types
pub use agent::{
    ApprovalDecision, ApprovalMatch, ApprovalPrompt, ConversationEvent, Persona, RoleAgent,
    StepOutcome, TurnScheduler,
};
pub use artifact::{extract_html, ExtractedArtifact};
pub use config::Settings;
pub use error::{AppForgeError, PublishStage};
pub use llm::{LlmClient, LlmResponse, Message, Role};
pub use publish::{PublishReport, Publisher};
pub use transcript::{Transcript, TranscriptEntry, TurnRole};
pub use workflow::{RunOutcome, Workflow};
