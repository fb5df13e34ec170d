// Library interface for appforge-cli
// The binary and the integration tests share these modules.

pub mod app;
pub mod commands;
pub mod prompt;

pub use commands::{handle_decision, DecisionInput};
pub use prompt::ConsoleApprovalPrompt;
