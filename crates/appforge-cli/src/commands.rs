use appforge_core::constants::markers;

/// Result of reading one line at the approval prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionInput {
    /// The human approved the implementation.
    Approve,
    /// The human rejected it; feedback is read next.
    Reject,
    /// Anything else - re-prompt.
    Invalid(String),
}

/// Interpret the first answer at the approval prompt. Matching is
/// case-insensitive and ignores surrounding whitespace; nothing is defaulted.
pub fn handle_decision(input: &str) -> DecisionInput {
    let normalized = input.trim().to_uppercase();
    if normalized == markers::APPROVED {
        DecisionInput::Approve
    } else if normalized == markers::REJECTED {
        DecisionInput::Reject
    } else {
        DecisionInput::Invalid(format!(
            "Invalid answer '{}'. Type '{}' or '{}'.",
            input.trim(),
            markers::APPROVED,
            markers::REJECTED
        ))
    }
}
