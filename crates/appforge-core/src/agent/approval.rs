use crate::agent::persona::Persona;
use crate::constants::markers;
use crate::error::AppForgeError;
use crate::transcript::{Transcript, TranscriptEntry};
use serde::{Deserialize, Serialize};

/// How strictly a user turn has to match the approval marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalMatch {
    /// The turn contains `APPROVED` anywhere.
    #[default]
    Contains,
    /// The turn is exactly `APPROVED`.
    Exact,
    /// The turn is a non-empty substring of `APPROVED` ("APP", "PROVED", …).
    ContainedIn,
}

impl ApprovalMatch {
    pub fn matches(&self, text: &str) -> bool {
        let normalized = text.trim().to_uppercase();
        match self {
            ApprovalMatch::Contains => normalized.contains(markers::APPROVED),
            ApprovalMatch::Exact => normalized == markers::APPROVED,
            ApprovalMatch::ContainedIn => {
                !normalized.is_empty() && markers::APPROVED.contains(normalized.as_str())
            }
        }
    }
}

impl std::str::FromStr for ApprovalMatch {
    type Err = AppForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contains" => Ok(ApprovalMatch::Contains),
            "exact" => Ok(ApprovalMatch::Exact),
            "contained-in" | "contained_in" => Ok(ApprovalMatch::ContainedIn),
            other => Err(AppForgeError::Config(format!(
                "Unknown approval match '{other}'. Options: contains, exact, contained-in"
            ))),
        }
    }
}

/// True when any user turn satisfies the approval marker. Scans newest first,
/// never looks at assistant turns and skips recorded rejections, whose
/// feedback may itself mention the marker.
pub fn is_approved(transcript: &Transcript, matching: ApprovalMatch) -> bool {
    transcript.entries().rev().any(|entry| {
        entry.is_user() && !is_rejection(&entry.text) && matching.matches(&entry.text)
    })
}

/// True for the user turn recorded by `ApprovalDecision::Rejected`.
pub fn is_rejection(text: &str) -> bool {
    text.trim_start()
        .to_uppercase()
        .strip_prefix(markers::REJECTED)
        .is_some_and(|rest| rest.starts_with(':'))
}

/// True when the ProductOwner asks the human for sign-off.
pub fn is_ready_for_approval(entry: &TranscriptEntry) -> bool {
    !entry.is_user()
        && entry.is_from(Persona::ProductOwner.name())
        && entry
            .text
            .to_uppercase()
            .contains(markers::READY_FOR_APPROVAL)
}

/// The human's verdict on a ready implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Rejected { feedback: String },
}

impl ApprovalDecision {
    pub fn rejected(feedback: impl Into<String>) -> Self {
        Self::Rejected {
            feedback: feedback.into(),
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, ApprovalDecision::Approved)
    }

    /// Text of the user turn that records this decision.
    pub fn to_user_input(&self) -> String {
        match self {
            ApprovalDecision::Approved => markers::APPROVED.to_string(),
            ApprovalDecision::Rejected { feedback } => format!(
                "{}: {}. {}",
                markers::REJECTED,
                feedback.trim(),
                markers::REVISION_SUFFIX
            ),
        }
    }
}

/// Solicits a decision once the ProductOwner signals readiness. The scheduler
/// waits on it without a timeout.
#[async_trait::async_trait]
pub trait ApprovalPrompt: Send + Sync {
    async fn request_decision(
        &self,
        review: &TranscriptEntry,
    ) -> Result<ApprovalDecision, AppForgeError>;
}
