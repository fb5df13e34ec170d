use thiserror::Error;

/// Step of the publish pipeline that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStage {
    WriteArtifact,
    PrepareScript,
    RunScript,
}

impl std::fmt::Display for PublishStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PublishStage::WriteArtifact => "write artifact",
            PublishStage::PrepareScript => "prepare script",
            PublishStage::RunScript => "run script",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum AppForgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generation failed for {persona}: {message}")]
    Generation {
        persona: String,
        message: String,
        retryable: bool,
    },

    #[error("Unable to proceed while another agent is active")]
    AgentActive,

    #[error("Could not submit user input after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("No HTML artifact found in the SoftwareEngineer turns")]
    ExtractionMiss,

    #[error("Publish error ({stage}): {message}")]
    Publish { stage: PublishStage, message: String },

    #[error("Invalid scheduler state: {0}")]
    InvalidState(String),

    #[error("Approval prompt error: {0}")]
    Prompt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppForgeError {
    pub fn generation(persona: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Generation {
            persona: persona.into(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn publish(stage: PublishStage, message: impl Into<String>) -> Self {
        Self::Publish {
            stage,
            message: message.into(),
        }
    }

    /// Whether the failed operation may succeed if attempted again unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AgentActive => true,
            Self::Generation { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// The publish stage that failed, if this is a publish error.
    pub fn stage(&self) -> Option<PublishStage> {
        match self {
            Self::Publish { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Re-attribute a backend error to the persona that was speaking.
    pub(crate) fn for_persona(self, persona: &str) -> Self {
        match self {
            Self::Generation {
                message, retryable, ..
            } => Self::Generation {
                persona: persona.to_string(),
                message,
                retryable,
            },
            other @ Self::Config(_) => other,
            other => Self::Generation {
                persona: persona.to_string(),
                retryable: other.is_retryable(),
                message: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, AppForgeError>;
