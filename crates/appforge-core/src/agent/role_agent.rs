use crate::agent::persona::Persona;
use crate::error::AppForgeError;
use crate::llm::LlmClient;
use crate::transcript::{Transcript, TranscriptEntry};
use std::sync::Arc;

/// A persona bound to the shared completion backend.
#[derive(Clone)]
pub struct RoleAgent {
    persona: Persona,
    instructions: String,
    llm: Arc<dyn LlmClient>,
}

impl RoleAgent {
    pub fn new(persona: Persona, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            persona,
            instructions: persona.default_instructions().to_string(),
            llm,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn persona(&self) -> Persona {
        self.persona
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// Produce this persona's next turn from the conversation so far. The
    /// entry is not appended; the caller decides whether to keep it.
    /// Backend failures come back as `Generation` errors naming the persona.
    pub async fn generate_turn(
        &self,
        transcript: &Transcript,
    ) -> Result<TranscriptEntry, AppForgeError> {
        let messages = transcript.to_messages(&self.instructions);
        let response = self
            .llm
            .chat(&messages)
            .await
            .map_err(|e| e.for_persona(self.persona.name()))?;

        if let Some(usage) = response.usage {
            tracing::debug!(
                persona = %self.persona,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "turn usage"
            );
        }

        Ok(TranscriptEntry::assistant(
            transcript,
            self.persona.name(),
            response.message.content,
        ))
    }
}

impl std::fmt::Debug for RoleAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleAgent")
            .field("persona", &self.persona)
            .field("backend", &self.llm.name())
            .finish()
    }
}
