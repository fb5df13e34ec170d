use crate::error::AppForgeError;
use crate::llm::{Message, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Who produced a turn. System instructions never enter the transcript.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl From<TurnRole> for Role {
    fn from(role: TurnRole) -> Self {
        match role {
            TurnRole::User => Role::User,
            TurnRole::Assistant => Role::Assistant,
        }
    }
}

/// One turn of the conversation. Entries are never mutated after append.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptEntry {
    pub role: TurnRole,
    pub author_name: Option<String>,
    pub text: String,
    pub sequence_index: usize,
    pub created_at: DateTime<Utc>,
}

impl TranscriptEntry {
    /// An assistant turn that would land at the end of `transcript`.
    pub fn assistant(transcript: &Transcript, author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            author_name: Some(author.into()),
            text: text.into(),
            sequence_index: transcript.len(),
            created_at: Utc::now(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == TurnRole::User
    }

    pub fn is_from(&self, author: &str) -> bool {
        self.author_name.as_deref() == Some(author)
    }
}

/// Transcript shared between the scheduler and anything injecting user input.
pub type SharedTranscript = Arc<Mutex<Transcript>>;

/// Append-only, ordered log of every turn exchanged in a run.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    generation_active: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transcript holding the initial user request.
    pub fn seeded(request: impl Into<String>) -> Self {
        let mut transcript = Self::new();
        transcript.push(TurnRole::User, None, request.into());
        transcript
    }

    pub fn into_shared(self) -> SharedTranscript {
        Arc::new(Mutex::new(self))
    }

    fn push(&mut self, role: TurnRole, author_name: Option<String>, text: String) -> &TranscriptEntry {
        let sequence_index = self.entries.len();
        self.entries.push(TranscriptEntry {
            role,
            author_name,
            text,
            sequence_index,
            created_at: Utc::now(),
        });
        &self.entries[sequence_index]
    }

    /// Append a prepared entry. Its `sequence_index` is reassigned to the
    /// next position.
    pub fn append(&mut self, entry: TranscriptEntry) -> &TranscriptEntry {
        let sequence_index = self.entries.len();
        self.entries.push(TranscriptEntry {
            sequence_index,
            ..entry
        });
        &self.entries[sequence_index]
    }

    pub fn append_user(&mut self, text: impl Into<String>) -> &TranscriptEntry {
        self.push(TurnRole::User, None, text.into())
    }

    pub fn append_assistant(
        &mut self,
        author: impl Into<String>,
        text: impl Into<String>,
    ) -> &TranscriptEntry {
        self.push(TurnRole::Assistant, Some(author.into()), text.into())
    }

    /// Append a user turn unless a generation is in flight, in which case the
    /// caller gets a retryable `AgentActive` error.
    pub fn try_append_user(&mut self, text: impl Into<String>) -> Result<&TranscriptEntry, AppForgeError> {
        if self.generation_active {
            return Err(AppForgeError::AgentActive);
        }
        Ok(self.append_user(text))
    }

    pub fn begin_generation(&mut self) -> Result<(), AppForgeError> {
        if self.generation_active {
            return Err(AppForgeError::AgentActive);
        }
        self.generation_active = true;
        Ok(())
    }

    pub fn end_generation(&mut self) {
        self.generation_active = false;
    }

    pub fn is_generation_active(&self) -> bool {
        self.generation_active
    }

    /// Iterate the current snapshot in conversation order. The iterator is
    /// `Clone`, so a reader can restart from any point.
    pub fn entries(&self) -> std::slice::Iter<'_, TranscriptEntry> {
        self.entries.iter()
    }

    pub fn get(&self, index: usize) -> Option<&TranscriptEntry> {
        self.entries.get(index)
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the conversation as backend messages, prefixed by the speaking
    /// persona's instructions.
    pub fn to_messages(&self, instructions: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.entries.len() + 1);
        messages.push(Message::system(instructions));
        messages.extend(self.entries.iter().map(|entry| {
            let message = Message {
                role: entry.role.into(),
                content: entry.text.clone(),
                name: None,
            };
            match entry.author_name {
                Some(ref author) => message.with_name(author.clone()),
                None => message,
            }
        }));
        messages
    }
}
