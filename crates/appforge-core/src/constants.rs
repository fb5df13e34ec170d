/// Centralized constants for AppForge.
/// Markers, file names, retry bounds and backend defaults live here.

// ─── Conversation Markers ─────────────────────────────────────────────────────

pub mod markers {
    /// Text a user turn must carry for the run to be considered approved.
    pub const APPROVED: &str = "APPROVED";
    pub const REJECTED: &str = "REJECTED";
    /// Emitted by the ProductOwner when the implementation is ready for review.
    pub const READY_FOR_APPROVAL: &str = "READY FOR USER APPROVAL";
    /// Suffix appended to rejection feedback before it enters the transcript.
    pub const REVISION_SUFFIX: &str = "Please revise the implementation according to these requirements.";
}

// ─── Publish Pipeline ─────────────────────────────────────────────────────────

pub mod publish {
    pub const ARTIFACT_FILE: &str = "index.html";
    pub const SCRIPT_FILE: &str = "push_to_git.sh";
    pub const SCRIPT_MODE: u32 = 0o755;
    pub const SHELL: &str = "bash";
}

// ─── Backend ──────────────────────────────────────────────────────────────────

pub mod backend {
    pub const DEPLOYMENT_ENV: &str = "AZURE_OPENAI_CHAT_DEPLOYMENT_NAME";
    pub const ENDPOINT_ENV: &str = "AZURE_OPENAI_ENDPOINT";
    pub const API_KEY_ENV: &str = "AZURE_OPENAI_API_KEY";
    pub const AZURE_API_VERSION: &str = "2024-06-01";
    pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
    pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
    pub const REQUEST_TIMEOUT_SECS: u64 = 180;
}

// ─── Scheduling ───────────────────────────────────────────────────────────────

pub mod scheduling {
    /// Attempts made to append pending user input while an agent is active.
    pub const MAX_SUBMIT_ATTEMPTS: u32 = 10;
    pub const SUBMIT_BACKOFF_MS: u64 = 1000;
    /// Pause before the first attempt so an in-flight generation can settle.
    pub const SETTLE_DELAY_MS: u64 = 500;
    /// Upper bound on automatic turns between two human interactions.
    pub const MAX_TURNS_PER_ROUND: usize = 12;
}

// ─── CLI ──────────────────────────────────────────────────────────────────────

pub mod cli {
    pub const DEFAULT_REQUEST: &str = "I want a simple calculator app with the basic operations \
        (+, -, *, /) and a modern interface with large buttons and attractive colors.";
}
