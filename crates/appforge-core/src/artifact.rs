use crate::agent::Persona;
use crate::error::AppForgeError;
use crate::transcript::Transcript;
use regex::Regex;
use std::sync::OnceLock;

/// The approved single-page app, as pulled out of the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArtifact {
    pub html_text: String,
    /// Sequence index of the SoftwareEngineer turn it came from.
    pub source_index: usize,
}

fn html_block() -> &'static Regex {
    static HTML_BLOCK: OnceLock<Regex> = OnceLock::new();
    HTML_BLOCK.get_or_init(|| {
        Regex::new(r"(?is)```html\s*(.*?)```").expect("html block pattern is valid")
    })
}

/// First fenced html block in `text`, trimmed.
pub fn first_html_block(text: &str) -> Option<&str> {
    html_block()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Latest SoftwareEngineer turn carrying a fenced html block wins; within a
/// turn the first block is taken.
pub fn extract_html(transcript: &Transcript) -> Option<ExtractedArtifact> {
    let engineer = Persona::SoftwareEngineer.name();
    transcript
        .entries()
        .rev()
        .filter(|entry| entry.is_from(engineer))
        .find_map(|entry| {
            first_html_block(&entry.text).map(|html| ExtractedArtifact {
                html_text: html.to_string(),
                source_index: entry.sequence_index,
            })
        })
}

/// Like `extract_html`, but a missing artifact is an `ExtractionMiss` error.
pub fn require_html(transcript: &Transcript) -> Result<ExtractedArtifact, AppForgeError> {
    extract_html(transcript).ok_or(AppForgeError::ExtractionMiss)
}
