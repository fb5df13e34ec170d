use crate::agent::{ApprovalPrompt, ConversationEvent, ConversationOutcome, TurnScheduler};
use crate::artifact::{extract_html, ExtractedArtifact};
use crate::error::AppForgeError;
use crate::publish::{PublishReport, Publisher};
use crate::transcript::Transcript;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Result of a complete run: conversation, extraction and publishing.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub approved: bool,
    pub turns: usize,
    pub transcript: Transcript,
    pub artifact: Option<ExtractedArtifact>,
    pub publish: Option<PublishReport>,
}

impl RunOutcome {
    /// Approved, but no SoftwareEngineer turn carried an html block.
    pub fn extraction_missed(&self) -> bool {
        self.approved && self.artifact.is_none()
    }
}

/// Conversation followed by the post-approval pipeline.
pub struct Workflow {
    scheduler: TurnScheduler,
    publisher: Option<Publisher>,
    event_tx: Option<UnboundedSender<ConversationEvent>>,
}

impl Workflow {
    pub fn new(scheduler: TurnScheduler) -> Self {
        Self {
            scheduler,
            publisher: None,
            event_tx: None,
        }
    }

    pub fn with_publisher(mut self, publisher: Option<Publisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Route scheduler and pipeline events to `tx`.
    pub fn with_events(mut self, tx: UnboundedSender<ConversationEvent>) -> Self {
        self.scheduler = self.scheduler.with_events(tx.clone());
        self.event_tx = Some(tx);
        self
    }

    pub fn scheduler(&self) -> &TurnScheduler {
        &self.scheduler
    }

    /// Run the conversation to the end; on approval extract the artifact and
    /// publish it. A missing artifact is logged and leaves `artifact` empty.
    pub async fn run(mut self, prompt: &dyn ApprovalPrompt) -> Result<RunOutcome, AppForgeError> {
        let ConversationOutcome {
            run_id,
            approved,
            turns,
            transcript,
        } = self.scheduler.run(prompt).await?;

        let mut outcome = RunOutcome {
            run_id,
            approved,
            turns,
            transcript,
            artifact: None,
            publish: None,
        };

        if !approved {
            tracing::info!("conversation ended without approval, nothing to publish");
            return Ok(outcome);
        }

        let Some(artifact) = extract_html(&outcome.transcript) else {
            tracing::warn!("{}", AppForgeError::ExtractionMiss);
            self.emit(ConversationEvent::ExtractionMissed);
            return Ok(outcome);
        };
        tracing::info!(source_index = artifact.source_index, "artifact extracted");
        self.emit(ConversationEvent::ArtifactExtracted {
            bytes: artifact.html_text.len(),
        });

        if let Some(ref publisher) = self.publisher {
            let report = publisher.publish(&artifact.html_text).await?;
            self.emit(ConversationEvent::Published(report.clone()));
            outcome.publish = Some(report);
        }

        outcome.artifact = Some(artifact);
        Ok(outcome)
    }

    fn emit(&self, event: ConversationEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }
}
