use crate::agent::approval::{
    is_approved, is_ready_for_approval, ApprovalDecision, ApprovalMatch, ApprovalPrompt,
};
use crate::agent::persona::Persona;
use crate::agent::role_agent::RoleAgent;
use crate::agent::selection::{RoundRobin, SelectionStrategy};
use crate::constants::scheduling;
use crate::error::AppForgeError;
use crate::llm::LlmClient;
use crate::transcript::{SharedTranscript, Transcript, TranscriptEntry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::Instrument;
use uuid::Uuid;

/// Macro-state of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Personas take turns automatically
    Normal,
    /// Suspended until a human decision is supplied through `resume`
    AwaitingApproval,
}

/// What a single `step` left the scheduler in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    AwaitingApproval,
    Finished,
}

/// Events emitted while a conversation runs - the shared CLI/test interface.
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    TurnStarted(Persona),
    TurnProduced(TranscriptEntry),
    ApprovalRequested(TranscriptEntry),
    UserInputSubmitted(TranscriptEntry),
    SubmitRetry { attempt: u32, max_attempts: u32 },
    RoundFinished { turns: usize },
    Finished { approved: bool },
    ArtifactExtracted { bytes: usize },
    ExtractionMissed,
    Published(crate::publish::PublishReport),
}

/// Fixed-backoff retry for appending user input while an agent is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: scheduling::MAX_SUBMIT_ATTEMPTS,
            backoff: Duration::from_millis(scheduling::SUBMIT_BACKOFF_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub approval_match: ApprovalMatch,
    pub max_turns_per_round: usize,
    pub retry: RetryPolicy,
    pub settle_delay: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            approval_match: ApprovalMatch::default(),
            max_turns_per_round: scheduling::MAX_TURNS_PER_ROUND,
            retry: RetryPolicy::default(),
            settle_delay: Duration::from_millis(scheduling::SETTLE_DELAY_MS),
        }
    }
}

/// Summary of a finished conversation.
#[derive(Debug, Clone)]
pub struct ConversationOutcome {
    pub run_id: Uuid,
    pub approved: bool,
    pub turns: usize,
    pub transcript: Transcript,
}

/// Drives the personas in turn until a human approves the result.
///
/// The scheduler is an explicit two-state machine: `step` runs one round of
/// automatic turns and reports whether the ProductOwner is waiting for a human,
/// `resume` records the human's decision. `run` loops the two against an
/// injected `ApprovalPrompt`.
pub struct TurnScheduler {
    run_id: Uuid,
    agents: HashMap<Persona, RoleAgent>,
    strategy: Box<dyn SelectionStrategy>,
    options: SchedulerOptions,
    transcript: SharedTranscript,
    pending_user_input: Option<String>,
    phase: Phase,
    active: bool,
    final_round: bool,
    turns: usize,
    event_tx: Option<UnboundedSender<ConversationEvent>>,
}

impl TurnScheduler {
    /// All three personas on one backend, seeded with the user's request.
    pub fn new(llm: Arc<dyn LlmClient>, request: impl Into<String>) -> Self {
        let agents = Persona::ALL
            .into_iter()
            .map(|persona| (persona, RoleAgent::new(persona, llm.clone())))
            .collect();

        Self {
            run_id: Uuid::new_v4(),
            agents,
            strategy: Box::new(RoundRobin),
            options: SchedulerOptions::default(),
            transcript: Transcript::seeded(request).into_shared(),
            pending_user_input: None,
            phase: Phase::Normal,
            active: true,
            final_round: false,
            turns: 0,
            event_tx: None,
        }
    }

    /// Replace the agent for its persona (e.g. custom instructions or backend).
    pub fn with_agent(mut self, agent: RoleAgent) -> Self {
        self.agents.insert(agent.persona(), agent);
        self
    }

    pub fn with_strategy(mut self, strategy: impl SelectionStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    pub fn with_options(mut self, options: SchedulerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_events(mut self, tx: UnboundedSender<ConversationEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn pending_user_input(&self) -> Option<&str> {
        self.pending_user_input.as_deref()
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Handle to the live transcript.
    pub fn transcript(&self) -> SharedTranscript {
        self.transcript.clone()
    }

    pub async fn snapshot(&self) -> Transcript {
        self.transcript.lock().await.clone()
    }

    /// Run one scheduling step: submit any pending input, then one round of
    /// automatic turns.
    pub async fn step(&mut self) -> Result<StepOutcome, AppForgeError> {
        if !self.active {
            return Ok(StepOutcome::Finished);
        }
        if self.phase == Phase::AwaitingApproval {
            return Ok(StepOutcome::AwaitingApproval);
        }

        if let Some(input) = self.pending_user_input.take() {
            if let Err(e) = self.submit_user_input(&input).await {
                self.active = false;
                return Err(e);
            }
        }

        let produced = match self.run_round().await {
            Ok(produced) => produced,
            Err(e) => {
                self.active = false;
                return Err(e);
            }
        };
        self.emit(ConversationEvent::RoundFinished { turns: produced });

        let approved = {
            let transcript = self.transcript.lock().await;
            is_approved(&transcript, self.options.approval_match)
        };

        if self.final_round || approved {
            tracing::info!(run_id = %self.run_id, approved, "conversation finished");
            return Ok(self.finish(approved));
        }

        if self.phase == Phase::AwaitingApproval {
            return Ok(StepOutcome::AwaitingApproval);
        }

        if produced == 0 && self.pending_user_input.is_none() {
            tracing::warn!(run_id = %self.run_id, "round produced no turns, stopping");
            return Ok(self.finish(false));
        }

        Ok(StepOutcome::Continue)
    }

    /// Record the human's decision and return to normal scheduling. Approval
    /// makes the next round the last one.
    pub fn resume(&mut self, decision: ApprovalDecision) -> Result<(), AppForgeError> {
        if self.phase != Phase::AwaitingApproval {
            return Err(AppForgeError::InvalidState(
                "resume called while not awaiting approval".into(),
            ));
        }
        if self.pending_user_input.is_some() {
            return Err(AppForgeError::InvalidState(
                "a user input is already pending".into(),
            ));
        }

        tracing::info!(run_id = %self.run_id, approved = decision.is_approved(), "decision recorded");
        self.final_round = decision.is_approved();
        self.pending_user_input = Some(decision.to_user_input());
        self.phase = Phase::Normal;
        Ok(())
    }

    /// Drive the conversation to completion, asking `prompt` whenever the
    /// ProductOwner signals readiness.
    pub async fn run(
        &mut self,
        prompt: &dyn ApprovalPrompt,
    ) -> Result<ConversationOutcome, AppForgeError> {
        let span = tracing::info_span!("conversation", run_id = %self.run_id);
        async {
            loop {
                match self.step().await? {
                    StepOutcome::Continue => continue,
                    StepOutcome::AwaitingApproval => {
                        let review = self.transcript.lock().await.last().cloned();
                        let review = review.ok_or_else(|| {
                            AppForgeError::InvalidState("awaiting approval on an empty transcript".into())
                        })?;
                        let decision = prompt.request_decision(&review).await?;
                        self.resume(decision)?;
                    }
                    StepOutcome::Finished => break,
                }
            }
            Ok::<_, AppForgeError>(self.outcome().await)
        }
        .instrument(span)
        .await
    }

    pub async fn outcome(&self) -> ConversationOutcome {
        let transcript = self.snapshot().await;
        ConversationOutcome {
            run_id: self.run_id,
            approved: is_approved(&transcript, self.options.approval_match),
            turns: self.turns,
            transcript,
        }
    }

    fn finish(&mut self, approved: bool) -> StepOutcome {
        self.active = false;
        self.emit(ConversationEvent::Finished { approved });
        StepOutcome::Finished
    }

    /// Append pending input as a user turn, waiting out any in-flight
    /// generation with a fixed backoff.
    async fn submit_user_input(&self, input: &str) -> Result<(), AppForgeError> {
        if !self.options.settle_delay.is_zero() {
            tokio::time::sleep(self.options.settle_delay).await;
        }

        let RetryPolicy {
            max_attempts,
            backoff,
        } = self.options.retry;

        for attempt in 1..=max_attempts {
            let result = {
                let mut transcript = self.transcript.lock().await;
                transcript.try_append_user(input).map(|entry| entry.clone())
            };

            match result {
                Ok(entry) => {
                    tracing::info!(run_id = %self.run_id, attempt, "user input submitted");
                    self.emit(ConversationEvent::UserInputSubmitted(entry));
                    return Ok(());
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(attempt, max_attempts, "agent still active, retrying user input");
                    self.emit(ConversationEvent::SubmitRetry {
                        attempt,
                        max_attempts,
                    });
                    if attempt < max_attempts {
                        tokio::time::sleep(backoff).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        tracing::error!(max_attempts, "could not submit user input");
        Err(AppForgeError::RetriesExhausted {
            attempts: max_attempts,
        })
    }

    /// One round of automatic turns. Returns how many entries were appended.
    async fn run_round(&mut self) -> Result<usize, AppForgeError> {
        let mut produced = 0;

        while produced < self.options.max_turns_per_round {
            let snapshot = {
                let mut transcript = self.transcript.lock().await;
                transcript.begin_generation()?;
                transcript.clone()
            };

            let persona = self.strategy.next(&snapshot);
            let agent = self.agents.get(&persona).ok_or_else(|| {
                AppForgeError::InvalidState(format!("no agent registered for {persona}"))
            });
            let agent = match agent {
                Ok(agent) => agent,
                Err(e) => {
                    self.transcript.lock().await.end_generation();
                    return Err(e);
                }
            };

            self.emit(ConversationEvent::TurnStarted(persona));
            let span = tracing::debug_span!("turn", persona = %persona, index = snapshot.len());
            let generated = agent.generate_turn(&snapshot).instrument(span).await;

            let (entry, approved) = {
                let mut transcript = self.transcript.lock().await;
                transcript.end_generation();
                let generated = generated?;
                if generated.text.trim().is_empty() {
                    tracing::warn!(persona = %persona, "empty turn, ending round");
                    break;
                }
                let entry = transcript.append(generated).clone();
                let approved = is_approved(&transcript, self.options.approval_match);
                (entry, approved)
            };

            produced += 1;
            self.turns += 1;
            tracing::info!(persona = %persona, index = entry.sequence_index, "turn produced");
            self.emit(ConversationEvent::TurnProduced(entry.clone()));

            if approved {
                break;
            }

            if is_ready_for_approval(&entry) {
                tracing::info!("product owner requested approval");
                self.phase = Phase::AwaitingApproval;
                self.emit(ConversationEvent::ApprovalRequested(entry));
                break;
            }
        }

        Ok(produced)
    }

    pub(crate) fn emit(&self, event: ConversationEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }
}
