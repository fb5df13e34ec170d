use appforge_core::agent::{
    ApprovalDecision, ApprovalMatch, ApprovalPrompt, ConversationEvent, Phase, RetryPolicy,
    SchedulerOptions, StepOutcome, TurnScheduler,
};
use appforge_core::{
    AppForgeError, LlmClient, LlmResponse, Message, Persona, Publisher, Role, TranscriptEntry,
    TurnRole, Workflow,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::unbounded_channel;

/// Mock backend that answers as whichever persona's instructions lead the
/// request, replaying a script per persona. The last reply repeats.
struct ScriptedLlm {
    replies: Mutex<HashMap<Persona, VecDeque<String>>>,
    calls: Mutex<Vec<Persona>>,
}

impl ScriptedLlm {
    fn new(script: &[(Persona, &[&str])]) -> Self {
        let replies = script
            .iter()
            .map(|(persona, texts)| {
                (*persona, texts.iter().map(|t| t.to_string()).collect())
            })
            .collect();
        Self {
            replies: Mutex::new(replies),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// BA plans, SE writes the calculator, PO signs off.
    fn calculator() -> Self {
        Self::new(&[
            (Persona::BusinessAnalyst, &["Plan: a calculator with digits and operators."]),
            (
                Persona::SoftwareEngineer,
                &["Here is the app:\n```html <div>calc</div>```\nDone."],
            ),
            (Persona::ProductOwner, &["Looks good. READY FOR USER APPROVAL"]),
        ])
    }

    fn calls(&self) -> Vec<Persona> {
        self.calls.lock().unwrap().clone()
    }
}

fn speaker(messages: &[Message]) -> Persona {
    let system = messages
        .first()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .unwrap_or_default();
    Persona::ALL
        .into_iter()
        .find(|p| p.default_instructions() == system)
        .expect("request starts with a persona's instructions")
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(&self, messages: &[Message]) -> Result<LlmResponse, AppForgeError> {
        let persona = speaker(messages);
        self.calls.lock().unwrap().push(persona);

        let mut replies = self.replies.lock().unwrap();
        let queue = replies.entry(persona).or_default();
        let text = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        };

        Ok(LlmResponse {
            message: Message::assistant(text),
            usage: None,
        })
    }
}

/// Backend that always fails.
struct FailingLlm;

#[async_trait::async_trait]
impl LlmClient for FailingLlm {
    async fn chat(&self, _messages: &[Message]) -> Result<LlmResponse, AppForgeError> {
        Err(AppForgeError::generation("", "401 Unauthorized"))
    }
}

/// Replays canned decisions and counts how often it was asked.
struct ScriptedPrompt {
    decisions: Mutex<VecDeque<ApprovalDecision>>,
    asked: Mutex<usize>,
}

impl ScriptedPrompt {
    fn new(decisions: Vec<ApprovalDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into()),
            asked: Mutex::new(0),
        }
    }

    fn asked(&self) -> usize {
        *self.asked.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl ApprovalPrompt for ScriptedPrompt {
    async fn request_decision(
        &self,
        review: &TranscriptEntry,
    ) -> Result<ApprovalDecision, AppForgeError> {
        assert!(review.is_from("ProductOwner"));
        *self.asked.lock().unwrap() += 1;
        self.decisions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AppForgeError::Prompt("no more scripted decisions".into()))
    }
}

fn fast_options() -> SchedulerOptions {
    SchedulerOptions {
        settle_delay: Duration::ZERO,
        retry: RetryPolicy {
            max_attempts: 10,
            backoff: Duration::from_millis(1),
        },
        ..SchedulerOptions::default()
    }
}

// ============================================================================
// State machine
// ============================================================================

#[tokio::test]
async fn test_round_stops_when_product_owner_is_ready() {
    let llm = Arc::new(ScriptedLlm::calculator());
    let mut scheduler = TurnScheduler::new(llm.clone(), "build a calculator").with_options(fast_options());

    let outcome = scheduler.step().await.unwrap();

    assert_eq!(outcome, StepOutcome::AwaitingApproval);
    assert_eq!(scheduler.phase(), Phase::AwaitingApproval);
    assert!(scheduler.is_active());
    assert_eq!(
        llm.calls(),
        vec![
            Persona::BusinessAnalyst,
            Persona::SoftwareEngineer,
            Persona::ProductOwner
        ]
    );

    let transcript = scheduler.snapshot().await;
    assert_eq!(transcript.len(), 4);
    assert_eq!(transcript.get(0).unwrap().role, TurnRole::User);
    assert!(transcript.get(3).unwrap().is_from("ProductOwner"));

    // Stepping again while suspended does nothing.
    assert_eq!(scheduler.step().await.unwrap(), StepOutcome::AwaitingApproval);
    assert_eq!(scheduler.snapshot().await.len(), 4);
}

#[tokio::test]
async fn test_readiness_marker_is_case_insensitive() {
    let llm = Arc::new(ScriptedLlm::new(&[
        (Persona::BusinessAnalyst, &["plan"]),
        (Persona::SoftwareEngineer, &["```html <p>x</p>```"]),
        (Persona::ProductOwner, &["ready for user approval!"]),
    ]));
    let mut scheduler = TurnScheduler::new(llm, "x").with_options(fast_options());
    assert_eq!(scheduler.step().await.unwrap(), StepOutcome::AwaitingApproval);
}

#[tokio::test]
async fn test_readiness_from_other_personas_is_ignored() {
    let llm = Arc::new(ScriptedLlm::new(&[
        (Persona::BusinessAnalyst, &["READY FOR USER APPROVAL"]),
        (Persona::SoftwareEngineer, &["READY FOR USER APPROVAL"]),
        (Persona::ProductOwner, &["needs work", "READY FOR USER APPROVAL"]),
    ]));
    let options = SchedulerOptions {
        max_turns_per_round: 6,
        ..fast_options()
    };
    let mut scheduler = TurnScheduler::new(llm.clone(), "x").with_options(options);

    assert_eq!(scheduler.step().await.unwrap(), StepOutcome::AwaitingApproval);
    assert_eq!(llm.calls().len(), 6);
}

#[tokio::test]
async fn test_round_is_bounded_by_max_turns() {
    let llm = Arc::new(ScriptedLlm::new(&[
        (Persona::BusinessAnalyst, &["plan"]),
        (Persona::SoftwareEngineer, &["code"]),
        (Persona::ProductOwner, &["not yet"]),
    ]));
    let options = SchedulerOptions {
        max_turns_per_round: 4,
        ..fast_options()
    };
    let mut scheduler = TurnScheduler::new(llm.clone(), "x").with_options(options);

    assert_eq!(scheduler.step().await.unwrap(), StepOutcome::Continue);
    assert_eq!(llm.calls().len(), 4);
    assert_eq!(scheduler.phase(), Phase::Normal);
}

#[tokio::test]
async fn test_resume_outside_approval_is_rejected() {
    let llm = Arc::new(ScriptedLlm::calculator());
    let mut scheduler = TurnScheduler::new(llm, "x").with_options(fast_options());

    let err = scheduler.resume(ApprovalDecision::Approved).unwrap_err();
    assert!(matches!(err, AppForgeError::InvalidState(_)));
}

#[tokio::test]
async fn test_approval_runs_one_final_round_then_halts() {
    let llm = Arc::new(ScriptedLlm::calculator());
    let mut scheduler = TurnScheduler::new(llm.clone(), "build a calculator").with_options(fast_options());

    assert_eq!(scheduler.step().await.unwrap(), StepOutcome::AwaitingApproval);
    scheduler.resume(ApprovalDecision::Approved).unwrap();
    assert_eq!(scheduler.pending_user_input(), Some("APPROVED"));
    assert_eq!(scheduler.phase(), Phase::Normal);

    assert_eq!(scheduler.step().await.unwrap(), StepOutcome::Finished);
    assert!(!scheduler.is_active());
    assert_eq!(scheduler.pending_user_input(), None);

    // One acknowledgement turn after the approval, then nothing more.
    let transcript = scheduler.snapshot().await;
    assert_eq!(transcript.len(), 6);
    assert_eq!(transcript.get(4).unwrap().text, "APPROVED");
    assert_eq!(transcript.get(4).unwrap().role, TurnRole::User);
    assert_eq!(transcript.get(5).unwrap().role, TurnRole::Assistant);

    assert_eq!(scheduler.step().await.unwrap(), StepOutcome::Finished);
    assert_eq!(llm.calls().len(), 4);
}

#[tokio::test]
async fn test_rejection_appends_feedback_and_resumes() {
    let llm = Arc::new(ScriptedLlm::calculator());
    let mut scheduler = TurnScheduler::new(llm.clone(), "build a calculator").with_options(fast_options());

    scheduler.step().await.unwrap();
    scheduler
        .resume(ApprovalDecision::rejected("add a clear button"))
        .unwrap();
    assert_eq!(scheduler.phase(), Phase::Normal);

    let outcome = scheduler.step().await.unwrap();

    let transcript = scheduler.snapshot().await;
    let feedback = transcript.get(4).unwrap();
    assert_eq!(feedback.role, TurnRole::User);
    assert!(feedback.text.starts_with("REJECTED: add a clear button."));
    assert!(feedback
        .text
        .ends_with("Please revise the implementation according to these requirements."));

    // The team goes around again and asks a second time.
    assert_eq!(outcome, StepOutcome::AwaitingApproval);
    assert!(scheduler.is_active());
    assert!(transcript.get(5).unwrap().is_from("BusinessAnalyst"));
}

#[tokio::test]
async fn test_empty_turn_halts_without_progress() {
    let llm = Arc::new(ScriptedLlm::new(&[(Persona::BusinessAnalyst, &["   "])]));
    let (tx, mut rx) = unbounded_channel();
    let mut scheduler = TurnScheduler::new(llm.clone(), "x")
        .with_options(fast_options())
        .with_events(tx);

    assert_eq!(scheduler.step().await.unwrap(), StepOutcome::Finished);
    assert!(!scheduler.is_active());
    assert_eq!(scheduler.snapshot().await.len(), 1);
    assert_eq!(llm.calls().len(), 1);

    let mut finished = None;
    while let Ok(event) = rx.try_recv() {
        if let ConversationEvent::Finished { approved } = event {
            finished = Some(approved);
        }
    }
    assert_eq!(finished, Some(false));
}

#[tokio::test]
async fn test_zero_turn_budget_halts_immediately() {
    let llm = Arc::new(ScriptedLlm::calculator());
    let options = SchedulerOptions {
        max_turns_per_round: 0,
        ..fast_options()
    };
    let mut scheduler = TurnScheduler::new(llm.clone(), "x").with_options(options);

    assert_eq!(scheduler.step().await.unwrap(), StepOutcome::Finished);
    assert!(llm.calls().is_empty());
}

#[tokio::test]
async fn test_generation_failure_aborts_run() {
    let mut scheduler = TurnScheduler::new(Arc::new(FailingLlm), "x").with_options(fast_options());

    let err = scheduler.step().await.unwrap_err();
    match err {
        AppForgeError::Generation {
            persona, retryable, ..
        } => {
            assert_eq!(persona, "BusinessAnalyst");
            assert!(!retryable);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!scheduler.is_active());

    // The transcript is left usable.
    let transcript = scheduler.snapshot().await;
    assert!(!transcript.is_generation_active());
    assert_eq!(transcript.len(), 1);
}

#[tokio::test]
async fn test_custom_selection_strategy() {
    let llm = Arc::new(ScriptedLlm::new(&[(
        Persona::ProductOwner,
        &["READY FOR USER APPROVAL"],
    )]));
    let mut scheduler = TurnScheduler::new(llm.clone(), "x")
        .with_options(fast_options())
        .with_strategy(|_: &appforge_core::Transcript| Persona::ProductOwner);

    assert_eq!(scheduler.step().await.unwrap(), StepOutcome::AwaitingApproval);
    assert_eq!(llm.calls(), vec![Persona::ProductOwner]);
}

// ============================================================================
// Pending input retry
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_pending_input_waits_for_active_generation() {
    let llm = Arc::new(ScriptedLlm::calculator());
    let (tx, mut rx) = unbounded_channel();
    let mut scheduler = TurnScheduler::new(llm, "build a calculator")
        .with_options(SchedulerOptions::default())
        .with_events(tx);

    scheduler.step().await.unwrap();
    scheduler.resume(ApprovalDecision::Approved).unwrap();

    // Someone else holds a generation for a few seconds.
    let transcript = scheduler.transcript();
    transcript.lock().await.begin_generation().unwrap();
    let release = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(3200)).await;
        transcript.lock().await.end_generation();
    });

    assert_eq!(scheduler.step().await.unwrap(), StepOutcome::Finished);
    release.await.unwrap();

    let retries: Vec<u32> = std::iter::from_fn(|| rx.try_recv().ok())
        .filter_map(|event| match event {
            ConversationEvent::SubmitRetry { attempt, .. } => Some(attempt),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![1, 2, 3]);

    let snapshot = scheduler.snapshot().await;
    assert_eq!(snapshot.get(4).unwrap().text, "APPROVED");
}

#[tokio::test(start_paused = true)]
async fn test_pending_input_gives_up_after_max_attempts() {
    let llm = Arc::new(ScriptedLlm::calculator());
    let mut scheduler = TurnScheduler::new(llm, "x").with_options(SchedulerOptions::default());

    scheduler.step().await.unwrap();
    scheduler
        .resume(ApprovalDecision::rejected("bigger buttons"))
        .unwrap();
    scheduler.transcript().lock().await.begin_generation().unwrap();

    let started = tokio::time::Instant::now();
    let err = scheduler.step().await.unwrap_err();

    assert!(matches!(err, AppForgeError::RetriesExhausted { attempts: 10 }));
    assert!(!scheduler.is_active());
    // 500ms settle delay plus nine 1s backoffs between ten attempts.
    assert_eq!(started.elapsed(), Duration::from_millis(9500));
    assert_eq!(scheduler.snapshot().await.len(), 4);
}

// ============================================================================
// Approval strictness
// ============================================================================

#[tokio::test]
async fn test_exact_match_ignores_decorated_approval_in_request() {
    let llm = Arc::new(ScriptedLlm::calculator());
    let options = SchedulerOptions {
        approval_match: ApprovalMatch::Exact,
        ..fast_options()
    };
    let mut scheduler =
        TurnScheduler::new(llm, "make a list of APPROVED vendors").with_options(options);

    assert_eq!(scheduler.step().await.unwrap(), StepOutcome::AwaitingApproval);
}

#[tokio::test]
async fn test_contains_match_ends_on_approved_request() {
    let llm = Arc::new(ScriptedLlm::calculator());
    let mut scheduler =
        TurnScheduler::new(llm.clone(), "make a list of APPROVED vendors").with_options(fast_options());

    assert_eq!(scheduler.step().await.unwrap(), StepOutcome::Finished);
    assert_eq!(llm.calls().len(), 1);
}

// ============================================================================
// Full workflow
// ============================================================================

#[tokio::test]
async fn test_end_to_end_approval_publishes_artifact() {
    let dir = TempDir::new().unwrap();
    let llm = Arc::new(ScriptedLlm::calculator());
    let scheduler = TurnScheduler::new(llm, "build a calculator").with_options(fast_options());
    let run_id = scheduler.run_id();
    let prompt = ScriptedPrompt::new(vec![ApprovalDecision::Approved]);

    let outcome = Workflow::new(scheduler)
        .with_publisher(Some(Publisher::new(dir.path()).with_run_script(false)))
        .run(&prompt)
        .await
        .unwrap();

    assert!(outcome.approved);
    assert_eq!(outcome.run_id, run_id);
    assert_eq!(prompt.asked(), 1);
    let html = std::fs::read_to_string(dir.path().join("index.html")).unwrap();
    assert_eq!(html, "<div>calc</div>");
    assert_eq!(outcome.artifact.unwrap().html_text, "<div>calc</div>");
    assert!(outcome.publish.unwrap().is_success());
    assert!(!dir.path().join("push_to_git.sh").exists());
}

#[tokio::test]
async fn test_end_to_end_rejection_then_approval() {
    let dir = TempDir::new().unwrap();
    let llm = Arc::new(ScriptedLlm::new(&[
        (Persona::BusinessAnalyst, &["plan", "revised plan"]),
        (
            Persona::SoftwareEngineer,
            &["```html <div>v1</div>```", "```html <div>v2</div>```"],
        ),
        (Persona::ProductOwner, &["READY FOR USER APPROVAL"]),
    ]));
    let scheduler = TurnScheduler::new(llm, "build a calculator").with_options(fast_options());
    let prompt = ScriptedPrompt::new(vec![
        ApprovalDecision::rejected("add a clear button"),
        ApprovalDecision::Approved,
    ]);

    let outcome = Workflow::new(scheduler)
        .with_publisher(Some(Publisher::new(dir.path()).with_run_script(false)))
        .run(&prompt)
        .await
        .unwrap();

    assert_eq!(prompt.asked(), 2);
    assert!(outcome.approved);
    let html = std::fs::read_to_string(dir.path().join("index.html")).unwrap();
    assert_eq!(html, "<div>v2</div>");
}

#[tokio::test]
async fn test_feedback_mentioning_approved_is_still_a_rejection() {
    let dir = TempDir::new().unwrap();
    let llm = Arc::new(ScriptedLlm::calculator());
    let scheduler = TurnScheduler::new(llm, "build a calculator").with_options(fast_options());
    let prompt = ScriptedPrompt::new(vec![ApprovalDecision::rejected(
        "not approved yet, add a clear button",
    )]);

    let err = Workflow::new(scheduler)
        .with_publisher(Some(Publisher::new(dir.path()).with_run_script(false)))
        .run(&prompt)
        .await
        .unwrap_err();

    // The team revised and asked again instead of finishing.
    assert!(matches!(err, AppForgeError::Prompt(_)));
    assert_eq!(prompt.asked(), 2);
    assert!(!dir.path().join("index.html").exists());
}

#[tokio::test]
async fn test_disapproval_feedback_keeps_scheduler_running() {
    let llm = Arc::new(ScriptedLlm::calculator());
    let mut scheduler = TurnScheduler::new(llm, "build a calculator").with_options(fast_options());

    scheduler.step().await.unwrap();
    scheduler
        .resume(ApprovalDecision::rejected("disapproved: the layout is broken"))
        .unwrap();

    assert_eq!(scheduler.step().await.unwrap(), StepOutcome::AwaitingApproval);
    assert!(scheduler.is_active());
    assert!(!scheduler.outcome().await.approved);
}

#[tokio::test]
async fn test_rejection_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let llm = Arc::new(ScriptedLlm::calculator());
    let scheduler = TurnScheduler::new(llm, "build a calculator").with_options(fast_options());
    // The prompt runs dry on the second request, which ends the run with an error.
    let prompt = ScriptedPrompt::new(vec![ApprovalDecision::rejected("add a clear button")]);

    let err = Workflow::new(scheduler)
        .with_publisher(Some(Publisher::new(dir.path())))
        .run(&prompt)
        .await
        .unwrap_err();

    assert!(matches!(err, AppForgeError::Prompt(_)));
    assert!(!dir.path().join("index.html").exists());
}

#[tokio::test]
async fn test_approval_without_html_is_an_extraction_miss() {
    let dir = TempDir::new().unwrap();
    let llm = Arc::new(ScriptedLlm::new(&[
        (Persona::BusinessAnalyst, &["plan"]),
        (Persona::SoftwareEngineer, &["I will write it in the next message."]),
        (Persona::ProductOwner, &["READY FOR USER APPROVAL"]),
    ]));
    let (tx, mut rx) = unbounded_channel();
    let scheduler = TurnScheduler::new(llm, "x").with_options(fast_options());
    let prompt = ScriptedPrompt::new(vec![ApprovalDecision::Approved]);

    let outcome = Workflow::new(scheduler)
        .with_publisher(Some(Publisher::new(dir.path())))
        .with_events(tx)
        .run(&prompt)
        .await
        .unwrap();

    assert!(outcome.extraction_missed());
    assert!(outcome.publish.is_none());
    assert!(!dir.path().join("index.html").exists());
    assert!(std::iter::from_fn(|| rx.try_recv().ok())
        .any(|event| matches!(event, ConversationEvent::ExtractionMissed)));
}
