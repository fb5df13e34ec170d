use anyhow::Result;
use appforge_core::agent::{RoleAgent, TurnScheduler};
use appforge_core::publish::ScriptStatus;
use appforge_core::{ConversationEvent, Persona, RunOutcome, Settings, Workflow};
use tokio::sync::mpsc;

use crate::prompt::ConsoleApprovalPrompt;

const SEPARATOR: &str =
    "--------------------------------------------------------------------------------";

/// Run the whole workflow for `request`: conversation on the console, then
/// extraction and publishing.
pub async fn run_request(settings: &Settings, request: &str) -> Result<RunOutcome> {
    let llm = settings.build_llm_client()?;

    let mut scheduler = TurnScheduler::new(llm.clone(), request)
        .with_options(settings.scheduler_options());
    for persona in Persona::ALL {
        if let Some(instructions) = settings.instructions_for(persona) {
            scheduler =
                scheduler.with_agent(RoleAgent::new(persona, llm.clone()).with_instructions(instructions));
        }
    }

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ConversationEvent>();
    let workflow = Workflow::new(scheduler)
        .with_publisher(settings.publisher())
        .with_events(event_tx);

    println!("Multi-agent team ready. You will be asked for approval when the app is ready.");
    println!("{SEPARATOR}");

    let prompt = ConsoleApprovalPrompt::stdio();
    let render = async {
        while let Some(event) = event_rx.recv().await {
            render_event(&event);
        }
    };

    let (outcome, ()) = tokio::join!(workflow.run(&prompt), render);
    let outcome = outcome?;

    report(&outcome);
    Ok(outcome)
}

pub fn render_event(event: &ConversationEvent) {
    match event {
        ConversationEvent::TurnStarted(persona) => eprintln!("[{persona} is thinking...]"),
        ConversationEvent::TurnProduced(entry) => {
            let author = entry.author_name.as_deref().unwrap_or("unknown");
            println!("\nassistant - {author}:");
            println!("{}", entry.text);
            println!("{SEPARATOR}");
        }
        ConversationEvent::ApprovalRequested(_) => {}
        ConversationEvent::UserInputSubmitted(entry) => {
            println!("\nuser:");
            println!("{}", entry.text);
            println!("{SEPARATOR}");
        }
        ConversationEvent::SubmitRetry {
            attempt,
            max_attempts,
        } => eprintln!("Waiting for the chat to become available (attempt {attempt}/{max_attempts})..."),
        ConversationEvent::RoundFinished { .. } => {}
        ConversationEvent::Finished { approved } => {
            if *approved {
                println!("Approved by the user. Post-processing started.");
            }
        }
        ConversationEvent::ArtifactExtracted { bytes } => {
            println!("Extracted the HTML application ({bytes} bytes).")
        }
        ConversationEvent::ExtractionMissed => eprintln!("Warning: no HTML code found."),
        ConversationEvent::Published(report) => {
            println!("Saved {}.", report.artifact_path.display());
            match report.script {
                ScriptStatus::Skipped => {}
                ScriptStatus::Completed(ref run) => {
                    if !run.stdout.trim().is_empty() {
                        println!("{}", run.stdout.trim_end());
                    }
                    if run.success {
                        println!("Artifact pushed to the git repository.");
                    }
                }
                ScriptStatus::Failed { .. } => {}
            }
            if let Some(err) = report.script_error() {
                eprintln!("Error: {err}");
            }
        }
    }
}

fn report(outcome: &RunOutcome) {
    if !outcome.approved {
        println!("\nConversation ended without approval ({} turns).", outcome.turns);
    } else {
        println!("\nProcess finished ({} turns).", outcome.turns);
    }
    println!("Run id: {}", outcome.run_id);
}
