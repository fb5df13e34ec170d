use crate::commands::{handle_decision, DecisionInput};
use appforge_core::{AppForgeError, ApprovalDecision, ApprovalPrompt, TranscriptEntry};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tokio::sync::Mutex;

const DECISION_QUESTION: &str = "Type 'APPROVED' to approve or 'REJECTED' to request changes: ";
const FEEDBACK_QUESTION: &str = "Describe the changes you need: ";

/// Asks the human on a line-oriented console. Blocks until a valid answer
/// arrives; closed input is an error.
pub struct ConsoleApprovalPrompt<R, W> {
    lines: Mutex<Lines<R>>,
    out: Mutex<W>,
}

impl ConsoleApprovalPrompt<tokio::io::BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(
            tokio::io::BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
    }
}

impl<R, W> ConsoleApprovalPrompt<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(input: R, output: W) -> Self {
        Self {
            lines: Mutex::new(input.lines()),
            out: Mutex::new(output),
        }
    }

    /// Consume the prompt and return the output sink.
    pub fn into_output(self) -> W {
        self.out.into_inner()
    }

    async fn ask(&self, question: &str) -> Result<String, AppForgeError> {
        {
            let mut out = self.out.lock().await;
            out.write_all(question.as_bytes()).await?;
            out.flush().await?;
        }
        let mut lines = self.lines.lock().await;
        match lines.next_line().await? {
            Some(line) => Ok(line),
            None => Err(AppForgeError::Prompt(
                "input closed before a decision was made".into(),
            )),
        }
    }

    async fn say(&self, text: &str) -> Result<(), AppForgeError> {
        let mut out = self.out.lock().await;
        out.write_all(text.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl<R, W> ApprovalPrompt for ConsoleApprovalPrompt<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn request_decision(
        &self,
        _review: &TranscriptEntry,
    ) -> Result<ApprovalDecision, AppForgeError> {
        self.say("\nThe product is ready for your approval.").await?;
        loop {
            let answer = self.ask(DECISION_QUESTION).await?;
            match handle_decision(&answer) {
                DecisionInput::Approve => {
                    self.say("Approval confirmed. Finishing up...").await?;
                    return Ok(ApprovalDecision::Approved);
                }
                DecisionInput::Reject => {
                    let feedback = self.ask(FEEDBACK_QUESTION).await?;
                    self.say("Feedback recorded. The team will revise the implementation.")
                        .await?;
                    return Ok(ApprovalDecision::rejected(feedback));
                }
                DecisionInput::Invalid(message) => {
                    tracing::debug!(answer = %answer, "invalid approval answer");
                    self.say(&message).await?;
                }
            }
        }
    }
}
