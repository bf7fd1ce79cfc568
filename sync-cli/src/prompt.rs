//! Terminal prompts.

use anyhow::{Context, Result};
use async_trait::async_trait;
use envsync_client::{Answer, Confirm};
use inquire::InquireError;
use tokio::sync::oneshot;

/// Yes/no confirmation on the terminal.
///
/// Falls back to "no" when stdin is not interactive, so scripted runs never
/// overwrite without `--yes`. Esc answers no; Ctrl+C at the prompt is
/// reported as [`Answer::Interrupted`].
#[derive(Debug, Clone, Copy)]
pub struct TerminalConfirm {
    assume_yes: bool,
}

impl TerminalConfirm {
    /// Create a prompt; `assume_yes` answers every question with yes.
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

#[async_trait]
impl Confirm for TerminalConfirm {
    async fn confirm(&self, prompt: &str) -> Answer {
        if self.assume_yes {
            return Answer::Yes;
        }
        // A detached thread rather than spawn_blocking: the runtime waits for
        // blocking tasks on shutdown, and a prompt abandoned by watch shutdown
        // would never return.
        let (tx, rx) = oneshot::channel();
        let prompt = prompt.to_string();
        std::thread::spawn(move || {
            let result = inquire::Confirm::new(&prompt).with_default(false).prompt();
            let _ = tx.send(result);
        });
        answer_from(rx.await.ok())
    }
}

fn answer_from(result: Option<Result<bool, InquireError>>) -> Answer {
    match result {
        Some(Ok(true)) => Answer::Yes,
        Some(Ok(false)) => Answer::No,
        Some(Err(InquireError::OperationInterrupted)) => Answer::Interrupted,
        Some(Err(e)) => {
            tracing::debug!(error = %e, "prompt unavailable, answering no");
            Answer::No
        }
        None => Answer::No,
    }
}

/// Read the relay token, without echo, when it was not given on the command line.
///
/// Surrounding whitespace is stripped; an empty token is an error.
pub fn read_token(given: Option<String>) -> Result<String> {
    let raw = match given {
        Some(token) => token,
        None => rpassword::prompt_password("API token: ").context("Failed to read token")?,
    };
    let token = raw.trim();
    if token.is_empty() {
        anyhow::bail!("Token must not be empty");
    }
    Ok(token.to_string())
}
