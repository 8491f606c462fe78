//! Terminal operator: prompts on stdin, prints notices.
use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use tracing::{error, info, warn};

use crate::services::{Confirmation, Notice, NoticeLevel, Operator, Severity};

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleOperator {
    /// Answer every gate with yes without prompting.
    pub assume_yes: bool,
}

impl ConsoleOperator {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

/// `y`/`yes`, case-insensitive.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[async_trait]
impl Operator for ConsoleOperator {
    async fn confirm(&self, prompt: &Confirmation) -> bool {
        if self.assume_yes {
            info!(severity = ?prompt.severity, "auto-confirmed: {}", prompt.message);
            return true;
        }
        let banner = match prompt.severity {
            Severity::Caution => "",
            Severity::Destructive => "!! ",
        };
        let question = format!("{banner}{} [y/N] ", prompt.message);
        let answer = tokio::task::spawn_blocking(move || {
            let mut out = io::stdout();
            let _ = write!(out, "{question}");
            let _ = out.flush();
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;
        match answer {
            Ok(Ok(line)) => is_affirmative(&line),
            Ok(Err(err)) => {
                warn!(?err, "failed to read confirmation");
                false
            }
            Err(err) => {
                warn!(?err, "confirmation prompt task failed");
                false
            }
        }
    }

    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info => {
                info!("{}", notice.message);
                println!("{}", notice.message);
            }
            NoticeLevel::Error => {
                error!("{}", notice.message);
                eprintln!("error: {}", notice.message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affirmative_answers() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative(" YES "));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("no"));
    }

    #[tokio::test]
    async fn assume_yes_skips_prompt() {
        let op = ConsoleOperator::new(true);
        let prompt = Confirmation {
            severity: Severity::Destructive,
            message: "merge?".into(),
        };
        assert!(op.confirm(&prompt).await);
    }
}
