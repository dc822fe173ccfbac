use std::io::{self, BufRead, Write};

use crmcrew_agent::Request;
use crmcrew_core::config::LoadOptions;
use crmcrew_core::errors::ApplicationError;

use crate::commands::agent::{render, AgentSession};
use crate::commands::CommandResult;
use crate::ClientFactory;

const EXIT_WORDS: [&str; 3] = ["exit", "quit", "q"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub answered: usize,
    pub failed: usize,
}

pub fn run(
    options: LoadOptions,
    factory: &ClientFactory,
    input: impl BufRead,
    output: impl Write,
    json: bool,
) -> CommandResult {
    let session = match AgentSession::open(options, factory) {
        Ok(session) => session,
        Err(error) => return CommandResult::from_error("interactive", error, json),
    };

    match run_session(&session, input, output, json) {
        Ok(summary) => {
            tracing::info!(
                event_name = "cli.interactive.ended",
                answered = summary.answered,
                failed = summary.failed,
                "interactive session ended"
            );
            CommandResult::text(String::new())
        }
        Err(error) => CommandResult::from_error(
            "interactive",
            ApplicationError::Internal(format!("session i/o failed: {error}")),
            json,
        ),
    }
}

/// Answers one question per line until an exit word or end of input. A failed
/// question, including a line that is not UTF-8, is reported and the session
/// carries on.
pub fn run_session(
    session: &AgentSession,
    mut input: impl BufRead,
    mut output: impl Write,
    json: bool,
) -> io::Result<SessionSummary> {
    let mut summary = SessionSummary::default();
    writeln!(output, "crmcrew interactive session. Ask about the Creatio CRM data model; type exit to leave.")?;

    loop {
        write!(output, "> ")?;
        output.flush()?;

        let mut buffer = Vec::new();
        if input.read_until(b'\n', &mut buffer)? == 0 {
            break;
        }
        let line = match String::from_utf8(buffer) {
            Ok(line) => line,
            Err(_) => {
                summary.failed += 1;
                let error = ApplicationError::InvalidInput("question is not valid UTF-8".to_string());
                writeln!(output, "{}\n", CommandResult::from_error("ask", error, json).output)?;
                continue;
            }
        };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if EXIT_WORDS.iter().any(|word| question.eq_ignore_ascii_case(word)) {
            break;
        }

        let result = match session.answer(Request::Ask { question: question.to_string() }) {
            Ok(response) => {
                summary.answered += 1;
                render("ask", &response, json)
            }
            Err(error) => {
                summary.failed += 1;
                CommandResult::from_error("ask", error, json)
            }
        };
        writeln!(output, "{}\n", result.output)?;
    }

    writeln!(output, "Goodbye.")?;
    Ok(summary)
}
