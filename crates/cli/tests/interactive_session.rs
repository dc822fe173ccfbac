use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use crmcrew_agent::LlmClient;
use crmcrew_cli::commands::agent::AgentSession;
use crmcrew_cli::commands::interactive::{run_session, SessionSummary};
use crmcrew_core::config::{ConfigOverrides, LlmConfig, LlmProvider, LoadOptions};

struct EchoClient {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl LlmClient for EchoClient {
    fn provider(&self) -> LlmProvider {
        LlmProvider::Ollama
    }

    async fn complete(&self, _system: &str, prompt: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.contains("explode") {
            return Err(anyhow!("connection reset by peer"));
        }
        Ok("Answer.".to_string())
    }
}

fn session(calls: &Arc<AtomicUsize>) -> AgentSession {
    let calls = Arc::clone(calls);
    let factory = move |_: &LlmConfig| -> anyhow::Result<Box<dyn LlmClient>> {
        Ok(Box::new(EchoClient { calls: Arc::clone(&calls) }))
    };
    let options = LoadOptions {
        overrides: ConfigOverrides { llm_provider: Some(LlmProvider::Ollama), ..ConfigOverrides::default() },
        ..LoadOptions::default()
    };
    AgentSession::open(options, &factory).expect("session opens")
}

#[test]
fn exit_word_ends_the_session() {
    let calls = Arc::new(AtomicUsize::new(0));
    let session = session(&calls);
    let input = Cursor::new("Which table holds contacts?\n\nQUIT\nnever asked\n");
    let mut output = Vec::new();

    let summary = run_session(&session, input, &mut output, false).expect("session runs");

    assert_eq!(summary, SessionSummary { answered: 1, failed: 0 });
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let transcript = String::from_utf8(output).expect("utf-8");
    assert!(transcript.contains("Answer.\n"));
    assert!(transcript.ends_with("Goodbye.\n"));
}

#[test]
fn failed_question_is_reported_and_session_continues() {
    let calls = Arc::new(AtomicUsize::new(0));
    let session = session(&calls);
    let input = Cursor::new("please explode now\nwhat is a lead?\nq\n");
    let mut output = Vec::new();

    let summary = run_session(&session, input, &mut output, false).expect("session runs");

    assert_eq!(summary, SessionSummary { answered: 1, failed: 1 });
    let transcript = String::from_utf8(output).expect("utf-8");
    let error_at = transcript.find("error [provider]: connection reset by peer").expect("error printed");
    let answer_at = transcript.find("Answer.").expect("second question answered");
    assert!(error_at < answer_at);
}

#[test]
fn end_of_input_ends_the_session() {
    let calls = Arc::new(AtomicUsize::new(0));
    let session = session(&calls);
    let mut output = Vec::new();

    let summary =
        run_session(&session, Cursor::new("what is a lead?"), &mut output, false).expect("session runs");

    assert_eq!(summary.answered, 1);
    assert!(String::from_utf8(output).expect("utf-8").ends_with("Goodbye.\n"));
}

#[test]
fn undecodable_line_is_reported_and_session_continues() {
    let calls = Arc::new(AtomicUsize::new(0));
    let session = session(&calls);
    let input = Cursor::new(b"what \xff table?\nWhich table holds contacts?\nexit\n".to_vec());
    let mut output = Vec::new();

    let summary = run_session(&session, input, &mut output, false).expect("session runs");

    assert_eq!(summary, SessionSummary { answered: 1, failed: 1 });
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let transcript = String::from_utf8(output).expect("utf-8");
    assert!(transcript.contains("error [invalid_input]: question is not valid UTF-8"));
    assert!(transcript.contains("Answer.\n"));
    assert!(transcript.ends_with("Goodbye.\n"));
}
