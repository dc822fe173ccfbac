use crmcrew_agent::{AgentRole, Orchestrator, Request, Response};
use crmcrew_core::config::{AppConfig, LoadOptions};
use crmcrew_core::errors::ApplicationError;
use serde::Serialize;
use tokio::runtime::{Builder, Runtime};
use tracing::{info, warn};

use crate::commands::{to_json, CommandResult};
use crate::ClientFactory;

/// A configured orchestrator plus the runtime that drives it. One session
/// serves a single command, or every question of an interactive run.
pub struct AgentSession {
    orchestrator: Orchestrator,
    runtime: Runtime,
}

impl AgentSession {
    pub fn open(options: LoadOptions, factory: &ClientFactory) -> Result<Self, ApplicationError> {
        let config = AppConfig::load(options)?;
        let client = factory(&config.llm)
            .map_err(|error| ApplicationError::Configuration(format!("{error:#}")))?;
        let orchestrator = Orchestrator::new(client)?;
        let runtime = Builder::new_current_thread().enable_all().build().map_err(|error| {
            ApplicationError::Internal(format!("failed to initialize async runtime: {error}"))
        })?;

        info!(
            event_name = "cli.session.opened",
            provider = config.llm.provider.as_str(),
            model = %config.llm.model,
            "agent session ready"
        );
        Ok(Self { orchestrator, runtime })
    }

    pub fn answer(&self, request: Request) -> Result<Response, ApplicationError> {
        let operation = request.operation();
        self.runtime.block_on(self.orchestrator.execute(request)).map_err(|error| {
            warn!(event_name = "cli.request.failed", operation, error = %error, "request failed");
            ApplicationError::from(error)
        })
    }
}

#[derive(Serialize)]
struct ResponseOutcome<'a> {
    command: &'a str,
    status: &'static str,
    role: AgentRole,
    lookups: &'a [&'static str],
    text: &'a str,
}

pub fn run(request: Request, options: LoadOptions, factory: &ClientFactory, json: bool) -> CommandResult {
    let command = request.operation();
    let result = AgentSession::open(options, factory).and_then(|session| session.answer(request));

    match result {
        Ok(response) => render(command, &response, json),
        Err(error) => CommandResult::from_error(command, error, json),
    }
}

pub(crate) fn render(command: &str, response: &Response, json: bool) -> CommandResult {
    if json {
        return to_json(
            command,
            &ResponseOutcome {
                command,
                status: "ok",
                role: response.role,
                lookups: &response.lookups,
                text: &response.text,
            },
        );
    }
    CommandResult::text(response.text.clone())
}
