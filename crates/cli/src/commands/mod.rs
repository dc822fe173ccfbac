pub mod agent;
pub mod config;
pub mod doctor;
pub mod interactive;
pub mod kb;

use crmcrew_core::errors::{ApplicationError, InterfaceError};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<String>,
}

impl CommandResult {
    /// Plain output for a successful command.
    pub fn text(output: impl Into<String>) -> Self {
        Self { exit_code: 0, output: output.into() }
    }

    /// Renders a classified failure, as a JSON outcome or as human text.
    pub fn from_error(command: &str, error: ApplicationError, json: bool) -> Self {
        let interface = InterfaceError::from(error);
        let suggestion = match &interface {
            InterfaceError::NotFound { suggestion, .. } => Some(suggestion.clone()),
            _ => None,
        };

        let output = if json {
            serialize_payload(CommandOutcome {
                command: command.to_string(),
                status: "error".to_string(),
                error_class: Some(interface.error_class().to_string()),
                message: interface.detail().to_string(),
                suggestion,
            })
        } else {
            let mut lines = vec![
                format!("error [{}]: {}", interface.error_class(), interface.detail()),
                interface.user_message().to_string(),
            ];
            lines.extend(suggestion);
            lines.join("\n")
        };

        Self { exit_code: interface.exit_code(), output }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Pretty JSON for `--json` output of successful commands.
pub(crate) fn to_json<T: Serialize>(command: &str, value: &T) -> CommandResult {
    match serde_json::to_string_pretty(value) {
        Ok(output) => CommandResult::text(output),
        Err(error) => CommandResult::from_error(
            command,
            ApplicationError::Internal(format!("could not serialize output: {error}")),
            true,
        ),
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

#[cfg(test)]
mod tests {
    use crmcrew_core::errors::ApplicationError;
    use crmcrew_core::knowledge::{KnowledgeTable, KpiLibrary};
    use serde_json::Value;

    use super::CommandResult;

    #[test]
    fn json_failure_carries_class_and_suggestion() {
        let miss = KpiLibrary.not_found("sales.velocity");
        let result = CommandResult::from_error("kb kpi", ApplicationError::from(miss), true);

        assert_eq!(result.exit_code, 4);
        let payload: Value = serde_json::from_str(&result.output).expect("json outcome");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "not_found");
        assert!(payload["suggestion"].as_str().expect("suggestion").contains("sales.win_rate"));
    }

    #[test]
    fn human_failure_leads_with_the_detail() {
        let result = CommandResult::from_error(
            "ask",
            ApplicationError::Provider("Anthropic API error 529: overloaded".to_string()),
            false,
        );

        assert_eq!(result.exit_code, 3);
        assert!(result.output.starts_with("error [provider]: Anthropic API error 529: overloaded"));
        assert!(!result.is_success());
    }

    #[test]
    fn internal_failure_stays_plain_text_without_json_flag() {
        let result = CommandResult::from_error(
            "interactive",
            ApplicationError::Internal("broken pipe".to_string()),
            false,
        );

        assert_eq!(result.exit_code, 1);
        assert!(result.output.starts_with("error [internal]: broken pipe"));
        assert!(serde_json::from_str::<Value>(&result.output).is_err());
    }
}
