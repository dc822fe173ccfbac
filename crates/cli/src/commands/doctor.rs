use crmcrew_agent::prompts::PromptLibrary;
use crmcrew_core::config::{AppConfig, LoadOptions};
use crmcrew_core::knowledge::{KpiLibrary, SchemaCatalog};
use serde::Serialize;

use crate::ClientFactory;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: LoadOptions, factory: &ClientFactory, json_output: bool) -> String {
    let report = build_report(options, factory);

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report(options: LoadOptions, factory: &ClientFactory) -> DoctorReport {
    let mut checks = vec![check_knowledge_base(), check_prompt_templates()];

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_credentials(&config));
            checks.push(check_provider_client(&config, factory));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["credential_readiness", "provider_client"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_knowledge_base() -> DoctorCheck {
    DoctorCheck {
        name: "knowledge_base",
        status: CheckStatus::Pass,
        details: format!(
            "{} entities and {} KPIs compiled in",
            SchemaCatalog.entities().len(),
            KpiLibrary.all().len()
        ),
    }
}

fn check_prompt_templates() -> DoctorCheck {
    match PromptLibrary::new() {
        Ok(_) => DoctorCheck {
            name: "prompt_templates",
            status: CheckStatus::Pass,
            details: "system and task templates parsed".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "prompt_templates",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_credentials(config: &AppConfig) -> DoctorCheck {
    let provider = config.llm.provider;
    let details = match provider.api_key_env() {
        Some(_) if config.llm.has_api_key() => format!("api key present for {provider}"),
        Some(fallback) => {
            return DoctorCheck {
                name: "credential_readiness",
                status: CheckStatus::Fail,
                details: format!("no api key for {provider}; set CRMCREW_LLM_API_KEY or {fallback}"),
            };
        }
        None => format!("{provider} does not require an api key"),
    };

    DoctorCheck { name: "credential_readiness", status: CheckStatus::Pass, details }
}

/// Builds the provider client without sending a request.
fn check_provider_client(config: &AppConfig, factory: &ClientFactory) -> DoctorCheck {
    match factory(&config.llm) {
        Ok(client) => DoctorCheck {
            name: "provider_client",
            status: CheckStatus::Pass,
            details: format!(
                "{} client ready for model `{}` at {}",
                client.provider(),
                config.llm.model,
                config.llm.endpoint()
            ),
        },
        Err(error) => DoctorCheck {
            name: "provider_client",
            status: CheckStatus::Fail,
            details: format!("{error:#}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
