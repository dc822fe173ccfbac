use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crmcrew_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use crmcrew_core::errors::ApplicationError;
use serde::Serialize;
use toml::Value;

use crate::commands::{to_json, CommandResult};

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

pub fn run(options: LoadOptions, json: bool) -> CommandResult {
    let explicit_path = options.config_path.clone();
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::from_error("config", ApplicationError::from(error), json);
        }
    };

    let file_path = detect_config_path(explicit_path.as_deref());
    let file_doc = load_config_file_doc(file_path.as_deref());
    let sources = Sources { file_doc: file_doc.as_ref(), file_path: file_path.as_deref() };
    let summary = config.summary();

    let key_fallback = config.llm.provider.api_key_env();
    let entries = vec![
        sources.entry("llm.provider", summary.llm_provider.to_string(), &["CRMCREW_LLM_PROVIDER"]),
        sources.entry("llm.model", summary.llm_model, &["CRMCREW_LLM_MODEL"]),
        sources.entry("llm.base_url", summary.llm_endpoint, &["CRMCREW_LLM_BASE_URL"]),
        sources.api_key_entry(summary.llm_api_key, key_fallback),
        sources.entry(
            "llm.temperature",
            summary.llm_temperature.to_string(),
            &["CRMCREW_LLM_TEMPERATURE"],
        ),
        sources.entry(
            "llm.max_tokens",
            summary.llm_max_tokens.to_string(),
            &["CRMCREW_LLM_MAX_TOKENS"],
        ),
        sources.entry(
            "llm.timeout_secs",
            summary.llm_timeout_secs.to_string(),
            &["CRMCREW_LLM_TIMEOUT_SECS"],
        ),
        sources.entry(
            "logging.level",
            summary.logging_level,
            &["CRMCREW_LOGGING_LEVEL", "CRMCREW_LOG_LEVEL"],
        ),
        sources.entry(
            "logging.format",
            summary.logging_format.to_string(),
            &["CRMCREW_LOGGING_FORMAT", "CRMCREW_LOG_FORMAT"],
        ),
    ];

    if json {
        return to_json("config", &entries);
    }

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        entries
            .iter()
            .map(|entry| format!("- {} = {} (source: {})", entry.key, entry.value, entry.source)),
    );
    CommandResult::text(lines.join("\n"))
}

struct Sources<'a> {
    file_doc: Option<&'a Value>,
    file_path: Option<&'a Path>,
}

impl Sources<'_> {
    fn entry(&self, key: &'static str, value: String, env_keys: &[&str]) -> ConfigEntry {
        ConfigEntry { key, value, source: self.field_source(key, env_keys) }
    }

    /// The key may also come from the provider's own variable, which only
    /// applies when neither env nor file set one.
    fn api_key_entry(&self, value: &'static str, fallback: Option<&'static str>) -> ConfigEntry {
        let mut source = self.field_source("llm.api_key", &["CRMCREW_LLM_API_KEY"]);
        if source == "default" {
            if let Some(fallback) = fallback.filter(|name| env::var_os(name).is_some()) {
                source = format!("env ({fallback})");
            }
        }
        ConfigEntry { key: "llm.api_key", value: value.to_string(), source }
    }

    fn field_source(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|name| env::var_os(name).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = self.file_doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .file_path
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::contains_path;

    #[test]
    fn nested_keys_are_found_in_file_document() {
        let doc: Value = "[llm]\nmodel = \"gpt-4o-mini\"\n".parse().expect("toml");

        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.api_key"));
        assert!(!contains_path(&doc, "logging.level"));
    }
}
