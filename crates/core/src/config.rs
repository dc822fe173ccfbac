use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "crmcrew.toml";
const ENV_PREFIX: &str = "CRMCREW_";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_temperature: Option<f32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: None,
                model: "gpt-4o".to_string(),
                temperature: 0.7,
                max_tokens: 4096,
                timeout_secs: 60,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Ollama => "http://localhost:11434",
        }
    }

    /// Provider-native variable consulted when no key is configured.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Ollama => None,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        self.api_key_env().is_some()
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl LlmConfig {
    pub fn endpoint(&self) -> &str {
        self.base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .unwrap_or_else(|| self.provider.default_base_url())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty())
    }
}

/// Printable view of the effective configuration. The API key is reduced to
/// whether it is set.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConfigSummary {
    pub llm_provider: &'static str,
    pub llm_model: String,
    pub llm_endpoint: String,
    pub llm_api_key: &'static str,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub llm_timeout_secs: u64,
    pub logging_level: String,
    pub logging_format: &'static str,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(&options)?;
        config.apply_llm_env()?;
        config.apply_logging_env()?;
        config.apply_overrides(options.overrides);
        config.apply_provider_key_fallback();
        config.validate()?;

        Ok(config)
    }

    /// Resolves only the logging section through the same layers. Provider
    /// settings are neither read from the environment nor validated, so a
    /// missing API key does not discard the configured log format.
    pub fn load_logging(options: &LoadOptions) -> Result<LoggingConfig, ConfigError> {
        let mut config = Self::from_file(options)?;
        config.apply_logging_env()?;
        config.apply_overrides(options.overrides.clone());
        validate_logging(&config.logging)?;

        Ok(config.logging)
    }

    fn from_file(options: &LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = resolve_config_path(options.config_path.as_deref()) {
            config.apply_patch(read_patch(&path)?);
        } else if options.require_file || options.config_path.is_some() {
            let expected = options
                .config_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        Ok(config)
    }

    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            llm_provider: self.llm.provider.as_str(),
            llm_model: self.llm.model.clone(),
            llm_endpoint: self.llm.endpoint().to_string(),
            llm_api_key: if self.llm.has_api_key() { "<redacted>" } else { "<unset>" },
            llm_temperature: self.llm.temperature,
            llm_max_tokens: self.llm.max_tokens,
            llm_timeout_secs: self.llm.timeout_secs,
            logging_level: self.logging.level.clone(),
            logging_format: self.logging.format.as_str(),
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_llm_env(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_prefixed("LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_prefixed("LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_prefixed("LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_prefixed("LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_prefixed("LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("CRMCREW_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_prefixed("LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("CRMCREW_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_prefixed("LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("CRMCREW_LLM_TIMEOUT_SECS", &value)?;
        }

        Ok(())
    }

    fn apply_logging_env(&mut self) -> Result<(), ConfigError> {
        let log_level = read_prefixed("LOGGING_LEVEL").or_else(|| read_prefixed("LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_prefixed("LOGGING_FORMAT").or_else(|| read_prefixed("LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(llm_temperature) = overrides.llm_temperature {
            self.llm.temperature = llm_temperature;
        }
    }

    fn apply_provider_key_fallback(&mut self) {
        if self.llm.has_api_key() {
            return;
        }
        if let Some(value) = self.llm.provider.api_key_env().and_then(read_env) {
            self.llm.api_key = Some(secret_value(value));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if !llm.temperature.is_finite() || !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if let Some(fallback) = llm.provider.api_key_env() {
        if !llm.has_api_key() {
            return Err(ConfigError::Validation(format!(
                "llm.api_key is required for the {} provider (set {ENV_PREFIX}LLM_API_KEY or {fallback})",
                llm.provider
            )));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_prefixed(key: &str) -> Option<String> {
    read_env(&format!("{ENV_PREFIX}{key}"))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const TOUCHED_VARS: &[&str] = &[
        "OPENAI_API_KEY",
        "ANTHROPIC_API_KEY",
        "CRMCREW_LLM_PROVIDER",
        "CRMCREW_LLM_API_KEY",
        "CRMCREW_LLM_MODEL",
        "CRMCREW_LLM_TEMPERATURE",
        "CRMCREW_LLM_TIMEOUT_SECS",
        "CRMCREW_LOG_LEVEL",
        "CRMCREW_LOG_FORMAT",
        "TEST_CRMCREW_KEY",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    fn with_clean_env(
        setup: &[(&str, &str)],
        body: impl FnOnce() -> Result<(), String>,
    ) -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(TOUCHED_VARS);
        for (key, value) in setup {
            env::set_var(key, value);
        }
        let result = body();
        clear_vars(TOUCHED_VARS);
        result
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        with_clean_env(&[("TEST_CRMCREW_KEY", "sk-from-env")], || {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("crmcrew.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "anthropic"
api_key = "${TEST_CRMCREW_KEY}"
model = "claude-sonnet"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.provider == LlmProvider::Anthropic, "provider should come from file")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be interpolated from environment",
            )?;
            ensure(config.llm.endpoint() == "https://api.anthropic.com/v1", "anthropic endpoint")
        })
    }

    #[test]
    fn unterminated_interpolation_is_rejected() -> Result<(), String> {
        with_clean_env(&[], || {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("crmcrew.toml");
            fs::write(&path, "[llm]\napi_key = \"${OOPS\"\n").map_err(|err| err.to_string())?;

            let error =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() });
            ensure(
                matches!(error, Err(ConfigError::UnterminatedInterpolation)),
                "open interpolation should fail",
            )
        })
    }

    #[test]
    fn logging_layers_load_without_provider_credentials() -> Result<(), String> {
        with_clean_env(&[("CRMCREW_LOG_LEVEL", "debug")], || {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("crmcrew.toml");
            fs::write(&path, "[logging]\nformat = \"json\"\n").map_err(|err| err.to_string())?;
            let options = LoadOptions { config_path: Some(path), ..LoadOptions::default() };

            ensure(
                matches!(AppConfig::load(options.clone()), Err(ConfigError::Validation(_))),
                "full load should still demand an api key",
            )?;
            let logging = AppConfig::load_logging(&options)
                .map_err(|err| format!("logging load failed: {err}"))?;
            ensure(logging.format == LogFormat::Json, "format should come from file")?;
            ensure(logging.level == "debug", "level should come from environment")
        })
    }

    #[test]
    fn logging_load_ignores_bad_provider_environment() -> Result<(), String> {
        with_clean_env(&[("CRMCREW_LLM_TEMPERATURE", "hot"), ("CRMCREW_LOG_FORMAT", "pretty")], || {
            let logging = AppConfig::load_logging(&LoadOptions::default())
                .map_err(|err| format!("logging load failed: {err}"))?;
            ensure(logging.format == LogFormat::Pretty, "format should come from environment")
        })
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() -> Result<(), String> {
        with_clean_env(&[("OPENAI_API_KEY", "sk-test")], || {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let result = AppConfig::load(LoadOptions {
                config_path: Some(dir.path().join("absent.toml")),
                ..LoadOptions::default()
            });
            ensure(
                matches!(result, Err(ConfigError::MissingConfigFile(_))),
                "explicit path that does not exist should fail",
            )
        })
    }

    #[test]
    fn provider_native_key_is_used_as_fallback() -> Result<(), String> {
        with_clean_env(&[("OPENAI_API_KEY", "sk-native")], || {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.llm.provider == LlmProvider::OpenAi, "openai is the default provider")?;
            ensure(config.llm.model == "gpt-4o", "gpt-4o is the default model")?;
            ensure(config.llm.has_api_key(), "OPENAI_API_KEY should be picked up")
        })
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        with_clean_env(
            &[
                ("CRMCREW_LLM_API_KEY", "sk-test"),
                ("CRMCREW_LOG_LEVEL", "warn"),
                ("CRMCREW_LOG_FORMAT", "pretty"),
            ],
            || {
                let config = AppConfig::load(LoadOptions::default())
                    .map_err(|err| format!("config load failed: {err}"))?;

                ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
                ensure(
                    matches!(config.logging.format, LogFormat::Pretty),
                    "pretty logging format should be set from env var",
                )
            },
        )
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        with_clean_env(
            &[("CRMCREW_LLM_MODEL", "gpt-4o-mini"), ("CRMCREW_LLM_TEMPERATURE", "0.2")],
            || {
                let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
                let path = dir.path().join("crmcrew.toml");
                fs::write(
                    &path,
                    r#"
[llm]
api_key = "sk-from-file"
model = "gpt-4-turbo"
temperature = 1.5
max_tokens = 2048

[logging]
level = "warn"
"#,
                )
                .map_err(|err| err.to_string())?;

                let config = AppConfig::load(LoadOptions {
                    config_path: Some(path),
                    overrides: ConfigOverrides {
                        log_level: Some("debug".to_string()),
                        llm_model: Some("gpt-4.1".to_string()),
                        ..ConfigOverrides::default()
                    },
                    ..LoadOptions::default()
                })
                .map_err(|err| format!("config load failed: {err}"))?;

                ensure(config.llm.model == "gpt-4.1", "override model should win")?;
                ensure(config.logging.level == "debug", "overridden log level should be debug")?;
                ensure(
                    (config.llm.temperature - 0.2).abs() < f32::EPSILON,
                    "env temperature should win over file",
                )?;
                ensure(config.llm.max_tokens == 2048, "file max_tokens should win over defaults")
            },
        )
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        with_clean_env(&[], || {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message)
                    if message.contains("llm.api_key") && message.contains("OPENAI_API_KEY")
            );
            ensure(has_message, "validation failure should mention llm.api_key and its fallback")
        })
    }

    #[test]
    fn invalid_numeric_override_is_reported() -> Result<(), String> {
        with_clean_env(&[("CRMCREW_LLM_API_KEY", "sk"), ("CRMCREW_LLM_TIMEOUT_SECS", "soon")], || {
            let result = AppConfig::load(LoadOptions::default());
            ensure(
                matches!(
                    result,
                    Err(ConfigError::InvalidEnvOverride { ref key, .. }) if key == "CRMCREW_LLM_TIMEOUT_SECS"
                ),
                "non-numeric timeout should be rejected",
            )
        })
    }

    #[test]
    fn out_of_range_temperature_is_rejected() -> Result<(), String> {
        with_clean_env(&[("CRMCREW_LLM_API_KEY", "sk"), ("CRMCREW_LLM_TEMPERATURE", "3.5")], || {
            let result = AppConfig::load(LoadOptions::default());
            ensure(
                matches!(result, Err(ConfigError::Validation(ref message)) if message.contains("temperature")),
                "temperature above 2.0 should fail validation",
            )
        })
    }

    #[test]
    fn ollama_needs_no_api_key() -> Result<(), String> {
        with_clean_env(&[("CRMCREW_LLM_PROVIDER", "ollama")], || {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.llm.endpoint() == "http://localhost:11434", "ollama default endpoint")
        })
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug_or_summary() -> Result<(), String> {
        with_clean_env(&[("CRMCREW_LLM_API_KEY", "sk-secret-value")], || {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");
            let summary = format!("{:?}", config.summary());

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(!summary.contains("sk-secret-value"), "summary should not contain api key")?;
            ensure(config.summary().llm_api_key == "<redacted>", "summary should mark key as set")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )
        })
    }
}
