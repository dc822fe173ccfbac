use crmcrew_core::config::{AppConfig, LoadOptions, LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

/// Logging settings from the config layers, or defaults when the logging
/// section itself does not load. Commands report config failures themselves.
pub fn settings(options: &LoadOptions) -> LoggingConfig {
    AppConfig::load_logging(options).unwrap_or_else(|_| AppConfig::default().logging)
}

pub fn effective_level(configured: &str, verbosity: Verbosity) -> &str {
    match verbosity {
        Verbosity::Quiet => "warn",
        Verbosity::Verbose => "debug",
        Verbosity::Normal => configured,
    }
}

/// Installs the global subscriber. Logs go to stderr so stdout carries only
/// command output.
pub fn init(settings: &LoggingConfig, verbosity: Verbosity) {
    let level = effective_level(&settings.level, verbosity);
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match settings.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}
