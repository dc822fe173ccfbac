use thiserror::Error;

use crate::config::ConfigError;
use crate::knowledge::NotFound;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("{}", .0.message())]
    NotFound(NotFound),
    #[error("model provider failure: {0}")]
    Provider(String),
    #[error("prompt rendering failure: {0}")]
    Template(String),
    #[error("internal failure: {0}")]
    Internal(String),
}

impl From<ConfigError> for ApplicationError {
    fn from(value: ConfigError) -> Self {
        Self::Configuration(value.to_string())
    }
}

impl From<NotFound> for ApplicationError {
    fn from(value: NotFound) -> Self {
        Self::NotFound(value)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String },
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },
    #[error("not found: {message}")]
    NotFound { message: String, suggestion: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String },
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::InvalidConfiguration { .. } => {
                "The configuration is invalid. Run `crmcrew doctor` for details."
            }
            Self::NotFound { .. } => "The requested record is not in the knowledge base.",
            Self::ServiceUnavailable { .. } => "The model provider call failed. Nothing was retried.",
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "invalid_input",
            Self::InvalidConfiguration { .. } => "configuration",
            Self::NotFound { .. } => "not_found",
            Self::ServiceUnavailable { .. } => "provider",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::BadRequest { .. } | Self::InvalidConfiguration { .. } => 2,
            Self::ServiceUnavailable { .. } => 3,
            Self::NotFound { .. } => 4,
            Self::Internal { .. } => 1,
        }
    }

    /// Detail message carried by the error, as opposed to the generic user message.
    pub fn detail(&self) -> &str {
        match self {
            Self::BadRequest { message }
            | Self::InvalidConfiguration { message }
            | Self::NotFound { message, .. }
            | Self::ServiceUnavailable { message }
            | Self::Internal { message } => message,
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::InvalidInput(message) => Self::BadRequest { message },
            ApplicationError::Configuration(message) => Self::InvalidConfiguration { message },
            ApplicationError::NotFound(miss) => {
                Self::NotFound { message: miss.message(), suggestion: miss.suggestion() }
            }
            ApplicationError::Provider(message) => Self::ServiceUnavailable { message },
            ApplicationError::Template(message) | ApplicationError::Internal(message) => {
                Self::Internal { message }
            }
        }
    }
}
