//! Error types for the CLI

use std::path::PathBuf;

use kindling_infra::{PkiError, RenderError};

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Command(#[from] kindling_common::Error),

    #[error("pki error: {0}")]
    Pki(#[from] PkiError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("step '{step}' failed: {message}")]
    Step { step: String, message: String },

    #[error("command failed: {message}")]
    CommandFailed { message: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn command_failed(message: impl Into<String>) -> Self {
        Error::CommandFailed {
            message: message.into(),
        }
    }

    pub fn step(step: impl Into<String>, source: &Error) -> Self {
        Error::Step {
            step: step.into(),
            message: source.to_string(),
        }
    }
}
