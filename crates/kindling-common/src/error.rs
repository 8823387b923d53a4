//! Error types for external tool invocation
//!
//! Every failure carries the program and arguments that produced it so a
//! failed step can be reproduced by hand.

use thiserror::Error;

/// Main error type for kindling tool operations
#[derive(Debug, Error)]
pub enum Error {
    /// An external command ran but exited unsuccessfully
    #[error("`{program} {args}` failed (exit code {exit}): {stderr}", exit = display_code(.code))]
    CommandFailed {
        /// Program that was executed (e.g. "kubectl")
        program: String,
        /// Space-joined arguments
        args: String,
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Captured standard error, trimmed
        stderr: String,
    },

    /// An external command could not be started at all
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        /// Program that could not be spawned
        program: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Invalid input (subnet, name, port, ...)
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
    },

    /// A polled condition did not become true in time
    #[error("timeout waiting for {description}")]
    Timeout {
        /// What was being waited for
        description: String,
    },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string())
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(description: impl Into<String>) -> Self {
        Error::Timeout {
            description: description.into(),
        }
    }
}
