use thiserror::Error;

use super::ErrorCode;

/// Failures talking to the farm's command-line tooling.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("gateway configuration: {0}")]
    Configuration(String),

    #[error("failed to launch {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{command} failed: {output}")]
    CommandFailed { command: String, output: String },

    #[error("{command} timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },
}

impl GatewayError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Configuration(_) => ErrorCode::ConfigMissing,
            Self::Spawn { .. } => ErrorCode::GatewayUnavailable,
            Self::CommandFailed { .. } => ErrorCode::GatewayCommandFailed,
            Self::Timeout { .. } => ErrorCode::GatewayTimeout,
        }
    }
}
