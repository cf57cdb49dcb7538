use std::path::PathBuf;

use thiserror::Error;

use super::{ErrorCode, GatewayError};

/// A frame range or frame list that cannot describe a farm task.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidRangeError {
    #[error("end frame {end} precedes start frame {start}")]
    Inverted { start: i64, end: i64 },

    #[error("frame {0} is not an integer")]
    NonIntegral(f64),

    #[error("frames {previous} and {next} are not sequential")]
    NotSequential { previous: i64, next: i64 },

    #[error("frame range {start}-{end} spans more frames than fit in a frame number")]
    TooWide { start: i64, end: i64 },
}

/// Everything that can abort a dispatch.
///
/// Errors are never retried; the first one ends the dispatch and jobs that
/// already reached the farm stay there.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("invalid frame range: {0}")]
    InvalidRange(#[from] InvalidRangeError),

    #[error("graph consistency: {0}")]
    GraphConsistency(String),

    #[error("job '{job}' references missing auxiliary file {}", path.display())]
    MissingAuxFile { job: String, path: PathBuf },

    #[error("farm rejected job '{job}': {output}")]
    SubmissionFailure { job: String, output: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("failed to write property files for job '{job}': {source}")]
    Io {
        job: String,
        source: std::io::Error,
    },
}

impl DispatchError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidRange(_) => ErrorCode::InvalidFrameRange,
            Self::GraphConsistency(msg) if msg.starts_with("dependency cycle") => {
                ErrorCode::CircularDependency
            }
            Self::GraphConsistency(_) => ErrorCode::GraphConsistency,
            Self::MissingAuxFile { .. } => ErrorCode::MissingAuxFile,
            Self::SubmissionFailure { .. } => ErrorCode::SubmissionFailed,
            Self::Configuration(_) => ErrorCode::ConfigMissing,
            Self::Gateway(e) => e.error_code(),
            Self::Io { .. } => ErrorCode::PropertyFileIo,
        }
    }

    pub(crate) fn consistency(msg: impl Into<String>) -> Self {
        Self::GraphConsistency(msg.into())
    }
}
