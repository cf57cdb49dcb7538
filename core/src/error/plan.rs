use thiserror::Error;

use super::ErrorCode;

/// Errors raised while expanding a node graph description into batches.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("failed to parse graph description: {0}")]
    Parse(String),

    #[error("duplicate node '{0}'")]
    DuplicateNode(String),

    #[error("unknown node '{0}'")]
    UnknownNode(String),

    #[error("node '{node}' references unknown input '{input}'")]
    UnknownInput { node: String, input: String },

    #[error("node '{node}' is missing its {field}")]
    MissingField { node: String, field: &'static str },

    #[error("node '{node}': batch size must be at least 1")]
    InvalidBatchSize { node: String },

    #[error("circular node graph: {0}")]
    CircularGraph(String),

    #[error("invalid frame list '{0}'")]
    InvalidFrameList(String),
}

impl PlanError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Parse(_) | Self::MissingField { .. } | Self::InvalidBatchSize { .. } => {
                ErrorCode::ConfigInvalid
            }
            Self::DuplicateNode(_) | Self::UnknownNode(_) | Self::UnknownInput { .. } => {
                ErrorCode::UnknownNode
            }
            Self::CircularGraph(_) => ErrorCode::CircularDependency,
            Self::InvalidFrameList(_) => ErrorCode::InvalidFrameRange,
        }
    }
}
