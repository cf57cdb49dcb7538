use std::path::PathBuf;

use thiserror::Error;

use super::ErrorCode;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot determine home directory")]
    NoHomeDirectory,

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid setting: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NoHomeDirectory => ErrorCode::ConfigMissing,
            Self::Read { .. } => ErrorCode::ConfigMissing,
            Self::Parse { .. } | Self::Invalid(_) => ErrorCode::ConfigInvalid,
        }
    }
}
