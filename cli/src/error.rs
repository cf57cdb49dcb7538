use farmspool_core::error::{ConfigError, DispatchError, GatewayError, PlanError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("graph error: {0}")]
    Plan(#[from] PlanError),
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

/// 0 success, 1 generic failure, 2 configuration, 3 graph, 4 submission.
pub fn exit_code_for_error(e: &CliError) -> i32 {
    match e {
        CliError::Config(_) => 2,
        CliError::Plan(_) => 3,
        CliError::Dispatch(de) => {
            let code = de.error_code();
            if code.is_config() {
                2
            } else if code.is_graph() {
                3
            } else {
                4
            }
        }
        CliError::Anyhow(err) => match err.downcast_ref::<GatewayError>() {
            Some(ge) if ge.error_code().is_config() => 2,
            _ => 1,
        },
        CliError::Command(_) | CliError::Io(_) => 1,
    }
}
