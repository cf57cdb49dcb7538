use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dispatch::NodeSettings;
use crate::graph::Context;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub farm: FarmConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a daily file under `directory`.
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "farmspool.submit=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmConfig {
    /// Directory holding the farm submission command.
    #[serde(default)]
    pub command_dir: Option<PathBuf>,

    /// Release script referenced by script-dependency jobs.
    #[serde(default)]
    pub dependency_script_path: Option<String>,

    /// Environment variable carrying each node's log level to the farm.
    #[serde(default = "default_log_level_env")]
    pub log_level_env: String,

    #[serde(default = "default_submit_timeout_secs")]
    pub submit_timeout_secs: u64,
}

fn default_log_level_env() -> String {
    "IECORE_LOG_LEVEL".to_string()
}

fn default_submit_timeout_secs() -> u64 {
    120
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            command_dir: None,
            dependency_script_path: None,
            log_level_env: default_log_level_env(),
            submit_timeout_secs: default_submit_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub job_name: String,

    #[serde(default)]
    pub jobs_directory: Option<PathBuf>,

    #[serde(default)]
    pub script_file: Option<PathBuf>,

    /// Application version the executor plugin should launch.
    #[serde(default)]
    pub plugin_version: Option<String>,

    /// Base context every batch starts from.
    #[serde(default)]
    pub context: Context,

    /// Settings for nodes whose graph entry carries none.
    #[serde(default)]
    pub defaults: NodeSettings,
}
