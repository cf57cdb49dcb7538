use std::path::{Path, PathBuf};

use super::types::AppConfig;
use crate::error::ConfigError;

pub const LOCAL_CONFIG: &str = "farmspool.toml";

/// ~/.farmspool
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| ConfigError::NoHomeDirectory)?;
    Ok(PathBuf::from(home).join(".farmspool"))
}

pub fn load_from_path(path: &Path) -> Result<AppConfig, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str::<AppConfig>(&s).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads the first config file found and applies environment overrides.
pub fn load_default() -> Result<AppConfig, ConfigError> {
    // Priority 1: ~/.farmspool/config.toml
    let user_config = data_dir()?.join("config.toml");
    // Priority 2: ./farmspool.toml
    let local_config = Path::new(LOCAL_CONFIG);

    let mut cfg = if user_config.exists() {
        load_from_path(&user_config)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };

    apply_overrides(&mut cfg, |key| std::env::var(key).ok());
    tracing::debug!(
        command_dir = ?cfg.farm.command_dir,
        jobs_directory = ?cfg.dispatch.jobs_directory,
        "configuration loaded"
    );
    Ok(cfg)
}

/// Environment overrides win over every file. Blank values are ignored.
pub fn apply_overrides<F>(cfg: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = var("DEADLINE_PATH") {
        cfg.farm.command_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = var("DEADLINE_DEPENDENCY_SCRIPT_PATH") {
        cfg.farm.dependency_script_path = Some(v);
    }
    if let Some(v) = var("FARMSPOOL_JOBS_DIR") {
        cfg.dispatch.jobs_directory = Some(PathBuf::from(v));
    }
    if let Some(v) = var("FARMSPOOL_LOG_LEVEL") {
        cfg.logging.level = v;
    }
}
