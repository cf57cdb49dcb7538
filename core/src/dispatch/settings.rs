use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// How a job declares its upstream dependencies to the farm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyMode {
    /// Declare nothing, even when the graph has edges.
    None,
    /// Whole-job dependency.
    Job,
    /// Frame-offset dependency.
    Frame,
    /// Pick between frame and script dependencies from the edge shapes.
    #[default]
    Auto,
    /// Per-task release decided by an external dependency script.
    Script,
}

/// Farm scheduling hints carried by a graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSettings {
    #[serde(default)]
    pub batch_name: String,

    #[serde(default)]
    pub comment: String,

    #[serde(default)]
    pub department: String,

    #[serde(default)]
    pub pool: String,

    #[serde(default)]
    pub secondary_pool: String,

    #[serde(default)]
    pub group: String,

    /// 0-100.
    #[serde(default = "default_priority")]
    pub priority: u32,

    #[serde(default)]
    pub task_timeout_minutes: u32,

    #[serde(default)]
    pub enable_auto_timeout: bool,

    /// 1-16.
    #[serde(default = "default_concurrent_tasks")]
    pub concurrent_tasks: u32,

    #[serde(default)]
    pub threads: u32,

    #[serde(default)]
    pub machine_limit: u32,

    /// Comma separated worker names.
    #[serde(default)]
    pub machine_list: String,

    /// Treat `machine_list` as a deny list instead of an allow list.
    #[serde(default)]
    pub blacklist: bool,

    #[serde(default)]
    pub limit_groups: String,

    #[serde(default = "default_on_job_complete")]
    pub on_job_complete: String,

    #[serde(default)]
    pub submit_suspended: bool,

    #[serde(default)]
    pub dependency_mode: DependencyMode,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub aux_files: Vec<PathBuf>,

    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    #[serde(default)]
    pub extra_environment: BTreeMap<String, String>,

    /// Per-dispatch farm settings, merged over the computed job properties.
    #[serde(default)]
    pub farm_settings: BTreeMap<String, String>,

    /// Explicit overrides, merged last.
    #[serde(default)]
    pub extra_farm_settings: BTreeMap<String, String>,

    #[serde(default)]
    pub name_override: Option<String>,
}

fn default_priority() -> u32 {
    50
}

fn default_concurrent_tasks() -> u32 {
    1
}

fn default_on_job_complete() -> String {
    "Nothing".to_string()
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            batch_name: String::new(),
            comment: String::new(),
            department: String::new(),
            pool: String::new(),
            secondary_pool: String::new(),
            group: String::new(),
            priority: default_priority(),
            task_timeout_minutes: 0,
            enable_auto_timeout: false,
            concurrent_tasks: default_concurrent_tasks(),
            threads: 0,
            machine_limit: 0,
            machine_list: String::new(),
            blacklist: false,
            limit_groups: String::new(),
            on_job_complete: default_on_job_complete(),
            submit_suspended: false,
            dependency_mode: DependencyMode::default(),
            log_level: default_log_level(),
            aux_files: Vec::new(),
            environment: BTreeMap::new(),
            extra_environment: BTreeMap::new(),
            farm_settings: BTreeMap::new(),
            extra_farm_settings: BTreeMap::new(),
            name_override: None,
        }
    }
}

impl NodeSettings {
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.priority > 100 {
            return Err(DispatchError::Configuration(format!(
                "priority {} is outside 0-100",
                self.priority
            )));
        }
        if !(1..=16).contains(&self.concurrent_tasks) {
            return Err(DispatchError::Configuration(format!(
                "concurrent tasks {} is outside 1-16",
                self.concurrent_tasks
            )));
        }
        Ok(())
    }

    pub fn with_dependency_mode(mut self, mode: DependencyMode) -> Self {
        self.dependency_mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_farm_expectations() {
        let settings = NodeSettings::default();
        assert_eq!(settings.priority, 50);
        assert_eq!(settings.concurrent_tasks, 1);
        assert_eq!(settings.on_job_complete, "Nothing");
        assert_eq!(settings.dependency_mode, DependencyMode::Auto);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let settings = NodeSettings {
            priority: 101,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(DispatchError::Configuration(_))
        ));

        let settings = NodeSettings {
            concurrent_tasks: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = NodeSettings {
            concurrent_tasks: 17,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: NodeSettings = toml::from_str(
            r#"
pool = "gpu"
dependency_mode = "script"
"#,
        )
        .unwrap();
        assert_eq!(settings.pool, "gpu");
        assert_eq!(settings.dependency_mode, DependencyMode::Script);
        assert_eq!(settings.priority, 50);
        assert_eq!(settings.log_level, "INFO");
    }
}
