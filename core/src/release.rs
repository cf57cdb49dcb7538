//! Per-task release decisions for jobs submitted with script dependencies.
//!
//! Script-mode jobs carry one `ExtraInfoKeyValueN=<task>:<job>=<upstream task>`
//! entry per dependency edge. After every upstream task completes, the farm
//! asks which pending tasks may start.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref EDGE_KEY: Regex = Regex::new(r"^([0-9]+):([A-Za-z0-9_-]+)$").expect("EDGE_KEY is valid");
    static ref EXTRA_INFO_KEY: Regex =
        Regex::new(r"^ExtraInfoKeyValue([0-9]+)$").expect("EXTRA_INFO_KEY is valid");
}

/// One script dependency edge, in farm task indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScriptDependency {
    pub task: u32,
    pub upstream_job: String,
    pub upstream_task: u32,
}

impl ScriptDependency {
    /// Reads a `<task>:<job>` key with an `<upstream task>` value.
    pub fn from_key_value(key: &str, value: &str) -> Option<Self> {
        let caps = EDGE_KEY.captures(key.trim())?;
        Some(Self {
            task: caps[1].parse().ok()?,
            upstream_job: caps[2].to_string(),
            upstream_task: value.trim().parse().ok()?,
        })
    }

    /// Reads `<task>:<job>=<upstream task>`.
    pub fn parse(entry: &str) -> Option<Self> {
        let (key, value) = entry.split_once('=')?;
        Self::from_key_value(key, value)
    }
}

impl fmt::Display for ScriptDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}={}", self.task, self.upstream_job, self.upstream_task)
    }
}

/// Script dependencies found in a job property map, in index order.
/// Entries that do not parse are skipped.
pub fn script_dependencies_from_properties<'a>(
    properties: impl IntoIterator<Item = (&'a String, &'a String)>,
) -> Vec<ScriptDependency> {
    let mut indexed: Vec<(u32, ScriptDependency)> = properties
        .into_iter()
        .filter_map(|(key, value)| {
            let index = EXTRA_INFO_KEY.captures(key)?[1].parse().ok()?;
            Some((index, ScriptDependency::parse(value)?))
        })
        .collect();
    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, dep)| dep).collect()
}

/// Completion state of upstream jobs.
pub trait UpstreamStatus {
    /// Completed task indices, or `None` when the job no longer exists.
    fn completed_tasks(&self, job_id: &str) -> Option<HashSet<u32>>;
}

impl UpstreamStatus for HashMap<String, HashSet<u32>> {
    fn completed_tasks(&self, job_id: &str) -> Option<HashSet<u32>> {
        self.get(job_id).cloned()
    }
}

impl UpstreamStatus for BTreeMap<String, Vec<u32>> {
    fn completed_tasks(&self, job_id: &str) -> Option<HashSet<u32>> {
        self.get(job_id).map(|tasks| tasks.iter().copied().collect())
    }
}

/// Pending tasks whose upstream tasks have all completed. A deleted upstream
/// job releases its dependents, and a task with no edges is released.
pub fn released_tasks(
    pending: &[u32],
    dependencies: &[ScriptDependency],
    status: &impl UpstreamStatus,
) -> Vec<u32> {
    let mut cache: HashMap<&str, Option<HashSet<u32>>> = HashMap::new();
    let mut released = Vec::new();

    for &task in pending {
        let ready = dependencies.iter().filter(|d| d.task == task).all(|dep| {
            let completed = cache
                .entry(dep.upstream_job.as_str())
                .or_insert_with(|| status.completed_tasks(&dep.upstream_job));
            match completed {
                Some(done) => done.contains(&dep.upstream_task),
                None => true,
            }
        });
        if ready {
            released.push(task);
        }
    }

    tracing::debug!(
        target: "farmspool.release",
        pending = pending.len(),
        released = released.len(),
        "evaluated script dependencies"
    );
    released
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(task: u32, job: &str, upstream: u32) -> ScriptDependency {
        ScriptDependency {
            task,
            upstream_job: job.to_string(),
            upstream_task: upstream,
        }
    }

    #[test]
    fn test_parse_and_display() {
        let parsed = ScriptDependency::parse("3:5f2a9c=7").unwrap();
        assert_eq!(parsed, dep(3, "5f2a9c", 7));
        assert_eq!(parsed.to_string(), "3:5f2a9c=7");

        assert_eq!(ScriptDependency::parse("3:5f2a9c"), None);
        assert_eq!(ScriptDependency::parse("x:5f2a9c=1"), None);
        assert_eq!(ScriptDependency::parse("1:job=two"), None);
    }

    #[test]
    fn test_properties_are_read_in_index_order() {
        let mut props = BTreeMap::new();
        props.insert("ExtraInfoKeyValue10".to_string(), "10:a=0".to_string());
        props.insert("ExtraInfoKeyValue2".to_string(), "2:a=0".to_string());
        props.insert("ExtraInfoKeyValue0".to_string(), "0:a=0".to_string());
        props.insert("Name".to_string(), "shot.render".to_string());

        let tasks: Vec<u32> = script_dependencies_from_properties(&props)
            .into_iter()
            .map(|d| d.task)
            .collect();
        assert_eq!(tasks, vec![0, 2, 10]);
    }

    #[test]
    fn test_release_waits_for_every_upstream_task() {
        let deps = vec![dep(0, "a", 0), dep(0, "a", 1), dep(1, "a", 2), dep(2, "b", 0)];
        let mut status: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        status.insert("a".into(), vec![0, 2]);
        status.insert("b".into(), vec![]);

        assert_eq!(released_tasks(&[0, 1, 2], &deps, &status), vec![1]);

        status.insert("a".into(), vec![0, 1, 2]);
        assert_eq!(released_tasks(&[0, 1, 2], &deps, &status), vec![0, 1]);
    }

    #[test]
    fn test_missing_upstream_and_unlinked_tasks_are_released() {
        let deps = vec![dep(0, "gone", 4)];
        let status: HashMap<String, HashSet<u32>> = HashMap::new();
        assert_eq!(released_tasks(&[0, 5], &deps, &status), vec![0, 5]);
    }
}
