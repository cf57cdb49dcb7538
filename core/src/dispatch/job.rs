use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;

use sha2::{Digest, Sha256};

use super::resolve::{DependencyPlan, DependencyType, FrameOffset, FrameSpan};
use super::task::{IntoFrame, Task};
use super::{Dependency, NodeSettings};
use crate::error::InvalidRangeError;
use crate::graph::{BatchId, Context, Node, NodeId};

/// Plugin used when a node does not name its own.
pub const DEFAULT_PLUGIN: &str = "Gaffer";

pub type PropertyMap = BTreeMap<String, String>;

/// Index of a job inside its [`JobGraph`](super::JobGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey(pub(crate) usize);

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

/// Tasks sharing one (node, context), plus everything the farm needs to run
/// them.
#[derive(Debug, Clone)]
pub struct Job {
    key: JobKey,
    node_id: NodeId,
    node: Node,
    context: Context,
    tasks: Vec<Task>,
    next_task_number: u32,
    parents: Vec<JobKey>,
    dependencies: Vec<Dependency>,
    dependency_index: HashSet<Dependency>,
    dependency_type: DependencyType,
    frame_offset: Option<FrameOffset>,
    job_properties: PropertyMap,
    plugin_properties: PropertyMap,
    aux_files: Vec<PathBuf>,
    environment: BTreeMap<String, String>,
    farm_settings: PropertyMap,
    farm_job_id: Option<String>,
}

impl Job {
    pub fn new(key: JobKey, node_id: NodeId, node: Node, context: Context) -> Self {
        let mut job_properties = PropertyMap::new();
        job_properties.insert("Plugin".to_string(), DEFAULT_PLUGIN.to_string());
        Self {
            key,
            node_id,
            node,
            context,
            tasks: Vec::new(),
            next_task_number: 0,
            parents: Vec::new(),
            dependencies: Vec::new(),
            dependency_index: HashSet::new(),
            dependency_type: DependencyType::None,
            frame_offset: None,
            job_properties,
            plugin_properties: PropertyMap::new(),
            aux_files: Vec::new(),
            environment: BTreeMap::new(),
            farm_settings: PropertyMap::new(),
            farm_job_id: None,
        }
    }

    pub fn key(&self) -> JobKey {
        self.key
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn node_name(&self) -> &str {
        &self.node.name
    }

    pub fn is_control(&self) -> bool {
        self.node.is_control()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.node.settings
    }

    /// Pre-spool hooks adjust scheduling through here.
    pub fn settings_mut(&mut self) -> &mut NodeSettings {
        &mut self.node.settings
    }

    /// Splits `frames` into maximal runs of consecutive frames, one task per
    /// run. An empty list adds a single placeholder task. Returns the number
    /// of tasks added.
    pub fn add_batch<F: IntoFrame>(
        &mut self,
        batch: Option<BatchId>,
        frames: &[F],
    ) -> Result<usize, InvalidRangeError> {
        let frames = frames
            .iter()
            .map(|f| f.into_frame())
            .collect::<Result<Vec<_>, _>>()?;

        let Some((&first, rest)) = frames.split_first() else {
            let task = Task::new(self.take_task_number(), batch);
            self.tasks.push(task);
            return Ok(1);
        };

        let mut runs = vec![(first, first)];
        for &frame in rest {
            match runs.last_mut() {
                Some(run) if run.1.checked_add(1) == Some(frame) => run.1 = frame,
                _ => runs.push((frame, frame)),
            }
        }

        let added = runs.len();
        for (start, end) in runs {
            let mut task = Task::new(self.take_task_number(), batch);
            task.set_frame_range(start, end)?;
            self.tasks.push(task);
        }
        Ok(added)
    }

    fn take_task_number(&mut self) -> u32 {
        let number = self.next_task_number;
        self.next_task_number += 1;
        number
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, number: u32) -> Option<&Task> {
        self.tasks.iter().find(|t| t.number() == number)
    }

    pub(crate) fn task_mut(&mut self, number: u32) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.number() == number)
    }

    pub fn tasks_for_batch(&self, batch: BatchId) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(move |t| t.batch() == Some(batch))
    }

    /// Position of a task in the submitted frame list, which is how the farm
    /// numbers tasks.
    pub fn farm_task_index(&self, number: u32) -> Option<usize> {
        self.tasks.iter().position(|t| t.number() == number)
    }

    pub(crate) fn retain_tasks(&mut self, mut keep: impl FnMut(&Task) -> bool) {
        self.tasks.retain(|t| keep(t));
        let numbers: HashSet<u32> = self.tasks.iter().map(Task::number).collect();
        self.retain_dependencies(|d| numbers.contains(&d.task()));
    }

    pub fn add_parent_job(&mut self, parent: JobKey) {
        if parent != self.key && !self.parents.contains(&parent) {
            self.parents.push(parent);
        }
    }

    pub fn parents(&self) -> &[JobKey] {
        &self.parents
    }

    /// Returns false when the edge was already recorded.
    pub fn add_dependency(&mut self, dependency: Dependency) -> bool {
        if !self.dependency_index.insert(dependency) {
            return false;
        }
        self.dependencies.push(dependency);
        true
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub(crate) fn retain_dependencies(&mut self, mut keep: impl FnMut(&Dependency) -> bool) {
        self.dependencies.retain(|d| keep(d));
        self.dependency_index = self.dependencies.iter().copied().collect();
    }

    /// Frame spans of every task, or the first placeholder task number.
    pub fn frame_spans(&self) -> Result<Vec<FrameSpan>, u32> {
        self.tasks
            .iter()
            .map(|t| t.frame_range().ok_or(t.number()))
            .collect()
    }

    /// Comma-joined task tokens, e.g. `1-10,11-20`.
    pub fn frames_string(&self) -> Option<String> {
        let tokens = self
            .tasks
            .iter()
            .map(Task::frame_token)
            .collect::<Option<Vec<_>>>()?;
        Some(tokens.join(","))
    }

    /// Largest task span, so the farm never re-splits a task.
    pub fn chunk_size(&self) -> Option<i64> {
        self.tasks.iter().filter_map(Task::span).max()
    }

    pub fn dependency_type(&self) -> DependencyType {
        self.dependency_type
    }

    pub fn frame_offset(&self) -> Option<FrameOffset> {
        self.frame_offset
    }

    pub(crate) fn set_dependency_plan(&mut self, plan: DependencyPlan) {
        self.dependency_type = plan.kind;
        self.frame_offset = plan.offset;
    }

    /// Merges `properties` into the job properties. `Plugin` stays set.
    pub fn set_job_properties(&mut self, properties: PropertyMap) {
        self.job_properties.extend(properties);
        self.job_properties
            .entry("Plugin".to_string())
            .or_insert_with(|| DEFAULT_PLUGIN.to_string());
    }

    pub fn job_properties(&self) -> &PropertyMap {
        &self.job_properties
    }

    pub fn set_plugin_properties(&mut self, properties: PropertyMap) {
        self.plugin_properties = properties;
    }

    pub fn plugin_properties(&self) -> &PropertyMap {
        &self.plugin_properties
    }

    pub fn add_aux_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.aux_files.contains(&path) {
            self.aux_files.push(path);
        }
    }

    pub fn aux_files(&self) -> &[PathBuf] {
        &self.aux_files
    }

    pub fn set_environment_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.environment.insert(name.into(), value.into());
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn set_farm_setting(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.farm_settings.insert(key.into(), value.into());
    }

    pub fn farm_settings(&self) -> &PropertyMap {
        &self.farm_settings
    }

    pub fn farm_job_id(&self) -> Option<&str> {
        self.farm_job_id.as_deref()
    }

    pub(crate) fn set_farm_job_id(&mut self, id: impl Into<String>) {
        self.farm_job_id = Some(id.into());
    }

    /// Identity of the farm work this job describes. The context is left
    /// out; it only reaches the farm through the plugin properties.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hash_map(&mut hasher, "job", &self.job_properties);
        hash_map(&mut hasher, "plugin", &self.plugin_properties);
        hash_map(&mut hasher, "settings", &self.farm_settings);
        hash_map(&mut hasher, "env", &self.environment);

        hasher.update(b"aux\0");
        for path in &self.aux_files {
            hasher.update(path.to_string_lossy().as_bytes());
            hasher.update(b"\n");
        }

        let offset = self.frame_offset.unwrap_or_default();
        hasher.update(format!("offset\0{}:{}\n", offset.start, offset.end).as_bytes());
        hasher.update(format!("node\0{}\n", self.node.name).as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

fn hash_map(hasher: &mut Sha256, tag: &str, map: &BTreeMap<String, String>) {
    hasher.update(tag.as_bytes());
    hasher.update(b"\0");
    for (key, value) in map {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(b"\x1e");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn job(name: &str) -> Job {
        Job::new(JobKey(0), NodeId(0), Node::task(name), Context::new())
    }

    fn ranges(job: &Job) -> Vec<(u32, Option<(i64, i64)>)> {
        job.tasks()
            .iter()
            .map(|t| (t.number(), t.frame_range()))
            .collect()
    }

    #[test]
    fn test_add_batch_splits_gapped_frames() {
        let mut job = job("n1");
        let added = job
            .add_batch(None, &[1.0, 2.0, 3.0, 7.0, 8.0, 9.0, 100.0, 101.0, 102.0])
            .unwrap();

        assert_eq!(added, 3);
        assert_eq!(
            ranges(&job),
            vec![(0, Some((1, 3))), (1, Some((7, 9))), (2, Some((100, 102)))]
        );
        assert_eq!(job.frames_string().as_deref(), Some("1-3,7-9,100-102"));
        assert_eq!(job.chunk_size(), Some(3));
    }

    #[test]
    fn test_add_batch_numbers_keep_increasing() {
        let mut job = job("n1");
        job.add_batch(None, &[1, 2]).unwrap();
        job.add_batch::<i64>(None, &[]).unwrap();
        job.add_batch(None, &[5]).unwrap();

        assert_eq!(
            ranges(&job),
            vec![(0, Some((1, 2))), (1, None), (2, Some((5, 5)))]
        );
        assert_eq!(job.frames_string(), None);
        assert_eq!(job.frame_spans(), Err(1));
    }

    #[test]
    fn test_add_batch_at_frame_limit() {
        let mut job = job("n1");
        let added = job.add_batch(None, &[i64::MAX - 1, i64::MAX, i64::MIN]).unwrap();

        assert_eq!(added, 2);
        assert_eq!(
            ranges(&job),
            vec![(0, Some((i64::MAX - 1, i64::MAX))), (1, Some((i64::MIN, i64::MIN)))]
        );
    }

    #[test]
    fn test_add_batch_rejects_fractional_frames() {
        let mut job = job("n1");
        assert_eq!(
            job.add_batch(None, &[1.0, 1.5]),
            Err(InvalidRangeError::NonIntegral(1.5))
        );
        assert!(job.tasks().is_empty());
    }

    #[test]
    fn test_task_numbers_survive_removal() {
        let mut job = job("n1");
        job.add_batch(None, &[1, 3, 5]).unwrap();
        job.retain_tasks(|t| t.number() != 1);
        job.add_batch(None, &[9]).unwrap();

        let numbers: Vec<u32> = job.tasks().iter().map(Task::number).collect();
        assert_eq!(numbers, vec![0, 2, 3]);
        assert_eq!(job.farm_task_index(2), Some(1));
        assert_eq!(job.farm_task_index(1), None);
    }

    #[test]
    fn test_plugin_always_set() {
        let mut job = job("n1");
        assert_eq!(job.job_properties()["Plugin"], DEFAULT_PLUGIN);

        let mut props = PropertyMap::new();
        props.insert("Plugin".into(), "Nuke".into());
        job.set_job_properties(props);
        assert_eq!(job.job_properties()["Plugin"], "Nuke");

        job.set_job_properties(PropertyMap::new());
        assert_eq!(job.job_properties()["Plugin"], "Nuke");
    }

    #[test]
    fn test_parents_and_dependencies_are_deduplicated() {
        let mut job = job("n2");
        job.add_parent_job(JobKey(3));
        job.add_parent_job(JobKey(3));
        job.add_parent_job(JobKey(0));
        assert_eq!(job.parents(), &[JobKey(3)]);

        let dep = Dependency::new(JobKey(3), 0, 0);
        assert!(job.add_dependency(dep));
        assert!(!job.add_dependency(dep));
        assert_eq!(job.dependencies().len(), 1);
    }

    #[test]
    fn test_content_hash_ignores_context() {
        let mut a = job("n1");
        let mut b = Job::new(
            JobKey(1),
            NodeId(0),
            Node::task("n1"),
            Context::from([("shot".to_string(), "010".to_string())]),
        );
        assert_eq!(a.content_hash(), b.content_hash());

        b.set_environment_variable("IECORE_LOG_LEVEL", "DEBUG");
        assert_ne!(a.content_hash(), b.content_hash());

        a.set_environment_variable("IECORE_LOG_LEVEL", "DEBUG");
        assert_eq!(a.content_hash(), b.content_hash());

        a.set_dependency_plan(DependencyPlan {
            kind: DependencyType::FrameToFrame,
            offset: Some(FrameOffset { start: 1, end: 1 }),
        });
        assert_ne!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash().len(), 64);
    }
}
