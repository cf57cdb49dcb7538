//! Build, link and prune passes over an upstream batch tree.
//!
//! ```text
//! build   DFS from the roots; one Job per (node, context), one or more
//!         Tasks per batch, parent links mirroring the batch edges
//! link    parents first; every task gets a Dependency per upstream task
//!         of each preceding batch (control batches are walked through),
//!         placeholders inherit the upstream frame range
//! prune   frameless tasks with no upstream edge are dropped, repeatedly
//! ```

use std::collections::{HashMap, HashSet};

use super::resolve::EdgeFrames;
use super::{Dependency, Job, JobKey};
use crate::error::DispatchError;
use crate::graph::{BatchId, BatchSource, Context, NodeId};
use crate::release::ScriptDependency;

/// Arena of jobs compiled from one dispatch.
#[derive(Debug, Clone, Default)]
pub struct JobGraph {
    jobs: Vec<Job>,
    index: HashMap<(NodeId, Context), JobKey>,
    batch_jobs: HashMap<BatchId, JobKey>,
    roots: Vec<JobKey>,
}

impl JobGraph {
    /// Runs all three passes.
    pub fn compile<S: BatchSource + ?Sized>(
        source: &S,
        roots: &[BatchId],
    ) -> Result<Self, DispatchError> {
        let mut graph = Self::build(source, roots)?;
        graph.link(source)?;
        let pruned = graph.prune_orphan_tasks();
        tracing::debug!(
            target: "farmspool.walk",
            jobs = graph.jobs.len(),
            pruned,
            "compiled job graph"
        );
        Ok(graph)
    }

    /// Materialises jobs and tasks. Each batch is absorbed once per walk,
    /// however many consumers reach it.
    pub fn build<S: BatchSource + ?Sized>(
        source: &S,
        roots: &[BatchId],
    ) -> Result<Self, DispatchError> {
        let mut graph = Self::default();
        let mut visited = HashSet::new();
        for &root in roots {
            let key = graph.build_walk(source, root, &mut visited)?;
            if !graph.roots.contains(&key) {
                graph.roots.push(key);
            }
        }
        Ok(graph)
    }

    fn build_walk<S: BatchSource + ?Sized>(
        &mut self,
        source: &S,
        batch_id: BatchId,
        visited: &mut HashSet<BatchId>,
    ) -> Result<JobKey, DispatchError> {
        if !visited.insert(batch_id) {
            return self.batch_jobs.get(&batch_id).copied().ok_or_else(|| {
                DispatchError::consistency(format!("{batch_id} was visited but owns no job"))
            });
        }

        let batch = source
            .batch(batch_id)
            .ok_or_else(|| DispatchError::consistency(format!("unknown {batch_id}")))?;
        let key = match self.index.get(&(batch.node, batch.context.clone())) {
            Some(&key) => key,
            None => {
                let node = source.node(batch.node).ok_or_else(|| {
                    DispatchError::consistency(format!("{batch_id} references unknown {}", batch.node))
                })?;
                let key = JobKey(self.jobs.len());
                self.jobs
                    .push(Job::new(key, batch.node, node.clone(), batch.context.clone()));
                self.index.insert((batch.node, batch.context.clone()), key);
                tracing::debug!(target: "farmspool.walk", job = %key, node = %node.name, "new job");
                key
            }
        };

        self.jobs[key.0].add_batch(Some(batch_id), &batch.frames)?;
        self.batch_jobs.insert(batch_id, key);

        for &preceding in &batch.preceding {
            let parent = self.build_walk(source, preceding, visited)?;
            self.jobs[key.0].add_parent_job(parent);
        }

        Ok(key)
    }

    /// Records task dependencies. Jobs are linked parents first so that a
    /// placeholder can pass an inherited range further down.
    pub fn link<S: BatchSource + ?Sized>(&mut self, source: &S) -> Result<(), DispatchError> {
        for key in self.submission_order()? {
            let tasks: Vec<(u32, Option<BatchId>)> = self.jobs[key.0]
                .tasks()
                .iter()
                .map(|t| (t.number(), t.batch()))
                .collect();

            for (number, batch) in tasks {
                let Some(batch) = batch else { continue };
                let inherits = self.jobs[key.0]
                    .task(number)
                    .is_some_and(|t| t.is_placeholder());
                for upstream_batch in self.upstream_batches(source, batch)? {
                    let upstream_job = self.owner(upstream_batch)?;
                    if upstream_job == key {
                        continue;
                    }
                    let upstream_tasks: Vec<(u32, Option<(i64, i64)>)> = self.jobs
                        [upstream_job.0]
                        .tasks_for_batch(upstream_batch)
                        .map(|t| (t.number(), t.frame_range()))
                        .collect();

                    let job = &mut self.jobs[key.0];
                    for (upstream_task, range) in upstream_tasks {
                        job.add_dependency(Dependency::new(upstream_job, upstream_task, number));
                        if let (true, Some((start, end))) = (inherits, range) {
                            if let Some(task) = job.task_mut(number) {
                                task.inherit_frame_range(start, end);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Preceding batches of `batch`, with control batches replaced by their
    /// own non-control predecessors.
    fn upstream_batches<S: BatchSource + ?Sized>(
        &self,
        source: &S,
        batch: BatchId,
    ) -> Result<Vec<BatchId>, DispatchError> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut pending: Vec<BatchId> = self.preceding(source, batch)?.iter().rev().copied().collect();

        while let Some(candidate) = pending.pop() {
            if !seen.insert(candidate) {
                continue;
            }
            let owner = self.owner(candidate)?;
            if self.jobs[owner.0].is_control() {
                pending.extend(self.preceding(source, candidate)?.iter().rev().copied());
            } else {
                out.push(candidate);
            }
        }
        Ok(out)
    }

    fn preceding<'s, S: BatchSource + ?Sized>(
        &self,
        source: &'s S,
        batch: BatchId,
    ) -> Result<&'s [BatchId], DispatchError> {
        source
            .batch(batch)
            .map(|b| b.preceding.as_slice())
            .ok_or_else(|| DispatchError::consistency(format!("unknown {batch}")))
    }

    fn owner(&self, batch: BatchId) -> Result<JobKey, DispatchError> {
        self.batch_jobs
            .get(&batch)
            .copied()
            .ok_or_else(|| DispatchError::consistency(format!("{batch} has no owning job")))
    }

    /// Drops frameless tasks that have no upstream edge, until none remain.
    /// Returns how many tasks were removed.
    pub fn prune_orphan_tasks(&mut self) -> usize {
        let mut total = 0;
        loop {
            let mut orphans: HashSet<(JobKey, u32)> = HashSet::new();
            for job in &self.jobs {
                for task in job.tasks() {
                    let linked = job.dependencies().iter().any(|d| d.task() == task.number());
                    if task.is_placeholder() && !linked {
                        orphans.insert((job.key(), task.number()));
                    }
                }
            }
            if orphans.is_empty() {
                return total;
            }

            for job in &mut self.jobs {
                let key = job.key();
                job.retain_tasks(|t| !orphans.contains(&(key, t.number())));
                job.retain_dependencies(|d| !orphans.contains(&(d.upstream_job(), d.upstream_task())));
            }
            tracing::debug!(target: "farmspool.link", removed = orphans.len(), "pruned orphan tasks");
            total += orphans.len();
        }
    }

    /// Every job after all of its parents, parents visited in insertion
    /// order.
    pub fn submission_order(&self) -> Result<Vec<JobKey>, DispatchError> {
        let mut order = Vec::new();
        let mut done = HashSet::new();
        let mut stack = Vec::new();
        for &root in &self.roots {
            self.visit(root, &mut done, &mut stack, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        key: JobKey,
        done: &mut HashSet<JobKey>,
        stack: &mut Vec<JobKey>,
        order: &mut Vec<JobKey>,
    ) -> Result<(), DispatchError> {
        if done.contains(&key) {
            return Ok(());
        }
        if let Some(pos) = stack.iter().position(|k| *k == key) {
            let mut cycle: Vec<&str> = stack[pos..]
                .iter()
                .map(|k| self.jobs[k.0].node_name())
                .collect();
            cycle.push(self.jobs[key.0].node_name());
            return Err(DispatchError::consistency(format!(
                "dependency cycle: {}",
                cycle.join(" -> ")
            )));
        }

        stack.push(key);
        for &parent in self.jobs[key.0].parents() {
            self.visit(parent, done, stack, order)?;
        }
        stack.pop();

        done.insert(key);
        order.push(key);
        Ok(())
    }

    /// Parents with control jobs replaced by their own effective parents.
    pub fn effective_parents(&self, key: JobKey) -> Vec<JobKey> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut pending: Vec<JobKey> = match self.jobs.get(key.0) {
            Some(job) => job.parents().iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(parent) = pending.pop() {
            if !seen.insert(parent) {
                continue;
            }
            let job = &self.jobs[parent.0];
            if job.is_control() {
                pending.extend(job.parents().iter().rev().copied());
            } else {
                out.push(parent);
            }
        }
        out
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn job(&self, key: JobKey) -> Option<&Job> {
        self.jobs.get(key.0)
    }

    pub fn job_mut(&mut self, key: JobKey) -> Option<&mut Job> {
        self.jobs.get_mut(key.0)
    }

    pub fn job_for(&self, node: NodeId, context: &Context) -> Option<&Job> {
        self.index
            .get(&(node, context.clone()))
            .and_then(|k| self.jobs.get(k.0))
    }

    /// First job compiled for the node called `name`.
    pub fn job_named(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.node_name() == name)
    }

    pub fn roots(&self) -> &[JobKey] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs a dispatch would hand to the farm.
    pub fn submittable_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| !j.is_control() && !j.tasks().is_empty() && j.farm_job_id().is_none())
            .count()
    }

    pub(crate) fn edge_frames(&self, key: JobKey) -> Result<Vec<EdgeFrames>, DispatchError> {
        let job = self.require(key)?;
        job.dependencies()
            .iter()
            .map(|dep| {
                let task = job.task(dep.task()).ok_or_else(|| {
                    DispatchError::consistency(format!(
                        "{} has an edge from missing task {}",
                        job.node_name(),
                        dep.task()
                    ))
                })?;
                let upstream = self.require(dep.upstream_job())?;
                let upstream_task = upstream.task(dep.upstream_task()).ok_or_else(|| {
                    DispatchError::consistency(format!(
                        "{} depends on missing task {} of {}",
                        job.node_name(),
                        dep.upstream_task(),
                        upstream.node_name()
                    ))
                })?;
                Ok(EdgeFrames {
                    upstream_job: dep.upstream_job(),
                    downstream: task.frame_range(),
                    upstream: upstream_task.frame_range(),
                })
            })
            .collect()
    }

    /// Farm IDs of the jobs `key` has edges to, first-seen order.
    pub(crate) fn upstream_farm_ids(&self, key: JobKey) -> Result<Vec<String>, DispatchError> {
        let job = self.require(key)?;
        let mut ids: Vec<String> = Vec::new();
        for dep in job.dependencies() {
            let upstream = self.require(dep.upstream_job())?;
            let id = upstream.farm_job_id().ok_or_else(|| {
                DispatchError::consistency(format!(
                    "{} depends on {} which has no farm job id",
                    job.node_name(),
                    upstream.node_name()
                ))
            })?;
            if !ids.iter().any(|i| i == id) {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }

    /// Edges of `key` in the per-task form read by the release script.
    pub(crate) fn script_dependencies(
        &self,
        key: JobKey,
    ) -> Result<Vec<ScriptDependency>, DispatchError> {
        let job = self.require(key)?;
        job.dependencies()
            .iter()
            .map(|dep| {
                let upstream = self.require(dep.upstream_job())?;
                let missing = || {
                    DispatchError::consistency(format!(
                        "edge {}:{} -> {}:{} does not resolve",
                        job.node_name(),
                        dep.task(),
                        upstream.node_name(),
                        dep.upstream_task()
                    ))
                };
                let task = job.farm_task_index(dep.task()).ok_or_else(missing)?;
                let upstream_task = upstream
                    .farm_task_index(dep.upstream_task())
                    .ok_or_else(missing)?;
                let upstream_job = upstream.farm_job_id().ok_or_else(missing)?;
                Ok(ScriptDependency {
                    task: task as u32,
                    upstream_job: upstream_job.to_string(),
                    upstream_task: upstream_task as u32,
                })
            })
            .collect()
    }

    fn require(&self, key: JobKey) -> Result<&Job, DispatchError> {
        self.jobs
            .get(key.0)
            .ok_or_else(|| DispatchError::consistency(format!("unknown {key}")))
    }
}
