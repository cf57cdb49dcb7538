//! Drives a compiled [`JobGraph`] onto the farm, parents first.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::properties::{compose, SubmissionContext, Upstream};
use super::resolve::{resolve_dependency_type, DependencyPlan, DependencyType};
use super::{Job, JobGraph, JobKey};
use crate::config::AppConfig;
use crate::error::DispatchError;
use crate::gateway::{file_stem, FarmGateway, PropertyFiles, SubmitRequest};
use crate::graph::{BatchId, BatchSource, Context};

/// Runs on every job right before its properties are composed.
pub type PreSpoolHook = Box<dyn Fn(&Dispatcher, &mut Job) + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Prefix of every farm job name, also the default batch name.
    pub job_name: String,
    /// Where property files are kept. Temporary files are used when unset.
    pub jobs_directory: Option<PathBuf>,
    /// Graph file shipped with Task-node jobs.
    pub script_file: Option<PathBuf>,
    /// `Version` entry of the plugin info, omitted when unset.
    pub plugin_version: Option<String>,
    pub base_context: Context,
    pub dependency_script_path: Option<String>,
    pub log_level_env: String,
}

impl DispatchOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            job_name: config.dispatch.job_name.clone(),
            jobs_directory: config.dispatch.jobs_directory.clone(),
            script_file: config.dispatch.script_file.clone(),
            plugin_version: config.dispatch.plugin_version.clone(),
            base_context: config.dispatch.context.clone(),
            dependency_script_path: config.farm.dependency_script_path.clone(),
            log_level_env: config.farm.log_level_env.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittedJob {
    pub name: String,
    pub node: String,
    pub farm_job_id: String,
    pub tasks: usize,
    pub dependency_type: DependencyType,
    /// An identical job was already submitted and its ID was reused.
    pub reused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ControlNode,
    NoTasks,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedJob {
    pub node: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub submitted: Vec<SubmittedJob>,
    pub skipped: Vec<SkippedJob>,
}

impl DispatchReport {
    fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            submitted: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.iter().filter(|s| !s.reused).count()
    }
}

pub struct Dispatcher {
    options: DispatchOptions,
    gateway: Arc<dyn FarmGateway>,
    hooks: Vec<PreSpoolHook>,
}

impl Dispatcher {
    pub fn new(options: DispatchOptions, gateway: Arc<dyn FarmGateway>) -> Self {
        Self {
            options,
            gateway,
            hooks: Vec::new(),
        }
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    pub fn gateway_name(&self) -> &str {
        self.gateway.name()
    }

    /// Hooks run in registration order.
    pub fn on_pre_spool<F>(&mut self, hook: F)
    where
        F: Fn(&Dispatcher, &mut Job) + Send + Sync + 'static,
    {
        self.hooks.push(Box::new(hook));
    }

    pub fn compile<S: BatchSource + ?Sized>(
        &self,
        source: &S,
        roots: &[BatchId],
    ) -> Result<JobGraph, DispatchError> {
        JobGraph::compile(source, roots)
    }

    /// Compiles and submits in one go.
    pub async fn dispatch<S: BatchSource + ?Sized>(
        &self,
        source: &S,
        roots: &[BatchId],
    ) -> Result<(JobGraph, DispatchReport), DispatchError> {
        let mut graph = self.compile(source, roots)?;
        let report = self.submit(&mut graph).await?;
        Ok((graph, report))
    }

    /// Submits every job not yet on the farm. The first failure stops the
    /// dispatch; jobs already submitted keep their IDs.
    pub async fn submit(&self, graph: &mut JobGraph) -> Result<DispatchReport, DispatchError> {
        let order = graph.submission_order()?;
        let mut report = DispatchReport::start();
        let mut by_hash: HashMap<String, String> = HashMap::new();

        for key in order {
            self.submit_job(graph, key, &mut by_hash, &mut report).await?;
        }

        report.finished_at = Utc::now();
        tracing::info!(
            target: "farmspool.submit",
            gateway = %self.gateway.name(),
            submitted = report.submitted_count(),
            skipped = report.skipped.len(),
            "dispatch finished"
        );
        Ok(report)
    }

    async fn submit_job(
        &self,
        graph: &mut JobGraph,
        key: JobKey,
        by_hash: &mut HashMap<String, String>,
        report: &mut DispatchReport,
    ) -> Result<(), DispatchError> {
        let job = graph
            .job(key)
            .ok_or_else(|| DispatchError::consistency(format!("unknown {key}")))?;
        let skip = if job.is_control() {
            Some(SkipReason::ControlNode)
        } else if job.tasks().is_empty() {
            Some(SkipReason::NoTasks)
        } else {
            None
        };
        if let Some(reason) = skip {
            tracing::debug!(target: "farmspool.submit", node = %job.node_name(), ?reason, "skipping job");
            report.skipped.push(SkippedJob {
                node: job.node_name().to_string(),
                reason,
            });
            return Ok(());
        }
        if job.farm_job_id().is_some() {
            return Ok(());
        }

        let mut job = job.clone();
        for hook in &self.hooks {
            hook(self, &mut job);
        }
        job.settings().validate()?;

        let edges = graph.edge_frames(key)?;
        let coverage = job.frame_spans().map_err(|number| {
            DispatchError::consistency(format!(
                "{} task {number} has no frame range",
                job.node_name()
            ))
        })?;
        let plan = resolve_dependency_type(job.settings().dependency_mode, &edges, &coverage);
        let job_ids = graph.upstream_farm_ids(key)?;
        let script_edges = if plan.kind == DependencyType::Scripted {
            graph.script_dependencies(key)?
        } else {
            Vec::new()
        };

        let ctx = SubmissionContext {
            dispatch_name: &self.options.job_name,
            base_context: &self.options.base_context,
            script_file: self.options.script_file.as_deref(),
            plugin_version: self.options.plugin_version.as_deref(),
            dependency_script: self.options.dependency_script_path.as_deref(),
            log_level_env: &self.options.log_level_env,
        };
        let composition = compose(
            &job,
            &ctx,
            &plan,
            Upstream {
                job_ids: &job_ids,
                edges: &script_edges,
            },
        )?;

        apply(&mut job, plan, &composition);
        for path in job.aux_files() {
            if !path.exists() {
                return Err(DispatchError::MissingAuxFile {
                    job: composition.name.clone(),
                    path: path.clone(),
                });
            }
        }

        let hash = job.content_hash();
        let (farm_job_id, reused) = match by_hash.get(&hash) {
            Some(id) => {
                tracing::debug!(
                    target: "farmspool.submit",
                    job = %composition.name,
                    farm_job_id = %id,
                    "identical job already submitted"
                );
                (id.clone(), true)
            }
            None => {
                let id = self.spool(&job, &composition.name).await?;
                by_hash.insert(hash, id.clone());
                (id, false)
            }
        };

        job.set_farm_job_id(farm_job_id.clone());
        report.submitted.push(SubmittedJob {
            name: composition.name,
            node: job.node_name().to_string(),
            farm_job_id,
            tasks: job.tasks().len(),
            dependency_type: plan.kind,
            reused,
        });
        if let Some(slot) = graph.job_mut(key) {
            *slot = job;
        }
        Ok(())
    }

    async fn spool(&self, job: &Job, name: &str) -> Result<String, DispatchError> {
        let files = PropertyFiles::write(
            self.options.jobs_directory.as_deref(),
            &file_stem(name),
            job.job_properties(),
            job.plugin_properties(),
        )
        .map_err(|source| DispatchError::Io {
            job: name.to_string(),
            source,
        })?;

        let request = SubmitRequest {
            job_name: name.to_string(),
            job_file: files.job_file().to_path_buf(),
            plugin_file: files.plugin_file().to_path_buf(),
            aux_files: job.aux_files().to_vec(),
        };
        tracing::info!(
            target: "farmspool.submit",
            job = %name,
            tasks = job.tasks().len(),
            dependency_type = ?job.dependency_type(),
            "submitting job"
        );
        let outcome = self.gateway.submit(&request).await?;
        match outcome.job_id {
            Some(id) => {
                tracing::info!(target: "farmspool.submit", job = %name, farm_job_id = %id, "job accepted");
                Ok(id)
            }
            None => Err(DispatchError::SubmissionFailure {
                job: name.to_string(),
                output: outcome.output,
            }),
        }
    }
}

fn apply(job: &mut Job, plan: DependencyPlan, composition: &super::properties::Composition) {
    job.set_dependency_plan(plan);
    job.set_job_properties(composition.job_properties.clone());
    job.set_plugin_properties(composition.plugin_properties.clone());
    for (key, value) in &composition.environment {
        job.set_environment_variable(key, value);
    }
    for (key, value) in &composition.farm_settings {
        job.set_farm_setting(key, value);
    }
    for path in &composition.aux_files {
        job.add_aux_file(path);
    }
}
