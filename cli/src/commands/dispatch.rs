use std::sync::Arc;

use farmspool_core::config::AppConfig;
use farmspool_core::dispatch::{DispatchOptions, DispatchReport, Dispatcher, JobGraph};
use farmspool_core::graph::{plan, Context, FrameList, GraphSpec, Plan, PlanRequest};
use farmspool_plugins::factory::build_gateway;
use serde::Serialize;

use super::cli::{DispatchArgs, GraphArgs, PlanArgs};
use crate::error::CliError;
use crate::monitor::SubmissionMonitor;

pub fn parse_context(base: &Context, pairs: &[String]) -> Result<Context, CliError> {
    let mut context = base.clone();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .filter(|(k, _)| !k.trim().is_empty())
            .ok_or_else(|| CliError::Command(format!("invalid --context '{pair}', expected KEY=VALUE")))?;
        context.insert(key.trim().to_string(), value.to_string());
    }
    Ok(context)
}

fn plan_graph(args: &GraphArgs, cfg: &AppConfig) -> Result<(Plan, Context), CliError> {
    let spec = GraphSpec::load(&args.graph)?;
    let frames = FrameList::parse(&args.frames)?.into_vec();
    let context = parse_context(&cfg.dispatch.context, &args.context)?;
    let plan = plan(
        &spec,
        &PlanRequest {
            targets: &args.targets,
            frames: &frames,
            context: &context,
            defaults: &cfg.dispatch.defaults,
        },
    )?;
    tracing::info!(
        graph = %args.graph.display(),
        nodes = plan.tree.node_count(),
        batches = plan.tree.batch_count(),
        "planned batches"
    );
    Ok((plan, context))
}

fn options(args: &GraphArgs, cfg: &AppConfig, context: Context) -> DispatchOptions {
    let mut options = DispatchOptions::from_config(cfg);
    if let Some(name) = &args.job_name {
        options.job_name = name.clone();
    } else if options.job_name.is_empty() {
        options.job_name = args
            .graph
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    if let Some(dir) = &args.jobs_dir {
        options.jobs_directory = Some(dir.clone());
    }
    if let Some(script) = &args.script {
        options.script_file = Some(script.clone());
    }
    options.base_context = context;
    options
}

pub async fn run_dispatch(args: DispatchArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let (plan, context) = plan_graph(&args.graph, cfg)?;
    let gateway = build_gateway(&cfg.farm, args.dry_run)?;
    let mut dispatcher = Dispatcher::new(options(&args.graph, cfg, context), gateway);

    let mut graph = dispatcher.compile(&plan.tree, &plan.roots)?;
    let monitor = Arc::new(SubmissionMonitor::new(
        graph.submittable_count(),
        !args.no_progress && !args.json,
    ));
    let hook_monitor = Arc::clone(&monitor);
    dispatcher.on_pre_spool(move |_, job| hook_monitor.spooling(job.node_name()));

    let report = match dispatcher.submit(&mut graph).await {
        Ok(report) => report,
        Err(e) => {
            monitor.abandon();
            return Err(e.into());
        }
    };
    monitor.finish("submitted");

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).map_err(|e| CliError::Command(e.to_string()))?
        );
    } else {
        print!("{}", render_report(&report));
    }
    Ok(0)
}

pub fn render_report(report: &DispatchReport) -> String {
    let mut out = String::new();
    for job in &report.submitted {
        let note = if job.reused { ", reused" } else { "" };
        out.push_str(&format!(
            "submitted {} -> {} ({} tasks, {:?}{note})\n",
            job.name, job.farm_job_id, job.tasks, job.dependency_type
        ));
    }
    for job in &report.skipped {
        out.push_str(&format!("skipped {} ({:?})\n", job.node, job.reason));
    }
    out
}

#[derive(Debug, Serialize, PartialEq)]
pub struct JobRow {
    pub node: String,
    pub control: bool,
    pub tasks: usize,
    pub frames: Option<String>,
    pub dependencies: usize,
    pub parents: Vec<String>,
}

pub fn job_rows(graph: &JobGraph) -> Result<Vec<JobRow>, CliError> {
    let order = graph.submission_order()?;
    Ok(order
        .into_iter()
        .filter_map(|key| graph.job(key))
        .map(|job| JobRow {
            node: job.node_name().to_string(),
            control: job.is_control(),
            tasks: job.tasks().len(),
            frames: job.frames_string(),
            dependencies: job.dependencies().len(),
            parents: graph
                .effective_parents(job.key())
                .into_iter()
                .filter_map(|k| graph.job(k).map(|p| p.node_name().to_string()))
                .collect(),
        })
        .collect())
}

pub fn run_plan(args: PlanArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let (plan, _) = plan_graph(&args.graph, cfg)?;
    let graph = JobGraph::compile(&plan.tree, &plan.roots)?;
    let rows = job_rows(&graph)?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).map_err(|e| CliError::Command(e.to_string()))?
        );
        return Ok(0);
    }
    for row in rows {
        let marker = if row.control { " (control)" } else { "" };
        println!(
            "{}{marker}: {} tasks [{}], {} deps, parents: {}",
            row.node,
            row.tasks,
            row.frames.as_deref().unwrap_or("-"),
            row.dependencies,
            if row.parents.is_empty() {
                "-".to_string()
            } else {
                row.parents.join(", ")
            }
        );
    }
    Ok(0)
}
