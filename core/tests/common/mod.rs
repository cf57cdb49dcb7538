#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use farmspool_core::dispatch::{DispatchOptions, Dispatcher, NodeSettings, PropertyMap};
use farmspool_core::error::GatewayError;
use farmspool_core::gateway::{FarmGateway, SubmitOutcome, SubmitRequest};
use farmspool_core::graph::{plan, Context, FrameList, GraphSpec, Plan, PlanRequest};

pub const RELEASE_SCRIPT: &str = "/farm/scripts/release_tasks.py";

/// What the farm received for one submission. Property files are read while
/// the submit call is still running.
#[derive(Debug, Clone)]
pub struct Submission {
    pub job_name: String,
    pub job_id: String,
    pub job_properties: PropertyMap,
    pub plugin_properties: PropertyMap,
    pub job_file: PathBuf,
    pub aux_files: Vec<PathBuf>,
}

/// In-memory farm. Issues `job-N` IDs and refuses any job whose
/// `JobDependencies` names an ID it has not issued yet.
#[derive(Default)]
pub struct RecordingGateway {
    submissions: Mutex<Vec<Submission>>,
    reject: Option<(String, String)>,
}

impl RecordingGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answers `output` without a job ID for the job called `job_name`.
    pub fn rejecting(job_name: &str, output: &str) -> Arc<Self> {
        Arc::new(Self {
            submissions: Mutex::new(Vec::new()),
            reject: Some((job_name.to_string(), output.to_string())),
        })
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submission(&self, job_name: &str) -> Submission {
        self.submissions()
            .into_iter()
            .find(|s| s.job_name == job_name)
            .unwrap_or_else(|| panic!("{job_name} was not submitted"))
    }

    pub fn names(&self) -> Vec<String> {
        self.submissions().into_iter().map(|s| s.job_name).collect()
    }
}

#[async_trait]
impl FarmGateway for RecordingGateway {
    fn name(&self) -> &str {
        "recording"
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitOutcome, GatewayError> {
        if let Some((name, output)) = &self.reject {
            if *name == request.job_name {
                return Ok(SubmitOutcome::from_output(output.clone()));
            }
        }

        let job_properties = read_properties(&request.job_file);
        let plugin_properties = read_properties(&request.plugin_file);
        let mut submissions = self.submissions.lock().unwrap();

        if let Some(parents) = job_properties.get("JobDependencies") {
            for parent in parents.split(',') {
                assert!(
                    submissions.iter().any(|s| s.job_id == parent),
                    "{} submitted before its parent {parent}",
                    request.job_name
                );
            }
        }

        let job_id = format!("job-{}", submissions.len());
        submissions.push(Submission {
            job_name: request.job_name.clone(),
            job_id: job_id.clone(),
            job_properties,
            plugin_properties,
            job_file: request.job_file.clone(),
            aux_files: request.aux_files.clone(),
        });
        Ok(SubmitOutcome::from_output(format!(
            "Result=Success\nJobID={job_id}\nThe job was submitted successfully."
        )))
    }
}

pub fn read_properties(path: &std::path::Path) -> PropertyMap {
    let text = std::fs::read_to_string(path).unwrap();
    text.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn options() -> DispatchOptions {
    DispatchOptions {
        job_name: "shot010".to_string(),
        jobs_directory: None,
        script_file: None,
        plugin_version: None,
        base_context: Context::new(),
        dependency_script_path: Some(RELEASE_SCRIPT.to_string()),
        log_level_env: "IECORE_LOG_LEVEL".to_string(),
    }
}

pub fn dispatcher(gateway: Arc<RecordingGateway>) -> Dispatcher {
    Dispatcher::new(options(), gateway)
}

pub fn plan_frames(spec: &GraphSpec, targets: &[&str], frames: &str) -> Plan {
    let targets: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
    let frames = FrameList::parse(frames).unwrap().into_vec();
    let context = Context::new();
    let defaults = NodeSettings::default();
    plan(
        spec,
        &PlanRequest {
            targets: &targets,
            frames: &frames,
            context: &context,
            defaults: &defaults,
        },
    )
    .unwrap()
}

/// `ExtraInfoKeyValueN` entries in index order.
pub fn extra_info(properties: &PropertyMap) -> Vec<String> {
    let mut entries: BTreeMap<usize, String> = BTreeMap::new();
    for (key, value) in properties {
        if let Some(index) = key.strip_prefix("ExtraInfoKeyValue") {
            entries.insert(index.parse().unwrap(), value.clone());
        }
    }
    entries.into_values().collect()
}
