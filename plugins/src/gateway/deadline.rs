use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use farmspool_core::config::FarmConfig;
use farmspool_core::error::GatewayError;
use farmspool_core::gateway::{FarmGateway, SubmitOutcome, SubmitRequest};
use lazy_static::lazy_static;
use regex::Regex;
use tokio::process::Command;

#[cfg(windows)]
const COMMAND_NAME: &str = "deadlinecommand.exe";
#[cfg(not(windows))]
const COMMAND_NAME: &str = "deadlinecommand";

lazy_static! {
    static ref LIMIT_NAME: Regex = Regex::new(r"^Name=(.*)$").expect("LIMIT_NAME is valid");
}

/// Submits through the farm's `deadlinecommand` tool.
pub struct DeadlineCommandGateway {
    command: PathBuf,
    timeout: Duration,
}

impl DeadlineCommandGateway {
    pub fn new(command_dir: &Path, timeout: Duration) -> Self {
        Self {
            command: command_dir.join(COMMAND_NAME),
            timeout,
        }
    }

    pub fn from_config(cfg: &FarmConfig) -> Result<Self, GatewayError> {
        let dir = cfg.command_dir.as_deref().ok_or_else(|| {
            GatewayError::Configuration(
                "farm.command_dir is not set (or set DEADLINE_PATH)".to_string(),
            )
        })?;
        Ok(Self::new(dir, Duration::from_secs(cfg.submit_timeout_secs)))
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    async fn run(&self, args: &[OsString]) -> Result<Output, GatewayError> {
        let command = self.command.display().to_string();
        let child = Command::new(&self.command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| GatewayError::Spawn {
                command: command.clone(),
                source,
            })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|source| GatewayError::Spawn { command, source }),
            Err(_) => Err(GatewayError::Timeout {
                command,
                seconds: self.timeout.as_secs(),
            }),
        }
    }

    /// Runs a query and returns its stdout, failing on a nonzero exit.
    async fn query(&self, args: &[&str]) -> Result<String, GatewayError> {
        let args: Vec<OsString> = args.iter().map(OsString::from).collect();
        let output = self.run(&args).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            return Err(GatewayError::CommandFailed {
                command: format!("{} {}", self.command.display(), args_text(&args)),
                output: combined(&output),
            });
        }
        Ok(stdout)
    }

    pub async fn worker_names(&self) -> Result<Vec<String>, GatewayError> {
        Ok(non_empty_lines(&self.query(&["-GetSlaveNames"]).await?))
    }

    pub async fn limit_groups(&self) -> Result<Vec<String>, GatewayError> {
        Ok(parse_limit_groups(&self.query(&["-GetLimitGroups"]).await?))
    }

    pub async fn groups(&self) -> Result<Vec<String>, GatewayError> {
        let out = self.query(&["-GetSubmissionInfo", "Groups"]).await?;
        Ok(parse_submission_info(&out))
    }

    pub async fn pools(&self) -> Result<Vec<String>, GatewayError> {
        let out = self.query(&["-GetSubmissionInfo", "Pools"]).await?;
        Ok(parse_submission_info(&out))
    }
}

#[async_trait]
impl FarmGateway for DeadlineCommandGateway {
    fn name(&self) -> &str {
        "deadline"
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitOutcome, GatewayError> {
        tracing::debug!(
            target: "farmspool.gateway",
            command = %self.command.display(),
            job = %request.job_name,
            job_file = %request.job_file.display(),
            aux = request.aux_files.len(),
            "running submission command"
        );
        let output = self.run(&request.arguments()).await?;
        let outcome = SubmitOutcome::from_output(combined(&output));
        if outcome.job_id.is_none() {
            tracing::warn!(
                target: "farmspool.gateway",
                job = %request.job_name,
                status = ?output.status.code(),
                "farm returned no job id"
            );
        }
        Ok(outcome)
    }
}

fn combined(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stderr);
    }
    text
}

fn args_text(args: &[OsString]) -> String {
    args.iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// `-GetLimitGroups` prints one block per limit; only `Name=` lines matter.
pub fn parse_limit_groups(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| LIMIT_NAME.captures(line.trim()))
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// `-GetSubmissionInfo` output starts with a section header line.
pub fn parse_submission_info(text: &str) -> Vec<String> {
    non_empty_lines(text).into_iter().skip(1).collect()
}
