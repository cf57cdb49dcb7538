//! Farm submission boundary.
//!
//! Jobs reach the farm as two `Key=Value` property files (job and plugin)
//! plus auxiliary files. Implementations live in the plugins crate.

mod files;

use std::ffi::OsString;
use std::path::PathBuf;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::GatewayError;

pub use files::{file_stem, render_property_file, PropertyFiles};

lazy_static! {
    static ref JOB_ID: Regex = Regex::new(r"JobID=(\S+)").expect("JOB_ID is valid");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    /// Used for logging only.
    pub job_name: String,
    pub job_file: PathBuf,
    pub plugin_file: PathBuf,
    pub aux_files: Vec<PathBuf>,
}

impl SubmitRequest {
    /// Positional arguments of the farm submission command.
    pub fn arguments(&self) -> Vec<OsString> {
        let mut args = vec![
            self.job_file.clone().into_os_string(),
            self.plugin_file.clone().into_os_string(),
        ];
        args.extend(self.aux_files.iter().map(|p| p.clone().into_os_string()));
        args
    }
}

/// What the farm said about a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub job_id: Option<String>,
    /// Raw farm output, kept for diagnostics.
    pub output: String,
}

impl SubmitOutcome {
    pub fn from_output(output: impl Into<String>) -> Self {
        let output = output.into();
        Self {
            job_id: parse_job_id(&output),
            output,
        }
    }
}

/// Extracts the value of the first `JobID=` token.
pub fn parse_job_id(output: &str) -> Option<String> {
    JOB_ID.captures(output).map(|caps| caps[1].to_string())
}

#[async_trait]
pub trait FarmGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitOutcome, GatewayError>;
}
