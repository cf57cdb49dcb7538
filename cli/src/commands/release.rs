use std::collections::BTreeMap;

use farmspool_core::release::{released_tasks, script_dependencies_from_properties};

use super::cli::ReleaseArgs;
use crate::error::CliError;

/// `Key=Value` lines; the first `=` splits.
pub fn parse_property_file(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim_end().to_string()))
        .collect()
}

pub fn run_release(args: ReleaseArgs) -> Result<i32, CliError> {
    let properties = parse_property_file(&std::fs::read_to_string(&args.job_file)?);
    let dependencies = script_dependencies_from_properties(&properties);
    let state: BTreeMap<String, Vec<u32>> =
        serde_json::from_str(&std::fs::read_to_string(&args.state)?)
            .map_err(|e| CliError::Command(format!("{}: {e}", args.state.display())))?;

    let released = released_tasks(&args.pending, &dependencies, &state);
    println!(
        "{}",
        serde_json::to_string(&released).map_err(|e| CliError::Command(e.to_string()))?
    );
    Ok(0)
}
