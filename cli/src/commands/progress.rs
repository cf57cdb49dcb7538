use farmspool_core::launcher::ProgressTracker;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::cli::ProgressArgs;
use crate::error::CliError;

/// Prints one JSON line per update. Exits 1 when a line reported a failure.
pub async fn run_progress(args: ProgressArgs) -> Result<i32, CliError> {
    let mut tracker = ProgressTracker::new(args.start, args.end);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut failed = false;

    while let Some(line) = lines.next_line().await? {
        let update = tracker.observe(&line);
        if update.is_empty() {
            continue;
        }
        failed |= update.failure.is_some();
        println!(
            "{}",
            serde_json::to_string(&update).map_err(|e| CliError::Command(e.to_string()))?
        );
    }
    Ok(if failed { 1 } else { 0 })
}
