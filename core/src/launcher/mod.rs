//! Farm-side helpers for the executor plugin: per-task frame arguments and
//! progress read from the executor's stdout.

mod progress;
mod tokens;

pub use progress::{overall_progress, ProgressTracker, ProgressUpdate};
pub use tokens::expand_frame_tokens;
