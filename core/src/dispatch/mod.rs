//! Jobs, tasks and the passes that turn a batch tree into farm submissions.

mod compiler;
mod dependency;
mod dispatcher;
mod job;
pub mod properties;
pub mod resolve;
mod settings;
mod task;

pub use compiler::JobGraph;
pub use dependency::Dependency;
pub use dispatcher::{
    DispatchOptions, DispatchReport, Dispatcher, PreSpoolHook, SkipReason, SkippedJob,
    SubmittedJob,
};
pub use job::{Job, JobKey, PropertyMap, DEFAULT_PLUGIN};
pub use properties::{Composition, SubmissionContext};
pub use resolve::{DependencyPlan, DependencyType, EdgeFrames, FrameOffset, FrameSpan};
pub use settings::{DependencyMode, NodeSettings};
pub use task::{IntoFrame, Task};
