use super::JobKey;

/// One task-level edge: `task` in the owning job waits for `upstream_task`
/// in `upstream_job`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dependency {
    upstream_job: JobKey,
    upstream_task: u32,
    task: u32,
}

impl Dependency {
    pub fn new(upstream_job: JobKey, upstream_task: u32, task: u32) -> Self {
        Self {
            upstream_job,
            upstream_task,
            task,
        }
    }

    pub fn upstream_job(&self) -> JobKey {
        self.upstream_job
    }

    pub fn upstream_task(&self) -> u32 {
        self.upstream_task
    }

    /// Downstream task number in the owning job.
    pub fn task(&self) -> u32 {
        self.task
    }
}
