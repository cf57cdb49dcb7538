use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over the jobs of one dispatch. Hidden when disabled or when
/// stderr is not a terminal.
#[derive(Clone)]
pub struct SubmissionMonitor {
    bar: ProgressBar,
}

impl SubmissionMonitor {
    pub fn new(total_jobs: usize, enabled: bool) -> Self {
        if !enabled || !atty::is(atty::Stream::Stderr) {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }

        let bar = ProgressBar::new(total_jobs as u64);
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} jobs {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░  ");
        bar.set_style(style);
        bar.set_message("compiling...");
        Self { bar }
    }

    /// Called as each job is about to be spooled.
    pub fn spooling(&self, job_name: &str) {
        self.bar.inc(1);
        self.bar.set_message(job_name.to_string());
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn abandon(&self) {
        self.bar.abandon();
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}
