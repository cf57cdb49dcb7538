use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "farmspool", version, about = "Compile node graphs into render-farm jobs")]
pub struct Args {
    /// Config file to use instead of ~/.farmspool/config.toml or ./farmspool.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct GraphArgs {
    /// Graph description (TOML).
    #[arg(long)]
    pub graph: PathBuf,

    /// Node to dispatch. Can be specified multiple times.
    #[arg(long = "target", required = true, action = clap::ArgAction::Append)]
    pub targets: Vec<String>,

    /// Frame list, e.g. `1-50` or `1-10,20,30-40x2`.
    #[arg(long, default_value = "1")]
    pub frames: String,

    #[arg(long)]
    pub job_name: Option<String>,

    #[arg(long)]
    pub jobs_dir: Option<PathBuf>,

    /// File shipped with every task job.
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Context variable (KEY=VALUE). Can be specified multiple times.
    #[arg(long = "context", action = clap::ArgAction::Append)]
    pub context: Vec<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct DispatchArgs {
    #[command(flatten)]
    pub graph: GraphArgs,

    /// Compile and write property files but submit nothing.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[arg(long, default_value_t = false)]
    pub no_progress: bool,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PlanArgs {
    #[command(flatten)]
    pub graph: GraphArgs,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ProgressArgs {
    #[arg(long, allow_hyphen_values = true)]
    pub start: i64,

    #[arg(long, allow_hyphen_values = true)]
    pub end: i64,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ReleaseArgs {
    /// Job property file holding the `ExtraInfoKeyValueN` entries.
    #[arg(long)]
    pub job_file: PathBuf,

    /// Pending task indices, comma separated.
    #[arg(long, value_delimiter = ',', required = true)]
    pub pending: Vec<u32>,

    /// JSON object mapping upstream job IDs to completed task indices.
    #[arg(long)]
    pub state: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Plan, compile and submit.
    Dispatch(DispatchArgs),
    /// Print the compiled job table without submitting.
    Plan(PlanArgs),
    /// Turn executor output on stdin into progress updates.
    Progress(ProgressArgs),
    /// Decide which script-dependent tasks can be released.
    Release(ReleaseArgs),
}
