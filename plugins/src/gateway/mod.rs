pub mod deadline;
pub mod dry_run;

pub use deadline::DeadlineCommandGateway;
pub use dry_run::DryRunGateway;
