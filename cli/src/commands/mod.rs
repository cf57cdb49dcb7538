pub mod cli;
pub mod dispatch;
pub mod progress;
pub mod release;
