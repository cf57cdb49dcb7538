mod code;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod plan;

pub use code::ErrorCode;
pub use config::ConfigError;
pub use dispatch::{DispatchError, InvalidRangeError};
pub use gateway::GatewayError;
pub use plan::PlanError;
