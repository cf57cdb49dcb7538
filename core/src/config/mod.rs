pub mod load;
pub mod types;

pub use load::{apply_overrides, data_dir, load_default, load_from_path};
pub use types::{AppConfig, DispatchConfig, FarmConfig, LoggingConfig};
