use std::sync::Arc;

use anyhow::Result;

use farmspool_core::config::FarmConfig;
use farmspool_core::gateway::FarmGateway;

use crate::gateway::{DeadlineCommandGateway, DryRunGateway};

pub fn build_gateway(cfg: &FarmConfig, dry_run: bool) -> Result<Arc<dyn FarmGateway>> {
    if dry_run {
        return Ok(Arc::new(DryRunGateway::new()));
    }
    Ok(Arc::new(DeadlineCommandGateway::from_config(cfg)?))
}
