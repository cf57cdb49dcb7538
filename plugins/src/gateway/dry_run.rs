use std::sync::Mutex;

use async_trait::async_trait;
use farmspool_core::error::GatewayError;
use farmspool_core::gateway::{FarmGateway, SubmitOutcome, SubmitRequest};
use uuid::Uuid;

/// Accepts every job without contacting a farm.
#[derive(Default)]
pub struct DryRunGateway {
    accepted: Mutex<Vec<String>>,
}

impl DryRunGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Job names in submission order.
    pub fn accepted(&self) -> Vec<String> {
        self.accepted
            .lock()
            .map(|names| names.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FarmGateway for DryRunGateway {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitOutcome, GatewayError> {
        let id = Uuid::new_v4().simple().to_string();
        tracing::info!(
            target: "farmspool.gateway",
            job = %request.job_name,
            farm_job_id = %id,
            "dry run, job not sent"
        );
        if let Ok(mut accepted) = self.accepted.lock() {
            accepted.push(request.job_name.clone());
        }
        Ok(SubmitOutcome {
            job_id: Some(id.clone()),
            output: format!("JobID={id}\nResult=Success (dry run)"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_job_gets_a_fresh_id() {
        let gateway = DryRunGateway::new();
        let request = SubmitRequest {
            job_name: "shot010.render".into(),
            job_file: "/tmp/a.job".into(),
            plugin_file: "/tmp/a.plugin".into(),
            aux_files: vec![],
        };
        let a = gateway.submit(&request).await.unwrap();
        let b = gateway.submit(&request).await.unwrap();

        assert_ne!(a.job_id, b.job_id);
        assert_eq!(a.job_id.as_deref().map(str::len), Some(32));
        assert_eq!(gateway.accepted(), vec!["shot010.render", "shot010.render"]);
    }
}
