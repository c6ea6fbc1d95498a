//! Orchestration client contract.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

/// Errors from the orchestration client. All are treated as transient.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("service not found: {0}")]
    NotFound(String),

    #[error("orchestrator request failed: {0}")]
    Request(String),
}

/// Reads and sets replica counts on the cluster.
///
/// `set_replicas` must be idempotent: setting the current count again is a no-op.
#[async_trait]
pub trait Orchestrator: Send + Sync + 'static {
    async fn get_replicas(&self, service: &str) -> Result<u32, OrchestratorError>;

    async fn set_replicas(&self, service: &str, replicas: u32) -> Result<(), OrchestratorError>;
}

/// Keeps replica counts in memory and logs every change. Never touches a
/// cluster.
pub struct DryRunOrchestrator {
    /// Replica count reported for services never set before.
    initial: u32,
    replicas: Mutex<HashMap<String, u32>>,
    set_calls: AtomicU64,
}

impl DryRunOrchestrator {
    pub fn new(initial: u32) -> Self {
        Self {
            initial,
            replicas: Mutex::new(HashMap::new()),
            set_calls: AtomicU64::new(0),
        }
    }

    /// Current replica count for a service.
    pub async fn replicas(&self, service: &str) -> u32 {
        self.replicas
            .lock()
            .await
            .get(service)
            .copied()
            .unwrap_or(self.initial)
    }

    /// Number of `set_replicas` calls so far.
    pub fn set_calls(&self) -> u64 {
        self.set_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Orchestrator for DryRunOrchestrator {
    async fn get_replicas(&self, service: &str) -> Result<u32, OrchestratorError> {
        Ok(self.replicas(service).await)
    }

    async fn set_replicas(&self, service: &str, replicas: u32) -> Result<(), OrchestratorError> {
        self.set_calls.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .replicas
            .lock()
            .await
            .insert(service.to_string(), replicas)
            .unwrap_or(self.initial);
        info!(%service, from = previous, to = replicas, "dry-run: replicas set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dry_run_tracks_replicas() {
        let orch = DryRunOrchestrator::new(2);
        assert_eq!(orch.get_replicas("checkout").await.unwrap(), 2);

        orch.set_replicas("checkout", 5).await.unwrap();
        assert_eq!(orch.get_replicas("checkout").await.unwrap(), 5);
        assert_eq!(orch.get_replicas("cart").await.unwrap(), 2);
        assert_eq!(orch.set_calls(), 1);
    }

    #[tokio::test]
    async fn set_is_idempotent() {
        let orch = DryRunOrchestrator::new(1);
        orch.set_replicas("checkout", 3).await.unwrap();
        orch.set_replicas("checkout", 3).await.unwrap();
        assert_eq!(orch.replicas("checkout").await, 3);
    }
}
