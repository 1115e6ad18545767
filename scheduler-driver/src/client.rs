//! The cluster-facing surface the driver applies plans against (§4.3, §6,
//! §10). No real transport lives here: the trait captures exactly the four
//! operations the driver needs, and a real cluster backend is a separate
//! crate that would implement it. Tests here run against [`FakeClusterClient`].

use async_trait::async_trait;
use scheduler_core::{Node, Pod, PodId};

/// Errors a [`ClusterClient`] implementation can surface. The tick loop
/// treats [`DriverError::Transient`] as retry-next-tick and everything else
/// as fatal to the whole run (§7).
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("transient cluster error: {0}")]
    Transient(String),
    #[error("permanent cluster error: {0}")]
    Permanent(String),
}

/// Abstracts the cluster API surface the driver needs (§6): read the
/// current nodes/pods, and apply the two action kinds a [`Plan`] can emit.
///
/// [`Plan`]: scheduler_core::Plan
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<Node>, DriverError>;
    async fn list_pods(&self) -> Result<Vec<Pod>, DriverError>;
    async fn create_binding(&self, pod: &PodId, node: &str) -> Result<(), DriverError>;
    async fn create_eviction(&self, pod: &PodId) -> Result<(), DriverError>;
}
