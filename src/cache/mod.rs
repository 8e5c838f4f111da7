//! Cluster cache contract
//!
//! The cache watches cluster objects, materialises them into the snapshot
//! entities the session works on, and applies bind/evict outcomes back to
//! the cluster. Only the contract lives here; [`memory`] provides the
//! in-process implementation used by tests and by the binary until a live
//! cluster source is wired in.

use async_trait::async_trait;

use crate::types::{JobInfo, NodeInfo, TaskInfo};
use crate::SchedulerError;

pub mod memory;

pub use memory::InMemoryCache;

/// Point-in-time view of cluster state, deeply owned by the caller. The
/// session may mutate it freely without affecting the source.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub jobs: Vec<JobInfo>,
    pub nodes: Vec<NodeInfo>,
}

#[async_trait]
pub trait Cache: Send + Sync {
    /// Take a consistent snapshot of the cluster.
    async fn snapshot(&self) -> Snapshot;

    /// Durably assign `task` to `hostname` in the cluster.
    async fn bind(&self, task: &TaskInfo, hostname: &str) -> Result<(), SchedulerError>;

    /// Ask the cluster to stop the task. Success means the request was
    /// accepted, not that the eviction has completed.
    async fn evict(&self, task: &TaskInfo) -> Result<(), SchedulerError>;
}
