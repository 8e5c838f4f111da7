//! In-memory cache
//!
//! Owns a jobs/nodes store behind the [`Cache`] contract. `bind` records the
//! assignment; `evict` records the request and marks the stored task as
//! Releasing, so the change surfaces in the next snapshot the same way a
//! cluster-backed cache reports an eviction in flight. Bind and evict
//! failures can be injected for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Cache, Snapshot};
use crate::types::{JobId, JobInfo, NodeInfo, TaskId, TaskInfo, TaskStatus};
use crate::SchedulerError;

#[derive(Default)]
pub struct InMemoryCache {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    jobs: HashMap<JobId, JobInfo>,
    nodes: HashMap<String, NodeInfo>,
    bound: Vec<(TaskId, String)>,
    evicted: Vec<TaskId>,
    fail_binds: bool,
    fail_evicts: bool,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_job(&self, job: JobInfo) {
        let mut state = self.state.write().await;
        state.jobs.insert(job.uid.clone(), job);
    }

    pub async fn add_node(&self, node: NodeInfo) {
        let mut state = self.state.write().await;
        state.nodes.insert(node.name.clone(), node);
    }

    /// Bind calls recorded so far, as `(task, hostname)` pairs.
    pub async fn bound(&self) -> Vec<(TaskId, String)> {
        self.state.read().await.bound.clone()
    }

    /// Evict calls recorded so far.
    pub async fn evicted(&self) -> Vec<TaskId> {
        self.state.read().await.evicted.clone()
    }

    pub async fn fail_binds(&self, fail: bool) {
        self.state.write().await.fail_binds = fail;
    }

    pub async fn fail_evicts(&self, fail: bool) {
        self.state.write().await.fail_evicts = fail;
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn snapshot(&self) -> Snapshot {
        let state = self.state.read().await;
        Snapshot {
            jobs: state.jobs.values().cloned().collect(),
            nodes: state.nodes.values().cloned().collect(),
        }
    }

    async fn bind(&self, task: &TaskInfo, hostname: &str) -> Result<(), SchedulerError> {
        let mut state = self.state.write().await;
        if state.fail_binds {
            return Err(SchedulerError::BindingError(format!(
                "injected bind failure for task {}",
                task.uid
            )));
        }

        debug!(task = %task.uid, node = hostname, "bound task");
        state.bound.push((task.uid.clone(), hostname.to_string()));
        if let Some(job) = state.jobs.get_mut(&task.job) {
            job.set_task_node_name(&task.uid, hostname);
        }
        Ok(())
    }

    async fn evict(&self, task: &TaskInfo) -> Result<(), SchedulerError> {
        let mut state = self.state.write().await;
        if state.fail_evicts {
            return Err(SchedulerError::EvictionError(format!(
                "injected evict failure for task {}",
                task.uid
            )));
        }

        debug!(task = %task.uid, "evicting task");
        state.evicted.push(task.uid.clone());
        if let Some(job) = state.jobs.get_mut(&task.job) {
            job.update_task_status(&task.uid, TaskStatus::Releasing);
        }
        // Re-account the task on its node as Releasing, the way a cluster
        // cache reports a terminating workload.
        for node in state.nodes.values_mut() {
            let Some(held) = node.task(&task.uid).cloned() else {
                continue;
            };
            node.remove_task(&task.uid);
            node.add_task(held.with_status(TaskStatus::Releasing));
            break;
        }
        Ok(())
    }
}
