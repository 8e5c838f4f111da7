//! Task entities
//!
//! A task is the unit of placement: one container workload with a resource
//! request, owned by a job and carried through the status lifecycle by the
//! session.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::resource::Resource;

/// Process-wide unique task identifier, derived from the backing cluster
/// object (`namespace/name`).
pub type TaskId = String;

/// Unique identifier of the owning job.
pub type JobId = String;

/// Lifecycle states of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Waiting for a placement decision.
    Pending,
    /// A node was chosen this round; the cluster has not been asked to bind.
    Allocated,
    /// Placed onto capacity still being released by an evicted task.
    Pipelined,
    /// The bind request has been issued to the cluster.
    Binding,
    Bound,
    Running,
    /// Eviction requested; capacity is on its way back to the node.
    Releasing,
    Succeeded,
    Failed,
    Unknown,
}

impl TaskStatus {
    /// States in which the scheduler has secured a node for the task.
    pub fn is_allocated(&self) -> bool {
        matches!(
            self,
            TaskStatus::Allocated | TaskStatus::Binding | TaskStatus::Bound | TaskStatus::Running
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Allocated => "Allocated",
            TaskStatus::Pipelined => "Pipelined",
            TaskStatus::Binding => "Binding",
            TaskStatus::Bound => "Bound",
            TaskStatus::Running => "Running",
            TaskStatus::Releasing => "Releasing",
            TaskStatus::Succeeded => "Succeeded",
            TaskStatus::Failed => "Failed",
            TaskStatus::Unknown => "Unknown",
        };
        write!(f, "{}", name)
    }
}

/// Reference to the cluster object a task was materialised from.
///
/// Opaque to the scheduling core and treated as immutable for the lifetime
/// of a session; clones of the task share it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodReference {
    pub uid: String,
    pub name: String,
    pub namespace: String,
}

/// Stable task key derived from the backing cluster object.
pub fn pod_key(pod: &PodReference) -> TaskId {
    format!("{}/{}", pod.namespace, pod.name)
}

/// A single schedulable unit.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub uid: TaskId,
    /// Owning job.
    pub job: JobId,
    pub name: String,
    pub namespace: String,
    /// Assigned node; `None` until allocation.
    pub node_name: Option<String>,
    /// Resource request, immutable after creation.
    pub resreq: Resource,
    pub status: TaskStatus,
    pub priority: i32,
    pub pod: Arc<PodReference>,
}

impl TaskInfo {
    pub fn new(pod: PodReference, job: impl Into<JobId>, resreq: Resource) -> Self {
        let pod = Arc::new(pod);
        Self {
            uid: pod_key(&pod),
            job: job.into(),
            name: pod.name.clone(),
            namespace: pod.namespace.clone(),
            node_name: None,
            resreq,
            status: TaskStatus::Pending,
            priority: 0,
            pod,
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = Some(node_name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_key_is_stable() {
        let pod = PodReference {
            uid: "u-1".to_string(),
            name: "worker-0".to_string(),
            namespace: "ci".to_string(),
        };

        assert_eq!(pod_key(&pod), "ci/worker-0");
    }

    #[test]
    fn test_new_task_starts_pending() {
        let pod = PodReference {
            uid: "u-1".to_string(),
            name: "worker-0".to_string(),
            namespace: "ci".to_string(),
        };
        let task = TaskInfo::new(pod, "job-a", Resource::new(2.0, 100.0));

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.uid, "ci/worker-0");
        assert!(task.node_name.is_none());
    }

    #[test]
    fn test_clone_shares_pod_reference() {
        let pod = PodReference {
            uid: "u-1".to_string(),
            name: "worker-0".to_string(),
            namespace: "ci".to_string(),
        };
        let task = TaskInfo::new(pod, "job-a", Resource::empty());
        let clone = task.clone();

        assert!(Arc::ptr_eq(&task.pod, &clone.pod));
    }

    #[test]
    fn test_is_allocated() {
        assert!(TaskStatus::Allocated.is_allocated());
        assert!(TaskStatus::Binding.is_allocated());
        assert!(TaskStatus::Bound.is_allocated());
        assert!(TaskStatus::Running.is_allocated());
        assert!(!TaskStatus::Pending.is_allocated());
        assert!(!TaskStatus::Pipelined.is_allocated());
        assert!(!TaskStatus::Releasing.is_allocated());
    }
}
