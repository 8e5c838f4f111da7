//! Job entities
//!
//! A job groups the tasks that ship together: one owned task map plus an
//! inverted per-status index used by the session and the actions to walk
//! tasks by lifecycle state.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tracing::error;

use super::task::{JobId, TaskId, TaskInfo, TaskStatus};

/// Aggregated job state for one scheduling round.
///
/// Tasks are owned here; the per-status index stores task IDs only, so the
/// two can never disagree as long as mutation goes through the methods
/// below.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub uid: JobId,
    pub name: String,
    pub namespace: String,
    /// Logical partitioning tag.
    pub queue: String,
    pub priority: i32,
    /// Minimum number of simultaneously allocated tasks for the job to be
    /// considered ready to dispatch.
    pub min_available: usize,
    pub creation_timestamp: DateTime<Utc>,
    tasks: HashMap<TaskId, TaskInfo>,
    task_status_index: HashMap<TaskStatus, BTreeSet<TaskId>>,
}

impl JobInfo {
    pub fn new(uid: impl Into<JobId>) -> Self {
        let uid = uid.into();
        Self {
            name: uid.clone(),
            uid,
            namespace: "default".to_string(),
            queue: "default".to_string(),
            priority: 0,
            min_available: 1,
            creation_timestamp: Utc::now(),
            tasks: HashMap::new(),
            task_status_index: HashMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_min_available(mut self, min_available: usize) -> Self {
        self.min_available = min_available;
        self
    }

    pub fn with_creation_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.creation_timestamp = timestamp;
        self
    }

    pub fn with_task(mut self, task: TaskInfo) -> Self {
        self.add_task_info(task);
        self
    }

    /// Add a task to the job and index it under its current status.
    pub fn add_task_info(&mut self, task: TaskInfo) {
        if self.tasks.contains_key(&task.uid) {
            error!(job = %self.uid, task = %task.uid, "task already in job, ignoring add");
            return;
        }
        self.task_status_index
            .entry(task.status)
            .or_default()
            .insert(task.uid.clone());
        self.tasks.insert(task.uid.clone(), task);
    }

    /// Remove a task from the job and from its status bucket.
    pub fn delete_task_info(&mut self, uid: &str) {
        match self.tasks.remove(uid) {
            Some(task) => {
                if let Some(bucket) = self.task_status_index.get_mut(&task.status) {
                    bucket.remove(uid);
                }
            }
            None => {
                error!(job = %self.uid, task = uid, "task not in job, ignoring delete");
            }
        }
    }

    /// Move a task between status buckets and update its status, atomically
    /// from the caller's point of view. Unknown tasks are a logic error:
    /// logged, no-op.
    pub fn update_task_status(&mut self, uid: &str, status: TaskStatus) {
        let Some(task) = self.tasks.get_mut(uid) else {
            error!(job = %self.uid, task = uid, "task not in job, ignoring status update");
            return;
        };
        let old = task.status;
        if let Some(bucket) = self.task_status_index.get_mut(&old) {
            bucket.remove(uid);
        }
        task.status = status;
        self.task_status_index
            .entry(status)
            .or_default()
            .insert(uid.to_string());
    }

    pub(crate) fn set_task_node_name(&mut self, uid: &str, node_name: &str) {
        let Some(task) = self.tasks.get_mut(uid) else {
            error!(job = %self.uid, task = uid, "task not in job, ignoring node assignment");
            return;
        };
        task.node_name = Some(node_name.to_string());
    }

    pub fn task(&self, uid: &str) -> Option<&TaskInfo> {
        self.tasks.get(uid)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskInfo> {
        self.tasks.values()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Tasks currently in `status`, in stable (task ID) order.
    pub fn tasks_in(&self, status: TaskStatus) -> impl Iterator<Item = &TaskInfo> + '_ {
        self.task_status_index
            .get(&status)
            .into_iter()
            .flatten()
            .filter_map(move |uid| self.tasks.get(uid))
    }

    pub fn count_in(&self, status: TaskStatus) -> usize {
        self.task_status_index
            .get(&status)
            .map_or(0, BTreeSet::len)
    }

    /// Number of tasks the scheduler has secured a node for.
    pub fn ready_task_num(&self) -> usize {
        self.tasks
            .values()
            .filter(|task| task.status.is_allocated())
            .count()
    }

    /// Number of tasks in non-terminal states.
    pub fn valid_task_num(&self) -> usize {
        [
            TaskStatus::Pending,
            TaskStatus::Allocated,
            TaskStatus::Pipelined,
            TaskStatus::Binding,
            TaskStatus::Bound,
            TaskStatus::Running,
            TaskStatus::Releasing,
        ]
        .into_iter()
        .map(|status| self.count_in(status))
        .sum()
    }
}
