//! Node entities
//!
//! A node carries three-way live accounting next to its static capacity:
//! `used` covers every task occupying capacity, `releasing` the subset being
//! evicted, and `idle` what allocation may still claim. Pipelining moves
//! already-released capacity straight from `releasing` into `used` without
//! touching `idle`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error};

use super::resource::Resource;
use super::task::{TaskInfo, TaskStatus};

/// Cluster-side description of a machine, as materialised by the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterNode {
    pub name: String,
    /// Total hardware.
    pub capacity: Resource,
    /// Schedulable subset of the hardware.
    pub allocatable: Resource,
}

/// Node-level aggregated information for one scheduling round.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub name: String,
    /// Backing cluster object; `None` for virtual nodes that only hold
    /// tasks, e.g. before the machine is first observed.
    pub node: Option<Arc<ClusterNode>>,
    pub releasing: Resource,
    pub idle: Resource,
    pub used: Resource,
    pub allocatable: Resource,
    pub capability: Resource,
    tasks: HashMap<String, TaskInfo>,
}

impl NodeInfo {
    pub fn new(node: Arc<ClusterNode>) -> Self {
        Self {
            name: node.name.clone(),
            releasing: Resource::empty(),
            idle: node.allocatable.clone(),
            used: Resource::empty(),
            allocatable: node.allocatable.clone(),
            capability: node.capacity.clone(),
            tasks: HashMap::new(),
            node: Some(node),
        }
    }

    /// A node with no backing cluster object and zero capacity.
    pub fn virtual_node(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node: None,
            releasing: Resource::empty(),
            idle: Resource::empty(),
            used: Resource::empty(),
            allocatable: Resource::empty(),
            capability: Resource::empty(),
            tasks: HashMap::new(),
        }
    }

    /// Bind the accounting to a real cluster object.
    ///
    /// On the first binding, the accounting vectors are reseeded from the
    /// object and every already-held task is replayed against them.
    pub fn set_node(&mut self, node: Arc<ClusterNode>) {
        if self.node.is_none() {
            self.idle = node.allocatable.clone();
            for task in self.tasks.values() {
                if task.status == TaskStatus::Releasing {
                    self.releasing.add(&task.resreq);
                }
                self.idle.sub(&task.resreq);
                self.used.add(&task.resreq);
            }
        }

        self.name = node.name.clone();
        self.allocatable = node.allocatable.clone();
        self.capability = node.capacity.clone();
        self.node = Some(node);
    }

    /// Account a task onto the node. Adding a task twice is a logic error:
    /// logged, no-op.
    pub fn add_task(&mut self, task: TaskInfo) {
        if self.tasks.contains_key(&task.uid) {
            error!(node = %self.name, task = %task.uid, "task already on node, ignoring add");
            return;
        }

        if self.node.is_some() {
            if task.status == TaskStatus::Releasing {
                self.releasing.add(&task.resreq);
            }
            self.idle.sub(&task.resreq);
            self.used.add(&task.resreq);
        }

        debug!(
            node = %self.name,
            task = %task.uid,
            idle = %self.idle,
            used = %self.used,
            releasing = %self.releasing,
            "added task to node"
        );

        self.tasks.insert(task.uid.clone(), task);
    }

    /// Inverse of [`add_task`](Self::add_task). Unknown tasks are ignored.
    pub fn remove_task(&mut self, uid: &str) {
        let Some(task) = self.tasks.remove(uid) else {
            return;
        };

        if self.node.is_some() {
            if task.status == TaskStatus::Releasing {
                self.releasing.sub(&task.resreq);
            }
            self.idle.add(&task.resreq);
            self.used.sub(&task.resreq);
        }

        debug!(
            node = %self.name,
            task = uid,
            idle = %self.idle,
            used = %self.used,
            releasing = %self.releasing,
            "removed task from node"
        );
    }

    /// Account a task onto capacity that is still being released.
    ///
    /// `idle` was already credited when the releasing task left the active
    /// set, so only `releasing` and `used` move here.
    pub fn pipeline_task(&mut self, task: TaskInfo) {
        if self.tasks.contains_key(&task.uid) {
            error!(node = %self.name, task = %task.uid, "task already on node, ignoring pipeline");
            return;
        }

        if self.node.is_some() {
            self.releasing.sub(&task.resreq);
            self.used.add(&task.resreq);
        }

        self.tasks.insert(task.uid.clone(), task);
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
}
