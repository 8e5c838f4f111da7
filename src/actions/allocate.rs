//! Allocate action
//!
//! Walks jobs in scheduling order and places their pending tasks on the
//! first node with room. Idle capacity is claimed outright; capacity still
//! being released by evicted tasks is claimed through pipelining.

use async_trait::async_trait;
use tracing::{debug, error};

use super::Action;
use crate::queue::PriorityQueue;
use crate::session::Session;
use crate::types::{TaskInfo, TaskStatus};
use crate::SchedulerError;

pub const ACTION_NAME: &str = "allocate";

pub struct AllocateAction;

impl AllocateAction {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AllocateAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Action for AllocateAction {
    fn name(&self) -> &str {
        ACTION_NAME
    }

    async fn execute(&mut self, ssn: &mut Session) -> Result<(), SchedulerError> {
        debug!(session = %ssn.id, "entering allocate");

        let job_cmp = ssn.job_order_cmp();
        let task_cmp = ssn.task_order_cmp();

        let mut jobs = PriorityQueue::new(job_cmp);
        for job in ssn.jobs.values() {
            jobs.push(job.clone());
        }

        // Nodes are scanned in name order so identical snapshots yield
        // identical placements.
        let mut node_names: Vec<String> = ssn.nodes.keys().cloned().collect();
        node_names.sort();

        while let Some(job) = jobs.pop() {
            let mut tasks = PriorityQueue::new(task_cmp.clone());
            for task in job.tasks_in(TaskStatus::Pending) {
                tasks.push(task.clone());
            }

            while let Some(task) = tasks.pop() {
                if let Some(hostname) = find_fit(ssn, &node_names, &task, Fit::Idle) {
                    if let Err(err) = ssn.allocate(&task, &hostname).await {
                        error!(task = %task.uid, node = %hostname, %err, "allocation failed");
                    }
                } else if let Some(hostname) = find_fit(ssn, &node_names, &task, Fit::Releasing) {
                    if let Err(err) = ssn.pipeline(&task, &hostname) {
                        error!(task = %task.uid, node = %hostname, %err, "pipelining failed");
                    }
                } else {
                    debug!(task = %task.uid, "no node fits the task this round");
                }
            }
        }

        debug!(session = %ssn.id, "leaving allocate");
        Ok(())
    }
}

enum Fit {
    Idle,
    Releasing,
}

fn find_fit(ssn: &Session, node_names: &[String], task: &TaskInfo, fit: Fit) -> Option<String> {
    node_names
        .iter()
        .find(|name| {
            ssn.nodes.get(*name).map_or(false, |node| match fit {
                Fit::Idle => task.resreq.less_equal(&node.idle),
                Fit::Releasing => task.resreq.less_equal(&node.releasing),
            })
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, InMemoryCache};
    use crate::plugins::Plugin;
    use crate::types::{ClusterNode, JobInfo, NodeInfo, PodReference, Resource};
    use std::sync::Arc;

    fn make_task(job: &str, name: &str, cpu: f64, status: TaskStatus) -> TaskInfo {
        let pod = PodReference {
            uid: format!("uid-{}", name),
            name: name.to_string(),
            namespace: "default".to_string(),
        };
        TaskInfo::new(pod, job, Resource::new(cpu, 100.0)).with_status(status)
    }

    fn make_node(name: &str, cpu: f64) -> NodeInfo {
        NodeInfo::new(Arc::new(ClusterNode {
            name: name.to_string(),
            capacity: Resource::new(cpu, 10_000.0),
            allocatable: Resource::new(cpu, 10_000.0),
        }))
    }

    #[tokio::test]
    async fn test_allocates_pending_task_to_fitting_node() {
        let cache = Arc::new(InMemoryCache::new());
        cache
            .add_job(JobInfo::new("job-a").with_task(make_task("job-a", "t1", 2.0, TaskStatus::Pending)))
            .await;
        cache.add_node(make_node("node-1", 4.0)).await;

        let mut ssn = Session::open(Arc::clone(&cache) as Arc<dyn Cache>).await;
        AllocateAction::new().execute(&mut ssn).await.unwrap();

        // No readiness predicates registered: dispatch follows immediately.
        assert_eq!(
            cache.bound().await,
            vec![("default/t1".to_string(), "node-1".to_string())]
        );
        assert_eq!(ssn.nodes["node-1"].idle.cpu_cores, 2.0);
    }

    #[tokio::test]
    async fn test_skips_task_too_large_for_any_node() {
        let cache = Arc::new(InMemoryCache::new());
        cache
            .add_job(JobInfo::new("job-a").with_task(make_task("job-a", "t1", 8.0, TaskStatus::Pending)))
            .await;
        cache.add_node(make_node("node-1", 4.0)).await;

        let mut ssn = Session::open(Arc::clone(&cache) as Arc<dyn Cache>).await;
        AllocateAction::new().execute(&mut ssn).await.unwrap();

        assert!(cache.bound().await.is_empty());
        assert_eq!(ssn.jobs["job-a"].count_in(TaskStatus::Pending), 1);
    }

    #[tokio::test]
    async fn test_scans_nodes_in_name_order() {
        let cache = Arc::new(InMemoryCache::new());
        cache
            .add_job(JobInfo::new("job-a").with_task(make_task("job-a", "t1", 2.0, TaskStatus::Pending)))
            .await;
        cache.add_node(make_node("node-b", 4.0)).await;
        cache.add_node(make_node("node-a", 4.0)).await;

        let mut ssn = Session::open(Arc::clone(&cache) as Arc<dyn Cache>).await;
        AllocateAction::new().execute(&mut ssn).await.unwrap();

        assert_eq!(
            cache.bound().await,
            vec![("default/t1".to_string(), "node-a".to_string())]
        );
    }

    #[tokio::test]
    async fn test_pipelines_onto_releasing_capacity() {
        let cache = Arc::new(InMemoryCache::new());
        let mut node = make_node("node-1", 4.0);
        node.add_task(
            make_task("job-b", "victim", 4.0, TaskStatus::Releasing).with_node_name("node-1"),
        );
        cache.add_node(node).await;
        cache
            .add_job(JobInfo::new("job-a").with_task(make_task("job-a", "t1", 4.0, TaskStatus::Pending)))
            .await;

        let mut ssn = Session::open(Arc::clone(&cache) as Arc<dyn Cache>).await;
        AllocateAction::new().execute(&mut ssn).await.unwrap();

        // The node is full but releasing capacity covers the request: the
        // task is pipelined, not bound.
        assert!(cache.bound().await.is_empty());
        assert_eq!(ssn.jobs["job-a"].count_in(TaskStatus::Pipelined), 1);
        assert_eq!(ssn.nodes["node-1"].releasing.cpu_cores, 0.0);
        assert_eq!(ssn.nodes["node-1"].used.cpu_cores, 8.0);
    }

    #[tokio::test]
    async fn test_higher_priority_job_allocates_first() {
        let cache = Arc::new(InMemoryCache::new());
        cache
            .add_job(
                JobInfo::new("job-low")
                    .with_priority(1)
                    .with_task(make_task("job-low", "low", 3.0, TaskStatus::Pending)),
            )
            .await;
        cache
            .add_job(
                JobInfo::new("job-high")
                    .with_priority(10)
                    .with_task(make_task("job-high", "high", 3.0, TaskStatus::Pending)),
            )
            .await;
        cache.add_node(make_node("node-1", 4.0)).await;

        let mut ssn = Session::open(Arc::clone(&cache) as Arc<dyn Cache>).await;
        crate::plugins::priority::PriorityPlugin.on_session_open(&mut ssn);

        AllocateAction::new().execute(&mut ssn).await.unwrap();

        // Only one task fits; the higher-priority job wins the capacity.
        assert_eq!(
            cache.bound().await,
            vec![("default/high".to_string(), "node-1".to_string())]
        );
    }
}
