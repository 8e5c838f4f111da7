//! Preempt action
//!
//! Coordinates preemptor and preemptee selection with two inverse priority
//! queues over the same job ordering, so the best-ranked job takes capacity
//! from the worst-ranked one rather than from an arbitrary victim. Per-job
//! task queues pick the most important pending task to place and the least
//! important running task to release.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, error};

use super::Action;
use crate::queue::{reverse, PriorityQueue};
use crate::session::Session;
use crate::types::{JobId, TaskInfo, TaskStatus};
use crate::SchedulerError;

pub const ACTION_NAME: &str = "preempt";

pub struct PreemptAction;

impl PreemptAction {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PreemptAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Action for PreemptAction {
    fn name(&self) -> &str {
        ACTION_NAME
    }

    async fn execute(&mut self, ssn: &mut Session) -> Result<(), SchedulerError> {
        debug!(session = %ssn.id, "entering preempt");

        let job_cmp = ssn.job_order_cmp();
        let task_cmp = ssn.task_order_cmp();

        let mut preemptors = PriorityQueue::new(job_cmp.clone());
        let mut preemptees = PriorityQueue::new(reverse(job_cmp));
        let mut preemptor_tasks: HashMap<JobId, PriorityQueue<TaskInfo>> = HashMap::new();
        let mut preemptee_tasks: HashMap<JobId, PriorityQueue<TaskInfo>> = HashMap::new();

        for job in ssn.jobs.values() {
            preemptors.push(job.clone());
            let mut pending = PriorityQueue::new(task_cmp.clone());
            for task in job.tasks_in(TaskStatus::Pending) {
                pending.push(task.clone());
            }
            preemptor_tasks.insert(job.uid.clone(), pending);

            // A job with nothing running holds nothing to release.
            if job.count_in(TaskStatus::Running) != 0 {
                let mut running = PriorityQueue::new(reverse(task_cmp.clone()));
                for task in job.tasks_in(TaskStatus::Running) {
                    running.push(task.clone());
                }
                preemptee_tasks.insert(job.uid.clone(), running);
                preemptees.push(job.clone());
            }
        }

        'round: loop {
            if preemptors.is_empty() || preemptees.is_empty() {
                break;
            }

            let Some(preemptor_job) = preemptors.pop() else {
                break;
            };

            // No pending work left: this preemptor is done for the round.
            if preemptor_tasks
                .get(&preemptor_job.uid)
                .map_or(true, PriorityQueue::is_empty)
            {
                continue;
            }

            let Some(mut preemptee_job) = preemptees.pop() else {
                break;
            };
            while preemptee_tasks
                .get(&preemptee_job.uid)
                .map_or(true, PriorityQueue::is_empty)
                && preemptor_job.uid != preemptee_job.uid
            {
                match preemptees.pop() {
                    Some(next) => preemptee_job = next,
                    None => break 'round,
                }
            }

            // The most underused job cannot yield any capacity; nothing
            // further to take this round.
            if preemptor_job.uid == preemptee_job.uid {
                break;
            }

            debug!(
                preemptor_job = %preemptor_job.uid,
                preemptee_job = %preemptee_job.uid,
                "matched preemption pair"
            );

            let preemptor = preemptor_tasks
                .get_mut(&preemptor_job.uid)
                .and_then(PriorityQueue::pop);
            let preemptee = preemptee_tasks
                .get_mut(&preemptee_job.uid)
                .and_then(PriorityQueue::pop);
            let (Some(preemptor), Some(preemptee)) = (preemptor, preemptee) else {
                preemptees.push(preemptee_job);
                continue;
            };

            let mut preempted = false;
            if ssn.preemptable(&preemptor, &preemptee) {
                match ssn.preempt(&preemptor, &preemptee).await {
                    Ok(()) => preempted = true,
                    Err(err) => {
                        error!(
                            preemptor = %preemptor.uid,
                            preemptee = %preemptee.uid,
                            %err,
                            "failed to evict preemptee"
                        );
                    }
                }
            } else {
                debug!(
                    preemptor = %preemptor.uid,
                    preemptee = %preemptee.uid,
                    "preemption denied by policy"
                );
            }

            if preempted {
                // The winner may have more pending tasks, or may now beat
                // other preemptees; the evicted task does not return.
                preemptors.push(preemptor_job);
            } else if let Some(queue) = preemptee_tasks.get_mut(&preemptee_job.uid) {
                // The survivor stays available to other preemptors; the
                // failed preemptor has spent its turn for this round.
                queue.push(preemptee);
            }

            preemptees.push(preemptee_job);
        }

        debug!(session = %ssn.id, "leaving preempt");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, InMemoryCache};
    use crate::plugins::{priority::PriorityPlugin, Plugin};
    use crate::types::{JobInfo, PodReference, Resource};
    use std::sync::Arc;

    fn make_task(job: &str, name: &str, priority: i32, status: TaskStatus) -> TaskInfo {
        let pod = PodReference {
            uid: format!("uid-{}", name),
            name: name.to_string(),
            namespace: "default".to_string(),
        };
        TaskInfo::new(pod, job, Resource::new(2.0, 100.0))
            .with_priority(priority)
            .with_status(status)
    }

    #[tokio::test]
    async fn test_empty_session_evicts_nothing() {
        let cache = Arc::new(InMemoryCache::new());
        let mut ssn = Session::open(Arc::clone(&cache) as Arc<dyn Cache>).await;

        PreemptAction::new().execute(&mut ssn).await.unwrap();

        assert!(cache.evicted().await.is_empty());
    }

    #[tokio::test]
    async fn test_single_job_never_preempts_itself() {
        let cache = Arc::new(InMemoryCache::new());
        cache
            .add_job(
                JobInfo::new("job-a")
                    .with_task(make_task("job-a", "running", 0, TaskStatus::Running))
                    .with_task(make_task("job-a", "pending", 0, TaskStatus::Pending)),
            )
            .await;

        let mut ssn = Session::open(Arc::clone(&cache) as Arc<dyn Cache>).await;
        ssn.add_preemptable_fn(Arc::new(|_, _| true));

        PreemptAction::new().execute(&mut ssn).await.unwrap();

        assert!(cache.evicted().await.is_empty());
    }

    #[tokio::test]
    async fn test_higher_priority_job_preempts_lower() {
        let cache = Arc::new(InMemoryCache::new());
        cache
            .add_job(
                JobInfo::new("job-a")
                    .with_priority(10)
                    .with_task(make_task("job-a", "claimant", 10, TaskStatus::Pending)),
            )
            .await;
        cache
            .add_job(
                JobInfo::new("job-b")
                    .with_priority(1)
                    .with_task(make_task("job-b", "victim", 1, TaskStatus::Running)),
            )
            .await;

        let mut ssn = Session::open(Arc::clone(&cache) as Arc<dyn Cache>).await;
        PriorityPlugin.on_session_open(&mut ssn);

        PreemptAction::new().execute(&mut ssn).await.unwrap();

        assert_eq!(cache.evicted().await, vec!["default/victim".to_string()]);
    }

    #[tokio::test]
    async fn test_denied_preemption_leaves_victim_running() {
        let cache = Arc::new(InMemoryCache::new());
        cache
            .add_job(
                JobInfo::new("job-a")
                    .with_task(make_task("job-a", "claimant", 0, TaskStatus::Pending)),
            )
            .await;
        cache
            .add_job(
                JobInfo::new("job-b")
                    .with_task(make_task("job-b", "victim", 0, TaskStatus::Running)),
            )
            .await;

        let mut ssn = Session::open(Arc::clone(&cache) as Arc<dyn Cache>).await;
        // No preemptable predicates registered: preemption is disallowed.

        PreemptAction::new().execute(&mut ssn).await.unwrap();

        assert!(cache.evicted().await.is_empty());
    }

    #[tokio::test]
    async fn test_eviction_error_is_not_fatal() {
        let cache = Arc::new(InMemoryCache::new());
        cache
            .add_job(
                JobInfo::new("job-a")
                    .with_priority(10)
                    .with_task(make_task("job-a", "claimant", 10, TaskStatus::Pending)),
            )
            .await;
        cache
            .add_job(
                JobInfo::new("job-b")
                    .with_task(make_task("job-b", "victim", 0, TaskStatus::Running)),
            )
            .await;
        cache.fail_evicts(true).await;

        let mut ssn = Session::open(Arc::clone(&cache) as Arc<dyn Cache>).await;
        PriorityPlugin.on_session_open(&mut ssn);

        // The action treats a failed eviction as a non-preemption and
        // terminates normally.
        PreemptAction::new().execute(&mut ssn).await.unwrap();

        assert!(cache.evicted().await.is_empty());
    }

    #[tokio::test]
    async fn test_preempts_worst_ranked_job_first() {
        let cache = Arc::new(InMemoryCache::new());
        cache
            .add_job(
                JobInfo::new("job-high")
                    .with_priority(10)
                    .with_task(make_task("job-high", "claimant", 10, TaskStatus::Pending)),
            )
            .await;
        cache
            .add_job(
                JobInfo::new("job-mid")
                    .with_priority(5)
                    .with_task(make_task("job-mid", "mid-victim", 5, TaskStatus::Running)),
            )
            .await;
        cache
            .add_job(
                JobInfo::new("job-low")
                    .with_priority(1)
                    .with_task(make_task("job-low", "low-victim", 1, TaskStatus::Running)),
            )
            .await;

        let mut ssn = Session::open(Arc::clone(&cache) as Arc<dyn Cache>).await;
        PriorityPlugin.on_session_open(&mut ssn);

        PreemptAction::new().execute(&mut ssn).await.unwrap();

        // The lowest-ranked job is drained before the mid one is touched.
        let evicted = cache.evicted().await;
        assert_eq!(evicted.first(), Some(&"default/low-victim".to_string()));
    }
}
