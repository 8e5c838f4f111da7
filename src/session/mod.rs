//! Scheduling session
//!
//! A session is the short-lived, single-threaded context for one decision
//! round. It opens over a cache snapshot, carries the policy stack the
//! plugins install, and owns every in-round mutation; changes become
//! externally visible only through the cache's bind/evict sink.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error};
use uuid::Uuid;

use crate::cache::Cache;
use crate::queue::CompareFn;
use crate::types::{JobId, JobInfo, NodeInfo, TaskInfo, TaskStatus};
use crate::SchedulerError;

/// Immutable record passed to event handlers.
///
/// Handlers must not call back into session-mutating methods; they exist for
/// external bookkeeping such as queue-level fair-share accounting.
#[derive(Debug, Clone)]
pub struct Event {
    pub task: TaskInfo,
}

/// Callback fired on allocation or eviction events.
pub type EventFn = Box<dyn Fn(&Event) + Send + Sync>;

/// Paired allocation/eviction callbacks, fired synchronously in
/// registration order before the triggering operation returns.
#[derive(Default)]
pub struct EventHandler {
    pub allocate_func: Option<EventFn>,
    pub evict_func: Option<EventFn>,
}

/// Binary predicate deciding whether `preemptor` may take capacity from
/// `preemptee`.
pub type PreemptableFn = Arc<dyn Fn(&TaskInfo, &TaskInfo) -> bool + Send + Sync>;

/// Unary readiness predicate over a job.
pub type JobReadyFn = Arc<dyn Fn(&JobInfo) -> bool + Send + Sync>;

/// One decision round's snapshot-scoped state.
pub struct Session {
    pub id: Uuid,
    cache: Arc<dyn Cache>,
    pub jobs: HashMap<JobId, JobInfo>,
    pub nodes: HashMap<String, NodeInfo>,
    job_order_fns: Vec<CompareFn<JobInfo>>,
    task_order_fns: Vec<CompareFn<TaskInfo>>,
    preemptable_fns: Vec<PreemptableFn>,
    job_ready_fns: Vec<JobReadyFn>,
    event_handlers: Vec<EventHandler>,
}

impl Session {
    /// Open a session over a fresh cache snapshot, indexing jobs by UID and
    /// nodes by name.
    pub async fn open(cache: Arc<dyn Cache>) -> Self {
        let snapshot = cache.snapshot().await;
        let jobs: HashMap<JobId, JobInfo> = snapshot
            .jobs
            .into_iter()
            .map(|job| (job.uid.clone(), job))
            .collect();
        let nodes: HashMap<String, NodeInfo> = snapshot
            .nodes
            .into_iter()
            .map(|node| (node.name.clone(), node))
            .collect();

        let session = Self {
            id: Uuid::new_v4(),
            cache,
            jobs,
            nodes,
            job_order_fns: Vec::new(),
            task_order_fns: Vec::new(),
            preemptable_fns: Vec::new(),
            job_ready_fns: Vec::new(),
            event_handlers: Vec::new(),
        };

        debug!(
            session = %session.id,
            jobs = session.jobs.len(),
            nodes = session.nodes.len(),
            "opened scheduling session"
        );

        session
    }

    /// End the round. Work already sent to the cache is not rolled back.
    pub fn close(self) {
        debug!(session = %self.id, "closed scheduling session");
    }

    pub fn add_event_handler(&mut self, handler: EventHandler) {
        self.event_handlers.push(handler);
    }

    pub fn add_job_order_fn(&mut self, cmp: CompareFn<JobInfo>) {
        self.job_order_fns.push(cmp);
    }

    pub fn add_task_order_fn(&mut self, cmp: CompareFn<TaskInfo>) {
        self.task_order_fns.push(cmp);
    }

    pub fn add_preemptable_fn(&mut self, f: PreemptableFn) {
        self.preemptable_fns.push(f);
    }

    pub fn add_job_ready_fn(&mut self, f: JobReadyFn) {
        self.job_ready_fns.push(f);
    }

    /// True iff `l` should be scheduled before `r`: first registered
    /// comparator to break the tie wins, UID order on total tie.
    pub fn job_order_fn(&self, l: &JobInfo, r: &JobInfo) -> bool {
        for cmp in &self.job_order_fns {
            match (**cmp)(l, r) {
                Ordering::Equal => continue,
                ordering => return ordering == Ordering::Less,
            }
        }
        l.uid < r.uid
    }

    /// Same contract as [`job_order_fn`](Self::job_order_fn), over tasks.
    pub fn task_order_fn(&self, l: &TaskInfo, r: &TaskInfo) -> bool {
        for cmp in &self.task_order_fns {
            match (**cmp)(l, r) {
                Ordering::Equal => continue,
                ordering => return ordering == Ordering::Less,
            }
        }
        l.uid < r.uid
    }

    /// The aggregated job comparator as an owned value, usable by actions
    /// independently of the session borrow.
    pub fn job_order_cmp(&self) -> CompareFn<JobInfo> {
        let fns = self.job_order_fns.clone();
        Arc::new(move |l, r| {
            for cmp in &fns {
                let ordering = (**cmp)(l, r);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            l.uid.cmp(&r.uid)
        })
    }

    /// The aggregated task comparator as an owned value.
    pub fn task_order_cmp(&self) -> CompareFn<TaskInfo> {
        let fns = self.task_order_fns.clone();
        Arc::new(move |l, r| {
            for cmp in &fns {
                let ordering = (**cmp)(l, r);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            l.uid.cmp(&r.uid)
        })
    }

    /// A job is ready to dispatch iff every registered readiness predicate
    /// passes; with none registered it always is.
    pub fn job_ready(&self, job: &JobInfo) -> bool {
        self.job_ready_fns.iter().all(|f| (**f)(job))
    }

    /// Conjunction over the registered preemption predicates. With none
    /// registered, preemption is disallowed.
    pub fn preemptable(&self, preemptor: &TaskInfo, preemptee: &TaskInfo) -> bool {
        if self.preemptable_fns.is_empty() {
            return false;
        }
        self.preemptable_fns
            .iter()
            .all(|f| (**f)(preemptor, preemptee))
    }

    /// Choose `hostname` for `task`. The task pools in its job's Allocated
    /// bucket; once the readiness predicates pass, the whole bucket is
    /// dispatched to the cache in one go.
    pub async fn allocate(
        &mut self,
        task: &TaskInfo,
        hostname: &str,
    ) -> Result<(), SchedulerError> {
        let updated = self.place(task, hostname, TaskStatus::Allocated);

        if let Some(node) = self.nodes.get_mut(hostname) {
            node.add_task(updated.clone());
        } else {
            error!(
                session = %self.id,
                node = hostname,
                "node not in session index during allocation"
            );
        }

        self.fire_allocate(&updated);

        let ready = self
            .jobs
            .get(&task.job)
            .map(|job| self.job_ready(job))
            .unwrap_or(false);
        if ready {
            let allocated: Vec<TaskInfo> = self
                .jobs
                .get(&task.job)
                .map(|job| job.tasks_in(TaskStatus::Allocated).cloned().collect())
                .unwrap_or_default();
            for task in allocated {
                self.dispatch(&task).await?;
            }
        }

        Ok(())
    }

    /// Reserve capacity that a preemptee is still releasing on `hostname`
    /// for `task`, without waiting for the release to complete.
    pub fn pipeline(&mut self, task: &TaskInfo, hostname: &str) -> Result<(), SchedulerError> {
        let updated = self.place(task, hostname, TaskStatus::Pipelined);

        if let Some(node) = self.nodes.get_mut(hostname) {
            node.pipeline_task(updated.clone());
        } else {
            error!(
                session = %self.id,
                node = hostname,
                "node not in session index during pipelining"
            );
        }

        self.fire_allocate(&updated);

        Ok(())
    }

    /// Evict `preemptee` on behalf of `preemptor`. Node accounting and the
    /// preemptee's status change arrive with the next snapshot; callers that
    /// need the capacity immediately follow up with
    /// [`pipeline`](Self::pipeline).
    pub async fn preempt(
        &mut self,
        preemptor: &TaskInfo,
        preemptee: &TaskInfo,
    ) -> Result<(), SchedulerError> {
        self.cache.evict(preemptee).await?;

        for handler in &self.event_handlers {
            if let Some(f) = &handler.allocate_func {
                f(&Event {
                    task: preemptor.clone(),
                });
            }
            if let Some(f) = &handler.evict_func {
                f(&Event {
                    task: preemptee.clone(),
                });
            }
        }

        Ok(())
    }

    /// Hand a task over to the cache. On success the task moves to Binding;
    /// on failure the in-session state is left as is and the error surfaces
    /// to the caller.
    async fn dispatch(&mut self, task: &TaskInfo) -> Result<(), SchedulerError> {
        let hostname = task
            .node_name
            .clone()
            .ok_or_else(|| SchedulerError::TaskNotAssigned(task.uid.clone()))?;

        self.cache.bind(task, &hostname).await?;

        if let Some(job) = self.jobs.get_mut(&task.job) {
            job.update_task_status(&task.uid, TaskStatus::Binding);
        } else {
            error!(
                session = %self.id,
                job = %task.job,
                "job not in session index during dispatch"
            );
        }

        Ok(())
    }

    /// Move the task into `status` within its job and record the node
    /// assignment, returning the updated task. Index misses are logged and
    /// the task-side view is returned so the caller can proceed.
    fn place(&mut self, task: &TaskInfo, hostname: &str, status: TaskStatus) -> TaskInfo {
        if let Some(job) = self.jobs.get_mut(&task.job) {
            job.update_task_status(&task.uid, status);
            job.set_task_node_name(&task.uid, hostname);
            if let Some(updated) = job.task(&task.uid) {
                return updated.clone();
            }
        } else {
            error!(
                session = %self.id,
                job = %task.job,
                "job not in session index during placement"
            );
        }

        let mut updated = task.clone();
        updated.status = status;
        updated.node_name = Some(hostname.to_string());
        updated
    }

    fn fire_allocate(&self, task: &TaskInfo) {
        for handler in &self.event_handlers {
            if let Some(f) = &handler.allocate_func {
                f(&Event { task: task.clone() });
            }
        }
    }
}
