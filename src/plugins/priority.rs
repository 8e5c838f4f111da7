//! Priority plugin
//!
//! Orders jobs by descending priority with creation time as the tie-break
//! (older first), orders tasks by descending priority, and allows a task to
//! preempt only victims from strictly lower-priority work.

use std::sync::Arc;

use crate::session::Session;

use super::Plugin;

pub const PLUGIN_NAME: &str = "priority";

pub struct PriorityPlugin;

impl Plugin for PriorityPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn on_session_open(&self, ssn: &mut Session) {
        ssn.add_job_order_fn(Arc::new(|l, r| {
            r.priority
                .cmp(&l.priority)
                .then_with(|| l.creation_timestamp.cmp(&r.creation_timestamp))
        }));

        ssn.add_task_order_fn(Arc::new(|l, r| r.priority.cmp(&l.priority)));

        ssn.add_preemptable_fn(Arc::new(|preemptor, preemptee| {
            preemptor.priority > preemptee.priority
        }));
    }
}
