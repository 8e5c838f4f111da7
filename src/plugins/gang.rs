//! Gang plugin
//!
//! Holds a job back from dispatch until its minimum task quorum has been
//! allocated, so a job's tasks cross to the cluster together or not at all.

use std::sync::Arc;

use crate::session::Session;

use super::Plugin;

pub const PLUGIN_NAME: &str = "gang";

pub struct GangPlugin;

impl Plugin for GangPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn on_session_open(&self, ssn: &mut Session) {
        ssn.add_job_ready_fn(Arc::new(|job| job.ready_task_num() >= job.min_available));
    }
}
