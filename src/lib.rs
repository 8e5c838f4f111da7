//! Batch-aware workload scheduler core
//!
//! Assigns units of work (tasks) grouped into jobs onto cluster nodes, one
//! short-lived decision round at a time. Each round opens a session over a
//! cache snapshot, runs the configured actions under pluggable policies, and
//! emits bind/evict decisions back to the cache.
//!
//! Architecture:
//! - `types`: resource vectors plus task/job/node entities with per-status
//!   indexing and three-way idle/used/releasing node accounting
//! - `cache`: the snapshot producer and bind/evict sink contract
//! - `session`: one round's snapshot-scoped state and decision operations
//! - `plugins`: pluggable ordering, readiness and preemption policies
//! - `actions`: algorithmic phases (allocate, preempt) over a session
//! - `queue`: the comparator-parameterised priority queue the actions use

pub mod actions;
pub mod cache;
pub mod plugins;
pub mod queue;
pub mod session;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::actions::new_action;
use crate::cache::Cache;
use crate::plugins::{Plugin, PluginRegistry};
use crate::session::Session;

pub use crate::types::{JobId, TaskId};

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Delay between decision rounds, in milliseconds.
    pub schedule_period_ms: u64,
    /// Actions executed per round, in order.
    pub actions: Vec<String>,
    /// Plugins resolved against the registry at construction.
    pub plugins: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            schedule_period_ms: 1_000,
            actions: vec!["allocate".to_string(), "preempt".to_string()],
            plugins: vec!["priority".to_string(), "gang".to_string()],
        }
    }
}

/// Custom error types.
#[derive(thiserror::Error, Debug)]
pub enum SchedulerError {
    #[error("task {0} has no assigned node")]
    TaskNotAssigned(TaskId),

    #[error("binding failed: {0}")]
    BindingError(String),

    #[error("eviction failed: {0}")]
    EvictionError(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Drives decision rounds over a cache.
pub struct Scheduler {
    cache: Arc<dyn Cache>,
    plugins: Vec<Box<dyn Plugin>>,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Resolve the configured plugins and actions and build a scheduler.
    pub fn new(
        cache: Arc<dyn Cache>,
        registry: &PluginRegistry,
        config: SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        let mut plugins = Vec::with_capacity(config.plugins.len());
        for name in &config.plugins {
            let plugin = registry
                .build(name)
                .ok_or_else(|| SchedulerError::UnknownPlugin(name.clone()))?;
            plugins.push(plugin);
        }

        // Surface action typos at construction, not mid-round.
        for name in &config.actions {
            new_action(name)?;
        }

        Ok(Self {
            cache,
            plugins,
            config,
        })
    }

    /// One decision round: open a session, let the plugins install their
    /// policies, run the configured actions in order, close the session.
    pub async fn run_once(&mut self) -> Result<(), SchedulerError> {
        let mut ssn = Session::open(Arc::clone(&self.cache)).await;

        for plugin in &self.plugins {
            plugin.on_session_open(&mut ssn);
        }

        for name in &self.config.actions {
            let mut action = new_action(name)?;
            action.initialize();
            if let Err(err) = action.execute(&mut ssn).await {
                // A failing action must not drop the rest of the round.
                error!(action = name.as_str(), %err, "action failed");
            }
            action.un_initialize();
        }

        for plugin in &self.plugins {
            plugin.on_session_close(&mut ssn);
        }

        ssn.close();
        Ok(())
    }

    /// Run decision rounds forever on the configured period.
    pub async fn run(&mut self) -> Result<(), SchedulerError> {
        let period = Duration::from_millis(self.config.schedule_period_ms);
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            debug!("starting decision round");
            self.run_once().await?;
        }
    }
}
