//! Scheduler binary
//!
//! Runs decision rounds on a fixed period. Exits non-zero on initialisation
//! failure so the process supervisor can restart it.

use std::sync::Arc;

use arbiter::cache::InMemoryCache;
use arbiter::plugins::default_registry;
use arbiter::{Scheduler, SchedulerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut config = SchedulerConfig::default();
    if let Ok(period) = std::env::var("SCHEDULE_PERIOD_MS") {
        config.schedule_period_ms = period.parse()?;
    }
    if let Ok(actions) = std::env::var("SCHEDULER_ACTIONS") {
        config.actions = split_names(&actions);
    }
    if let Ok(plugins) = std::env::var("SCHEDULER_PLUGINS") {
        config.plugins = split_names(&plugins);
    }

    // Stands in until a cluster-watching cache is wired up.
    let cache = Arc::new(InMemoryCache::new());

    let registry = default_registry();
    let mut scheduler = Scheduler::new(cache, &registry, config)?;

    tracing::info!("scheduler starting");
    scheduler.run().await?;

    Ok(())
}

fn split_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
