//! Plugin surface
//!
//! Plugins install ordering, readiness and preemption policies plus event
//! handlers when a session opens. The registry maps configured plugin names
//! to factories so the driver can resolve its plugin list at construction.

use dashmap::DashMap;

use crate::session::Session;

pub mod gang;
pub mod priority;

/// A named bundle of scheduling policies.
///
/// `on_session_open` installs the bundle on a fresh session; plugins may
/// mutate the session only through its registration methods.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn on_session_open(&self, ssn: &mut Session);

    fn on_session_close(&self, _ssn: &mut Session) {}
}

/// Factory producing a fresh plugin instance.
pub type PluginFactory = Box<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// Name → factory registry for plugins.
pub struct PluginRegistry {
    factories: DashMap<String, PluginFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }

    pub fn register(&self, name: impl Into<String>, factory: PluginFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Instantiate a registered plugin by name.
    pub fn build(&self, name: &str) -> Option<Box<dyn Plugin>> {
        self.factories.get(name).map(|factory| (factory.value())())
    }

    pub fn names(&self) -> Vec<String> {
        self.factories
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry preloaded with the built-in plugins.
pub fn default_registry() -> PluginRegistry {
    let registry = PluginRegistry::new();
    registry.register(
        priority::PLUGIN_NAME,
        Box::new(|| Box::new(priority::PriorityPlugin) as Box<dyn Plugin>),
    );
    registry.register(
        gang::PLUGIN_NAME,
        Box::new(|| Box::new(gang::GangPlugin) as Box<dyn Plugin>),
    );
    registry
}
