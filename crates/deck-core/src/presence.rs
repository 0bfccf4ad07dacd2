//! Edge-triggered application presence tracking.
//!
//! Per plugin, a map from lower-cased application name to the last observed
//! running flag. `observe` reports only transitions; steady state produces
//! nothing, so repeated poll cycles never duplicate notifications. State is
//! created lazily on first poll and never persisted.

use std::collections::HashMap;

/// Edge transition of one monitored application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceTransition {
    /// false -> true
    Launched,
    /// true -> false
    Terminated,
}

/// Last-observed running state per `(plugin, app)` pair
#[derive(Debug, Default)]
pub struct PresenceTracker {
    seen: HashMap<String, HashMap<String, bool>>,
}

impl PresenceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation and return the transition, if any.
    ///
    /// Unseen pairs are treated as not-running, so an app already running
    /// at the first poll reports `Launched` once.
    pub fn observe(
        &mut self,
        plugin_id: &str,
        app_name: &str,
        running: bool,
    ) -> Option<PresenceTransition> {
        let app_key = app_name.to_lowercase();
        let apps = self.seen.entry(plugin_id.to_string()).or_default();
        let previous = apps.insert(app_key, running).unwrap_or(false);

        match (previous, running) {
            (false, true) => Some(PresenceTransition::Launched),
            (true, false) => Some(PresenceTransition::Terminated),
            _ => None,
        }
    }

    /// Drop all state for a plugin (used when a descriptor set changes).
    pub fn forget_plugin(&mut self, plugin_id: &str) {
        self.seen.remove(plugin_id);
    }
}
