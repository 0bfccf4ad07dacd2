//! Context registry: the authoritative table of placed button instances.
//!
//! A context is one instantiated action at specific coordinates. Contexts
//! start with `pending_appearance = true` and stay pending until the owning
//! plugin's socket has received `willAppear`; the host replays pending
//! contexts in creation order whenever that plugin (re)registers.
//!
//! Contexts are retained after `willDisappear` so out-of-order show/hide
//! from the front-end cannot lose state; removal is an explicit operation.

use crate::error::{Error, Result};
use deck_types::{ContextSnapshot, Controller, Coordinates};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// One placed button instance.
#[derive(Debug, Clone)]
pub struct Context {
    pub context_id: String,
    pub plugin_id: String,
    pub action_id: String,
    pub device: String,
    pub coordinates: Coordinates,
    pub controller: Controller,
    /// Current visual state index
    pub state: u32,
    pub settings: Value,
    /// True until `willAppear` has been delivered to the owning plugin
    pub pending_appearance: bool,
}

impl Context {
    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            context_id: self.context_id.clone(),
            plugin_id: self.plugin_id.clone(),
            action_id: self.action_id.clone(),
            device: self.device.clone(),
            coordinates: self.coordinates,
            controller: self.controller,
            state: self.state,
            settings: self.settings.clone(),
            pending_appearance: self.pending_appearance,
        }
    }
}

/// Creation request for a context.
#[derive(Debug, Clone)]
pub struct CreateContext {
    pub plugin_id: String,
    pub action_id: String,
    pub device: String,
    pub coordinates: Coordinates,
    pub controller: Controller,
    /// Caller-supplied id for stable restoration across restarts
    pub preferred_id: Option<String>,
}

/// Authoritative table of button instances
#[derive(Debug, Default)]
pub struct ContextRegistry {
    contexts: HashMap<String, Context>,
    /// Creation order, for deterministic pending replay
    order: Vec<String>,
}

impl ContextRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context, minting a fresh id unless `preferred_id` is free.
    ///
    /// The new context starts pending with `initial_settings` (typically the
    /// persisted blob for a restored id). Returns the context id.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateContext` if `preferred_id` is already taken.
    pub fn create(&mut self, request: CreateContext, initial_settings: Value) -> Result<String> {
        let context_id = match request.preferred_id {
            Some(id) => {
                if self.contexts.contains_key(&id) {
                    return Err(Error::DuplicateContext(id));
                }
                id
            }
            None => uuid::Uuid::new_v4().to_string(),
        };

        debug!(
            "[{}] Creating context {} for action {} at ({}, {})",
            request.plugin_id,
            context_id,
            request.action_id,
            request.coordinates.column,
            request.coordinates.row
        );

        let context = Context {
            context_id: context_id.clone(),
            plugin_id: request.plugin_id,
            action_id: request.action_id,
            device: request.device,
            coordinates: request.coordinates,
            controller: request.controller,
            state: 0,
            settings: initial_settings,
            pending_appearance: true,
        };

        self.contexts.insert(context_id.clone(), context);
        self.order.push(context_id.clone());
        Ok(context_id)
    }

    #[must_use]
    pub fn get(&self, context_id: &str) -> Option<&Context> {
        self.contexts.get(context_id)
    }

    #[must_use]
    pub fn contains(&self, context_id: &str) -> bool {
        self.contexts.contains_key(context_id)
    }

    /// Owning plugin of a context, if known.
    #[must_use]
    pub fn plugin_of(&self, context_id: &str) -> Option<&str> {
        self.contexts.get(context_id).map(|c| c.plugin_id.as_str())
    }

    /// Update the cached settings blob for a context.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownContext` if the id is not registered.
    pub fn set_settings(&mut self, context_id: &str, settings: Value) -> Result<()> {
        let context = self
            .contexts
            .get_mut(context_id)
            .ok_or_else(|| Error::UnknownContext(context_id.to_string()))?;
        context.settings = settings;
        Ok(())
    }

    /// Update the visual state index for a context.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownContext` if the id is not registered.
    pub fn set_state(&mut self, context_id: &str, state: u32) -> Result<()> {
        let context = self
            .contexts
            .get_mut(context_id)
            .ok_or_else(|| Error::UnknownContext(context_id.to_string()))?;
        context.state = state;
        Ok(())
    }

    /// Clear the pending-appearance flag after a delivered `willAppear`.
    pub fn mark_delivered(&mut self, context_id: &str) {
        if let Some(context) = self.contexts.get_mut(context_id) {
            context.pending_appearance = false;
        }
    }

    /// Context ids still awaiting `willAppear` for a plugin, creation order.
    #[must_use]
    pub fn pending_for(&self, plugin_id: &str) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| {
                self.contexts
                    .get(*id)
                    .is_some_and(|c| c.plugin_id == plugin_id && c.pending_appearance)
            })
            .cloned()
            .collect()
    }

    /// Remove a context entry. Persisted settings are not touched.
    pub fn remove(&mut self, context_id: &str) -> Option<Context> {
        let removed = self.contexts.remove(context_id);
        if removed.is_some() {
            self.order.retain(|id| id != context_id);
            debug!("Removed context {}", context_id);
        }
        removed
    }

    /// Snapshots of every context, creation order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ContextSnapshot> {
        self.order
            .iter()
            .filter_map(|id| self.contexts.get(id))
            .map(Context::snapshot)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(plugin: &str, preferred: Option<&str>) -> CreateContext {
        CreateContext {
            plugin_id: plugin.to_string(),
            action_id: format!("{plugin}.tick"),
            device: "virtual".to_string(),
            coordinates: Coordinates::new(0, 0),
            controller: Controller::Keypad,
            preferred_id: preferred.map(String::from),
        }
    }

    #[test]
    fn test_create_mints_unique_ids() {
        let mut registry = ContextRegistry::new();
        let a = registry
            .create(request("com.example.counter", None), Value::Null)
            .unwrap();
        let b = registry
            .create(request("com.example.counter", None), Value::Null)
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_create_with_preferred_id() {
        let mut registry = ContextRegistry::new();
        let id = registry
            .create(request("com.example.counter", Some("ctx1")), Value::Null)
            .unwrap();
        assert_eq!(id, "ctx1");
        assert!(registry.contains("ctx1"));
    }

    #[test]
    fn test_create_duplicate_preferred_id_fails() {
        let mut registry = ContextRegistry::new();
        registry
            .create(request("com.example.counter", Some("ctx1")), Value::Null)
            .unwrap();
        let result = registry.create(request("com.example.counter", Some("ctx1")), Value::Null);
        assert!(matches!(result, Err(Error::DuplicateContext(_))));
    }

    #[test]
    fn test_new_context_starts_pending_with_settings() {
        let mut registry = ContextRegistry::new();
        let id = registry
            .create(
                request("com.example.counter", None),
                json!({"count": 5}),
            )
            .unwrap();
        let context = registry.get(&id).unwrap();
        assert!(context.pending_appearance);
        assert_eq!(context.settings, json!({"count": 5}));
        assert_eq!(context.state, 0);
    }

    #[test]
    fn test_mark_delivered_clears_pending() {
        let mut registry = ContextRegistry::new();
        let id = registry
            .create(request("com.example.counter", None), Value::Null)
            .unwrap();
        registry.mark_delivered(&id);
        assert!(!registry.get(&id).unwrap().pending_appearance);
    }

    #[test]
    fn test_pending_for_creation_order() {
        let mut registry = ContextRegistry::new();
        let a = registry
            .create(request("com.example.counter", Some("a")), Value::Null)
            .unwrap();
        let b = registry
            .create(request("com.example.counter", Some("b")), Value::Null)
            .unwrap();
        let _other = registry
            .create(request("com.example.other", Some("c")), Value::Null)
            .unwrap();

        assert_eq!(registry.pending_for("com.example.counter"), vec![a.clone(), b]);

        registry.mark_delivered(&a);
        assert_eq!(registry.pending_for("com.example.counter"), vec!["b"]);
    }

    #[test]
    fn test_pending_for_unknown_plugin_is_empty() {
        let registry = ContextRegistry::new();
        assert!(registry.pending_for("com.example.none").is_empty());
    }

    #[test]
    fn test_set_state() {
        let mut registry = ContextRegistry::new();
        let id = registry
            .create(request("com.example.counter", None), Value::Null)
            .unwrap();
        registry.set_state(&id, 2).unwrap();
        assert_eq!(registry.get(&id).unwrap().state, 2);
    }

    #[test]
    fn test_set_state_unknown_context() {
        let mut registry = ContextRegistry::new();
        assert!(matches!(
            registry.set_state("nope", 1),
            Err(Error::UnknownContext(_))
        ));
    }

    #[test]
    fn test_set_settings_unknown_context() {
        let mut registry = ContextRegistry::new();
        assert!(matches!(
            registry.set_settings("nope", Value::Null),
            Err(Error::UnknownContext(_))
        ));
    }

    #[test]
    fn test_plugin_of() {
        let mut registry = ContextRegistry::new();
        let id = registry
            .create(request("com.example.counter", None), Value::Null)
            .unwrap();
        assert_eq!(registry.plugin_of(&id), Some("com.example.counter"));
        assert_eq!(registry.plugin_of("nope"), None);
    }

    #[test]
    fn test_remove_drops_entry_and_order() {
        let mut registry = ContextRegistry::new();
        let id = registry
            .create(request("com.example.counter", Some("ctx1")), Value::Null)
            .unwrap();
        assert!(registry.remove(&id).is_some());
        assert!(!registry.contains(&id));
        assert!(registry.pending_for("com.example.counter").is_empty());
        assert!(registry.remove(&id).is_none());
    }

    #[test]
    fn test_removed_preferred_id_reusable() {
        let mut registry = ContextRegistry::new();
        registry
            .create(request("com.example.counter", Some("ctx1")), Value::Null)
            .unwrap();
        registry.remove("ctx1");
        let id = registry
            .create(request("com.example.counter", Some("ctx1")), Value::Null)
            .unwrap();
        assert_eq!(id, "ctx1");
    }

    #[test]
    fn test_snapshot_in_creation_order() {
        let mut registry = ContextRegistry::new();
        registry
            .create(request("com.example.counter", Some("a")), Value::Null)
            .unwrap();
        registry
            .create(request("com.example.counter", Some("b")), Value::Null)
            .unwrap();

        let snapshots = registry.snapshot();
        let ids: Vec<_> = snapshots.iter().map(|s| s.context_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
