//! Persisted settings store.
//!
//! Two flat key→blob maps serialized as one JSON document: `globalSettings`
//! (pluginId → blob) and `contextSettings` (contextId → blob). Blobs are
//! opaque `serde_json::Value`s controlled by third-party plugins; no shape
//! validation is attempted. Load failures degrade to empty maps so a
//! corrupt file never prevents the host from starting.

use crate::{Result, now_millis};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// On-disk document shape
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsDocument {
    #[serde(default)]
    global_settings: HashMap<String, Value>,
    #[serde(default)]
    context_settings: HashMap<String, Value>,
}

/// Stores per-plugin global settings and per-context settings
#[derive(Debug, Default)]
pub struct SettingsStore {
    global: HashMap<String, Value>,
    contexts: HashMap<String, Value>,
    dirty: bool,
    /// Timestamp (ms) of last mutation - for debounced saving
    last_dirty_at: u64,
}

impl SettingsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default settings file location under the platform data directory.
    #[must_use]
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "deckhost").map_or_else(
            || std::env::temp_dir().join("deckhost-settings.json"),
            |dirs| dirs.data_dir().join("settings.json"),
        )
    }

    /// Load the store from a settings file.
    ///
    /// A missing file or unparsable document yields an empty store;
    /// settings loss must never block the host.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!("Settings file not found at {}", path.display());
            return Self::new();
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to read settings file {}: {}", path.display(), e);
                return Self::new();
            }
        };

        let document: SettingsDocument = match serde_json::from_str(&content) {
            Ok(d) => d,
            Err(e) => {
                warn!(
                    "Failed to parse settings file: {} (at line {}, column {})",
                    e,
                    e.line(),
                    e.column()
                );
                return Self::new();
            }
        };

        info!(
            "Loaded settings ({} plugins, {} contexts) from {}",
            document.global_settings.len(),
            document.context_settings.len(),
            path.display()
        );

        Self {
            global: document.global_settings,
            contexts: document.context_settings,
            dirty: false,
            last_dirty_at: 0,
        }
    }

    /// Save the store if it has unsaved changes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the file write fails; callers
    /// log and continue, settings loss never propagates into routing.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let document = SettingsDocument {
            global_settings: self.global.clone(),
            context_settings: self.contexts.clone(),
        };
        let content = serde_json::to_string(&document)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        self.dirty = false;

        debug!(
            "Saved settings ({} plugins, {} contexts)",
            self.global.len(),
            self.contexts.len()
        );
        Ok(())
    }

    #[must_use]
    pub fn get_global(&self, plugin_id: &str) -> Value {
        self.global.get(plugin_id).cloned().unwrap_or(Value::Null)
    }

    pub fn set_global(&mut self, plugin_id: &str, blob: Value) {
        self.global.insert(plugin_id.to_string(), blob);
        self.mark_dirty();
    }

    #[must_use]
    pub fn get_context(&self, context_id: &str) -> Value {
        self.contexts.get(context_id).cloned().unwrap_or(Value::Null)
    }

    pub fn set_context(&mut self, context_id: &str, blob: Value) {
        self.contexts.insert(context_id.to_string(), blob);
        self.mark_dirty();
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[must_use]
    pub fn last_dirty_at(&self) -> u64 {
        self.last_dirty_at
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.last_dirty_at = now_millis();
    }
}
