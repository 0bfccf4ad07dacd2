//! Shared types for deckhost components.
//!
//! This crate provides the core types used across deck-core, deck-rpc and
//! deck-host. All types are serializable for wire transport and snapshots.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Deserialize a Vec that may be null or missing (both become empty vec)
fn deserialize_null_as_empty_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt: Option<Vec<T>> = Option::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// Grid position of a placed button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Coordinates {
    pub column: u8,
    pub row: u8,
}

impl Coordinates {
    #[must_use]
    pub const fn new(column: u8, row: u8) -> Self {
        Self { column, row }
    }
}

/// Controller kind a context is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Controller {
    #[default]
    Keypad,
    Encoder,
}

/// One capability type a plugin declares (instantiable onto a button).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDescriptor {
    /// Plugin-scoped action identifier, e.g. `com.example.counter.tick`
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Immutable description of an installed plugin, supplied by the external
/// discovery collaborator. Stable for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    /// Stable plugin identifier, e.g. `com.example.counter`
    pub id: String,
    pub name: String,
    pub version: String,
    /// Executable to supervise; `None` for hosted/remote plugins that
    /// connect on their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
    #[serde(default, deserialize_with = "deserialize_null_as_empty_vec")]
    pub actions: Vec<ActionDescriptor>,
    /// OS application names whose launch/terminate this plugin wants to see.
    #[serde(default, deserialize_with = "deserialize_null_as_empty_vec")]
    pub monitored_apps: Vec<String>,
}

impl PluginDescriptor {
    /// Whether this plugin declares the given action id.
    #[must_use]
    pub fn has_action(&self, action_id: &str) -> bool {
        self.actions.iter().any(|a| a.id == action_id)
    }
}

/// Snapshot of one placed button instance for front-end display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub context_id: String,
    pub plugin_id: String,
    pub action_id: String,
    pub device: String,
    pub coordinates: Coordinates,
    pub controller: Controller,
    pub state: u32,
    pub settings: Value,
    pub pending_appearance: bool,
}

/// Point-in-time view of the host for the front-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSnapshot {
    pub listen_port: u16,
    #[serde(default, deserialize_with = "deserialize_null_as_empty_vec")]
    pub plugins: Vec<PluginDescriptor>,
    #[serde(default, deserialize_with = "deserialize_null_as_empty_vec")]
    pub contexts: Vec<ContextSnapshot>,
    #[serde(default, deserialize_with = "deserialize_null_as_empty_vec")]
    pub recent_logs: Vec<TranscriptEntry>,
}

/// Pushes delivered to the front-end over its event channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FrontendEvent {
    /// Plugin-originated visual event (`setTitle`, `setImage`, `setState`,
    /// `showAlert`, `showOk`).
    Visual {
        context: String,
        event: String,
        payload: Value,
    },

    /// Per-context settings changed.
    SettingsChanged { context: String, settings: Value },

    /// Plugin-global settings changed.
    GlobalSettingsChanged {
        plugin_id: String,
        settings: Value,
    },
}

/// Which kind of peer a transcript entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActorKind {
    Plugin,
    Inspector,
    Frontend,
    Unclassified,
}

/// Message direction from the host's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// One line of the append-only diagnostic transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub timestamp_ms: u64,
    pub direction: Direction,
    pub actor: ActorKind,
    pub actor_id: String,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_descriptor() -> PluginDescriptor {
        PluginDescriptor {
            id: "com.example.counter".to_string(),
            name: "Counter".to_string(),
            version: "1.2.0".to_string(),
            executable: Some(PathBuf::from("/opt/counter/counter")),
            actions: vec![ActionDescriptor {
                id: "com.example.counter.tick".to_string(),
                name: "Tick".to_string(),
                tooltip: None,
                icon: None,
            }],
            monitored_apps: vec!["Spotify".to_string()],
        }
    }

    #[test]
    fn test_descriptor_has_action() {
        let descriptor = sample_descriptor();
        assert!(descriptor.has_action("com.example.counter.tick"));
        assert!(!descriptor.has_action("com.example.counter.reset"));
    }

    #[test]
    fn test_descriptor_camel_case_wire_names() {
        let descriptor = sample_descriptor();
        let json = serde_json::to_string(&descriptor).unwrap();
        assert!(json.contains("\"monitoredApps\""));
        assert!(!json.contains("\"monitored_apps\""));
    }

    #[test]
    fn test_descriptor_null_lists_become_empty() {
        let json = r#"{"id":"p","name":"P","version":"1","actions":null,"monitoredApps":null}"#;
        let descriptor: PluginDescriptor = serde_json::from_str(json).unwrap();
        assert!(descriptor.actions.is_empty());
        assert!(descriptor.monitored_apps.is_empty());
    }

    #[test]
    fn test_descriptor_missing_executable() {
        let json = r#"{"id":"p","name":"P","version":"1"}"#;
        let descriptor: PluginDescriptor = serde_json::from_str(json).unwrap();
        assert!(descriptor.executable.is_none());
    }

    #[test]
    fn test_controller_default_is_keypad() {
        assert_eq!(Controller::default(), Controller::Keypad);
    }

    #[test]
    fn test_controller_serialization() {
        let json = serde_json::to_string(&Controller::Encoder).unwrap();
        assert_eq!(json, "\"Encoder\"");
        let parsed: Controller = serde_json::from_str("\"Keypad\"").unwrap();
        assert_eq!(parsed, Controller::Keypad);
    }

    #[test]
    fn test_coordinates_roundtrip() {
        let coords = Coordinates::new(3, 1);
        let json = serde_json::to_string(&coords).unwrap();
        let parsed: Coordinates = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, coords);
    }

    #[test]
    fn test_context_snapshot_serialization() {
        let snapshot = ContextSnapshot {
            context_id: "ctx1".to_string(),
            plugin_id: "com.example.counter".to_string(),
            action_id: "com.example.counter.tick".to_string(),
            device: "virtual".to_string(),
            coordinates: Coordinates::new(0, 0),
            controller: Controller::Keypad,
            state: 0,
            settings: serde_json::json!({"count": 5}),
            pending_appearance: true,
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"contextId\":\"ctx1\""));
        assert!(json.contains("\"pendingAppearance\":true"));
    }

    #[test]
    fn test_frontend_event_tagged_serialization() {
        let event = FrontendEvent::Visual {
            context: "ctx1".to_string(),
            event: "setTitle".to_string(),
            payload: serde_json::json!({"title": "Hello"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"visual\""));
        assert!(json.contains("\"event\":\"setTitle\""));
    }

    #[test]
    fn test_frontend_event_global_settings() {
        let event = FrontendEvent::GlobalSettingsChanged {
            plugin_id: "com.example.counter".to_string(),
            settings: serde_json::json!({"count": 1}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"globalSettingsChanged\""));
        assert!(json.contains("\"pluginId\""));
        assert!(!json.contains("plugin_id"));

        let back: FrontendEvent = serde_json::from_str(&json).unwrap();
        match back {
            FrontendEvent::GlobalSettingsChanged { plugin_id, .. } => {
                assert_eq!(plugin_id, "com.example.counter");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_transcript_entry_omits_empty_fields() {
        let entry = TranscriptEntry {
            timestamp_ms: 1000,
            direction: Direction::Inbound,
            actor: ActorKind::Plugin,
            actor_id: "com.example.counter".to_string(),
            event: "setSettings".to_string(),
            context: None,
            action: None,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("\"context\""));
        assert!(!json.contains("\"action\""));
        assert!(json.contains("\"direction\":\"inbound\""));
    }

    #[test]
    fn test_host_snapshot_roundtrip() {
        let snapshot = HostSnapshot {
            listen_port: 9321,
            plugins: vec![sample_descriptor()],
            contexts: vec![],
            recent_logs: vec![],
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: HostSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.listen_port, 9321);
        assert_eq!(parsed.plugins.len(), 1);
    }
}
