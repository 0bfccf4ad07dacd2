//! Event message shape and canonical event names.
//!
//! Every protocol message is `{event, context?, action?, device?, payload?}`.
//! Payloads are event-specific opaque blobs controlled by third-party
//! plugins; the host never validates their shape beyond the sub-fields it
//! needs (`settings`, `title`, `image`, `state`, `url`, `message`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical event names consumed and produced by the host.
pub mod events {
    pub const REGISTER_PLUGIN: &str = "registerPlugin";
    pub const REGISTER_PROPERTY_INSPECTOR: &str = "registerPropertyInspector";

    pub const DID_RECEIVE_SETTINGS: &str = "didReceiveSettings";
    pub const DID_RECEIVE_GLOBAL_SETTINGS: &str = "didReceiveGlobalSettings";

    pub const WILL_APPEAR: &str = "willAppear";
    pub const WILL_DISAPPEAR: &str = "willDisappear";
    pub const KEY_DOWN: &str = "keyDown";
    pub const KEY_UP: &str = "keyUp";

    pub const SET_SETTINGS: &str = "setSettings";
    pub const GET_SETTINGS: &str = "getSettings";
    pub const SET_GLOBAL_SETTINGS: &str = "setGlobalSettings";
    pub const GET_GLOBAL_SETTINGS: &str = "getGlobalSettings";

    pub const SET_TITLE: &str = "setTitle";
    pub const SET_IMAGE: &str = "setImage";
    pub const SET_STATE: &str = "setState";
    pub const SHOW_ALERT: &str = "showAlert";
    pub const SHOW_OK: &str = "showOk";

    pub const SEND_TO_PROPERTY_INSPECTOR: &str = "sendToPropertyInspector";
    pub const SEND_TO_PLUGIN: &str = "sendToPlugin";

    pub const OPEN_URL: &str = "openUrl";
    pub const LOG_MESSAGE: &str = "logMessage";

    pub const PROPERTY_INSPECTOR_DID_APPEAR: &str = "propertyInspectorDidAppear";
    pub const PROPERTY_INSPECTOR_DID_DISAPPEAR: &str = "propertyInspectorDidDisappear";

    pub const APPLICATION_DID_LAUNCH: &str = "applicationDidLaunch";
    pub const APPLICATION_DID_TERMINATE: &str = "applicationDidTerminate";

    /// Events forwarded verbatim to the front-end's visual channel.
    pub const VISUAL_EVENTS: [&str; 5] = [SET_TITLE, SET_IMAGE, SET_STATE, SHOW_ALERT, SHOW_OK];
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl EventMessage {
    #[must_use]
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            context: None,
            action: None,
            device: None,
            payload: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    #[must_use]
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// A named field of the payload, if the payload is an object.
    #[must_use]
    pub fn payload_field(&self, key: &str) -> Option<&Value> {
        self.payload.as_ref().and_then(|p| p.get(key))
    }

    /// A named payload field as a string slice.
    #[must_use]
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload_field(key).and_then(Value::as_str)
    }

    /// The `settings` sub-blob of the payload.
    #[must_use]
    pub fn settings(&self) -> Option<&Value> {
        self.payload_field("settings")
    }

    /// Registration handshake sent by a plugin process.
    #[must_use]
    pub fn register_plugin(plugin_id: impl Into<String>) -> Self {
        Self::new(events::REGISTER_PLUGIN)
            .with_payload(serde_json::json!({ "pluginId": plugin_id.into() }))
    }

    /// Registration handshake sent by a property inspector. The inspector
    /// states the action it configures; the context binding is optional
    /// since some inspectors open before a button is placed.
    #[must_use]
    pub fn register_inspector(
        inspector_id: impl Into<String>,
        action: impl Into<String>,
        context: Option<String>,
    ) -> Self {
        let mut msg = Self::new(events::REGISTER_PROPERTY_INSPECTOR)
            .with_action(action)
            .with_payload(serde_json::json!({ "inspectorId": inspector_id.into() }));
        msg.context = context;
        msg
    }
}

/// Registration info passed to spawned plugin processes as a command-line
/// argument. Mirrors the socket handshake so native and hosted plugins
/// share one protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationInfo {
    pub port: u16,
    pub plugin_id: String,
    pub register_event: String,
    pub host_version: String,
}

impl RegistrationInfo {
    #[must_use]
    pub fn new(port: u16, plugin_id: impl Into<String>) -> Self {
        Self {
            port,
            plugin_id: plugin_id.into(),
            register_event: events::REGISTER_PLUGIN.to_string(),
            host_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// The handshake message a plugin built from this info should send.
    #[must_use]
    pub fn to_register_message(&self) -> EventMessage {
        EventMessage::register_plugin(self.plugin_id.clone())
    }
}
