//! In-process interface for the button-grid front-end.
//!
//! The front-end owns placement lifecycle: it creates contexts, injects
//! key and visibility events on behalf of the user, and reads snapshots.
//! Everything here funnels through the same router delivery path as socket
//! traffic, so ordering per target connection is preserved.

use crate::connection::ConnectionId;
use crate::error::{HostError, Result};
use crate::router;
use crate::server::HostState;
use deck_core::CreateContext;
use deck_rpc::EventMessage;
use deck_rpc::protocol::events;
use deck_types::{ActorKind, Direction, HostSnapshot};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Events the front-end may inject on a context.
const INJECTABLE_EVENTS: [&str; 4] = [
    events::KEY_DOWN,
    events::KEY_UP,
    events::WILL_APPEAR,
    events::WILL_DISAPPEAR,
];

#[derive(Clone)]
pub struct FrontendHandle {
    state: Arc<RwLock<HostState>>,
}

impl FrontendHandle {
    pub(crate) fn new(state: Arc<RwLock<HostState>>) -> Self {
        Self { state }
    }

    /// Create a context for a plugin/action pair.
    ///
    /// Persisted settings for a preferred id are restored into the new
    /// context. If the owning plugin is connected, `willAppear` is
    /// delivered immediately and a settings sync is pushed; otherwise the
    /// context stays pending until the plugin registers.
    ///
    /// # Errors
    ///
    /// Fails if the plugin id is unknown or the preferred id is taken.
    pub async fn create_context(&self, request: CreateContext) -> Result<String> {
        let mut state = self.state.write().await;

        if state.descriptor(&request.plugin_id).is_none() {
            return Err(HostError::UnknownPlugin(request.plugin_id));
        }

        let initial_settings = request
            .preferred_id
            .as_deref()
            .map_or(Value::Null, |id| state.settings.get_context(id));

        let context_id = state.contexts.create(request, initial_settings.clone())?;

        if router::try_deliver_appearance(&mut state, &context_id) {
            push_settings_sync(&mut state, &context_id, initial_settings);
        }

        Ok(context_id)
    }

    /// Inject a lifecycle or key event on a context, enriched with the
    /// context's settings, coordinates and state. Extra payload fields
    /// are merged on top.
    ///
    /// # Errors
    ///
    /// Fails if the context is unknown or the event is not injectable.
    pub async fn send_event(
        &self,
        context_id: &str,
        event: &str,
        payload: Option<Value>,
    ) -> Result<()> {
        if !INJECTABLE_EVENTS.contains(&event) {
            return Err(HostError::UnknownEvent(event.to_string()));
        }

        let mut state = self.state.write().await;
        let Some(context) = state.contexts.get(context_id) else {
            return Err(HostError::UnknownContext(context_id.to_string()));
        };

        let mut body = router::appearance_payload(context);
        if let (Value::Object(base), Some(Value::Object(extra))) = (&mut body, payload) {
            for (key, value) in extra {
                base.insert(key, value);
            }
        }

        let message = EventMessage::new(event)
            .with_context(context.context_id.clone())
            .with_action(context.action_id.clone())
            .with_device(context.device.clone())
            .with_payload(body);
        let plugin_id = context.plugin_id.clone();

        state
            .transcript
            .record(Direction::Inbound, ActorKind::Frontend, "frontend", &message);

        let Some(conn) = state.connections.plugin_conn(&plugin_id).cloned() else {
            debug!("[{plugin_id}] Plugin not connected, dropping '{event}'");
            return Ok(());
        };
        if router::deliver(&mut state, &conn, message) && event == events::WILL_APPEAR {
            state.contexts.mark_delivered(context_id);
        }
        Ok(())
    }

    /// Tell a context's plugin its property inspector became visible or
    /// hidden.
    ///
    /// # Errors
    ///
    /// Fails if the context is unknown.
    pub async fn notify_inspector_visibility(&self, context_id: &str, visible: bool) -> Result<()> {
        let mut state = self.state.write().await;
        let Some(context) = state.contexts.get(context_id) else {
            return Err(HostError::UnknownContext(context_id.to_string()));
        };

        let event = if visible {
            events::PROPERTY_INSPECTOR_DID_APPEAR
        } else {
            events::PROPERTY_INSPECTOR_DID_DISAPPEAR
        };
        let message = EventMessage::new(event)
            .with_context(context.context_id.clone())
            .with_action(context.action_id.clone());
        let plugin_id = context.plugin_id.clone();

        if let Some(conn) = state.connections.plugin_conn(&plugin_id).cloned() {
            router::deliver(&mut state, &conn, message);
        }
        Ok(())
    }

    /// Deliberately drop a context. The inspector binding is released;
    /// persisted settings are kept so a later restore with the same id
    /// recovers its configuration.
    ///
    /// # Errors
    ///
    /// Fails if the context is unknown.
    pub async fn remove_context(&self, context_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.contexts.remove(context_id).is_none() {
            return Err(HostError::UnknownContext(context_id.to_string()));
        }
        state.connections.unbind_context(context_id);
        Ok(())
    }

    #[must_use = "snapshot is a point-in-time copy"]
    pub async fn snapshot(&self) -> HostSnapshot {
        self.state.read().await.snapshot()
    }
}

/// Mirror of the router's settings push, used right after an immediate
/// `willAppear` so plugin and bound inspector start from the same blob.
fn push_settings_sync(state: &mut HostState, context_id: &str, blob: Value) {
    let message = EventMessage::new(events::DID_RECEIVE_SETTINGS)
        .with_context(context_id.to_string())
        .with_payload(serde_json::json!({ "settings": blob }));

    let plugin_conn: Option<ConnectionId> = state
        .contexts
        .plugin_of(context_id)
        .map(str::to_string)
        .and_then(|plugin_id| state.connections.plugin_conn(&plugin_id).cloned());
    if let Some(conn) = plugin_conn {
        router::deliver(state, &conn, message.clone());
    }
    if let Some(conn) = state.connections.inspector_conn(context_id).cloned() {
        router::deliver(state, &conn, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::handle;
    use deck_core::SettingsStore;
    use deck_types::{ActionDescriptor, Controller, Coordinates, FrontendEvent, PluginDescriptor};
    use serde_json::json;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    const PLUGIN: &str = "com.example.counter";
    const ACTION: &str = "com.example.counter.tick";

    fn harness() -> (FrontendHandle, Arc<RwLock<HostState>>, UnboundedReceiver<FrontendEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = HostState::new(
            vec![PluginDescriptor {
                id: PLUGIN.to_string(),
                name: "Counter".to_string(),
                version: "1.0.0".to_string(),
                executable: None,
                actions: vec![ActionDescriptor {
                    id: ACTION.to_string(),
                    name: "Tick".to_string(),
                    tooltip: None,
                    icon: None,
                }],
                monitored_apps: vec![],
            }],
            SettingsStore::new(),
            std::env::temp_dir().join("deckhost-frontend-test.json"),
            tx,
        );
        let state = Arc::new(RwLock::new(state));
        (FrontendHandle::new(Arc::clone(&state)), state, rx)
    }

    fn request(preferred: Option<&str>) -> CreateContext {
        CreateContext {
            plugin_id: PLUGIN.to_string(),
            action_id: ACTION.to_string(),
            device: "virtual".to_string(),
            coordinates: Coordinates::new(0, 0),
            controller: Controller::Keypad,
            preferred_id: preferred.map(String::from),
        }
    }

    async fn connect_plugin(
        state: &Arc<RwLock<HostState>>,
    ) -> UnboundedReceiver<EventMessage> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn_id = crate::connection::ConnectionId::new();
        let mut guard = state.write().await;
        guard.connections.on_connect(conn_id.clone(), tx);
        handle(&mut guard, &conn_id, EventMessage::register_plugin(PLUGIN));
        drop(guard);
        assert_eq!(
            rx.try_recv().unwrap().event,
            events::DID_RECEIVE_GLOBAL_SETTINGS
        );
        rx
    }

    #[tokio::test]
    async fn test_create_context_disconnected_stays_pending() {
        let (frontend, state, _fe) = harness();
        let context_id = frontend.create_context(request(Some("ctx1"))).await.unwrap();
        assert_eq!(context_id, "ctx1");
        assert!(state.read().await.contexts.get("ctx1").unwrap().pending_appearance);
    }

    #[tokio::test]
    async fn test_create_context_connected_delivers_immediately() {
        let (frontend, state, _fe) = harness();
        let mut plugin_rx = connect_plugin(&state).await;

        frontend.create_context(request(Some("ctx1"))).await.unwrap();

        let appear = plugin_rx.try_recv().unwrap();
        assert_eq!(appear.event, events::WILL_APPEAR);
        assert_eq!(appear.context.as_deref(), Some("ctx1"));
        let sync = plugin_rx.try_recv().unwrap();
        assert_eq!(sync.event, events::DID_RECEIVE_SETTINGS);

        assert!(!state.read().await.contexts.get("ctx1").unwrap().pending_appearance);
    }

    #[tokio::test]
    async fn test_create_context_restores_persisted_settings() {
        let (frontend, state, _fe) = harness();
        state.write().await.settings.set_context("ctx1", json!({"count": 4}));

        frontend.create_context(request(Some("ctx1"))).await.unwrap();

        assert_eq!(
            state.read().await.contexts.get("ctx1").unwrap().settings,
            json!({"count": 4})
        );
    }

    #[tokio::test]
    async fn test_create_context_unknown_plugin_fails() {
        let (frontend, _state, _fe) = harness();
        let mut bad = request(None);
        bad.plugin_id = "com.example.ghost".to_string();
        assert!(matches!(
            frontend.create_context(bad).await,
            Err(HostError::UnknownPlugin(_))
        ));
    }

    #[tokio::test]
    async fn test_send_key_event_enriched() {
        let (frontend, state, _fe) = harness();
        let mut plugin_rx = connect_plugin(&state).await;
        frontend.create_context(request(Some("ctx1"))).await.unwrap();
        plugin_rx.try_recv().unwrap(); // willAppear
        plugin_rx.try_recv().unwrap(); // settings sync

        frontend
            .send_event("ctx1", events::KEY_DOWN, Some(json!({"isLongPress": false})))
            .await
            .unwrap();

        let key = plugin_rx.try_recv().unwrap();
        assert_eq!(key.event, events::KEY_DOWN);
        assert_eq!(key.action.as_deref(), Some(ACTION));
        assert!(key.payload_field("coordinates").is_some());
        assert_eq!(key.payload_field("isLongPress"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_send_event_disconnected_is_dropped_not_error() {
        let (frontend, _state, _fe) = harness();
        frontend.create_context(request(Some("ctx1"))).await.unwrap();
        frontend.send_event("ctx1", events::KEY_UP, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_event_unknown_context_fails() {
        let (frontend, _state, _fe) = harness();
        assert!(matches!(
            frontend.send_event("ghost", events::KEY_DOWN, None).await,
            Err(HostError::UnknownContext(_))
        ));
    }

    #[tokio::test]
    async fn test_send_event_rejects_non_injectable() {
        let (frontend, _state, _fe) = harness();
        frontend.create_context(request(Some("ctx1"))).await.unwrap();
        assert!(matches!(
            frontend.send_event("ctx1", events::SET_TITLE, None).await,
            Err(HostError::UnknownEvent(_))
        ));
    }

    #[tokio::test]
    async fn test_will_disappear_retains_context() {
        let (frontend, state, _fe) = harness();
        let mut plugin_rx = connect_plugin(&state).await;
        frontend.create_context(request(Some("ctx1"))).await.unwrap();
        plugin_rx.try_recv().unwrap();
        plugin_rx.try_recv().unwrap();

        frontend
            .send_event("ctx1", events::WILL_DISAPPEAR, None)
            .await
            .unwrap();

        assert_eq!(plugin_rx.try_recv().unwrap().event, events::WILL_DISAPPEAR);
        assert!(state.read().await.contexts.contains("ctx1"));
    }

    #[tokio::test]
    async fn test_inspector_visibility_events() {
        let (frontend, state, _fe) = harness();
        let mut plugin_rx = connect_plugin(&state).await;
        frontend.create_context(request(Some("ctx1"))).await.unwrap();
        plugin_rx.try_recv().unwrap();
        plugin_rx.try_recv().unwrap();

        frontend.notify_inspector_visibility("ctx1", true).await.unwrap();
        assert_eq!(
            plugin_rx.try_recv().unwrap().event,
            events::PROPERTY_INSPECTOR_DID_APPEAR
        );

        frontend.notify_inspector_visibility("ctx1", false).await.unwrap();
        assert_eq!(
            plugin_rx.try_recv().unwrap().event,
            events::PROPERTY_INSPECTOR_DID_DISAPPEAR
        );
    }

    #[tokio::test]
    async fn test_remove_context_keeps_persisted_settings() {
        let (frontend, state, _fe) = harness();
        frontend.create_context(request(Some("ctx1"))).await.unwrap();
        state.write().await.settings.set_context("ctx1", json!({"count": 2}));

        frontend.remove_context("ctx1").await.unwrap();

        let guard = state.read().await;
        assert!(!guard.contexts.contains("ctx1"));
        assert_eq!(guard.settings.get_context("ctx1"), json!({"count": 2}));
    }

    #[tokio::test]
    async fn test_remove_unknown_context_fails() {
        let (frontend, _state, _fe) = harness();
        assert!(matches!(
            frontend.remove_context("ghost").await,
            Err(HostError::UnknownContext(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_lists_contexts() {
        let (frontend, _state, _fe) = harness();
        frontend.create_context(request(Some("ctx1"))).await.unwrap();

        let snapshot = frontend.snapshot().await;
        assert_eq!(snapshot.contexts.len(), 1);
        assert_eq!(snapshot.contexts[0].context_id, "ctx1");
        assert_eq!(snapshot.plugins.len(), 1);
    }
}
