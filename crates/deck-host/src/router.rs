//! Message routing.
//!
//! Dispatches inbound messages by connection classification and event name,
//! mutating the registries and forwarding to the right peer(s). Every path
//! logs and drops on failure; nothing routed here can take the host down.
//!
//! Routing leniencies that are part of the protocol, not error handling:
//! an inspector that cannot name its plugin is resolved through the action
//! id it declares, and a `sendToPlugin` whose context does not resolve is
//! delivered to the plugin owning the message's action instead.

use crate::connection::{ConnectionId, Peer};
use crate::server::HostState;
use deck_core::Context;
use deck_rpc::protocol::events;
use deck_rpc::EventMessage;
use deck_types::{ActorKind, Direction, FrontendEvent};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

/// Handle one inbound message from a connection.
pub fn handle(state: &mut HostState, conn_id: &ConnectionId, message: EventMessage) {
    record_inbound(state, conn_id, &message);

    match message.event.as_str() {
        events::REGISTER_PLUGIN => register_plugin(state, conn_id, &message),
        events::REGISTER_PROPERTY_INSPECTOR => register_inspector(state, conn_id, &message),
        _ => route(state, conn_id, &message),
    }
}

fn route(state: &mut HostState, conn_id: &ConnectionId, message: &EventMessage) {
    let Some(peer) = state.connections.peer(conn_id).cloned() else {
        return;
    };
    if peer.is_unclassified() {
        warn!("Ignoring '{}' from unclassified connection", message.event);
        return;
    }

    match message.event.as_str() {
        events::SET_SETTINGS => set_settings(state, message),
        events::GET_SETTINGS => get_settings(state, message),
        events::SET_GLOBAL_SETTINGS => set_global_settings(state, &peer, message),
        events::GET_GLOBAL_SETTINGS => get_global_settings(state, &peer),
        events::SEND_TO_PROPERTY_INSPECTOR => send_to_inspector(state, message),
        events::SEND_TO_PLUGIN => send_to_plugin(state, message),
        events::OPEN_URL => open_url(message),
        events::LOG_MESSAGE => log_message(&peer, message),
        event if events::VISUAL_EVENTS.contains(&event) => visual_event(state, message),
        other => debug!("Unhandled event '{other}' from {}", peer.actor_id()),
    }
}

fn register_plugin(state: &mut HostState, conn_id: &ConnectionId, message: &EventMessage) {
    let Some(plugin_id) = message.payload_str("pluginId").map(str::to_string) else {
        warn!("registerPlugin without pluginId, ignoring");
        return;
    };
    if state.descriptor(&plugin_id).is_none() {
        warn!("[{plugin_id}] Registration from unknown plugin ignored");
        return;
    }

    state.connections.classify_plugin(conn_id, &plugin_id);
    info!("[{plugin_id}] Plugin registered");

    let blob = state.settings.get_global(&plugin_id);
    deliver(
        state,
        conn_id,
        EventMessage::new(events::DID_RECEIVE_GLOBAL_SETTINGS)
            .with_payload(json!({ "settings": blob })),
    );

    replay_pending(state, &plugin_id);
}

fn register_inspector(state: &mut HostState, conn_id: &ConnectionId, message: &EventMessage) {
    let Some(inspector_id) = message.payload_str("inspectorId").map(str::to_string) else {
        warn!("registerPropertyInspector without inspectorId, ignoring");
        return;
    };

    // Inspectors do not always state their plugin: resolve through the
    // bound context first, then through the declared action id.
    let by_context = message
        .context
        .as_deref()
        .and_then(|c| state.contexts.plugin_of(c))
        .map(str::to_string);
    let plugin_id = match by_context {
        Some(id) => id,
        None => {
            let by_action = message
                .action
                .as_deref()
                .and_then(|a| state.descriptor_for_action(a))
                .map(|d| d.id.clone());
            match by_action {
                Some(id) => id,
                None => {
                    warn!("Cannot resolve plugin for inspector {inspector_id}, ignoring");
                    return;
                }
            }
        }
    };

    state
        .connections
        .classify_inspector(conn_id, &inspector_id, &plugin_id, message.context.clone());

    let blob = state.settings.get_global(&plugin_id);
    deliver(
        state,
        conn_id,
        EventMessage::new(events::DID_RECEIVE_GLOBAL_SETTINGS)
            .with_payload(json!({ "settings": blob })),
    );
}

/// Resend `willAppear` for every context of a plugin still awaiting it,
/// in creation order. Invoked on every (re)registration; contexts already
/// delivered are skipped, so replay is idempotent.
pub(crate) fn replay_pending(state: &mut HostState, plugin_id: &str) {
    let pending = state.contexts.pending_for(plugin_id);
    if pending.is_empty() {
        return;
    }
    info!("[{plugin_id}] Replaying {} pending context(s)", pending.len());
    for context_id in pending {
        try_deliver_appearance(state, &context_id);
    }
}

/// Deliver `willAppear` for a pending context if its plugin is connected.
/// Clears the pending flag only on successful handoff.
pub(crate) fn try_deliver_appearance(state: &mut HostState, context_id: &str) -> bool {
    let (message, plugin_id) = match state.contexts.get(context_id) {
        Some(context) if context.pending_appearance => {
            (will_appear_message(context), context.plugin_id.clone())
        }
        _ => return false,
    };
    let Some(conn) = state.connections.plugin_conn(&plugin_id).cloned() else {
        return false;
    };
    if deliver(state, &conn, message) {
        state.contexts.mark_delivered(context_id);
        true
    } else {
        false
    }
}

fn will_appear_message(context: &Context) -> EventMessage {
    EventMessage::new(events::WILL_APPEAR)
        .with_context(context.context_id.clone())
        .with_action(context.action_id.clone())
        .with_device(context.device.clone())
        .with_payload(appearance_payload(context))
}

/// Standard payload for lifecycle and key events on a context.
pub(crate) fn appearance_payload(context: &Context) -> Value {
    json!({
        "settings": context.settings,
        "coordinates": context.coordinates,
        "state": context.state,
        "controller": context.controller,
    })
}

fn set_settings(state: &mut HostState, message: &EventMessage) {
    let Some(context_id) = message.context.as_deref().map(str::to_string) else {
        warn!("setSettings without context, dropping");
        return;
    };
    let blob = message.settings().cloned().unwrap_or(Value::Null);

    state.settings.set_context(&context_id, blob.clone());
    if let Err(e) = state.contexts.set_settings(&context_id, blob.clone()) {
        // Persisted anyway; the context may be restored later under this id
        debug!("setSettings for unregistered context: {e}");
    }

    push_settings(state, &context_id, blob.clone());
    let _ = state.frontend_tx.send(FrontendEvent::SettingsChanged {
        context: context_id,
        settings: blob,
    });
}

fn get_settings(state: &mut HostState, message: &EventMessage) {
    let Some(context_id) = message.context.as_deref().map(str::to_string) else {
        warn!("getSettings without context, dropping");
        return;
    };
    let blob = state.settings.get_context(&context_id);
    push_settings(state, &context_id, blob);
}

/// Push `didReceiveSettings` to the owning plugin and any inspector bound
/// to the context. Settings state is mirrored to both sides by contract.
fn push_settings(state: &mut HostState, context_id: &str, blob: Value) {
    let mut message = EventMessage::new(events::DID_RECEIVE_SETTINGS)
        .with_context(context_id.to_string())
        .with_payload(json!({ "settings": blob }));
    if let Some(context) = state.contexts.get(context_id) {
        message = message.with_action(context.action_id.clone());
    }

    let plugin_conn = state
        .contexts
        .plugin_of(context_id)
        .map(str::to_string)
        .and_then(|plugin_id| state.connections.plugin_conn(&plugin_id).cloned());
    if let Some(conn) = plugin_conn {
        deliver(state, &conn, message.clone());
    }
    if let Some(conn) = state.connections.inspector_conn(context_id).cloned() {
        deliver(state, &conn, message);
    }
}

fn set_global_settings(state: &mut HostState, peer: &Peer, message: &EventMessage) {
    let Some(plugin_id) = peer.plugin_id().map(str::to_string) else {
        return;
    };
    let blob = message.settings().cloned().unwrap_or(Value::Null);

    state.settings.set_global(&plugin_id, blob.clone());
    broadcast_global_settings(state, &plugin_id, blob.clone());
    let _ = state.frontend_tx.send(FrontendEvent::GlobalSettingsChanged {
        plugin_id,
        settings: blob,
    });
}

fn get_global_settings(state: &mut HostState, peer: &Peer) {
    let Some(plugin_id) = peer.plugin_id().map(str::to_string) else {
        return;
    };
    let blob = state.settings.get_global(&plugin_id);
    broadcast_global_settings(state, &plugin_id, blob);
}

/// Push `didReceiveGlobalSettings` to the plugin and every inspector
/// registered under it, bound or not.
fn broadcast_global_settings(state: &mut HostState, plugin_id: &str, blob: Value) {
    let message = EventMessage::new(events::DID_RECEIVE_GLOBAL_SETTINGS)
        .with_payload(json!({ "settings": blob }));

    if let Some(conn) = state.connections.plugin_conn(plugin_id).cloned() {
        deliver(state, &conn, message.clone());
    }
    for conn in state.connections.inspectors_of_plugin(plugin_id) {
        deliver(state, &conn, message.clone());
    }
}

fn visual_event(state: &mut HostState, message: &EventMessage) {
    let Some(context_id) = message.context.as_deref().map(str::to_string) else {
        warn!("'{}' without context, dropping", message.event);
        return;
    };

    if message.event == events::SET_STATE
        && let Some(new_state) = message.payload_field("state").and_then(Value::as_u64)
        && let Err(e) = state
            .contexts
            .set_state(&context_id, u32::try_from(new_state).unwrap_or_default())
    {
        // Unknown contexts still forward; the front-end decides what to show
        debug!("setState for unregistered context: {e}");
    }

    let _ = state.frontend_tx.send(FrontendEvent::Visual {
        context: context_id,
        event: message.event.clone(),
        payload: message.payload.clone().unwrap_or(Value::Null),
    });
}

fn send_to_inspector(state: &mut HostState, message: &EventMessage) {
    let Some(context_id) = message.context.as_deref() else {
        warn!("sendToPropertyInspector without context, dropping");
        return;
    };
    match state.connections.inspector_conn(context_id).cloned() {
        Some(conn) => {
            deliver(state, &conn, message.clone());
        }
        None => debug!("No inspector bound to {context_id}, dropping"),
    }
}

fn send_to_plugin(state: &mut HostState, message: &EventMessage) {
    let by_context = message
        .context
        .as_deref()
        .and_then(|c| state.contexts.plugin_of(c))
        .map(str::to_string);
    let plugin_id = match by_context {
        Some(id) => id,
        None => {
            let by_action = message
                .action
                .as_deref()
                .and_then(|a| state.descriptor_for_action(a))
                .map(|d| d.id.clone());
            match by_action {
                Some(id) => {
                    debug!("sendToPlugin resolved via action fallback -> {id}");
                    id
                }
                None => {
                    warn!("sendToPlugin with unresolvable context and action, dropping");
                    return;
                }
            }
        }
    };

    match state.connections.plugin_conn(&plugin_id).cloned() {
        Some(conn) => {
            deliver(state, &conn, message.clone());
        }
        None => debug!("[{plugin_id}] Plugin not connected, dropping sendToPlugin"),
    }
}

fn open_url(message: &EventMessage) {
    let Some(url) = message.payload_str("url") else {
        warn!("openUrl without url, dropping");
        return;
    };
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        warn!("openUrl with non-http url rejected: {url}");
        return;
    }
    match spawn_url_opener(url) {
        Ok(_) => debug!("Opened url {url}"),
        Err(e) => warn!("Failed to open url {url}: {e}"),
    }
}

#[cfg(target_os = "windows")]
fn spawn_url_opener(url: &str) -> std::io::Result<tokio::process::Child> {
    tokio::process::Command::new("cmd")
        .args(["/C", "start", "", url])
        .spawn()
}

#[cfg(target_os = "macos")]
fn spawn_url_opener(url: &str) -> std::io::Result<tokio::process::Child> {
    tokio::process::Command::new("open").arg(url).spawn()
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn spawn_url_opener(url: &str) -> std::io::Result<tokio::process::Child> {
    tokio::process::Command::new("xdg-open").arg(url).spawn()
}

fn log_message(peer: &Peer, message: &EventMessage) {
    match message.payload_str("message") {
        Some(text) => info!("[{}] {text}", peer.actor_id()),
        None => warn!("logMessage without message"),
    }
}

fn record_inbound(state: &mut HostState, conn_id: &ConnectionId, message: &EventMessage) {
    let (kind, actor_id) = state
        .connections
        .peer(conn_id)
        .map_or((ActorKind::Unclassified, String::new()), |p| {
            (p.actor_kind(), p.actor_id().to_string())
        });
    state
        .transcript
        .record(Direction::Inbound, kind, &actor_id, message);
}

/// Queue a message on a connection's send channel and record it in the
/// transcript. A closed or missing channel is logged and skipped, never
/// queued or retried.
pub(crate) fn deliver(state: &mut HostState, conn_id: &ConnectionId, message: EventMessage) -> bool {
    let Some((kind, actor_id)) = state
        .connections
        .peer(conn_id)
        .map(|p| (p.actor_kind(), p.actor_id().to_string()))
    else {
        debug!("[{conn_id}] Unknown connection, dropping '{}'", message.event);
        return false;
    };
    let Some(sender) = state.connections.sender(conn_id) else {
        debug!("[{conn_id}] No send channel, dropping '{}'", message.event);
        return false;
    };
    if sender.send(message.clone()).is_err() {
        debug!("[{conn_id}] Send channel closed, dropping '{}'", message.event);
        return false;
    }
    state
        .transcript
        .record(Direction::Outbound, kind, &actor_id, &message);
    true
}
