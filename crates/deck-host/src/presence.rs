//! Application presence monitoring.
//!
//! Polls the OS process list on a fixed interval and feeds the results
//! through a `PresenceTracker`, emitting `applicationDidLaunch` and
//! `applicationDidTerminate` to the owning plugin only on edge
//! transitions. Polling is approximate by nature; the protocol promises
//! eventual notification, not real-time accuracy.

use crate::router;
use crate::server::HostState;
use deck_core::{PresenceTracker, PresenceTransition};
use deck_rpc::EventMessage;
use deck_rpc::protocol::events;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{ProcessesToUpdate, System};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Run the presence monitor until the host shuts down. Exits immediately
/// when no plugin declares a monitored application.
pub async fn run_presence_monitor(state: Arc<RwLock<HostState>>, interval: Duration) {
    let watchlist: Vec<(String, Vec<String>)> = {
        let guard = state.read().await;
        guard
            .plugins
            .iter()
            .filter(|d| !d.monitored_apps.is_empty())
            .map(|d| (d.id.clone(), d.monitored_apps.clone()))
            .collect()
    };
    if watchlist.is_empty() {
        debug!("No plugin monitors applications, presence monitor idle");
        return;
    }
    info!(
        "Presence monitor watching {} plugin(s), polling every {:?}",
        watchlist.len(),
        interval
    );

    let mut tracker = PresenceTracker::new();
    let mut system = System::new();
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;
        if state.read().await.shutdown {
            break;
        }

        system.refresh_processes(ProcessesToUpdate::All, true);
        let running: HashSet<String> = system
            .processes()
            .values()
            .map(|p| p.name().to_string_lossy().to_lowercase())
            .collect();

        let mut guard = state.write().await;
        for (plugin_id, apps) in &watchlist {
            for app in apps {
                let is_running = running.contains(&app.to_lowercase());
                let Some(transition) = tracker.observe(plugin_id, app, is_running) else {
                    continue;
                };
                let event = match transition {
                    PresenceTransition::Launched => events::APPLICATION_DID_LAUNCH,
                    PresenceTransition::Terminated => events::APPLICATION_DID_TERMINATE,
                };
                info!("[{plugin_id}] {app}: {event}");

                let Some(conn) = guard.connections.plugin_conn(plugin_id).cloned() else {
                    debug!("[{plugin_id}] Plugin not connected, dropping {event}");
                    continue;
                };
                let message = EventMessage::new(event)
                    .with_payload(serde_json::json!({ "application": app }));
                router::deliver(&mut guard, &conn, message);
            }
        }
    }
    debug!("Presence monitor stopped");
}
