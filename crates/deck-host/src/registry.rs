//! Live connection registry.
//!
//! Tracks every accepted socket, its classification, and the routing
//! indexes derived from it: at most one plugin connection per plugin id,
//! and at most one inspector connection per bound context. Registering a
//! plugin id that already has a live connection evicts the old one; the
//! newest registration always wins.

use crate::connection::{ConnectionId, InspectorPeer, Peer, PluginPeer};
use deck_rpc::EventMessage;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// What was lost when a connection went away.
#[derive(Debug)]
pub struct Disconnect {
    pub peer: Peer,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    senders: HashMap<ConnectionId, UnboundedSender<EventMessage>>,
    peers: HashMap<ConnectionId, Peer>,
    /// pluginId -> live plugin connection
    plugin_conns: HashMap<String, ConnectionId>,
    /// contextId -> live inspector connection bound to it
    inspector_by_context: HashMap<String, ConnectionId>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect(&mut self, conn_id: ConnectionId, sender: UnboundedSender<EventMessage>) {
        self.senders.insert(conn_id.clone(), sender);
        self.peers.insert(conn_id, Peer::Unclassified);
    }

    #[must_use]
    pub fn peer(&self, conn_id: &ConnectionId) -> Option<&Peer> {
        self.peers.get(conn_id)
    }

    /// Promote a connection to a plugin. Returns the connection id of a
    /// previously registered connection for the same plugin, if one was
    /// evicted; the evicted socket is demoted to unclassified and stops
    /// receiving routed traffic but is not closed.
    pub fn classify_plugin(
        &mut self,
        conn_id: &ConnectionId,
        plugin_id: &str,
    ) -> Option<ConnectionId> {
        let evicted = self
            .plugin_conns
            .get(plugin_id)
            .filter(|old| *old != conn_id)
            .cloned();
        if let Some(old) = &evicted {
            warn!("[{plugin_id}] New registration evicts existing connection");
            self.peers.insert(old.clone(), Peer::Unclassified);
        }

        self.plugin_conns.insert(plugin_id.to_string(), conn_id.clone());
        self.peers.insert(
            conn_id.clone(),
            Peer::Plugin(PluginPeer {
                plugin_id: plugin_id.to_string(),
            }),
        );
        debug!("[{plugin_id}] Plugin connection registered");
        evicted
    }

    /// Promote a connection to a property inspector. A bound context takes
    /// over that context's inspector slot from any previous holder.
    pub fn classify_inspector(
        &mut self,
        conn_id: &ConnectionId,
        inspector_id: &str,
        plugin_id: &str,
        context: Option<String>,
    ) {
        if let Some(context_id) = &context {
            self.inspector_by_context
                .insert(context_id.clone(), conn_id.clone());
        }
        self.peers.insert(
            conn_id.clone(),
            Peer::Inspector(InspectorPeer {
                inspector_id: inspector_id.to_string(),
                plugin_id: plugin_id.to_string(),
                context,
            }),
        );
        debug!("[{plugin_id}] Inspector {inspector_id} registered");
    }

    #[must_use]
    pub fn sender(&self, conn_id: &ConnectionId) -> Option<&UnboundedSender<EventMessage>> {
        self.senders.get(conn_id)
    }

    /// The live connection for a plugin, if registered.
    #[must_use]
    pub fn plugin_conn(&self, plugin_id: &str) -> Option<&ConnectionId> {
        self.plugin_conns.get(plugin_id)
    }

    #[must_use]
    pub fn plugin_sender(&self, plugin_id: &str) -> Option<&UnboundedSender<EventMessage>> {
        self.plugin_conns
            .get(plugin_id)
            .and_then(|id| self.senders.get(id))
    }

    /// The inspector connection bound to a context, if any.
    #[must_use]
    pub fn inspector_conn(&self, context_id: &str) -> Option<&ConnectionId> {
        self.inspector_by_context.get(context_id)
    }

    /// Connections of every inspector registered under a plugin, bound or
    /// not. Used for global-settings fan-out.
    #[must_use]
    pub fn inspectors_of_plugin(&self, plugin_id: &str) -> Vec<ConnectionId> {
        self.peers
            .iter()
            .filter_map(|(id, peer)| match peer {
                Peer::Inspector(i) if i.plugin_id == plugin_id => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Release the inspector binding for a context, if any. The inspector
    /// connection itself stays registered.
    pub fn unbind_context(&mut self, context_id: &str) {
        self.inspector_by_context.remove(context_id);
    }

    /// Forget a connection and unwind its routing indexes.
    pub fn on_disconnect(&mut self, conn_id: &ConnectionId) -> Disconnect {
        self.senders.remove(conn_id);
        let peer = self.peers.remove(conn_id).unwrap_or(Peer::Unclassified);

        match &peer {
            Peer::Plugin(p) => {
                if self.plugin_conns.get(&p.plugin_id) == Some(conn_id) {
                    self.plugin_conns.remove(&p.plugin_id);
                }
            }
            Peer::Inspector(i) => {
                if let Some(context_id) = &i.context
                    && self.inspector_by_context.get(context_id) == Some(conn_id)
                {
                    self.inspector_by_context.remove(context_id);
                }
            }
            Peer::Unclassified => {}
        }

        Disconnect { peer }
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.senders.len()
    }
}
