//! Connection identity and classification types.

use deck_types::ActorKind;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// What a socket has identified itself as.
///
/// A freshly accepted socket starts `Unclassified` and stays that way until
/// a valid registration message arrives; unknown registrations are logged
/// but the socket is not closed.
#[derive(Debug, Clone)]
pub enum Peer {
    Unclassified,
    Plugin(PluginPeer),
    Inspector(InspectorPeer),
}

#[derive(Debug, Clone)]
pub struct PluginPeer {
    pub plugin_id: String,
}

#[derive(Debug, Clone)]
pub struct InspectorPeer {
    pub inspector_id: String,
    /// Owning plugin, resolved at registration (directly or via action id)
    pub plugin_id: String,
    /// Bound button context, if the inspector declared one
    pub context: Option<String>,
}

impl Peer {
    #[must_use]
    pub fn is_unclassified(&self) -> bool {
        matches!(self, Peer::Unclassified)
    }

    #[must_use]
    pub fn plugin_id(&self) -> Option<&str> {
        match self {
            Peer::Unclassified => None,
            Peer::Plugin(p) => Some(&p.plugin_id),
            Peer::Inspector(i) => Some(&i.plugin_id),
        }
    }

    #[must_use]
    pub fn actor_kind(&self) -> ActorKind {
        match self {
            Peer::Unclassified => ActorKind::Unclassified,
            Peer::Plugin(_) => ActorKind::Plugin,
            Peer::Inspector(_) => ActorKind::Inspector,
        }
    }

    /// Identifier to tag transcript entries with.
    #[must_use]
    pub fn actor_id(&self) -> &str {
        match self {
            Peer::Unclassified => "",
            Peer::Plugin(p) => &p.plugin_id,
            Peer::Inspector(i) => &i.inspector_id,
        }
    }
}
