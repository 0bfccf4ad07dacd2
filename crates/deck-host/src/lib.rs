//! Macro-deck plugin runtime host.
//!
//! A long-lived broker that accepts socket connections from plugin
//! processes and property-inspector UIs, classifies them, maintains
//! per-button context state, routes the protocol event vocabulary between
//! plugins, inspectors and the front-end, persists settings, supervises
//! spawned plugin processes, and polls the OS process list to synthesize
//! application-presence events.

pub mod connection;
pub mod error;
pub mod frontend;
pub mod presence;
pub mod registry;
pub mod router;
pub mod server;
pub mod supervisor;
pub mod transcript;

pub use connection::{ConnectionId, Peer};
pub use error::{HostError, Result};
pub use frontend::FrontendHandle;
pub use server::{DEFAULT_PORT, Host, HostConfig, HostHandle, HostState};
