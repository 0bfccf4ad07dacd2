//! Wire protocol for deckhost.
//!
//! Plugins, property inspectors and the host exchange single-shape JSON
//! event messages over a length-prefixed stream transport. This crate
//! provides the message type, the canonical event vocabulary, the framing
//! codec and a small client helper for connecting peers.

pub mod client;
pub mod protocol;
pub mod transport;

pub use client::{ClientError, HostClient};
pub use protocol::{EventMessage, RegistrationInfo, events};
pub use transport::{CodecError, EventCodec, parse_frame};
