//! Broker state for deckhost.
//!
//! Pure, I/O-light state owned by the host: the persisted settings store,
//! the context registry of placed buttons, and the edge-triggered
//! application presence tracker. No sockets or timers live here; the host
//! crate drives these structs from its loops.

pub mod context;
pub mod error;
pub mod presence;
pub mod settings;

pub use context::{Context, ContextRegistry, CreateContext};
pub use error::{Error, Result};
pub use presence::{PresenceTracker, PresenceTransition};
pub use settings::SettingsStore;

/// Current time in milliseconds since the Unix epoch.
///
/// Saturates to 0 if the clock is before the epoch.
// u128 millis fits in u64 for realistic timestamps
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
