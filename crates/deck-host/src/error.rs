//! Host error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Codec(#[from] deck_rpc::CodecError),

    #[error(transparent)]
    Core(#[from] deck_core::Error),

    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("Unknown context: {0}")]
    UnknownContext(String),

    #[error("Event not injectable from the front-end: {0}")]
    UnknownEvent(String),
}

pub type Result<T> = std::result::Result<T, HostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: HostError = io.into();
        assert!(matches!(err, HostError::Io(_)));
    }

    #[test]
    fn test_core_error_display_passthrough() {
        let err: HostError = deck_core::Error::UnknownContext("ctx1".to_string()).into();
        assert_eq!(err.to_string(), "Unknown context: ctx1");
    }

    #[test]
    fn test_unknown_plugin_display() {
        let err = HostError::UnknownPlugin("com.example.counter".to_string());
        assert_eq!(err.to_string(), "Unknown plugin: com.example.counter");
    }
}
