//! Client helper for connecting to the deckhost broker.
//!
//! Used by plugin processes, property inspectors and integration tests to
//! share one connect/register path. The deck protocol is fire-and-forget
//! events, so the client is a thin framed wrapper without request ids.

use std::net::Ipv4Addr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::protocol::EventMessage;
use crate::transport::{CodecError, EventCodec, parse_frame};

/// Errors that can occur with the host client
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Receive timeout")]
    Timeout,
}

/// Framed connection to the host
pub struct HostClient {
    framed: Framed<TcpStream, EventCodec>,
}

impl HostClient {
    /// Connect to a host listening on the given localhost port.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Io` if the TCP connection fails.
    pub async fn connect(port: u16) -> Result<Self, ClientError> {
        let stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await?;
        debug!("Connected to host on port {}", port);
        Ok(Self {
            framed: Framed::new(stream, EventCodec::new()),
        })
    }

    /// Send one event message.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Codec` if encoding or the socket write fails.
    pub async fn send(&mut self, message: EventMessage) -> Result<(), ClientError> {
        self.framed.send(message).await?;
        Ok(())
    }

    /// Receive the next event message.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ConnectionClosed` when the peer hangs up, or
    /// `ClientError::Codec` on framing/parse failures.
    pub async fn recv(&mut self) -> Result<EventMessage, ClientError> {
        match self.framed.next().await {
            Some(frame) => Ok(parse_frame(&frame?)?),
            None => Err(ClientError::ConnectionClosed),
        }
    }

    /// Receive the next event message, failing after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Timeout` if nothing arrives in time.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<EventMessage, ClientError> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Send the plugin registration handshake.
    ///
    /// # Errors
    ///
    /// Propagates send failures.
    pub async fn register_plugin(&mut self, plugin_id: &str) -> Result<(), ClientError> {
        self.send(EventMessage::register_plugin(plugin_id)).await
    }

    /// Send the property inspector registration handshake.
    ///
    /// # Errors
    ///
    /// Propagates send failures.
    pub async fn register_inspector(
        &mut self,
        inspector_id: &str,
        action: &str,
        context: Option<String>,
    ) -> Result<(), ClientError> {
        self.send(EventMessage::register_inspector(inspector_id, action, context))
            .await
    }
}
