//! Framed transport for event messages.
//!
//! Each message travels as a 4-byte big-endian length prefix followed by a
//! JSON body. The decoder stops at frame boundaries and hands back the raw
//! body; [`parse_frame`] turns it into an [`EventMessage`] at the receiving
//! edge. Splitting it this way keeps body validation out of `decode`, where
//! `Framed` would fuse the stream after a single error: a body that fails
//! to parse costs exactly one frame, and the connection keeps going.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::EventMessage;

/// Upper bound on one message body (setImage payloads carry base64 image data)
const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

const LENGTH_PREFIX_SIZE: usize = 4;

/// Length-prefix framing codec. Decodes to raw frame bodies, encodes
/// whole [`EventMessage`]s.
#[derive(Debug, Default)]
pub struct EventCodec {
    pending_len: Option<usize>,
}

impl EventCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Parse one decoded frame body into a message.
///
/// # Errors
///
/// Returns `CodecError::Utf8` or `CodecError::Json` on a malformed body;
/// the frame is already consumed, so callers can log and read on.
pub fn parse_frame(frame: &[u8]) -> Result<EventMessage, CodecError> {
    let body = std::str::from_utf8(frame)?;
    Ok(serde_json::from_str(body)?)
}

impl Decoder for EventCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let expected = match self.pending_len {
            Some(len) => len,
            None => {
                if src.len() < LENGTH_PREFIX_SIZE {
                    return Ok(None);
                }
                let len = src.get_u32() as usize;
                if len > MAX_MESSAGE_SIZE {
                    return Err(CodecError::MessageTooLarge(len));
                }
                self.pending_len = Some(len);
                len
            }
        };

        if src.len() < expected {
            src.reserve(expected - src.len());
            return Ok(None);
        }

        self.pending_len = None;
        Ok(Some(src.split_to(expected).freeze()))
    }
}

impl Encoder<EventMessage> for EventCodec {
    type Error = CodecError;

    fn encode(&mut self, message: EventMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(&message)?;
        if body.len() > MAX_MESSAGE_SIZE {
            return Err(CodecError::MessageTooLarge(body.len()));
        }

        dst.reserve(LENGTH_PREFIX_SIZE + body.len());
        // Bounded by MAX_MESSAGE_SIZE, fits in u32
        #[allow(clippy::cast_possible_truncation)]
        dst.put_u32(body.len() as u32);
        dst.put_slice(&body);
        Ok(())
    }
}

/// Errors that can occur during framing and body parsing
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("frame I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("frame body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame body is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("frame of {0} bytes exceeds the {MAX_MESSAGE_SIZE}-byte limit")]
    MessageTooLarge(usize),
}
