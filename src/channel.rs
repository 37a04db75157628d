//! # Keyed Channel
//!
//! Length-prefixed framing over any duplex byte stream, with optional
//! sealing of each frame under the session key.
//!
//! ## Frame layout
//!
//! ```text
//! +----------------------+---------------------+
//! | length: u64, BE (8B) | payload (length B)  |
//! +----------------------+---------------------+
//! ```
//!
//! Before the handshake only plain frames may pass. Once a key is installed
//! the channel refuses plain frames in both directions, so nothing after the
//! handshake can travel unauthenticated.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};
use tracing::trace;

use crate::crypto::SessionKey;
use crate::error::{Result, SyncError};

pub const HEADER_LEN: usize = 8;

// Initial buffer reservation for a frame; larger payloads grow as they arrive.
const INITIAL_CAPACITY: usize = 1 << 20;

pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let header = (payload.len() as u64).to_be_bytes();
    writer.write_all(&header).map_err(SyncError::from_stream)?;
    writer.write_all(payload).map_err(SyncError::from_stream)?;
    writer.flush().map_err(SyncError::from_stream)
}

pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).map_err(SyncError::from_stream)?;

    let len = u64::from_be_bytes(header);
    let expected = usize::try_from(len).map_err(|_| SyncError::FrameTooLarge(len))?;

    let mut payload = Vec::with_capacity(expected.min(INITIAL_CAPACITY));
    reader
        .by_ref()
        .take(len)
        .read_to_end(&mut payload)
        .map_err(SyncError::from_stream)?;

    if payload.len() != expected {
        return Err(SyncError::ConnectionClosed);
    }
    Ok(payload)
}

/// A stream plus the session key negotiated over it.
#[derive(Debug)]
pub struct KeyedChannel<S> {
    stream: S,
    key: Option<SessionKey>,
}

impl<S: Read + Write> KeyedChannel<S> {
    pub fn new(stream: S) -> Self {
        Self { stream, key: None }
    }

    pub fn install_key(&mut self, key: SessionKey) {
        self.key = Some(key);
    }

    pub fn is_keyed(&self) -> bool {
        self.key.is_some()
    }

    pub fn send_frame(&mut self, payload: &[u8], encrypted: bool) -> Result<()> {
        match (encrypted, &self.key) {
            (true, Some(key)) => {
                let token = key.encrypt(payload);
                trace!("sending sealed frame ({} -> {} bytes)", payload.len(), token.len());
                write_frame(&mut self.stream, &token)
            }
            (true, None) => Err(SyncError::NoSessionKey),
            (false, Some(_)) => Err(SyncError::PlaintextAfterHandshake),
            (false, None) => {
                trace!("sending plain frame ({} bytes)", payload.len());
                write_frame(&mut self.stream, payload)
            }
        }
    }

    pub fn receive_frame(&mut self, encrypted: bool) -> Result<Vec<u8>> {
        match (encrypted, self.key.is_some()) {
            (true, false) => return Err(SyncError::NoSessionKey),
            (false, true) => return Err(SyncError::PlaintextAfterHandshake),
            _ => {}
        }

        let payload = read_frame(&mut self.stream)?;
        match &self.key {
            Some(key) => key.decrypt(&payload),
            None => Ok(payload),
        }
    }

    pub fn send_message<T: Serialize>(&mut self, message: &T, encrypted: bool) -> Result<()> {
        let data = serde_json::to_vec(message)?;
        self.send_frame(&data, encrypted)
    }

    pub fn receive_message<T: DeserializeOwned>(&mut self, encrypted: bool) -> Result<T> {
        let data = self.receive_frame(encrypted)?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}
