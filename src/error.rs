//! # Error Taxonomy
//!
//! Every failure the sync core can surface to the host application. The
//! server and client decide which of these end a session normally (see
//! [`SyncError::is_connection_closed`]); everything else propagates.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The peer closed the stream before a frame was fully read or written.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The handshake proof did not match the locally derived key.
    #[error("password mismatch: peer derived a different session key")]
    PasswordMismatch,

    /// A sealed frame failed its integrity check.
    #[error("authentication failed: frame was tampered with, corrupted or sealed with another key")]
    Authentication,

    #[error("encrypted frame requested before a session key was established")]
    NoSessionKey,

    #[error("plain frame refused after the session key was established")]
    PlaintextAfterHandshake,

    #[error("frame of {0} bytes does not fit in memory")]
    FrameTooLarge(u64),

    /// A message decoded but did not have the expected shape.
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("unsafe path rejected: {0:?}")]
    UnsafePath(String),

    #[error("invalid exclusion pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

impl SyncError {
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, SyncError::ConnectionClosed)
    }

    /// Map a stream error, folding the "peer went away" kinds into
    /// [`SyncError::ConnectionClosed`].
    pub(crate) fn from_stream(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected => SyncError::ConnectionClosed,
            _ => SyncError::Io(err),
        }
    }
}
