//! # Session Handshake
//!
//! Two plain frames establish the session key:
//!
//! 1. server → client: 16 random salt bytes
//! 2. server → client: `{"hash": hex(SHA-256(encoded key))}`
//!
//! Both sides derive the key from the shared password and the salt. The
//! client compares the proof against its own derivation and aborts with
//! [`SyncError::PasswordMismatch`] before anything else is exchanged.
//!
//! The proof depends only on the key, not on a MAC over this session's
//! salt, so a recorded salt/proof pair is replayable against a client that
//! happens to receive the same salt. Peers running the existing protocol
//! rely on this exact proof, so it is kept.

use std::io::{Read, Write};
use tracing::{debug, warn};

use crate::channel::KeyedChannel;
use crate::crypto::{derive_key, generate_salt, Credential};
use crate::error::{Result, SyncError};
use crate::protocol::KeyProof;

pub fn server_handshake<S: Read + Write>(
    channel: &mut KeyedChannel<S>,
    credential: &Credential,
) -> Result<()> {
    let salt = generate_salt();
    channel.send_frame(&salt, false)?;

    debug!("deriving session key ({} rounds)", credential.iterations());
    let key = derive_key(credential, &salt);
    channel.send_message(&KeyProof { hash: key.fingerprint() }, false)?;

    channel.install_key(key);
    Ok(())
}

pub fn client_handshake<S: Read + Write>(
    channel: &mut KeyedChannel<S>,
    credential: &Credential,
) -> Result<()> {
    let salt = channel.receive_frame(false)?;

    debug!("deriving session key ({} rounds)", credential.iterations());
    let key = derive_key(credential, &salt);
    let proof: KeyProof = channel.receive_message(false)?;

    if proof.hash != key.fingerprint() {
        warn!("server proof does not match local key");
        return Err(SyncError::PasswordMismatch);
    }

    channel.install_key(key);
    Ok(())
}
