//! # shelfsync
//!
//! Password-authenticated, encrypted synchronization of one directory tree
//! between two peers over a plain TCP connection. No certificates, no
//! third party, no state kept between sessions.
//!
//! ## Protocol at a glance
//!
//! 1. The server sends a random salt and a proof of the key it derived from
//!    the shared password; the client derives its own key and checks the proof.
//! 2. The client asks for a normal or a strict sync. In strict mode the server
//!    sends its full path list and the client deletes whatever is not on it.
//! 3. The server offers each file with its SHA-256; the client asks only for
//!    files it is missing or holds a different version of.
//!
//! Every frame after step 1 is an authenticated token sealed with the
//! session key.
//!
//! ## Core Modules
//!
//! - [`crypto`] - Credentials, key derivation and authenticated tokens
//! - [`channel`] - Length-prefixed frames and JSON messages over a stream
//! - [`handshake`] - Session key establishment and verification
//! - [`reconcile`] - File enumeration, hashing, exclusions and pruning
//! - [`server`] - Single-shot sync server
//! - [`client`] - Sync client
//! - [`config`] / [`cli`] - Command-line host
//!
//! ## Quick Start
//!
//! ```bash
//! # On the machine that has the files
//! shelfsync serve ~/library
//!
//! # On the machine that wants them
//! shelfsync pull ~/library 192.168.1.20:1230 --strict
//! ```

pub mod channel;
pub mod cli;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handshake;
pub mod protocol;
pub mod reconcile;
pub mod server;

pub use client::{PullOptions, PullReport, SyncClient};
pub use config::Config;
pub use crypto::Credential;
pub use error::{Result, SyncError};
pub use server::{ServeReport, SessionEnd, ShutdownHandle, SyncServer};
