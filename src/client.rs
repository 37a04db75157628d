//! # Sync Client
//!
//! Connects to a server, optionally mirrors the server's tree by pruning
//! local files it does not have (strict mode), then pulls every offered
//! file that is missing locally or whose content hash differs.
//!
//! Session states: idle → connecting → handshaking → (pruning) → syncing →
//! closed. The server closing the connection while the client waits for
//! the next offer is the normal end of a sync; closing in the middle of a
//! file transfer is an error.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info, info_span};
use uuid::Uuid;

use crate::channel::KeyedChannel;
use crate::crypto::Credential;
use crate::error::{Result, SyncError};
use crate::handshake::client_handshake;
use crate::protocol::{FileOffer, Manifest, OfferReply, SyncRequest, Transfer};
use crate::reconcile::{hash_file, prune_orphans, resolve, ExcludeSet, PruneReport};

/// Per-pull settings supplied by the host application.
#[derive(Debug, Clone, Default)]
pub struct PullOptions {
    /// Exact relative paths never fetched or pruned.
    pub exclude_paths: Vec<String>,
    /// Glob patterns never fetched or pruned, e.g. `**/.DS_Store`.
    pub exclude_patterns: Vec<String>,
    /// Delete local files the server does not have before fetching.
    pub strict: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    pub offered: usize,
    pub received: Vec<String>,
    pub skipped: usize,
    pub excluded: usize,
    pub bytes_received: u64,
    pub pruned: Option<PruneReport>,
}

pub struct SyncClient {
    credential: Credential,
}

impl SyncClient {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }

    /// Pull `server`'s tree into `directory`.
    pub fn start(
        &self,
        directory: &Path,
        server: impl ToSocketAddrs,
        options: &PullOptions,
    ) -> Result<PullReport> {
        let span = info_span!("session", id = %Uuid::new_v4());
        let _guard = span.enter();

        let exclude = ExcludeSet::new(&options.exclude_paths, &options.exclude_patterns)?;
        fs::create_dir_all(directory)?;

        let stream = TcpStream::connect(server)?;
        info!("Connected to {}", stream.peer_addr()?);

        let mut channel = KeyedChannel::new(stream);
        let mut report = PullReport::default();
        let result = self.pull(&mut channel, directory, options.strict, &exclude, &mut report);
        let _ = channel.get_ref().shutdown(Shutdown::Both);
        result?;

        info!(
            "Sync finished: {} offered, {} received ({} bytes), {} unchanged, {} excluded",
            report.offered,
            report.received.len(),
            report.bytes_received,
            report.skipped,
            report.excluded
        );
        Ok(report)
    }

    fn pull(
        &self,
        channel: &mut KeyedChannel<TcpStream>,
        directory: &Path,
        strict: bool,
        exclude: &ExcludeSet,
        report: &mut PullReport,
    ) -> Result<()> {
        client_handshake(channel, &self.credential)?;
        debug!("Handshake complete");

        channel.send_message(&SyncRequest { strict }, true)?;

        if strict {
            let manifest: Manifest = channel.receive_message(true)?;
            let keep: HashSet<String> = manifest.paths.into_iter().collect();
            let pruned = prune_orphans(directory, &keep, exclude)?;
            info!(
                "Pruned {} files and {} directories absent on the server",
                pruned.files_removed.len(),
                pruned.dirs_removed
            );
            report.pruned = Some(pruned);
        }

        loop {
            let offer: FileOffer = match channel.receive_message(true) {
                Ok(offer) => offer,
                Err(SyncError::ConnectionClosed) => {
                    debug!("Server closed the connection after its last offer");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            report.offered += 1;

            if exclude.is_excluded(&offer.path) {
                debug!("Refusing excluded {}", offer.path);
                channel.send_message(&OfferReply { wanted: false }, true)?;
                report.excluded += 1;
                continue;
            }

            let local = resolve(directory, &offer.path)?;
            if local.is_file() && hash_file(&local)? == offer.hash {
                channel.send_message(&OfferReply { wanted: false }, true)?;
                report.skipped += 1;
                continue;
            }

            let size = fetch(channel, &offer, &local)?;
            info!("Synced {}", offer.path);
            report.bytes_received += size;
            report.received.push(offer.path);
        }
    }
}

fn fetch(channel: &mut KeyedChannel<TcpStream>, offer: &FileOffer, local: &Path) -> Result<u64> {
    channel.send_message(&OfferReply { wanted: true }, true)?;

    let Transfer::File { path } = channel.receive_message::<Transfer>(true)?;
    if path != offer.path {
        return Err(SyncError::Protocol(format!(
            "offered {:?} but transferred {:?}",
            offer.path, path
        )));
    }

    let content = channel.receive_frame(true)?;
    write_atomically(local, &content)?;
    Ok(content.len() as u64)
}

/// Write through a temporary sibling and rename it into place, so an
/// interrupted transfer never leaves a truncated file behind.
fn write_atomically(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| SyncError::UnsafePath(path.display().to_string()))?;
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file().set_permissions(fs::Permissions::from_mode(0o644))?;
    }

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
