//! # Sync Server
//!
//! Single-shot listener: binds, accepts exactly one peer, offers it every
//! file under the root, then closes both the connection and the listener.
//!
//! Session states: listening → accepted → handshaking → serving → closed.
//!
//! A peer hanging up once the session key is in place is a normal end of
//! session. An interrupt delivered through [`ShutdownHandle`] while serving
//! shuts the socket down and also ends the session normally.

use parking_lot::Mutex;
use std::fs;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::channel::KeyedChannel;
use crate::crypto::Credential;
use crate::error::{Result, SyncError};
use crate::handshake::server_handshake;
use crate::protocol::{FileOffer, Manifest, OfferReply, SyncRequest, Transfer};
use crate::reconcile::{hash_file, list_files, resolve};

/// How a served session came to an end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionEnd {
    /// Every file was offered.
    #[default]
    Completed,
    /// The client disconnected before the last offer.
    PeerClosed,
    /// The shutdown handle was triggered mid-session.
    Interrupted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServeReport {
    pub offered: usize,
    pub sent: usize,
    pub bytes_sent: u64,
    pub end: SessionEnd,
}

/// Cross-thread handle that aborts a running session by shutting its
/// socket down. Blocking reads on the server then fail and the session
/// unwinds through the normal close path.
#[derive(Clone, Default)]
pub struct ShutdownHandle {
    inner: Arc<ShutdownState>,
}

#[derive(Default)]
struct ShutdownState {
    requested: AtomicBool,
    stream: Mutex<Option<TcpStream>>,
}

impl ShutdownHandle {
    /// Request shutdown. Returns `true` if a connected session was cut,
    /// `false` if the server is still waiting for a peer.
    pub fn trigger(&self) -> bool {
        self.inner.requested.store(true, Ordering::SeqCst);
        match self.inner.stream.lock().as_ref() {
            Some(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
                true
            }
            None => false,
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    fn attach(&self, stream: &TcpStream) -> Result<()> {
        let mut slot = self.inner.stream.lock();
        let clone = stream.try_clone()?;
        if self.is_triggered() {
            let _ = clone.shutdown(Shutdown::Both);
        }
        *slot = Some(clone);
        Ok(())
    }

    fn detach(&self) {
        self.inner.stream.lock().take();
    }
}

pub struct SyncServer {
    listener: TcpListener,
    credential: Credential,
    shutdown: ShutdownHandle,
}

impl SyncServer {
    pub fn bind(addr: impl ToSocketAddrs, credential: Credential) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        info!("Server bound to {}", listener.local_addr()?);
        Ok(Self {
            listener,
            credential,
            shutdown: ShutdownHandle::default(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Serve `directory` to one peer. Consumes the server; the listening
    /// socket is closed when this returns.
    pub fn start(self, directory: &Path) -> Result<ServeReport> {
        let span = info_span!("session", id = %Uuid::new_v4());
        let _guard = span.enter();

        fs::create_dir_all(directory)?;

        let (stream, peer) = self.listener.accept()?;
        info!("Accepted connection from {}", peer);
        self.shutdown.attach(&stream)?;

        let mut channel = KeyedChannel::new(stream);
        let mut report = ServeReport::default();
        let result = serve_session(&mut channel, &self.credential, directory, &mut report);

        self.shutdown.detach();
        let keyed = channel.is_keyed();
        let stream = channel.into_inner();
        let _ = stream.shutdown(Shutdown::Both);

        match result {
            Ok(()) => report.end = SessionEnd::Completed,
            Err(e) if self.shutdown.is_triggered() => {
                debug!("Session cut by shutdown: {}", e);
                report.end = SessionEnd::Interrupted;
            }
            Err(SyncError::ConnectionClosed) if keyed => report.end = SessionEnd::PeerClosed,
            Err(e) => {
                warn!("Session failed: {}", e);
                return Err(e);
            }
        }

        info!(
            "Session ended ({:?}): offered {}, sent {} ({} bytes)",
            report.end, report.offered, report.sent, report.bytes_sent
        );
        Ok(report)
    }
}

fn serve_session(
    channel: &mut KeyedChannel<TcpStream>,
    credential: &Credential,
    directory: &Path,
    report: &mut ServeReport,
) -> Result<()> {
    server_handshake(channel, credential)?;
    debug!("Handshake complete");

    let request: SyncRequest = channel.receive_message(true)?;
    let files = list_files(directory)?;
    info!("Offering {} files (strict: {})", files.len(), request.strict);

    if request.strict {
        channel.send_message(&Manifest { paths: files.clone() }, true)?;
    }

    for path in files {
        let local = resolve(directory, &path)?;
        let hash = hash_file(&local)?;
        channel.send_message(&FileOffer { path: path.clone(), hash }, true)?;
        report.offered += 1;

        let reply: OfferReply = channel.receive_message(true)?;
        if !reply.wanted {
            continue;
        }

        let content = fs::read(&local)?;
        channel.send_message(&Transfer::File { path: path.clone() }, true)?;
        channel.send_frame(&content, true)?;
        report.sent += 1;
        report.bytes_sent += content.len() as u64;
        debug!("Sent {} ({} bytes)", path, content.len());
    }

    Ok(())
}
