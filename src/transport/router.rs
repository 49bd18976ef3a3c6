// src/transport/router.rs

//! Collector-side socket: accepts many senders and funnels their frames into
//! one ordered stream, routing replies back by peer.

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::TransportError;
use crate::transport::frame::{WireFrame, read_frame, write_frame};

/// Connection-local id assigned by the router.
pub type PeerId = u64;

enum Inbound {
    Joined(PeerId, mpsc::UnboundedSender<WireFrame>),
    Frame(PeerId, WireFrame),
    Left(PeerId),
}

/// Bound collector socket.
///
/// Frames from all peers arrive in one FIFO; within one peer they keep the
/// order they were sent in. The peer routing table is owned by the socket
/// and only touched from [`RouterSocket::recv`]/[`RouterSocket::try_recv`].
pub struct RouterSocket {
    local_addr: SocketAddr,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    peers: HashMap<PeerId, mpsc::UnboundedSender<WireFrame>>,
    cancel: CancellationToken,
    accept_task: JoinHandle<()>,
}

impl std::fmt::Debug for RouterSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterSocket")
            .field("local_addr", &self.local_addr)
            .field("peers", &self.peers.len())
            .finish_non_exhaustive()
    }
}

impl RouterSocket {
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (tx, inbound) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        info!(%local_addr, "collector socket bound");
        let accept_task = tokio::spawn(accept_loop(listener, tx, cancel.clone()));

        Ok(Self {
            local_addr,
            inbound,
            peers: HashMap::new(),
            cancel,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Next frame from any peer. Cancel-safe; `None` once shut down.
    pub async fn recv(&mut self) -> Option<(PeerId, WireFrame)> {
        loop {
            let inbound = self.inbound.recv().await?;
            if let Some(frame) = self.apply(inbound) {
                return Some(frame);
            }
        }
    }

    /// Next frame that has already been received, without waiting.
    pub fn try_recv(&mut self) -> Option<(PeerId, WireFrame)> {
        loop {
            let inbound = self.inbound.try_recv().ok()?;
            if let Some(frame) = self.apply(inbound) {
                return Some(frame);
            }
        }
    }

    fn apply(&mut self, inbound: Inbound) -> Option<(PeerId, WireFrame)> {
        match inbound {
            Inbound::Joined(peer, outbox) => {
                self.peers.insert(peer, outbox);
                None
            }
            Inbound::Left(peer) => {
                self.peers.remove(&peer);
                None
            }
            Inbound::Frame(peer, frame) => Some((peer, frame)),
        }
    }

    /// Queue a frame for one peer.
    pub fn send(&self, peer: PeerId, frame: WireFrame) -> Result<(), TransportError> {
        let outbox = self.peers.get(&peer).ok_or(TransportError::NotConnected)?;
        outbox.send(frame).map_err(|_| TransportError::Closed)
    }

    /// Stop accepting, close every peer connection and wait for the accept
    /// loop to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.accept_task).await {
            warn!(error = %e, "collector accept loop ended abnormally");
        }
        debug!(local_addr = %self.local_addr, "collector socket closed");
    }
}

impl Drop for RouterSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    tx: mpsc::UnboundedSender<Inbound>,
    cancel: CancellationToken,
) {
    let mut next_peer: PeerId = 0;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    next_peer += 1;
                    debug!(peer = next_peer, %addr, "sender connected");
                    spawn_peer(next_peer, stream, tx.clone(), cancel.child_token());
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
    }
}

fn spawn_peer(
    peer: PeerId,
    stream: TcpStream,
    tx: mpsc::UnboundedSender<Inbound>,
    cancel: CancellationToken,
) {
    let _ = stream.set_nodelay(true);
    let (mut read_half, mut write_half) = stream.into_split();
    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<WireFrame>();

    if tx.send(Inbound::Joined(peer, outbox_tx)).is_err() {
        return;
    }

    let writer_cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_cancel.cancelled() => break,
                frame = outbox_rx.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = write_frame(&mut write_half, &frame).await {
                            debug!(peer, error = %e, "write to sender failed");
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    });

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                frame = read_frame(&mut read_half) => match frame {
                    Ok(Some(frame)) => {
                        if tx.send(Inbound::Frame(peer, frame)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(peer, error = %e, "dropping sender after unreadable frame");
                        break;
                    }
                },
            }
        }
        let _ = tx.send(Inbound::Left(peer));
    });
}
