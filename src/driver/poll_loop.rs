// src/driver/poll_loop.rs

//! Collector poll loop: acks frames, tracks sender liveness and translates
//! Data frames into events.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::message::Message;
use crate::transport::{FrameBody, PeerId, RouterSocket, WireFrame};

use super::event::Event;
use super::translate::Translator;

/// Frames processed after cancellation, at most.
const MAX_DRAIN_FRAMES: usize = 10_000;

/// Counters reported when the loop settles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub frames: u64,
    pub events: u64,
    pub drained: u64,
    pub rejected: u64,
}

pub(crate) struct PollLoop {
    router: RouterSocket,
    token: Option<String>,
    events: mpsc::UnboundedSender<Event>,
    translator: Translator,
    /// Connections that completed an accepted Connect, with the identity
    /// they announced. Only touched by this loop.
    live: HashMap<PeerId, String>,
    stats: PollStats,
}

impl PollLoop {
    pub(crate) fn new(
        router: RouterSocket,
        token: Option<String>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Self {
            router,
            token,
            events,
            translator: Translator::new(),
            live: HashMap::new(),
            stats: PollStats::default(),
        }
    }

    /// Run until cancelled, then drain what was already received and
    /// release the socket.
    pub(crate) async fn run(mut self, cancel: CancellationToken) -> PollStats {
        info!(addr = %self.router.local_addr(), "collector poll loop started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                inbound = self.router.recv() => match inbound {
                    Some((peer, frame)) => self.handle(peer, frame),
                    None => break,
                },
            }
        }

        while (self.stats.drained as usize) < MAX_DRAIN_FRAMES {
            let Some((peer, frame)) = self.router.try_recv() else {
                break;
            };
            self.handle(peer, frame);
            self.stats.drained += 1;
        }

        if !self.live.is_empty() {
            debug!(senders = ?self.live.values().collect::<Vec<_>>(), "senders still connected at shutdown");
        }
        self.router.shutdown().await;
        info!(stats = ?self.stats, "collector poll loop finished");
        self.stats
    }

    fn handle(&mut self, peer: PeerId, frame: WireFrame) {
        self.stats.frames += 1;

        match &frame.body {
            FrameBody::Connect { token } => {
                if self.token.is_some() && token != &self.token {
                    self.stats.rejected += 1;
                    warn!(identity = %frame.identity, "rejecting sender with invalid token");
                    return;
                }
                debug!(identity = %frame.identity, peer, "sender connected");
                self.live.insert(peer, frame.identity.clone());
                self.ack(peer, &frame);
            }
            FrameBody::Disconnect => {
                debug!(identity = %frame.identity, peer, "sender disconnected");
                if let Some(identity) = self.live.remove(&peer) {
                    self.translator.release(&identity);
                }
                self.ack(peer, &frame);
            }
            FrameBody::Data { payload } => {
                let identity = match self.live.get(&peer) {
                    Some(identity) => identity.clone(),
                    None if self.token.is_some() => {
                        self.stats.rejected += 1;
                        warn!(identity = %frame.identity, peer, "rejecting data from unauthenticated sender");
                        return;
                    }
                    None => {
                        debug!(identity = %frame.identity, "data from a sender that never connected");
                        frame.identity.clone()
                    }
                };
                self.ack(peer, &frame);
                match serde_json::from_str::<Message>(payload) {
                    Ok(message) => {
                        if let Some(event) = self.translator.translate(&identity, &message) {
                            self.stats.events += 1;
                            if self.events.send(event).is_err() {
                                debug!(?event, "event queue closed; dropping event");
                            }
                        }
                    }
                    Err(e) => {
                        self.stats.rejected += 1;
                        warn!(identity = %frame.identity, error = %e, "undecodable message payload");
                    }
                }
            }
            FrameBody::Ack => {
                debug!(identity = %frame.identity, "ignoring ack sent to collector");
            }
        }
    }

    fn ack(&self, peer: PeerId, frame: &WireFrame) {
        if let Err(e) = self.router.send(peer, frame.ack()) {
            debug!(peer, seq = frame.seq, error = %e, "could not ack frame");
        }
    }
}
