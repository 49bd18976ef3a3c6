// src/transport/client.rs

//! Acknowledged delivery over a [`DealerSocket`].

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::errors::TransportError;
use crate::message::Message;
use crate::transport::dealer::DealerSocket;
use crate::transport::frame::{FrameBody, WireFrame};

pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_RETRIES: u32 = 3;

/// Sends frames one at a time and waits for each to be acked.
///
/// A frame that is not acked within `ack_timeout` is retransmitted
/// unchanged, up to `retries` times. The collector may therefore see the
/// same Data frame more than once.
#[derive(Debug)]
pub struct AckClient {
    addr: String,
    identity: String,
    token: Option<String>,
    ack_timeout: Duration,
    retries: u32,
    seq: u64,
    retransmissions: u64,
    socket: Option<DealerSocket>,
}

impl AckClient {
    /// `addr` is a resolved `host:port`, see [`super::parse_endpoint`].
    pub fn new(addr: impl Into<String>, identity: impl Into<String>, token: Option<String>) -> Self {
        Self {
            addr: addr.into(),
            identity: identity.into(),
            token,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            retries: DEFAULT_RETRIES,
            seq: 0,
            retransmissions: 0,
            socket: None,
        }
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Frames sent again because their ack did not arrive in time.
    pub fn retransmissions(&self) -> u64 {
        self.retransmissions
    }

    /// Open the connection and perform the Connect handshake.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if self.socket.is_some() {
            return Ok(());
        }
        self.socket = Some(DealerSocket::connect(&self.addr).await?);

        let body = FrameBody::Connect {
            token: self.token.clone(),
        };
        if let Err(e) = self.send_acked(body).await {
            self.socket = None;
            return Err(e);
        }
        info!(identity = %self.identity, addr = %self.addr, "connected to collector");
        Ok(())
    }

    pub async fn send_message(&mut self, message: &Message) -> Result<(), TransportError> {
        let payload = serde_json::to_string(message)?;
        self.send_acked(FrameBody::Data { payload }).await
    }

    /// Perform the Disconnect handshake and close the connection. A no-op
    /// when not connected.
    pub async fn disconnect(&mut self) -> Result<(), TransportError> {
        if self.socket.is_none() {
            return Ok(());
        }
        let result = self.send_acked(FrameBody::Disconnect).await;
        self.socket = None;
        info!(identity = %self.identity, "disconnected from collector");
        result
    }

    async fn send_acked(&mut self, body: FrameBody) -> Result<(), TransportError> {
        self.seq += 1;
        let frame = WireFrame::new(self.seq, self.identity.clone(), body);
        let attempts = self.retries + 1;
        let socket = self.socket.as_mut().ok_or(TransportError::NotConnected)?;

        for attempt in 1..=attempts {
            socket.send(&frame).await?;
            if wait_for_ack(socket, frame.seq, self.ack_timeout).await? {
                return Ok(());
            }
            if attempt < attempts {
                self.retransmissions += 1;
                warn!(
                    identity = %frame.identity,
                    seq = frame.seq,
                    attempt,
                    "no ack from collector; retransmitting"
                );
            }
        }

        Err(TransportError::AckTimeout {
            seq: frame.seq,
            attempts,
        })
    }
}

/// Wait up to `timeout` for the ack of `seq`, skipping acks of earlier
/// frames that arrive late.
async fn wait_for_ack(
    socket: &mut DealerSocket,
    seq: u64,
    timeout: Duration,
) -> Result<bool, TransportError> {
    let deadline = Instant::now() + timeout;
    loop {
        match time::timeout_at(deadline, socket.recv()).await {
            Err(_) => return Ok(false),
            Ok(Err(e)) => return Err(e),
            Ok(Ok(frame)) if frame.body == FrameBody::Ack && frame.seq == seq => return Ok(true),
            Ok(Ok(frame)) => {
                debug!(expected = seq, got = frame.seq, "ignoring stale frame from collector");
            }
        }
    }
}
