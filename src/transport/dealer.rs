// src/transport/dealer.rs

//! Sender-side socket: one connection to a collector.

use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::errors::TransportError;
use crate::transport::frame::{WireFrame, read_frame, write_frame};

/// A connected sender socket.
///
/// Incoming frames are read by a background task and queued, so
/// [`DealerSocket::recv`] can be raced against a timeout without losing
/// partially-read frames.
#[derive(Debug)]
pub struct DealerSocket {
    writer: OwnedWriteHalf,
    inbound: mpsc::UnboundedReceiver<WireFrame>,
    reader: JoinHandle<()>,
}

impl DealerSocket {
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (mut read_half, writer) = stream.into_split();
        let (tx, inbound) = mpsc::unbounded_channel();

        let reader = tokio::spawn(async move {
            loop {
                match read_frame(&mut read_half).await {
                    Ok(Some(frame)) => {
                        if tx.send(frame).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(error = %e, "dealer read failed");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            writer,
            inbound,
            reader,
        })
    }

    pub async fn send(&mut self, frame: &WireFrame) -> Result<(), TransportError> {
        write_frame(&mut self.writer, frame).await
    }

    /// Next frame from the collector. Cancel-safe.
    pub async fn recv(&mut self) -> Result<WireFrame, TransportError> {
        self.inbound.recv().await.ok_or(TransportError::Closed)
    }
}

impl Drop for DealerSocket {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
