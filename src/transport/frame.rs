// src/transport/frame.rs

//! Wire frames and their length-prefixed encoding.
//!
//! ```text
//! +----------------+---------------------------+
//! | u32 BE length  | JSON-encoded WireFrame    |
//! +----------------+---------------------------+
//! ```

use std::io::ErrorKind;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::TransportError;

/// Upper bound on an encoded frame body.
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// One frame exchanged between an event sink and a collector.
///
/// `seq` is chosen by the sender and echoed in the matching `Ack`, so a
/// sender can tell a late ack for a retransmitted frame from the ack it is
/// waiting for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFrame {
    pub seq: u64,
    pub identity: String,
    pub body: FrameBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FrameBody {
    /// First frame from a sender; announces its identity.
    Connect {
        #[serde(default)]
        token: Option<String>,
    },
    /// Last frame from a sender; nothing else follows from this identity.
    Disconnect,
    /// A serialized [`crate::message::Message`].
    Data { payload: String },
    Ack,
}

impl WireFrame {
    pub fn new(seq: u64, identity: impl Into<String>, body: FrameBody) -> Self {
        Self {
            seq,
            identity: identity.into(),
            body,
        }
    }

    /// The reply a collector sends for this frame.
    pub fn ack(&self) -> WireFrame {
        WireFrame {
            seq: self.seq,
            identity: self.identity.clone(),
            body: FrameBody::Ack,
        }
    }

    /// Connect and Disconnect frames are acked unconditionally.
    pub fn is_handshake(&self) -> bool {
        matches!(self.body, FrameBody::Connect { .. } | FrameBody::Disconnect)
    }
}

pub async fn write_frame<W>(writer: &mut W, frame: &WireFrame) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(frame)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(body.len()));
    }
    writer.write_u32(body.len() as u32).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the next frame; `Ok(None)` on a clean end of stream.
///
/// Not cancel-safe: callers that need timeouts read from a dedicated task.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<WireFrame>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(len));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(serde_json::from_slice(&buf)?))
}
