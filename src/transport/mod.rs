// src/transport/mod.rs

//! Handshake + acknowledge protocol between event sinks and a collector.
//!
//! A sender ([`DealerSocket`] driven by [`AckClient`]) opens one connection,
//! sends `Connect`, then one `Data` frame per message, and `Disconnect` when
//! it stops. Every frame is answered with an `Ack` carrying the same
//! sequence number. The collector side ([`RouterSocket`]) multiplexes all
//! senders into one ordered frame stream.

pub mod client;
pub mod dealer;
pub mod endpoint;
pub mod frame;
pub mod router;

pub use client::AckClient;
pub use dealer::DealerSocket;
pub use endpoint::parse_endpoint;
pub use frame::{FrameBody, MAX_FRAME_LEN, WireFrame, read_frame, write_frame};
pub use router::{PeerId, RouterSocket};
