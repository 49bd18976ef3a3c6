// src/reporting/event.rs

//! Forwards messages to a remote collector.

use std::time::Duration;

use tracing::{debug, warn};

use crate::errors::ReportingError;
use crate::message::Message;
use crate::transport::AckClient;
use crate::types::Iens;

/// Event sink. Connects lazily on the first message; [`EventSink::stop`]
/// performs the Disconnect handshake.
#[derive(Debug)]
pub struct EventSink {
    client: AckClient,
    stopped: bool,
}

impl EventSink {
    /// `addr` is a resolved `host:port`.
    pub fn new(addr: &str, realization: Iens, token: Option<String>) -> Self {
        let identity = format!("realization-{realization}-{}", std::process::id());
        Self::from_client(AckClient::new(addr, identity, token))
    }

    pub fn from_client(client: AckClient) -> Self {
        Self {
            client,
            stopped: false,
        }
    }

    pub fn with_ack_policy(mut self, ack_timeout: Duration, retries: u32) -> Self {
        self.client = self.client.with_ack_timeout(ack_timeout).with_retries(retries);
        self
    }

    pub async fn report(&mut self, message: &Message) -> Result<(), ReportingError> {
        if self.stopped {
            warn!(kind = message.kind_name(), "event sink already stopped; dropping message");
            return Ok(());
        }
        if !self.client.is_connected() {
            self.client.connect().await?;
        }
        self.client.send_message(message).await?;
        debug!(kind = message.kind_name(), "message delivered to collector");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), ReportingError> {
        if std::mem::replace(&mut self.stopped, true) {
            return Ok(());
        }
        self.client.disconnect().await?;
        Ok(())
    }
}
