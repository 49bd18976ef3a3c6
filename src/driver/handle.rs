// src/driver/handle.rs

use std::net::SocketAddr;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::DriverError;
use crate::transport::RouterSocket;

use super::event::Event;
use super::poll_loop::{PollLoop, PollStats};

/// Observer-side handle: a bound collector socket, the background poll task
/// and the ordered event queue it feeds.
///
/// Lifecycle: [`Driver::bind`], then [`Driver::poll`] to start the loop,
/// [`Driver::next_event`] to consume, and [`Driver::finish`] to cancel the
/// loop and wait for it to settle.
pub struct Driver {
    router: Option<RouterSocket>,
    local_addr: SocketAddr,
    token: Option<String>,
    event_tx: Option<mpsc::UnboundedSender<Event>>,
    event_rx: mpsc::UnboundedReceiver<Event>,
    cancel: CancellationToken,
    poll_task: Option<JoinHandle<PollStats>>,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("local_addr", &self.local_addr)
            .field("polling", &self.is_polling())
            .finish_non_exhaustive()
    }
}

impl Driver {
    /// Bind the collector socket. `token`, when set, must be presented by
    /// every sender in its Connect frame.
    pub async fn bind(addr: &str, token: Option<String>) -> Result<Self, DriverError> {
        let router = RouterSocket::bind(addr).await?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Ok(Self {
            local_addr: router.local_addr(),
            router: Some(router),
            token,
            event_tx: Some(event_tx),
            event_rx,
            cancel: CancellationToken::new(),
            poll_task: None,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `tcp://` URL senders should use as their dispatch URL.
    pub fn dispatch_url(&self) -> String {
        format!("tcp://{}", self.local_addr)
    }

    /// Extra producer handle for the event queue. Only available before the
    /// poll loop starts; the queue closes once every handle and the poll
    /// loop are gone.
    pub fn event_sender(&self) -> Option<mpsc::UnboundedSender<Event>> {
        self.event_tx.clone()
    }

    /// Start the poll loop in a background task.
    pub fn poll(&mut self) -> Result<(), DriverError> {
        let (router, events) = match (self.router.take(), self.event_tx.take()) {
            (Some(router), Some(events)) => (router, events),
            _ => return Err(DriverError::AlreadyPolling),
        };
        let poll_loop = PollLoop::new(router, self.token.clone(), events);
        self.poll_task = Some(tokio::spawn(poll_loop.run(self.cancel.clone())));
        Ok(())
    }

    pub fn is_polling(&self) -> bool {
        self.poll_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Next event in arrival order; `None` once the queue is closed and
    /// empty.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.event_rx.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<Event> {
        self.event_rx.try_recv().ok()
    }

    /// Ask the poll loop to stop. It still drains frames it has already
    /// received before releasing the socket.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel the poll loop and wait for it to settle. Safe to call more
    /// than once; later calls return default stats.
    pub async fn finish(&mut self) -> Result<PollStats, DriverError> {
        self.cancel();
        if let Some(router) = self.router.take() {
            router.shutdown().await;
        }
        match self.poll_task.take() {
            Some(task) => {
                let stats = task
                    .await
                    .map_err(|e| DriverError::PollTask(e.to_string()))?;
                debug!(?stats, "poll task settled");
                Ok(stats)
            }
            None => Ok(PollStats::default()),
        }
    }
}
