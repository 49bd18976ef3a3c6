use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use fmrunner::message::Message;
use fmrunner::transport::{FrameBody, RouterSocket};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// How the mock treats Data frames. Connect and Disconnect are always acked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// Record and ack.
    #[default]
    Normal,
    /// Neither record nor ack, as if the frame was lost.
    DropData,
    /// Record but never ack, as if the ack was lost.
    ReceiveWithoutAck,
}

#[derive(Debug, Default)]
struct CollectorState {
    mode: AckMode,
    messages: Vec<Message>,
    data_frames: usize,
    connects: usize,
    disconnects: usize,
}

/// A collector with switchable ack behaviour, for exercising senders.
pub struct MockCollector {
    addr: SocketAddr,
    state: Arc<Mutex<CollectorState>>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl MockCollector {
    pub async fn start(mode: AckMode) -> anyhow::Result<Self> {
        let mut router = RouterSocket::bind("127.0.0.1:0").await?;
        let addr = router.local_addr();
        let state = Arc::new(Mutex::new(CollectorState {
            mode,
            ..Default::default()
        }));
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let shared = Arc::clone(&state);
        let task = tokio::spawn(async move {
            loop {
                let (peer, frame) = tokio::select! {
                    _ = &mut stop_rx => break,
                    next = router.recv() => match next {
                        Some(next) => next,
                        None => break,
                    },
                };

                let ack = {
                    let mut state = shared.lock().unwrap();
                    let mode = state.mode;
                    match &frame.body {
                        FrameBody::Connect { .. } => {
                            state.connects += 1;
                            true
                        }
                        FrameBody::Disconnect => {
                            state.disconnects += 1;
                            true
                        }
                        FrameBody::Data { payload } => match mode {
                            AckMode::DropData => false,
                            _ => {
                                state.data_frames += 1;
                                if let Ok(message) = serde_json::from_str::<Message>(payload) {
                                    state.messages.push(message);
                                }
                                mode == AckMode::Normal
                            }
                        },
                        FrameBody::Ack => false,
                    }
                };

                if ack {
                    if let Err(e) = router.send(peer, frame.ack()) {
                        debug!(peer, error = %e, "mock collector could not ack");
                    }
                }
            }
            router.shutdown().await;
        });

        Ok(Self {
            addr,
            state,
            stop_tx: Some(stop_tx),
            task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("tcp://{}", self.addr)
    }

    pub fn set_mode(&self, mode: AckMode) {
        self.state.lock().unwrap().mode = mode;
    }

    /// Decoded Data payloads, in arrival order (retransmissions included).
    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().unwrap().messages.clone()
    }

    pub fn data_frames(&self) -> usize {
        self.state.lock().unwrap().data_frames
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().unwrap().disconnects
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for MockCollector {
    fn drop(&mut self) {
        self.task.abort();
    }
}
