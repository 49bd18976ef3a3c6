#![allow(dead_code)]

use std::time::Duration;

use fmrunner::config::RunnerSettings;
use fmrunner::message::Message;
use tokio::sync::mpsc;

pub use fmrunner_test_utils::{init_tracing, with_timeout};

/// Settings with short timeouts so tests do not wait on production values.
pub fn fast_settings() -> RunnerSettings {
    RunnerSettings {
        sample_interval: Duration::from_millis(20),
        ack_timeout: Duration::from_millis(200),
        ack_retries: 2,
        jobs_file_retry_wait: Duration::from_millis(50),
    }
}

/// Collect every message until the runner closes the stream.
pub async fn drain(mut rx: mpsc::Receiver<Message>) -> Vec<Message> {
    let mut out = Vec::new();
    while let Some(msg) = rx.recv().await {
        out.push(msg);
    }
    out
}

/// Feed `messages` into a closed channel, as a finished runner would.
pub fn stream_of(messages: Vec<Message>) -> mpsc::Receiver<Message> {
    let (tx, rx) = mpsc::channel(messages.len().max(1));
    for msg in messages {
        tx.try_send(msg).expect("channel sized for all messages");
    }
    rx
}
