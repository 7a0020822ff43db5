// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ordered producer queue
//!
//! A background task sends queued events in order. [`Emitter::emit`] is
//! fire-and-forget: failures are logged and published on a separate
//! channel, never returned to the caller. [`Emitter::send_confirmed`] goes
//! through the same queue but waits for the broker's answer.

use crate::handler::Emit;
use thiserror::Error;
use tm_adapters::LogProducer;
use tokio::sync::{mpsc, oneshot};

/// A derived event the broker refused
#[derive(Debug, Clone, PartialEq, Error)]
#[error("send to {topic} failed: {error}")]
pub struct SendFailure {
    pub topic: String,
    pub key: Option<String>,
    pub error: String,
}

type Confirm = oneshot::Sender<Result<(), SendFailure>>;

enum Command {
    Send(Emit, Option<Confirm>),
    Flush(oneshot::Sender<()>),
}

/// Handle to the emitter queue; clones share one queue
#[derive(Clone)]
pub struct Emitter {
    tx: mpsc::UnboundedSender<Command>,
}

impl Emitter {
    /// Spawn the sender task for `producer`.
    ///
    /// The task exits once every `Emitter` clone is dropped and the queue
    /// is drained.
    pub fn spawn<P: LogProducer>(producer: P) -> (Self, mpsc::UnboundedReceiver<SendFailure>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        tokio::spawn(drain(producer, rx, failures_tx));
        (Self { tx }, failures_rx)
    }

    /// Queue an event; returns immediately
    pub fn emit(&self, emit: Emit) {
        if let Err(mpsc::error::SendError(Command::Send(emit, _))) =
            self.tx.send(Command::Send(emit, None))
        {
            tracing::warn!(topic = %emit.topic, "emitter stopped, dropping event");
        }
    }

    /// Queue an event and wait until the broker has accepted it
    ///
    /// Failures come back to the caller and are not published on the
    /// failure channel.
    pub async fn send_confirmed(&self, emit: Emit) -> Result<(), SendFailure> {
        let stopped = SendFailure {
            topic: emit.topic.clone(),
            key: emit.key.clone(),
            error: "emitter stopped".to_string(),
        };
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Send(emit, Some(done_tx))).is_err() {
            return Err(stopped);
        }
        done_rx.await.unwrap_or(Err(stopped))
    }

    /// Wait until everything queued before this call has been attempted
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn drain<P: LogProducer>(
    producer: P,
    mut rx: mpsc::UnboundedReceiver<Command>,
    failures: mpsc::UnboundedSender<SendFailure>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Send(emit, confirm) => {
                let result = match serde_json::to_vec(&emit.value) {
                    Ok(bytes) => producer
                        .send(&emit.topic, emit.key.as_deref(), bytes)
                        .await
                        .map(|_| ())
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };

                let result = result.map_err(|error| {
                    tracing::warn!(topic = %emit.topic, key = ?emit.key, %error, "emit failed");
                    SendFailure {
                        topic: emit.topic,
                        key: emit.key,
                        error,
                    }
                });
                match (confirm, result) {
                    (Some(confirm), result) => {
                        let _ = confirm.send(result);
                    }
                    (None, Err(failure)) => {
                        // Nobody listening for failures is fine
                        let _ = failures.send(failure);
                    }
                    (None, Ok(())) => {}
                }
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("emitter drained");
}

#[cfg(test)]
#[path = "emitter_tests.rs"]
mod tests;
