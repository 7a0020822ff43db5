// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Routing-key fan-out to live connections

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tm_core::{ConnectionId, Envelope, RoutingKey};
use tokio::sync::mpsc;

/// Why a listener could not take a message
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// The transport side of one subscriber connection
pub trait Listener: Send + Sync {
    /// Hand over one serialized envelope; must not block
    fn deliver(&self, line: &str) -> Result<(), DeliveryError>;
}

/// Outbound lines a connection may have pending before it is dropped
pub const DEFAULT_OUTBOUND_QUEUE: usize = 1024;

/// Listener backed by the connection's bounded outbound queue
///
/// A full queue means the subscriber stopped reading; delivery fails and
/// the fan-out drops the listener.
pub struct ChannelListener {
    tx: mpsc::Sender<String>,
}

impl ChannelListener {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }
}

impl Listener for ChannelListener {
    fn deliver(&self, line: &str) -> Result<(), DeliveryError> {
        self.tx.try_send(line.to_string()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                DeliveryError::Failed("outbound queue full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Result of one publish
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    /// Connections that failed and were unsubscribed
    pub failed: Vec<ConnectionId>,
}

#[derive(Clone)]
struct Subscriber {
    connection: ConnectionId,
    listener: Arc<dyn Listener>,
}

/// Registry of listeners per routing key; clones share one registry
#[derive(Clone, Default)]
pub struct FanOut {
    subscribers: Arc<RwLock<HashMap<RoutingKey, Vec<Subscriber>>>>,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `listener` under `key`. Subscribing twice delivers twice.
    pub fn subscribe(&self, connection: ConnectionId, key: RoutingKey, listener: Arc<dyn Listener>) {
        tracing::debug!(%connection, %key, "subscribed");
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subs.entry(key).or_default().push(Subscriber {
            connection,
            listener,
        });
    }

    /// Remove `connection` from every key; returns how many entries went
    pub fn unsubscribe(&self, connection: &ConnectionId) -> usize {
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let mut removed = 0;
        for listeners in subs.values_mut() {
            let before = listeners.len();
            listeners.retain(|s| &s.connection != connection);
            removed += before - listeners.len();
        }
        if removed > 0 {
            tracing::debug!(%connection, removed, "unsubscribed");
        }
        removed
    }

    /// Deliver `envelope` to every listener of `key`.
    ///
    /// The listener list is copied before delivery, so listeners may
    /// (un)subscribe concurrently. A failing listener does not affect the
    /// others; it is unsubscribed.
    pub fn publish(&self, key: &RoutingKey, envelope: &Envelope) -> Delivery {
        let targets = {
            let subs = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            match subs.get(key) {
                Some(listeners) if !listeners.is_empty() => listeners.clone(),
                _ => return Delivery::default(),
            }
        };

        let line = match envelope.to_line() {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(%key, error = %e, "envelope serialization failed");
                return Delivery::default();
            }
        };

        let mut delivery = Delivery::default();
        for subscriber in targets {
            match subscriber.listener.deliver(&line) {
                Ok(()) => delivery.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        connection = %subscriber.connection,
                        %key,
                        error = %e,
                        "delivery failed, dropping listener"
                    );
                    delivery.failed.push(subscriber.connection);
                }
            }
        }

        for connection in &delivery.failed {
            self.unsubscribe(connection);
        }
        delivery
    }

    /// Listeners currently registered under `key`
    pub fn subscriber_count(&self, key: &RoutingKey) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Keys that have ever been subscribed to
    pub fn keys(&self) -> Vec<RoutingKey> {
        let mut keys: Vec<_> = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
#[path = "fanout_tests.rs"]
mod tests;
