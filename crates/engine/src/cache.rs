// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized cache folded from a log subsequence
//!
//! The cache replays its topics from the earliest offset (or from a
//! snapshot's saved positions) and folds each record into an in-memory map
//! through a [`Reducer`]. Readers go through a [`CacheView`] and never touch
//! the log. The log is the source of truth; the snapshot only shortens the
//! replay.

use crate::consumer::Checkpoint;
use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tm_adapters::{Broker, BrokerError, ConsumerConfig, LogConsumer};
use tm_core::{LogRecord, Record};
use tm_storage::{read_json, write_json_atomic};
use tokio::sync::watch;

/// Folds one record into the derived value for its id.
///
/// `previous` is `None` the first time an id is seen. Returning `None`
/// leaves the entry as it was.
pub trait Reducer: Send + Sync + 'static {
    fn reduce(&self, previous: Option<&Value>, record: &Record) -> Option<Value>;
}

impl<F> Reducer for F
where
    F: Fn(Option<&Value>, &Record) -> Option<Value> + Send + Sync + 'static,
{
    fn reduce(&self, previous: Option<&Value>, record: &Record) -> Option<Value> {
        self(previous, record)
    }
}

/// Keeps `{field: value}` from the latest record that carries `field`
#[derive(Debug, Clone)]
pub struct LatestField {
    field: String,
}

impl LatestField {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl Reducer for LatestField {
    fn reduce(&self, _previous: Option<&Value>, record: &Record) -> Option<Value> {
        let value = record.str_attr(&self.field)?;
        let mut derived = serde_json::Map::new();
        derived.insert(self.field.clone(), Value::String(value.to_string()));
        Some(Value::Object(derived))
    }
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Unique name; also names the snapshot file
    pub name: String,
    pub topics: Vec<String>,
    /// Where to keep `<name>.cache.json`; `None` disables snapshots
    pub snapshot_dir: Option<PathBuf>,
    /// Updates between snapshots
    pub snapshot_every: u64,
}

impl CacheConfig {
    pub fn new(name: impl Into<String>, topics: Vec<String>) -> Self {
        Self {
            name: name.into(),
            topics,
            snapshot_dir: None,
            snapshot_every: 1_000,
        }
    }

    fn snapshot_path(&self) -> Option<PathBuf> {
        self.snapshot_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.cache.json", self.name)))
    }
}

/// Synchronous read handle on a cache
#[derive(Clone, Default)]
pub struct CacheView {
    entries: Arc<RwLock<HashMap<String, Value>>>,
}

impl CacheView {
    pub fn get(&self, id: &str) -> Option<Value> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// The derived value for `id`, or `fallback` when absent
    pub fn get_or(&self, id: &str, fallback: Value) -> Value {
        self.get(id).unwrap_or(fallback)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn with_entries(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(entries.into_iter().collect())),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheSnapshot {
    version: u32,
    positions: Checkpoint,
    entries: HashMap<String, Value>,
}

const SNAPSHOT_VERSION: u32 = 1;

/// A cache and the loop that keeps it current
pub struct MaterializedCache<B, R> {
    config: CacheConfig,
    broker: B,
    reducer: R,
    view: CacheView,
    positions: Checkpoint,
    since_snapshot: u64,
}

impl<B: Broker, R: Reducer> MaterializedCache<B, R> {
    pub fn new(config: CacheConfig, broker: B, reducer: R) -> Self {
        Self {
            config,
            broker,
            reducer,
            view: CacheView::default(),
            positions: Checkpoint::default(),
            since_snapshot: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn view(&self) -> CacheView {
        self.view.clone()
    }

    /// Load the snapshot into the map; a bad snapshot means full replay
    fn restore(&mut self) {
        let Some(path) = self.config.snapshot_path() else {
            return;
        };
        match read_json::<CacheSnapshot>(&path) {
            Ok(Some(snapshot)) if snapshot.version == SNAPSHOT_VERSION => {
                tracing::info!(
                    cache = %self.config.name,
                    entries = snapshot.entries.len(),
                    "restored cache snapshot"
                );
                *self.view.entries.write().unwrap_or_else(|e| e.into_inner()) = snapshot.entries;
                self.positions = snapshot.positions;
            }
            Ok(Some(snapshot)) => {
                tracing::warn!(
                    cache = %self.config.name,
                    version = snapshot.version,
                    "unsupported cache snapshot, replaying from start"
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    cache = %self.config.name,
                    error = %e,
                    "unreadable cache snapshot, replaying from start"
                );
            }
        }
    }

    fn write_snapshot(&mut self) -> Result<(), CacheError> {
        let Some(path) = self.config.snapshot_path() else {
            return Ok(());
        };
        let snapshot = CacheSnapshot {
            version: SNAPSHOT_VERSION,
            positions: self.positions.clone(),
            entries: self
                .view
                .entries
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        };
        write_json_atomic(&path, &snapshot)?;
        self.since_snapshot = 0;
        tracing::debug!(cache = %self.config.name, entries = snapshot.entries.len(), "cache snapshot written");
        Ok(())
    }

    /// Fold one delivered record into the map
    fn apply(&mut self, log: &LogRecord) {
        match log.record() {
            Ok(record) => {
                let mut entries = self.view.entries.write().unwrap_or_else(|e| e.into_inner());
                let next = self.reducer.reduce(entries.get(&record.id), &record);
                if let Some(next) = next {
                    entries.insert(record.id, next);
                }
            }
            Err(e) => {
                tracing::warn!(
                    cache = %self.config.name,
                    topic = %log.topic,
                    partition = log.partition,
                    offset = log.offset,
                    error = %e,
                    "skipping malformed record"
                );
            }
        }
        self.positions.advance(&log.topic_partition(), log.next_offset());
        self.since_snapshot += 1;
    }

    /// Replay and follow the log until `shutdown` turns true
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), CacheError> {
        self.restore();

        let mut consumer = self
            .broker
            .consumer(ConsumerConfig {
                group: format!("cache.{}", self.config.name),
                topics: self.config.topics.clone(),
                from_beginning: true,
            })
            .await?;

        for (partition, assigned) in consumer.assignment() {
            let Some(offset) = self.positions.get(&partition) else {
                continue;
            };
            match consumer.seek(&partition, offset).await {
                Ok(()) => {}
                // The snapshot outlived the log it was folded from
                Err(BrokerError::OffsetOutOfRange { end, .. }) => {
                    tracing::warn!(
                        cache = %self.config.name,
                        %partition,
                        snapshot = offset,
                        end,
                        "snapshot position is past the end of the log, replaying from broker position"
                    );
                    self.positions.reset(&partition, assigned);
                }
                Err(e) => return Err(e.into()),
            }
        }
        tracing::info!(cache = %self.config.name, entries = self.view.len(), "cache running");

        loop {
            if *shutdown.borrow() {
                break;
            }
            let log = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                log = consumer.next() => log?,
            };

            self.apply(&log);

            let every = self.config.snapshot_every;
            if every > 0 && self.since_snapshot >= every {
                if let Err(e) = self.write_snapshot() {
                    tracing::warn!(cache = %self.config.name, error = %e, "cache snapshot failed");
                }
            }
        }

        if self.since_snapshot > 0 {
            self.write_snapshot()?;
        }
        if let Err(e) = consumer.disconnect().await {
            tracing::warn!(cache = %self.config.name, error = %e, "disconnect failed");
        }
        tracing::info!(cache = %self.config.name, "cache stopped");
        Ok(())
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
