// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consumer groups and offset recovery
//!
//! A group joins the broker, repositions every partition it holds a stored
//! checkpoint for, then processes records one at a time:
//!
//! ```text
//! next record → handler (store writes + derived events)
//!             → emitter.send_confirmed(each derived event)   awaited
//!             → store.commit(writes + "<group>.offset")       one WAL entry
//!             → broker.commit(offset + 1)
//! ```
//!
//! The store checkpoint is authoritative. A crash after the store commit
//! but before the broker commit is repaired on restart by seeking to the
//! stored offset, so the record is not applied twice. A derived event that
//! was not sent fails the group before the checkpoint moves.
//!
//! A stored offset past the end of a partition means the log no longer
//! holds what the checkpoint describes. The group warns and resumes from
//! the broker's position for that partition.

use crate::emitter::Emitter;
use crate::error::EngineError;
use crate::handler::RecordHandler;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tm_adapters::{Broker, BrokerError, ConsumerConfig, LogConsumer};
use tm_core::{LogRecord, TopicPartition};
use tm_storage::{Batch, Store};
use tokio::sync::watch;

/// Lifecycle of a consumer group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupState {
    Joining,
    Seeking,
    Running,
    Stopped,
    /// Not running; carries the error that stopped it
    Failed(String),
}

impl GroupState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, GroupState::Stopped | GroupState::Failed(_))
    }
}

/// Meta key holding a group's checkpoint
pub fn checkpoint_key(group: &str) -> String {
    format!("{}.offset", group)
}

/// Next offset to consume per partition, as stored in the metadata namespace
///
/// Serialized as `{"<topic>": {"<partition>": <next offset>}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint(BTreeMap<String, BTreeMap<u32, u64>>);

impl Checkpoint {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn to_value(&self) -> Value {
        let mut topics = serde_json::Map::new();
        for (topic, partitions) in &self.0 {
            let offsets = partitions
                .iter()
                .map(|(partition, offset)| (partition.to_string(), Value::from(*offset)))
                .collect();
            topics.insert(topic.clone(), Value::Object(offsets));
        }
        Value::Object(topics)
    }

    pub fn get(&self, partition: &TopicPartition) -> Option<u64> {
        self.0.get(&partition.topic)?.get(&partition.partition).copied()
    }

    /// Record `next_offset` for a partition; never moves backwards
    pub fn advance(&mut self, partition: &TopicPartition, next_offset: u64) {
        let slot = self
            .0
            .entry(partition.topic.clone())
            .or_default()
            .entry(partition.partition)
            .or_insert(next_offset);
        *slot = (*slot).max(next_offset);
    }

    /// Overwrite a partition's offset, even backwards
    pub fn reset(&mut self, partition: &TopicPartition, next_offset: u64) {
        self.0
            .entry(partition.topic.clone())
            .or_default()
            .insert(partition.partition, next_offset);
    }

    pub fn partitions(&self) -> Vec<(TopicPartition, u64)> {
        self.0
            .iter()
            .flat_map(|(topic, partitions)| {
                partitions
                    .iter()
                    .map(move |(p, offset)| (TopicPartition::new(topic.clone(), *p), *offset))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeMap::is_empty)
    }
}

/// How a consumer group runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    pub name: String,
    pub topics: Vec<String>,
    /// Where a group with no broker-side offset starts
    pub from_beginning: bool,
}

/// Counters shared with whoever holds a [`GroupHandle`]
#[derive(Debug, Default)]
pub struct GroupStats {
    processed: AtomicU64,
    skipped: AtomicU64,
}

impl GroupStats {
    /// Records applied through the handler
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Malformed records stepped over
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// Observer side of a running group
#[derive(Clone)]
pub struct GroupHandle {
    pub name: String,
    pub state: watch::Receiver<GroupState>,
    pub stats: Arc<GroupStats>,
}

impl GroupHandle {
    pub fn current(&self) -> GroupState {
        self.state.borrow().clone()
    }
}

/// One consumer group applying a [`RecordHandler`]
pub struct GroupConsumer<B, H> {
    config: GroupConfig,
    broker: B,
    store: Store,
    handler: H,
    emitter: Emitter,
    state: watch::Sender<GroupState>,
    stats: Arc<GroupStats>,
}

impl<B: Broker, H: RecordHandler> GroupConsumer<B, H> {
    pub fn new(config: GroupConfig, broker: B, store: Store, handler: H, emitter: Emitter) -> Self {
        let (state, _) = watch::channel(GroupState::Joining);
        Self {
            config,
            broker,
            store,
            handler,
            emitter,
            state,
            stats: Arc::new(GroupStats::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn handle(&self) -> GroupHandle {
        GroupHandle {
            name: self.config.name.clone(),
            state: self.state.subscribe(),
            stats: Arc::clone(&self.stats),
        }
    }

    fn set_state(&self, state: GroupState) {
        tracing::debug!(group = %self.config.name, ?state, "group state");
        self.state.send_replace(state);
    }

    /// Run until `shutdown` turns true or an error stops the group.
    ///
    /// Returns the terminal state: `Stopped` or `Failed`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> GroupState {
        let group = self.config.name.clone();
        let final_state = match self.run_inner(&mut shutdown).await {
            Ok(()) => {
                tracing::info!(
                    %group,
                    processed = self.stats.processed(),
                    skipped = self.stats.skipped(),
                    "group stopped"
                );
                GroupState::Stopped
            }
            Err(e) => {
                tracing::error!(%group, error = %e, "group failed");
                GroupState::Failed(e.to_string())
            }
        };
        self.set_state(final_state.clone());
        final_state
    }

    async fn run_inner(&self, shutdown: &mut watch::Receiver<bool>) -> Result<(), EngineError> {
        self.set_state(GroupState::Joining);
        let mut consumer = self
            .broker
            .consumer(ConsumerConfig {
                group: self.config.name.clone(),
                topics: self.config.topics.clone(),
                from_beginning: self.config.from_beginning,
            })
            .await?;

        self.set_state(GroupState::Seeking);
        let mut checkpoint = self.load_checkpoint()?;
        for (partition, assigned) in consumer.assignment() {
            if let Some(stored) = checkpoint.get(&partition) {
                tracing::info!(
                    group = %self.config.name,
                    %partition,
                    assigned,
                    stored,
                    "resuming from stored checkpoint"
                );
                match consumer.seek(&partition, stored).await {
                    Ok(()) => {}
                    Err(BrokerError::OffsetOutOfRange { end, .. }) => {
                        tracing::warn!(
                            group = %self.config.name,
                            %partition,
                            stored,
                            end,
                            assigned,
                            "stored checkpoint is past the end of the log, resuming from broker position"
                        );
                        checkpoint.reset(&partition, assigned);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        self.set_state(GroupState::Running);
        loop {
            if *shutdown.borrow() {
                break;
            }

            let record = tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender also means stop
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                record = consumer.next() => record?,
            };

            self.process(&mut consumer, &mut checkpoint, record).await?;
        }

        if let Err(e) = consumer.disconnect().await {
            tracing::warn!(group = %self.config.name, error = %e, "disconnect failed");
        }
        Ok(())
    }

    fn load_checkpoint(&self) -> Result<Checkpoint, EngineError> {
        let Some(value) = self.store.get_meta(&checkpoint_key(&self.config.name)) else {
            return Ok(Checkpoint::default());
        };
        Checkpoint::from_value(value).map_err(|e| EngineError::Checkpoint {
            group: self.config.name.clone(),
            message: e.to_string(),
        })
    }

    /// Apply one record: effect, then store checkpoint, then broker ack
    async fn process(
        &self,
        consumer: &mut B::Consumer,
        checkpoint: &mut Checkpoint,
        log: LogRecord,
    ) -> Result<(), EngineError> {
        let partition = log.topic_partition();
        let next_offset = log.next_offset();
        let mut batch = Batch::new();

        match log.record() {
            Ok(record) => {
                let outcome = self.handler.handle(&record, &log, &self.store)?;
                for (key, value) in outcome.writes {
                    batch = batch.put(key, value);
                }
                for emit in outcome.emits {
                    self.emitter.send_confirmed(emit).await?;
                }
                self.stats.processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                // Replaying cannot fix the payload, so the checkpoint still
                // moves past it
                tracing::warn!(
                    group = %self.config.name,
                    topic = %log.topic,
                    partition = log.partition,
                    offset = log.offset,
                    error = %e,
                    "skipping malformed record"
                );
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }

        checkpoint.advance(&partition, next_offset);
        batch = batch.put_meta(checkpoint_key(&self.config.name), checkpoint.to_value());
        self.store.commit(batch)?;

        consumer.commit(&partition, next_offset).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;
