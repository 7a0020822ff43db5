// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process partitioned log
//!
//! Serves every record from memory. Each consumer is assigned every
//! partition of its topics; there is no rebalancing between members of the
//! same group.
//!
//! A broker created with [`MemoryBroker::open`] also appends topics,
//! records and group commits to a WAL in its directory, fsync'd before the
//! call returns, and replays it on the next open.

use super::{Appended, Broker, BrokerError, ConsumerConfig, LogConsumer, LogProducer};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tm_core::{LogRecord, TopicPartition};
use tm_storage::{Operation, Wal};
use tokio::sync::Notify;

/// Configuration for [`MemoryBroker`]
#[derive(Debug, Clone)]
pub struct MemoryBrokerConfig {
    /// Partitions given to topics created implicitly
    pub partitions: u32,
    /// Create unknown topics on first use instead of failing
    pub auto_create_topics: bool,
}

impl Default for MemoryBrokerConfig {
    fn default() -> Self {
        Self {
            partitions: 1,
            auto_create_topics: true,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredRecord {
    timestamp: DateTime<Utc>,
    key: Option<String>,
    value: Vec<u8>,
}

/// One line of the broker log
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum LogEvent {
    Topic {
        topic: String,
        partitions: u32,
    },
    Record {
        topic: String,
        partition: u32,
        offset: u64,
        timestamp: DateTime<Utc>,
        key: Option<String>,
        value: Vec<u8>,
    },
    Commit {
        group: String,
        topic: String,
        partition: u32,
        next_offset: u64,
    },
}

fn log_unavailable(e: impl std::fmt::Display) -> BrokerError {
    BrokerError::Unavailable(format!("broker log: {}", e))
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, Vec<Vec<StoredRecord>>>,
    committed: HashMap<(String, TopicPartition), u64>,
    round_robin: u64,
    log: Option<Wal>,
}

impl BrokerState {
    /// Make `event` durable; a no-op for purely in-memory brokers
    fn persist(&mut self, event: &LogEvent) -> Result<(), BrokerError> {
        let Some(log) = self.log.as_mut() else {
            return Ok(());
        };
        let value = serde_json::to_value(event).map_err(log_unavailable)?;
        log.append(Operation::Put {
            key: "broker".to_string(),
            value,
        })
        .map_err(log_unavailable)?;
        Ok(())
    }

    fn add_topic(&mut self, topic: &str, partitions: u32) -> Result<(), BrokerError> {
        if self.topics.contains_key(topic) {
            return Ok(());
        }
        let partitions = partitions.max(1);
        self.persist(&LogEvent::Topic {
            topic: topic.to_string(),
            partitions,
        })?;
        self.topics
            .insert(topic.to_string(), vec![Vec::new(); partitions as usize]);
        Ok(())
    }

    /// Fold a replayed event back into memory
    fn restore(&mut self, event: LogEvent) {
        match event {
            LogEvent::Topic { topic, partitions } => {
                self.topics
                    .entry(topic)
                    .or_insert_with(|| vec![Vec::new(); partitions.max(1) as usize]);
            }
            LogEvent::Record {
                topic,
                partition,
                offset,
                timestamp,
                key,
                value,
            } => {
                let partitions = self.topics.entry(topic.clone()).or_default();
                if partitions.len() <= partition as usize {
                    partitions.resize(partition as usize + 1, Vec::new());
                }
                let log = &mut partitions[partition as usize];
                if log.len() as u64 != offset {
                    tracing::warn!(
                        %topic,
                        partition,
                        offset,
                        expected = log.len(),
                        "out-of-order record in broker log, skipping"
                    );
                    return;
                }
                log.push(StoredRecord {
                    timestamp,
                    key,
                    value,
                });
            }
            LogEvent::Commit {
                group,
                topic,
                partition,
                next_offset,
            } => {
                self.committed
                    .insert((group, TopicPartition::new(topic, partition)), next_offset);
            }
        }
    }
}

struct Shared {
    config: MemoryBrokerConfig,
    state: Mutex<BrokerState>,
    appended: Notify,
}

/// In-memory broker shared by all clones
#[derive(Clone)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    pub fn new(config: MemoryBrokerConfig) -> Self {
        Self::with_state(config, BrokerState::default())
    }

    /// Open a broker whose log survives restarts, replaying `dir/broker.jsonl`
    pub fn open(config: MemoryBrokerConfig, dir: &Path) -> Result<Self, BrokerError> {
        let path = dir.join("broker.jsonl");

        let recovered = Wal::replay(&path).map_err(log_unavailable)?;
        let mut state = BrokerState::default();
        let mut next_sequence = 0;
        for entry in recovered.entries {
            next_sequence = entry.sequence + 1;
            let Operation::Put { value, .. } = entry.operation else {
                continue;
            };
            match serde_json::from_value::<LogEvent>(value) {
                Ok(event) => state.restore(event),
                Err(e) => {
                    tracing::warn!(sequence = entry.sequence, error = %e, "unreadable broker log entry");
                }
            }
        }

        let records: usize = state.topics.values().flatten().map(Vec::len).sum();
        tracing::info!(
            dir = %dir.display(),
            topics = state.topics.len(),
            records,
            groups = state.committed.len(),
            truncated_bytes = recovered.truncated_bytes,
            "broker log opened"
        );

        state.log = Some(Wal::open(&path, next_sequence).map_err(log_unavailable)?);
        Ok(Self::with_state(config, state))
    }

    fn with_state(config: MemoryBrokerConfig, state: BrokerState) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(state),
                appended: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a topic; no-op if it already exists
    pub fn create_topic(&self, topic: &str, partitions: u32) -> Result<(), BrokerError> {
        self.lock().add_topic(topic, partitions)
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<_> = self.lock().topics.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Append a record. Keyed records always land on the same partition.
    pub fn append(
        &self,
        topic: &str,
        key: Option<&str>,
        value: Vec<u8>,
    ) -> Result<Appended, BrokerError> {
        let appended = {
            let mut state = self.lock();
            let partition_count = match state.topics.get(topic) {
                Some(partitions) => partitions.len() as u32,
                None if self.shared.config.auto_create_topics => self.shared.config.partitions.max(1),
                None => return Err(BrokerError::UnknownTopic(topic.to_string())),
            };

            let partition = match key {
                Some(key) => crc32fast::hash(key.as_bytes()) % partition_count,
                None => {
                    state.round_robin += 1;
                    (state.round_robin % partition_count as u64) as u32
                }
            };

            state.add_topic(topic, partition_count)?;
            let offset = state
                .topics
                .get(topic)
                .and_then(|p| p.get(partition as usize))
                .map(|log| log.len() as u64)
                .unwrap_or(0);
            let stored = StoredRecord {
                timestamp: Utc::now(),
                key: key.map(str::to_string),
                value,
            };
            // Durable before any consumer can see it
            state.persist(&LogEvent::Record {
                topic: topic.to_string(),
                partition,
                offset,
                timestamp: stored.timestamp,
                key: stored.key.clone(),
                value: stored.value.clone(),
            })?;
            if let Some(log) = state
                .topics
                .get_mut(topic)
                .and_then(|p| p.get_mut(partition as usize))
            {
                log.push(stored);
            }

            Appended {
                partition: TopicPartition::new(topic, partition),
                offset,
            }
        };

        self.shared.appended.notify_waiters();
        Ok(appended)
    }

    /// Offset committed by `group` for a partition
    pub fn committed(&self, group: &str, partition: &TopicPartition) -> Option<u64> {
        self.lock()
            .committed
            .get(&(group.to_string(), partition.clone()))
            .copied()
    }

    /// Offset the next appended record will receive
    pub fn end_offset(&self, partition: &TopicPartition) -> u64 {
        self.lock()
            .topics
            .get(&partition.topic)
            .and_then(|p| p.get(partition.partition as usize))
            .map(|log| log.len() as u64)
            .unwrap_or(0)
    }

    fn join(&self, config: &ConsumerConfig) -> Result<BTreeMap<TopicPartition, u64>, BrokerError> {
        let mut state = self.lock();
        let mut positions = BTreeMap::new();

        for topic in &config.topics {
            if !state.topics.contains_key(topic) {
                if !self.shared.config.auto_create_topics {
                    return Err(BrokerError::UnknownTopic(topic.clone()));
                }
                state.add_topic(topic, self.shared.config.partitions)?;
            }

            let partitions = state.topics.get(topic).map(Vec::len).unwrap_or(0);
            for index in 0..partitions {
                let tp = TopicPartition::new(topic.clone(), index as u32);
                let end = state.topics[topic][index].len() as u64;
                let position = match state.committed.get(&(config.group.clone(), tp.clone())) {
                    Some(offset) => *offset,
                    None if config.from_beginning => 0,
                    None => end,
                };
                positions.insert(tp, position);
            }
        }

        Ok(positions)
    }

    fn record_at(&self, partition: &TopicPartition, offset: u64) -> Option<LogRecord> {
        let state = self.lock();
        let stored = state
            .topics
            .get(&partition.topic)?
            .get(partition.partition as usize)?
            .get(offset as usize)?;

        Some(LogRecord {
            topic: partition.topic.clone(),
            partition: partition.partition,
            offset,
            timestamp: stored.timestamp,
            key: stored.key.clone(),
            value: stored.value.clone(),
        })
    }

    fn commit_offset(
        &self,
        group: &str,
        partition: &TopicPartition,
        next_offset: u64,
    ) -> Result<(), BrokerError> {
        let mut state = self.lock();
        state
            .persist(&LogEvent::Commit {
                group: group.to_string(),
                topic: partition.topic.clone(),
                partition: partition.partition,
                next_offset,
            })
            .map_err(|e| BrokerError::CommitFailed(e.to_string()))?;
        state
            .committed
            .insert((group.to_string(), partition.clone()), next_offset);
        Ok(())
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(MemoryBrokerConfig::default())
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    type Consumer = MemoryConsumer;
    type Producer = MemoryProducer;

    async fn consumer(&self, config: ConsumerConfig) -> Result<MemoryConsumer, BrokerError> {
        let positions = self.join(&config)?;
        Ok(MemoryConsumer {
            broker: self.clone(),
            group: config.group,
            positions,
            cursor: 0,
            connected: true,
        })
    }

    fn producer(&self) -> MemoryProducer {
        MemoryProducer {
            broker: self.clone(),
        }
    }
}

/// Group member reading from a [`MemoryBroker`]
pub struct MemoryConsumer {
    broker: MemoryBroker,
    group: String,
    positions: BTreeMap<TopicPartition, u64>,
    cursor: usize,
    connected: bool,
}

impl MemoryConsumer {
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Take the next available record, rotating across partitions
    fn poll_once(&mut self) -> Option<LogRecord> {
        let count = self.positions.len();
        if count == 0 {
            return None;
        }

        let partitions: Vec<_> = self.positions.keys().cloned().collect();
        for step in 0..count {
            let index = (self.cursor + step) % count;
            let tp = &partitions[index];
            let offset = self.positions[tp];
            if let Some(record) = self.broker.record_at(tp, offset) {
                self.positions.insert(tp.clone(), offset + 1);
                self.cursor = (index + 1) % count;
                return Some(record);
            }
        }
        None
    }
}

#[async_trait]
impl LogConsumer for MemoryConsumer {
    fn assignment(&self) -> Vec<(TopicPartition, u64)> {
        self.positions
            .iter()
            .map(|(tp, offset)| (tp.clone(), *offset))
            .collect()
    }

    async fn seek(&mut self, partition: &TopicPartition, offset: u64) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::Disconnected);
        }
        if !self.positions.contains_key(partition) {
            return Err(BrokerError::NotAssigned(partition.clone()));
        }
        let end = self.broker.end_offset(partition);
        if offset > end {
            return Err(BrokerError::OffsetOutOfRange {
                partition: partition.clone(),
                offset,
                end,
            });
        }
        self.positions.insert(partition.clone(), offset);
        Ok(())
    }

    async fn next(&mut self) -> Result<LogRecord, BrokerError> {
        let shared = Arc::clone(&self.broker.shared);
        loop {
            // Register for wakeups before checking, so an append between the
            // check and the await is not missed
            let appended = shared.appended.notified();

            if !self.connected {
                return Err(BrokerError::Disconnected);
            }
            if let Some(record) = self.poll_once() {
                return Ok(record);
            }

            appended.await;
        }
    }

    async fn commit(
        &mut self,
        partition: &TopicPartition,
        next_offset: u64,
    ) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::Disconnected);
        }
        if !self.positions.contains_key(partition) {
            return Err(BrokerError::NotAssigned(partition.clone()));
        }
        self.broker.commit_offset(&self.group, partition, next_offset)
    }

    async fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.connected = false;
        Ok(())
    }
}

/// Producer appending to a [`MemoryBroker`]
#[derive(Clone)]
pub struct MemoryProducer {
    broker: MemoryBroker,
}

#[async_trait]
impl LogProducer for MemoryProducer {
    async fn send(
        &self,
        topic: &str,
        key: Option<&str>,
        value: Vec<u8>,
    ) -> Result<Appended, BrokerError> {
        self.broker.append(topic, key, value)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
