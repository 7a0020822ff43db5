// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake broker for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{
    Appended, Broker, BrokerError, ConsumerConfig, LogConsumer, LogProducer, MemoryBroker,
    MemoryBrokerConfig, MemoryConsumer, MemoryProducer,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tm_core::{LogRecord, TopicPartition};

/// Recorded broker call
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerCall {
    Join {
        group: String,
        topics: Vec<String>,
    },
    Seek {
        group: String,
        partition: TopicPartition,
        offset: u64,
    },
    Commit {
        group: String,
        partition: TopicPartition,
        offset: u64,
    },
    Send {
        topic: String,
        key: Option<String>,
        value: Vec<u8>,
    },
    Disconnect {
        group: String,
    },
}

#[derive(Default)]
struct Faults {
    fail_joins: bool,
    fail_commits: bool,
    fail_sends: bool,
}

type CommitHook = Box<dyn Fn(&str, &TopicPartition, u64) + Send + Sync>;

#[derive(Default)]
struct FakeState {
    calls: Mutex<Vec<BrokerCall>>,
    faults: Mutex<Faults>,
    on_commit: Mutex<Option<CommitHook>>,
}

impl FakeState {
    fn record(&self, call: BrokerCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Fake broker: a [`MemoryBroker`] that records calls and injects faults
#[derive(Clone)]
pub struct FakeBroker {
    memory: MemoryBroker,
    state: Arc<FakeState>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::with_memory(MemoryBroker::new(MemoryBrokerConfig::default()))
    }

    pub fn with_memory(memory: MemoryBroker) -> Self {
        Self {
            memory,
            state: Arc::new(FakeState::default()),
        }
    }

    /// The underlying log, for seeding records and inspecting offsets
    pub fn memory(&self) -> &MemoryBroker {
        &self.memory
    }

    /// Append a JSON payload directly, bypassing call recording
    pub fn seed(
        &self,
        topic: &str,
        key: Option<&str>,
        value: &str,
    ) -> Result<Appended, BrokerError> {
        self.memory.append(topic, key, value.as_bytes().to_vec())
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<BrokerCall> {
        self.state
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Offsets committed by `group`, in call order
    pub fn commits(&self, group: &str) -> Vec<(TopicPartition, u64)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BrokerCall::Commit {
                    group: g,
                    partition,
                    offset,
                } if g == group => Some((partition, offset)),
                _ => None,
            })
            .collect()
    }

    /// Payloads sent to `topic`, in call order
    pub fn sent(&self, topic: &str) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BrokerCall::Send { topic: t, value, .. } if t == topic => Some(value),
                _ => None,
            })
            .collect()
    }

    pub fn fail_joins(&self, fail: bool) {
        self.state.faults().fail_joins = fail;
    }

    pub fn fail_commits(&self, fail: bool) {
        self.state.faults().fail_commits = fail;
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.faults().fail_sends = fail;
    }

    /// Run `hook(group, partition, offset)` before every successful commit
    pub fn on_commit(&self, hook: impl Fn(&str, &TopicPartition, u64) + Send + Sync + 'static) {
        *self
            .state
            .on_commit
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(Box::new(hook));
    }
}

impl Default for FakeBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for FakeBroker {
    type Consumer = FakeConsumer;
    type Producer = FakeProducer;

    async fn consumer(&self, config: ConsumerConfig) -> Result<FakeConsumer, BrokerError> {
        self.state.record(BrokerCall::Join {
            group: config.group.clone(),
            topics: config.topics.clone(),
        });
        if self.state.faults().fail_joins {
            return Err(BrokerError::Unavailable("injected join failure".to_string()));
        }

        let group = config.group.clone();
        let inner = self.memory.consumer(config).await?;
        Ok(FakeConsumer {
            inner,
            group,
            state: Arc::clone(&self.state),
        })
    }

    fn producer(&self) -> FakeProducer {
        FakeProducer {
            inner: self.memory.producer(),
            state: Arc::clone(&self.state),
        }
    }
}

/// Consumer handed out by [`FakeBroker`]
pub struct FakeConsumer {
    inner: MemoryConsumer,
    group: String,
    state: Arc<FakeState>,
}

#[async_trait]
impl LogConsumer for FakeConsumer {
    fn assignment(&self) -> Vec<(TopicPartition, u64)> {
        self.inner.assignment()
    }

    async fn seek(&mut self, partition: &TopicPartition, offset: u64) -> Result<(), BrokerError> {
        self.state.record(BrokerCall::Seek {
            group: self.group.clone(),
            partition: partition.clone(),
            offset,
        });
        self.inner.seek(partition, offset).await
    }

    async fn next(&mut self) -> Result<LogRecord, BrokerError> {
        self.inner.next().await
    }

    async fn commit(
        &mut self,
        partition: &TopicPartition,
        next_offset: u64,
    ) -> Result<(), BrokerError> {
        if self.state.faults().fail_commits {
            return Err(BrokerError::CommitFailed(
                "injected commit failure".to_string(),
            ));
        }
        if let Some(hook) = self
            .state
            .on_commit
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            hook(&self.group, partition, next_offset);
        }
        self.state.record(BrokerCall::Commit {
            group: self.group.clone(),
            partition: partition.clone(),
            offset: next_offset,
        });
        self.inner.commit(partition, next_offset).await
    }

    async fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.state.record(BrokerCall::Disconnect {
            group: self.group.clone(),
        });
        self.inner.disconnect().await
    }
}

/// Producer handed out by [`FakeBroker`]
#[derive(Clone)]
pub struct FakeProducer {
    inner: MemoryProducer,
    state: Arc<FakeState>,
}

#[async_trait]
impl LogProducer for FakeProducer {
    async fn send(
        &self,
        topic: &str,
        key: Option<&str>,
        value: Vec<u8>,
    ) -> Result<Appended, BrokerError> {
        self.state.record(BrokerCall::Send {
            topic: topic.to_string(),
            key: key.map(str::to_string),
            value: value.clone(),
        });
        if self.state.faults().fail_sends {
            return Err(BrokerError::SendFailed("injected send failure".to_string()));
        }
        self.inner.send(topic, key, value).await
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
