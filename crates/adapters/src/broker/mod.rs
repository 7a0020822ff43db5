// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log broker adapters
//!
//! The broker is a black box: named topics split into partitions, records
//! delivered in order within a partition, at-least-once, with per-group
//! committed offsets. Commits are always explicit.

mod memory;

pub use memory::{MemoryBroker, MemoryBrokerConfig, MemoryConsumer, MemoryProducer};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{BrokerCall, FakeBroker, FakeConsumer, FakeProducer};

use async_trait::async_trait;
use thiserror::Error;
use tm_core::{LogRecord, TopicPartition};

/// Errors from broker operations
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
    #[error("partition {0} is not assigned to this consumer")]
    NotAssigned(TopicPartition),
    #[error("offset {offset} is past the end of {partition} (end {end})")]
    OffsetOutOfRange {
        partition: TopicPartition,
        offset: u64,
        end: u64,
    },
    #[error("consumer is disconnected")]
    Disconnected,
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    #[error("commit failed: {0}")]
    CommitFailed(String),
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// How a consumer joins its group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    pub group: String,
    pub topics: Vec<String>,
    /// Where to start when the group has no committed offset:
    /// the earliest retained record, or only records appended later
    pub from_beginning: bool,
}

/// Where a produced record landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appended {
    pub partition: TopicPartition,
    pub offset: u64,
}

/// Entry point to a log broker
#[async_trait]
pub trait Broker: Clone + Send + Sync + 'static {
    type Consumer: LogConsumer;
    type Producer: LogProducer;

    /// Connect, join `config.group` and subscribe to its topics
    async fn consumer(&self, config: ConsumerConfig) -> Result<Self::Consumer, BrokerError>;

    fn producer(&self) -> Self::Producer;
}

/// A joined group member
#[async_trait]
pub trait LogConsumer: Send + 'static {
    /// Assigned partitions and the next offset each would deliver
    fn assignment(&self) -> Vec<(TopicPartition, u64)>;

    /// Reposition a partition before consumption resumes.
    ///
    /// An offset past the partition's end fails with `OffsetOutOfRange` and
    /// leaves the position as it was.
    async fn seek(&mut self, partition: &TopicPartition, offset: u64) -> Result<(), BrokerError>;

    /// Wait for the next record.
    ///
    /// Cancel-safe: dropping the future never loses a record.
    async fn next(&mut self) -> Result<LogRecord, BrokerError>;

    /// Commit `next_offset` (the offset after the last processed record)
    async fn commit(&mut self, partition: &TopicPartition, next_offset: u64)
        -> Result<(), BrokerError>;

    /// Leave the group; later calls fail with `Disconnected`
    async fn disconnect(&mut self) -> Result<(), BrokerError>;
}

/// Appends records to topics
#[async_trait]
pub trait LogProducer: Clone + Send + Sync + 'static {
    async fn send(
        &self,
        topic: &str,
        key: Option<&str>,
        value: Vec<u8>,
    ) -> Result<Appended, BrokerError>;
}
