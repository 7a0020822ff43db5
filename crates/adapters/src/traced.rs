// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced broker wrappers for consistent observability

use crate::broker::{Appended, Broker, BrokerError, ConsumerConfig, LogConsumer, LogProducer};
use async_trait::async_trait;
use std::time::Instant;
use tm_core::{LogRecord, TopicPartition};
use tracing::Instrument;

/// Wrapper that adds tracing to any [`Broker`]
#[derive(Clone)]
pub struct TracedBroker<B> {
    inner: B,
}

impl<B> TracedBroker<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: Broker> Broker for TracedBroker<B> {
    type Consumer = TracedConsumer<B::Consumer>;
    type Producer = TracedProducer<B::Producer>;

    async fn consumer(&self, config: ConsumerConfig) -> Result<Self::Consumer, BrokerError> {
        let group = config.group.clone();
        let span = tracing::info_span!("broker.join", group = %group);

        async move {
            if config.topics.is_empty() {
                tracing::error!("no topics to subscribe to");
                return Err(BrokerError::Unavailable(format!(
                    "group {} has no topics",
                    group
                )));
            }
            tracing::info!(topics = ?config.topics, from_beginning = config.from_beginning, "joining");

            let start = Instant::now();
            let result = self.inner.consumer(config).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(inner) => {
                    tracing::info!(
                        elapsed_ms,
                        partitions = inner.assignment().len(),
                        "joined"
                    );
                    Ok(TracedConsumer { inner, group })
                }
                Err(e) => {
                    tracing::error!(elapsed_ms, error = %e, "join failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    fn producer(&self) -> Self::Producer {
        TracedProducer {
            inner: self.inner.producer(),
        }
    }
}

/// Consumer wrapper created by [`TracedBroker`]
pub struct TracedConsumer<C> {
    inner: C,
    group: String,
}

impl<C> TracedConsumer<C> {
    pub fn group(&self) -> &str {
        &self.group
    }
}

#[async_trait]
impl<C: LogConsumer> LogConsumer for TracedConsumer<C> {
    fn assignment(&self) -> Vec<(TopicPartition, u64)> {
        self.inner.assignment()
    }

    async fn seek(&mut self, partition: &TopicPartition, offset: u64) -> Result<(), BrokerError> {
        let span = tracing::info_span!("broker.seek", group = %self.group, %partition, offset);
        let result = self.inner.seek(partition, offset).instrument(span.clone()).await;

        let _guard = span.enter();
        match &result {
            Ok(()) => tracing::info!("positioned"),
            Err(e) => tracing::error!(error = %e, "seek failed"),
        }
        result
    }

    async fn next(&mut self) -> Result<LogRecord, BrokerError> {
        let result = self.inner.next().await;
        match &result {
            Ok(record) => tracing::trace!(
                group = %self.group,
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                "received"
            ),
            Err(e) => tracing::warn!(group = %self.group, error = %e, "receive failed"),
        }
        result
    }

    async fn commit(
        &mut self,
        partition: &TopicPartition,
        next_offset: u64,
    ) -> Result<(), BrokerError> {
        let start = Instant::now();
        let result = self.inner.commit(partition, next_offset).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(()) => tracing::debug!(
                group = %self.group,
                %partition,
                next_offset,
                elapsed_ms,
                "committed"
            ),
            Err(e) => tracing::error!(
                group = %self.group,
                %partition,
                next_offset,
                elapsed_ms,
                error = %e,
                "commit failed"
            ),
        }
        result
    }

    async fn disconnect(&mut self) -> Result<(), BrokerError> {
        let result = self.inner.disconnect().await;
        // Leaving an already-broken session is expected during shutdown
        match &result {
            Ok(()) => tracing::info!(group = %self.group, "left group"),
            Err(e) => tracing::warn!(group = %self.group, error = %e, "disconnect failed"),
        }
        result
    }
}

/// Producer wrapper created by [`TracedBroker`]
#[derive(Clone)]
pub struct TracedProducer<P> {
    inner: P,
}

#[async_trait]
impl<P: LogProducer> LogProducer for TracedProducer<P> {
    async fn send(
        &self,
        topic: &str,
        key: Option<&str>,
        value: Vec<u8>,
    ) -> Result<Appended, BrokerError> {
        let span = tracing::debug_span!("broker.send", topic, key = ?key, bytes = value.len());

        async move {
            let start = Instant::now();
            let result = self.inner.send(topic, key, value).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(appended) => tracing::debug!(
                    elapsed_ms,
                    partition = %appended.partition,
                    offset = appended.offset,
                    "sent"
                ),
                Err(e) => tracing::error!(elapsed_ms, error = %e, "send failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
