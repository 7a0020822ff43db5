// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Routes live log records to fan-out subscribers

use crate::cache::CacheView;
use crate::fanout::FanOut;
use tm_adapters::{Broker, BrokerError, ConsumerConfig, LogConsumer};
use tm_core::{Envelope, LogRecord, Record, RoutingKey};
use tokio::sync::watch;

/// Finds the routing key for a record
///
/// The cache's derived value for the record id wins; the record's own
/// field is the fallback.
#[derive(Clone)]
pub struct RouteResolver {
    cache: Option<CacheView>,
    field: String,
}

impl RouteResolver {
    pub fn new(field: impl Into<String>, cache: Option<CacheView>) -> Self {
        Self {
            cache,
            field: field.into(),
        }
    }

    pub fn resolve(&self, record: &Record) -> Option<RoutingKey> {
        let cached = self.cache.as_ref().and_then(|cache| {
            let derived = cache.get(&record.id)?;
            derived.get(&self.field)?.as_str().and_then(RoutingKey::new)
        });
        cached.or_else(|| record.str_attr(&self.field).and_then(RoutingKey::new))
    }
}

/// Router configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Group name used to join the broker
    pub group: String,
    pub topics: Vec<String>,
}

/// Consumes live records and publishes them to subscribers
///
/// Starts at the end of each topic and never commits: subscribers only see
/// records appended while they are connected.
pub struct Router<B> {
    config: RouterConfig,
    broker: B,
    resolver: RouteResolver,
    fanout: FanOut,
}

impl<B: Broker> Router<B> {
    pub fn new(config: RouterConfig, broker: B, resolver: RouteResolver, fanout: FanOut) -> Self {
        Self {
            config,
            broker,
            resolver,
            fanout,
        }
    }

    /// Publish one record; returns the key it went to
    pub fn route(&self, log: &LogRecord) -> Option<RoutingKey> {
        let record = match log.record() {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    topic = %log.topic,
                    partition = log.partition,
                    offset = log.offset,
                    error = %e,
                    "unroutable record"
                );
                return None;
            }
        };

        let Some(key) = self.resolver.resolve(&record) else {
            tracing::warn!(
                id = %record.id,
                topic = %log.topic,
                offset = log.offset,
                "no routing key, dropping record"
            );
            return None;
        };

        let delivery = self.fanout.publish(
            &key,
            &Envelope::Log {
                topic: log.topic.clone(),
                log: record.to_value(),
            },
        );
        tracing::trace!(%key, delivered = delivery.delivered, "routed");
        Some(key)
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), BrokerError> {
        let mut consumer = self
            .broker
            .consumer(ConsumerConfig {
                group: self.config.group.clone(),
                topics: self.config.topics.clone(),
                from_beginning: false,
            })
            .await?;
        tracing::info!(group = %self.config.group, topics = ?self.config.topics, "router running");

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
            self.route(&log);
        }

        if let Err(e) = consumer.disconnect().await {
            tracing::warn!(group = %self.config.group, error = %e, "disconnect failed");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
