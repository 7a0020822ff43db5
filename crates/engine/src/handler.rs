// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Business effects applied by consumer groups

use serde_json::{json, Value};
use thiserror::Error;
use tm_core::{LogRecord, Record};
use tm_storage::Store;

/// Errors raised by a [`RecordHandler`]
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("record {id} rejected: {reason}")]
    Rejected { id: String, reason: String },
    #[error("{0}")]
    Failed(String),
}

/// A derived event to publish once the effect is applied
#[derive(Debug, Clone, PartialEq)]
pub struct Emit {
    pub topic: String,
    pub key: Option<String>,
    pub value: Value,
}

/// What applying one record produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    /// Store writes, committed together with the group checkpoint
    pub writes: Vec<(String, Value)>,
    /// Derived events, queued to the producer before the checkpoint
    pub emits: Vec<Emit>,
}

impl Outcome {
    pub fn write(mut self, key: impl Into<String>, value: Value) -> Self {
        self.writes.push((key.into(), value));
        self
    }

    pub fn emit(mut self, topic: impl Into<String>, key: Option<String>, value: Value) -> Self {
        self.emits.push(Emit {
            topic: topic.into(),
            key,
            value,
        });
        self
    }
}

/// The business effect of a consumer group.
///
/// Must tolerate replays: the same record can be delivered again after a
/// crash between the checkpoint write and the broker acknowledgment.
/// Handlers read through `store` but never write to it directly; writes go
/// in the [`Outcome`] so they land in the same batch as the checkpoint.
pub trait RecordHandler: Send + Sync + 'static {
    fn handle(
        &self,
        record: &Record,
        log: &LogRecord,
        store: &Store,
    ) -> Result<Outcome, HandlerError>;
}

impl<F> RecordHandler for F
where
    F: Fn(&Record, &LogRecord, &Store) -> Result<Outcome, HandlerError> + Send + Sync + 'static,
{
    fn handle(
        &self,
        record: &Record,
        log: &LogRecord,
        store: &Store,
    ) -> Result<Outcome, HandlerError> {
        self(record, log, store)
    }
}

/// Keeps the latest state of each record and announces status changes
///
/// Incoming attributes are merged over the stored record. When the merged
/// `status` differs from the stored one, `{id, status, previousStatus,
/// location}` is emitted to the output topic, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct StatusProjection {
    output_topic: Option<String>,
}

impl StatusProjection {
    pub fn new(output_topic: Option<String>) -> Self {
        Self { output_topic }
    }
}

fn str_field<'a>(value: Option<&'a Value>, field: &str) -> Option<&'a str> {
    value?.get(field)?.as_str().filter(|s| !s.is_empty())
}

impl RecordHandler for StatusProjection {
    fn handle(
        &self,
        record: &Record,
        _log: &LogRecord,
        store: &Store,
    ) -> Result<Outcome, HandlerError> {
        let previous = store.get(&record.id);
        let merged = record.merged_over(previous.as_ref());

        let previous_status = str_field(previous.as_ref(), "status");
        let status = str_field(Some(&merged), "status");

        let mut outcome = Outcome::default();
        if let (Some(topic), Some(status)) = (&self.output_topic, status) {
            if previous_status != Some(status) {
                outcome = outcome.emit(
                    topic.clone(),
                    Some(record.id.clone()),
                    json!({
                        "id": record.id,
                        "status": status,
                        "previousStatus": previous_status,
                        "location": str_field(Some(&merged), "location"),
                    }),
                );
            }
        }

        Ok(outcome.write(record.id.clone(), merged))
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
