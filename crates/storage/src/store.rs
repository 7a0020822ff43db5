// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAL-backed store with crash recovery
//!
//! `Store` is a cheap-to-clone handle; all clones share one WAL and one
//! table behind a mutex, so consumer groups running on different tasks
//! never interleave their appends.

use crate::entry::Operation;
use crate::query::{Filter, QueryOptions};
use crate::snapshot::{write_json_atomic, SnapshotError, StoreSnapshot};
use crate::table::Table;
use crate::wal::{Wal, WalReadError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAL error: {0}")]
    Wal(#[from] WalReadError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Configuration for the store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Appends between automatic compactions (0 disables)
    pub compaction_threshold: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            compaction_threshold: 10_000,
        }
    }
}

/// Writes applied atomically by [`Store::commit`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    ops: Vec<Operation>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(mut self, key: impl Into<String>, value: Value) -> Self {
        self.ops.push(Operation::Put {
            key: key.into(),
            value,
        });
        self
    }

    pub fn put_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.ops.push(Operation::PutMeta {
            key: key.into(),
            value,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn into_operation(mut self) -> Option<Operation> {
        match self.ops.len() {
            0 => None,
            1 => self.ops.pop(),
            _ => Some(Operation::Batch { ops: self.ops }),
        }
    }
}

/// Durable key-value store with a metadata namespace
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<StoreInner>>,
}

struct StoreInner {
    config: StoreConfig,
    snapshot_path: PathBuf,
    wal: Wal,
    table: Table,
    appends_since_compaction: u64,
    /// Refuse every write; see [`Store::fail_writes`]
    fail_writes: bool,
}

impl Store {
    /// Open or create a store in `dir`
    pub fn open(dir: &Path, config: StoreConfig) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        let wal_path = dir.join("wal.jsonl");
        let snapshot_path = dir.join("snapshot.json");

        let (mut table, mut next_sequence) = match StoreSnapshot::load(&snapshot_path)? {
            Some(snapshot) => {
                let next = snapshot.next_sequence;
                (snapshot.into_table(), next)
            }
            None => (Table::new(), 0),
        };

        let recovered = Wal::replay(&wal_path)?;
        let mut replayed = 0u64;
        for entry in &recovered.entries {
            // Entries already folded into the snapshot (crash between the
            // snapshot rename and the WAL reset) are skipped
            if entry.sequence < next_sequence {
                continue;
            }
            table.apply(&entry.operation);
            next_sequence = entry.sequence + 1;
            replayed += 1;
        }

        tracing::info!(
            dir = %dir.display(),
            records = table.len(),
            meta = table.meta_len(),
            replayed,
            truncated_bytes = recovered.truncated_bytes,
            "store opened"
        );

        let wal = Wal::open(&wal_path, next_sequence)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(StoreInner {
                config,
                snapshot_path,
                wal,
                table,
                appends_since_compaction: replayed,
                fail_writes: false,
            })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Upsert a record; durable before returning
    pub fn put(&self, key: impl Into<String>, value: Value) -> Result<(), StoreError> {
        self.commit(Batch::new().put(key, value))
    }

    /// Current value of a record
    ///
    /// Reads are served from the in-memory table and cannot fail.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().table.get(key).cloned()
    }

    /// Upsert a metadata value; durable before returning
    pub fn put_meta(&self, key: impl Into<String>, value: Value) -> Result<(), StoreError> {
        self.commit(Batch::new().put_meta(key, value))
    }

    pub fn get_meta(&self, key: &str) -> Option<Value> {
        self.lock().table.get_meta(key).cloned()
    }

    /// Apply a batch as one WAL entry (one fsync).
    ///
    /// After a crash either every write in the batch is visible or none is.
    /// The table only changes once the entry is durable.
    pub fn commit(&self, batch: Batch) -> Result<(), StoreError> {
        let Some(operation) = batch.into_operation() else {
            return Ok(());
        };

        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(StoreError::Io(std::io::Error::other("injected write failure")));
        }
        let entry = inner.wal.append(operation)?;
        inner.table.apply(&entry.operation);
        inner.appends_since_compaction += 1;

        let threshold = inner.config.compaction_threshold;
        if threshold > 0 && inner.appends_since_compaction >= threshold {
            // The batch is already durable; a failed compaction only leaves
            // a longer WAL behind
            if let Err(e) = inner.compact() {
                tracing::warn!(error = %e, "automatic compaction failed");
            }
        }
        Ok(())
    }

    /// All records matching `filter`, in key order
    pub fn query(&self, filter: &Filter, options: QueryOptions) -> Vec<(String, Value)> {
        self.lock().table.query(filter, options)
    }

    /// Capture the table in a snapshot and truncate the WAL
    pub fn compact(&self) -> Result<(), StoreError> {
        self.lock().compact()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.lock().table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().table.is_empty()
    }

    /// Number of metadata entries
    pub fn meta_len(&self) -> usize {
        self.lock().table.meta_len()
    }

    /// Sequence number the next write will receive
    pub fn sequence(&self) -> u64 {
        self.lock().wal.next_sequence()
    }

    /// Make every later write fail as if the disk refused it
    #[cfg(any(test, feature = "test-support"))]
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }
}

impl StoreInner {
    fn compact(&mut self) -> Result<(), StoreError> {
        let next_sequence = self.wal.next_sequence();
        let snapshot = StoreSnapshot::from_table(&self.table, next_sequence);
        write_json_atomic(&self.snapshot_path, &snapshot)?;
        self.wal.reset()?;
        self.appends_since_compaction = 0;
        tracing::debug!(next_sequence, records = self.table.len(), "store compacted");
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
