// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshots for WAL compaction
//!
//! A snapshot captures the whole table so the WAL can be truncated. It is
//! written to a temp file, fsync'd, and renamed over the previous one, so a
//! reader sees either the old snapshot or the new one, never a mix.

use crate::table::Table;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during snapshot operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid snapshot format: {0}")]
    InvalidFormat(String),
}

/// Serializable copy of the store table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    /// WAL entries with a sequence below this are already included
    pub next_sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub records: BTreeMap<String, Value>,
    pub meta: BTreeMap<String, Value>,
}

impl StoreSnapshot {
    /// Current version of the snapshot format
    pub const CURRENT_VERSION: u32 = 1;

    pub fn from_table(table: &Table, next_sequence: u64) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            next_sequence,
            timestamp: Utc::now(),
            records: table.records.clone(),
            meta: table.meta.clone(),
        }
    }

    pub fn into_table(self) -> Table {
        Table {
            records: self.records,
            meta: self.meta,
        }
    }

    /// Load and version-check a snapshot; `None` when there is none
    pub fn load(path: &Path) -> Result<Option<Self>, SnapshotError> {
        let Some(snapshot) = read_json::<Self>(path)? else {
            return Ok(None);
        };
        if snapshot.version != Self::CURRENT_VERSION {
            return Err(SnapshotError::InvalidFormat(format!(
                "unsupported version: {} (expected {})",
                snapshot.version,
                Self::CURRENT_VERSION
            )));
        }
        Ok(Some(snapshot))
    }
}

/// Write `value` as JSON to `path` via temp file + fsync + rename
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), SnapshotError> {
    let dir = path
        .parent()
        .ok_or_else(|| SnapshotError::InvalidFormat(format!("no parent: {}", path.display())))?;
    fs::create_dir_all(dir)?;

    let tmp = path.with_extension("tmp");
    {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&tmp, path)?;

    // Persist the rename itself
    File::open(dir)?.sync_all()?;
    Ok(())
}

/// Read JSON from `path`; `None` when the file does not exist
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, SnapshotError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_reader(BufReader::new(file))?))
}
