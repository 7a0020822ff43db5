// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAL entry structure with checksum verification

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// A state change recorded in the WAL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Upsert a record
    Put { key: String, value: Value },
    /// Upsert a metadata value (checkpoints, bookkeeping)
    PutMeta { key: String, value: Value },
    /// Several operations committed as one entry
    Batch { ops: Vec<Operation> },
}

/// A single entry in the write-ahead log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Monotonically increasing sequence number
    pub sequence: u64,
    /// Microseconds since Unix epoch
    pub timestamp_micros: u64,
    /// The operation being recorded
    pub operation: Operation,
    /// CRC32 checksum of the serialized operation
    pub checksum: u32,
}

impl WalEntry {
    /// Create a new WAL entry with computed checksum
    pub fn new(sequence: u64, operation: Operation) -> Result<Self, serde_json::Error> {
        let checksum = Self::calculate_checksum(&operation)?;
        let timestamp_micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);

        Ok(Self {
            sequence,
            timestamp_micros,
            operation,
            checksum,
        })
    }

    fn calculate_checksum(operation: &Operation) -> Result<u32, serde_json::Error> {
        let json = serde_json::to_vec(operation)?;
        Ok(crc32fast::hash(&json))
    }

    /// Verify the checksum matches the operation
    pub fn verify(&self) -> bool {
        Self::calculate_checksum(&self.operation)
            .map(|checksum| checksum == self.checksum)
            .unwrap_or(false)
    }

    /// Serialize to newline-delimited JSON (one line, no newline)
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from a single line of JSON
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}
