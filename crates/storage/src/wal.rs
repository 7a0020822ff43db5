// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-ahead log: durable appends and crash recovery

use crate::entry::{Operation, WalEntry};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur in WAL operations
#[derive(Debug, Error)]
pub enum WalReadError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("WAL is unavailable after a failed append that could not be rolled back")]
    Broken,
}

/// Outcome of replaying a WAL file
#[derive(Debug, Default)]
pub struct Recovered {
    /// Valid entries, in file order
    pub entries: Vec<WalEntry>,
    /// Bytes removed from a torn or corrupted tail
    pub truncated_bytes: u64,
}

/// Append-only log file
pub struct Wal {
    path: PathBuf,
    file: File,
    next_sequence: u64,
    len: u64,
    broken: bool,
}

impl Wal {
    /// Read every valid entry and cut off anything after the first bad one.
    ///
    /// A line is valid when it ends in a newline, parses, and its checksum
    /// matches. The first invalid line marks the crash point: it and
    /// everything after it are truncated so later appends never follow
    /// garbage.
    pub fn replay(path: &Path) -> Result<Recovered, WalReadError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Recovered::default()),
            Err(e) => return Err(e.into()),
        };
        let total_len = file.metadata()?.len();

        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut valid_len: u64 = 0;
        let mut line = Vec::new();

        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                break;
            }
            if line.last() != Some(&b'\n') {
                tracing::warn!(position = valid_len, "torn WAL entry without newline");
                break;
            }

            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            let trimmed = text.trim();
            if trimmed.is_empty() {
                valid_len += read as u64;
                continue;
            }

            match WalEntry::from_line(trimmed) {
                Ok(entry) if entry.verify() => {
                    entries.push(entry);
                    valid_len += read as u64;
                }
                Ok(entry) => {
                    tracing::warn!(sequence = entry.sequence, "WAL checksum mismatch");
                    break;
                }
                Err(e) => {
                    tracing::warn!(position = valid_len, error = %e, "unparsable WAL entry");
                    break;
                }
            }
        }

        let truncated_bytes = total_len - valid_len;
        if truncated_bytes > 0 {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_len)?;
            file.sync_all()?;
            tracing::info!(
                position = valid_len,
                truncated_bytes,
                "WAL truncated at last valid entry"
            );
        }

        Ok(Recovered {
            entries,
            truncated_bytes,
        })
    }

    /// Open the WAL for appending, assigning sequences from `next_sequence`
    pub fn open(path: &Path, next_sequence: u64) -> Result<Self, WalReadError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_sequence,
            len,
            broken: false,
        })
    }

    /// Append an operation; durable (fsync'd) before returning.
    ///
    /// On failure the file is cut back to its previous length. If even that
    /// fails the WAL refuses further appends.
    pub fn append(&mut self, operation: Operation) -> Result<WalEntry, WalReadError> {
        if self.broken {
            return Err(WalReadError::Broken);
        }

        let entry = WalEntry::new(self.next_sequence, operation)?;
        let mut line = entry.to_line()?.into_bytes();
        line.push(b'\n');

        let result = self
            .file
            .write_all(&line)
            .and_then(|()| self.file.sync_all());

        if let Err(e) = result {
            if self.file.set_len(self.len).is_err() {
                self.broken = true;
            }
            return Err(e.into());
        }

        self.len += line.len() as u64;
        self.next_sequence += 1;
        Ok(entry)
    }

    /// Drop every entry (after they were captured in a snapshot).
    /// Sequence numbers keep counting up.
    pub fn reset(&mut self) -> Result<(), WalReadError> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.len = 0;
        Ok(())
    }

    /// Sequence number the next append will receive
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Current file length in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
