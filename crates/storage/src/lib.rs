// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Durable key-value store with a metadata namespace
//!
//! ## Architecture
//!
//! ```text
//! put / put_meta / commit(Batch) → Operation → WalEntry → wal.jsonl (fsync)
//!                                                   ↓
//!                        open: snapshot.json + replay → Table (in memory)
//! ```
//!
//! ## Durability Guarantees
//!
//! - Every append is fsync'd before the call returns
//! - A `Batch` is one WAL entry, so record writes and the offset checkpoint
//!   that accompanies them become durable together
//! - Checksums and the trailing newline detect torn writes; recovery
//!   truncates the log at the last valid entry
//! - Snapshots are written to a temp file and renamed into place

mod entry;
mod query;
mod snapshot;
mod store;
mod table;
mod wal;

pub use entry::{Operation, WalEntry};
pub use query::{Filter, QueryOptions};
pub use snapshot::{read_json, write_json_atomic, SnapshotError, StoreSnapshot};
pub use store::{Batch, Store, StoreConfig, StoreError};
pub use table::Table;
pub use wal::{Recovered, Wal, WalReadError};
