// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the specs

pub use serde_json::{json, Value};
pub use similar_asserts::assert_eq;
pub use std::sync::Arc;
pub use std::time::Duration;
pub use tempfile::TempDir;
pub use tm_adapters::{Broker, BrokerCall, FakeBroker};
pub use tm_storage::{Store, StoreConfig};
pub use tokio::sync::watch;

/// Poll `check` until it holds, failing after 5s
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..1_000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Wait until `group` has joined the broker
pub async fn joined(broker: &FakeBroker, group: &str) {
    eventually(&format!("{} to join", group), || {
        broker
            .calls()
            .iter()
            .any(|call| matches!(call, BrokerCall::Join { group: g, .. } if g == group))
    })
    .await;
}

/// A store directory that outlives individual `Store` handles
pub struct StoreDir {
    dir: TempDir,
}

impl StoreDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// Open (or reopen, after a simulated crash) the store
    pub fn open(&self) -> Store {
        Store::open(self.dir.path(), StoreConfig::default()).unwrap()
    }
}
