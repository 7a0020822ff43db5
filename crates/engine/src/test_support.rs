// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for engine tests

use std::time::Duration;
use tm_core::LogRecord;
use tokio::sync::watch;

pub fn log_record(topic: &str, offset: u64, value: &str) -> LogRecord {
    LogRecord {
        topic: topic.to_string(),
        partition: 0,
        offset,
        timestamp: Default::default(),
        key: None,
        value: value.as_bytes().to_vec(),
    }
}

/// Wait until `watch` holds a value matching `pred`
pub async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, pred: F) -> T
where
    T: Clone,
    F: Fn(&T) -> bool,
{
    let result = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|v| pred(v))).await;
    match result {
        Ok(Ok(value)) => value.clone(),
        Ok(Err(_)) => panic!("watch sender dropped"),
        Err(_) => panic!("timed out waiting for state"),
    }
}

/// Poll `check` until it returns true
pub async fn eventually<F: Fn() -> bool>(check: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached in time");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
