// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized cache specs

use crate::prelude::*;
use crate::prelude::assert_eq;
use tm_core::Record;
use tm_engine::{CacheConfig, CacheError, CacheView, MaterializedCache, Reducer};
use tokio::task::JoinHandle;

/// Keep the last known location
fn last_location(old: Option<&Value>, record: &Record) -> Option<Value> {
    match record.location() {
        Some(location) => Some(json!({ "location": location })),
        None => old.cloned(),
    }
}

fn start<R: Reducer>(
    broker: &FakeBroker,
    config: CacheConfig,
    reducer: R,
) -> (CacheView, watch::Sender<bool>, JoinHandle<Result<(), CacheError>>) {
    let cache = MaterializedCache::new(config, broker.clone(), reducer);
    let view = cache.view();
    let (stop, shutdown) = watch::channel(false);
    (view, stop, tokio::spawn(cache.run(shutdown)))
}

#[tokio::test]
async fn record_without_location_keeps_the_last_one() {
    let broker = FakeBroker::new();
    broker.seed("orders", None, r#"{"id":"a","location":"X"}"#).unwrap();
    broker.seed("orders", None, r#"{"id":"a"}"#).unwrap();
    broker.seed("orders", None, r#"{"id":"done","location":"Z"}"#).unwrap();

    let (view, stop, task) = start(
        &broker,
        CacheConfig::new("locations", vec!["orders".to_string()]),
        last_location,
    );
    eventually("the last record", || view.get("done").is_some()).await;
    stop.send_replace(true);
    task.await.unwrap().unwrap();

    assert_eq!(view.get("a"), Some(json!({"location": "X"})));
    assert_eq!(view.get_or("missing", json!({})), json!({}));
}

#[tokio::test]
async fn restart_from_snapshot_matches_a_full_replay() {
    let snapshots = TempDir::new().unwrap();
    let broker = FakeBroker::new();
    for (id, location) in [("a", "X"), ("b", "Y"), ("a", "W")] {
        broker
            .seed(
                "orders",
                None,
                &json!({"id": id, "location": location}).to_string(),
            )
            .unwrap();
    }
    let config = || {
        let mut config = CacheConfig::new("locations", vec!["orders".to_string()]);
        config.snapshot_dir = Some(snapshots.path().to_path_buf());
        config
    };

    let (first, stop, task) = start(&broker, config(), last_location);
    eventually("three records", || first.get("a") == Some(json!({"location": "W"}))).await;
    stop.send_replace(true);
    task.await.unwrap().unwrap();

    broker.seed("orders", None, r#"{"id":"b","location":"V"}"#).unwrap();

    let (second, stop, task) = start(&broker, config(), last_location);
    eventually("the new record", || second.get("b") == Some(json!({"location": "V"}))).await;
    stop.send_replace(true);
    task.await.unwrap().unwrap();

    assert_eq!(second.get("a"), Some(json!({"location": "W"})));
    assert_eq!(second.len(), 2);
    assert!(broker.calls().iter().any(|call| matches!(
        call,
        BrokerCall::Seek { group, offset: 3, .. } if group == "cache.locations"
    )));
}
