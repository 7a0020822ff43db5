// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::log_record;
use tempfile::TempDir;
use tm_storage::StoreConfig;

fn apply(handler: &StatusProjection, store: &Store, payload: &str) -> Outcome {
    let log = log_record("orders", 0, payload);
    let record = log.record().unwrap();
    let outcome = handler.handle(&record, &log, store).unwrap();
    for (key, value) in &outcome.writes {
        store.put(key.clone(), value.clone()).unwrap();
    }
    outcome
}

#[test]
fn first_status_is_announced() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path(), StoreConfig::default()).unwrap();
    let handler = StatusProjection::new(Some("status-changes".to_string()));

    let outcome = apply(
        &handler,
        &store,
        r#"{"id":"p1","status":"pending","location":"Austin"}"#,
    );

    assert_eq!(
        outcome.emits,
        vec![Emit {
            topic: "status-changes".to_string(),
            key: Some("p1".to_string()),
            value: json!({
                "id": "p1",
                "status": "pending",
                "previousStatus": null,
                "location": "Austin",
            }),
        }]
    );
    assert_eq!(store.get("p1").unwrap()["status"], "pending");
}

#[test]
fn attributes_merge_over_stored_record() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path(), StoreConfig::default()).unwrap();
    let handler = StatusProjection::new(Some("status-changes".to_string()));

    apply(
        &handler,
        &store,
        r#"{"id":"p1","status":"pending","location":"Austin"}"#,
    );
    let outcome = apply(&handler, &store, r#"{"id":"p1","status":"shipped"}"#);

    assert_eq!(
        store.get("p1"),
        Some(json!({"id": "p1", "status": "shipped", "location": "Austin"}))
    );
    assert_eq!(outcome.emits.len(), 1);
    assert_eq!(outcome.emits[0].value["previousStatus"], "pending");
    assert_eq!(outcome.emits[0].value["location"], "Austin");
}

#[test]
fn unchanged_status_is_not_announced() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path(), StoreConfig::default()).unwrap();
    let handler = StatusProjection::new(Some("status-changes".to_string()));

    apply(&handler, &store, r#"{"id":"p1","status":"pending"}"#);
    let replay = apply(&handler, &store, r#"{"id":"p1","status":"pending"}"#);
    let no_status = apply(&handler, &store, r#"{"id":"p1","location":"Dallas"}"#);

    assert!(replay.emits.is_empty());
    assert!(no_status.emits.is_empty());
    assert_eq!(store.get("p1").unwrap()["location"], "Dallas");
}

#[test]
fn without_output_topic_only_writes() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path(), StoreConfig::default()).unwrap();
    let handler = StatusProjection::default();

    let outcome = apply(&handler, &store, r#"{"id":"p1","status":"pending"}"#);

    assert!(outcome.emits.is_empty());
    assert_eq!(outcome.writes.len(), 1);
}

#[test]
fn closures_are_handlers() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path(), StoreConfig::default()).unwrap();
    let handler = |record: &Record, log: &LogRecord, _: &Store| {
        Ok::<_, HandlerError>(
            Outcome::default().write(record.id.clone(), json!({"offset": log.offset})),
        )
    };

    let log = log_record("orders", 9, r#"{"id":"p1"}"#);
    let outcome = handler
        .handle(&log.record().unwrap(), &log, &store)
        .unwrap();

    assert_eq!(outcome.writes, vec![("p1".to_string(), json!({"offset": 9}))]);
}
