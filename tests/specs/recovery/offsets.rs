// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Offset recovery specs
//!
//! The store's checkpoint, not the broker's committed offset, decides where
//! a group resumes.

use crate::prelude::*;
use crate::prelude::assert_eq;
use std::sync::Mutex;
use tm_core::{LogRecord, Record};
use tm_engine::{
    Emitter, GroupConfig, GroupConsumer, GroupState, HandlerError, Outcome, RecordHandler,
    StatusProjection,
};

/// Status projection that remembers which offsets it was given
#[derive(Clone, Default)]
struct Recording {
    inner: StatusProjection,
    offsets: Arc<Mutex<Vec<u64>>>,
}

impl Recording {
    fn offsets(&self) -> Vec<u64> {
        self.offsets.lock().unwrap().clone()
    }
}

impl RecordHandler for Recording {
    fn handle(&self, record: &Record, log: &LogRecord, store: &Store) -> Result<Outcome, HandlerError> {
        self.offsets.lock().unwrap().push(log.offset);
        self.inner.handle(record, log, store)
    }
}

fn inventory(broker: &FakeBroker, store: &Store, handler: Recording) -> GroupConsumer<FakeBroker, Recording> {
    let (emitter, _) = Emitter::spawn(broker.producer());
    GroupConsumer::new(
        GroupConfig {
            name: "inventory".to_string(),
            topics: vec!["orders".to_string()],
            from_beginning: true,
        },
        broker.clone(),
        store.clone(),
        handler,
        emitter,
    )
}

fn seed_orders(broker: &FakeBroker) {
    for n in 0..5 {
        broker
            .seed("orders", None, &format!(r#"{{"id":"o{}","status":"shipped"}}"#, n))
            .unwrap();
    }
    broker
        .seed("orders", None, r#"{"id":"p1","status":"pending"}"#)
        .unwrap();
}

#[tokio::test]
async fn crash_between_checkpoint_and_ack_does_not_reprocess() {
    let dir = StoreDir::new();
    let broker = FakeBroker::new();
    seed_orders(&broker);

    // Offsets 0..=4 were applied by an earlier run
    let store = dir.open();
    store
        .put_meta("inventory.offset", json!({"orders": {"0": 5}}))
        .unwrap();

    // The broker ack for offset 5 never lands
    broker.fail_commits(true);
    let first = Recording::default();
    let (_stop, shutdown) = watch::channel(false);
    let state = inventory(&broker, &store, first.clone()).run(shutdown).await;

    assert!(matches!(state, GroupState::Failed(_)));
    assert_eq!(first.offsets(), vec![5]);
    assert!(broker.commits("inventory").is_empty());
    drop(store);

    // Restart on a reopened store with a healthy broker
    broker.fail_commits(false);
    let store = dir.open();
    assert_eq!(
        store.get_meta("inventory.offset"),
        Some(json!({"orders": {"0": 6}}))
    );

    let second = Recording::default();
    let group = inventory(&broker, &store, second.clone());
    let mut handle = group.handle();
    let (stop, shutdown) = watch::channel(false);
    let task = tokio::spawn(group.run(shutdown));
    handle
        .state
        .wait_for(|s| *s == GroupState::Running)
        .await
        .unwrap();

    stop.send_replace(true);
    assert_eq!(task.await.unwrap(), GroupState::Stopped);

    assert!(second.offsets().is_empty());
    assert!(broker.calls().iter().any(|call| matches!(
        call,
        BrokerCall::Seek { group, offset: 6, .. } if group == "inventory"
    )));
    assert_eq!(store.get("p1").unwrap()["status"], "pending");
}

#[tokio::test]
async fn checkpoint_is_durable_before_every_broker_ack() {
    let dir = StoreDir::new();
    let broker = FakeBroker::new();
    seed_orders(&broker);
    let store = dir.open();

    let observed = Arc::new(Mutex::new(Vec::new()));
    {
        let store = store.clone();
        let observed = Arc::clone(&observed);
        broker.on_commit(move |_, _, offset| {
            observed
                .lock()
                .unwrap()
                .push((offset, store.get_meta("inventory.offset")));
        });
    }

    let group = inventory(&broker, &store, Recording::default());
    let (stop, shutdown) = watch::channel(false);
    let task = tokio::spawn(group.run(shutdown));
    eventually("all six acks", || observed.lock().unwrap().len() == 6).await;
    stop.send_replace(true);
    task.await.unwrap();

    for (offset, stored) in observed.lock().unwrap().iter() {
        assert_eq!(stored, &Some(json!({"orders": {"0": offset}})));
    }
}
