// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fan-out specs
//!
//! A subscriber connects, names its location, and receives the live
//! records routed there until it disconnects.

use crate::prelude::*;
use crate::prelude::assert_eq;
use tm_core::{Envelope, RoutingKey, SequentialIdGen};
use tm_daemon::{handle_connection, ServerContext};
use tm_engine::{Emitter, FanOut, RouteResolver, Router, RouterConfig, DEFAULT_OUTBOUND_QUEUE};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

fn austin() -> RoutingKey {
    RoutingKey::new("austin").unwrap()
}

#[tokio::test]
async fn subscriber_sees_its_location_until_it_disconnects() {
    let broker = FakeBroker::new();
    let fanout = FanOut::new();
    let (emitter, _) = Emitter::spawn(broker.producer());
    let ctx = Arc::new(ServerContext {
        fanout: fanout.clone(),
        emitter,
        ids: SequentialIdGen::default(),
        handshake_timeout: Duration::from_secs(5),
        outbound_queue: DEFAULT_OUTBOUND_QUEUE,
    });

    let router = Router::new(
        RouterConfig {
            group: "router".to_string(),
            topics: vec!["orders".to_string()],
        },
        broker.clone(),
        RouteResolver::new("location", None),
        fanout.clone(),
    );
    let (stop, shutdown) = watch::channel(false);
    let routing = tokio::spawn(router.run(shutdown));
    joined(&broker, "router").await;

    let (client, server) = tokio::io::duplex(4096);
    let connection = tokio::spawn(handle_connection(Arc::clone(&ctx), server));
    let (reader, mut writer) = tokio::io::split(client);
    let mut lines = BufReader::new(reader).lines();

    writer.write_all(b"{\"location\":\"Austin\"}\n").await.unwrap();
    let ack: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(ack, json!({"type": "handshake.ack", "ok": true}));
    eventually("the subscription", || fanout.subscriber_count(&austin()) == 1).await;

    broker
        .seed("orders", None, r#"{"id":"p1","location":"AUSTIN","status":"ready"}"#)
        .unwrap();
    broker
        .seed("orders", None, r#"{"id":"p2","location":"Dallas"}"#)
        .unwrap();
    broker
        .seed("orders", None, r#"{"id":"p3","location":"austin"}"#)
        .unwrap();

    let mut received = Vec::new();
    for _ in 0..2 {
        let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        received.push(serde_json::from_str::<Value>(&line).unwrap());
    }
    assert_eq!(
        received,
        vec![
            json!({"type": "kafka", "topic": "orders", "log": {"id": "p1", "location": "AUSTIN", "status": "ready"}}),
            json!({"type": "kafka", "topic": "orders", "log": {"id": "p3", "location": "austin"}}),
        ]
    );

    drop(lines);
    drop(writer);
    connection.await.unwrap().unwrap();

    let delivery = fanout.publish(
        &austin(),
        &Envelope::Log {
            topic: "orders".to_string(),
            log: json!({"id": "p4"}),
        },
    );
    assert_eq!(delivery.delivered, 0);
    assert!(delivery.failed.is_empty());

    stop.send_replace(true);
    routing.await.unwrap().unwrap();
}
