// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::fanout::{ChannelListener, Listener};
use crate::test_support::{eventually, log_record};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tm_adapters::{BrokerCall, FakeBroker};
use tm_core::ConnectionId;
use tokio::sync::mpsc;

fn record(value: serde_json::Value) -> Record {
    Record::from_value(value).unwrap()
}

fn key(raw: &str) -> RoutingKey {
    RoutingKey::new(raw).unwrap()
}

fn subscribe(fanout: &FanOut, raw: &str) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    let listener: Arc<dyn Listener> = Arc::new(ChannelListener::new(tx));
    fanout.subscribe(ConnectionId(format!("conn-{}", raw)), key(raw), listener);
    rx
}

#[test]
fn cache_wins_over_payload() {
    let cache = CacheView::with_entries([("p1".to_string(), json!({"location": "Dallas"}))]);
    let resolver = RouteResolver::new("location", Some(cache));

    let resolved = resolver.resolve(&record(json!({"id": "p1", "location": "Austin"})));

    assert_eq!(resolved, Some(key("dallas")));
}

#[test]
fn payload_is_the_fallback() {
    let cache = CacheView::with_entries([("other".to_string(), json!({"location": "Dallas"}))]);
    let resolver = RouteResolver::new("location", Some(cache));

    assert_eq!(
        resolver.resolve(&record(json!({"id": "p1", "location": "Austin"}))),
        Some(key("austin"))
    );
}

#[test]
fn cache_entry_without_field_falls_back_to_payload() {
    let cache = CacheView::with_entries([("p1".to_string(), json!({"status": "pending"}))]);
    let resolver = RouteResolver::new("location", Some(cache));

    assert_eq!(
        resolver.resolve(&record(json!({"id": "p1", "location": "Austin"}))),
        Some(key("austin"))
    );
}

#[test]
fn nothing_to_route_by() {
    let resolver = RouteResolver::new("location", None);
    assert_eq!(resolver.resolve(&record(json!({"id": "p1"}))), None);
    assert_eq!(
        resolver.resolve(&record(json!({"id": "p1", "location": "  "}))),
        None
    );
}

#[test]
fn route_publishes_kafka_envelope() {
    let fanout = FanOut::new();
    let mut rx = subscribe(&fanout, "austin");
    let router = Router::new(
        RouterConfig {
            group: "router".to_string(),
            topics: vec!["orders".to_string()],
        },
        FakeBroker::new(),
        RouteResolver::new("location", None),
        fanout,
    );

    let routed = router.route(&log_record(
        "orders",
        0,
        r#"{"id":"p1","location":"AUSTIN"}"#,
    ));

    assert_eq!(routed, Some(key("austin")));
    let line: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert_eq!(
        line,
        json!({"type": "kafka", "topic": "orders", "log": {"id": "p1", "location": "AUSTIN"}})
    );
}

#[test]
fn unroutable_records_are_dropped() {
    let router = Router::new(
        RouterConfig {
            group: "router".to_string(),
            topics: vec!["orders".to_string()],
        },
        FakeBroker::new(),
        RouteResolver::new("location", None),
        FanOut::new(),
    );

    assert_eq!(router.route(&log_record("orders", 0, "garbage")), None);
    assert_eq!(router.route(&log_record("orders", 1, r#"{"id":"p1"}"#)), None);
}

#[tokio::test]
async fn run_delivers_only_records_appended_after_start() {
    let broker = FakeBroker::new();
    broker
        .seed("orders", None, r#"{"id":"old","location":"Austin"}"#)
        .unwrap();
    let fanout = FanOut::new();
    let mut rx = subscribe(&fanout, "austin");

    let router = Router::new(
        RouterConfig {
            group: "router".to_string(),
            topics: vec!["orders".to_string()],
        },
        broker.clone(),
        RouteResolver::new("location", None),
        fanout,
    );
    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(router.run(shutdown_rx));

    eventually(|| {
        broker
            .calls()
            .iter()
            .any(|call| matches!(call, BrokerCall::Join { .. }))
    })
    .await;
    broker
        .seed("orders", None, r#"{"id":"new","location":"Austin"}"#)
        .unwrap();

    let line = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let envelope: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(envelope["log"]["id"], "new");

    shutdown.send_replace(true);
    task.await.unwrap().unwrap();
    assert!(broker.commits("router").is_empty());
}
